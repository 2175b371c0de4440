use std::marker::PhantomData;

use crate::error::{ClusterError, ClusterResult};

pub trait IdValueType: Sized {
    fn first() -> Self;
    fn next(v: Self) -> ClusterResult<Self>;
}

macro_rules! impl_integer_id_value_type {
    ($type:ty) => {
        impl IdValueType for $type {
            fn first() -> Self {
                1
            }

            fn next(v: Self) -> ClusterResult<Self> {
                v.checked_add(1)
                    .ok_or(ClusterError::InternalError("ID overflow".to_string()))
            }
        }
    };
}

impl_integer_id_value_type!(u64);

pub trait IdType: Sized {
    type Value: IdValueType + From<Self> + Into<Self>;
}

macro_rules! define_id_type {
    ($name:ident, $value_type:ty) => {
        #[derive(
            Debug,
            Copy,
            Clone,
            Eq,
            PartialEq,
            Ord,
            PartialOrd,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name($value_type);

        impl IdType for $name {
            type Value = $value_type;
        }

        impl From<$value_type> for $name {
            fn from(id: $value_type) -> Self {
                Self(id)
            }
        }

        impl From<$name> for $value_type {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

/// An identifier generated by the entity itself and registered with the
/// master, or generated by the master from a timestamped sequence.
macro_rules! define_name_id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id_type!(ExecutorId, u64);

define_name_id_type!(WorkerId);
define_name_id_type!(ApplicationId);
define_name_id_type!(DriverId);

/// The identity of an executor across all applications.
/// Executor IDs are only unique within one application.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ExecutorKey {
    pub application_id: ApplicationId,
    pub executor_id: ExecutorId,
}

impl ExecutorKey {
    pub fn new(application_id: ApplicationId, executor_id: ExecutorId) -> Self {
        Self {
            application_id,
            executor_id,
        }
    }
}

impl std::fmt::Display for ExecutorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.application_id, self.executor_id)
    }
}

#[derive(Debug)]
pub struct IdGenerator<T: IdType> {
    next_value: T::Value,
    phantom: PhantomData<T>,
}

impl<T: IdType> IdGenerator<T>
where
    T::Value: Copy,
{
    pub fn new() -> Self {
        Self {
            next_value: T::Value::first(),
            phantom: PhantomData,
        }
    }

    pub fn next(&mut self) -> ClusterResult<T> {
        let value = self.next_value;
        self.next_value = T::Value::next(value)?;
        Ok(value.into())
    }

    /// Ensures that all IDs generated later come after the given value.
    /// This is needed when IDs recovered from persisted state must not
    /// collide with newly generated ones.
    pub fn advance_past(&mut self, value: T::Value) -> ClusterResult<()>
    where
        T::Value: Ord,
    {
        if value >= self.next_value {
            self.next_value = T::Value::next(value)?;
        }
        Ok(())
    }
}

impl<T: IdType> Default for IdGenerator<T>
where
    T::Value: Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "tests use unwrap for brevity")]
mod tests {
    use super::*;

    #[test]
    fn test_id_generator_sequence() {
        let mut generator = IdGenerator::<ExecutorId>::new();
        assert_eq!(generator.next().unwrap(), ExecutorId::from(1));
        assert_eq!(generator.next().unwrap(), ExecutorId::from(2));
        assert_eq!(generator.next().unwrap(), ExecutorId::from(3));
    }

    #[test]
    fn test_id_generator_advance_past() {
        let mut generator = IdGenerator::<ExecutorId>::new();
        generator.advance_past(7).unwrap();
        assert_eq!(generator.next().unwrap(), ExecutorId::from(8));
        // Advancing past an already generated value has no effect.
        generator.advance_past(3).unwrap();
        assert_eq!(generator.next().unwrap(), ExecutorId::from(9));
    }

    #[test]
    fn test_executor_key_display() {
        let key = ExecutorKey::new(
            ApplicationId::from("app-20250825120000-0001"),
            ExecutorId::from(3),
        );
        assert_eq!(key.to_string(), "app-20250825120000-0001/3");
    }
}
