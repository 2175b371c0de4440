mod core;
mod handler;
mod recovery;
mod schedule;

pub(crate) use self::core::MasterActor;
