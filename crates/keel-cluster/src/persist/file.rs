use std::path::PathBuf;

use async_trait::async_trait;
use keel_server::RetryStrategy;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;

use crate::error::{ClusterError, ClusterResult};
use crate::id::{ApplicationId, DriverId, WorkerId};
use crate::persist::{
    ApplicationRecord, DriverRecord, PersistedState, PersistenceEngine, WorkerRecord,
};

const WORKER_PREFIX: &str = "worker_";
const APPLICATION_PREFIX: &str = "application_";
const DRIVER_PREFIX: &str = "driver_";

fn worker_file(worker_id: &WorkerId) -> String {
    format!("{WORKER_PREFIX}{worker_id}.json")
}

fn application_file(application_id: &ApplicationId) -> String {
    format!("{APPLICATION_PREFIX}{application_id}.json")
}

fn driver_file(driver_id: &DriverId) -> String {
    format!("{DRIVER_PREFIX}{driver_id}.json")
}

/// A persistence engine that stores each record as a JSON file in a
/// directory. This is meant for deployments where the directory survives
/// master restarts, such as a local disk or a mounted volume.
pub struct FilePersistenceEngine {
    directory: PathBuf,
    retry: RetryStrategy,
}

impl FilePersistenceEngine {
    pub fn new(directory: impl Into<PathBuf>, retry: RetryStrategy) -> Self {
        Self {
            directory: directory.into(),
            retry,
        }
    }

    async fn persist<T: Serialize>(&self, name: String, value: &T) -> ClusterResult<()> {
        let path = self.directory.join(name);
        let data = serde_json::to_vec_pretty(value)?;
        self.retry
            .run(|| {
                let path = path.clone();
                let data = data.clone();
                async move { fs::write(&path, &data).await.map_err(ClusterError::from) }
            })
            .await
    }

    async fn unpersist(&self, name: String) -> ClusterResult<()> {
        let path = self.directory.join(name);
        self.retry
            .run(|| {
                let path = path.clone();
                async move {
                    match fs::remove_file(&path).await {
                        Ok(()) => Ok(()),
                        // Removing a record that was never written or has
                        // already been removed is not an error.
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                        Err(e) => Err(ClusterError::from(e)),
                    }
                }
            })
            .await
    }

    async fn load<T: DeserializeOwned>(&self, path: PathBuf) -> Option<T> {
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) => {
                warn!("failed to read record {}: {e}", path.display());
                return None;
            }
        };
        match serde_json::from_slice(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("skipping corrupt record {}: {e}", path.display());
                None
            }
        }
    }
}

#[async_trait]
impl PersistenceEngine for FilePersistenceEngine {
    async fn add_worker(&self, worker: &WorkerRecord) -> ClusterResult<()> {
        self.persist(worker_file(&worker.id), worker).await
    }

    async fn remove_worker(&self, worker_id: &WorkerId) -> ClusterResult<()> {
        self.unpersist(worker_file(worker_id)).await
    }

    async fn add_application(&self, application: &ApplicationRecord) -> ClusterResult<()> {
        self.persist(application_file(&application.id), application)
            .await
    }

    async fn remove_application(&self, application_id: &ApplicationId) -> ClusterResult<()> {
        self.unpersist(application_file(application_id)).await
    }

    async fn add_driver(&self, driver: &DriverRecord) -> ClusterResult<()> {
        self.persist(driver_file(&driver.id), driver).await
    }

    async fn remove_driver(&self, driver_id: &DriverId) -> ClusterResult<()> {
        self.unpersist(driver_file(driver_id)).await
    }

    async fn read_persisted_data(&self) -> ClusterResult<PersistedState> {
        fs::create_dir_all(&self.directory).await?;
        let mut state = PersistedState::default();
        let mut entries = fs::read_dir(&self.directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with(WORKER_PREFIX) {
                if let Some(worker) = self.load::<WorkerRecord>(entry.path()).await {
                    state.workers.push(worker);
                }
            } else if name.starts_with(APPLICATION_PREFIX) {
                if let Some(application) = self.load::<ApplicationRecord>(entry.path()).await {
                    state.applications.push(application);
                }
            } else if name.starts_with(DRIVER_PREFIX) {
                if let Some(driver) = self.load::<DriverRecord>(entry.path()).await {
                    state.drivers.push(driver);
                }
            }
        }
        // Restore the submission order so that recovered applications and
        // drivers keep their scheduling priority.
        state.applications.sort_by_key(|x| x.submitted_at);
        state.drivers.sort_by_key(|x| x.submitted_at);
        Ok(state)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "tests use unwrap for brevity")]
mod tests {
    use std::time::Duration;

    use chrono::{TimeDelta, Utc};

    use super::*;
    use crate::description::{ApplicationDescription, Command, DriverDescription};
    use crate::endpoint::EndpointAddress;

    fn test_retry() -> RetryStrategy {
        RetryStrategy::Fixed {
            max_count: 2,
            delay: Duration::from_millis(1),
        }
    }

    fn worker_record(id: &str) -> WorkerRecord {
        WorkerRecord {
            id: WorkerId::from(id),
            host: "10.0.0.1".to_string(),
            port: 8091,
            ui_port: 8081,
            public_address: "10.0.0.1".to_string(),
            cores: 8,
            memory_mb: 16384,
            address: EndpointAddress::new("10.0.0.1", 8091),
        }
    }

    fn application_record(id: &str, submitted_at: chrono::DateTime<Utc>) -> ApplicationRecord {
        ApplicationRecord {
            id: ApplicationId::from(id),
            description: ApplicationDescription {
                name: "etl".to_string(),
                max_cores: Some(4),
                memory_per_executor_mb: 1024,
                cores_per_executor: Some(2),
                initial_executor_limit: None,
                command: Command::new("/opt/app/bin/run"),
            },
            submitted_at,
            address: EndpointAddress::new("10.0.0.9", 4040),
        }
    }

    fn driver_record(id: &str) -> DriverRecord {
        DriverRecord {
            id: DriverId::from(id),
            description: DriverDescription {
                cores: 1,
                memory_mb: 512,
                supervise: true,
                command: Command::new("/opt/app/bin/driver"),
            },
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_record_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FilePersistenceEngine::new(dir.path(), test_retry());

        engine.add_worker(&worker_record("worker-1")).await.unwrap();
        engine
            .add_application(&application_record("app-1", Utc::now()))
            .await
            .unwrap();
        engine.add_driver(&driver_record("driver-1")).await.unwrap();

        let state = engine.read_persisted_data().await.unwrap();
        assert_eq!(state.workers, vec![worker_record("worker-1")]);
        assert_eq!(state.applications.len(), 1);
        assert_eq!(state.applications[0].id, ApplicationId::from("app-1"));
        assert_eq!(state.drivers.len(), 1);
        assert_eq!(state.drivers[0].id, DriverId::from("driver-1"));

        engine
            .remove_worker(&WorkerId::from("worker-1"))
            .await
            .unwrap();
        engine
            .remove_application(&ApplicationId::from("app-1"))
            .await
            .unwrap();
        engine
            .remove_driver(&DriverId::from("driver-1"))
            .await
            .unwrap();

        let state = engine.read_persisted_data().await.unwrap();
        assert!(state.workers.is_empty());
        assert!(state.applications.is_empty());
        assert!(state.drivers.is_empty());
    }

    #[tokio::test]
    async fn test_remove_missing_record_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FilePersistenceEngine::new(dir.path(), test_retry());
        engine
            .remove_worker(&WorkerId::from("worker-9"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FilePersistenceEngine::new(dir.path(), test_retry());
        engine.add_worker(&worker_record("worker-1")).await.unwrap();
        std::fs::write(dir.path().join("worker_bad.json"), b"not json").unwrap();

        let state = engine.read_persisted_data().await.unwrap();
        assert_eq!(state.workers, vec![worker_record("worker-1")]);
    }

    #[tokio::test]
    async fn test_applications_are_ordered_by_submission_time() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FilePersistenceEngine::new(dir.path(), test_retry());
        let now = Utc::now();
        engine
            .add_application(&application_record("app-2", now))
            .await
            .unwrap();
        engine
            .add_application(&application_record("app-1", now - TimeDelta::seconds(10)))
            .await
            .unwrap();

        let state = engine.read_persisted_data().await.unwrap();
        let ids: Vec<_> = state.applications.iter().map(|x| x.id.clone()).collect();
        assert_eq!(
            ids,
            vec![ApplicationId::from("app-1"), ApplicationId::from("app-2")]
        );
    }
}
