mod file;
mod none;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use file::FilePersistenceEngine;
use keel_server::RetryStrategy;
pub use none::NullPersistenceEngine;
use serde::{Deserialize, Serialize};

use crate::description::{ApplicationDescription, DriverDescription};
use crate::endpoint::EndpointAddress;
use crate::error::ClusterResult;
use crate::id::{ApplicationId, DriverId, WorkerId};

/// The persistence backend used for master metadata.
#[derive(Clone)]
pub enum RecoveryMode {
    /// No persistence. A restarted master starts with empty state.
    None,
    /// Metadata is stored as JSON files in a directory.
    Filesystem { directory: PathBuf },
    /// An engine provided by the embedder, such as one backed by a
    /// coordination service.
    Custom(Arc<dyn PersistenceEngine>),
}

/// A persisted worker registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub host: String,
    pub port: u16,
    pub ui_port: u16,
    pub public_address: String,
    pub cores: usize,
    pub memory_mb: usize,
    /// The transport address, used to reconnect to the worker after a
    /// master restart.
    pub address: EndpointAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub description: ApplicationDescription,
    pub submitted_at: DateTime<Utc>,
    pub address: EndpointAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverRecord {
    pub id: DriverId,
    pub description: DriverDescription,
    pub submitted_at: DateTime<Utc>,
}

/// All records read back from a persistence engine when the master is
/// elected leader.
#[derive(Debug, Default)]
pub struct PersistedState {
    pub workers: Vec<WorkerRecord>,
    pub applications: Vec<ApplicationRecord>,
    pub drivers: Vec<DriverRecord>,
}

/// Storage for master metadata that must survive a master restart.
/// Writes are issued off the master message loop, so engines must tolerate
/// concurrent calls.
#[async_trait]
pub trait PersistenceEngine: Send + Sync + 'static {
    async fn add_worker(&self, worker: &WorkerRecord) -> ClusterResult<()>;

    async fn remove_worker(&self, worker_id: &WorkerId) -> ClusterResult<()>;

    async fn add_application(&self, application: &ApplicationRecord) -> ClusterResult<()>;

    async fn remove_application(&self, application_id: &ApplicationId) -> ClusterResult<()>;

    async fn add_driver(&self, driver: &DriverRecord) -> ClusterResult<()>;

    async fn remove_driver(&self, driver_id: &DriverId) -> ClusterResult<()>;

    /// Reads all persisted records. This is called once per election before
    /// any write is issued.
    async fn read_persisted_data(&self) -> ClusterResult<PersistedState>;
}

pub(crate) fn create_persistence_engine(
    mode: &RecoveryMode,
    retry: &RetryStrategy,
) -> Arc<dyn PersistenceEngine> {
    match mode {
        RecoveryMode::None => Arc::new(NullPersistenceEngine),
        RecoveryMode::Filesystem { directory } => Arc::new(FilePersistenceEngine::new(
            directory.clone(),
            retry.clone(),
        )),
        RecoveryMode::Custom(engine) => Arc::clone(engine),
    }
}
