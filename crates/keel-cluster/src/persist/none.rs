use async_trait::async_trait;

use crate::error::ClusterResult;
use crate::id::{ApplicationId, DriverId, WorkerId};
use crate::persist::{
    ApplicationRecord, DriverRecord, PersistedState, PersistenceEngine, WorkerRecord,
};

/// A persistence engine that stores nothing.
pub struct NullPersistenceEngine;

#[async_trait]
impl PersistenceEngine for NullPersistenceEngine {
    async fn add_worker(&self, _worker: &WorkerRecord) -> ClusterResult<()> {
        Ok(())
    }

    async fn remove_worker(&self, _worker_id: &WorkerId) -> ClusterResult<()> {
        Ok(())
    }

    async fn add_application(&self, _application: &ApplicationRecord) -> ClusterResult<()> {
        Ok(())
    }

    async fn remove_application(&self, _application_id: &ApplicationId) -> ClusterResult<()> {
        Ok(())
    }

    async fn add_driver(&self, _driver: &DriverRecord) -> ClusterResult<()> {
        Ok(())
    }

    async fn remove_driver(&self, _driver_id: &DriverId) -> ClusterResult<()> {
        Ok(())
    }

    async fn read_persisted_data(&self) -> ClusterResult<PersistedState> {
        Ok(PersistedState::default())
    }
}
