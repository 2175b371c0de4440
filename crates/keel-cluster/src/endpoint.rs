use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::description::{ApplicationDescription, DriverDescription};
use crate::error::ClusterResult;
use crate::id::{ApplicationId, DriverId, ExecutorId, WorkerId};
use crate::master::ExecutorState;

/// The transport address of a worker or application endpoint.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct EndpointAddress {
    pub host: String,
    pub port: u16,
}

impl EndpointAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A message from the master to a worker.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    RegisteredWorker {
        master_url: String,
    },
    RegisterWorkerFailed {
        message: String,
    },
    /// The worker ID is known but the worker is no longer registered,
    /// so the worker must go through registration again.
    ReconnectWorker {
        master_url: String,
    },
    /// A new master has taken over and the worker must report its hosted
    /// executors and drivers to it.
    MasterChanged {
        master_url: String,
    },
    LaunchExecutor {
        master_url: String,
        application_id: ApplicationId,
        executor_id: ExecutorId,
        application: ApplicationDescription,
        cores: usize,
        memory_mb: usize,
    },
    KillExecutor {
        master_url: String,
        application_id: ApplicationId,
        executor_id: ExecutorId,
    },
    LaunchDriver {
        driver_id: DriverId,
        driver: DriverDescription,
    },
    KillDriver {
        driver_id: DriverId,
    },
    /// The application has finished and the worker can clean up any state
    /// kept for it.
    ApplicationFinished {
        application_id: ApplicationId,
    },
}

/// A message from the master to an application.
#[derive(Debug, Clone)]
pub enum ApplicationMessage {
    RegisteredApplication {
        application_id: ApplicationId,
        master_url: String,
    },
    ExecutorAdded {
        executor_id: ExecutorId,
        worker_id: WorkerId,
        host: String,
        port: u16,
        cores: usize,
        memory_mb: usize,
    },
    ExecutorUpdated {
        executor_id: ExecutorId,
        state: ExecutorState,
        message: Option<String>,
        exit_status: Option<i32>,
    },
    /// The application has been removed for a reason other than normal
    /// completion.
    ApplicationRemoved {
        message: String,
    },
    MasterChanged {
        master_url: String,
    },
}

/// The outbound side of the worker transport.
/// The master assumes reliable delivery and learns about lost peers through
/// disconnect notifications, not through send errors.
#[async_trait]
pub trait WorkerEndpoint: Send + Sync + 'static {
    fn address(&self) -> EndpointAddress;

    async fn send(&self, message: WorkerMessage) -> ClusterResult<()>;
}

/// The outbound side of the application transport.
#[async_trait]
pub trait ApplicationEndpoint: Send + Sync + 'static {
    fn address(&self) -> EndpointAddress;

    async fn send(&self, message: ApplicationMessage) -> ClusterResult<()>;
}

/// Resolves persisted endpoint addresses back to live endpoints after a
/// master restart. Without a provider, entities read from persisted state
/// cannot be contacted and are dropped from recovery.
#[async_trait]
pub trait EndpointProvider: Send + Sync + 'static {
    async fn worker_endpoint(
        &self,
        address: &EndpointAddress,
    ) -> ClusterResult<Arc<dyn WorkerEndpoint>>;

    async fn application_endpoint(
        &self,
        address: &EndpointAddress,
    ) -> ClusterResult<Arc<dyn ApplicationEndpoint>>;
}
