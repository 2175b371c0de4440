use std::sync::Arc;

use tokio::sync::oneshot;

use crate::description::{ApplicationDescription, DriverDescription};
use crate::endpoint::{ApplicationEndpoint, EndpointAddress, WorkerEndpoint};
use crate::id::{ApplicationId, DriverId, ExecutorId, WorkerId};
use crate::master::state::{DriverState, ExecutorState, MasterStateSnapshot};
use crate::persist::{ApplicationRecord, DriverRecord, WorkerRecord};

/// An executor reported by a worker responding to a master change.
#[derive(Debug, Clone)]
pub struct ExecutorReport {
    pub application_id: ApplicationId,
    pub executor_id: ExecutorId,
    pub cores: usize,
}

/// A persisted worker whose transport endpoint has been resolved.
pub struct RecoveredWorker {
    pub record: WorkerRecord,
    pub endpoint: Arc<dyn WorkerEndpoint>,
}

/// A persisted application whose transport endpoint has been resolved.
pub struct RecoveredApplication {
    pub record: ApplicationRecord,
    pub endpoint: Arc<dyn ApplicationEndpoint>,
}

/// Everything the master reacts to. All mutations of the master state go
/// through this event type, so handlers never race with each other.
pub enum MasterEvent {
    /// The election agent selected this master as the leader.
    ElectedLeader,
    /// The election agent revoked leadership from this master.
    RevokedLeadership,
    /// Persisted state has been read and resolved after winning an
    /// election.
    RecoveryStateLoaded {
        workers: Vec<RecoveredWorker>,
        applications: Vec<RecoveredApplication>,
        drivers: Vec<DriverRecord>,
    },
    /// The recovery deadline has passed and unresponsive entities must be
    /// evicted.
    CompleteRecovery,
    CheckWorkerTimeout,
    RegisterWorker {
        worker_id: WorkerId,
        host: String,
        port: u16,
        /// The port of the worker's status page.
        ui_port: u16,
        /// The address published in links to the worker, which may differ
        /// from the host the worker binds to.
        public_address: String,
        cores: usize,
        memory_mb: usize,
        endpoint: Arc<dyn WorkerEndpoint>,
    },
    RegisterApplication {
        description: ApplicationDescription,
        endpoint: Arc<dyn ApplicationEndpoint>,
    },
    Heartbeat {
        worker_id: WorkerId,
    },
    ExecutorStateChanged {
        application_id: ApplicationId,
        executor_id: ExecutorId,
        state: ExecutorState,
        message: Option<String>,
        exit_status: Option<i32>,
    },
    DriverStateChanged {
        driver_id: DriverId,
        state: DriverState,
        exception: Option<String>,
    },
    /// A worker answers a master change with the executors and drivers it
    /// still runs.
    WorkerSchedulerStateResponse {
        worker_id: WorkerId,
        executors: Vec<ExecutorReport>,
        drivers: Vec<DriverId>,
    },
    MasterChangeAcknowledged {
        application_id: ApplicationId,
    },
    UnregisterApplication {
        application_id: ApplicationId,
    },
    /// An operator kills a running application outright.
    KillApplication {
        application_id: ApplicationId,
    },
    /// The transport layer noticed that a remote endpoint went away.
    Disconnected {
        address: EndpointAddress,
    },
    RequestSubmitDriver {
        description: DriverDescription,
        result: oneshot::Sender<SubmitDriverResponse>,
    },
    RequestKillDriver {
        driver_id: DriverId,
        result: oneshot::Sender<KillDriverResponse>,
    },
    RequestDriverStatus {
        driver_id: DriverId,
        result: oneshot::Sender<DriverStatusResponse>,
    },
    RequestMasterState {
        result: oneshot::Sender<MasterStateSnapshot>,
    },
    RequestBoundPorts {
        result: oneshot::Sender<BoundPortsResponse>,
    },
    /// An application adjusts its executor limit to a new total.
    RequestExecutors {
        application_id: ApplicationId,
        executor_count: usize,
        result: oneshot::Sender<bool>,
    },
    KillExecutors {
        application_id: ApplicationId,
        executor_ids: Vec<ExecutorId>,
        result: oneshot::Sender<bool>,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SubmitDriverResponse {
    pub success: bool,
    pub driver_id: Option<DriverId>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct KillDriverResponse {
    pub driver_id: DriverId,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DriverStatusResponse {
    pub found: bool,
    pub state: Option<DriverState>,
    pub worker_id: Option<WorkerId>,
    /// The `host:port` of the worker running the driver, if any.
    pub worker_host_port: Option<String>,
    pub exception: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BoundPortsResponse {
    pub url: String,
    pub port: u16,
}
