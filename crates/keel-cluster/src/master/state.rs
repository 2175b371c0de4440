use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::warn;
use serde::Serialize;

use crate::description::{ApplicationDescription, DriverDescription};
use crate::endpoint::{ApplicationEndpoint, EndpointAddress, WorkerEndpoint};
use crate::error::{ClusterError, ClusterResult};
use crate::id::{ApplicationId, DriverId, ExecutorId, ExecutorKey, IdGenerator, WorkerId};

/// The lifecycle state of the master itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MasterStatus {
    /// The master has not been elected leader and rejects cluster events.
    Standby,
    Alive,
    /// The master has been elected leader and waits for persisted workers
    /// and applications to report back.
    Recovering,
    CompletingRecovery,
}

impl Display for MasterStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MasterStatus::Standby => write!(f, "STANDBY"),
            MasterStatus::Alive => write!(f, "ALIVE"),
            MasterStatus::Recovering => write!(f, "RECOVERING"),
            MasterStatus::CompletingRecovery => write!(f, "COMPLETING_RECOVERY"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    Alive,
    Dead,
    /// The worker was read from persisted state and has not yet reported
    /// back to the new master.
    Unknown,
}

impl Display for WorkerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Alive => write!(f, "ALIVE"),
            WorkerState::Dead => write!(f, "DEAD"),
            WorkerState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationState {
    Waiting,
    Running,
    Finished,
    Failed,
    Killed,
    /// The application was read from persisted state and has not yet
    /// acknowledged the new master.
    Unknown,
}

impl ApplicationState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ApplicationState::Finished | ApplicationState::Failed | ApplicationState::Killed
        )
    }
}

impl Display for ApplicationState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplicationState::Waiting => write!(f, "WAITING"),
            ApplicationState::Running => write!(f, "RUNNING"),
            ApplicationState::Finished => write!(f, "FINISHED"),
            ApplicationState::Failed => write!(f, "FAILED"),
            ApplicationState::Killed => write!(f, "KILLED"),
            ApplicationState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverState {
    Submitted,
    Running,
    /// The driver is being moved to another worker after its worker was
    /// lost.
    Relaunching,
    Finished,
    Error,
    Killed,
}

impl DriverState {
    /// Whether the state is a valid final state reported by a worker.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DriverState::Finished | DriverState::Error | DriverState::Killed
        )
    }
}

impl Display for DriverState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverState::Submitted => write!(f, "SUBMITTED"),
            DriverState::Running => write!(f, "RUNNING"),
            DriverState::Relaunching => write!(f, "RELAUNCHING"),
            DriverState::Finished => write!(f, "FINISHED"),
            DriverState::Error => write!(f, "ERROR"),
            DriverState::Killed => write!(f, "KILLED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutorState {
    Launching,
    Running,
    Exited,
    Killed,
    Failed,
    /// The executor was lost along with its worker.
    Lost,
}

impl ExecutorState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ExecutorState::Exited
                | ExecutorState::Killed
                | ExecutorState::Failed
                | ExecutorState::Lost
        )
    }
}

impl Display for ExecutorState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorState::Launching => write!(f, "LAUNCHING"),
            ExecutorState::Running => write!(f, "RUNNING"),
            ExecutorState::Exited => write!(f, "EXITED"),
            ExecutorState::Killed => write!(f, "KILLED"),
            ExecutorState::Failed => write!(f, "FAILED"),
            ExecutorState::Lost => write!(f, "LOST"),
        }
    }
}

pub struct WorkerDescriptor {
    pub host: String,
    pub port: u16,
    /// The port of the worker's status page.
    pub ui_port: u16,
    /// The address published in links to the worker.
    pub public_address: String,
    pub cores: usize,
    pub memory_mb: usize,
    pub endpoint: Arc<dyn WorkerEndpoint>,
    pub state: WorkerState,
    pub last_heartbeat: Instant,
    pub cores_used: usize,
    pub memory_used_mb: usize,
    pub executors: HashSet<ExecutorKey>,
    pub drivers: HashSet<DriverId>,
}

impl WorkerDescriptor {
    pub fn new(
        host: String,
        port: u16,
        ui_port: u16,
        public_address: String,
        cores: usize,
        memory_mb: usize,
        endpoint: Arc<dyn WorkerEndpoint>,
    ) -> Self {
        Self {
            host,
            port,
            ui_port,
            public_address,
            cores,
            memory_mb,
            endpoint,
            state: WorkerState::Alive,
            last_heartbeat: Instant::now(),
            cores_used: 0,
            memory_used_mb: 0,
            executors: HashSet::new(),
            drivers: HashSet::new(),
        }
    }

    pub fn address(&self) -> EndpointAddress {
        self.endpoint.address()
    }

    pub fn is_alive(&self) -> bool {
        self.state == WorkerState::Alive
    }

    pub fn cores_free(&self) -> usize {
        self.cores.saturating_sub(self.cores_used)
    }

    pub fn memory_free_mb(&self) -> usize {
        self.memory_mb.saturating_sub(self.memory_used_mb)
    }
}

pub struct ApplicationDescriptor {
    pub id: ApplicationId,
    pub description: ApplicationDescription,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub endpoint: Arc<dyn ApplicationEndpoint>,
    pub state: ApplicationState,
    pub executors: HashMap<ExecutorId, ExecutorDescriptor>,
    /// The total number of cores that may be granted to the application.
    /// This is fixed when the application is admitted.
    pub cores_cap: usize,
    pub cores_granted: usize,
    /// The maximum number of executors the application may have.
    /// Executor requests adjust this at runtime.
    pub executor_limit: usize,
    /// The number of abnormal executor exits since the last successful
    /// executor launch.
    pub retry_count: usize,
    executor_ids: IdGenerator<ExecutorId>,
}

impl ApplicationDescriptor {
    pub fn new(
        id: ApplicationId,
        description: ApplicationDescription,
        submitted_at: DateTime<Utc>,
        endpoint: Arc<dyn ApplicationEndpoint>,
        default_cores: Option<usize>,
    ) -> Self {
        let cores_cap = description
            .max_cores
            .or(default_cores)
            .unwrap_or(usize::MAX);
        let executor_limit = description.initial_executor_limit.unwrap_or(usize::MAX);
        Self {
            id,
            description,
            submitted_at,
            completed_at: None,
            endpoint,
            state: ApplicationState::Waiting,
            executors: HashMap::new(),
            cores_cap,
            cores_granted: 0,
            executor_limit,
            retry_count: 0,
            executor_ids: IdGenerator::new(),
        }
    }

    pub fn address(&self) -> EndpointAddress {
        self.endpoint.address()
    }

    pub fn cores_left(&self) -> usize {
        self.cores_cap.saturating_sub(self.cores_granted)
    }

    pub fn next_executor_id(&mut self) -> ClusterResult<ExecutorId> {
        self.executor_ids.next()
    }

    /// Records an executor ID restored from a worker report so that newly
    /// generated IDs do not collide with it.
    pub fn note_executor_id(&mut self, executor_id: ExecutorId) -> ClusterResult<()> {
        self.executor_ids.advance_past(executor_id.into())
    }

    pub fn has_running_executor(&self) -> bool {
        self.executors
            .values()
            .any(|x| x.state == ExecutorState::Running)
    }
}

pub struct DriverDescriptor {
    pub id: DriverId,
    pub description: DriverDescription,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub state: DriverState,
    pub worker_id: Option<WorkerId>,
    pub exception: Option<String>,
}

impl DriverDescriptor {
    pub fn new(id: DriverId, description: DriverDescription, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id,
            description,
            submitted_at,
            completed_at: None,
            state: DriverState::Submitted,
            worker_id: None,
            exception: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorDescriptor {
    pub worker_id: WorkerId,
    pub cores: usize,
    pub memory_mb: usize,
    pub state: ExecutorState,
}

/// All master bookkeeping. The maps are only mutated from the master actor,
/// so no synchronization is needed.
pub struct MasterState {
    pub status: MasterStatus,
    /// Workers in registration order.
    workers: IndexMap<WorkerId, WorkerDescriptor>,
    /// Transport addresses of workers that are not dead.
    worker_addresses: HashMap<EndpointAddress, WorkerId>,
    /// Active applications in registration order.
    applications: IndexMap<ApplicationId, ApplicationDescriptor>,
    application_addresses: HashMap<EndpointAddress, ApplicationId>,
    /// Active drivers in submission order.
    drivers: IndexMap<DriverId, DriverDescriptor>,
    /// Drivers not yet placed on a worker, oldest first.
    waiting_drivers: VecDeque<DriverId>,
    completed_applications: VecDeque<ApplicationDescriptor>,
    completed_drivers: VecDeque<DriverDescriptor>,
    next_application_number: usize,
    next_driver_number: usize,
}

impl MasterState {
    pub fn new() -> Self {
        Self {
            status: MasterStatus::Standby,
            workers: IndexMap::new(),
            worker_addresses: HashMap::new(),
            applications: IndexMap::new(),
            application_addresses: HashMap::new(),
            drivers: IndexMap::new(),
            waiting_drivers: VecDeque::new(),
            completed_applications: VecDeque::new(),
            completed_drivers: VecDeque::new(),
            next_application_number: 0,
            next_driver_number: 0,
        }
    }

    pub fn next_application_id(&mut self, now: DateTime<Utc>) -> ApplicationId {
        let number = self.next_application_number;
        self.next_application_number += 1;
        ApplicationId::from(format!("app-{}-{number:04}", now.format("%Y%m%d%H%M%S")))
    }

    pub fn next_driver_id(&mut self, now: DateTime<Utc>) -> DriverId {
        let number = self.next_driver_number;
        self.next_driver_number += 1;
        DriverId::from(format!("driver-{}-{number:04}", now.format("%Y%m%d%H%M%S")))
    }

    pub fn add_worker(&mut self, worker_id: WorkerId, descriptor: WorkerDescriptor) {
        self.worker_addresses
            .insert(descriptor.address(), worker_id.clone());
        self.workers.insert(worker_id, descriptor);
    }

    /// Removes dead workers that were registered at the given advertised
    /// address, making room for a replacement worker on the same host.
    pub fn purge_dead_workers_at(&mut self, host: &str, port: u16) -> Vec<WorkerId> {
        let purged: Vec<_> = self
            .workers
            .iter()
            .filter(|(_, w)| w.state == WorkerState::Dead && w.host == host && w.port == port)
            .map(|(id, _)| id.clone())
            .collect();
        for worker_id in &purged {
            self.workers.shift_remove(worker_id);
        }
        purged
    }

    pub fn worker_id_at(&self, address: &EndpointAddress) -> Option<&WorkerId> {
        self.worker_addresses.get(address)
    }

    pub fn get_worker(&self, worker_id: &WorkerId) -> Option<&WorkerDescriptor> {
        self.workers.get(worker_id)
    }

    pub fn get_worker_mut(&mut self, worker_id: &WorkerId) -> Option<&mut WorkerDescriptor> {
        self.workers.get_mut(worker_id)
    }

    pub fn workers(&self) -> impl Iterator<Item = (&WorkerId, &WorkerDescriptor)> {
        self.workers.iter()
    }

    /// Marks a worker as dead and forgets its transport address.
    /// The descriptor is retained so that a late heartbeat can be answered
    /// with a reconnection request.
    pub fn mark_worker_dead(&mut self, worker_id: &WorkerId) {
        let Some(worker) = self.workers.get_mut(worker_id) else {
            warn!("worker {worker_id} not found");
            return;
        };
        worker.state = WorkerState::Dead;
        self.worker_addresses.remove(&worker.address());
    }

    pub fn remove_worker(&mut self, worker_id: &WorkerId) -> Option<WorkerDescriptor> {
        let worker = self.workers.shift_remove(worker_id)?;
        self.worker_addresses.remove(&worker.address());
        Some(worker)
    }

    pub fn add_application(&mut self, descriptor: ApplicationDescriptor) {
        self.application_addresses
            .insert(descriptor.address(), descriptor.id.clone());
        self.applications.insert(descriptor.id.clone(), descriptor);
    }

    pub fn application_id_at(&self, address: &EndpointAddress) -> Option<&ApplicationId> {
        self.application_addresses.get(address)
    }

    pub fn get_application(
        &self,
        application_id: &ApplicationId,
    ) -> Option<&ApplicationDescriptor> {
        self.applications.get(application_id)
    }

    pub fn get_application_mut(
        &mut self,
        application_id: &ApplicationId,
    ) -> Option<&mut ApplicationDescriptor> {
        self.applications.get_mut(application_id)
    }

    pub fn applications(
        &self,
    ) -> impl Iterator<Item = (&ApplicationId, &ApplicationDescriptor)> {
        self.applications.iter()
    }

    pub fn application_ids(&self) -> Vec<ApplicationId> {
        self.applications.keys().cloned().collect()
    }

    /// Removes an application from the active set, keeping the FIFO order
    /// of the remaining applications.
    pub fn take_application(
        &mut self,
        application_id: &ApplicationId,
    ) -> Option<ApplicationDescriptor> {
        let descriptor = self.applications.shift_remove(application_id)?;
        self.application_addresses.remove(&descriptor.address());
        Some(descriptor)
    }

    pub fn archive_application(&mut self, descriptor: ApplicationDescriptor, retained: usize) {
        trim_history(&mut self.completed_applications, retained);
        self.completed_applications.push_back(descriptor);
    }

    pub fn add_driver(&mut self, descriptor: DriverDescriptor) {
        self.drivers.insert(descriptor.id.clone(), descriptor);
    }

    pub fn get_driver(&self, driver_id: &DriverId) -> Option<&DriverDescriptor> {
        self.drivers.get(driver_id)
    }

    pub fn drivers(&self) -> impl Iterator<Item = (&DriverId, &DriverDescriptor)> {
        self.drivers.iter()
    }

    pub fn take_driver(&mut self, driver_id: &DriverId) -> Option<DriverDescriptor> {
        self.drivers.shift_remove(driver_id)
    }

    pub fn archive_driver(&mut self, descriptor: DriverDescriptor, retained: usize) {
        trim_history(&mut self.completed_drivers, retained);
        self.completed_drivers.push_back(descriptor);
    }

    pub fn find_completed_driver(&self, driver_id: &DriverId) -> Option<&DriverDescriptor> {
        self.completed_drivers.iter().find(|x| &x.id == driver_id)
    }

    pub fn push_waiting_driver(&mut self, driver_id: DriverId) {
        self.waiting_drivers.push_back(driver_id);
    }

    pub fn remove_waiting_driver(&mut self, driver_id: &DriverId) -> bool {
        if let Some(position) = self.waiting_drivers.iter().position(|x| x == driver_id) {
            self.waiting_drivers.remove(position);
            true
        } else {
            false
        }
    }

    pub fn waiting_driver_ids(&self) -> Vec<DriverId> {
        self.waiting_drivers.iter().cloned().collect()
    }

    /// Creates an executor for the application on the worker and updates
    /// the resource bookkeeping on both sides.
    pub fn attach_executor(
        &mut self,
        application_id: &ApplicationId,
        worker_id: &WorkerId,
        cores: usize,
    ) -> ClusterResult<ExecutorKey> {
        if !self.workers.contains_key(worker_id) {
            return Err(ClusterError::internal(format!(
                "worker {worker_id} not found"
            )));
        }
        let Some(application) = self.applications.get_mut(application_id) else {
            return Err(ClusterError::internal(format!(
                "application {application_id} not found"
            )));
        };
        let memory_mb = application.description.memory_per_executor_mb;
        let executor_id = application.next_executor_id()?;
        application.executors.insert(
            executor_id,
            ExecutorDescriptor {
                worker_id: worker_id.clone(),
                cores,
                memory_mb,
                state: ExecutorState::Launching,
            },
        );
        application.cores_granted += cores;
        let key = ExecutorKey::new(application_id.clone(), executor_id);
        if let Some(worker) = self.workers.get_mut(worker_id) {
            worker.executors.insert(key.clone());
            worker.cores_used += cores;
            worker.memory_used_mb += memory_mb;
        }
        Ok(key)
    }

    /// Re-creates an executor reported by a worker during recovery, keeping
    /// the executor ID chosen before the master restart.
    pub fn restore_executor(
        &mut self,
        key: &ExecutorKey,
        worker_id: &WorkerId,
        cores: usize,
    ) -> ClusterResult<()> {
        if !self.workers.contains_key(worker_id) {
            return Err(ClusterError::internal(format!(
                "worker {worker_id} not found"
            )));
        }
        let Some(application) = self.applications.get_mut(&key.application_id) else {
            return Err(ClusterError::internal(format!(
                "application {} not found",
                key.application_id
            )));
        };
        let memory_mb = application.description.memory_per_executor_mb;
        application.note_executor_id(key.executor_id)?;
        application.executors.insert(
            key.executor_id,
            ExecutorDescriptor {
                worker_id: worker_id.clone(),
                cores,
                memory_mb,
                state: ExecutorState::Running,
            },
        );
        application.cores_granted += cores;
        if let Some(worker) = self.workers.get_mut(worker_id) {
            worker.executors.insert(key.clone());
            worker.cores_used += cores;
            worker.memory_used_mb += memory_mb;
        }
        Ok(())
    }

    /// Removes an executor from its application and releases its resources
    /// on the worker.
    pub fn detach_executor(&mut self, key: &ExecutorKey) -> Option<ExecutorDescriptor> {
        let application = self.applications.get_mut(&key.application_id)?;
        let descriptor = application.executors.remove(&key.executor_id)?;
        application.cores_granted = application.cores_granted.saturating_sub(descriptor.cores);
        self.detach_executor_from_worker(
            &descriptor.worker_id,
            key,
            descriptor.cores,
            descriptor.memory_mb,
        );
        Some(descriptor)
    }

    /// Releases executor resources on the worker side only. This is used
    /// when the application side has already been dropped.
    pub fn detach_executor_from_worker(
        &mut self,
        worker_id: &WorkerId,
        key: &ExecutorKey,
        cores: usize,
        memory_mb: usize,
    ) {
        let Some(worker) = self.workers.get_mut(worker_id) else {
            // The worker may have been purged before its executors.
            return;
        };
        if worker.executors.remove(key) {
            worker.cores_used = worker.cores_used.saturating_sub(cores);
            worker.memory_used_mb = worker.memory_used_mb.saturating_sub(memory_mb);
        }
    }

    /// Places a driver on a worker and updates the resource bookkeeping.
    pub fn attach_driver(
        &mut self,
        driver_id: &DriverId,
        worker_id: &WorkerId,
    ) -> ClusterResult<()> {
        let Some(driver) = self.drivers.get_mut(driver_id) else {
            return Err(ClusterError::internal(format!(
                "driver {driver_id} not found"
            )));
        };
        let Some(worker) = self.workers.get_mut(worker_id) else {
            return Err(ClusterError::internal(format!(
                "worker {worker_id} not found"
            )));
        };
        worker.drivers.insert(driver_id.clone());
        worker.cores_used += driver.description.cores;
        worker.memory_used_mb += driver.description.memory_mb;
        driver.worker_id = Some(worker_id.clone());
        driver.state = DriverState::Running;
        Ok(())
    }

    /// Releases driver resources on its worker, if any.
    pub fn release_driver_from_worker(&mut self, driver_id: &DriverId, driver: &DriverDescriptor) {
        let Some(worker_id) = &driver.worker_id else {
            return;
        };
        let Some(worker) = self.workers.get_mut(worker_id) else {
            return;
        };
        if worker.drivers.remove(driver_id) {
            worker.cores_used = worker.cores_used.saturating_sub(driver.description.cores);
            worker.memory_used_mb = worker
                .memory_used_mb
                .saturating_sub(driver.description.memory_mb);
        }
    }

    pub fn snapshot(&self, url: String, host: String, port: u16) -> MasterStateSnapshot {
        MasterStateSnapshot {
            url,
            host,
            port,
            status: self.status,
            workers: {
                let mut workers: Vec<_> = self
                    .workers
                    .iter()
                    .map(|(id, w)| WorkerSnapshot {
                        id: id.clone(),
                        host: w.host.clone(),
                        port: w.port,
                        ui_port: w.ui_port,
                        public_address: w.public_address.clone(),
                        state: w.state,
                        cores: w.cores,
                        cores_used: w.cores_used,
                        memory_mb: w.memory_mb,
                        memory_used_mb: w.memory_used_mb,
                    })
                    .collect();
                workers.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
                workers
            },
            applications: self
                .applications
                .values()
                .map(application_snapshot)
                .collect(),
            completed_applications: self
                .completed_applications
                .iter()
                .map(application_snapshot)
                .collect(),
            drivers: self.drivers.values().map(driver_snapshot).collect(),
            completed_drivers: self.completed_drivers.iter().map(driver_snapshot).collect(),
        }
    }
}

impl Default for MasterState {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_history<T>(history: &mut VecDeque<T>, retained: usize) {
    if history.len() >= retained {
        let chunk = std::cmp::max(retained / 10, 1).min(history.len());
        history.drain(..chunk);
    }
}

fn application_snapshot(a: &ApplicationDescriptor) -> ApplicationSnapshot {
    let mut executors: Vec<_> = a
        .executors
        .iter()
        .map(|(executor_id, e)| ExecutorSnapshot {
            executor_id: *executor_id,
            worker_id: e.worker_id.clone(),
            cores: e.cores,
            memory_mb: e.memory_mb,
            state: e.state,
        })
        .collect();
    executors.sort_by_key(|x| x.executor_id);
    ApplicationSnapshot {
        id: a.id.clone(),
        name: a.description.name.clone(),
        state: a.state,
        cores_granted: a.cores_granted,
        executors,
        submitted_at: a.submitted_at,
        completed_at: a.completed_at,
    }
}

fn driver_snapshot(d: &DriverDescriptor) -> DriverSnapshot {
    DriverSnapshot {
        id: d.id.clone(),
        state: d.state,
        worker_id: d.worker_id.clone(),
        submitted_at: d.submitted_at,
        completed_at: d.completed_at,
        exception: d.exception.clone(),
    }
}

/// A point-in-time view of the master state, safe to send across threads
/// and serialize for operational tooling.
#[derive(Debug, Clone, Serialize)]
pub struct MasterStateSnapshot {
    pub url: String,
    pub host: String,
    pub port: u16,
    pub status: MasterStatus,
    pub workers: Vec<WorkerSnapshot>,
    pub applications: Vec<ApplicationSnapshot>,
    pub completed_applications: Vec<ApplicationSnapshot>,
    pub drivers: Vec<DriverSnapshot>,
    pub completed_drivers: Vec<DriverSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerSnapshot {
    pub id: WorkerId,
    pub host: String,
    pub port: u16,
    pub ui_port: u16,
    pub public_address: String,
    pub state: WorkerState,
    pub cores: usize,
    pub cores_used: usize,
    pub memory_mb: usize,
    pub memory_used_mb: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationSnapshot {
    pub id: ApplicationId,
    pub name: String,
    pub state: ApplicationState,
    pub cores_granted: usize,
    pub executors: Vec<ExecutorSnapshot>,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutorSnapshot {
    pub executor_id: ExecutorId,
    pub worker_id: WorkerId,
    pub cores: usize,
    pub memory_mb: usize,
    pub state: ExecutorState,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverSnapshot {
    pub id: DriverId,
    pub state: DriverState,
    pub worker_id: Option<WorkerId>,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub exception: Option<String>,
}
