use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use keel_server::actor::{ActorAction, ActorContext};
use log::{debug, error, info, warn};
use tokio::sync::oneshot;

use crate::description::{ApplicationDescription, DriverDescription};
use crate::endpoint::{
    ApplicationEndpoint, ApplicationMessage, EndpointAddress, WorkerEndpoint, WorkerMessage,
};
use crate::id::{ApplicationId, DriverId, ExecutorId, ExecutorKey, WorkerId};
use crate::master::actor::MasterActor;
use crate::master::event::{
    BoundPortsResponse, DriverStatusResponse, KillDriverResponse, MasterEvent,
    SubmitDriverResponse,
};
use crate::master::state::{
    ApplicationDescriptor, ApplicationState, DriverDescriptor, DriverState, ExecutorDescriptor,
    ExecutorState, MasterStateSnapshot, MasterStatus, WorkerDescriptor, WorkerState,
};
use crate::persist::{ApplicationRecord, DriverRecord, WorkerRecord};

/// Worker IDs become file names in persisted state, so they are restricted
/// to a safe character set.
fn is_valid_worker_id(worker_id: &WorkerId) -> bool {
    !worker_id.as_str().is_empty()
        && worker_id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl MasterActor {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn handle_register_worker(
        &mut self,
        ctx: &mut ActorContext<Self>,
        worker_id: WorkerId,
        host: String,
        port: u16,
        ui_port: u16,
        public_address: String,
        cores: usize,
        memory_mb: usize,
        endpoint: Arc<dyn WorkerEndpoint>,
    ) -> ActorAction {
        info!("worker {worker_id} at {host}:{port} is trying to register");
        if self.state.status == MasterStatus::Standby {
            self.send_to_worker_endpoint(
                ctx,
                endpoint,
                WorkerMessage::RegisterWorkerFailed {
                    message: "the master is in standby mode".to_string(),
                },
            );
            return ActorAction::Continue;
        }
        if !is_valid_worker_id(&worker_id) {
            self.send_to_worker_endpoint(
                ctx,
                endpoint,
                WorkerMessage::RegisterWorkerFailed {
                    message: format!("invalid worker ID: {worker_id}"),
                },
            );
            return ActorAction::Continue;
        }
        match self.state.get_worker(&worker_id).map(|worker| worker.state) {
            Some(WorkerState::Dead) => {
                // A worker that restarted after being evicted may keep its ID.
                self.state.remove_worker(&worker_id);
            }
            Some(_) => {
                self.send_to_worker_endpoint(
                    ctx,
                    endpoint,
                    WorkerMessage::RegisterWorkerFailed {
                        message: format!("duplicate worker ID: {worker_id}"),
                    },
                );
                return ActorAction::Continue;
            }
            None => (),
        }
        for purged in self.state.purge_dead_workers_at(&host, port) {
            info!("removed dead worker {purged} at {host}:{port} to make room for a new worker");
        }
        let address = endpoint.address();
        if let Some(existing) = self.state.worker_id_at(&address).cloned() {
            let unknown = self
                .state
                .get_worker(&existing)
                .is_some_and(|w| w.state == WorkerState::Unknown);
            if unknown {
                // A worker that restarted before reporting for recovery
                // registers with a new ID from the old address.
                self.remove_worker(
                    ctx,
                    &existing,
                    "it was replaced by a new worker at the same address",
                );
            } else {
                warn!("worker registration rejected: address {address} is used by {existing}");
                self.send_to_worker_endpoint(
                    ctx,
                    endpoint,
                    WorkerMessage::RegisterWorkerFailed {
                        message: format!(
                            "attempted to re-register worker at same address: {address}"
                        ),
                    },
                );
                return ActorAction::Continue;
            }
        }
        let descriptor = WorkerDescriptor::new(
            host.clone(),
            port,
            ui_port,
            public_address.clone(),
            cores,
            memory_mb,
            Arc::clone(&endpoint),
        );
        self.state.add_worker(worker_id.clone(), descriptor);
        info!(
            "registered worker {worker_id} at {host}:{port} \
             with {cores} cores and {memory_mb} MB of memory"
        );
        self.persist_worker(
            ctx,
            WorkerRecord {
                id: worker_id,
                host,
                port,
                ui_port,
                public_address,
                cores,
                memory_mb,
                address,
            },
        );
        self.send_to_worker_endpoint(
            ctx,
            endpoint,
            WorkerMessage::RegisteredWorker {
                master_url: self.master_url(),
            },
        );
        self.schedule(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_register_application(
        &mut self,
        ctx: &mut ActorContext<Self>,
        mut description: ApplicationDescription,
        endpoint: Arc<dyn ApplicationEndpoint>,
    ) -> ActorAction {
        if self.state.status == MasterStatus::Standby {
            // The application keeps looking for an active master, so there
            // is no reply to send here.
            debug!("ignoring application registration while in standby mode");
            return ActorAction::Continue;
        }
        let address = endpoint.address();
        if let Some(existing) = self.state.application_id_at(&address) {
            return ActorAction::warn(format!(
                "attempted to re-register application at same address {address} as {existing}"
            ));
        }
        if description.cores_per_executor == Some(0) {
            // A zero-core executor can never be granted; the scheduler
            // would spin handing out empty quanta.
            warn!(
                "application {} requested zero cores per executor; \
                 treating the executor size as unspecified",
                description.name
            );
            description.cores_per_executor = None;
        }
        info!("registering application {}", description.name);
        let now = Utc::now();
        let application_id = self.state.next_application_id(now);
        let record = ApplicationRecord {
            id: application_id.clone(),
            description: description.clone(),
            submitted_at: now,
            address,
        };
        let descriptor = ApplicationDescriptor::new(
            application_id.clone(),
            description,
            now,
            Arc::clone(&endpoint),
            self.options().default_cores,
        );
        self.state.add_application(descriptor);
        info!("registered application {application_id}");
        self.persist_application(ctx, record);
        self.send_to_application(
            ctx,
            &application_id,
            ApplicationMessage::RegisteredApplication {
                application_id: application_id.clone(),
                master_url: self.master_url(),
            },
        );
        self.schedule(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_heartbeat(
        &mut self,
        ctx: &mut ActorContext<Self>,
        worker_id: WorkerId,
    ) -> ActorAction {
        let master_url = self.master_url();
        match self.state.get_worker_mut(&worker_id) {
            Some(worker) if worker.state != WorkerState::Dead => {
                worker.last_heartbeat = Instant::now();
                ActorAction::Continue
            }
            Some(worker) => {
                let endpoint = Arc::clone(&worker.endpoint);
                let id = worker_id.clone();
                ctx.spawn(async move {
                    if let Err(e) = endpoint
                        .send(WorkerMessage::ReconnectWorker { master_url })
                        .await
                    {
                        warn!("failed to ask worker {id} to reconnect: {e}");
                    }
                });
                ActorAction::warn(format!(
                    "got heartbeat from dead worker {worker_id}; asking it to re-register"
                ))
            }
            None => ActorAction::warn(format!(
                "got heartbeat from unregistered worker {worker_id}; \
                 this worker was never registered, so ignoring the heartbeat"
            )),
        }
    }

    pub(super) fn handle_check_worker_timeout(
        &mut self,
        ctx: &mut ActorContext<Self>,
    ) -> ActorAction {
        ctx.send_with_delay(MasterEvent::CheckWorkerTimeout, self.options().worker_timeout);
        let timeout = self.options().worker_timeout;
        let reaper_timeout = timeout * (self.options().reaper_iterations as u32 + 1);
        let now = Instant::now();
        let mut timed_out = Vec::new();
        let mut reaped = Vec::new();
        for (worker_id, worker) in self.state.workers() {
            let elapsed = now.saturating_duration_since(worker.last_heartbeat);
            match worker.state {
                WorkerState::Dead => {
                    if elapsed > reaper_timeout {
                        reaped.push(worker_id.clone());
                    }
                }
                _ => {
                    if elapsed > timeout {
                        timed_out.push(worker_id.clone());
                    }
                }
            }
        }
        for worker_id in timed_out {
            warn!(
                "removing worker {worker_id} because we got no heartbeat in {} seconds",
                timeout.as_secs()
            );
            self.remove_worker(ctx, &worker_id, "it stopped sending heartbeats");
        }
        for worker_id in reaped {
            info!("dropping dead worker {worker_id} from the worker list");
            self.state.remove_worker(&worker_id);
        }
        ActorAction::Continue
    }

    pub(super) fn handle_executor_state_changed(
        &mut self,
        ctx: &mut ActorContext<Self>,
        application_id: ApplicationId,
        executor_id: ExecutorId,
        state: ExecutorState,
        message: Option<String>,
        exit_status: Option<i32>,
    ) -> ActorAction {
        let key = ExecutorKey::new(application_id.clone(), executor_id);
        {
            let Some(application) = self.state.get_application_mut(&application_id) else {
                return ActorAction::warn(format!(
                    "got status update {state} for executor {key} of unknown application"
                ));
            };
            let Some(executor) = application.executors.get_mut(&executor_id) else {
                return ActorAction::warn(format!(
                    "got status update for unknown executor {key}"
                ));
            };
            executor.state = state;
            if state == ExecutorState::Running {
                application.retry_count = 0;
            }
        }
        self.send_to_application(
            ctx,
            &application_id,
            ApplicationMessage::ExecutorUpdated {
                executor_id,
                state,
                message,
                exit_status,
            },
        );
        if state.is_finished() {
            info!("removing executor {key} because it is {state}");
            self.state.detach_executor(&key);
            if exit_status != Some(0) {
                let max_retries = self.options().max_executor_retries;
                if let Some(application) = self.state.get_application_mut(&application_id) {
                    application.retry_count += 1;
                    let retries = application.retry_count;
                    let exhausted = max_retries >= 0
                        && retries >= max_retries as usize
                        && !application.has_running_executor();
                    if exhausted {
                        error!(
                            "application {application_id} failed {retries} times; removing it"
                        );
                        self.remove_application(ctx, &application_id, ApplicationState::Failed);
                    }
                }
            }
            self.schedule(ctx);
        }
        ActorAction::Continue
    }

    pub(super) fn handle_driver_state_changed(
        &mut self,
        ctx: &mut ActorContext<Self>,
        driver_id: DriverId,
        state: DriverState,
        exception: Option<String>,
    ) -> ActorAction {
        if !state.is_terminal() {
            return ActorAction::warn(format!(
                "received unexpected state update for driver {driver_id}: {state}"
            ));
        }
        self.remove_driver(ctx, &driver_id, state, exception);
        ActorAction::Continue
    }

    pub(super) fn handle_unregister_application(
        &mut self,
        ctx: &mut ActorContext<Self>,
        application_id: ApplicationId,
    ) -> ActorAction {
        info!("received unregister request from application {application_id}");
        self.remove_application(ctx, &application_id, ApplicationState::Finished);
        ActorAction::Continue
    }

    pub(super) fn handle_kill_application(
        &mut self,
        ctx: &mut ActorContext<Self>,
        application_id: ApplicationId,
    ) -> ActorAction {
        if self.state.get_application(&application_id).is_none() {
            return ActorAction::warn(format!(
                "asked to kill unknown application {application_id}"
            ));
        }
        info!("killing application {application_id}");
        self.remove_application(ctx, &application_id, ApplicationState::Killed);
        ActorAction::Continue
    }

    pub(super) fn handle_disconnected(
        &mut self,
        ctx: &mut ActorContext<Self>,
        address: EndpointAddress,
    ) -> ActorAction {
        info!("{address} got disassociated, removing it");
        if let Some(worker_id) = self.state.worker_id_at(&address).cloned() {
            self.remove_worker(ctx, &worker_id, "its endpoint got disassociated");
        }
        if let Some(application_id) = self.state.application_id_at(&address).cloned() {
            self.remove_application(ctx, &application_id, ApplicationState::Finished);
        }
        if self.state.status == MasterStatus::Recovering && self.can_complete_recovery() {
            self.complete_recovery(ctx);
        }
        ActorAction::Continue
    }

    pub(super) fn handle_request_submit_driver(
        &mut self,
        ctx: &mut ActorContext<Self>,
        description: DriverDescription,
        result: oneshot::Sender<SubmitDriverResponse>,
    ) -> ActorAction {
        let response = if self.state.status != MasterStatus::Alive {
            SubmitDriverResponse {
                success: false,
                driver_id: None,
                message: format!(
                    "can only accept driver submissions in ALIVE state; current state is {}",
                    self.state.status
                ),
            }
        } else {
            let now = Utc::now();
            let driver_id = self.state.next_driver_id(now);
            info!(
                "driver {driver_id} submitted with command {}",
                description.command.program
            );
            let record = DriverRecord {
                id: driver_id.clone(),
                description: description.clone(),
                submitted_at: now,
            };
            self.state
                .add_driver(DriverDescriptor::new(driver_id.clone(), description, now));
            self.state.push_waiting_driver(driver_id.clone());
            self.persist_driver(ctx, record);
            self.schedule(ctx);
            SubmitDriverResponse {
                success: true,
                driver_id: Some(driver_id.clone()),
                message: format!("driver successfully submitted as {driver_id}"),
            }
        };
        let _ = result.send(response);
        ActorAction::Continue
    }

    pub(super) fn handle_request_kill_driver(
        &mut self,
        ctx: &mut ActorContext<Self>,
        driver_id: DriverId,
        result: oneshot::Sender<KillDriverResponse>,
    ) -> ActorAction {
        let response = if self.state.status != MasterStatus::Alive {
            KillDriverResponse {
                driver_id,
                success: false,
                message: format!(
                    "can only kill drivers in ALIVE state; current state is {}",
                    self.state.status
                ),
            }
        } else if self.state.get_driver(&driver_id).is_some() {
            info!("asked to kill driver {driver_id}");
            if self.state.remove_waiting_driver(&driver_id) {
                // The driver has not been launched yet, so the master can
                // finish it on its own.
                ctx.send(MasterEvent::DriverStateChanged {
                    driver_id: driver_id.clone(),
                    state: DriverState::Killed,
                    exception: None,
                });
            } else {
                let worker_id = self
                    .state
                    .get_driver(&driver_id)
                    .and_then(|d| d.worker_id.clone());
                if let Some(worker_id) = worker_id {
                    self.send_to_worker(
                        ctx,
                        &worker_id,
                        WorkerMessage::KillDriver {
                            driver_id: driver_id.clone(),
                        },
                    );
                }
            }
            KillDriverResponse {
                driver_id: driver_id.clone(),
                success: true,
                message: format!("kill request for driver {driver_id} submitted"),
            }
        } else if self.state.find_completed_driver(&driver_id).is_some() {
            KillDriverResponse {
                driver_id: driver_id.clone(),
                success: false,
                message: format!("driver {driver_id} has already finished or failed"),
            }
        } else {
            KillDriverResponse {
                driver_id: driver_id.clone(),
                success: false,
                message: format!("driver {driver_id} not found"),
            }
        };
        let _ = result.send(response);
        ActorAction::Continue
    }

    pub(super) fn handle_request_driver_status(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        driver_id: DriverId,
        result: oneshot::Sender<DriverStatusResponse>,
    ) -> ActorAction {
        let response = if self.state.status != MasterStatus::Alive {
            DriverStatusResponse {
                found: false,
                state: None,
                worker_id: None,
                worker_host_port: None,
                exception: Some(format!(
                    "can only request driver status in ALIVE state; current state is {}",
                    self.state.status
                )),
            }
        } else if let Some(driver) = self
            .state
            .get_driver(&driver_id)
            .or_else(|| self.state.find_completed_driver(&driver_id))
        {
            let worker_host_port = driver
                .worker_id
                .as_ref()
                .and_then(|worker_id| self.state.get_worker(worker_id))
                .map(|worker| format!("{}:{}", worker.host, worker.port));
            DriverStatusResponse {
                found: true,
                state: Some(driver.state),
                worker_id: driver.worker_id.clone(),
                worker_host_port,
                exception: driver.exception.clone(),
            }
        } else {
            DriverStatusResponse {
                found: false,
                state: None,
                worker_id: None,
                worker_host_port: None,
                exception: None,
            }
        };
        let _ = result.send(response);
        ActorAction::Continue
    }

    pub(super) fn handle_request_master_state(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        result: oneshot::Sender<MasterStateSnapshot>,
    ) -> ActorAction {
        let snapshot = self.state.snapshot(
            self.master_url(),
            self.options().external_host.clone(),
            self.options().advertised_port(),
        );
        let _ = result.send(snapshot);
        ActorAction::Continue
    }

    pub(super) fn handle_request_bound_ports(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        result: oneshot::Sender<BoundPortsResponse>,
    ) -> ActorAction {
        let _ = result.send(BoundPortsResponse {
            url: self.master_url(),
            port: self.options().listen_port,
        });
        ActorAction::Continue
    }

    pub(super) fn handle_request_executors(
        &mut self,
        ctx: &mut ActorContext<Self>,
        application_id: ApplicationId,
        executor_count: usize,
        result: oneshot::Sender<bool>,
    ) -> ActorAction {
        let granted = if self.state.status != MasterStatus::Alive {
            false
        } else if let Some(application) = self.state.get_application_mut(&application_id) {
            info!("application {application_id} requested {executor_count} total executors");
            application.executor_limit = executor_count;
            true
        } else {
            warn!("unknown application {application_id} requested executors");
            false
        };
        if granted {
            self.schedule(ctx);
        }
        let _ = result.send(granted);
        ActorAction::Continue
    }

    pub(super) fn handle_kill_executors(
        &mut self,
        ctx: &mut ActorContext<Self>,
        application_id: ApplicationId,
        executor_ids: Vec<ExecutorId>,
        result: oneshot::Sender<bool>,
    ) -> ActorAction {
        let done = if self.state.status != MasterStatus::Alive {
            false
        } else if self.state.get_application(&application_id).is_some() {
            let list = executor_ids
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            info!("application {application_id} requests to kill executors: {list}");
            let mut known = Vec::new();
            for executor_id in executor_ids {
                let exists = self
                    .state
                    .get_application(&application_id)
                    .is_some_and(|a| a.executors.contains_key(&executor_id));
                if exists {
                    known.push(executor_id);
                } else {
                    warn!(
                        "application {application_id} attempted to kill \
                         non-existent executor {executor_id}"
                    );
                }
            }
            if let Some(application) = self.state.get_application_mut(&application_id) {
                application.executor_limit =
                    application.executor_limit.saturating_sub(known.len());
            }
            for executor_id in known {
                let key = ExecutorKey::new(application_id.clone(), executor_id);
                self.kill_executor(ctx, &key);
            }
            self.schedule(ctx);
            true
        } else {
            warn!("unregistered application {application_id} requested to kill executors");
            false
        };
        let _ = result.send(done);
        ActorAction::Continue
    }

    fn kill_executor(&mut self, ctx: &mut ActorContext<Self>, key: &ExecutorKey) {
        let Some(executor) = self.state.detach_executor(key) else {
            return;
        };
        info!("telling worker {} to kill executor {key}", executor.worker_id);
        self.send_to_worker(
            ctx,
            &executor.worker_id,
            WorkerMessage::KillExecutor {
                master_url: self.master_url(),
                application_id: key.application_id.clone(),
                executor_id: key.executor_id,
            },
        );
    }

    /// Marks a worker as dead, releases everything it was running, and
    /// reacts to the loss of its executors and drivers.
    pub(super) fn remove_worker(
        &mut self,
        ctx: &mut ActorContext<Self>,
        worker_id: &WorkerId,
        reason: &str,
    ) {
        let Some(worker) = self.state.get_worker(worker_id) else {
            warn!("cannot remove unknown worker {worker_id}");
            return;
        };
        info!(
            "removing worker {worker_id} on {}:{} because {reason}",
            worker.host, worker.port
        );
        let executor_keys: Vec<ExecutorKey> = worker.executors.iter().cloned().collect();
        let driver_ids: Vec<DriverId> = worker.drivers.iter().cloned().collect();
        self.state.mark_worker_dead(worker_id);
        for key in executor_keys {
            self.send_to_application(
                ctx,
                &key.application_id,
                ApplicationMessage::ExecutorUpdated {
                    executor_id: key.executor_id,
                    state: ExecutorState::Lost,
                    message: Some(format!("worker {worker_id} was lost")),
                    exit_status: None,
                },
            );
            self.state.detach_executor(&key);
        }
        for driver_id in driver_ids {
            let supervise = self
                .state
                .get_driver(&driver_id)
                .is_some_and(|d| d.description.supervise);
            if supervise {
                self.relaunch_driver(ctx, &driver_id);
            } else {
                info!("not re-launching driver {driver_id} because it was not supervised");
                self.remove_driver(ctx, &driver_id, DriverState::Error, None);
            }
        }
        self.unpersist_worker(ctx, worker_id.clone());
    }

    /// Takes an application out of the active set, kills its executors,
    /// and archives it with the given final state.
    pub(super) fn remove_application(
        &mut self,
        ctx: &mut ActorContext<Self>,
        application_id: &ApplicationId,
        final_state: ApplicationState,
    ) {
        let Some(mut application) = self.state.take_application(application_id) else {
            return;
        };
        info!("removing application {application_id}");
        let executors: Vec<(ExecutorId, ExecutorDescriptor)> =
            application.executors.drain().collect();
        for (executor_id, executor) in executors {
            let key = ExecutorKey::new(application_id.clone(), executor_id);
            self.state.detach_executor_from_worker(
                &executor.worker_id,
                &key,
                executor.cores,
                executor.memory_mb,
            );
            self.send_to_worker(
                ctx,
                &executor.worker_id,
                WorkerMessage::KillExecutor {
                    master_url: self.master_url(),
                    application_id: application_id.clone(),
                    executor_id,
                },
            );
        }
        application.state = final_state;
        application.completed_at = Some(Utc::now());
        if final_state != ApplicationState::Finished {
            let endpoint = Arc::clone(&application.endpoint);
            let message = ApplicationMessage::ApplicationRemoved {
                message: final_state.to_string(),
            };
            ctx.spawn(async move {
                if let Err(e) = endpoint.send(message).await {
                    warn!("failed to notify the application of its removal: {e}");
                }
            });
        }
        self.state
            .archive_application(application, self.options().retained_applications);
        self.unpersist_application(ctx, application_id.clone());
        self.schedule(ctx);
        let endpoints: Vec<Arc<dyn WorkerEndpoint>> = self
            .state
            .workers()
            .filter(|(_, w)| w.is_alive())
            .map(|(_, w)| Arc::clone(&w.endpoint))
            .collect();
        let application_id = application_id.clone();
        ctx.spawn(async move {
            let sends = endpoints.iter().map(|endpoint| {
                endpoint.send(WorkerMessage::ApplicationFinished {
                    application_id: application_id.clone(),
                })
            });
            for out in join_all(sends).await {
                if let Err(e) = out {
                    warn!("failed to notify a worker of the finished application: {e}");
                }
            }
        });
    }

    pub(super) fn remove_driver(
        &mut self,
        ctx: &mut ActorContext<Self>,
        driver_id: &DriverId,
        final_state: DriverState,
        exception: Option<String>,
    ) {
        let Some(mut driver) = self.state.take_driver(driver_id) else {
            warn!("asked to remove unknown driver {driver_id}");
            return;
        };
        info!("removing driver {driver_id} in state {final_state}");
        self.state.remove_waiting_driver(driver_id);
        self.state.release_driver_from_worker(driver_id, &driver);
        driver.state = final_state;
        driver.completed_at = Some(Utc::now());
        driver.exception = exception;
        self.state
            .archive_driver(driver, self.options().retained_drivers);
        self.unpersist_driver(ctx, driver_id.clone());
        self.schedule(ctx);
    }

    /// Archives a driver that lost its worker and resubmits its command
    /// under a fresh driver ID.
    pub(super) fn relaunch_driver(&mut self, ctx: &mut ActorContext<Self>, driver_id: &DriverId) {
        let Some(mut driver) = self.state.take_driver(driver_id) else {
            warn!("asked to re-launch unknown driver {driver_id}");
            return;
        };
        self.state.remove_waiting_driver(driver_id);
        self.state.release_driver_from_worker(driver_id, &driver);
        let description = driver.description.clone();
        let now = Utc::now();
        driver.state = DriverState::Relaunching;
        driver.completed_at = Some(now);
        self.state
            .archive_driver(driver, self.options().retained_drivers);
        self.unpersist_driver(ctx, driver_id.clone());
        let new_driver_id = self.state.next_driver_id(now);
        info!("re-launching driver {driver_id} as {new_driver_id}");
        let record = DriverRecord {
            id: new_driver_id.clone(),
            description: description.clone(),
            submitted_at: now,
        };
        self.state
            .add_driver(DriverDescriptor::new(new_driver_id.clone(), description, now));
        self.state.push_waiting_driver(new_driver_id);
        self.persist_driver(ctx, record);
        self.schedule(ctx);
    }

    pub(super) fn send_to_worker(
        &self,
        ctx: &mut ActorContext<Self>,
        worker_id: &WorkerId,
        message: WorkerMessage,
    ) {
        let Some(worker) = self.state.get_worker(worker_id) else {
            warn!("cannot send message to unknown worker {worker_id}");
            return;
        };
        self.send_to_worker_endpoint(ctx, Arc::clone(&worker.endpoint), message);
    }

    pub(super) fn send_to_worker_endpoint(
        &self,
        ctx: &mut ActorContext<Self>,
        endpoint: Arc<dyn WorkerEndpoint>,
        message: WorkerMessage,
    ) {
        ctx.spawn(async move {
            let address = endpoint.address();
            if let Err(e) = endpoint.send(message).await {
                warn!("failed to send message to worker at {address}: {e}");
            }
        });
    }

    pub(super) fn send_to_application(
        &self,
        ctx: &mut ActorContext<Self>,
        application_id: &ApplicationId,
        message: ApplicationMessage,
    ) {
        let Some(application) = self.state.get_application(application_id) else {
            warn!("cannot send message to unknown application {application_id}");
            return;
        };
        let endpoint = Arc::clone(&application.endpoint);
        let application_id = application_id.clone();
        ctx.spawn(async move {
            if let Err(e) = endpoint.send(message).await {
                warn!("failed to send message to application {application_id}: {e}");
            }
        });
    }

    pub(super) fn persist_worker(&self, ctx: &mut ActorContext<Self>, record: WorkerRecord) {
        let persistence = Arc::clone(&self.persistence);
        ctx.spawn(async move {
            if let Err(e) = persistence.add_worker(&record).await {
                error!("failed to persist worker {}: {e}", record.id);
            }
        });
    }

    pub(super) fn unpersist_worker(&self, ctx: &mut ActorContext<Self>, worker_id: WorkerId) {
        let persistence = Arc::clone(&self.persistence);
        ctx.spawn(async move {
            if let Err(e) = persistence.remove_worker(&worker_id).await {
                error!("failed to remove worker {worker_id} from persisted state: {e}");
            }
        });
    }

    pub(super) fn persist_application(
        &self,
        ctx: &mut ActorContext<Self>,
        record: ApplicationRecord,
    ) {
        let persistence = Arc::clone(&self.persistence);
        ctx.spawn(async move {
            if let Err(e) = persistence.add_application(&record).await {
                error!("failed to persist application {}: {e}", record.id);
            }
        });
    }

    pub(super) fn unpersist_application(
        &self,
        ctx: &mut ActorContext<Self>,
        application_id: ApplicationId,
    ) {
        let persistence = Arc::clone(&self.persistence);
        ctx.spawn(async move {
            if let Err(e) = persistence.remove_application(&application_id).await {
                error!(
                    "failed to remove application {application_id} from persisted state: {e}"
                );
            }
        });
    }

    pub(super) fn persist_driver(&self, ctx: &mut ActorContext<Self>, record: DriverRecord) {
        let persistence = Arc::clone(&self.persistence);
        ctx.spawn(async move {
            if let Err(e) = persistence.add_driver(&record).await {
                error!("failed to persist driver {}: {e}", record.id);
            }
        });
    }

    pub(super) fn unpersist_driver(&self, ctx: &mut ActorContext<Self>, driver_id: DriverId) {
        let persistence = Arc::clone(&self.persistence);
        ctx.spawn(async move {
            if let Err(e) = persistence.remove_driver(&driver_id).await {
                error!("failed to remove driver {driver_id} from persisted state: {e}");
            }
        });
    }
}
