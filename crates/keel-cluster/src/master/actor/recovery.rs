use std::sync::Arc;
use std::time::Instant;

use keel_server::actor::{ActorAction, ActorContext};
use log::{debug, error, info, warn};

use crate::endpoint::{ApplicationMessage, WorkerMessage};
use crate::id::{ApplicationId, DriverId, ExecutorKey, WorkerId};
use crate::master::actor::MasterActor;
use crate::master::event::{ExecutorReport, MasterEvent, RecoveredApplication, RecoveredWorker};
use crate::master::state::{
    ApplicationDescriptor, ApplicationState, DriverDescriptor, DriverState, MasterStatus,
    WorkerDescriptor, WorkerState,
};
use crate::persist::{DriverRecord, PersistedState};

impl MasterActor {
    /// Reads persisted state off the actor thread and posts the result
    /// back as an event. The master stays in standby until the state has
    /// been loaded.
    pub(super) fn handle_elected_leader(&mut self, ctx: &mut ActorContext<Self>) -> ActorAction {
        if self.state.status != MasterStatus::Standby {
            return ActorAction::warn(format!(
                "ignoring leader election while in state {}",
                self.state.status
            ));
        }
        info!("this master has been elected leader; reading persisted state");
        let persistence = Arc::clone(&self.persistence);
        let provider = self.options().endpoint_provider.clone();
        let handle = ctx.handle().clone();
        ctx.spawn(async move {
            let data = match persistence.read_persisted_data().await {
                Ok(data) => data,
                Err(e) => {
                    error!("failed to read persisted state: {e}");
                    PersistedState::default()
                }
            };
            let mut workers = Vec::new();
            let mut applications = Vec::new();
            if provider.is_none() && !(data.workers.is_empty() && data.applications.is_empty()) {
                warn!(
                    "no endpoint provider is configured; \
                     persisted workers and applications cannot be contacted"
                );
            }
            if let Some(provider) = &provider {
                for record in data.workers {
                    match provider.worker_endpoint(&record.address).await {
                        Ok(endpoint) => workers.push(RecoveredWorker { record, endpoint }),
                        Err(e) => warn!(
                            "failed to resolve endpoint for persisted worker {}: {e}",
                            record.id
                        ),
                    }
                }
                for record in data.applications {
                    match provider.application_endpoint(&record.address).await {
                        Ok(endpoint) => {
                            applications.push(RecoveredApplication { record, endpoint })
                        }
                        Err(e) => warn!(
                            "failed to resolve endpoint for persisted application {}: {e}",
                            record.id
                        ),
                    }
                }
            }
            let _ = handle
                .send(MasterEvent::RecoveryStateLoaded {
                    workers,
                    applications,
                    drivers: data.drivers,
                })
                .await;
        });
        ActorAction::Continue
    }

    pub(super) fn handle_revoked_leadership(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> ActorAction {
        error!("leadership has been revoked; master shutting down");
        ActorAction::Stop
    }

    pub(super) fn handle_recovery_state_loaded(
        &mut self,
        ctx: &mut ActorContext<Self>,
        workers: Vec<RecoveredWorker>,
        applications: Vec<RecoveredApplication>,
        drivers: Vec<DriverRecord>,
    ) -> ActorAction {
        if self.state.status != MasterStatus::Standby {
            return ActorAction::warn(format!(
                "ignoring recovered state while in state {}",
                self.state.status
            ));
        }
        if workers.is_empty() && applications.is_empty() && drivers.is_empty() {
            self.state.status = MasterStatus::Alive;
            info!(
                "no persisted state to recover; master state is now {}",
                self.state.status
            );
            return ActorAction::Continue;
        }
        self.state.status = MasterStatus::Recovering;
        info!("master state is now {}", self.state.status);
        self.begin_recovery(ctx, workers, applications, drivers);
        ctx.send_with_delay(MasterEvent::CompleteRecovery, self.options().recovery_timeout);
        ActorAction::Continue
    }

    /// Re-registers persisted entities in the unknown state and asks them
    /// to report back to the new master.
    fn begin_recovery(
        &mut self,
        ctx: &mut ActorContext<Self>,
        workers: Vec<RecoveredWorker>,
        applications: Vec<RecoveredApplication>,
        drivers: Vec<DriverRecord>,
    ) {
        let master_url = self.master_url();
        for RecoveredApplication { record, endpoint } in applications {
            info!("trying to recover application {}", record.id);
            let mut descriptor = ApplicationDescriptor::new(
                record.id.clone(),
                record.description,
                record.submitted_at,
                endpoint,
                self.options().default_cores,
            );
            descriptor.state = ApplicationState::Unknown;
            self.state.add_application(descriptor);
            self.send_to_application(
                ctx,
                &record.id,
                ApplicationMessage::MasterChanged {
                    master_url: master_url.clone(),
                },
            );
        }
        for record in drivers {
            info!("trying to recover driver {}", record.id);
            self.state.add_driver(DriverDescriptor::new(
                record.id,
                record.description,
                record.submitted_at,
            ));
        }
        for RecoveredWorker { record, endpoint } in workers {
            info!("trying to recover worker {}", record.id);
            let mut descriptor = WorkerDescriptor::new(
                record.host,
                record.port,
                record.ui_port,
                record.public_address,
                record.cores,
                record.memory_mb,
                endpoint,
            );
            descriptor.state = WorkerState::Unknown;
            self.state.add_worker(record.id.clone(), descriptor);
            self.send_to_worker(
                ctx,
                &record.id,
                WorkerMessage::MasterChanged {
                    master_url: master_url.clone(),
                },
            );
        }
    }

    pub(super) fn handle_master_change_acknowledged(
        &mut self,
        ctx: &mut ActorContext<Self>,
        application_id: ApplicationId,
    ) -> ActorAction {
        match self.state.get_application_mut(&application_id) {
            Some(application) => {
                info!("application {application_id} has acknowledged the new master");
                application.state = ApplicationState::Waiting;
            }
            None => {
                return ActorAction::warn(format!(
                    "master change acknowledged by unknown application {application_id}"
                ))
            }
        }
        if self.state.status == MasterStatus::Recovering && self.can_complete_recovery() {
            self.complete_recovery(ctx);
        }
        ActorAction::Continue
    }

    pub(super) fn handle_worker_scheduler_state_response(
        &mut self,
        ctx: &mut ActorContext<Self>,
        worker_id: WorkerId,
        executors: Vec<ExecutorReport>,
        drivers: Vec<DriverId>,
    ) -> ActorAction {
        {
            let Some(worker) = self.state.get_worker_mut(&worker_id) else {
                return ActorAction::warn(format!(
                    "scheduler state received from unknown worker {worker_id}"
                ));
            };
            info!("worker has been re-registered: {worker_id}");
            worker.state = WorkerState::Alive;
            worker.last_heartbeat = Instant::now();
        }
        for report in executors {
            let key = ExecutorKey::new(report.application_id.clone(), report.executor_id);
            if self.state.get_application(&report.application_id).is_none() {
                warn!("worker {worker_id} reported executor {key} of an unknown application");
                continue;
            }
            match self.state.restore_executor(&key, &worker_id, report.cores) {
                Ok(()) => debug!("recovered executor {key} on worker {worker_id}"),
                Err(e) => warn!("failed to restore executor {key}: {e}"),
            }
        }
        for driver_id in drivers {
            if self.state.get_driver(&driver_id).is_some() {
                debug!("recovered driver {driver_id} on worker {worker_id}");
                if let Err(e) = self.state.attach_driver(&driver_id, &worker_id) {
                    warn!("failed to restore driver {driver_id}: {e}");
                }
            } else {
                warn!("worker {worker_id} reported unknown driver {driver_id}");
            }
        }
        if self.state.status == MasterStatus::Recovering && self.can_complete_recovery() {
            self.complete_recovery(ctx);
        }
        ActorAction::Continue
    }

    pub(super) fn handle_complete_recovery(&mut self, ctx: &mut ActorContext<Self>) -> ActorAction {
        self.complete_recovery(ctx);
        ActorAction::Continue
    }

    /// Recovery can complete once every persisted worker and application
    /// has either reported back or been removed.
    pub(super) fn can_complete_recovery(&self) -> bool {
        self.state
            .workers()
            .all(|(_, w)| w.state != WorkerState::Unknown)
            && self
                .state
                .applications()
                .all(|(_, a)| a.state != ApplicationState::Unknown)
    }

    pub(super) fn complete_recovery(&mut self, ctx: &mut ActorContext<Self>) {
        // The recovery timer may fire after recovery has already completed.
        if self.state.status != MasterStatus::Recovering {
            return;
        }
        self.state.status = MasterStatus::CompletingRecovery;
        let unknown_workers: Vec<WorkerId> = self
            .state
            .workers()
            .filter(|(_, w)| w.state == WorkerState::Unknown)
            .map(|(id, _)| id.clone())
            .collect();
        let unknown_applications: Vec<ApplicationId> = self
            .state
            .applications()
            .filter(|(_, a)| a.state == ApplicationState::Unknown)
            .map(|(id, _)| id.clone())
            .collect();
        for worker_id in unknown_workers {
            self.remove_worker(ctx, &worker_id, "it did not respond for recovery");
        }
        for application_id in unknown_applications {
            info!("removing application {application_id} because it did not respond for recovery");
            self.remove_application(ctx, &application_id, ApplicationState::Finished);
        }
        for application_id in self.state.application_ids() {
            if let Some(application) = self.state.get_application_mut(&application_id) {
                if application.state == ApplicationState::Waiting {
                    application.state = ApplicationState::Running;
                }
            }
        }
        let orphaned: Vec<DriverId> = self
            .state
            .drivers()
            .filter(|(_, d)| d.worker_id.is_none())
            .map(|(id, _)| id.clone())
            .collect();
        for driver_id in orphaned {
            warn!("driver {driver_id} was not found after master recovery");
            let supervise = self
                .state
                .get_driver(&driver_id)
                .is_some_and(|d| d.description.supervise);
            if supervise {
                self.relaunch_driver(ctx, &driver_id);
            } else {
                warn!("did not re-launch driver {driver_id} because it was not supervised");
                self.remove_driver(ctx, &driver_id, DriverState::Error, None);
            }
        }
        self.state.status = MasterStatus::Alive;
        info!("recovery complete; master state is now {}", self.state.status);
        self.schedule(ctx);
    }
}
