use std::sync::Arc;

use async_trait::async_trait;
use keel_server::actor::{Actor, ActorAction, ActorContext, ActorHandle};
use log::{error, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::election::LeaderElectable;
use crate::master::event::MasterEvent;
use crate::master::options::MasterOptions;
use crate::master::state::MasterState;
use crate::persist::{create_persistence_engine, PersistenceEngine};

pub struct MasterActor {
    options: MasterOptions,
    pub(super) state: MasterState,
    pub(super) persistence: Arc<dyn PersistenceEngine>,
    pub(super) rng: ChaCha8Rng,
}

#[async_trait]
impl Actor for MasterActor {
    type Message = MasterEvent;
    type Options = MasterOptions;

    fn name() -> &'static str {
        "MasterActor"
    }

    fn new(options: MasterOptions) -> Self {
        let persistence = create_persistence_engine(
            &options.recovery_mode,
            &options.persistence_retry_strategy,
        );
        let rng = match options.shuffle_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };
        Self {
            options,
            state: MasterState::new(),
            persistence,
            rng,
        }
    }

    async fn start(&mut self, ctx: &mut ActorContext<Self>) {
        info!(
            "starting master at {}:{}",
            self.options.listen_host, self.options.listen_port
        );
        let electable: Arc<dyn LeaderElectable> = Arc::new(ElectionHook {
            handle: ctx.handle().clone(),
        });
        let agent = Arc::clone(&self.options.election_agent);
        ctx.spawn(async move {
            if let Err(e) = agent.start(electable).await {
                error!("failed to start the leader election agent: {e}");
            }
        });
        ctx.send_with_delay(MasterEvent::CheckWorkerTimeout, self.options.worker_timeout);
    }

    fn receive(&mut self, ctx: &mut ActorContext<Self>, message: MasterEvent) -> ActorAction {
        match message {
            MasterEvent::ElectedLeader => self.handle_elected_leader(ctx),
            MasterEvent::RevokedLeadership => self.handle_revoked_leadership(ctx),
            MasterEvent::RecoveryStateLoaded {
                workers,
                applications,
                drivers,
            } => self.handle_recovery_state_loaded(ctx, workers, applications, drivers),
            MasterEvent::CompleteRecovery => self.handle_complete_recovery(ctx),
            MasterEvent::CheckWorkerTimeout => self.handle_check_worker_timeout(ctx),
            MasterEvent::RegisterWorker {
                worker_id,
                host,
                port,
                ui_port,
                public_address,
                cores,
                memory_mb,
                endpoint,
            } => self.handle_register_worker(
                ctx,
                worker_id,
                host,
                port,
                ui_port,
                public_address,
                cores,
                memory_mb,
                endpoint,
            ),
            MasterEvent::RegisterApplication {
                description,
                endpoint,
            } => self.handle_register_application(ctx, description, endpoint),
            MasterEvent::Heartbeat { worker_id } => self.handle_heartbeat(ctx, worker_id),
            MasterEvent::ExecutorStateChanged {
                application_id,
                executor_id,
                state,
                message,
                exit_status,
            } => self.handle_executor_state_changed(
                ctx,
                application_id,
                executor_id,
                state,
                message,
                exit_status,
            ),
            MasterEvent::DriverStateChanged {
                driver_id,
                state,
                exception,
            } => self.handle_driver_state_changed(ctx, driver_id, state, exception),
            MasterEvent::WorkerSchedulerStateResponse {
                worker_id,
                executors,
                drivers,
            } => self.handle_worker_scheduler_state_response(ctx, worker_id, executors, drivers),
            MasterEvent::MasterChangeAcknowledged { application_id } => {
                self.handle_master_change_acknowledged(ctx, application_id)
            }
            MasterEvent::UnregisterApplication { application_id } => {
                self.handle_unregister_application(ctx, application_id)
            }
            MasterEvent::KillApplication { application_id } => {
                self.handle_kill_application(ctx, application_id)
            }
            MasterEvent::Disconnected { address } => self.handle_disconnected(ctx, address),
            MasterEvent::RequestSubmitDriver {
                description,
                result,
            } => self.handle_request_submit_driver(ctx, description, result),
            MasterEvent::RequestKillDriver { driver_id, result } => {
                self.handle_request_kill_driver(ctx, driver_id, result)
            }
            MasterEvent::RequestDriverStatus { driver_id, result } => {
                self.handle_request_driver_status(ctx, driver_id, result)
            }
            MasterEvent::RequestMasterState { result } => {
                self.handle_request_master_state(ctx, result)
            }
            MasterEvent::RequestBoundPorts { result } => {
                self.handle_request_bound_ports(ctx, result)
            }
            MasterEvent::RequestExecutors {
                application_id,
                executor_count,
                result,
            } => self.handle_request_executors(ctx, application_id, executor_count, result),
            MasterEvent::KillExecutors {
                application_id,
                executor_ids,
                result,
            } => self.handle_kill_executors(ctx, application_id, executor_ids, result),
            MasterEvent::Shutdown => ActorAction::Stop,
        }
    }

    async fn stop(self, _ctx: &mut ActorContext<Self>) {
        if let Err(e) = self.options.election_agent.stop().await {
            warn!("failed to stop the leader election agent: {e}");
        }
        info!("master has stopped");
    }
}

/// Forwards leadership changes from the election agent into the master
/// mailbox, so that they are processed in event order.
struct ElectionHook {
    handle: ActorHandle<MasterActor>,
}

#[async_trait]
impl LeaderElectable for ElectionHook {
    async fn elected_leader(&self) {
        let _ = self.handle.send(MasterEvent::ElectedLeader).await;
    }

    async fn revoked_leadership(&self) {
        let _ = self.handle.send(MasterEvent::RevokedLeadership).await;
    }
}

impl MasterActor {
    pub(super) fn options(&self) -> &MasterOptions {
        &self.options
    }

    pub(super) fn master_url(&self) -> String {
        self.options.url()
    }
}
