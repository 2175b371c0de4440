mod actor;
mod event;
mod options;
pub(crate) mod state;

use std::sync::Arc;

use keel_server::actor::{ActorHandle, ActorSystem};
use tokio::sync::oneshot;

use crate::description::{ApplicationDescription, DriverDescription};
use crate::endpoint::{ApplicationEndpoint, EndpointAddress, WorkerEndpoint};
use crate::error::{ClusterError, ClusterResult};
use crate::id::{ApplicationId, DriverId, ExecutorId, WorkerId};
use crate::master::actor::MasterActor;
use crate::master::event::MasterEvent;

pub use crate::master::event::{
    BoundPortsResponse, DriverStatusResponse, ExecutorReport, KillDriverResponse,
    SubmitDriverResponse,
};
pub use crate::master::options::MasterOptions;
pub use crate::master::state::{
    ApplicationSnapshot, ApplicationState, DriverSnapshot, DriverState, ExecutorSnapshot,
    ExecutorState, MasterStateSnapshot, MasterStatus, WorkerSnapshot, WorkerState,
};

/// A running master instance.
///
/// The master runs as an actor on the current tokio runtime and owns all
/// cluster state. Transport adapters translate wire messages into calls on
/// this handle, and the replies the master sends to workers and
/// applications go through their registered endpoints.
pub struct Master {
    system: ActorSystem,
    handle: ActorHandle<MasterActor>,
}

impl Master {
    pub fn new(options: MasterOptions) -> Self {
        let mut system = ActorSystem::new();
        let handle = system.spawn::<MasterActor>(options);
        Self { system, handle }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn register_worker(
        &self,
        worker_id: WorkerId,
        host: String,
        port: u16,
        ui_port: u16,
        public_address: String,
        cores: usize,
        memory_mb: usize,
        endpoint: Arc<dyn WorkerEndpoint>,
    ) -> ClusterResult<()> {
        Ok(self
            .handle
            .send(MasterEvent::RegisterWorker {
                worker_id,
                host,
                port,
                ui_port,
                public_address,
                cores,
                memory_mb,
                endpoint,
            })
            .await?)
    }

    pub async fn register_application(
        &self,
        description: ApplicationDescription,
        endpoint: Arc<dyn ApplicationEndpoint>,
    ) -> ClusterResult<()> {
        Ok(self
            .handle
            .send(MasterEvent::RegisterApplication {
                description,
                endpoint,
            })
            .await?)
    }

    pub async fn heartbeat(&self, worker_id: WorkerId) -> ClusterResult<()> {
        Ok(self.handle.send(MasterEvent::Heartbeat { worker_id }).await?)
    }

    pub async fn executor_state_changed(
        &self,
        application_id: ApplicationId,
        executor_id: ExecutorId,
        state: ExecutorState,
        message: Option<String>,
        exit_status: Option<i32>,
    ) -> ClusterResult<()> {
        Ok(self
            .handle
            .send(MasterEvent::ExecutorStateChanged {
                application_id,
                executor_id,
                state,
                message,
                exit_status,
            })
            .await?)
    }

    pub async fn driver_state_changed(
        &self,
        driver_id: DriverId,
        state: DriverState,
        exception: Option<String>,
    ) -> ClusterResult<()> {
        Ok(self
            .handle
            .send(MasterEvent::DriverStateChanged {
                driver_id,
                state,
                exception,
            })
            .await?)
    }

    /// Delivers a worker's response to a master change, listing the
    /// executors and drivers it still runs.
    pub async fn worker_scheduler_state_response(
        &self,
        worker_id: WorkerId,
        executors: Vec<ExecutorReport>,
        drivers: Vec<DriverId>,
    ) -> ClusterResult<()> {
        Ok(self
            .handle
            .send(MasterEvent::WorkerSchedulerStateResponse {
                worker_id,
                executors,
                drivers,
            })
            .await?)
    }

    pub async fn master_change_acknowledged(
        &self,
        application_id: ApplicationId,
    ) -> ClusterResult<()> {
        Ok(self
            .handle
            .send(MasterEvent::MasterChangeAcknowledged { application_id })
            .await?)
    }

    pub async fn unregister_application(&self, application_id: ApplicationId) -> ClusterResult<()> {
        Ok(self
            .handle
            .send(MasterEvent::UnregisterApplication { application_id })
            .await?)
    }

    /// Kills an application outright, releasing its executors.
    pub async fn kill_application(&self, application_id: ApplicationId) -> ClusterResult<()> {
        Ok(self
            .handle
            .send(MasterEvent::KillApplication { application_id })
            .await?)
    }

    /// Reports that a remote endpoint went away. The master removes the
    /// worker or application registered at the address.
    pub async fn disconnected(&self, address: EndpointAddress) -> ClusterResult<()> {
        Ok(self.handle.send(MasterEvent::Disconnected { address }).await?)
    }

    pub async fn submit_driver(
        &self,
        description: DriverDescription,
    ) -> ClusterResult<SubmitDriverResponse> {
        let (tx, rx) = oneshot::channel();
        self.request(
            MasterEvent::RequestSubmitDriver {
                description,
                result: tx,
            },
            rx,
        )
        .await
    }

    pub async fn kill_driver(&self, driver_id: DriverId) -> ClusterResult<KillDriverResponse> {
        let (tx, rx) = oneshot::channel();
        self.request(
            MasterEvent::RequestKillDriver {
                driver_id,
                result: tx,
            },
            rx,
        )
        .await
    }

    pub async fn driver_status(&self, driver_id: DriverId) -> ClusterResult<DriverStatusResponse> {
        let (tx, rx) = oneshot::channel();
        self.request(
            MasterEvent::RequestDriverStatus {
                driver_id,
                result: tx,
            },
            rx,
        )
        .await
    }

    pub async fn master_state(&self) -> ClusterResult<MasterStateSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.request(MasterEvent::RequestMasterState { result: tx }, rx)
            .await
    }

    pub async fn bound_ports(&self) -> ClusterResult<BoundPortsResponse> {
        let (tx, rx) = oneshot::channel();
        self.request(MasterEvent::RequestBoundPorts { result: tx }, rx)
            .await
    }

    /// Adjusts the total number of executors an application wants.
    pub async fn request_executors(
        &self,
        application_id: ApplicationId,
        executor_count: usize,
    ) -> ClusterResult<bool> {
        let (tx, rx) = oneshot::channel();
        self.request(
            MasterEvent::RequestExecutors {
                application_id,
                executor_count,
                result: tx,
            },
            rx,
        )
        .await
    }

    pub async fn kill_executors(
        &self,
        application_id: ApplicationId,
        executor_ids: Vec<ExecutorId>,
    ) -> ClusterResult<bool> {
        let (tx, rx) = oneshot::channel();
        self.request(
            MasterEvent::KillExecutors {
                application_id,
                executor_ids,
                result: tx,
            },
            rx,
        )
        .await
    }

    pub async fn stop(&self) -> ClusterResult<()> {
        Ok(self.handle.send(MasterEvent::Shutdown).await?)
    }

    /// Waits until the master actor has stopped and closed its mailbox.
    pub async fn wait_for_stop(&self) {
        self.handle.wait_for_stop().await;
    }

    /// Waits for the background tasks of the master to finish.
    pub async fn join(&mut self) {
        self.system.join().await;
    }

    async fn request<R>(
        &self,
        event: MasterEvent,
        receiver: oneshot::Receiver<R>,
    ) -> ClusterResult<R> {
        self.handle.send(event).await?;
        receiver
            .await
            .map_err(|e| ClusterError::internal(format!("no response from the master: {e}")))
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "tests use unwrap for brevity")]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::*;
    use crate::description::Command;
    use crate::election::{LeaderElectable, LeaderElectionAgent, SingleLeaderAgent};
    use crate::endpoint::{ApplicationMessage, EndpointProvider, WorkerMessage};
    use crate::persist::RecoveryMode;
    use keel_server::RetryStrategy;

    struct TestWorkerEndpoint {
        address: EndpointAddress,
        sender: mpsc::UnboundedSender<WorkerMessage>,
    }

    #[async_trait]
    impl WorkerEndpoint for TestWorkerEndpoint {
        fn address(&self) -> EndpointAddress {
            self.address.clone()
        }

        async fn send(&self, message: WorkerMessage) -> ClusterResult<()> {
            Ok(self.sender.send(message)?)
        }
    }

    struct TestApplicationEndpoint {
        address: EndpointAddress,
        sender: mpsc::UnboundedSender<ApplicationMessage>,
    }

    #[async_trait]
    impl ApplicationEndpoint for TestApplicationEndpoint {
        fn address(&self) -> EndpointAddress {
            self.address.clone()
        }

        async fn send(&self, message: ApplicationMessage) -> ClusterResult<()> {
            Ok(self.sender.send(message)?)
        }
    }

    struct TestEndpointProvider {
        workers: HashMap<EndpointAddress, Arc<dyn WorkerEndpoint>>,
        applications: HashMap<EndpointAddress, Arc<dyn ApplicationEndpoint>>,
    }

    #[async_trait]
    impl EndpointProvider for TestEndpointProvider {
        async fn worker_endpoint(
            &self,
            address: &EndpointAddress,
        ) -> ClusterResult<Arc<dyn WorkerEndpoint>> {
            self.workers
                .get(address)
                .cloned()
                .ok_or_else(|| ClusterError::internal(format!("no worker at {address}")))
        }

        async fn application_endpoint(
            &self,
            address: &EndpointAddress,
        ) -> ClusterResult<Arc<dyn ApplicationEndpoint>> {
            self.applications
                .get(address)
                .cloned()
                .ok_or_else(|| ClusterError::internal(format!("no application at {address}")))
        }
    }

    /// An election backend that never elects a leader, keeping the master
    /// in standby.
    struct NeverElect;

    #[async_trait]
    impl LeaderElectionAgent for NeverElect {
        async fn start(&self, _electable: Arc<dyn LeaderElectable>) -> ClusterResult<()> {
            Ok(())
        }

        async fn stop(&self) -> ClusterResult<()> {
            Ok(())
        }
    }

    fn master_options() -> MasterOptions {
        MasterOptions {
            listen_host: "127.0.0.1".to_string(),
            listen_port: 7077,
            external_host: "127.0.0.1".to_string(),
            external_port: None,
            worker_timeout: Duration::from_secs(60),
            reaper_iterations: 15,
            retained_applications: 50,
            retained_drivers: 50,
            max_executor_retries: 10,
            spread_out_applications: true,
            default_cores: None,
            recovery_mode: RecoveryMode::None,
            recovery_timeout: Duration::from_secs(60),
            persistence_retry_strategy: RetryStrategy::Fixed {
                max_count: 2,
                delay: Duration::from_millis(1),
            },
            shuffle_seed: Some(17),
            election_agent: Arc::new(SingleLeaderAgent),
            endpoint_provider: None,
        }
    }

    fn application_description(
        max_cores: Option<usize>,
        cores_per_executor: Option<usize>,
        memory_per_executor_mb: usize,
    ) -> ApplicationDescription {
        ApplicationDescription {
            name: "analytics".to_string(),
            max_cores,
            memory_per_executor_mb,
            cores_per_executor,
            initial_executor_limit: None,
            command: Command::new("/opt/app/bin/main"),
        }
    }

    fn driver_description(cores: usize, memory_mb: usize, supervise: bool) -> DriverDescription {
        DriverDescription {
            cores,
            memory_mb,
            supervise,
            command: Command::new("/opt/app/bin/driver"),
        }
    }

    async fn recv<T>(messages: &mut mpsc::UnboundedReceiver<T>) -> T {
        timeout(Duration::from_secs(5), messages.recv())
            .await
            .unwrap()
            .unwrap()
    }

    async fn wait_until_alive(master: &Master) {
        for _ in 0..250 {
            if master.master_state().await.unwrap().status == MasterStatus::Alive {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("the master did not become alive");
    }

    struct TestWorker {
        id: WorkerId,
        address: EndpointAddress,
        endpoint: Arc<TestWorkerEndpoint>,
        messages: mpsc::UnboundedReceiver<WorkerMessage>,
    }

    async fn register_worker(
        master: &Master,
        n: u16,
        cores: usize,
        memory_mb: usize,
    ) -> TestWorker {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = WorkerId::from(format!("worker-{n}"));
        let address = EndpointAddress::new("10.0.0.1", 9000 + n);
        let endpoint = Arc::new(TestWorkerEndpoint {
            address: address.clone(),
            sender: tx,
        });
        master
            .register_worker(
                id.clone(),
                address.host.clone(),
                address.port,
                8081,
                address.host.clone(),
                cores,
                memory_mb,
                endpoint.clone(),
            )
            .await
            .unwrap();
        let mut worker = TestWorker {
            id,
            address,
            endpoint,
            messages: rx,
        };
        let message = recv(&mut worker.messages).await;
        assert!(matches!(message, WorkerMessage::RegisteredWorker { .. }));
        worker
    }

    struct TestApplication {
        id: ApplicationId,
        address: EndpointAddress,
        endpoint: Arc<TestApplicationEndpoint>,
        messages: mpsc::UnboundedReceiver<ApplicationMessage>,
    }

    async fn register_application(
        master: &Master,
        n: u16,
        description: ApplicationDescription,
    ) -> TestApplication {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let address = EndpointAddress::new("10.0.0.2", 4000 + n);
        let endpoint = Arc::new(TestApplicationEndpoint {
            address: address.clone(),
            sender: tx,
        });
        master
            .register_application(description, endpoint.clone())
            .await
            .unwrap();
        let message = recv(&mut rx).await;
        let ApplicationMessage::RegisteredApplication { application_id, .. } = message else {
            panic!("expected a registration confirmation");
        };
        TestApplication {
            id: application_id,
            address,
            endpoint,
            messages: rx,
        }
    }

    async fn expect_executor_added(application: &mut TestApplication) -> (ExecutorId, WorkerId) {
        let message = recv(&mut application.messages).await;
        let ApplicationMessage::ExecutorAdded {
            executor_id,
            worker_id,
            ..
        } = message
        else {
            panic!("expected an executor to be added");
        };
        (executor_id, worker_id)
    }

    #[tokio::test]
    async fn test_master_becomes_alive_and_reports_bound_ports() {
        let master = Master::new(master_options());
        wait_until_alive(&master).await;
        let ports = master.bound_ports().await.unwrap();
        assert_eq!(ports.url, "keel://127.0.0.1:7077");
        assert_eq!(ports.port, 7077);
        let state = master.master_state().await.unwrap();
        assert!(state.workers.is_empty());
        assert!(state.applications.is_empty());
        assert!(state.drivers.is_empty());
    }

    #[tokio::test]
    async fn test_master_stops_on_request() {
        let mut master = Master::new(master_options());
        wait_until_alive(&master).await;
        master.stop().await.unwrap();
        master.wait_for_stop().await;
        master.join().await;
        assert!(master.master_state().await.is_err());
    }

    #[tokio::test]
    async fn test_standby_master_rejects_cluster_operations() {
        let mut options = master_options();
        options.election_agent = Arc::new(NeverElect);
        let master = Master::new(options);

        let state = master.master_state().await.unwrap();
        assert_eq!(state.status, MasterStatus::Standby);

        let response = master
            .submit_driver(driver_description(1, 512, false))
            .await
            .unwrap();
        assert!(!response.success);
        assert!(response.message.contains("STANDBY"));

        let response = master.kill_driver(DriverId::from("driver-x")).await.unwrap();
        assert!(!response.success);

        let response = master.driver_status(DriverId::from("driver-x")).await.unwrap();
        assert!(!response.found);
        assert!(response.exception.is_some());

        let granted = master
            .request_executors(ApplicationId::from("app-x"), 2)
            .await
            .unwrap();
        assert!(!granted);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let endpoint = Arc::new(TestWorkerEndpoint {
            address: EndpointAddress::new("10.0.0.1", 9001),
            sender: tx,
        });
        master
            .register_worker(
                WorkerId::from("worker-1"),
                "10.0.0.1".to_string(),
                9001,
                8081,
                "10.0.0.1".to_string(),
                4,
                4096,
                endpoint,
            )
            .await
            .unwrap();
        let message = recv(&mut rx).await;
        let WorkerMessage::RegisterWorkerFailed { message } = message else {
            panic!("expected the registration to fail");
        };
        assert!(message.contains("standby"));
    }

    #[tokio::test]
    async fn test_conflicting_worker_registrations_are_rejected() {
        let master = Master::new(master_options());
        wait_until_alive(&master).await;
        let worker = register_worker(&master, 1, 4, 4096).await;

        // The same worker ID cannot be registered twice.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let endpoint = Arc::new(TestWorkerEndpoint {
            address: EndpointAddress::new("10.0.0.1", 9100),
            sender: tx,
        });
        master
            .register_worker(
                worker.id.clone(),
                "10.0.0.1".to_string(),
                9100,
                8081,
                "10.0.0.1".to_string(),
                4,
                4096,
                endpoint,
            )
            .await
            .unwrap();
        let message = recv(&mut rx).await;
        let WorkerMessage::RegisterWorkerFailed { message } = message else {
            panic!("expected the registration to fail");
        };
        assert!(message.contains("duplicate worker ID"));

        // Another worker cannot register from an address that is in use.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let endpoint = Arc::new(TestWorkerEndpoint {
            address: worker.address.clone(),
            sender: tx,
        });
        master
            .register_worker(
                WorkerId::from("worker-2"),
                worker.address.host.clone(),
                worker.address.port,
                8081,
                worker.address.host.clone(),
                4,
                4096,
                endpoint,
            )
            .await
            .unwrap();
        let message = recv(&mut rx).await;
        let WorkerMessage::RegisterWorkerFailed { message } = message else {
            panic!("expected the registration to fail");
        };
        assert!(message.contains("same address"));

        let state = master.master_state().await.unwrap();
        assert_eq!(state.workers.len(), 1);
        assert_eq!(state.workers[0].ui_port, 8081);
        assert_eq!(state.workers[0].public_address, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_a_dead_worker_can_register_again() {
        let mut options = master_options();
        options.worker_timeout = Duration::from_millis(200);
        let master = Master::new(options);
        wait_until_alive(&master).await;
        let worker = register_worker(&master, 1, 4, 4096).await;

        // The worker never sends a heartbeat, so it is marked dead but
        // lingers in the worker list until the reaper runs.
        for _ in 0..250 {
            let state = master.master_state().await.unwrap();
            if state.workers[0].state == WorkerState::Dead {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // The restarted worker registers with the same ID and address.
        let replacement = register_worker(&master, 1, 4, 4096).await;
        assert_eq!(replacement.id, worker.id);
        let state = master.master_state().await.unwrap();
        assert_eq!(state.workers.len(), 1);
        assert_eq!(state.workers[0].state, WorkerState::Alive);
    }

    #[tokio::test]
    async fn test_executors_spread_across_workers() {
        let master = Master::new(master_options());
        wait_until_alive(&master).await;
        let worker_1 = register_worker(&master, 1, 4, 8192).await;
        let worker_2 = register_worker(&master, 2, 2, 8192).await;

        let mut application =
            register_application(&master, 1, application_description(None, Some(2), 1024)).await;
        let mut placements = Vec::new();
        for _ in 0..3 {
            placements.push(expect_executor_added(&mut application).await);
        }
        assert_eq!(
            placements,
            vec![
                (ExecutorId::from(1), worker_1.id.clone()),
                (ExecutorId::from(2), worker_1.id.clone()),
                (ExecutorId::from(3), worker_2.id.clone()),
            ]
        );

        let state = master.master_state().await.unwrap();
        assert_eq!(state.applications[0].state, ApplicationState::Running);
        assert_eq!(state.applications[0].cores_granted, 6);
        assert_eq!(state.applications[0].executors.len(), 3);
        let worker_1_state = state.workers.iter().find(|w| w.id == worker_1.id).unwrap();
        let worker_2_state = state.workers.iter().find(|w| w.id == worker_2.id).unwrap();
        assert_eq!(worker_1_state.cores_used, 4);
        assert_eq!(worker_1_state.memory_used_mb, 2048);
        assert_eq!(worker_2_state.cores_used, 2);
        assert_eq!(worker_2_state.memory_used_mb, 1024);
    }

    #[tokio::test]
    async fn test_executors_stack_on_one_worker_when_spreading_is_disabled() {
        let mut options = master_options();
        options.spread_out_applications = false;
        let master = Master::new(options);
        wait_until_alive(&master).await;
        let worker_1 = register_worker(&master, 1, 4, 8192).await;
        let worker_2 = register_worker(&master, 2, 4, 8192).await;

        let mut application =
            register_application(&master, 1, application_description(Some(4), Some(2), 1024))
                .await;
        for _ in 0..2 {
            let (_, worker_id) = expect_executor_added(&mut application).await;
            assert_eq!(worker_id, worker_1.id);
        }

        let state = master.master_state().await.unwrap();
        assert_eq!(state.applications[0].cores_granted, 4);
        let worker_1_state = state.workers.iter().find(|w| w.id == worker_1.id).unwrap();
        let worker_2_state = state.workers.iter().find(|w| w.id == worker_2.id).unwrap();
        assert_eq!(worker_1_state.cores_used, 4);
        assert_eq!(worker_2_state.cores_used, 0);
    }

    #[tokio::test]
    async fn test_a_zero_core_executor_size_is_treated_as_unspecified() {
        let master = Master::new(master_options());
        wait_until_alive(&master).await;
        let _worker = register_worker(&master, 1, 4, 4096).await;
        let mut application =
            register_application(&master, 1, application_description(None, Some(0), 0)).await;

        // The master keeps serving and grants a single executor holding
        // all cores, as if no executor size had been given.
        let (executor_id, worker_id) = expect_executor_added(&mut application).await;
        assert_eq!(executor_id, ExecutorId::from(1));
        assert_eq!(worker_id, WorkerId::from("worker-1"));
        let state = master.master_state().await.unwrap();
        assert_eq!(state.applications[0].cores_granted, 4);
        assert_eq!(state.applications[0].executors.len(), 1);
    }

    #[tokio::test]
    async fn test_drivers_queue_until_resources_free() {
        let master = Master::new(master_options());
        wait_until_alive(&master).await;
        let mut worker = register_worker(&master, 1, 1, 1024).await;

        let first = master
            .submit_driver(driver_description(1, 512, false))
            .await
            .unwrap();
        assert!(first.success);
        let first_id = first.driver_id.unwrap();
        let message = recv(&mut worker.messages).await;
        let WorkerMessage::LaunchDriver { driver_id, .. } = message else {
            panic!("expected the driver to launch");
        };
        assert_eq!(driver_id, first_id);

        let second = master
            .submit_driver(driver_description(1, 512, false))
            .await
            .unwrap();
        assert!(second.success);
        let second_id = second.driver_id.unwrap();
        let state = master.master_state().await.unwrap();
        let waiting = state.drivers.iter().find(|d| d.id == second_id).unwrap();
        assert_eq!(waiting.state, DriverState::Submitted);
        assert_eq!(waiting.worker_id, None);

        // Finishing the first driver frees the core for the second one.
        master
            .driver_state_changed(first_id.clone(), DriverState::Finished, None)
            .await
            .unwrap();
        let message = recv(&mut worker.messages).await;
        let WorkerMessage::LaunchDriver { driver_id, .. } = message else {
            panic!("expected the second driver to launch");
        };
        assert_eq!(driver_id, second_id);

        let status = master.driver_status(first_id).await.unwrap();
        assert_eq!(status.state, Some(DriverState::Finished));
        let status = master.driver_status(second_id).await.unwrap();
        assert_eq!(status.state, Some(DriverState::Running));
        assert_eq!(status.worker_id, Some(worker.id.clone()));
        assert_eq!(status.worker_host_port.as_deref(), Some("10.0.0.1:9001"));
    }

    #[tokio::test]
    async fn test_supervised_driver_is_relaunched_when_the_worker_is_lost() {
        let master = Master::new(master_options());
        wait_until_alive(&master).await;
        let mut worker = register_worker(&master, 1, 1, 1024).await;

        let response = master
            .submit_driver(driver_description(1, 512, true))
            .await
            .unwrap();
        let old_id = response.driver_id.unwrap();
        let message = recv(&mut worker.messages).await;
        assert!(matches!(message, WorkerMessage::LaunchDriver { .. }));

        master.disconnected(worker.address.clone()).await.unwrap();
        let status = master.driver_status(old_id.clone()).await.unwrap();
        assert_eq!(status.state, Some(DriverState::Relaunching));

        let state = master.master_state().await.unwrap();
        assert_eq!(state.drivers.len(), 1);
        let new_id = state.drivers[0].id.clone();
        assert_ne!(new_id, old_id);
        assert_eq!(state.drivers[0].state, DriverState::Submitted);

        // A fresh worker picks up the relaunched driver.
        let mut replacement = register_worker(&master, 2, 1, 1024).await;
        let message = recv(&mut replacement.messages).await;
        let WorkerMessage::LaunchDriver { driver_id, .. } = message else {
            panic!("expected the relaunched driver to launch");
        };
        assert_eq!(driver_id, new_id);
        let status = master.driver_status(new_id).await.unwrap();
        assert_eq!(status.state, Some(DriverState::Running));
        assert_eq!(status.worker_id, Some(replacement.id.clone()));
    }

    #[tokio::test]
    async fn test_unsupervised_driver_dies_with_the_worker() {
        let master = Master::new(master_options());
        wait_until_alive(&master).await;
        let mut worker = register_worker(&master, 1, 1, 1024).await;

        let response = master
            .submit_driver(driver_description(1, 512, false))
            .await
            .unwrap();
        let driver_id = response.driver_id.unwrap();
        let message = recv(&mut worker.messages).await;
        assert!(matches!(message, WorkerMessage::LaunchDriver { .. }));

        master.disconnected(worker.address.clone()).await.unwrap();
        let status = master.driver_status(driver_id).await.unwrap();
        assert_eq!(status.state, Some(DriverState::Error));
        let state = master.master_state().await.unwrap();
        assert!(state.drivers.is_empty());
        assert_eq!(state.completed_drivers.len(), 1);
    }

    #[tokio::test]
    async fn test_lost_worker_executors_are_reported_and_the_worker_is_purged() {
        let mut options = master_options();
        options.worker_timeout = Duration::from_millis(200);
        options.reaper_iterations = 1;
        let master = Master::new(options);
        wait_until_alive(&master).await;
        let _worker = register_worker(&master, 1, 4, 4096).await;
        let mut application =
            register_application(&master, 1, application_description(Some(2), Some(2), 1024))
                .await;
        expect_executor_added(&mut application).await;

        // The worker never sends a heartbeat, so it times out.
        let message = recv(&mut application.messages).await;
        let ApplicationMessage::ExecutorUpdated { state, .. } = message else {
            panic!("expected the executor to be reported lost");
        };
        assert_eq!(state, ExecutorState::Lost);

        // Dead workers are purged from the worker list after a while.
        for _ in 0..250 {
            if master.master_state().await.unwrap().workers.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let state = master.master_state().await.unwrap();
        assert!(state.workers.is_empty());
        assert_eq!(state.applications[0].cores_granted, 0);
    }

    #[tokio::test]
    async fn test_heartbeats_keep_the_worker_alive() {
        let mut options = master_options();
        options.worker_timeout = Duration::from_millis(500);
        let master = Master::new(options);
        wait_until_alive(&master).await;
        let worker = register_worker(&master, 1, 4, 4096).await;

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            master.heartbeat(worker.id.clone()).await.unwrap();
        }
        let state = master.master_state().await.unwrap();
        assert_eq!(state.workers[0].state, WorkerState::Alive);
    }

    #[tokio::test]
    async fn test_executor_failures_remove_the_application_after_retries() {
        let mut options = master_options();
        options.max_executor_retries = 2;
        let master = Master::new(options);
        wait_until_alive(&master).await;
        let mut worker = register_worker(&master, 1, 4, 4096).await;
        let mut application =
            register_application(&master, 1, application_description(Some(2), Some(2), 1024))
                .await;

        for attempt in 1..=2 {
            let (executor_id, _) = expect_executor_added(&mut application).await;
            assert_eq!(executor_id, ExecutorId::from(attempt));
            master
                .executor_state_changed(
                    application.id.clone(),
                    executor_id,
                    ExecutorState::Failed,
                    Some("command exited with status 1".to_string()),
                    Some(1),
                )
                .await
                .unwrap();
            let message = recv(&mut application.messages).await;
            let ApplicationMessage::ExecutorUpdated { state, .. } = message else {
                panic!("expected the executor update to be forwarded");
            };
            assert_eq!(state, ExecutorState::Failed);
        }

        let message = recv(&mut application.messages).await;
        let ApplicationMessage::ApplicationRemoved { message } = message else {
            panic!("expected the application to be removed");
        };
        assert_eq!(message, "FAILED");

        // Workers are told to clean up after the removed application.
        let mut saw_application_finished = false;
        for _ in 0..3 {
            if let WorkerMessage::ApplicationFinished { application_id } =
                recv(&mut worker.messages).await
            {
                assert_eq!(application_id, application.id);
                saw_application_finished = true;
                break;
            }
        }
        assert!(saw_application_finished);

        let state = master.master_state().await.unwrap();
        assert!(state.applications.is_empty());
        assert_eq!(state.completed_applications.len(), 1);
        assert_eq!(
            state.completed_applications[0].state,
            ApplicationState::Failed
        );
    }

    #[tokio::test]
    async fn test_applications_grow_and_shrink_their_executors() {
        let master = Master::new(master_options());
        wait_until_alive(&master).await;
        let mut worker = register_worker(&master, 1, 4, 4096).await;
        let mut description = application_description(Some(4), Some(1), 1024);
        description.initial_executor_limit = Some(0);
        let mut application = register_application(&master, 1, description).await;

        let state = master.master_state().await.unwrap();
        assert!(state.applications[0].executors.is_empty());

        let granted = master.request_executors(application.id.clone(), 2).await.unwrap();
        assert!(granted);
        let (first, _) = expect_executor_added(&mut application).await;
        let (second, _) = expect_executor_added(&mut application).await;
        assert_eq!((first, second), (ExecutorId::from(1), ExecutorId::from(2)));

        let done = master
            .kill_executors(application.id.clone(), vec![first])
            .await
            .unwrap();
        assert!(done);
        let mut saw_kill = false;
        for _ in 0..4 {
            if let WorkerMessage::KillExecutor { executor_id, .. } =
                recv(&mut worker.messages).await
            {
                assert_eq!(executor_id, first);
                saw_kill = true;
                break;
            }
        }
        assert!(saw_kill);

        // The executor limit shrinks with the kill, so no replacement is
        // launched.
        let state = master.master_state().await.unwrap();
        assert_eq!(state.applications[0].executors.len(), 1);
        assert_eq!(state.applications[0].executors[0].executor_id, second);
    }

    #[tokio::test]
    async fn test_killing_waiting_and_running_drivers() {
        let master = Master::new(master_options());
        wait_until_alive(&master).await;
        let mut worker = register_worker(&master, 1, 1, 1024).await;

        let running = master
            .submit_driver(driver_description(1, 512, false))
            .await
            .unwrap()
            .driver_id
            .unwrap();
        let message = recv(&mut worker.messages).await;
        assert!(matches!(message, WorkerMessage::LaunchDriver { .. }));
        let waiting = master
            .submit_driver(driver_description(1, 512, false))
            .await
            .unwrap()
            .driver_id
            .unwrap();

        // A waiting driver is finished by the master itself.
        let response = master.kill_driver(waiting.clone()).await.unwrap();
        assert!(response.success);
        let status = master.driver_status(waiting.clone()).await.unwrap();
        assert_eq!(status.state, Some(DriverState::Killed));

        // A launched driver is killed through its worker.
        let response = master.kill_driver(running.clone()).await.unwrap();
        assert!(response.success);
        let message = recv(&mut worker.messages).await;
        let WorkerMessage::KillDriver { driver_id } = message else {
            panic!("expected a kill request for the driver");
        };
        assert_eq!(driver_id, running);
        master
            .driver_state_changed(running.clone(), DriverState::Killed, None)
            .await
            .unwrap();
        let status = master.driver_status(running).await.unwrap();
        assert_eq!(status.state, Some(DriverState::Killed));

        let state = master.master_state().await.unwrap();
        assert_eq!(state.workers[0].cores_used, 0);
        assert_eq!(state.completed_drivers.len(), 2);

        // Killing an already finished driver is reported as such.
        let response = master.kill_driver(waiting).await.unwrap();
        assert!(!response.success);
        assert!(response.message.contains("already finished"));
        let response = master.kill_driver(DriverId::from("driver-x")).await.unwrap();
        assert!(!response.success);
        assert!(response.message.contains("not found"));
    }

    #[tokio::test]
    async fn test_application_unregisters_cleanly() {
        let master = Master::new(master_options());
        wait_until_alive(&master).await;
        let mut worker = register_worker(&master, 1, 4, 4096).await;
        let mut application =
            register_application(&master, 1, application_description(Some(2), Some(2), 1024))
                .await;
        expect_executor_added(&mut application).await;

        master
            .unregister_application(application.id.clone())
            .await
            .unwrap();
        let mut saw_kill = false;
        let mut saw_finished = false;
        for _ in 0..4 {
            match recv(&mut worker.messages).await {
                WorkerMessage::KillExecutor { .. } => saw_kill = true,
                WorkerMessage::ApplicationFinished { .. } => {
                    saw_finished = true;
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_kill);
        assert!(saw_finished);

        let state = master.master_state().await.unwrap();
        assert!(state.applications.is_empty());
        assert_eq!(
            state.completed_applications[0].state,
            ApplicationState::Finished
        );
        assert_eq!(state.workers[0].cores_used, 0);
        assert_eq!(state.workers[0].memory_used_mb, 0);
    }

    #[tokio::test]
    async fn test_killing_an_application_releases_its_resources() {
        let master = Master::new(master_options());
        wait_until_alive(&master).await;
        let mut worker = register_worker(&master, 1, 4, 4096).await;
        let mut application =
            register_application(&master, 1, application_description(Some(2), Some(2), 1024))
                .await;
        expect_executor_added(&mut application).await;

        master
            .kill_application(application.id.clone())
            .await
            .unwrap();
        let message = recv(&mut application.messages).await;
        let ApplicationMessage::ApplicationRemoved { message } = message else {
            panic!("expected the application to be notified of its removal");
        };
        assert_eq!(message, "KILLED");
        let mut saw_kill = false;
        let mut saw_finished = false;
        for _ in 0..4 {
            match recv(&mut worker.messages).await {
                WorkerMessage::KillExecutor { .. } => saw_kill = true,
                WorkerMessage::ApplicationFinished { .. } => {
                    saw_finished = true;
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_kill);
        assert!(saw_finished);

        let state = master.master_state().await.unwrap();
        assert!(state.applications.is_empty());
        assert_eq!(
            state.completed_applications[0].state,
            ApplicationState::Killed
        );
        assert_eq!(state.workers[0].cores_used, 0);
        assert_eq!(state.workers[0].memory_used_mb, 0);
    }

    fn persisted_records(directory: &Path) -> usize {
        let Ok(entries) = std::fs::read_dir(directory) else {
            return 0;
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.metadata().map(|m| m.len() > 0).unwrap_or(false))
            .count()
    }

    async fn wait_for_persisted_records(directory: &Path, count: usize) {
        for _ in 0..250 {
            if persisted_records(directory) == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("persisted records did not appear in {}", directory.display());
    }

    #[tokio::test]
    async fn test_master_recovers_persisted_state_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let recovery_mode = RecoveryMode::Filesystem {
            directory: dir.path().to_path_buf(),
        };

        let mut options = master_options();
        options.recovery_mode = recovery_mode.clone();
        let master = Master::new(options);
        wait_until_alive(&master).await;

        let mut worker = register_worker(&master, 1, 4, 4096).await;
        let mut application =
            register_application(&master, 1, application_description(Some(2), Some(2), 1024))
                .await;
        expect_executor_added(&mut application).await;
        let message = recv(&mut worker.messages).await;
        assert!(matches!(message, WorkerMessage::LaunchExecutor { .. }));
        let driver_id = master
            .submit_driver(driver_description(1, 512, true))
            .await
            .unwrap()
            .driver_id
            .unwrap();
        let message = recv(&mut worker.messages).await;
        assert!(matches!(message, WorkerMessage::LaunchDriver { .. }));

        wait_for_persisted_records(dir.path(), 3).await;
        master.stop().await.unwrap();
        master.wait_for_stop().await;

        // A second master takes over from the persisted records.
        let provider = TestEndpointProvider {
            workers: HashMap::from([(
                worker.address.clone(),
                worker.endpoint.clone() as Arc<dyn WorkerEndpoint>,
            )]),
            applications: HashMap::from([(
                application.address.clone(),
                application.endpoint.clone() as Arc<dyn ApplicationEndpoint>,
            )]),
        };
        let mut options = master_options();
        options.recovery_mode = recovery_mode;
        options.endpoint_provider = Some(Arc::new(provider));
        let master = Master::new(options);

        let message = recv(&mut worker.messages).await;
        assert!(matches!(message, WorkerMessage::MasterChanged { .. }));
        let message = recv(&mut application.messages).await;
        assert!(matches!(message, ApplicationMessage::MasterChanged { .. }));

        master
            .worker_scheduler_state_response(
                worker.id.clone(),
                vec![ExecutorReport {
                    application_id: application.id.clone(),
                    executor_id: ExecutorId::from(1),
                    cores: 2,
                }],
                vec![driver_id.clone()],
            )
            .await
            .unwrap();
        master
            .master_change_acknowledged(application.id.clone())
            .await
            .unwrap();
        wait_until_alive(&master).await;

        let state = master.master_state().await.unwrap();
        assert_eq!(state.workers.len(), 1);
        assert_eq!(state.workers[0].state, WorkerState::Alive);
        assert_eq!(state.workers[0].cores_used, 3);
        assert_eq!(state.workers[0].memory_used_mb, 1536);
        assert_eq!(state.applications.len(), 1);
        assert_eq!(state.applications[0].id, application.id);
        assert_eq!(state.applications[0].state, ApplicationState::Running);
        assert_eq!(state.applications[0].executors.len(), 1);
        assert_eq!(
            state.applications[0].executors[0].state,
            ExecutorState::Running
        );
        assert_eq!(state.drivers.len(), 1);
        assert_eq!(state.drivers[0].id, driver_id);
        assert_eq!(state.drivers[0].state, DriverState::Running);
        assert_eq!(state.drivers[0].worker_id, Some(worker.id.clone()));
    }

    #[tokio::test]
    async fn test_recovery_evicts_unresponsive_workers() {
        let dir = tempfile::tempdir().unwrap();
        let recovery_mode = RecoveryMode::Filesystem {
            directory: dir.path().to_path_buf(),
        };

        let mut options = master_options();
        options.recovery_mode = recovery_mode.clone();
        let master = Master::new(options);
        wait_until_alive(&master).await;
        let mut worker = register_worker(&master, 1, 4, 4096).await;
        wait_for_persisted_records(dir.path(), 1).await;
        master.stop().await.unwrap();
        master.wait_for_stop().await;

        let provider = TestEndpointProvider {
            workers: HashMap::from([(
                worker.address.clone(),
                worker.endpoint.clone() as Arc<dyn WorkerEndpoint>,
            )]),
            applications: HashMap::new(),
        };
        let mut options = master_options();
        options.recovery_mode = recovery_mode;
        options.endpoint_provider = Some(Arc::new(provider));
        options.recovery_timeout = Duration::from_millis(100);
        let master = Master::new(options);

        let message = recv(&mut worker.messages).await;
        assert!(matches!(message, WorkerMessage::MasterChanged { .. }));
        // The worker never responds, so the recovery deadline evicts it.
        wait_until_alive(&master).await;
        let state = master.master_state().await.unwrap();
        assert!(state.workers.is_empty() || state.workers[0].state == WorkerState::Dead);
    }
}
