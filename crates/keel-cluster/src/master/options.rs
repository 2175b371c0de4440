use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use keel_common::config::{AppConfig, RecoveryMode as RecoveryModeConfig};
use keel_server::RetryStrategy;

use crate::election::LeaderElectionAgent;
use crate::endpoint::EndpointProvider;
use crate::persist::RecoveryMode;

pub struct MasterOptions {
    pub listen_host: String,
    pub listen_port: u16,
    /// The host advertised to workers and applications.
    pub external_host: String,
    /// The port advertised to workers and applications.
    /// Defaults to the listen port.
    pub external_port: Option<u16>,
    pub worker_timeout: Duration,
    /// How many timeout intervals a dead worker stays visible before it is
    /// purged from the worker list.
    pub reaper_iterations: u64,
    pub retained_applications: usize,
    pub retained_drivers: usize,
    /// Abnormal executor exits tolerated per application before the
    /// application is removed. A negative value disables the limit.
    pub max_executor_retries: i64,
    pub spread_out_applications: bool,
    /// The core cap for applications that do not declare one.
    /// `None` means unlimited.
    pub default_cores: Option<usize>,
    pub recovery_mode: RecoveryMode,
    /// How long to wait for persisted workers and applications to report
    /// back before recovery is forced to complete.
    pub recovery_timeout: Duration,
    pub persistence_retry_strategy: RetryStrategy,
    /// Seeds the worker shuffle used by driver scheduling.
    /// A fixed seed makes scheduling deterministic for tests.
    pub shuffle_seed: Option<u64>,
    pub election_agent: Arc<dyn LeaderElectionAgent>,
    /// Resolves persisted endpoint addresses back to live endpoints during
    /// recovery. Without a provider, persisted entities cannot be contacted
    /// and recovery starts from an empty state.
    pub endpoint_provider: Option<Arc<dyn EndpointProvider>>,
}

impl MasterOptions {
    pub fn new(config: &AppConfig, election_agent: Arc<dyn LeaderElectionAgent>) -> Self {
        let master = &config.master;
        let recovery_mode = match master.recovery_mode {
            RecoveryModeConfig::None => RecoveryMode::None,
            RecoveryModeConfig::Filesystem => RecoveryMode::Filesystem {
                directory: PathBuf::from(&master.recovery_directory),
            },
        };
        Self {
            listen_host: master.listen_host.clone(),
            listen_port: master.listen_port,
            external_host: master.external_host.clone(),
            external_port: master.external_port,
            worker_timeout: Duration::from_secs(master.worker_timeout_secs),
            reaper_iterations: master.reaper_iterations,
            retained_applications: master.retained_applications,
            retained_drivers: master.retained_drivers,
            max_executor_retries: master.max_executor_retries,
            spread_out_applications: master.spread_out_applications,
            default_cores: (master.default_cores > 0).then_some(master.default_cores),
            recovery_mode,
            recovery_timeout: Duration::from_secs(
                master
                    .recovery_timeout_secs
                    .unwrap_or(master.worker_timeout_secs),
            ),
            persistence_retry_strategy: RetryStrategy::from(&master.persistence_retry),
            shuffle_seed: None,
            election_agent,
            endpoint_provider: None,
        }
    }

    pub fn advertised_port(&self) -> u16 {
        self.external_port.unwrap_or(self.listen_port)
    }

    /// The URL workers and applications use to reach this master.
    pub fn url(&self) -> String {
        format!("keel://{}:{}", self.external_host, self.advertised_port())
    }
}
