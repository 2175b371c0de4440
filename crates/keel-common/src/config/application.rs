use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};

const DEFAULT_CONFIG: &str = include_str!("default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub runtime: RuntimeConfig,
    pub master: MasterConfig,
}

impl AppConfig {
    pub fn load() -> CommonResult<Self> {
        let config: AppConfig = Figment::from(Toml::string(DEFAULT_CONFIG))
            .admerge(Env::prefixed("KEEL__").map(|p| p.as_str().replace("__", ".").into()))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CommonResult<()> {
        if matches!(self.master.recovery_mode, RecoveryMode::Filesystem)
            && self.master.recovery_directory.is_empty()
        {
            return Err(CommonError::missing(
                "master.recovery_directory must be set when master.recovery_mode is \"filesystem\"",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub stack_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    pub listen_host: String,
    pub listen_port: u16,
    pub external_host: String,
    pub external_port: Option<u16>,
    /// The number of seconds after which a silent worker is considered lost.
    pub worker_timeout_secs: u64,
    /// The number of timeout intervals to retain a lost worker before it is
    /// purged from the master state.
    pub reaper_iterations: u64,
    pub retained_applications: usize,
    pub retained_drivers: usize,
    /// The number of abnormal executor exits tolerated before an application
    /// is removed. A negative value disables the limit.
    pub max_executor_retries: i64,
    /// Whether to spread executors of an application across workers instead
    /// of stacking them on as few workers as possible.
    pub spread_out_applications: bool,
    /// The default number of cores granted to an application that does not
    /// specify a core limit. Zero means unlimited.
    pub default_cores: usize,
    pub recovery_mode: RecoveryMode,
    pub recovery_directory: String,
    /// The number of seconds to wait for workers and applications to report
    /// back during recovery. Defaults to the worker timeout when unset.
    pub recovery_timeout_secs: Option<u64>,
    pub persistence_retry: RetryStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryMode {
    None,
    Filesystem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum RetryStrategy {
    Fixed(FixedRetryStrategy),
    ExponentialBackoff(ExponentialBackoffRetryStrategy),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedRetryStrategy {
    pub max_count: usize,
    pub delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExponentialBackoffRetryStrategy {
    pub max_count: usize,
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
    pub factor: u32,
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "tests use unwrap for brevity")]
mod tests {
    use super::*;

    #[test]
    fn test_load_default_config() {
        let config = AppConfig::load().unwrap();
        assert_eq!(config.master.listen_port, 7077);
        assert_eq!(config.master.worker_timeout_secs, 60);
        assert_eq!(config.master.reaper_iterations, 15);
        assert_eq!(config.master.max_executor_retries, 10);
        assert!(config.master.spread_out_applications);
        assert!(config.master.external_port.is_none());
        assert!(config.master.recovery_timeout_secs.is_none());
        assert!(matches!(config.master.recovery_mode, RecoveryMode::None));
        match &config.master.persistence_retry {
            RetryStrategy::ExponentialBackoff(strategy) => {
                assert_eq!(strategy.max_count, 5);
            }
            _ => panic!("unexpected default retry strategy"),
        }
    }

    #[test]
    fn test_filesystem_recovery_requires_directory() {
        let mut config = AppConfig::load().unwrap();
        config.master.recovery_mode = RecoveryMode::Filesystem;
        config.master.recovery_directory = String::new();
        let error = config.validate().unwrap_err();
        assert!(matches!(error, CommonError::MissingConfig(_)));
        assert!(error.to_string().contains("master.recovery_directory"));
        config.master.recovery_directory = "/var/lib/keel/recovery".to_string();
        assert!(config.validate().is_ok());
    }
}
