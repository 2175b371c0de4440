use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The command used to launch an executor or driver process on a worker.
/// The master treats it as opaque data and passes it through to workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub program: String,
    pub arguments: Vec<String>,
    pub environment: HashMap<String, String>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            arguments: vec![],
            environment: HashMap::new(),
        }
    }
}

/// The resource demands of an application, fixed at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationDescription {
    pub name: String,
    /// The maximum number of cores granted to the application across all
    /// workers. The master default applies when unset.
    pub max_cores: Option<usize>,
    pub memory_per_executor_mb: usize,
    /// The fixed executor size in cores. When unset, the application gets
    /// at most one executor per worker, sized by whatever cores the
    /// scheduler assigns on that worker.
    pub cores_per_executor: Option<usize>,
    /// The initial cap on the number of executors, for applications that
    /// grow their demand dynamically. Unset means no cap.
    pub initial_executor_limit: Option<usize>,
    pub command: Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverDescription {
    pub cores: usize,
    pub memory_mb: usize,
    /// Whether the master should relaunch the driver on another worker if
    /// the hosting worker is lost.
    pub supervise: bool,
    pub command: Command,
}
