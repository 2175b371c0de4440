use tokio::runtime::{Handle, Runtime};

use crate::config::RuntimeConfig;
use crate::error::CommonResult;

#[derive(Debug)]
pub struct RuntimeManager {
    primary: Runtime,
}

impl RuntimeManager {
    pub fn try_new(config: &RuntimeConfig) -> CommonResult<Self> {
        let primary = Self::build_runtime(config.stack_size)?;
        Ok(Self { primary })
    }

    pub fn handle(&self) -> RuntimeHandle {
        let primary = self.primary.handle().clone();
        RuntimeHandle { primary }
    }

    fn build_runtime(stack_size: usize) -> CommonResult<Runtime> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_stack_size(stack_size)
            .enable_all()
            .build()?;
        Ok(runtime)
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    primary: Handle,
}

impl RuntimeHandle {
    pub fn primary(&self) -> &Handle {
        &self.primary
    }
}
