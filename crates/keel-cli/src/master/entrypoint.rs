use std::sync::Arc;

use keel_cluster::election::SingleLeaderAgent;
use keel_cluster::master::{Master, MasterOptions};
use keel_common::config::AppConfig;
use keel_common::runtime::RuntimeManager;
use log::info;

/// Handles graceful shutdown by waiting for a `SIGINT` signal in [tokio].
async fn shutdown() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down the master...");
}

pub fn run_master() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load()?;
    let runtime = RuntimeManager::try_new(&config.runtime)?;

    runtime.handle().primary().block_on(async {
        let options = MasterOptions::new(&config, Arc::new(SingleLeaderAgent));
        let mut master = Master::new(options);
        let ports = master.bound_ports().await?;
        info!("the master is running at {}", ports.url);
        shutdown().await;
        master.stop().await?;
        master.wait_for_stop().await;
        master.join().await;
        <Result<(), Box<dyn std::error::Error>>>::Ok(())
    })?;

    Ok(())
}
