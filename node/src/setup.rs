use std::time::Duration;

use beacon::BeaconClientManager;
use eth::ExecutionClientManager;
use etherscan::EtherscanGasOracle;
use metrics::{RegistersMetrics, prometheus::Registry};
use services::{
    QueryManager, Runner, SyncMonitor, TransactionManager,
    query_manager::default_concurrent_call_limit,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    config::Config,
    errors::{Result, WithContext},
};

pub fn setup_logger() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_line_number(true)
        .json()
        .init();
}

pub fn create_execution_manager(
    config: &Config,
    registry: &Registry,
) -> Result<ExecutionClientManager> {
    let manager = ExecutionClientManager::connect(
        config.execution.primary_url.clone(),
        config.execution.fallback_url.clone(),
        config.execution.timeouts(),
        config.fallback.reconnect_delay,
    )
    .map_err(crate::errors::Error::from)
    .with_context(|| "failed to set up execution clients")?;

    manager.register_metrics(registry)?;
    log_endpoints(
        manager.client_type_name(),
        manager.is_fallback_enabled(),
    );

    Ok(manager)
}

pub fn create_beacon_manager(config: &Config, registry: &Registry) -> Result<BeaconClientManager> {
    let manager = BeaconClientManager::connect(
        config.beacon.primary_url.clone(),
        config.beacon.fallback_url.clone(),
        config.beacon.timeouts(),
        config.fallback.reconnect_delay,
    )
    .map_err(crate::errors::Error::from)
    .with_context(|| "failed to set up beacon clients")?;

    manager.register_metrics(registry)?;
    log_endpoints(
        manager.client_type_name(),
        manager.is_fallback_enabled(),
    );

    Ok(manager)
}

fn log_endpoints(client_type: &str, fallback_enabled: bool) {
    if fallback_enabled {
        info!("{client_type} configured with a fallback endpoint");
    } else {
        info!("{client_type} configured without a fallback endpoint");
    }
}

pub fn create_query_manager(
    config: &Config,
    execution: ExecutionClientManager,
) -> QueryManager<ExecutionClientManager> {
    let concurrent_call_limit = config
        .app
        .concurrent_call_limit
        .unwrap_or_else(default_concurrent_call_limit);

    QueryManager::new(execution, config.app.multicall_address, concurrent_call_limit)
}

pub fn create_transaction_manager(
    config: &Config,
    execution: ExecutionClientManager,
) -> Result<TransactionManager<ExecutionClientManager>> {
    let manager = TransactionManager::new(
        execution,
        config.app.safe_gas_buffer,
        config.app.safe_gas_multiplier,
    )?;

    Ok(manager)
}

pub fn create_gas_oracle(config: &Config) -> Result<Option<EtherscanGasOracle>> {
    let Some(url) = config.app.gas_oracle_url.clone() else {
        info!("No gas oracle configured");
        return Ok(None);
    };

    let oracle = EtherscanGasOracle::new(url, config.execution.fast_timeout)
        .map_err(crate::errors::Error::from)
        .with_context(|| "failed to set up gas oracle")?;

    Ok(Some(oracle))
}

pub fn spawn_sync_monitor(
    config: &Config,
    execution: ExecutionClientManager,
    beacon: BeaconClientManager,
    registry: &Registry,
    cancel_token: CancellationToken,
) -> Result<JoinHandle<()>> {
    let sync_monitor = SyncMonitor::new(execution, beacon);
    sync_monitor.register_metrics(registry)?;

    Ok(schedule_polling(
        config.app.sync_check_interval,
        sync_monitor,
        "Sync Monitor",
        cancel_token,
    ))
}

fn schedule_polling(
    polling_interval: Duration,
    mut runner: impl Runner + 'static,
    name: &'static str,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = runner.run().await {
                error!("{name} encountered an error: {e}");
            }

            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = tokio::time::sleep(polling_interval) => {}
            }
        }

        info!("{name} stopped");
    })
}

pub async fn shut_down(
    cancel_token: CancellationToken,
    handles: impl IntoIterator<Item = JoinHandle<()>>,
) -> Result<()> {
    cancel_token.cancel();

    for handle in handles {
        handle.await?;
    }

    Ok(())
}
