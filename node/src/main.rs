#![deny(unused_crate_dependencies)]
mod api;
mod config;
mod errors;
mod setup;

use api::{Upstreams, launch_api_server};
use errors::Result;
use metrics::prometheus::Registry;
use setup::{
    create_beacon_manager, create_execution_manager, create_gas_oracle, create_query_manager,
    create_transaction_manager, setup_logger, shut_down, spawn_sync_monitor,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    setup_logger();

    let config = config::parse()?;

    let cancel_token = CancellationToken::new();
    let metrics_registry = Registry::default();

    let execution = create_execution_manager(&config, &metrics_registry)?;
    let beacon = create_beacon_manager(&config, &metrics_registry)?;

    let sync_monitor_handle = spawn_sync_monitor(
        &config,
        execution.clone(),
        beacon.clone(),
        &metrics_registry,
        cancel_token.clone(),
    )?;

    let upstreams = Upstreams {
        query_manager: create_query_manager(&config, execution.clone()),
        transaction_manager: create_transaction_manager(&config, execution.clone())?,
        gas_oracle: create_gas_oracle(&config)?,
        execution,
        beacon,
        request_timeout: config.app.request_timeout,
    };

    launch_api_server(&config, metrics_registry, upstreams).await?;

    shut_down(cancel_token, [sync_monitor_handle]).await
}
