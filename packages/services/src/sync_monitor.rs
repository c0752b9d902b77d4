use alloy::rpc::types::SyncStatus as ExecutionSyncStatus;
use metrics::{
    RegistersMetrics,
    prometheus::{IntGauge, Opts, core::Collector},
};
use tracing::{info, warn};

use crate::{Result, Runner, beacon, execution};

/// Periodically reads sync progress of both layers through their managers and
/// exports it as gauges.
pub struct SyncMonitor<E, B> {
    execution: E,
    beacon: B,
    metrics: Metrics,
}

impl<E, B> SyncMonitor<E, B> {
    pub fn new(execution: E, beacon: B) -> Self {
        Self {
            execution,
            beacon,
            metrics: Metrics::default(),
        }
    }
}

impl<E, B> SyncMonitor<E, B>
where
    E: execution::port::Api,
    B: beacon::port::Api,
{
    async fn check_execution(&self) -> Result<()> {
        let block_number = self.execution.block_number().await?;
        self.metrics
            .execution_block_number
            .set(i64::try_from(block_number).unwrap_or(i64::MAX));

        match self.execution.sync_progress().await? {
            ExecutionSyncStatus::None => {
                self.metrics.execution_syncing.set(0);
            }
            ExecutionSyncStatus::Info(progress) => {
                self.metrics.execution_syncing.set(1);
                info!(
                    "Execution client is syncing: block {} of {}",
                    progress.current_block, progress.highest_block
                );
            }
        }

        Ok(())
    }

    async fn check_beacon(&self) -> Result<()> {
        let status = self.beacon.node_syncing().await?;

        self.metrics
            .beacon_head_slot
            .set(i64::try_from(status.head_slot).unwrap_or(i64::MAX));
        self.metrics
            .beacon_sync_distance
            .set(i64::try_from(status.sync_distance).unwrap_or(i64::MAX));

        if status.is_syncing {
            info!(
                "Beacon node is syncing: head slot {}, {} slots behind",
                status.head_slot, status.sync_distance
            );
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl<E, B> Runner for SyncMonitor<E, B>
where
    E: execution::port::Api + Send + Sync,
    B: beacon::port::Api + Send + Sync,
{
    async fn run(&mut self) -> Result<()> {
        let execution = self.check_execution().await;
        if let Err(e) = &execution {
            warn!("Failed to read execution sync status: {e}");
        }

        let beacon = self.check_beacon().await;
        if let Err(e) = &beacon {
            warn!("Failed to read beacon sync status: {e}");
        }

        execution.and(beacon)
    }
}

impl<E, B> RegistersMetrics for SyncMonitor<E, B> {
    fn metrics(&self) -> Vec<Box<dyn Collector>> {
        vec![
            Box::new(self.metrics.execution_block_number.clone()),
            Box::new(self.metrics.execution_syncing.clone()),
            Box::new(self.metrics.beacon_head_slot.clone()),
            Box::new(self.metrics.beacon_sync_distance.clone()),
        ]
    }
}

#[derive(Clone)]
struct Metrics {
    execution_block_number: IntGauge,
    execution_syncing: IntGauge,
    beacon_head_slot: IntGauge,
    beacon_sync_distance: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        let gauge = |name: &str, help: &str| {
            IntGauge::with_opts(Opts::new(name, help))
                .expect("sync monitor metric to be correctly configured")
        };

        Self {
            execution_block_number: gauge(
                "execution_block_number",
                "Latest block number reported by the execution client.",
            ),
            execution_syncing: gauge(
                "execution_syncing",
                "Whether the execution client reports it is syncing.",
            ),
            beacon_head_slot: gauge("beacon_head_slot", "Head slot reported by the beacon node."),
            beacon_sync_distance: gauge(
                "beacon_sync_distance",
                "Slots between the beacon node head and the current slot.",
            ),
        }
    }
}
