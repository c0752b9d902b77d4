use std::time::Duration;

use clock::SystemClock;
use metrics::{HealthCheck, RegistersMetrics, prometheus::core::Collector};
use services::{
    ClientManager, Clock, ReadinessReport, ReportsReadiness, Result,
    beacon::{
        CLIENT_TYPE_NAME,
        port::Api,
        types::{
            Attestation, BeaconBlock, BlockHeaderResponse, BlsToExecutionChangeRequest,
            ChainSpec, Committee, DepositContract, FinalityCheckpoints, Fork, Genesis,
            ProposerDuty, SyncDuty, SyncStatus, Validator, VoluntaryExitRequest,
        },
    },
    request::Timeouts,
};
use url::Url;

use crate::client::BeaconHttpClient;

/// Beacon node with an optional fallback endpoint.
pub struct BeaconClientManager<C = BeaconHttpClient, Clk = SystemClock> {
    inner: ClientManager<C, Clk>,
}

impl<C, Clk: Clone> Clone for BeaconClientManager<C, Clk> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl BeaconClientManager {
    pub fn connect(
        primary_url: Url,
        fallback_url: Option<Url>,
        timeouts: Timeouts,
        reconnect_delay: Duration,
    ) -> crate::error::Result<Self> {
        let primary = BeaconHttpClient::new(primary_url, timeouts)?;
        let fallback = fallback_url
            .map(|url| BeaconHttpClient::new(url, timeouts))
            .transpose()?;

        Ok(Self::new(primary, fallback, reconnect_delay, SystemClock))
    }
}

impl<C, Clk> BeaconClientManager<C, Clk> {
    pub fn new(primary: C, fallback: Option<C>, reconnect_delay: Duration, clock: Clk) -> Self {
        Self {
            inner: ClientManager::new(CLIENT_TYPE_NAME, primary, fallback, reconnect_delay, clock),
        }
    }

    pub fn primary_client(&self) -> &C {
        self.inner.primary_client()
    }

    pub fn fallback_client(&self) -> Option<&C> {
        self.inner.fallback_client().map(|client| &**client)
    }

    pub fn is_primary_ready(&self) -> bool {
        self.inner.is_primary_ready()
    }

    pub fn is_fallback_ready(&self) -> bool {
        self.inner.is_fallback_ready()
    }

    pub fn is_fallback_enabled(&self) -> bool {
        self.inner.is_fallback_enabled()
    }

    pub fn client_type_name(&self) -> &str {
        self.inner.client_type_name()
    }
}

impl<C, Clk> Api for BeaconClientManager<C, Clk>
where
    C: Api + Send + Sync,
    Clk: Clock + Send + Sync,
{
    async fn node_syncing(&self) -> Result<SyncStatus> {
        self.inner
            .dispatch(|client| async move { client.node_syncing().await })
            .await
    }

    async fn config_spec(&self) -> Result<ChainSpec> {
        self.inner
            .dispatch(|client| async move { client.config_spec().await })
            .await
    }

    async fn config_deposit_contract(&self) -> Result<DepositContract> {
        self.inner
            .dispatch(|client| async move { client.config_deposit_contract().await })
            .await
    }

    async fn beacon_genesis(&self) -> Result<Genesis> {
        self.inner
            .dispatch(|client| async move { client.beacon_genesis().await })
            .await
    }

    async fn beacon_finality_checkpoints(&self, state_id: &str) -> Result<FinalityCheckpoints> {
        self.inner
            .dispatch(|client| async move { client.beacon_finality_checkpoints(state_id).await })
            .await
    }

    async fn beacon_fork(&self, state_id: &str) -> Result<Fork> {
        self.inner
            .dispatch(|client| async move { client.beacon_fork(state_id).await })
            .await
    }

    async fn beacon_header(&self, block_id: &str) -> Result<Option<BlockHeaderResponse>> {
        self.inner
            .dispatch(|client| async move { client.beacon_header(block_id).await })
            .await
    }

    async fn beacon_attestations(&self, block_id: &str) -> Result<Option<Vec<Attestation>>> {
        self.inner
            .dispatch(|client| async move { client.beacon_attestations(block_id).await })
            .await
    }

    async fn beacon_block(&self, block_id: &str) -> Result<Option<BeaconBlock>> {
        self.inner
            .dispatch(|client| async move { client.beacon_block(block_id).await })
            .await
    }

    async fn beacon_validators(&self, state_id: &str, ids: &[String]) -> Result<Vec<Validator>> {
        self.inner
            .dispatch(|client| async move { client.beacon_validators(state_id, ids).await })
            .await
    }

    async fn beacon_committees(
        &self,
        state_id: &str,
        epoch: Option<u64>,
    ) -> Result<Vec<Committee>> {
        self.inner
            .dispatch(|client| async move { client.beacon_committees(state_id, epoch).await })
            .await
    }

    async fn beacon_voluntary_exits_post(&self, request: &VoluntaryExitRequest) -> Result<()> {
        self.inner
            .dispatch(|client| async move { client.beacon_voluntary_exits_post(request).await })
            .await
    }

    async fn beacon_bls_to_execution_changes_post(
        &self,
        request: &BlsToExecutionChangeRequest,
    ) -> Result<()> {
        self.inner
            .dispatch(|client| async move {
                client.beacon_bls_to_execution_changes_post(request).await
            })
            .await
    }

    async fn validator_duties_proposer(&self, epoch: u64) -> Result<Vec<ProposerDuty>> {
        self.inner
            .dispatch(|client| async move { client.validator_duties_proposer(epoch).await })
            .await
    }

    async fn validator_duties_sync_post(
        &self,
        indices: &[String],
        epoch: u64,
    ) -> Result<Vec<SyncDuty>> {
        self.inner
            .dispatch(|client| async move { client.validator_duties_sync_post(indices, epoch).await })
            .await
    }
}

impl<C, Clk> ReportsReadiness for BeaconClientManager<C, Clk>
where
    C: Send + Sync,
    Clk: Send + Sync,
{
    fn readiness(&self) -> ReadinessReport {
        self.inner.readiness()
    }
}

impl<C, Clk> HealthCheck for BeaconClientManager<C, Clk>
where
    C: Send + Sync,
    Clk: Send + Sync,
{
    fn healthy(&self) -> bool {
        self.inner.healthy()
    }
}

impl<C, Clk> RegistersMetrics for BeaconClientManager<C, Clk> {
    fn metrics(&self) -> Vec<Box<dyn Collector>> {
        self.inner.metrics()
    }
}
