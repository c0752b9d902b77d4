use std::time::Duration;

use alloy::{
    eips::{BlockId, BlockNumberOrTag},
    primitives::{Address, B256, Bytes, U256},
    rpc::types::{
        Filter, Header, Log, SyncStatus, Transaction, TransactionReceipt, TransactionRequest,
    },
};
use clock::SystemClock;
use metrics::{HealthCheck, RegistersMetrics, prometheus::core::Collector};
use services::{
    ClientManager, Clock, ReadinessReport, ReportsReadiness, Result,
    execution::{CLIENT_TYPE_NAME, port::Api},
    request::Timeouts,
};
use url::Url;

use crate::client::HttpClient;

/// Execution client with an optional fallback endpoint. Every call is routed
/// through the failover dispatcher; the method set matches a single client's.
pub struct ExecutionClientManager<C = HttpClient, Clk = SystemClock> {
    inner: ClientManager<C, Clk>,
}

impl<C, Clk: Clone> Clone for ExecutionClientManager<C, Clk> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl ExecutionClientManager {
    pub fn connect(
        primary_url: Url,
        fallback_url: Option<Url>,
        timeouts: Timeouts,
        reconnect_delay: Duration,
    ) -> crate::error::Result<Self> {
        let primary = HttpClient::new(primary_url, timeouts)?;
        let fallback = fallback_url
            .map(|url| HttpClient::new(url, timeouts))
            .transpose()?;

        Ok(Self::new(primary, fallback, reconnect_delay, SystemClock))
    }
}

impl<C, Clk> ExecutionClientManager<C, Clk> {
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

impl<C, Clk> Api for ExecutionClientManager<C, Clk>
where
    C: Api + Send + Sync,
    Clk: Clock + Send + Sync,
{
    async fn code_at(&self, address: Address, block: BlockId) -> Result<Bytes> {
        self.inner
            .dispatch(|client| async move { client.code_at(address, block).await })
            .await
    }

    async fn call_contract(&self, call: TransactionRequest, block: BlockId) -> Result<Bytes> {
        self.inner
            .dispatch(|client| {
                let call = call.clone();
                async move { client.call_contract(call, block).await }
            })
            .await
    }

    async fn header_by_hash(&self, hash: B256) -> Result<Option<Header>> {
        self.inner
            .dispatch(|client| async move { client.header_by_hash(hash).await })
            .await
    }

    async fn header_by_number(&self, number: BlockNumberOrTag) -> Result<Option<Header>> {
        self.inner
            .dispatch(|client| async move { client.header_by_number(number).await })
            .await
    }

    async fn pending_code_at(&self, address: Address) -> Result<Bytes> {
        self.inner
            .dispatch(|client| async move { client.pending_code_at(address).await })
            .await
    }

    async fn pending_nonce_at(&self, address: Address) -> Result<u64> {
        self.inner
            .dispatch(|client| async move { client.pending_nonce_at(address).await })
            .await
    }

    async fn suggest_gas_price(&self) -> Result<u128> {
        self.inner
            .dispatch(|client| async move { client.suggest_gas_price().await })
            .await
    }

    async fn suggest_gas_tip_cap(&self) -> Result<u128> {
        self.inner
            .dispatch(|client| async move { client.suggest_gas_tip_cap().await })
            .await
    }

    async fn estimate_gas(&self, call: TransactionRequest) -> Result<u64> {
        self.inner
            .dispatch(|client| {
                let call = call.clone();
                async move { client.estimate_gas(call).await }
            })
            .await
    }

    async fn send_transaction(&self, raw_tx: Bytes) -> Result<()> {
        self.inner
            .dispatch(|client| {
                let raw_tx = raw_tx.clone();
                async move { client.send_transaction(raw_tx).await }
            })
            .await
    }

    async fn filter_logs(&self, filter: Filter) -> Result<Vec<Log>> {
        self.inner
            .dispatch(|client| {
                let filter = filter.clone();
                async move { client.filter_logs(filter).await }
            })
            .await
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>> {
        self.inner
            .dispatch(|client| async move { client.transaction_receipt(hash).await })
            .await
    }

    async fn block_number(&self) -> Result<u64> {
        self.inner
            .dispatch(|client| async move { client.block_number().await })
            .await
    }

    async fn balance_at(&self, address: Address, block: BlockId) -> Result<U256> {
        self.inner
            .dispatch(|client| async move { client.balance_at(address, block).await })
            .await
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<(Transaction, bool)>> {
        self.inner
            .dispatch(|client| async move { client.transaction_by_hash(hash).await })
            .await
    }

    async fn nonce_at(&self, address: Address, block: BlockId) -> Result<u64> {
        self.inner
            .dispatch(|client| async move { client.nonce_at(address, block).await })
            .await
    }

    async fn sync_progress(&self) -> Result<SyncStatus> {
        self.inner
            .dispatch(|client| async move { client.sync_progress().await })
            .await
    }

    async fn chain_id(&self) -> Result<u64> {
        self.inner
            .dispatch(|client| async move { client.chain_id().await })
            .await
    }
}

impl<C, Clk> ReportsReadiness for ExecutionClientManager<C, Clk>
where
    C: Send + Sync,
    Clk: Send + Sync,
{
    fn readiness(&self) -> ReadinessReport {
        self.inner.readiness()
    }
}

impl<C, Clk> HealthCheck for ExecutionClientManager<C, Clk>
where
    C: Send + Sync,
    Clk: Send + Sync,
{
    fn healthy(&self) -> bool {
        self.inner.healthy()
    }
}

impl<C, Clk> RegistersMetrics for ExecutionClientManager<C, Clk> {
    fn metrics(&self) -> Vec<Box<dyn Collector>> {
        self.inner.metrics()
    }
}
