use std::{future::Future, time::Duration};

use alloy::{
    eips::{BlockId, BlockNumberOrTag},
    primitives::{Address, B256, Bytes, U256},
    providers::{Provider as AlloyProvider, RootProvider},
    rpc::{
        client::RpcClient,
        types::{
            Filter, Header, Log, SyncStatus, Transaction, TransactionReceipt, TransactionRequest,
        },
    },
    transports::{
        TransportResult,
        http::{Http, reqwest},
    },
};
use services::{
    Result,
    execution::port::Api,
    request::{Timeouts, guarded},
};
use tracing::debug;
use url::Url;

use crate::error::Error;

/// Single execution endpoint over HTTP JSON-RPC.
#[derive(Debug, Clone)]
pub struct HttpClient {
    provider: RootProvider,
    host: String,
    timeouts: Timeouts,
}

impl HttpClient {
    pub fn new(url: Url, timeouts: Timeouts) -> crate::error::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeouts.fast)
            .build()?;

        let host = url.host_str().unwrap_or_default().to_owned();
        let provider = RootProvider::new(RpcClient::new(Http::with_client(http, url), false));

        Ok(Self {
            provider,
            host,
            timeouts,
        })
    }

    async fn request<T, F>(&self, timeout: Duration, method: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = TransportResult<T>>,
    {
        debug!("Calling {method} on {}", self.host);
        guarded(timeout, method, async {
            call.await.map_err(|e| services::Error::from(Error::from(e)))
        })
        .await
    }
}

impl Api for HttpClient {
    async fn code_at(&self, address: Address, block: BlockId) -> Result<Bytes> {
        self.request(
            self.timeouts.fast,
            "eth_getCode",
            self.provider.get_code_at(address).block_id(block).into_future(),
        )
        .await
    }

    async fn call_contract(&self, call: TransactionRequest, block: BlockId) -> Result<Bytes> {
        self.request(
            self.timeouts.fast,
            "eth_call",
            self.provider.call(call).block(block).into_future(),
        )
        .await
    }

    async fn header_by_hash(&self, hash: B256) -> Result<Option<Header>> {
        let block = self
            .request(
                self.timeouts.fast,
                "eth_getBlockByHash",
                self.provider.get_block_by_hash(hash).into_future(),
            )
            .await?;

        Ok(block.map(|block| block.header))
    }

    async fn header_by_number(&self, number: BlockNumberOrTag) -> Result<Option<Header>> {
        let block = self
            .request(
                self.timeouts.fast,
                "eth_getBlockByNumber",
                self.provider.get_block_by_number(number).into_future(),
            )
            .await?;

        Ok(block.map(|block| block.header))
    }

    async fn pending_code_at(&self, address: Address) -> Result<Bytes> {
        self.request(
            self.timeouts.fast,
            "eth_getCode",
            self.provider.get_code_at(address).pending().into_future(),
        )
        .await
    }

    async fn pending_nonce_at(&self, address: Address) -> Result<u64> {
        self.request(
            self.timeouts.fast,
            "eth_getTransactionCount",
            self.provider
                .get_transaction_count(address)
                .pending()
                .into_future(),
        )
        .await
    }

    async fn suggest_gas_price(&self) -> Result<u128> {
        self.request(
            self.timeouts.fast,
            "eth_gasPrice",
            self.provider.get_gas_price(),
        )
        .await
    }

    async fn suggest_gas_tip_cap(&self) -> Result<u128> {
        self.request(
            self.timeouts.fast,
            "eth_maxPriorityFeePerGas",
            self.provider.get_max_priority_fee_per_gas(),
        )
        .await
    }

    async fn estimate_gas(&self, call: TransactionRequest) -> Result<u64> {
        self.request(
            self.timeouts.fast,
            "eth_estimateGas",
            self.provider.estimate_gas(call).into_future(),
        )
        .await
    }

    async fn send_transaction(&self, raw_tx: Bytes) -> Result<()> {
        let pending = self
            .request(
                self.timeouts.fast,
                "eth_sendRawTransaction",
                self.provider.send_raw_transaction(&raw_tx),
            )
            .await?;

        debug!("Broadcast transaction {}", pending.tx_hash());
        Ok(())
    }

    async fn filter_logs(&self, filter: Filter) -> Result<Vec<Log>> {
        self.request(
            self.timeouts.slow,
            "eth_getLogs",
            self.provider.get_logs(&filter),
        )
        .await
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>> {
        self.request(
            self.timeouts.fast,
            "eth_getTransactionReceipt",
            self.provider.get_transaction_receipt(hash),
        )
        .await
    }

    async fn block_number(&self) -> Result<u64> {
        self.request(
            self.timeouts.fast,
            "eth_blockNumber",
            self.provider.get_block_number(),
        )
        .await
    }

    async fn balance_at(&self, address: Address, block: BlockId) -> Result<U256> {
        self.request(
            self.timeouts.fast,
            "eth_getBalance",
            self.provider.get_balance(address).block_id(block).into_future(),
        )
        .await
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<(Transaction, bool)>> {
        let tx = self
            .request(
                self.timeouts.fast,
                "eth_getTransactionByHash",
                self.provider.get_transaction_by_hash(hash),
            )
            .await?;

        Ok(tx.map(|tx| {
            let pending = tx.block_hash.is_none();
            (tx, pending)
        }))
    }

    async fn nonce_at(&self, address: Address, block: BlockId) -> Result<u64> {
        self.request(
            self.timeouts.fast,
            "eth_getTransactionCount",
            self.provider
                .get_transaction_count(address)
                .block_id(block)
                .into_future(),
        )
        .await
    }

    async fn sync_progress(&self) -> Result<SyncStatus> {
        self.request(self.timeouts.fast, "eth_syncing", self.provider.syncing())
            .await
    }

    async fn chain_id(&self) -> Result<u64> {
        self.request(
            self.timeouts.fast,
            "eth_chainId",
            self.provider.get_chain_id(),
        )
        .await
    }
}
