pub use alloy::{
    eips::{BlockId, BlockNumberOrTag},
    primitives::{Address, B256, Bytes, U256},
    rpc::types::{
        Filter, Header, Log, SyncStatus, Transaction, TransactionReceipt, TransactionRequest,
    },
};

use crate::Result;

/// Chain queries and transaction submission against one execution endpoint.
///
/// Implemented by the single-endpoint binding and, with the same method set,
/// by the failover manager wrapping two of them.
#[allow(async_fn_in_trait)]
#[trait_variant::make(Send)]
#[cfg_attr(any(test, feature = "test-helpers"), mockall::automock)]
pub trait Api: Sync {
    async fn code_at(&self, address: Address, block: BlockId) -> Result<Bytes>;
    async fn call_contract(&self, call: TransactionRequest, block: BlockId) -> Result<Bytes>;
    async fn header_by_hash(&self, hash: B256) -> Result<Option<Header>>;
    async fn header_by_number(&self, number: BlockNumberOrTag) -> Result<Option<Header>>;
    async fn pending_code_at(&self, address: Address) -> Result<Bytes>;
    async fn pending_nonce_at(&self, address: Address) -> Result<u64>;
    async fn suggest_gas_price(&self) -> Result<u128>;
    async fn suggest_gas_tip_cap(&self) -> Result<u128>;
    async fn estimate_gas(&self, call: TransactionRequest) -> Result<u64>;
    /// Broadcasts an already signed, EIP-2718 encoded transaction.
    async fn send_transaction(&self, raw_tx: Bytes) -> Result<()>;
    async fn filter_logs(&self, filter: Filter) -> Result<Vec<Log>>;
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>>;
    async fn block_number(&self) -> Result<u64>;
    async fn balance_at(&self, address: Address, block: BlockId) -> Result<U256>;
    /// The transaction and whether it is still pending.
    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<(Transaction, bool)>>;
    async fn nonce_at(&self, address: Address, block: BlockId) -> Result<u64>;
    async fn sync_progress(&self) -> Result<SyncStatus>;
    async fn chain_id(&self) -> Result<u64>;
}
