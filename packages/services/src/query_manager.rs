//! Batched read calls through Multicall3.
//!
//! Many contract reads are packed into `aggregate3` calls so they cost as few
//! round-trips as possible. Each physical `eth_call` goes through the execution
//! client it was built with, so a failover manager keeps applying to every batch.

use alloy::{
    eips::BlockId,
    primitives::{Address, Bytes, address},
    rpc::types::{TransactionInput, TransactionRequest},
    sol,
    sol_types::SolCall,
};
use futures::{StreamExt, TryStreamExt, stream};
use tracing::debug;

use crate::{Error, Result, execution::port::Api};

/// Multicall3 is deployed at the same address on every public network.
pub const MULTICALL3_ADDRESS: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");
pub const DEFAULT_BATCH_SIZE: usize = 100;

sol! {
    #[derive(Debug)]
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Call3Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls) external payable returns (Call3Result[] memory returnData);
    }
}

/// Half the available parallelism, never less than one.
pub fn default_concurrent_call_limit() -> usize {
    (num_cpus::get() / 2).max(1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub target: Address,
    pub call_data: Bytes,
    pub allow_failure: bool,
}

impl Call {
    pub fn new<C: SolCall>(target: Address, call: &C) -> Self {
        Self {
            target,
            call_data: call.abi_encode().into(),
            allow_failure: false,
        }
    }

    /// Lets the batch succeed even if this call reverts.
    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    pub success: bool,
    pub return_data: Bytes,
}

impl CallResult {
    pub fn decode<C: SolCall>(&self) -> Result<C::Return> {
        if !self.success {
            return Err(Error::Reverted(format!(
                "call reverted inside multicall: 0x{}",
                hex::encode(&self.return_data)
            )));
        }

        C::abi_decode_returns(&self.return_data)
            .map_err(|e| Error::Other(format!("failed to decode call result: {e}")))
    }
}

pub struct QueryManager<E> {
    client: E,
    multicall_address: Address,
    concurrent_call_limit: usize,
    batch_size: usize,
}

impl<E> QueryManager<E> {
    pub fn new(client: E, multicall_address: Address, concurrent_call_limit: usize) -> Self {
        Self {
            client,
            multicall_address,
            concurrent_call_limit: concurrent_call_limit.max(1),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn multicall_address(&self) -> Address {
        self.multicall_address
    }

    pub fn concurrent_call_limit(&self) -> usize {
        self.concurrent_call_limit
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<E: Api> QueryManager<E> {
    /// Runs every call in a single `aggregate3`. Results keep the order of `calls`.
    pub async fn query(&self, calls: &[Call], block: BlockId) -> Result<Vec<CallResult>> {
        if calls.is_empty() {
            return Ok(vec![]);
        }

        let aggregate = IMulticall3::aggregate3Call {
            calls: calls
                .iter()
                .map(|call| IMulticall3::Call3 {
                    target: call.target,
                    allowFailure: call.allow_failure,
                    callData: call.call_data.clone(),
                })
                .collect(),
        };
        let request = TransactionRequest::default()
            .to(self.multicall_address)
            .input(TransactionInput::new(aggregate.abi_encode().into()));

        debug!("Running multicall with {} calls", calls.len());
        let response = self.client.call_contract(request, block).await?;

        let results = IMulticall3::aggregate3Call::abi_decode_returns(&response)
            .map_err(|e| Error::Other(format!("failed to decode multicall response: {e}")))?;

        if results.len() != calls.len() {
            return Err(Error::Other(format!(
                "multicall returned {} results for {} calls",
                results.len(),
                calls.len()
            )));
        }

        Ok(results
            .into_iter()
            .map(|result| CallResult {
                success: result.success,
                return_data: result.returnData,
            })
            .collect())
    }

    /// Splits `calls` into batches of `batch_size` and keeps at most
    /// `concurrent_call_limit` of them in flight. The first failing batch fails
    /// the whole query.
    pub async fn batch_query(
        &self,
        calls: &[Call],
        batch_size: usize,
        block: BlockId,
    ) -> Result<Vec<CallResult>> {
        let batches: Vec<Vec<CallResult>> = stream::iter(calls.chunks(batch_size.max(1)))
            .map(|batch| self.query(batch, block))
            .buffered(self.concurrent_call_limit)
            .try_collect()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }

    /// [`Self::batch_query`] with the configured batch size.
    pub async fn query_all(&self, calls: &[Call], block: BlockId) -> Result<Vec<CallResult>> {
        self.batch_query(calls, self.batch_size, block).await
    }
}
