//! Gas estimation, signing and submission of write transactions.

use std::{future::Future, time::Duration};

use alloy::{
    eips::{BlockNumberOrTag, eip2718::Encodable2718},
    network::{Ethereum, EthereumWallet, NetworkWallet, TransactionBuilder},
    primitives::{Address, B256, Bytes, U256},
    rpc::types::{TransactionReceipt, TransactionRequest},
};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    Error, Result,
    execution::port::Api,
    gas_oracle::{GasFeeSuggestion, GasSpeed},
};

pub const DEFAULT_SAFE_GAS_BUFFER: u64 = 0;
pub const DEFAULT_SAFE_GAS_MULTIPLIER: f64 = 1.5;

const NETHERMIND_REVERT_PREFIX: &str = "Reverted 0x";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub estimated_gas_limit: u64,
    pub safe_gas_limit: u64,
    /// Why the node refused to estimate, if it did. Empty on success.
    pub simulation_error: Option<String>,
}

impl SimulationResult {
    pub fn succeeded(&self) -> bool {
        self.simulation_error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionInfo {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub simulation_result: SimulationResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionSubmission {
    pub tx_info: TransactionInfo,
    pub gas_limit: u64,
}

impl From<TransactionInfo> for TransactionSubmission {
    fn from(tx_info: TransactionInfo) -> Self {
        let gas_limit = tx_info.simulation_result.safe_gas_limit;
        Self { tx_info, gas_limit }
    }
}

/// Overrides for values the manager would otherwise ask the node for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    pub nonce: Option<u64>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

impl TransactionOptions {
    /// Takes the max fee from a gas oracle instead of deriving it from the
    /// latest base fee.
    pub fn with_suggested_max_fee(
        mut self,
        suggestion: &GasFeeSuggestion,
        speed: GasSpeed,
    ) -> Self {
        self.max_fee_per_gas = Some(suggestion.max_fee_per_gas(speed));
        self
    }
}

pub struct TransactionManager<E> {
    client: E,
    safe_gas_buffer: u64,
    safe_gas_multiplier: f64,
}

impl<E> TransactionManager<E> {
    pub fn new(client: E, safe_gas_buffer: u64, safe_gas_multiplier: f64) -> Result<Self> {
        if !safe_gas_multiplier.is_finite() || safe_gas_multiplier < 1.0 {
            return Err(Error::Other(format!(
                "safe gas multiplier must be at least 1.0, got {safe_gas_multiplier}"
            )));
        }

        Ok(Self {
            client,
            safe_gas_buffer,
            safe_gas_multiplier,
        })
    }

    pub fn safe_gas_limit(&self, estimate: u64) -> u64 {
        let scaled = (estimate as f64 * self.safe_gas_multiplier).floor() as u64;
        scaled.saturating_add(self.safe_gas_buffer)
    }
}

impl<E: Api> TransactionManager<E> {
    /// Estimates gas for the transaction. A node refusing the estimate (revert
    /// or bad input) is reported inside the result; failing to reach any node is
    /// an error.
    pub async fn simulate_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
        value: U256,
    ) -> Result<SimulationResult> {
        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_input(data)
            .with_value(value);

        match self.client.estimate_gas(request).await {
            Ok(estimate) => Ok(SimulationResult {
                estimated_gas_limit: estimate,
                safe_gas_limit: self.safe_gas_limit(estimate),
                simulation_error: None,
            }),
            Err(err) if err.is_unreachable() => Err(err),
            Err(err) => {
                let reason = normalize_revert_message(&err.to_string());
                debug!("Simulation to {to} failed: {reason}");

                Ok(SimulationResult {
                    estimated_gas_limit: 0,
                    safe_gas_limit: 0,
                    simulation_error: Some(reason),
                })
            }
        }
    }

    pub async fn create_transaction_info(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
        value: U256,
    ) -> Result<TransactionInfo> {
        let simulation_result = self
            .simulate_transaction(from, to, data.clone(), value)
            .await?;

        Ok(TransactionInfo {
            from,
            to,
            data,
            value,
            simulation_result,
        })
    }

    /// Signs the submission with `wallet` and broadcasts it, returning its hash.
    /// Nonce, fees and chain id come from the node unless set in `options`.
    pub async fn execute_transaction(
        &self,
        submission: &TransactionSubmission,
        wallet: &EthereumWallet,
        options: TransactionOptions,
    ) -> Result<B256> {
        let from = NetworkWallet::<Ethereum>::default_signer_address(wallet);
        let info = &submission.tx_info;

        let nonce = match options.nonce {
            Some(nonce) => nonce,
            None => self.client.pending_nonce_at(from).await?,
        };
        let max_priority_fee_per_gas = match options.max_priority_fee_per_gas {
            Some(tip) => tip,
            None => self.client.suggest_gas_tip_cap().await?,
        };
        let max_fee_per_gas = match options.max_fee_per_gas {
            Some(max_fee) => max_fee,
            None => self.suggest_max_fee(max_priority_fee_per_gas).await?,
        };
        let chain_id = self.client.chain_id().await?;

        let envelope = TransactionRequest::default()
            .with_from(from)
            .with_to(info.to)
            .with_input(info.data.clone())
            .with_value(info.value)
            .with_nonce(nonce)
            .with_chain_id(chain_id)
            .with_gas_limit(submission.gas_limit)
            .with_max_fee_per_gas(max_fee_per_gas)
            .with_max_priority_fee_per_gas(max_priority_fee_per_gas)
            .build(wallet)
            .await
            .map_err(|e| Error::Other(format!("failed to sign transaction: {e}")))?;

        let hash = *envelope.tx_hash();
        self.client
            .send_transaction(envelope.encoded_2718().into())
            .await?;

        info!("Submitted transaction {hash} with nonce {nonce}");
        Ok(hash)
    }

    /// Twice the latest base fee plus the tip, so the transaction survives a
    /// few blocks of rising base fees.
    async fn suggest_max_fee(&self, max_priority_fee_per_gas: u128) -> Result<u128> {
        let base_fee = self
            .client
            .header_by_number(BlockNumberOrTag::Latest)
            .await?
            .and_then(|header| header.inner.base_fee_per_gas)
            .ok_or_else(|| Error::Other("latest block carries no base fee".to_string()))?;

        Ok(u128::from(base_fee)
            .saturating_mul(2)
            .saturating_add(max_priority_fee_per_gas))
    }

    pub async fn wait_for_transaction(
        &self,
        hash: B256,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<TransactionReceipt> {
        let poll = async {
            loop {
                if let Some(receipt) = self.client.transaction_receipt(hash).await? {
                    return Ok::<_, Error>(receipt);
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        tokio::time::timeout(timeout, poll).await.map_err(|_| {
            Error::Timeout(format!(
                "transaction {hash} was not included within {timeout:?}"
            ))
        })?
    }
}

pub fn create_tx_submission_from_info(
    tx_info: Result<TransactionInfo>,
) -> Result<TransactionSubmission> {
    tx_info.map(TransactionSubmission::from)
}

/// Creates submissions one after another. Each creator is paired with a short
/// description used in error messages.
pub async fn batch_create_transaction_submissions<I, Fut>(
    creators: I,
    fail_on_sim_errors: bool,
) -> Result<Vec<TransactionSubmission>>
where
    I: IntoIterator<Item = (String, Fut)>,
    Fut: Future<Output = Result<TransactionInfo>>,
{
    let mut submissions = vec![];

    for (description, creator) in creators {
        let submission = create_tx_submission_from_info(creator.await)
            .map_err(|e| e.with_context(format!("error creating {description} TX")))?;

        if fail_on_sim_errors {
            if let Some(reason) = &submission.tx_info.simulation_result.simulation_error {
                return Err(Error::Other(format!(
                    "error simulating {description} TX: {reason}"
                )));
            }
        }

        submissions.push(submission);
    }

    Ok(submissions)
}

/// Nethermind reports reverts as `Reverted 0x<hex>`; turn the hex into text.
/// Anything else comes back unchanged.
pub fn normalize_revert_message(message: &str) -> String {
    let Some(start) = message.find(NETHERMIND_REVERT_PREFIX) else {
        return message.to_string();
    };

    let hex_message: String = message[start + NETHERMIND_REVERT_PREFIX.len()..]
        .chars()
        .take_while(char::is_ascii_hexdigit)
        .collect();

    if hex_message.is_empty() {
        return message.to_string();
    }

    match hex::decode(&hex_message) {
        Ok(bytes) => format!("reverted: {}", String::from_utf8_lossy(&bytes)),
        Err(_) => message.to_string(),
    }
}
