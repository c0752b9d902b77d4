use super::types::{
    Attestation, BeaconBlock, BlockHeaderResponse, BlsToExecutionChangeRequest, ChainSpec, Committee, DepositContract,
    FinalityCheckpoints, Fork, Genesis, ProposerDuty, SyncDuty, SyncStatus, Validator,
    VoluntaryExitRequest,
};
use crate::Result;

/// Beacon API calls against one consensus endpoint.
///
/// `state_id` and `block_id` accept anything the Beacon API does: `head`,
/// `finalized`, a slot or a root.
#[allow(async_fn_in_trait)]
#[trait_variant::make(Send)]
#[cfg_attr(any(test, feature = "test-helpers"), mockall::automock)]
pub trait Api: Sync {
    async fn node_syncing(&self) -> Result<SyncStatus>;
    async fn config_spec(&self) -> Result<ChainSpec>;
    async fn config_deposit_contract(&self) -> Result<DepositContract>;
    async fn beacon_genesis(&self) -> Result<Genesis>;
    async fn beacon_finality_checkpoints(&self, state_id: &str) -> Result<FinalityCheckpoints>;
    async fn beacon_fork(&self, state_id: &str) -> Result<Fork>;
    /// `None` when the node does not know the block.
    async fn beacon_header(&self, block_id: &str) -> Result<Option<BlockHeaderResponse>>;
    /// `None` when the node does not know the block.
    async fn beacon_attestations(&self, block_id: &str) -> Result<Option<Vec<Attestation>>>;
    /// `None` when the node does not know the block.
    async fn beacon_block(&self, block_id: &str) -> Result<Option<BeaconBlock>>;
    async fn beacon_validators(&self, state_id: &str, ids: &[String]) -> Result<Vec<Validator>>;
    async fn beacon_committees(
        &self,
        state_id: &str,
        epoch: Option<u64>,
    ) -> Result<Vec<Committee>>;
    async fn beacon_voluntary_exits_post(&self, request: &VoluntaryExitRequest) -> Result<()>;
    async fn beacon_bls_to_execution_changes_post(
        &self,
        request: &BlsToExecutionChangeRequest,
    ) -> Result<()>;
    async fn validator_duties_proposer(&self, epoch: u64) -> Result<Vec<ProposerDuty>>;
    async fn validator_duties_sync_post(
        &self,
        indices: &[String],
        epoch: u64,
    ) -> Result<Vec<SyncDuty>>;
}
