//! Beacon API request and response bodies.
//!
//! The Beacon API encodes integers as decimal strings and byte arrays as
//! `0x`-prefixed hex. Integers go through [`quoted_u64`]; bytes use the alloy
//! primitives, which already (de)serialize as hex.

use alloy::primitives::{Address, B256, Bytes, FixedBytes};
use serde::{Deserialize, Serialize};

pub type BlsPubkey = FixedBytes<48>;
pub type BlsSignature = FixedBytes<96>;
pub type ForkVersion = FixedBytes<4>;

/// Every Beacon API response wraps its payload in `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    #[serde(with = "quoted_u64")]
    pub head_slot: u64,
    #[serde(with = "quoted_u64")]
    pub sync_distance: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ChainSpec {
    #[serde(with = "quoted_u64")]
    pub seconds_per_slot: u64,
    #[serde(with = "quoted_u64")]
    pub slots_per_epoch: u64,
    #[serde(with = "quoted_u64")]
    pub epochs_per_sync_committee_period: u64,
    pub capella_fork_version: ForkVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositContract {
    #[serde(with = "quoted_u64")]
    pub chain_id: u64,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    #[serde(with = "quoted_u64")]
    pub genesis_time: u64,
    pub genesis_fork_version: ForkVersion,
    pub genesis_validators_root: B256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(with = "quoted_u64")]
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalityCheckpoints {
    pub previous_justified: Checkpoint,
    pub current_justified: Checkpoint,
    pub finalized: Checkpoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fork {
    pub previous_version: ForkVersion,
    pub current_version: ForkVersion,
    #[serde(with = "quoted_u64")]
    pub epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeaderResponse {
    #[serde(default)]
    pub finalized: bool,
    pub data: BlockHeaderData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeaderData {
    pub root: B256,
    pub canonical: bool,
    pub header: SignedBlockHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlockHeader {
    pub message: BlockHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    #[serde(with = "quoted_u64")]
    pub slot: u64,
    pub proposer_index: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationData {
    #[serde(with = "quoted_u64")]
    pub slot: u64,
    #[serde(with = "quoted_u64")]
    pub index: u64,
}

/// An attestation as included in a block. Only the fields used to attribute
/// it to a committee are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub aggregation_bits: Bytes,
    pub data: AttestationData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eth1Data {
    pub deposit_root: B256,
    #[serde(with = "quoted_u64")]
    pub deposit_count: u64,
    pub block_hash: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPayloadSummary {
    pub fee_recipient: Address,
    #[serde(with = "quoted_u64")]
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconBlockBody {
    pub eth1_data: Eth1Data,
    pub attestations: Vec<Attestation>,
    /// Absent before the merge.
    #[serde(default)]
    pub execution_payload: Option<ExecutionPayloadSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconBlock {
    #[serde(with = "quoted_u64")]
    pub slot: u64,
    pub proposer_index: String,
    pub body: BeaconBlockBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBeaconBlock {
    pub message: BeaconBlock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub index: String,
    #[serde(with = "quoted_u64")]
    pub balance: u64,
    pub status: String,
    pub validator: ValidatorDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorDetails {
    pub pubkey: BlsPubkey,
    pub withdrawal_credentials: B256,
    #[serde(with = "quoted_u64")]
    pub effective_balance: u64,
    pub slashed: bool,
    #[serde(with = "quoted_u64")]
    pub activation_eligibility_epoch: u64,
    #[serde(with = "quoted_u64")]
    pub activation_epoch: u64,
    #[serde(with = "quoted_u64")]
    pub exit_epoch: u64,
    #[serde(with = "quoted_u64")]
    pub withdrawable_epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committee {
    #[serde(with = "quoted_u64")]
    pub index: u64,
    #[serde(with = "quoted_u64")]
    pub slot: u64,
    pub validators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposerDuty {
    pub validator_index: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDuty {
    pub pubkey: BlsPubkey,
    pub validator_index: String,
    #[serde(with = "quoted_u64::vec")]
    pub validator_sync_committee_indices: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoluntaryExitMessage {
    #[serde(with = "quoted_u64")]
    pub epoch: u64,
    pub validator_index: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoluntaryExitRequest {
    pub message: VoluntaryExitMessage,
    pub signature: BlsSignature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlsToExecutionChangeMessage {
    pub validator_index: String,
    pub from_bls_pubkey: BlsPubkey,
    pub to_execution_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlsToExecutionChangeRequest {
    pub message: BlsToExecutionChangeMessage,
    pub signature: BlsSignature,
}

pub mod quoted_u64 {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Quoted(String),
        Plain(u64),
    }

    impl Repr {
        fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
            match self {
                Self::Quoted(value) => value.parse().map_err(E::custom),
                Self::Plain(value) => Ok(value),
            }
        }
    }

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        Repr::deserialize(deserializer)?.into_u64()
    }

    pub mod vec {
        use serde::{Deserialize, Deserializer, Serializer, ser::SerializeSeq};

        use super::Repr;

        pub fn serialize<S: Serializer>(values: &[u64], serializer: S) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(values.len()))?;
            for value in values {
                seq.serialize_element(&value.to_string())?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<u64>, D::Error> {
            Vec::<Repr>::deserialize(deserializer)?
                .into_iter()
                .map(Repr::into_u64)
                .collect()
        }
    }
}
