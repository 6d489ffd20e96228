//! Wire payloads and the outbound framing pipeline.
//!
//! Every outgoing message is a body signed with the node's long-term
//! identity key; the signature is appended after the body. The byte
//! encoding that is signed and broadcast is the bincode serialization of
//! the body, so struct field order is the signing order.

use pharos_types::{Beacon, EpochId, NodeId, Proposal, RoundId, Signature, VrfSignature};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::BeaconError;
use crate::traits::IdentitySigner;

/// Gossip channel names.
pub const PROPOSAL_CHANNEL: &str = "TBProposal";
pub const FIRST_VOTING_CHANNEL: &str = "TBFirstVoting";
pub const FOLLOWING_VOTING_CHANNEL: &str = "TBFollowingVoting";
pub const BEACON_SYNC_CHANNEL: &str = "TBBeaconSync";
pub const BEACON_SYNC_PREV_CHANNEL: &str = "TBBeaconSyncPrev";

/// ASCII prefix of the VRF proposal preimage.
pub const PROPOSAL_PREFIX: &[u8; 3] = b"TBP";

/// The preimage a miner signs with its VRF key to propose for an epoch:
/// `"TBP"` followed by the big-endian epoch number.
pub fn proposal_preimage(epoch: EpochId) -> [u8; 11] {
    let mut preimage = [0u8; 11];
    preimage[..3].copy_from_slice(PROPOSAL_PREFIX);
    preimage[3..].copy_from_slice(&epoch.to_be_bytes());
    preimage
}

/// The fixed-length tag under which a proposal is voted on and hashed.
pub fn proposal_tag(signature: &VrfSignature) -> Proposal {
    let digest: [u8; 32] = Sha256::digest(signature.as_bytes()).into();
    Proposal::new(digest)
}

/// An eligibility-passing VRF signature offered as a beacon contribution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalMessage {
    pub miner_id: NodeId,
    pub vrf_signature: VrfSignature,
}

/// Round-1 vote: explicit proposal lists, valids before potentially-valids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstVotingMessage {
    pub miner_id: NodeId,
    pub valid_proposals: Vec<Proposal>,
    pub potentially_valid_proposals: Vec<Proposal>,
}

/// Rounds 2..=K: a bit-vector reclassification of the sender's first-round
/// lists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowingVotingMessage {
    pub miner_id: NodeId,
    pub epoch: EpochId,
    pub round: RoundId,
    pub votes_bit_vector: Vec<u64>,
}

/// A calculated beacon offered to peers that missed the protocol run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconSyncMessage {
    pub miner_id: NodeId,
    pub epoch: EpochId,
    pub beacon: Beacon,
}

/// A message body with its detached identity signature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sealed<T> {
    pub body: T,
    pub signature: Signature,
}

impl<T: Serialize> Sealed<T> {
    /// Sign `body` with the node's identity key.
    pub fn seal(body: T, signer: &dyn IdentitySigner) -> Result<Self, BeaconError> {
        let encoded = bincode::serialize(&body)
            .map_err(|e| BeaconError::Serialization(e.to_string()))?;
        let signature = signer.sign(&encoded);
        Ok(Self { body, signature })
    }

    /// The framed bytes handed to the broadcaster.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BeaconError> {
        bincode::serialize(self).map_err(|e| BeaconError::Serialization(e.to_string()))
    }

    /// Whether the signature matches the body under `signer_id`.
    pub fn verify(&self, signer_id: &NodeId) -> bool {
        match bincode::serialize(&self.body) {
            Ok(encoded) => crate::signing::verify_signature(signer_id, &encoded, &self.signature),
            Err(_) => false,
        }
    }
}

impl<T: DeserializeOwned> Sealed<T> {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BeaconError> {
        bincode::deserialize(bytes).map_err(|e| BeaconError::Serialization(e.to_string()))
    }
}
