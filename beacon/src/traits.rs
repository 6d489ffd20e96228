//! Seams to the engine's external collaborators.
//!
//! Transport, cryptography, the activation database, the layer clock, and
//! beacon persistence all live outside this crate. The engine consumes them
//! through the traits below; `pharos-nullables` provides deterministic
//! implementations for tests.

use async_trait::async_trait;
use pharos_types::{Beacon, EpochId, LayerId, NodeId, Signature, VrfSignature};
use std::fmt;
use tokio::sync::broadcast;

use crate::error::BeaconError;

/// Gossip broadcaster. One call publishes one framed message on a channel.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, channel: &'static str, data: Vec<u8>) -> Result<(), BeaconError>;
}

/// Identifier of an activation transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtxId(pub [u8; 32]);

impl fmt::Debug for AtxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AtxId(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

/// Header fields of an activation transaction the engine cares about.
#[derive(Clone, Copy, Debug)]
pub struct AtxHeader {
    pub weight: u64,
}

/// Read access to the activation-transaction database.
pub trait ActivationDb: Send + Sync {
    /// Total weight and ATX ids active in the given epoch.
    fn epoch_weight(&self, epoch: EpochId) -> Result<(u64, Vec<AtxId>), BeaconError>;

    /// The ATX a node activated for the given epoch, if any.
    fn node_atx_for_epoch(&self, node: &NodeId, epoch: EpochId) -> Result<AtxId, BeaconError>;

    fn atx_header(&self, id: &AtxId) -> Result<AtxHeader, BeaconError>;
}

/// The layer clock: a stream of layer ticks plus the current position.
pub trait LayerClock: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<LayerId>;

    fn current_layer(&self) -> LayerId;
}

/// Signs VRF preimages with the node's VRF key.
pub trait VrfSigner: Send + Sync {
    fn sign(&self, message: &[u8]) -> VrfSignature;
}

/// Verifies a VRF signature against a node's public key.
pub trait VrfVerifier: Send + Sync {
    fn verify(&self, public: &NodeId, message: &[u8], signature: &VrfSignature) -> bool;
}

/// The node's long-term identity key, used to sign every outgoing message.
pub trait IdentitySigner: Send + Sync {
    fn public_key(&self) -> NodeId;

    fn sign(&self, message: &[u8]) -> Signature;
}

/// Persistence for final beacons, keyed by epoch.
pub trait BeaconStore: Send + Sync {
    fn get(&self, epoch: EpochId) -> Option<Beacon>;

    fn set(&self, epoch: EpochId, beacon: Beacon) -> Result<(), BeaconError>;
}
