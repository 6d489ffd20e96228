//! Gateway to the weak-coin oracle.
//!
//! The weak coin is a single-bit randomness source whose value for a given
//! `(epoch, round)` is, with overwhelming probability, the same for every
//! honest participant. It resolves proposals whose vote margin stays below
//! the voting threshold.

use async_trait::async_trait;
use pharos_types::{EpochId, RoundId};

use crate::error::BeaconError;

/// Lifecycle hooks and query surface of the weak coin.
///
/// Ordering contract, upheld by the round scheduler:
/// - `on_round_started` precedes `publish_proposal` for the same round;
/// - `get` is only called after `on_round_finished` for that round.
///
/// Cancellation of a pending `publish_proposal` propagates by dropping its
/// future.
#[async_trait]
pub trait WeakCoin: Send + Sync {
    fn on_round_started(&self, epoch: EpochId, round: RoundId);

    fn on_round_finished(&self, epoch: EpochId, round: RoundId);

    /// Publish this node's own coin share for the round.
    async fn publish_proposal(&self, epoch: EpochId, round: RoundId) -> Result<(), BeaconError>;

    /// The decided coin value for a finished round. Implementations return
    /// `false` for rounds that never ran.
    fn get(&self, epoch: EpochId, round: RoundId) -> bool;
}
