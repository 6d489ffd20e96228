//! Error types for the beacon engine.

use pharos_types::EpochId;
use thiserror::Error;

/// Errors surfaced by the beacon engine to its embedder.
#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("invalid beacon config: {reason}")]
    Config { reason: String },

    #[error("epoch weight unavailable for epoch {epoch}: {reason}")]
    WeightUnavailable { epoch: EpochId, reason: String },

    #[error("broadcast on {channel} failed: {reason}")]
    Broadcast {
        channel: &'static str,
        reason: String,
    },

    #[error("beacon is not calculated for epoch {0}")]
    NotCalculated(EpochId),

    #[error("waited too long for beacon of epoch {0}")]
    Timeout(EpochId),

    #[error("beacon store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("engine is shutting down")]
    Shutdown,
}

/// Reasons an inbound message is dropped by the intake pipeline.
///
/// None of these is fatal: the message is discarded, a metric counter is
/// bumped, and processing continues.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntakeReject {
    #[error("malformed message: {0}")]
    Malformed(&'static str),

    #[error("arrived too late")]
    Late,

    #[error("duplicate submission")]
    Duplicate,

    #[error("sender is not eligible this epoch")]
    Ineligible,

    #[error("no first-round vote on record for sender")]
    UnknownVoter,

    #[error("no state for the referenced epoch")]
    UnknownEpoch,
}
