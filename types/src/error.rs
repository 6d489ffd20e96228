//! Error type for identifier parsing.

use thiserror::Error;

/// Errors from constructing Pharos types out of external representations.
#[derive(Debug, Error)]
pub enum TypeError {
    #[error("invalid hex string: {input:?}")]
    InvalidHex { input: String },
}
