//! Beacon engine configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::BeaconError;

/// How a voter's weight is resolved when tallying votes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightMode {
    /// Resolve through the activation database: the voter's ATX for the
    /// epoch determines its weight. This is the production path.
    Atx,
    /// Every eligible voter counts as weight 1. Intended for testing
    /// configurations only.
    Unit,
}

/// Configuration for the beacon engine.
///
/// Can be loaded from a TOML file via [`BeaconConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Durations are milliseconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// Security parameter κ of the eligibility fraction.
    #[serde(default = "default_kappa")]
    pub kappa: u64,

    /// Assumed adversarial weight share q, as a rational string in [0, 1),
    /// e.g. `"1/3"` or `"0.33"`.
    #[serde(default = "default_q")]
    pub q: String,

    /// Voting threshold fraction θ, as a rational string; the adoption
    /// threshold is ⌊θ·W⌋ of the epoch weight W.
    #[serde(default = "default_theta")]
    pub theta: String,

    /// Number of voting rounds K per epoch.
    #[serde(default = "default_rounds")]
    pub rounds: u32,

    /// Maximum number of proposals referenced per voting message.
    #[serde(default = "default_votes_limit")]
    pub votes_limit: usize,

    /// Grace period δ for message timeliness classification.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Duration of the proposal phase.
    #[serde(default = "default_proposal_duration_ms")]
    pub proposal_duration_ms: u64,

    /// Duration of the first voting round.
    #[serde(default = "default_first_voting_round_duration_ms")]
    pub first_voting_round_duration_ms: u64,

    /// Duration of the voting window of rounds 2..=K.
    #[serde(default = "default_voting_round_duration_ms")]
    pub voting_round_duration_ms: u64,

    /// Duration of the weak-coin window of rounds 2..=K.
    #[serde(default = "default_weak_coin_round_duration_ms")]
    pub weak_coin_round_duration_ms: u64,

    /// Interval between state-cleanup sweeps.
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    /// Epochs this far behind the current one are garbage-collected.
    #[serde(default = "default_cleanup_epochs")]
    pub cleanup_epochs: u64,

    /// Number of layers per epoch.
    #[serde(default = "default_layers_per_epoch")]
    pub layers_per_epoch: u64,

    /// How voter weight is resolved (see [`WeightMode`]).
    #[serde(default = "default_weight_mode")]
    pub weight_mode: WeightMode,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_kappa() -> u64 {
    40
}

fn default_q() -> String {
    "1/3".to_string()
}

fn default_theta() -> String {
    "1/4".to_string()
}

fn default_rounds() -> u32 {
    300
}

fn default_votes_limit() -> usize {
    100
}

fn default_grace_period_ms() -> u64 {
    10_000
}

fn default_proposal_duration_ms() -> u64 {
    30_000
}

fn default_first_voting_round_duration_ms() -> u64 {
    60_000
}

fn default_voting_round_duration_ms() -> u64 {
    30_000
}

fn default_weak_coin_round_duration_ms() -> u64 {
    10_000
}

fn default_cleanup_interval_ms() -> u64 {
    30_000
}

fn default_cleanup_epochs() -> u64 {
    1000
}

fn default_layers_per_epoch() -> u64 {
    4
}

fn default_weight_mode() -> WeightMode {
    WeightMode::Atx
}

// ── Impl ───────────────────────────────────────────────────────────────

impl BeaconConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, BeaconError> {
        let content = std::fs::read_to_string(path).map_err(|e| BeaconError::Config {
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, BeaconError> {
        toml::from_str(s).map_err(|e| BeaconError::Config {
            reason: e.to_string(),
        })
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("BeaconConfig is always serializable to TOML")
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn proposal_duration(&self) -> Duration {
        Duration::from_millis(self.proposal_duration_ms)
    }

    pub fn first_voting_round_duration(&self) -> Duration {
        Duration::from_millis(self.first_voting_round_duration_ms)
    }

    pub fn voting_round_duration(&self) -> Duration {
        Duration::from_millis(self.voting_round_duration_ms)
    }

    pub fn weak_coin_round_duration(&self) -> Duration {
        Duration::from_millis(self.weak_coin_round_duration_ms)
    }

    /// Full duration of one following round (voting + weak-coin window).
    pub fn round_duration(&self) -> Duration {
        self.voting_round_duration() + self.weak_coin_round_duration()
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    /// How long a beacon waiter blocks before giving up.
    pub fn beacon_wait_timeout(&self) -> Duration {
        4 * self.rounds * self.round_duration()
    }
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            kappa: default_kappa(),
            q: default_q(),
            theta: default_theta(),
            rounds: default_rounds(),
            votes_limit: default_votes_limit(),
            grace_period_ms: default_grace_period_ms(),
            proposal_duration_ms: default_proposal_duration_ms(),
            first_voting_round_duration_ms: default_first_voting_round_duration_ms(),
            voting_round_duration_ms: default_voting_round_duration_ms(),
            weak_coin_round_duration_ms: default_weak_coin_round_duration_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            cleanup_epochs: default_cleanup_epochs(),
            layers_per_epoch: default_layers_per_epoch(),
            weight_mode: default_weight_mode(),
        }
    }
}
