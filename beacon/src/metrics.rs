//! Prometheus metrics for the beacon engine.
//!
//! The [`BeaconMetrics`] struct owns a dedicated [`Registry`] that the
//! embedding node can encode into the Prometheus text exposition format.

use prometheus::{register_int_counter_with_registry, IntCounter, Opts, Registry};

/// Central collection of beacon-engine Prometheus metrics.
pub struct BeaconMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    /// Proposals accepted into the valid set.
    pub proposals_valid: IntCounter,
    /// Proposals accepted into the potentially-valid set.
    pub proposals_potentially_valid: IntCounter,
    /// Messages dropped because the sender carries no eligibility (failed
    /// proposal threshold or zero weight).
    pub ineligible_dropped: IntCounter,
    /// First-round voting messages accepted.
    pub first_votes_accepted: IntCounter,
    /// Following-round voting messages accepted.
    pub following_votes_accepted: IntCounter,
    /// Repeat submissions dropped (same epoch, round, voter).
    pub duplicate_votes_dropped: IntCounter,
    /// Messages dropped as malformed (bad frame, signature, or bit-vector).
    pub malformed_dropped: IntCounter,
    /// Messages dropped for arriving after the delayed window.
    pub late_dropped: IntCounter,
    /// Broadcast attempts that needed the single retry.
    pub broadcast_retries: IntCounter,
    /// Beacons calculated by this node.
    pub beacons_calculated: IntCounter,
    /// Beacons adopted from peer sync messages.
    pub beacons_synced: IntCounter,
}

impl BeaconMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| {
            register_int_counter_with_registry!(Opts::new(name, help), registry)
                .expect("metric registration only fails on duplicate names")
        };

        Self {
            proposals_valid: counter(
                "pharos_proposals_valid_total",
                "Proposals accepted into the valid set",
            ),
            proposals_potentially_valid: counter(
                "pharos_proposals_potentially_valid_total",
                "Proposals accepted into the potentially-valid set",
            ),
            ineligible_dropped: counter(
                "pharos_ineligible_dropped_total",
                "Messages dropped because the sender carries no eligibility",
            ),
            first_votes_accepted: counter(
                "pharos_first_votes_accepted_total",
                "First-round voting messages accepted",
            ),
            following_votes_accepted: counter(
                "pharos_following_votes_accepted_total",
                "Following-round voting messages accepted",
            ),
            duplicate_votes_dropped: counter(
                "pharos_duplicate_votes_dropped_total",
                "Repeat vote submissions dropped",
            ),
            malformed_dropped: counter(
                "pharos_malformed_dropped_total",
                "Malformed messages dropped",
            ),
            late_dropped: counter(
                "pharos_late_dropped_total",
                "Messages dropped for arriving too late",
            ),
            broadcast_retries: counter(
                "pharos_broadcast_retries_total",
                "Broadcast attempts that needed the single retry",
            ),
            beacons_calculated: counter(
                "pharos_beacons_calculated_total",
                "Beacons calculated by this node",
            ),
            beacons_synced: counter(
                "pharos_beacons_synced_total",
                "Beacons adopted from peer sync messages",
            ),
            registry,
        }
    }
}

impl Default for BeaconMetrics {
    fn default() -> Self {
        Self::new()
    }
}
