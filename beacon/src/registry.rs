//! Per-epoch protocol state and the beacon registry.
//!
//! Every epoch owns one [`EpochState`], created lazily on the first event
//! that references the epoch and held in the [`EpochRegistry`] until the
//! retention window expires. Final beacons live in the separate
//! [`BeaconRegistry`], whose readiness signal for an epoch closes exactly
//! once, after the beacon value is written.
//!
//! Lock order across the engine: proposals, then votes, then beacons, then
//! current round. No call path may acquire these in a different order.

use pharos_types::{Beacon, EpochId, RoundId, GENESIS_EPOCHS};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::watch;

use crate::proposals::ProposalStore;
use crate::votes::VoteStore;

/// All mutable protocol state of one epoch. Each sub-store carries its own
/// lock; the scheduler task holding the `Arc` is the anchor owner, with
/// intake handlers and senders sharing it.
pub struct EpochState {
    pub epoch: EpochId,
    pub proposals: RwLock<ProposalStore>,
    pub votes: RwLock<VoteStore>,
    pub current_round: RwLock<RoundId>,
    /// Wall-clock end of the proposal phase, recorded by the scheduler and
    /// read by intake to classify arrivals.
    pub proposal_phase_finished: RwLock<Option<Instant>>,
}

impl EpochState {
    fn new(epoch: EpochId) -> Self {
        Self {
            epoch,
            proposals: RwLock::new(ProposalStore::new()),
            votes: RwLock::new(VoteStore::new()),
            current_round: RwLock::new(RoundId(0)),
            proposal_phase_finished: RwLock::new(None),
        }
    }
}

/// Top-level registry of live epoch states.
#[derive(Default)]
pub struct EpochRegistry {
    epochs: RwLock<HashMap<EpochId, Arc<EpochState>>>,
}

impl EpochRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, epoch: EpochId) -> Option<Arc<EpochState>> {
        self.epochs.read().expect("epoch registry poisoned").get(&epoch).cloned()
    }

    pub fn get_or_create(&self, epoch: EpochId) -> Arc<EpochState> {
        if let Some(state) = self.get(epoch) {
            return state;
        }
        let mut epochs = self.epochs.write().expect("epoch registry poisoned");
        epochs
            .entry(epoch)
            .or_insert_with(|| Arc::new(EpochState::new(epoch)))
            .clone()
    }

    /// Drop state for epochs more than `retention` behind `current`.
    pub fn cleanup(&self, current: EpochId, retention: u64) {
        let mut epochs = self.epochs.write().expect("epoch registry poisoned");
        epochs.retain(|epoch, _| current.as_u64().saturating_sub(epoch.as_u64()) <= retention);
    }

    pub fn len(&self) -> usize {
        self.epochs.read().expect("epoch registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct BeaconSlot {
    beacon: Option<Beacon>,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
}

impl BeaconSlot {
    fn pending() -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        Self {
            beacon: None,
            ready_tx,
            ready_rx,
        }
    }
}

/// Calculated beacons per epoch, with a once-closing readiness signal.
#[derive(Default)]
pub struct BeaconRegistry {
    slots: RwLock<HashMap<EpochId, BeaconSlot>>,
}

impl BeaconRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the genesis epochs with the zero beacon, already ready.
    pub fn init_genesis(&self) {
        for epoch in 0..GENESIS_EPOCHS {
            self.ensure_slot(EpochId::new(epoch));
            self.set_once(EpochId::new(epoch), Beacon::ZERO);
        }
        // The first post-genesis epoch gets a pending slot so early waiters
        // find something to block on.
        self.ensure_slot(EpochId::new(GENESIS_EPOCHS));
    }

    /// Create a pending slot for the epoch if none exists.
    pub fn ensure_slot(&self, epoch: EpochId) {
        let mut slots = self.slots.write().expect("beacon registry poisoned");
        slots.entry(epoch).or_insert_with(BeaconSlot::pending);
    }

    pub fn get(&self, epoch: EpochId) -> Option<Beacon> {
        let slots = self.slots.read().expect("beacon registry poisoned");
        slots.get(&epoch).and_then(|slot| slot.beacon)
    }

    pub fn is_ready(&self, epoch: EpochId) -> bool {
        let slots = self.slots.read().expect("beacon registry poisoned");
        slots
            .get(&epoch)
            .map(|slot| *slot.ready_rx.borrow())
            .unwrap_or(false)
    }

    /// Write the beacon for an epoch and close its readiness signal.
    ///
    /// Write-once: returns `false` and leaves everything untouched if a
    /// beacon is already recorded. The readiness signal flips only after
    /// the value is in place, so a reader woken by the signal always
    /// observes the beacon.
    pub fn set_once(&self, epoch: EpochId, beacon: Beacon) -> bool {
        let mut slots = self.slots.write().expect("beacon registry poisoned");
        let slot = slots.entry(epoch).or_insert_with(BeaconSlot::pending);
        if slot.beacon.is_some() {
            return false;
        }
        slot.beacon = Some(beacon);
        let _ = slot.ready_tx.send(true);
        true
    }

    /// A receiver on the epoch's readiness signal, or `None` for an epoch
    /// with no slot.
    pub fn ready_receiver(&self, epoch: EpochId) -> Option<watch::Receiver<bool>> {
        let slots = self.slots.read().expect("beacon registry poisoned");
        slots.get(&epoch).map(|slot| slot.ready_rx.clone())
    }

    /// Drop slots for epochs more than `retention` behind `current`.
    pub fn cleanup(&self, current: EpochId, retention: u64) {
        let mut slots = self.slots.write().expect("beacon registry poisoned");
        slots.retain(|epoch, _| current.as_u64().saturating_sub(epoch.as_u64()) <= retention);
    }

    pub fn len(&self) -> usize {
        self.slots.read().expect("beacon registry poisoned").len()
    }
}
