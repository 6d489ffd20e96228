//! Nullable beacon store — thread-safe in-memory persistence.

use pharos_beacon::error::BeaconError;
use pharos_beacon::traits::BeaconStore;
use pharos_types::{Beacon, EpochId};
use std::collections::HashMap;
use std::sync::Mutex;

/// An in-memory beacon store for testing.
pub struct NullBeaconStore {
    beacons: Mutex<HashMap<EpochId, Beacon>>,
    fail_writes: Mutex<bool>,
}

impl NullBeaconStore {
    pub fn new() -> Self {
        Self {
            beacons: Mutex::new(HashMap::new()),
            fail_writes: Mutex::new(false),
        }
    }

    /// Make `set` fail, simulating a broken store.
    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }

    pub fn len(&self) -> usize {
        self.beacons.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NullBeaconStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BeaconStore for NullBeaconStore {
    fn get(&self, epoch: EpochId) -> Option<Beacon> {
        self.beacons.lock().unwrap().get(&epoch).copied()
    }

    fn set(&self, epoch: EpochId, beacon: Beacon) -> Result<(), BeaconError> {
        if *self.fail_writes.lock().unwrap() {
            return Err(BeaconError::Store("scripted failure".to_string()));
        }
        self.beacons.lock().unwrap().insert(epoch, beacon);
        Ok(())
    }
}
