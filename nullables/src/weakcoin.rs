//! Nullable weak coin — scripted values and a call log.

use async_trait::async_trait;
use pharos_beacon::error::BeaconError;
use pharos_beacon::weakcoin::WeakCoin;
use pharos_types::{EpochId, RoundId};
use std::collections::HashMap;
use std::sync::Mutex;

/// Lifecycle calls observed by the coin, for ordering assertions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoinCall {
    Started(EpochId, RoundId),
    Finished(EpochId, RoundId),
    Published(EpochId, RoundId),
}

/// A deterministic weak coin.
///
/// `get` answers with a per-round scripted value, falling back to the
/// default value. Every lifecycle call is recorded.
pub struct NullWeakCoin {
    default_value: bool,
    values: Mutex<HashMap<(EpochId, RoundId), bool>>,
    calls: Mutex<Vec<CoinCall>>,
}

impl NullWeakCoin {
    /// A coin that answers `value` for every round.
    pub fn new(value: bool) -> Self {
        Self {
            default_value: value,
            values: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Script the value for one round.
    pub fn set_value(&self, epoch: EpochId, round: RoundId, value: bool) {
        self.values.lock().unwrap().insert((epoch, round), value);
    }

    /// The observed lifecycle calls, in order.
    pub fn calls(&self) -> Vec<CoinCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WeakCoin for NullWeakCoin {
    fn on_round_started(&self, epoch: EpochId, round: RoundId) {
        self.calls.lock().unwrap().push(CoinCall::Started(epoch, round));
    }

    fn on_round_finished(&self, epoch: EpochId, round: RoundId) {
        self.calls.lock().unwrap().push(CoinCall::Finished(epoch, round));
    }

    async fn publish_proposal(&self, epoch: EpochId, round: RoundId) -> Result<(), BeaconError> {
        self.calls.lock().unwrap().push(CoinCall::Published(epoch, round));
        Ok(())
    }

    fn get(&self, epoch: EpochId, round: RoundId) -> bool {
        self.values
            .lock()
            .unwrap()
            .get(&(epoch, round))
            .copied()
            .unwrap_or(self.default_value)
    }
}
