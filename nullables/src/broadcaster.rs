//! Nullable broadcaster — record frames without sending them.

use async_trait::async_trait;
use pharos_beacon::error::BeaconError;
use pharos_beacon::traits::Broadcaster;
use std::sync::Mutex;

/// A test broadcaster that records every frame instead of gossiping it.
///
/// Failures can be scripted: each queued failure consumes one broadcast
/// attempt, which exercises the caller's retry path.
pub struct NullBroadcaster {
    sent: Mutex<Vec<(&'static str, Vec<u8>)>>,
    failures: Mutex<u32>,
}

impl NullBroadcaster {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failures: Mutex::new(0),
        }
    }

    /// Make the next `count` broadcast attempts fail.
    pub fn fail_next(&self, count: u32) {
        *self.failures.lock().unwrap() = count;
    }

    /// All frames "sent", in order (for assertions).
    pub fn sent(&self) -> Vec<(&'static str, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    /// Frames sent on one channel.
    pub fn sent_on(&self, channel: &str) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    pub fn reset(&self) {
        self.sent.lock().unwrap().clear();
        *self.failures.lock().unwrap() = 0;
    }
}

impl Default for NullBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broadcaster for NullBroadcaster {
    async fn broadcast(&self, channel: &'static str, data: Vec<u8>) -> Result<(), BeaconError> {
        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(BeaconError::Broadcast {
                    channel,
                    reason: "scripted failure".to_string(),
                });
            }
        }
        self.sent.lock().unwrap().push((channel, data));
        Ok(())
    }
}
