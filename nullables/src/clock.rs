//! Nullable layer clock — layers advance only when the test says so.

use pharos_beacon::traits::LayerClock;
use pharos_types::LayerId;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// A deterministic layer clock for testing.
pub struct NullLayerClock {
    tx: broadcast::Sender<LayerId>,
    current: Mutex<LayerId>,
}

impl NullLayerClock {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx,
            current: Mutex::new(LayerId::new(0)),
        }
    }

    /// Advance to `layer` and tick every subscriber.
    pub fn tick(&self, layer: LayerId) {
        *self.current.lock().unwrap() = layer;
        let _ = self.tx.send(layer);
    }
}

impl Default for NullLayerClock {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerClock for NullLayerClock {
    fn subscribe(&self) -> broadcast::Receiver<LayerId> {
        self.tx.subscribe()
    }

    fn current_layer(&self) -> LayerId {
        *self.current.lock().unwrap()
    }
}
