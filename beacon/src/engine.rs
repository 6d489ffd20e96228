//! The beacon engine: wiring, lifecycle, and the consumer-facing API.
//!
//! [`BeaconEngine`] owns every collaborator behind a trait object, runs the
//! layer listener and the cleanup task in the background, and starts one
//! scheduler task per epoch when that epoch's first layer ticks. Downstream
//! consumers (typically a block builder) call [`BeaconEngine::get_beacon`].

use pharos_types::{Beacon, EpochId, LayerId, NodeId};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{BeaconConfig, WeightMode};
use crate::error::{BeaconError, IntakeReject};
use crate::intake;
use crate::metrics::BeaconMetrics;
use crate::registry::{BeaconRegistry, EpochRegistry};
use crate::scheduler;
use crate::shutdown::ShutdownController;
use crate::thresholds::{parse_adversary_share, parse_theta, voting_threshold, Rational};
use crate::traits::{
    ActivationDb, BeaconStore, Broadcaster, IdentitySigner, LayerClock, VrfSigner, VrfVerifier,
};
use crate::weakcoin::WeakCoin;

/// Shared state and collaborators of a running engine.
pub(crate) struct EngineCore {
    pub(crate) config: BeaconConfig,
    pub(crate) q: Rational,
    pub(crate) theta: Rational,
    pub(crate) node_id: NodeId,
    pub(crate) signer: Arc<dyn IdentitySigner>,
    pub(crate) vrf_signer: Arc<dyn VrfSigner>,
    pub(crate) vrf_verifier: Arc<dyn VrfVerifier>,
    pub(crate) broadcaster: Arc<dyn Broadcaster>,
    pub(crate) activation: Arc<dyn ActivationDb>,
    pub(crate) beacon_store: Arc<dyn BeaconStore>,
    pub(crate) weak_coin: Arc<dyn WeakCoin>,
    pub(crate) clock: Arc<dyn LayerClock>,
    pub(crate) epochs: EpochRegistry,
    pub(crate) beacons: BeaconRegistry,
    pub(crate) metrics: BeaconMetrics,
    pub(crate) shutdown: ShutdownController,
    started_tx: watch::Sender<bool>,
    started_rx: watch::Receiver<bool>,
    last_layer: RwLock<LayerId>,
}

impl EngineCore {
    /// The epoch of the newest layer tick seen so far.
    pub(crate) fn current_epoch(&self) -> EpochId {
        self.last_layer
            .read()
            .expect("layer lock poisoned")
            .epoch(self.config.layers_per_epoch)
    }

    /// Total weight active in the epoch; failure aborts the epoch upstream.
    pub(crate) fn epoch_weight(&self, epoch: EpochId) -> Result<u64, BeaconError> {
        self.activation
            .epoch_weight(epoch)
            .map(|(weight, _)| weight)
            .map_err(|e| BeaconError::WeightUnavailable {
                epoch,
                reason: e.to_string(),
            })
    }

    /// A voter's weight for the epoch. Zero means ineligible.
    pub(crate) fn vote_weight(&self, voter: &NodeId, epoch: EpochId) -> u64 {
        match self.config.weight_mode {
            WeightMode::Unit => 1,
            WeightMode::Atx => {
                let Ok(atx) = self.activation.node_atx_for_epoch(voter, epoch) else {
                    return 0;
                };
                match self.activation.atx_header(&atx) {
                    Ok(header) => header.weight,
                    Err(_) => 0,
                }
            }
        }
    }

    fn mark_started(&self) {
        let _ = self.started_tx.send(true);
    }
}

/// A running beacon engine.
pub struct BeaconEngine {
    core: Arc<EngineCore>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BeaconEngine {
    /// Wire up an engine. Fails if the configured `q` or `theta` strings
    /// are not valid rationals in range.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BeaconConfig,
        signer: Arc<dyn IdentitySigner>,
        vrf_signer: Arc<dyn VrfSigner>,
        vrf_verifier: Arc<dyn VrfVerifier>,
        broadcaster: Arc<dyn Broadcaster>,
        activation: Arc<dyn ActivationDb>,
        beacon_store: Arc<dyn BeaconStore>,
        weak_coin: Arc<dyn WeakCoin>,
        clock: Arc<dyn LayerClock>,
    ) -> Result<Self, BeaconError> {
        let q = parse_adversary_share(&config.q)?;
        let theta = parse_theta(&config.theta)?;
        let node_id = signer.public_key();
        let (started_tx, started_rx) = watch::channel(false);

        Ok(Self {
            core: Arc::new(EngineCore {
                config,
                q,
                theta,
                node_id,
                signer,
                vrf_signer,
                vrf_verifier,
                broadcaster,
                activation,
                beacon_store,
                weak_coin,
                clock,
                epochs: EpochRegistry::new(),
                beacons: BeaconRegistry::new(),
                metrics: BeaconMetrics::new(),
                shutdown: ShutdownController::new(),
                started_tx,
                started_rx,
                last_layer: RwLock::new(LayerId::new(0)),
            }),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.core.node_id
    }

    pub fn metrics(&self) -> &BeaconMetrics {
        &self.core.metrics
    }

    /// Seed genesis beacons and spawn the layer listener and cleanup task.
    pub async fn start(&self) {
        info!(node = %self.core.node_id, rounds = self.core.config.rounds,
            "starting beacon engine");
        self.core.beacons.init_genesis();

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(listen_layers(Arc::clone(&self.core))));
        tasks.push(tokio::spawn(cleanup_loop(Arc::clone(&self.core))));
    }

    /// Trigger shutdown and wait for background tasks to finish. Epochs in
    /// flight record no beacon.
    pub async fn close(&self) {
        info!("closing beacon engine");
        self.core.shutdown.shutdown();
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
    }

    /// Feed a raw gossip frame into the engine.
    ///
    /// Rejected frames are dropped with a counter increment; the returned
    /// error is informational and callers are free to ignore it.
    pub fn handle_message(&self, channel: &str, bytes: &[u8]) -> Result<(), IntakeReject> {
        intake::dispatch(&self.core, channel, bytes, Instant::now())
    }

    /// The beacon for an epoch.
    ///
    /// Genesis epochs answer immediately with the zero beacon. Otherwise
    /// this waits — bounded by four times the epoch's total round time —
    /// for the beacon to become ready, then answers and writes the value
    /// through to the external store.
    pub async fn get_beacon(&self, epoch: EpochId) -> Result<Beacon, BeaconError> {
        let core = &self.core;
        let mut shutdown_rx = core.shutdown.subscribe();

        if let Some(beacon) = core.beacon_store.get(epoch) {
            return Ok(beacon);
        }
        if epoch.is_genesis() {
            return Ok(Beacon::ZERO);
        }

        // Wait for the first layer tick so a freshly constructed engine
        // does not report NotCalculated spuriously.
        if core.shutdown.is_shut_down() {
            return Err(BeaconError::Shutdown);
        }
        let mut started = core.started_rx.clone();
        tokio::select! {
            result = started.wait_for(|s| *s) => {
                result.map_err(|_| BeaconError::Shutdown)?;
            }
            _ = shutdown_rx.recv() => return Err(BeaconError::Shutdown),
        }

        let Some(mut ready) = core.beacons.ready_receiver(epoch) else {
            return Err(BeaconError::NotCalculated(epoch));
        };

        let wait = async {
            tokio::select! {
                result = ready.wait_for(|r| *r) => {
                    result.map(|_| ()).map_err(|_| BeaconError::NotCalculated(epoch))
                }
                _ = shutdown_rx.recv() => Err(BeaconError::Shutdown),
            }
        };
        match tokio::time::timeout(core.config.beacon_wait_timeout(), wait).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(BeaconError::Timeout(epoch)),
        }

        let beacon = core
            .beacons
            .get(epoch)
            .ok_or(BeaconError::NotCalculated(epoch))?;
        core.beacon_store.set(epoch, beacon)?;
        Ok(beacon)
    }

    /// The margin-adoption threshold ⌊θ·W⌋ for an epoch.
    pub fn voting_threshold(&self, epoch: EpochId) -> Result<i128, BeaconError> {
        Ok(voting_threshold(
            &self.core.theta,
            self.core.epoch_weight(epoch)?,
        ))
    }
}

/// Listen for layer ticks; the first layer of each non-genesis epoch
/// starts that epoch's scheduler.
async fn listen_layers(core: Arc<EngineCore>) {
    let mut shutdown_rx = core.shutdown.subscribe();
    let mut layers = core.clock.subscribe();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                core.mark_started();
                return;
            }
            tick = layers.recv() => match tick {
                Ok(layer) => handle_layer(&core, layer),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "layer listener lagged behind the clock");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    core.mark_started();
                    return;
                }
            }
        }
    }
}

fn handle_layer(core: &Arc<EngineCore>, layer: LayerId) {
    debug!(layer = %layer, "received layer tick");
    {
        let mut last = core.last_layer.write().expect("layer lock poisoned");
        if layer > *last {
            *last = layer;
        }
    }

    let layers_per_epoch = core.config.layers_per_epoch;
    let epoch = layer.epoch(layers_per_epoch);
    let starts_epoch = layer.first_in_epoch(layers_per_epoch) && !epoch.is_genesis();
    if starts_epoch {
        // The slot must exist before waiters can observe the started
        // signal, or an early get_beacon would report NotCalculated.
        core.beacons.ensure_slot(epoch);
    }
    core.mark_started();

    if !starts_epoch {
        debug!(layer = %layer, epoch = %epoch, "layer does not start a beacon epoch, skipping");
        return;
    }

    tokio::spawn(scheduler::run_epoch(Arc::clone(core), epoch));
}

/// Periodically drop state for epochs beyond the retention window.
async fn cleanup_loop(core: Arc<EngineCore>) {
    let mut shutdown_rx = core.shutdown.subscribe();
    let mut ticker = tokio::time::interval(core.config.cleanup_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => return,
            _ = ticker.tick() => {
                let current = core.current_epoch();
                let retention = core.config.cleanup_epochs;
                core.epochs.cleanup(current, retention);
                core.beacons.cleanup(current, retention);
            }
        }
    }
}
