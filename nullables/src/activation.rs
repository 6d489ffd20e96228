//! Nullable activation database — fixed weights, no disk.

use pharos_beacon::error::BeaconError;
use pharos_beacon::traits::{ActivationDb, AtxHeader, AtxId};
use pharos_types::{EpochId, NodeId};
use std::collections::HashMap;
use std::sync::Mutex;

/// An in-memory activation database.
///
/// Every registered node gets one synthetic ATX per epoch; the epoch
/// weight defaults to the sum of registered node weights but can be
/// overridden.
pub struct NullActivationDb {
    nodes: Mutex<HashMap<NodeId, u64>>,
    epoch_weight_override: Mutex<Option<u64>>,
    fail_epoch_weight: Mutex<bool>,
}

impl NullActivationDb {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(HashMap::new()),
            epoch_weight_override: Mutex::new(None),
            fail_epoch_weight: Mutex::new(false),
        }
    }

    /// Register a node with the given weight for every epoch.
    pub fn register(&self, node: NodeId, weight: u64) {
        self.nodes.lock().unwrap().insert(node, weight);
    }

    /// Pin the total epoch weight instead of summing node weights.
    pub fn set_epoch_weight(&self, weight: u64) {
        *self.epoch_weight_override.lock().unwrap() = Some(weight);
    }

    /// Make `epoch_weight` fail, simulating an unavailable weight lookup.
    pub fn fail_epoch_weight(&self, fail: bool) {
        *self.fail_epoch_weight.lock().unwrap() = fail;
    }

    fn atx_id_for(node: &NodeId, epoch: EpochId) -> AtxId {
        let mut bytes = *node.as_bytes();
        let epoch_bytes = epoch.to_be_bytes();
        for (b, e) in bytes.iter_mut().zip(epoch_bytes.iter()) {
            *b ^= e;
        }
        AtxId(bytes)
    }
}

impl Default for NullActivationDb {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivationDb for NullActivationDb {
    fn epoch_weight(&self, epoch: EpochId) -> Result<(u64, Vec<AtxId>), BeaconError> {
        if *self.fail_epoch_weight.lock().unwrap() {
            return Err(BeaconError::WeightUnavailable {
                epoch,
                reason: "scripted failure".to_string(),
            });
        }
        let nodes = self.nodes.lock().unwrap();
        let weight = self
            .epoch_weight_override
            .lock()
            .unwrap()
            .unwrap_or_else(|| nodes.values().sum());
        let atxs = nodes
            .keys()
            .map(|node| Self::atx_id_for(node, epoch))
            .collect();
        Ok((weight, atxs))
    }

    fn node_atx_for_epoch(&self, node: &NodeId, epoch: EpochId) -> Result<AtxId, BeaconError> {
        if self.nodes.lock().unwrap().contains_key(node) {
            Ok(Self::atx_id_for(node, epoch))
        } else {
            Err(BeaconError::WeightUnavailable {
                epoch,
                reason: format!("no atx for node {node}"),
            })
        }
    }

    fn atx_header(&self, id: &AtxId) -> Result<AtxHeader, BeaconError> {
        // Recover the weight by matching the id against registered nodes
        // across recent epochs is overkill for a nullable; headers carry
        // the node's registered weight keyed by the xor-ed id prefix.
        let nodes = self.nodes.lock().unwrap();
        for (node, weight) in nodes.iter() {
            // The epoch xor only touches the first 8 bytes.
            if node.as_bytes()[8..] == id.0[8..] {
                return Ok(AtxHeader { weight: *weight });
            }
        }
        Err(BeaconError::Store("unknown atx".to_string()))
    }
}
