//! Thread-safe evaluation state cache
//!
//! One entry per SLO id, overwritten on every tick. Readers are the HTTP
//! layer; writers are the per-SLO tasks and `evaluate_now`. Snapshots are
//! point-in-time copies, so later writes never leak into a snapshot a
//! caller already holds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::eval::EvaluationResult;
use crate::policy::GateResult;

/// Cached outcome of one evaluation tick
#[derive(Debug, Clone)]
pub struct EvaluationState {
    pub eval_result: EvaluationResult,
    pub gate_result: GateResult,
    pub updated_at: DateTime<Utc>,
    /// Equal to the SLO's evaluation interval
    pub ttl: Duration,
}

impl EvaluationState {
    /// True once the entry has outlived its ttl
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.updated_at)
            .to_std()
            .map(|age| age > self.ttl)
            .unwrap_or(false)
    }
}

/// Concurrent map of SLO id to latest evaluation state
#[derive(Debug, Default)]
pub struct StateCache {
    states: RwLock<HashMap<String, Arc<EvaluationState>>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slo_id: &str) -> Option<Arc<EvaluationState>> {
        self.states.read().get(slo_id).cloned()
    }

    /// Replace the entry for `slo_id`; last writer wins, writes are atomic
    pub fn set(&self, slo_id: impl Into<String>, state: EvaluationState) {
        self.states.write().insert(slo_id.into(), Arc::new(state));
    }

    pub fn delete(&self, slo_id: &str) {
        self.states.write().remove(slo_id);
    }

    pub fn clear(&self) {
        self.states.write().clear();
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }

    /// Point-in-time snapshot of every entry
    pub fn get_all(&self) -> HashMap<String, Arc<EvaluationState>> {
        self.states.read().clone()
    }
}
