//! Active inference: expected-free-energy action selection with a learned
//! per-action transition model.
//!
//! `EFE(a) = pragmatic(a) − β·epistemic(a)`: the pragmatic term is the
//! predicted distance from the goal state after taking the action, the
//! epistemic term rewards information gain about actions the model is still
//! unsure of. The minimum wins; ties break deterministically by action id.

use crate::memory::MemoryHint;
use entity_types::state::State;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The action set the policy selects from. `None` is deliberate inaction.
pub const ACTION_SET: [Option<&str>; 4] = [
    None,
    Some("state.summary"),
    Some("system.health"),
    Some("energy.status"),
];

/// Learned transition statistics for one action.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ActionModel {
    /// Mean observed energy delta.
    pub avg_delta_energy: f64,
    /// Mean observed Lyapunov delta.
    pub avg_delta_v: f64,
    /// Confidence in the model, grows with samples toward 1.
    pub confidence: f64,
    /// Observations so far.
    pub samples: u64,
}

impl ActionModel {
    fn observe(&mut self, delta_energy: f64, delta_v: f64) {
        self.samples += 1;
        let n = self.samples as f64;
        self.avg_delta_energy += (delta_energy - self.avg_delta_energy) / n;
        self.avg_delta_v += (delta_v - self.avg_delta_v) / n;
        self.confidence = n / (n + 4.0);
    }
}

/// The active-inference selector.
#[derive(Clone, Debug, Default)]
pub struct ActiveInference {
    models: BTreeMap<String, ActionModel>,
}

fn key(action: Option<&str>) -> String {
    action.unwrap_or("none").to_string()
}

impl ActiveInference {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// The learned model for an action, if any observations exist.
    pub fn model(&self, action: Option<&str>) -> Option<&ActionModel> {
        self.models.get(&key(action))
    }

    /// Updates the model with an observed transition.
    pub fn observe(&mut self, action: Option<&str>, delta_energy: f64, delta_v: f64) {
        self.models
            .entry(key(action))
            .or_default()
            .observe(delta_energy, delta_v);
    }

    /// Predicted goal distance after taking `action` from `state`.
    fn pragmatic(&self, state: &State, action: Option<&str>) -> f64 {
        let model = self.models.get(&key(action)).copied().unwrap_or_default();
        let energy = (state.energy.current + model.avg_delta_energy).clamp(0.0, 1.0);
        let v = (state.lyapunov.v + model.avg_delta_v).max(0.0);
        let threshold = state.energy.threshold.max(f64::EPSILON);
        let energy_distance = ((threshold - energy) / threshold).clamp(0.0, 1.0);
        // The goal is the attractor: V at zero, energy above threshold.
        v + energy_distance
    }

    /// Expected information gain of trying `action`.
    fn epistemic(&self, action: Option<&str>) -> f64 {
        let model = self.models.get(&key(action)).copied().unwrap_or_default();
        1.0 - model.confidence
    }

    /// Scores one action. Lower is better.
    pub fn score(&self, state: &State, action: Option<&str>, epistemic_weight: f64) -> f64 {
        self.pragmatic(state, action) - epistemic_weight * self.epistemic(action)
    }

    /// Selects the minimum-EFE action from `candidates`.
    ///
    /// Candidates are considered in preference order — hinted actions first
    /// (best remembered first), then the rest by action id — and only a
    /// strictly better score displaces an earlier candidate, so exact ties
    /// resolve deterministically to the preferred entry.
    pub fn select(
        &self,
        state: &State,
        candidates: &[Option<&str>],
        hint: Option<&MemoryHint>,
        epistemic_weight: f64,
    ) -> Option<String> {
        let mut ordered: Vec<Option<&str>> = Vec::with_capacity(candidates.len());
        if let Some(hint) = hint {
            for remembered in &hint.ranked {
                let as_ref = remembered.as_deref();
                if candidates.contains(&as_ref) && !ordered.contains(&as_ref) {
                    ordered.push(as_ref);
                }
            }
        }
        let mut rest: Vec<Option<&str>> = candidates
            .iter()
            .copied()
            .filter(|c| !ordered.contains(c))
            .collect();
        rest.sort_by_key(|a| key(*a));
        ordered.extend(rest);

        let mut best: Option<(f64, Option<&str>)> = None;
        for action in ordered {
            let score = self.score(state, action, epistemic_weight);
            match &best {
                Some((best_score, _)) if score >= *best_score => {}
                _ => best = Some((score, action)),
            }
        }
        best.and_then(|(_, action)| action.map(str::to_string))
    }
}
