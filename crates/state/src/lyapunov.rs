//! The Lyapunov function: a scalar distance from the attractor.
//!
//! `V = w1·integrity_distance + w2·coherence_distance + w3·energy_distance`,
//! every term in `[0, 1]`, weights positive. `V = 0` exactly when all
//! invariants are satisfied and energy sits at or above its threshold.

use entity_types::state::Energy;

/// Weights of the three distance terms.
#[derive(Clone, Copy, Debug)]
pub struct Weights {
    /// Weight of the fatal-invariant distance.
    pub integrity: f64,
    /// Weight of the all-invariant coherence distance.
    pub coherence: f64,
    /// Weight of the energy distance.
    pub energy: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            integrity: 0.4,
            coherence: 0.3,
            energy: 0.3,
        }
    }
}

/// How far the invariant set is from fully healthy.
#[derive(Clone, Copy, Debug, Default)]
pub struct InvariantSummary {
    /// Violated invariants among the fatal ones (organization, chain).
    pub fatal_violated: usize,
    /// Total fatal invariants.
    pub fatal_total: usize,
    /// Satisfied invariants over the whole set.
    pub satisfied: usize,
    /// Total invariants.
    pub total: usize,
}

/// Distance of the energy level from its comfort threshold, in `[0, 1]`.
pub fn energy_distance(energy: &Energy) -> f64 {
    if energy.threshold <= 0.0 {
        return 0.0;
    }
    ((energy.threshold - energy.current) / energy.threshold).clamp(0.0, 1.0)
}

/// Computes V from an invariant summary and the energy block.
pub fn compute(summary: &InvariantSummary, energy: &Energy) -> f64 {
    compute_weighted(summary, energy, Weights::default())
}

/// Computes V with explicit weights.
pub fn compute_weighted(summary: &InvariantSummary, energy: &Energy, w: Weights) -> f64 {
    let integrity_distance = if summary.fatal_total == 0 {
        0.0
    } else {
        summary.fatal_violated as f64 / summary.fatal_total as f64
    };
    let coherence_distance = if summary.total == 0 {
        0.0
    } else {
        1.0 - summary.satisfied as f64 / summary.total as f64
    };
    w.integrity * integrity_distance
        + w.coherence * coherence_distance
        + w.energy * energy_distance(energy)
}
