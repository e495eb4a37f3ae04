//! The FEEL phase: classifying the situation into a feeling.
//!
//! All inputs come from the state and a *pure* verification report; the
//! feeling computation itself observes and never acts.

use entity_state::lyapunov;
use entity_state::verifier::VerificationReport;
use entity_types::state::{AdaptiveParameters, State};
use serde::{Deserialize, Serialize};

/// Energy classification, by adaptive thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyFeeling {
    /// Plenty of energy for exploration.
    Vital,
    /// Enough for normal operation.
    Adequate,
    /// Conserve where possible.
    Low,
    /// Existence is at stake.
    Critical,
}

/// Stability classification, by V against the adaptive rest threshold and
/// the fixed bands at 0.1 and 0.3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StabilityFeeling {
    /// At the attractor.
    Attractor,
    /// Near the attractor.
    Stable,
    /// Moving away.
    Drifting,
    /// Far from the attractor.
    Unstable,
}

/// Integrity classification, by satisfied-of-total.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityFeeling {
    /// Every invariant holds.
    Whole,
    /// Minor violation pressure.
    Stressed,
    /// The invariant set is broken.
    Violated,
}

/// Energy level above which the entity feels vital.
const VITAL_THRESHOLD: f64 = 0.7;
/// Fixed stability bands above the adaptive rest threshold.
const STABLE_BAND: f64 = 0.1;
const DRIFTING_BAND: f64 = 0.3;

/// The complete feeling of one cycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Feeling {
    /// Weighted surprise ε.
    pub surprise: f64,
    /// Energy classification.
    pub energy: EnergyFeeling,
    /// Stability classification.
    pub stability: StabilityFeeling,
    /// Integrity classification.
    pub integrity: IntegrityFeeling,
    /// Energy level observed.
    pub energy_level: f64,
    /// Lyapunov value observed.
    pub v: f64,
    /// Fraction of satisfied invariants.
    pub integrity_fraction: f64,
    /// Existence is threatened.
    pub threatens_existence: bool,
    /// Stability is threatened.
    pub threatens_stability: bool,
    /// Conditions invite growth.
    pub needs_growth: bool,
}

/// Computes the feeling from state, a pure verification report, and the
/// current adaptive parameters.
pub fn compute(state: &State, report: &VerificationReport, params: &AdaptiveParameters) -> Feeling {
    let energy_level = state.energy.current;
    let v = report.v;
    let integrity_fraction = report.satisfied_fraction();

    let energy = if energy_level < params.critical_threshold {
        EnergyFeeling::Critical
    } else if energy_level < params.urgency_threshold {
        EnergyFeeling::Low
    } else if energy_level >= VITAL_THRESHOLD {
        EnergyFeeling::Vital
    } else {
        EnergyFeeling::Adequate
    };

    let stability = if v <= params.rest_threshold {
        StabilityFeeling::Attractor
    } else if v < STABLE_BAND {
        StabilityFeeling::Stable
    } else if v < DRIFTING_BAND {
        StabilityFeeling::Drifting
    } else {
        StabilityFeeling::Unstable
    };

    let integrity = if integrity_fraction >= 1.0 {
        IntegrityFeeling::Whole
    } else if integrity_fraction >= 0.6 {
        IntegrityFeeling::Stressed
    } else {
        IntegrityFeeling::Violated
    };

    let energy_surprise = lyapunov::energy_distance(&state.energy);
    let integrity_surprise = 1.0 - integrity_fraction;
    let surprise = 0.4 * energy_surprise + 0.4 * v + 0.2 * integrity_surprise;

    let any_violation = integrity_fraction < 1.0;
    Feeling {
        surprise,
        energy,
        stability,
        integrity,
        energy_level,
        v,
        integrity_fraction,
        threatens_existence: matches!(energy, EnergyFeeling::Critical | EnergyFeeling::Low),
        threatens_stability: v > STABLE_BAND || any_violation,
        needs_growth: energy == EnergyFeeling::Vital
            && stability == StabilityFeeling::Attractor
            && integrity == IntegrityFeeling::Whole,
    }
}
