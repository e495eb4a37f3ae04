//! Ultrastability: the agent adapting its own parameters.
//!
//! A bounded window of violation records is classified by family; the
//! majority family decides which adaptive parameters move. Tightening is
//! fast, relaxing is slow, every change is bounded by caps and floors, and a
//! rate limit keeps the mechanism from thrashing.

use entity_types::config::AdaptationConfig;
use entity_types::state::AdaptiveParameters;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// The family a violation belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationFamily {
    /// Energy fell into critical territory.
    Energy,
    /// V drifted away from the attractor.
    Stability,
    /// An invariant was violated.
    Integrity,
}

/// One recorded violation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// Cycle the violation was observed in.
    pub cycle: u64,
    /// Its family.
    pub family: ViolationFamily,
}

/// The outcome of one adaptation pass.
#[derive(Clone, Debug)]
pub struct Adaptation {
    /// The adjusted parameters.
    pub parameters: AdaptiveParameters,
    /// The family that drove the adjustment (`relax` when none).
    pub family: String,
}

/// The ultrastability mechanism.
pub struct Ultrastability {
    violations: VecDeque<ViolationRecord>,
    history: VecDeque<AdaptiveParameters>,
    recent_adaptations: VecDeque<u64>,
}

impl Ultrastability {
    /// Creates an empty mechanism.
    pub fn new() -> Self {
        Self {
            violations: VecDeque::new(),
            history: VecDeque::new(),
            recent_adaptations: VecDeque::new(),
        }
    }

    /// Records a violation, evicting the oldest past the window bound.
    pub fn record(&mut self, record: ViolationRecord, cfg: &AdaptationConfig) {
        if self.violations.len() == cfg.violation_window {
            self.violations.pop_front();
        }
        self.violations.push_back(record);
    }

    /// Violations currently in the window.
    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }

    /// Parameter snapshots taken so far, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &AdaptiveParameters> {
        self.history.iter()
    }

    /// Share of the window free of violations, in `[0, 1]`.
    pub fn stability_score(&self, cfg: &AdaptationConfig) -> f64 {
        if cfg.violation_window == 0 {
            return 1.0;
        }
        1.0 - (self.violations.len() as f64 / cfg.violation_window as f64).min(1.0)
    }

    fn majority_family(&self) -> Option<ViolationFamily> {
        let mut energy = 0usize;
        let mut stability = 0usize;
        let mut integrity = 0usize;
        for v in &self.violations {
            match v.family {
                ViolationFamily::Energy => energy += 1,
                ViolationFamily::Stability => stability += 1,
                ViolationFamily::Integrity => integrity += 1,
            }
        }
        if energy == 0 && stability == 0 && integrity == 0 {
            return None;
        }
        if energy >= stability && energy >= integrity {
            Some(ViolationFamily::Energy)
        } else if stability >= integrity {
            Some(ViolationFamily::Stability)
        } else {
            Some(ViolationFamily::Integrity)
        }
    }

    fn rate_limited(&mut self, cycle: u64, cfg: &AdaptationConfig) -> bool {
        let horizon = cycle.saturating_sub(cfg.violation_window as u64);
        while let Some(front) = self.recent_adaptations.front() {
            if *front < horizon {
                self.recent_adaptations.pop_front();
            } else {
                break;
            }
        }
        self.recent_adaptations.len() >= cfg.max_per_window
    }

    /// Runs one adaptation pass, due every `cfg.interval` cycles.
    ///
    /// Returns the adjustment taken, if any. The caller owns committing the
    /// AGENT_ULTRASTABILITY event.
    pub fn adapt(
        &mut self,
        cycle: u64,
        current: &AdaptiveParameters,
        cfg: &AdaptationConfig,
    ) -> Option<Adaptation> {
        if self.rate_limited(cycle, cfg) {
            return None;
        }

        let defaults = AdaptiveParameters::default();
        let mut next = current.clone();
        let family = match self.majority_family() {
            Some(ViolationFamily::Energy) => {
                next.critical_threshold =
                    (current.critical_threshold * (1.0 + cfg.rate)).min(cfg.critical_cap);
                next.urgency_threshold =
                    (current.urgency_threshold * (1.0 + cfg.rate)).min(cfg.urgency_cap);
                "energy"
            }
            Some(ViolationFamily::Stability) => {
                next.rest_threshold =
                    (current.rest_threshold * (1.0 - cfg.rate)).max(cfg.min_rest_threshold);
                next.decision_interval_ms = ((current.decision_interval_ms as f64
                    * (1.0 - cfg.rate)) as u64)
                    .max(cfg.min_decision_interval_ms);
                "stability"
            }
            Some(ViolationFamily::Integrity) => {
                // Integrity repair belongs to the recovery engine; the agent
                // only slows down to reduce write pressure.
                next.decision_interval_ms = ((current.decision_interval_ms as f64
                    * (1.0 + cfg.rate)) as u64)
                    .max(cfg.min_decision_interval_ms);
                "integrity"
            }
            None => {
                if self.stability_score(cfg) < 0.9 {
                    return None;
                }
                // Relax toward the defaults, at half the tightening rate.
                let relax = cfg.rate / 2.0;
                let toward = |from: f64, to: f64| from + (to - from) * relax;
                next.critical_threshold =
                    toward(current.critical_threshold, defaults.critical_threshold);
                next.urgency_threshold =
                    toward(current.urgency_threshold, defaults.urgency_threshold);
                next.rest_threshold = toward(current.rest_threshold, defaults.rest_threshold);
                next.decision_interval_ms = toward(
                    current.decision_interval_ms as f64,
                    defaults.decision_interval_ms as f64,
                ) as u64;
                "relax"
            }
        };

        if next == *current {
            return None;
        }

        if self.history.len() == cfg.parameter_history {
            self.history.pop_front();
        }
        self.history.push_back(next.clone());
        self.recent_adaptations.push_back(cycle);
        tracing::debug!(target: "agent", family, cycle, "parameters adapted");
        Some(Adaptation {
            parameters: next,
            family: family.to_string(),
        })
    }
}

impl Default for Ultrastability {
    fn default() -> Self {
        Self::new()
    }
}
