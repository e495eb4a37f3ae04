//! Shared configuration structures and the on-disk path layout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The persisted layout under an entity's base directory.
///
/// ```text
/// <base>/
///   ORGANIZATION.sha256
///   spec/...
///   state/current.json
///   events/000001, 000002, ...
///   events/.lock
///   snapshots/...
/// ```
#[derive(Clone, Debug)]
pub struct EntityPaths {
    base: PathBuf,
}

impl EntityPaths {
    /// Creates the layout rooted at `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The base directory itself.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The immutable specification documents.
    pub fn spec_dir(&self) -> PathBuf {
        self.base.join("spec")
    }

    /// The organization fingerprint file.
    pub fn organization_file(&self) -> PathBuf {
        self.base.join("ORGANIZATION.sha256")
    }

    /// The event directory.
    pub fn events_dir(&self) -> PathBuf {
        self.base.join("events")
    }

    /// The exclusive-write advisory lock file.
    pub fn lock_file(&self) -> PathBuf {
        self.events_dir().join(".lock")
    }

    /// The derived state cache.
    pub fn state_file(&self) -> PathBuf {
        self.base.join("state").join("current.json")
    }

    /// The snapshot bundle directory.
    pub fn snapshots_dir(&self) -> PathBuf {
        self.base.join("snapshots")
    }
}

fn default_true() -> bool {
    true
}

fn default_feeling_cost() -> f64 {
    0.001
}

fn default_epistemic_weight() -> f64 {
    0.3
}

fn default_cycle_memory_capacity() -> usize {
    200
}

fn default_violation_window() -> usize {
    50
}

fn default_adaptation_interval() -> u64 {
    10
}

fn default_adaptation_rate() -> f64 {
    0.05
}

fn default_max_adaptations_per_window() -> usize {
    5
}

fn default_parameter_history() -> usize {
    20
}

fn default_min_rest_threshold() -> f64 {
    0.01
}

fn default_min_decision_interval_ms() -> u64 {
    5_000
}

fn default_critical_cap() -> f64 {
    0.15
}

fn default_urgency_cap() -> f64 {
    0.3
}

fn default_production_threshold() -> u64 {
    25
}

fn default_production_cooldown() -> u64 {
    50
}

fn default_quarantine_cycles() -> u64 {
    20
}

fn default_trial_uses() -> u64 {
    5
}

fn default_drift_threshold() -> f64 {
    0.05
}

/// Tunables for the self-production gate and quarantine lifecycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelfProductionConfig {
    /// Usage count at which an action becomes a specialization candidate.
    #[serde(default = "default_production_threshold")]
    pub threshold: u64,
    /// Minimum cycles between two productions.
    #[serde(default = "default_production_cooldown")]
    pub cooldown: u64,
    /// Cycles a newborn operation stays quarantined.
    #[serde(default = "default_quarantine_cycles")]
    pub quarantine_cycles: u64,
    /// Trial uses required before promotion to ACTIVE.
    #[serde(default = "default_trial_uses")]
    pub trial_uses: u64,
    /// Average surprise drift above which a trial fails.
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: f64,
}

impl Default for SelfProductionConfig {
    fn default() -> Self {
        Self {
            threshold: default_production_threshold(),
            cooldown: default_production_cooldown(),
            quarantine_cycles: default_quarantine_cycles(),
            trial_uses: default_trial_uses(),
            drift_threshold: default_drift_threshold(),
        }
    }
}

/// Tunables for the ultrastability adaptation mechanism.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdaptationConfig {
    /// Cycles between adaptation passes.
    #[serde(default = "default_adaptation_interval")]
    pub interval: u64,
    /// Base adjustment rate.
    #[serde(default = "default_adaptation_rate")]
    pub rate: f64,
    /// Bounded violation window consulted by each pass.
    #[serde(default = "default_violation_window")]
    pub violation_window: usize,
    /// Bounded history of parameter snapshots.
    #[serde(default = "default_parameter_history")]
    pub parameter_history: usize,
    /// Rate limit on adaptations per window.
    #[serde(default = "default_max_adaptations_per_window")]
    pub max_per_window: usize,
    /// Floor for the rest threshold.
    #[serde(default = "default_min_rest_threshold")]
    pub min_rest_threshold: f64,
    /// Floor for the decision interval, in milliseconds.
    #[serde(default = "default_min_decision_interval_ms")]
    pub min_decision_interval_ms: u64,
    /// Cap for the critical threshold.
    #[serde(default = "default_critical_cap")]
    pub critical_cap: f64,
    /// Cap for the urgency threshold.
    #[serde(default = "default_urgency_cap")]
    pub urgency_cap: f64,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            interval: default_adaptation_interval(),
            rate: default_adaptation_rate(),
            violation_window: default_violation_window(),
            parameter_history: default_parameter_history(),
            max_per_window: default_max_adaptations_per_window(),
            min_rest_threshold: default_min_rest_threshold(),
            min_decision_interval_ms: default_min_decision_interval_ms(),
            critical_cap: default_critical_cap(),
            urgency_cap: default_urgency_cap(),
        }
    }
}

/// Configuration of the sense-making agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Whether the agent keeps acting while a coupling session is open.
    #[serde(default)]
    pub active_when_coupled: bool,
    /// Whether action selection uses active inference.
    #[serde(default = "default_true")]
    pub active_inference: bool,
    /// Weight of the epistemic term in expected free energy.
    #[serde(default = "default_epistemic_weight")]
    pub epistemic_weight: f64,
    /// Energy debited by the feeling phase of every cycle.
    #[serde(default = "default_feeling_cost")]
    pub feeling_cost: f64,
    /// Bounded cycle-memory window.
    #[serde(default = "default_cycle_memory_capacity")]
    pub cycle_memory_capacity: usize,
    /// Manual context override (`production` or `audit`); the test channel
    /// from the process environment cannot be overridden.
    #[serde(default)]
    pub context_override: Option<String>,
    /// Self-production tunables.
    #[serde(default)]
    pub self_production: SelfProductionConfig,
    /// Ultrastability tunables.
    #[serde(default)]
    pub adaptation: AdaptationConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            active_when_coupled: false,
            active_inference: true,
            epistemic_weight: default_epistemic_weight(),
            feeling_cost: default_feeling_cost(),
            cycle_memory_capacity: default_cycle_memory_capacity(),
            context_override: None,
            self_production: SelfProductionConfig::default(),
            adaptation: AdaptationConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_the_documented_layout() {
        let p = EntityPaths::new("/tmp/entity");
        assert_eq!(p.events_dir(), Path::new("/tmp/entity/events"));
        assert_eq!(p.lock_file(), Path::new("/tmp/entity/events/.lock"));
        assert_eq!(p.state_file(), Path::new("/tmp/entity/state/current.json"));
        assert_eq!(
            p.organization_file(),
            Path::new("/tmp/entity/ORGANIZATION.sha256")
        );
    }

    #[test]
    fn agent_config_defaults_from_empty_document() {
        let cfg: AgentConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.active_inference);
        assert_eq!(cfg.cycle_memory_capacity, 200);
        assert_eq!(cfg.adaptation.violation_window, 50);
        assert_eq!(cfg.adaptation.parameter_history, 20);
        assert_eq!(cfg.adaptation.max_per_window, 5);
    }
}
