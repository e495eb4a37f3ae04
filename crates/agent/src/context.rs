//! Cycle context derivation.
//!
//! Context is derived, never declared, with one narrow override. The test
//! channel comes from the process environment and cannot be overridden; an
//! active coupling session means a human is watching, so the agent audits
//! rather than produces. Only `production` cycles may teach the system.

use entity_types::state::State;

/// Environment variable that forces test context.
pub const ENV_TAG: &str = "ENTITY_ENV";

/// The effective context of an agent cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleContext {
    /// Verification runs; nothing may teach or mutate the system.
    Test,
    /// A partner is coupled; observe without polluting metrics.
    Audit,
    /// Normal autonomous operation.
    Production,
}

impl CycleContext {
    /// Whether usage tracking, adaptation, self-production, and lifecycle
    /// transitions are allowed.
    pub fn allows_side_effects(self) -> bool {
        self == CycleContext::Production
    }
}

/// Derives the effective context.
///
/// Precedence: process test tag, then the manual override, then coupling,
/// then production.
pub fn derive(state: &State, manual_override: Option<&str>) -> CycleContext {
    if std::env::var(ENV_TAG).as_deref() == Ok("test") {
        return CycleContext::Test;
    }
    match manual_override {
        Some("audit") => return CycleContext::Audit,
        Some("production") => return CycleContext::Production,
        _ => {}
    }
    if state.coupling.active {
        return CycleContext::Audit;
    }
    CycleContext::Production
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn state(coupled: bool) -> State {
        let mut s = State::genesis(
            "entity/1.0".into(),
            "hash".into(),
            "operator".into(),
            None,
            Utc::now(),
        );
        s.coupling.active = coupled;
        s
    }

    #[test]
    fn coupling_forces_audit() {
        assert_eq!(derive(&state(true), None), CycleContext::Audit);
        assert_eq!(derive(&state(false), None), CycleContext::Production);
    }

    #[test]
    fn manual_override_beats_coupling() {
        assert_eq!(
            derive(&state(true), Some("production")),
            CycleContext::Production
        );
        assert_eq!(derive(&state(false), Some("audit")), CycleContext::Audit);
    }

    #[test]
    fn unknown_override_is_ignored() {
        assert_eq!(derive(&state(false), Some("weird")), CycleContext::Production);
    }
}
