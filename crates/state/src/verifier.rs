//! The invariant verifier.
//!
//! Two modes, strictly separated:
//!
//! - [`pure_verify`] observes: it runs all five checks and computes V, but
//!   appends no events and modifies no state. It is idempotent, and it is
//!   the only verification the agent's feeling path may use.
//! - [`logged_verify`] acts: it runs the pure check and then records the
//!   outcome as a VERIFICATION event through the atomic write path.

use crate::lyapunov::{self, InvariantSummary};
use crate::manager::StateManager;
use crate::replay::replay;
use entity_storage::fingerprint::{fingerprint_spec_dir, read_recorded_fingerprint};
use entity_types::chain::verify_chain;
use entity_types::error::StateError;
use entity_types::event::{EventKind, VerificationData};
use entity_types::state::{IntegrityStatus, State};
use serde::Serialize;

/// Identifier of the organization-immutability invariant.
pub const INV_ORGANIZATION: &str = "INV-001";
/// Identifier of the state-determinism invariant.
pub const INV_DETERMINISM: &str = "INV-002";
/// Identifier of the chain-integrity invariant.
pub const INV_CHAIN: &str = "INV-003";
/// Identifier of the Lyapunov-monotonicity invariant.
pub const INV_LYAPUNOV: &str = "INV-004";
/// Identifier of the energy-viability invariant.
pub const INV_ENERGY: &str = "INV-005";

/// Result of one invariant check.
#[derive(Clone, Debug, Serialize)]
pub struct InvariantCheck {
    /// Invariant identifier (`INV-001` .. `INV-005`).
    pub id: &'static str,
    /// Whether the invariant holds.
    pub satisfied: bool,
    /// Human-readable observation.
    pub detail: String,
}

/// Result of a full verification pass.
#[derive(Clone, Debug, Serialize)]
pub struct VerificationReport {
    /// Per-invariant results, in identifier order.
    pub checks: Vec<InvariantCheck>,
    /// Lyapunov value computed from this pass.
    pub v: f64,
    /// Whether every invariant holds.
    pub passed: bool,
}

impl VerificationReport {
    /// Identifiers of the violated invariants.
    pub fn violations(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| !c.satisfied)
            .map(|c| c.id.to_string())
            .collect()
    }

    /// Whether a specific invariant is violated in this report.
    pub fn is_violated(&self, id: &str) -> bool {
        self.checks.iter().any(|c| c.id == id && !c.satisfied)
    }

    /// Fraction of satisfied invariants, in `[0, 1]`.
    pub fn satisfied_fraction(&self) -> f64 {
        if self.checks.is_empty() {
            return 1.0;
        }
        self.checks.iter().filter(|c| c.satisfied).count() as f64 / self.checks.len() as f64
    }
}

fn check(id: &'static str, satisfied: bool, detail: impl Into<String>) -> InvariantCheck {
    InvariantCheck {
        id,
        satisfied,
        detail: detail.into(),
    }
}

/// Runs all five invariant checks without touching state or the log.
pub fn pure_verify(manager: &StateManager) -> Result<VerificationReport, StateError> {
    let state = manager.read_state()?;
    let events = manager.events().map_err(StateError::Storage)?;
    let mut checks = Vec::with_capacity(5);

    // INV-001: the specification documents still hash to the recorded
    // fingerprint, and the state agrees.
    let organization = match (
        fingerprint_spec_dir(&manager.paths().spec_dir()),
        read_recorded_fingerprint(&manager.paths().organization_file()),
    ) {
        (Ok(computed), Ok(recorded)) => {
            if computed == recorded && computed == state.organization_hash {
                check(INV_ORGANIZATION, true, "organization fingerprint intact")
            } else {
                check(
                    INV_ORGANIZATION,
                    false,
                    format!("fingerprint mismatch: computed {computed}, recorded {recorded}"),
                )
            }
        }
        (Err(e), _) | (_, Err(e)) => check(
            INV_ORGANIZATION,
            false,
            format!("fingerprint unavailable: {e}"),
        ),
    };
    checks.push(organization);

    // INV-002: replay agrees with the cache on the invariant-bound fields.
    let determinism = match replay(&events) {
        Ok(replayed) => {
            if replayed.organization_hash != state.organization_hash {
                check(INV_DETERMINISM, false, "organization_hash diverges from replay")
            } else if replayed.memory.event_count != state.memory.event_count {
                check(
                    INV_DETERMINISM,
                    false,
                    format!(
                        "event_count diverges: replay {}, state {}",
                        replayed.memory.event_count, state.memory.event_count
                    ),
                )
            } else if replayed.memory.last_event_hash != state.memory.last_event_hash {
                check(INV_DETERMINISM, false, "last_event_hash diverges from replay")
            } else {
                check(INV_DETERMINISM, true, "replay agrees with state")
            }
        }
        Err(e) => check(INV_DETERMINISM, false, format!("replay failed: {e}")),
    };
    checks.push(determinism);

    // INV-003: the chain links verify.
    let chain = match verify_chain(&events) {
        Ok(()) => check(INV_CHAIN, true, format!("{} events linked", events.len())),
        Err(e) => check(INV_CHAIN, false, e.to_string()),
    };
    checks.push(chain);

    // INV-004: any V increase fits within the admissible disturbance
    // capacity, taken as the current energy level.
    let delta = state.lyapunov.v - state.lyapunov.v_previous;
    let lyap = if delta <= 0.0 || delta <= state.energy.current {
        check(INV_LYAPUNOV, true, format!("ΔV = {delta:.6}"))
    } else {
        check(
            INV_LYAPUNOV,
            false,
            format!(
                "ΔV {delta:.6} exceeds capacity {:.6}",
                state.energy.current
            ),
        )
    };
    checks.push(lyap);

    // INV-005: energy stays viable unless the entity is already terminal.
    let energy_ok = state.energy.current >= state.energy.min
        || state.integrity.status == IntegrityStatus::Terminal;
    checks.push(if energy_ok {
        check(
            INV_ENERGY,
            true,
            format!("energy {:.4} ≥ min {:.4}", state.energy.current, state.energy.min),
        )
    } else {
        check(
            INV_ENERGY,
            false,
            format!("energy {:.4} below min {:.4}", state.energy.current, state.energy.min),
        )
    });

    let summary = InvariantSummary {
        fatal_violated: checks
            .iter()
            .filter(|c| !c.satisfied && (c.id == INV_ORGANIZATION || c.id == INV_CHAIN))
            .count(),
        fatal_total: 2,
        satisfied: checks.iter().filter(|c| c.satisfied).count(),
        total: checks.len(),
    };
    let v = lyapunov::compute(&summary, &state.energy);
    let passed = checks.iter().all(|c| c.satisfied);

    Ok(VerificationReport { checks, v, passed })
}

/// The integrity status a verification outcome implies.
pub fn next_status(state: &State, report: &VerificationReport) -> IntegrityStatus {
    if state.integrity.status == IntegrityStatus::Terminal {
        return IntegrityStatus::Terminal;
    }
    if report.is_violated(INV_ORGANIZATION) {
        return IntegrityStatus::Terminal;
    }
    if report.is_violated(INV_ENERGY) {
        return if state.energy.current <= 0.0 {
            IntegrityStatus::Terminal
        } else {
            IntegrityStatus::Dormant
        };
    }
    if !report.passed {
        return IntegrityStatus::Degraded;
    }
    IntegrityStatus::Nominal
}

/// Runs the pure check and records its outcome as a VERIFICATION event.
///
/// When the entity is already terminal the outcome is returned without an
/// append; terminal history is frozen.
pub fn logged_verify(manager: &StateManager) -> Result<(VerificationReport, State), StateError> {
    let report = pure_verify(manager)?;
    let state = manager.read_state()?;
    if state.integrity.status == IntegrityStatus::Terminal {
        return Ok((report, state));
    }

    let status = next_status(&state, &report);
    let data = VerificationData {
        passed: report.passed,
        violations: report.violations(),
        status,
        v: report.v,
    };
    let (state, _event) = manager.append_event(
        EventKind::Verification,
        serde_json::to_value(&data).map_err(|e| StateError::MalformedPayload {
            seq: state.memory.event_count + 1,
            detail: e.to_string(),
        })?,
    )?;
    if !report.passed {
        tracing::warn!(target: "verifier", violations = ?data.violations, "verification failed");
    }
    Ok((report, state))
}
