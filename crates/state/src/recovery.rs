//! The recovery engine.
//!
//! Takes a verification report with violations and works through the repairs
//! in severity order. Organization and chain violations are never repaired
//! automatically: the first is terminal, the second demands an operator.
//! Replay mismatches, Lyapunov drift, and energy exhaustion have specific
//! repairs. Every status change is event-logged through the write path.

use crate::manager::StateManager;
use crate::verifier::{
    self, VerificationReport, INV_CHAIN, INV_DETERMINISM, INV_ENERGY, INV_LYAPUNOV,
    INV_ORGANIZATION,
};
use entity_types::error::RecoveryError;
use entity_types::event::{EventKind, VerificationData};
use entity_types::state::IntegrityStatus;
use serde::{Deserialize, Serialize};

/// Final status of a recovery run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryStatus {
    /// All violations repaired; the entity is nominal again.
    Recovered,
    /// Some violations remain; operator attention is needed.
    Degraded,
    /// The entity is terminal; no further mutation is possible.
    Terminal,
}

/// One repair attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepairAttempt {
    /// The invariant the attempt addressed.
    pub invariant: String,
    /// What the engine did.
    pub action: String,
    /// What came of it.
    pub outcome: String,
}

/// The ordered record of a recovery run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Attempts, in the order they ran.
    pub attempts: Vec<RepairAttempt>,
    /// Final status.
    pub status: RecoveryStatus,
}

fn attempt(
    invariant: &str,
    action: impl Into<String>,
    outcome: impl Into<String>,
) -> RepairAttempt {
    RepairAttempt {
        invariant: invariant.to_string(),
        action: action.into(),
        outcome: outcome.into(),
    }
}

fn mark_status(
    manager: &StateManager,
    report: &VerificationReport,
    status: IntegrityStatus,
) -> Result<(), RecoveryError> {
    let data = VerificationData {
        passed: report.passed,
        violations: report.violations(),
        status,
        v: report.v,
    };
    let value = serde_json::to_value(&data).map_err(|e| {
        RecoveryError::ManualRequired(format!("could not encode verification outcome: {e}"))
    })?;
    manager.append_event(EventKind::Verification, value)?;
    Ok(())
}

/// Runs the repair sequence for the violations in `report`.
pub fn recover(
    manager: &StateManager,
    report: &VerificationReport,
) -> Result<RecoveryReport, RecoveryError> {
    let mut attempts = Vec::new();

    if report.passed {
        return Ok(RecoveryReport {
            attempts,
            status: RecoveryStatus::Recovered,
        });
    }

    // INV-001: unrecoverable. Mark terminal and stop; the organization is
    // the entity's identity and cannot be restored from inside.
    if report.is_violated(INV_ORGANIZATION) {
        mark_status(manager, report, IntegrityStatus::Terminal)?;
        attempts.push(attempt(
            INV_ORGANIZATION,
            "mark terminal",
            "organization fingerprint mismatch; operator intervention required",
        ));
        tracing::error!(target: "recovery", "organization violated; entity is terminal");
        return Ok(RecoveryReport {
            attempts,
            status: RecoveryStatus::Terminal,
        });
    }

    // INV-003: a broken chain freezes the log. Appending anything to it
    // would bury the break, so the engine refuses and leaves the directory
    // to the operator.
    if report.is_violated(INV_CHAIN) {
        attempts.push(attempt(
            INV_CHAIN,
            "refuse automatic repair",
            "chain break requires manual repair; no further append permitted",
        ));
        tracing::error!(target: "recovery", "chain violated; refusing to append");
        return Ok(RecoveryReport {
            attempts,
            status: RecoveryStatus::Degraded,
        });
    }

    // INV-002: the cache diverged from the log. The log is canonical;
    // rebuild the cache from replay under the lock.
    if report.is_violated(INV_DETERMINISM) {
        manager.rebuild_from_replay()?;
        attempts.push(attempt(
            INV_DETERMINISM,
            "rebuild state from replay",
            "state cache rebuilt",
        ));
    }

    // INV-004: recompute V from the current state; only a value at or below
    // the stored one is accepted.
    if report.is_violated(INV_LYAPUNOV) {
        let state = manager.read_state()?;
        let fresh = verifier::pure_verify(manager)?;
        if fresh.v <= state.lyapunov.v {
            manager.append_event(
                EventKind::StateUpdate,
                serde_json::json!({ "lyapunov": fresh.v }),
            )?;
            attempts.push(attempt(
                INV_LYAPUNOV,
                "recompute V",
                format!("V lowered from {:.6} to {:.6}", state.lyapunov.v, fresh.v),
            ));
        } else {
            attempts.push(attempt(
                INV_LYAPUNOV,
                "recompute V",
                "recomputed V would increase; left unchanged",
            ));
        }
    }

    // INV-005: below minimum but above zero is dormancy; zero is terminal.
    if report.is_violated(INV_ENERGY) {
        let state = manager.read_state()?;
        if state.energy.current <= 0.0 {
            mark_status(manager, report, IntegrityStatus::Terminal)?;
            attempts.push(attempt(
                INV_ENERGY,
                "mark terminal",
                "energy exhausted",
            ));
            return Ok(RecoveryReport {
                attempts,
                status: RecoveryStatus::Terminal,
            });
        }
        mark_status(manager, report, IntegrityStatus::Dormant)?;
        attempts.push(attempt(
            INV_ENERGY,
            "mark dormant",
            format!(
                "energy {:.4} below min {:.4}; awaiting recharge",
                state.energy.current, state.energy.min
            ),
        ));
        return Ok(RecoveryReport {
            attempts,
            status: RecoveryStatus::Degraded,
        });
    }

    // Re-verify to decide the final status.
    let fresh = verifier::pure_verify(manager)?;
    let status = if fresh.passed {
        mark_status(manager, &fresh, IntegrityStatus::Nominal)?;
        RecoveryStatus::Recovered
    } else {
        mark_status(manager, &fresh, IntegrityStatus::Degraded)?;
        RecoveryStatus::Degraded
    };
    tracing::info!(target: "recovery", ?status, attempts = attempts.len(), "recovery finished");
    Ok(RecoveryReport { attempts, status })
}
