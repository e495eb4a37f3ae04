//! The quarantine lifecycle for generated operations.
//!
//! ```text
//! QUARANTINED ──(age ≥ quarantine_cycles)──▶ TRIAL ──▶ ACTIVE
//!                                               └────▶ DEPRECATED
//! ```
//!
//! Ages are measured in agent cycles, never wall clock. Promotion demands a
//! clean trial: enough uses, zero blocks, no single positive ΔV, and bounded
//! surprise drift. One bad spike deprecates; maxima are never averaged away.
//! The transition functions are pure; callers commit the updated record as a
//! META_OPERATION event.

use chrono::Utc;
use entity_state::manager::StateManager;
use entity_types::config::SelfProductionConfig;
use entity_types::error::OperationError;
use entity_types::event::{EventKind, MetaOperationData};
use entity_types::ops::{LifecycleStatus, TrialMetrics};
use entity_types::state::{Autopoiesis, State};
use serde::{Deserialize, Serialize};

/// One lifecycle transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LifecycleTransition {
    /// The operation that moved.
    pub id: String,
    /// Status before.
    pub from: LifecycleStatus,
    /// Status after.
    pub to: LifecycleStatus,
    /// Why.
    pub reason: String,
}

fn trial_verdict(metrics: &TrialMetrics, cfg: &SelfProductionConfig) -> Option<(LifecycleStatus, String)> {
    if metrics.blocks > 0 {
        return Some((
            LifecycleStatus::Deprecated,
            format!("{} blocks during trial", metrics.blocks),
        ));
    }
    if metrics.delta_v_max > 0.0 {
        return Some((
            LifecycleStatus::Deprecated,
            format!("ΔV spike {:.6} during trial", metrics.delta_v_max),
        ));
    }
    if metrics.uses > 0 {
        let avg_drift = metrics.delta_surprise_total / metrics.uses as f64;
        if avg_drift > cfg.drift_threshold {
            return Some((
                LifecycleStatus::Deprecated,
                format!("average surprise drift {avg_drift:.6} over threshold"),
            ));
        }
    }
    if metrics.uses >= cfg.trial_uses && metrics.delta_surprise_max <= cfg.drift_threshold {
        return Some((
            LifecycleStatus::Active,
            format!("clean trial over {} uses", metrics.uses),
        ));
    }
    None
}

/// Advances every generated operation one lifecycle step.
///
/// Pure: returns the updated record and the transitions taken.
pub fn advance(
    autopoiesis: &Autopoiesis,
    current_cycle: u64,
    cfg: &SelfProductionConfig,
) -> (Autopoiesis, Vec<LifecycleTransition>) {
    let mut updated = autopoiesis.clone();
    let mut transitions = Vec::new();

    for op in &mut updated.generated {
        match op.status {
            LifecycleStatus::Quarantined => {
                let age = current_cycle.saturating_sub(op.quarantine_start_cycle);
                if age >= cfg.quarantine_cycles {
                    op.status = LifecycleStatus::Trial;
                    op.status_changed_at = Utc::now();
                    op.trial = Some(TrialMetrics::default());
                    transitions.push(LifecycleTransition {
                        id: op.spec.id.clone(),
                        from: LifecycleStatus::Quarantined,
                        to: LifecycleStatus::Trial,
                        reason: format!("quarantine aged {age} cycles"),
                    });
                }
            }
            LifecycleStatus::Trial => {
                let Some(metrics) = &op.trial else { continue };
                if let Some((to, reason)) = trial_verdict(metrics, cfg) {
                    let from = op.status;
                    op.status = to;
                    op.status_changed_at = Utc::now();
                    transitions.push(LifecycleTransition {
                        id: op.spec.id.clone(),
                        from,
                        to,
                        reason,
                    });
                }
            }
            LifecycleStatus::Active | LifecycleStatus::Deprecated => {}
        }
    }
    (updated, transitions)
}

/// Records one observed trial use. Pure; `None` when the operation is not on
/// trial.
pub fn record_use(
    autopoiesis: &Autopoiesis,
    id: &str,
    delta_v: f64,
    delta_surprise: f64,
) -> Option<Autopoiesis> {
    let mut updated = autopoiesis.clone();
    let op = updated
        .generated
        .iter_mut()
        .find(|g| g.spec.id == id && g.status == LifecycleStatus::Trial)?;
    let metrics = op.trial.get_or_insert_with(TrialMetrics::default);
    metrics.uses += 1;
    metrics.delta_v_total += delta_v;
    metrics.delta_v_max = metrics.delta_v_max.max(delta_v);
    metrics.delta_surprise_total += delta_surprise;
    metrics.delta_surprise_max = metrics.delta_surprise_max.max(delta_surprise);
    Some(updated)
}

/// Records one block against a trial operation. Pure.
pub fn record_block(autopoiesis: &Autopoiesis, id: &str) -> Option<Autopoiesis> {
    let mut updated = autopoiesis.clone();
    let op = updated
        .generated
        .iter_mut()
        .find(|g| g.spec.id == id && g.status == LifecycleStatus::Trial)?;
    let metrics = op.trial.get_or_insert_with(TrialMetrics::default);
    metrics.blocks += 1;
    Some(updated)
}

/// Commits an updated autopoiesis record as a META_OPERATION event.
pub fn commit(
    manager: &StateManager,
    action: &str,
    operation_id: &str,
    autopoiesis: Autopoiesis,
) -> Result<State, OperationError> {
    let data = MetaOperationData {
        action: action.to_string(),
        operation_id: operation_id.to_string(),
        autopoiesis,
    };
    let value = serde_json::to_value(&data).map_err(|e| OperationError::HandlerFailed {
        id: operation_id.to_string(),
        message: format!("lifecycle record not serializable: {e}"),
    })?;
    let (state, _event) = manager.append_event(EventKind::MetaOperation, value)?;
    Ok(state)
}
