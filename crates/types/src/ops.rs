//! Data definitions for catalog and generated operations.
//!
//! Handlers themselves live in the `entity-ops` crate; this module holds the
//! durable, serializable half: the descriptor every operation carries, the
//! outcome record handlers return, and the template-instance definitions the
//! autopoiesis sub-record persists. Generated operations are parameterized
//! template instances, never arbitrary code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Descriptor shared by built-in and generated operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Dotted identifier, e.g. `state.summary`.
    pub id: String,
    /// Category label, e.g. `diagnostic` or `generated`.
    pub category: String,
    /// Integer complexity measure; bounds specialization.
    pub complexity: u32,
    /// Energy debited on successful execution.
    pub energy_cost: f64,
    /// Whether an active coupling session is required.
    pub requires_coupling: bool,
}

/// The state delta a handler may request.
///
/// Handlers are pure; every side effect flows through this record, which the
/// executor folds into the OPERATION event so replay reproduces it exactly.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateChanges {
    /// Relative energy adjustment (positive recharges, negative drains).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_delta: Option<f64>,
    /// Replacement human context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human: Option<Value>,
    /// A memory to append to the important list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_important: Option<String>,
    /// Replacement pattern digest for the learning block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns_hash: Option<String>,
}

impl StateChanges {
    /// Whether the delta changes anything at all.
    pub fn is_empty(&self) -> bool {
        self.energy_delta.is_none()
            && self.human.is_none()
            && self.add_important.is_none()
            && self.patterns_hash.is_none()
    }
}

/// The record a handler returns.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// Whether the operation achieved its purpose.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// Free-form observation payload for the caller.
    pub effects: Value,
    /// Requested state delta.
    pub state_changes: StateChanges,
}

impl OperationOutcome {
    /// A successful outcome with no state delta.
    pub fn observation(message: impl Into<String>, effects: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            effects,
            state_changes: StateChanges::default(),
        }
    }

    /// A failed outcome; the executor records it without touching state.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            effects: Value::Null,
            state_changes: StateChanges::default(),
        }
    }
}

/// The closed template set for generated operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// Reads a named state field into the effects payload.
    ReadField,
    /// Requests one fixed state change.
    SetField,
    /// Runs an ordered list of existing operations.
    Compose,
    /// Runs one of two operations depending on a state predicate.
    Conditional,
    /// Applies a fixed transformation to its input parameter.
    Transform,
    /// Aggregates a numeric state series into a summary.
    Aggregate,
    /// Returns its parameters unchanged.
    Echo,
}

/// Lifecycle status of a generated operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LifecycleStatus {
    /// Newly created; invisible to the policy until it ages out.
    Quarantined,
    /// Under observation; trial metrics accumulate.
    Trial,
    /// Proven safe; selectable by the policy.
    Active,
    /// Failed its trial; never selectable again.
    Deprecated,
}

/// Metrics accumulated while a generated operation is on trial.
///
/// Maxima are tracked alongside the cumulative sums so a single bad spike is
/// never averaged away: one positive ΔV is enough to deprecate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialMetrics {
    /// Times the operation ran during the trial.
    pub uses: u64,
    /// Times the operation was blocked during the trial.
    pub blocks: u64,
    /// Sum of observed Lyapunov deltas.
    pub delta_v_total: f64,
    /// Largest single observed Lyapunov delta.
    pub delta_v_max: f64,
    /// Sum of observed surprise deltas.
    pub delta_surprise_total: f64,
    /// Largest single observed surprise delta.
    pub delta_surprise_max: f64,
}

/// A generated-operation definition, owned by the autopoiesis sub-record.
///
/// The handler is reconstructed on demand from `template` + `params`; no
/// closures are persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratedOperation {
    /// Descriptor, as for built-in operations.
    pub spec: OperationSpec,
    /// Template tag.
    pub template: TemplateKind,
    /// Template parameters.
    pub params: Value,
    /// Generation depth; 1 for direct children of built-ins.
    pub depth: u32,
    /// Identifiers of the operations this one was derived from.
    pub parents: Vec<String>,
    /// Lifecycle status.
    pub status: LifecycleStatus,
    /// When the status last changed.
    pub status_changed_at: DateTime<Utc>,
    /// Agent cycle index at which quarantine began.
    pub quarantine_start_cycle: u64,
    /// Trial metrics; present once the operation reaches TRIAL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial: Option<TrialMetrics>,
}

impl GeneratedOperation {
    /// Whether the policy may select this operation.
    pub fn selectable(&self) -> bool {
        self.status == LifecycleStatus::Active
    }
}
