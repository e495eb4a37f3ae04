//! The append-only event record.
//!
//! Events are the only durable history the kernel owns. Each event carries a
//! contiguous sequence number, an ISO-8601 UTC timestamp, a kind tag from a
//! closed set, an opaque JSON payload, the hash of its predecessor, and its
//! own content hash. The self-hash covers the canonical form of every field
//! except the hash itself.

use crate::codec;
use crate::error::CodecError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of event kinds.
///
/// Kinds not yet known to this build deserialize into [`EventKind::Other`]
/// and replay as no-ops beyond the memory-block bookkeeping, so newer logs
/// stay loadable by older binaries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// The first event of every log; initialises identity and organization.
    #[serde(rename = "GENESIS")]
    Genesis,
    /// A coupling session with an external partner began.
    #[serde(rename = "SESSION_START")]
    SessionStart,
    /// The active coupling session ended.
    #[serde(rename = "SESSION_END")]
    SessionEnd,
    /// A conditional update of energy, Lyapunov, human context, or memories.
    #[serde(rename = "STATE_UPDATE")]
    StateUpdate,
    /// A catalog operation executed successfully.
    #[serde(rename = "OPERATION")]
    Operation,
    /// An operation or transition was refused; recorded for audit.
    #[serde(rename = "BLOCK")]
    Block,
    /// An invariant verification ran and its outcome was recorded.
    #[serde(rename = "VERIFICATION")]
    Verification,
    /// A state snapshot bundle was written.
    #[serde(rename = "SNAPSHOT")]
    Snapshot,
    /// A learning pass updated the pattern digest.
    #[serde(rename = "LEARNING")]
    Learning,
    /// The autopoiesis sub-record was replaced by a meta-operation.
    #[serde(rename = "META_OPERATION")]
    MetaOperation,
    /// The agent woke up.
    #[serde(rename = "AGENT_WAKE")]
    AgentWake,
    /// The agent went to sleep.
    #[serde(rename = "AGENT_SLEEP")]
    AgentSleep,
    /// The agent chose (or was blocked on) an action this cycle.
    #[serde(rename = "AGENT_RESPONSE")]
    AgentResponse,
    /// The agent rested; emitted every tenth rest cycle to bound log growth.
    #[serde(rename = "AGENT_REST")]
    AgentRest,
    /// The agent adapted its own parameters.
    #[serde(rename = "AGENT_ULTRASTABILITY")]
    AgentUltrastability,
    /// A kind tag this build does not recognise.
    #[serde(untagged)]
    Other(String),
}

/// A single immutable record in the event chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number, contiguous from 1.
    pub seq: u64,
    /// Kind tag.
    pub kind: EventKind,
    /// ISO-8601 UTC creation time.
    pub timestamp: DateTime<Utc>,
    /// Opaque payload; its shape is fixed per kind by the replay applier.
    pub data: Value,
    /// Hash of the previous event; `None` only for sequence 1.
    pub prev_hash: Option<String>,
    /// Hex SHA-256 of the canonical form of all fields above.
    pub hash: String,
}

/// The hash preimage: every event field except the hash itself.
#[derive(Serialize)]
struct EventPreimage<'a> {
    seq: u64,
    kind: &'a EventKind,
    timestamp: &'a DateTime<Utc>,
    data: &'a Value,
    prev_hash: &'a Option<String>,
}

impl Event {
    /// Builds a new event, computing its self-hash from the canonical form.
    pub fn build(
        seq: u64,
        kind: EventKind,
        timestamp: DateTime<Utc>,
        data: Value,
        prev_hash: Option<String>,
    ) -> Result<Self, CodecError> {
        let hash = codec::content_hash(&EventPreimage {
            seq,
            kind: &kind,
            timestamp: &timestamp,
            data: &data,
            prev_hash: &prev_hash,
        })?;
        Ok(Self {
            seq,
            kind,
            timestamp,
            data,
            prev_hash,
            hash,
        })
    }

    /// Recomputes the self-hash from the stored fields.
    pub fn recompute_hash(&self) -> Result<String, CodecError> {
        codec::content_hash(&EventPreimage {
            seq: self.seq,
            kind: &self.kind,
            timestamp: &self.timestamp,
            data: &self.data,
            prev_hash: &self.prev_hash,
        })
    }
}

/// The GENESIS payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisData {
    /// Log format version.
    pub version: u32,
    /// Specification identifier of the entity.
    pub specification: String,
    /// Fingerprint of the immutable specification documents.
    pub organization_hash: String,
    /// Label of the external caller that instantiated the entity.
    pub instantiated_by: String,
    /// Display name of the entity.
    #[serde(default)]
    pub name: Option<String>,
}

/// The SESSION_START payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionStartData {
    /// Opaque partner label.
    pub partner: String,
    /// Identifier assigned to this session.
    pub session_id: String,
    /// Energy debited for opening the session.
    pub decay: f64,
}

/// The SESSION_END payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionEndData {
    /// Identifier of the session being closed.
    pub session_id: String,
}

/// The STATE_UPDATE payload; every field is optional and applied only when set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StateUpdateData {
    /// Absolute replacement for the current energy level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    /// New Lyapunov value; the previous value is rotated into `v_previous`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyapunov: Option<f64>,
    /// Replacement human context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human: Option<Value>,
    /// A memory to append to the important list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_important: Option<String>,
    /// Replacement for the pending coupling-request queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupling_requests: Option<Vec<crate::state::CouplingRequest>>,
}

/// The VERIFICATION payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationData {
    /// Whether all invariants held.
    pub passed: bool,
    /// Identifiers of violated invariants, if any.
    pub violations: Vec<String>,
    /// Integrity status resulting from this verification.
    pub status: crate::state::IntegrityStatus,
    /// Lyapunov value observed by the verifier.
    pub v: f64,
}

/// The SNAPSHOT payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotData {
    /// Snapshot identifier (also the bundle file stem).
    pub id: String,
    /// Operator-supplied description.
    pub description: String,
}

/// The LEARNING payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LearningData {
    /// Digest of the learned pattern set.
    pub patterns_hash: String,
}

/// The META_OPERATION payload: the full replacement autopoiesis sub-record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetaOperationData {
    /// Which generator ran (`define`, `compose`, `specialize`, or a lifecycle
    /// transition tag).
    pub action: String,
    /// Identifier of the operation the action concerned.
    pub operation_id: String,
    /// The complete autopoiesis sub-record after the action.
    pub autopoiesis: crate::state::Autopoiesis,
}

/// The OPERATION payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationData {
    /// Catalog identifier of the executed operation.
    pub op_id: String,
    /// Parameters the operation ran with.
    pub params: Value,
    /// Human-readable result summary.
    pub message: String,
    /// Energy debited for the execution.
    pub energy_cost: f64,
    /// State delta produced by the handler.
    pub state_changes: crate::ops::StateChanges,
}

/// The BLOCK payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockData {
    /// Identifier of the refused operation or transition.
    pub op_id: String,
    /// Stable code of the refusal reason.
    pub reason: String,
    /// Human-readable detail.
    pub detail: String,
}

/// Payload shared by AGENT_WAKE and AGENT_SLEEP.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentPhaseData {
    /// The agent's monotonic cycle index at the transition.
    pub cycle: u64,
}

/// The AGENT_RESPONSE payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentResponseData {
    /// The agent's monotonic cycle index.
    pub cycle: u64,
    /// Constitutional priority that produced the response.
    pub priority: crate::state::Priority,
    /// Chosen action id; `None` means deliberate inaction.
    pub action: Option<String>,
    /// Whether the admission check refused the action.
    pub blocked: bool,
    /// Refusal reason when blocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Energy spent on the feeling phase itself.
    pub feeling_cost: f64,
}

/// The AGENT_REST payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentRestData {
    /// The agent's monotonic cycle index.
    pub cycle: u64,
    /// Rest cycles accumulated since the last AGENT_REST event.
    pub rest_cycles: u64,
}

/// The AGENT_ULTRASTABILITY payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentUltrastabilityData {
    /// The agent's monotonic cycle index.
    pub cycle: u64,
    /// Violation family that drove the adaptation.
    pub family: String,
    /// Snapshot of the adaptive parameters after the adjustment.
    pub parameters: crate::state::AdaptiveParameters,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn self_hash_excludes_hash_field() {
        let e = Event::build(
            1,
            EventKind::Genesis,
            Utc::now(),
            json!({"version": 1}),
            None,
        )
        .unwrap();
        assert_eq!(e.recompute_hash().unwrap(), e.hash);
    }

    #[test]
    fn hash_changes_with_payload() {
        let ts = Utc::now();
        let a = Event::build(2, EventKind::Operation, ts, json!({"x": 1}), None).unwrap();
        let b = Event::build(2, EventKind::Operation, ts, json!({"x": 2}), None).unwrap();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn unknown_kind_round_trips_through_serde() {
        let raw = json!({
            "seq": 9,
            "kind": "FUTURE_KIND",
            "timestamp": "2026-01-01T00:00:00Z",
            "data": {},
            "prev_hash": "ab",
            "hash": "cd"
        });
        let e: Event = serde_json::from_value(raw).unwrap();
        assert_eq!(e.kind, EventKind::Other("FUTURE_KIND".into()));
        let back = serde_json::to_value(&e).unwrap();
        assert_eq!(back["kind"], "FUTURE_KIND");
    }
}
