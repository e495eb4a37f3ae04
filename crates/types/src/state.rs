//! The derived state record.
//!
//! State is a cache computed by folding events from GENESIS; the event log is
//! always the canonical source. The sub-blocks mirror the concerns the replay
//! applier updates: identity, coupling, energy, Lyapunov, memory bookkeeping,
//! sessions, integrity, human context, learning, autopoiesis, and the agent's
//! durable counters.

use crate::ops::GeneratedOperation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Integrity status of the entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityStatus {
    /// All invariants hold.
    Nominal,
    /// A recoverable invariant is violated or was recently repaired.
    Degraded,
    /// Energy fell below the viability minimum; mutation is suspended.
    Dormant,
    /// Absorbing failure state; requires operator intervention.
    Terminal,
}

impl IntegrityStatus {
    /// Whether further mutation must be refused.
    pub fn refuses_mutation(self) -> bool {
        matches!(self, IntegrityStatus::Terminal)
    }
}

/// The constitutional priority hierarchy, in strict descending order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Existence is threatened; conserve or diagnose.
    Survival,
    /// An invariant is violated; stand aside for recovery.
    Integrity,
    /// The state is drifting or unstable; stabilise.
    Stability,
    /// Conditions are good; explore.
    Growth,
    /// Nothing demands action.
    Rest,
}

/// Identity block, written once at genesis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Display name of the entity.
    pub name: Option<String>,
    /// Label of the external caller that instantiated the entity.
    pub instantiated_by: String,
    /// Instantiation time.
    pub instantiated_at: DateTime<Utc>,
}

/// Coupling block: the active partner session, if any.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coupling {
    /// Whether a partner session is active.
    pub active: bool,
    /// Opaque partner label.
    pub partner: Option<String>,
    /// When the active session started.
    pub since: Option<DateTime<Utc>>,
}

/// Energy block. All values live in `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Energy {
    /// Current energy level.
    pub current: f64,
    /// Viability minimum; below this the entity goes dormant or terminal.
    pub min: f64,
    /// Comfort threshold used by the Lyapunov energy-distance term.
    pub threshold: f64,
}

impl Default for Energy {
    fn default() -> Self {
        Self {
            current: 1.0,
            min: 0.01,
            threshold: 0.1,
        }
    }
}

/// Lyapunov block: the scalar distance from the attractor and its history.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Lyapunov {
    /// Current value.
    pub v: f64,
    /// Value before the most recent update.
    pub v_previous: f64,
}

/// Memory bookkeeping block, updated by every event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryBlock {
    /// Number of events applied so far.
    pub event_count: u64,
    /// Hash of the most recently applied event.
    pub last_event_hash: Option<String>,
    /// When the latest snapshot was taken.
    pub last_snapshot_at: Option<DateTime<Utc>>,
}

/// Session block.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionBlock {
    /// Total sessions ever started.
    pub total_count: u64,
    /// Identifier of the currently open session.
    pub current_id: Option<String>,
}

/// Integrity block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegrityBlock {
    /// Current status.
    pub status: IntegrityStatus,
    /// Count of violations observed over the entity's lifetime.
    pub violation_count: u64,
    /// When the last verification ran.
    pub last_verification: Option<DateTime<Utc>>,
}

impl Default for IntegrityBlock {
    fn default() -> Self {
        Self {
            status: IntegrityStatus::Nominal,
            violation_count: 0,
            last_verification: None,
        }
    }
}

/// An entry in the important-memory list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportantMemory {
    /// The remembered content.
    pub content: String,
    /// When it was recorded (the timestamp of the recording event).
    pub recorded_at: DateTime<Utc>,
}

/// Learning block.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningBlock {
    /// When the last learning pass ran.
    pub last_learned_at: Option<DateTime<Utc>>,
    /// Digest of the learned pattern set.
    pub patterns_hash: Option<String>,
}

/// Autopoiesis block: the generated-operation definitions the entity owns.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Autopoiesis {
    /// All operations ever produced, in creation order.
    pub generated: Vec<GeneratedOperation>,
    /// Count of operations created by the agent itself (capped).
    pub operations_created: u64,
}

/// Per-priority response counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityCounters {
    /// Responses with survival priority.
    pub survival: u64,
    /// Responses with integrity priority.
    pub integrity: u64,
    /// Responses with stability priority.
    pub stability: u64,
    /// Responses with growth priority.
    pub growth: u64,
    /// Rest cycles recorded through AGENT_REST events.
    pub rest: u64,
}

impl PriorityCounters {
    /// Increments the counter for the given priority.
    pub fn bump(&mut self, priority: Priority) {
        match priority {
            Priority::Survival => self.survival += 1,
            Priority::Integrity => self.integrity += 1,
            Priority::Stability => self.stability += 1,
            Priority::Growth => self.growth += 1,
            Priority::Rest => self.rest += 1,
        }
    }
}

/// The agent's durable counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentBlock {
    /// Whether the agent is awake.
    pub awake: bool,
    /// The agent's monotonic cycle index, as last recorded by an agent event.
    pub cycle_count: u64,
    /// Responses by priority.
    pub responses: PriorityCounters,
    /// Total actions executed on the agent's behalf.
    pub actions_taken: u64,
    /// Total actions refused by the admission check.
    pub actions_blocked: u64,
}

/// The adaptive parameters the ultrastability mechanism tunes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveParameters {
    /// Energy level below which existence counts as threatened.
    pub critical_threshold: f64,
    /// Energy level below which the agent treats the situation as urgent.
    pub urgency_threshold: f64,
    /// Lyapunov value under which the agent considers itself at rest.
    pub rest_threshold: f64,
    /// Interval between agent cycles, in milliseconds.
    pub decision_interval_ms: u64,
}

impl Default for AdaptiveParameters {
    fn default() -> Self {
        Self {
            critical_threshold: 0.05,
            urgency_threshold: 0.15,
            rest_threshold: 0.05,
            decision_interval_ms: 60_000,
        }
    }
}

/// A pending request from a would-be partner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CouplingRequest {
    /// Opaque partner label.
    pub partner: String,
    /// When the request was queued.
    pub requested_at: DateTime<Utc>,
}

/// The complete derived state record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Specification identifier of the entity.
    pub specification: String,
    /// Fingerprint of the immutable specification documents.
    pub organization_hash: String,
    /// Identity block.
    pub identity: Identity,
    /// Coupling block.
    pub coupling: Coupling,
    /// Energy block.
    pub energy: Energy,
    /// Lyapunov block.
    pub lyapunov: Lyapunov,
    /// Memory bookkeeping block.
    pub memory: MemoryBlock,
    /// Session block.
    pub session: SessionBlock,
    /// Integrity block.
    pub integrity: IntegrityBlock,
    /// Opaque human context.
    pub human: Value,
    /// Important memories, oldest first.
    pub important: Vec<ImportantMemory>,
    /// Learning block.
    pub learning: LearningBlock,
    /// Autopoiesis block.
    pub autopoiesis: Autopoiesis,
    /// Agent counters.
    pub agent: AgentBlock,
    /// Pending coupling requests, oldest first.
    pub coupling_requests: Vec<CouplingRequest>,
}

impl State {
    /// The state produced by a GENESIS event, everything else at documented
    /// defaults: energy 1.0, V 0, empty memories, nominal status.
    pub fn genesis(
        specification: String,
        organization_hash: String,
        instantiated_by: String,
        name: Option<String>,
        instantiated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            specification,
            organization_hash,
            identity: Identity {
                name,
                instantiated_by,
                instantiated_at,
            },
            coupling: Coupling::default(),
            energy: Energy::default(),
            lyapunov: Lyapunov::default(),
            memory: MemoryBlock::default(),
            session: SessionBlock::default(),
            integrity: IntegrityBlock::default(),
            human: Value::Null,
            important: Vec::new(),
            learning: LearningBlock::default(),
            autopoiesis: Autopoiesis::default(),
            agent: AgentBlock::default(),
            coupling_requests: Vec::new(),
        }
    }
}
