//! Core error types for the entity kernel.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors from the canonical codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// RFC 8785 canonicalization failed.
    #[error("Canonicalization failed: {0}")]
    Canonicalize(String),
    /// JSON encoding failed.
    #[error("Encode error: {0}")]
    Encode(String),
    /// JSON decoding failed.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl ErrorCode for CodecError {
    fn code(&self) -> &'static str {
        match self {
            Self::Canonicalize(_) => "CODEC_CANONICALIZE_FAILED",
            Self::Encode(_) => "CODEC_ENCODE_FAILED",
            Self::Decode(_) => "CODEC_DECODE_FAILED",
        }
    }
}

/// Errors from chain-link verification.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The log is empty.
    #[error("Event log is empty")]
    Empty,
    /// The first event is malformed (non-GENESIS kind or non-null prev hash).
    #[error("First event must be GENESIS with a null previous hash")]
    GenesisShape,
    /// An event's recomputed hash differs from its stored hash.
    #[error("Self-hash mismatch at sequence {seq}")]
    HashMismatch {
        /// Sequence number of the corrupt event.
        seq: u64,
    },
    /// An event does not link to its predecessor.
    #[error("Broken link at sequence {seq}. Expected prev {expected}, got {got}")]
    BrokenLink {
        /// Sequence number of the unlinked event.
        seq: u64,
        /// Hash of the predecessor.
        expected: String,
        /// The `prev_hash` the event carries (or "null").
        got: String,
    },
    /// Sequence numbers are not contiguous from 1.
    #[error("Non-contiguous sequence. Expected {expected}, got {got}")]
    NonContiguous {
        /// The expected sequence number.
        expected: u64,
        /// The sequence number found.
        got: u64,
    },
    /// An error occurred while hashing an event.
    #[error("Failed to hash event: {0}")]
    Hash(#[from] CodecError),
}

impl ErrorCode for ChainError {
    fn code(&self) -> &'static str {
        match self {
            Self::Empty => "CHAIN_EMPTY",
            Self::GenesisShape => "CHAIN_GENESIS_SHAPE",
            Self::HashMismatch { .. } => "CHAIN_HASH_MISMATCH",
            Self::BrokenLink { .. } => "CHAIN_BROKEN_LINK",
            Self::NonContiguous { .. } => "CHAIN_NON_CONTIGUOUS",
            Self::Hash(_) => "CHAIN_HASH_FAILED",
        }
    }
}

/// Errors from the durable event log and state cache.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The write lock could not be acquired within its budget.
    #[error("Lock acquisition timed out after {waited_ms} ms")]
    LockTimeout {
        /// How long the caller waited.
        waited_ms: u64,
    },
    /// An event file or the state cache is malformed.
    #[error("Corrupt storage: {0}")]
    Corrupt(String),
    /// The base directory already holds an instantiated entity.
    #[error("Entity already instantiated at {0}")]
    AlreadyInstantiated(String),
    /// The base directory holds no instantiated entity.
    #[error("No entity instantiated at {0}")]
    NotInstantiated(String),
    /// A codec error occurred while persisting or loading.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "STORAGE_IO_ERROR",
            Self::LockTimeout { .. } => "STORAGE_LOCK_TIMEOUT",
            Self::Corrupt(_) => "STORAGE_CORRUPT",
            Self::AlreadyInstantiated(_) => "STORAGE_ALREADY_INSTANTIATED",
            Self::NotInstantiated(_) => "STORAGE_NOT_INSTANTIATED",
            Self::Codec(_) => "STORAGE_CODEC_ERROR",
        }
    }
}

/// Errors from the state manager and replay.
#[derive(Debug, Error)]
pub enum StateError {
    /// The underlying storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    /// The chain failed verification; the write path refuses to proceed.
    #[error("Chain integrity failure: {0}")]
    Chain(#[from] ChainError),
    /// The entity is terminal; mutation is refused.
    #[error("Entity is terminal; mutation refused")]
    Terminal,
    /// Replay produced a state that disagrees with the cache.
    #[error("Replay mismatch on {field}")]
    ReplayMismatch {
        /// The invariant-bound field that disagreed.
        field: &'static str,
    },
    /// An event payload could not be decoded during apply.
    #[error("Malformed event payload at sequence {seq}: {detail}")]
    MalformedPayload {
        /// Sequence number of the offending event.
        seq: u64,
        /// What failed to decode.
        detail: String,
    },
    /// A Lyapunov increase exceeded the admissible disturbance capacity.
    #[error("Disturbance rejected: ΔV {delta} exceeds capacity {capacity}")]
    DisturbanceRejected {
        /// The attempted Lyapunov increase.
        delta: f64,
        /// The capacity available to absorb it.
        capacity: f64,
    },
    /// A codec error occurred.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ErrorCode for StateError {
    fn code(&self) -> &'static str {
        match self {
            Self::Storage(_) => "STATE_STORAGE_ERROR",
            Self::Chain(_) => "STATE_CHAIN_FAILURE",
            Self::Terminal => "STATE_TERMINAL",
            Self::ReplayMismatch { .. } => "STATE_REPLAY_MISMATCH",
            Self::MalformedPayload { .. } => "STATE_MALFORMED_PAYLOAD",
            Self::DisturbanceRejected { .. } => "STATE_DISTURBANCE_REJECTED",
            Self::Codec(_) => "STATE_CODEC_ERROR",
        }
    }
}

/// Errors from the operation catalog and executor.
#[derive(Debug, Error)]
pub enum OperationError {
    /// No operation with the given identifier exists.
    #[error("Unknown operation: {0}")]
    Unknown(String),
    /// The operation requires an active coupling session.
    #[error("Operation {0} requires an active coupling session")]
    CouplingRequired(String),
    /// Energy is insufficient to run the operation.
    #[error("Insufficient energy: need {required}, have {available}")]
    InsufficientEnergy {
        /// Energy the operation needs (cost plus preserved minimum).
        required: f64,
        /// Energy currently available.
        available: f64,
    },
    /// The handler reported failure.
    #[error("Operation {id} failed: {message}")]
    HandlerFailed {
        /// Identifier of the failed operation.
        id: String,
        /// The handler's failure message.
        message: String,
    },
    /// An operation with this identifier already exists.
    #[error("Duplicate operation id: {0}")]
    DuplicateId(String),
    /// A specialization bound was violated; no operation was created.
    #[error("Specialization bounds violated: {0}")]
    BoundsViolation(String),
    /// The generation depth limit was exceeded.
    #[error("Generation depth {depth} exceeds the maximum of {max}")]
    DepthExceeded {
        /// Requested depth.
        depth: u32,
        /// Maximum permitted depth.
        max: u32,
    },
    /// The self-production cap has been reached.
    #[error("Self-production cap of {0} operations reached")]
    ProductionCapReached(usize),
    /// The operation exists but its lifecycle status hides it from execution.
    #[error("Operation {id} is {status} and not executable")]
    NotExecutable {
        /// Identifier of the hidden operation.
        id: String,
        /// Its lifecycle status.
        status: String,
    },
    /// The write path refused the operation's state transaction.
    #[error("State error: {0}")]
    State(#[from] StateError),
}

impl ErrorCode for OperationError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unknown(_) => "OP_UNKNOWN",
            Self::CouplingRequired(_) => "OP_COUPLING_REQUIRED",
            Self::InsufficientEnergy { .. } => "OP_INSUFFICIENT_ENERGY",
            Self::HandlerFailed { .. } => "OP_HANDLER_FAILED",
            Self::DuplicateId(_) => "OP_DUPLICATE_ID",
            Self::BoundsViolation(_) => "OP_BOUNDS_VIOLATION",
            Self::DepthExceeded { .. } => "OP_DEPTH_EXCEEDED",
            Self::ProductionCapReached(_) => "OP_PRODUCTION_CAP",
            Self::NotExecutable { .. } => "OP_NOT_EXECUTABLE",
            Self::State(_) => "OP_STATE_ERROR",
        }
    }
}

/// Errors from the recovery engine.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// The violation cannot be repaired automatically.
    #[error("Manual repair required: {0}")]
    ManualRequired(String),
    /// The entity reached terminal status during recovery.
    #[error("Entity is terminal: {0}")]
    Terminal(String),
    /// The write path failed while repairing.
    #[error("State error during recovery: {0}")]
    State(#[from] StateError),
}

impl ErrorCode for RecoveryError {
    fn code(&self) -> &'static str {
        match self {
            Self::ManualRequired(_) => "RECOVERY_MANUAL_REQUIRED",
            Self::Terminal(_) => "RECOVERY_TERMINAL",
            Self::State(_) => "RECOVERY_STATE_ERROR",
        }
    }
}

/// Errors from the coupling-session lifecycle.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session is already active; end it first.
    #[error("A session with {0} is already active")]
    AlreadyActive(String),
    /// No session is active.
    #[error("No session is active")]
    NotActive,
    /// The write path failed.
    #[error("State error: {0}")]
    State(#[from] StateError),
}

impl ErrorCode for SessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::AlreadyActive(_) => "SESSION_ALREADY_ACTIVE",
            Self::NotActive => "SESSION_NOT_ACTIVE",
            Self::State(_) => "SESSION_STATE_ERROR",
        }
    }
}

/// Errors from the sense-making agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Wake was requested while already awake.
    #[error("Agent is already awake")]
    AlreadyAwake,
    /// Sleep was requested while already asleep.
    #[error("Agent is already asleep")]
    AlreadyAsleep,
    /// The agent is disabled by configuration.
    #[error("Agent is disabled")]
    Disabled,
    /// A cycle failed; the loop continues.
    #[error("Cycle {cycle} failed: {detail}")]
    CycleFailed {
        /// The cycle index that failed.
        cycle: u64,
        /// What went wrong.
        detail: String,
    },
    /// The write path failed.
    #[error("State error: {0}")]
    State(#[from] StateError),
    /// An operation the agent invoked failed.
    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),
}

impl ErrorCode for AgentError {
    fn code(&self) -> &'static str {
        match self {
            Self::AlreadyAwake => "AGENT_ALREADY_AWAKE",
            Self::AlreadyAsleep => "AGENT_ALREADY_ASLEEP",
            Self::Disabled => "AGENT_DISABLED",
            Self::CycleFailed { .. } => "AGENT_CYCLE_FAILED",
            Self::State(_) => "AGENT_STATE_ERROR",
            Self::Operation(_) => "AGENT_OPERATION_ERROR",
        }
    }
}

/// Umbrella error for callers that cross component boundaries (CLI, daemon).
#[derive(Debug, Error)]
pub enum KernelError {
    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Chain failure.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// State failure.
    #[error(transparent)]
    State(#[from] StateError),
    /// Operation failure.
    #[error(transparent)]
    Operation(#[from] OperationError),
    /// Recovery failure.
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
    /// Session failure.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Agent failure.
    #[error(transparent)]
    Agent(#[from] AgentError),
    /// Codec failure.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ErrorCode for KernelError {
    fn code(&self) -> &'static str {
        match self {
            Self::Storage(e) => e.code(),
            Self::Chain(e) => e.code(),
            Self::State(e) => e.code(),
            Self::Operation(e) => e.code(),
            Self::Recovery(e) => e.code(),
            Self::Session(e) => e.code(),
            Self::Agent(e) => e.code(),
            Self::Codec(e) => e.code(),
        }
    }
}
