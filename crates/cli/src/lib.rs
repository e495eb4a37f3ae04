#![forbid(unsafe_code)]

//! Library surface behind the `entity` binary.
//!
//! [`Kernel`] is the composition root: it wires the StateManager, the
//! operation executor, and the agent together and exposes the command
//! surface one-to-one, so external collaborators (CLI, daemon, RPC shims)
//! all drive the same code paths.

use entity_agent::{Agent, CycleOutcome};
use entity_ops::{meta, Executor};
use entity_state::manager::StateManager;
use entity_state::recovery::{self, RecoveryReport};
use entity_state::snapshot::{self, SnapshotInfo};
use entity_state::verifier::{self, VerificationReport};
use entity_state::{genesis, replay};
use entity_types::config::{AgentConfig, EntityPaths};
use entity_types::error::{KernelError, SessionError};
use entity_types::event::{EventKind, SessionEndData, SessionStartData};
use entity_types::ops::{GeneratedOperation, OperationOutcome, TemplateKind};
use entity_types::state::{CouplingRequest, IntegrityStatus, State};
use entity_types::SESSION_DECAY;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// A typed status summary for rendering.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusReport {
    /// Entity name, when set.
    pub name: Option<String>,
    /// Specification identifier.
    pub specification: String,
    /// Integrity status.
    pub status: IntegrityStatus,
    /// Current energy.
    pub energy: f64,
    /// Current Lyapunov value.
    pub v: f64,
    /// Events applied.
    pub event_count: u64,
    /// Whether a partner is coupled, and to whom.
    pub partner: Option<String>,
    /// Total sessions.
    pub session_count: u64,
    /// Whether the agent is awake.
    pub agent_awake: bool,
    /// Agent cycles recorded.
    pub agent_cycles: u64,
    /// Generated operations held.
    pub generated_operations: usize,
}

impl StatusReport {
    /// Process exit code for this status: non-zero on terminal.
    pub fn exit_code(&self) -> i32 {
        if self.status == IntegrityStatus::Terminal {
            1
        } else {
            0
        }
    }
}

/// The composition root every external surface drives.
pub struct Kernel {
    manager: Arc<StateManager>,
    executor: Executor,
    agent: Arc<Agent>,
}

impl Kernel {
    /// Opens an instantiated entity at `base`.
    pub fn open(base: &Path) -> Result<Self, KernelError> {
        Self::open_with(base, AgentConfig::default())
    }

    /// Opens an instantiated entity with an explicit agent configuration.
    pub fn open_with(base: &Path, config: AgentConfig) -> Result<Self, KernelError> {
        let paths = EntityPaths::new(base);
        let manager = Arc::new(genesis::open_existing(&paths)?);
        Ok(Self::assemble(manager, config))
    }

    /// Instantiates a fresh entity at `base` and opens it.
    pub fn instantiate(
        base: &Path,
        specification: &str,
        instantiated_by: &str,
        name: Option<&str>,
    ) -> Result<Self, KernelError> {
        let paths = EntityPaths::new(base);
        genesis::instantiate(&paths, specification, instantiated_by, name)?;
        let manager = Arc::new(StateManager::open(paths).map_err(KernelError::State)?);
        Ok(Self::assemble(manager, AgentConfig::default()))
    }

    fn assemble(manager: Arc<StateManager>, config: AgentConfig) -> Self {
        Self {
            executor: Executor::new(Arc::clone(&manager)).with_block_logging(),
            agent: Arc::new(Agent::new(Arc::clone(&manager), config)),
            manager,
        }
    }

    /// The state manager, for read access and tests.
    pub fn manager(&self) -> &Arc<StateManager> {
        &self.manager
    }

    /// The agent, for the daemon loop.
    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    /// Logged verification: runs all checks and records the outcome.
    pub fn verify(&self) -> Result<(VerificationReport, State), KernelError> {
        Ok(verifier::logged_verify(&self.manager)?)
    }

    /// Pure verification: observes without appending anything.
    pub fn verify_readonly(&self) -> Result<VerificationReport, KernelError> {
        Ok(verifier::pure_verify(&self.manager)?)
    }

    /// A typed status summary.
    pub fn status(&self) -> Result<StatusReport, KernelError> {
        let state = self.manager.read_state().map_err(KernelError::State)?;
        Ok(StatusReport {
            name: state.identity.name.clone(),
            specification: state.specification.clone(),
            status: state.integrity.status,
            energy: state.energy.current,
            v: state.lyapunov.v,
            event_count: state.memory.event_count,
            partner: state.coupling.partner.clone(),
            session_count: state.session.total_count,
            agent_awake: state.agent.awake,
            agent_cycles: state.agent.cycle_count,
            generated_operations: state.autopoiesis.generated.len(),
        })
    }

    /// Starts a coupling session with a partner.
    pub fn session_start(&self, partner: &str) -> Result<State, KernelError> {
        let state = self.manager.read_state().map_err(KernelError::State)?;
        if state.coupling.active {
            let current = state.coupling.partner.unwrap_or_default();
            return Err(SessionError::AlreadyActive(current).into());
        }
        let data = SessionStartData {
            partner: partner.to_string(),
            session_id: format!("s-{}", state.session.total_count + 1),
            decay: SESSION_DECAY,
        };
        let value = serde_json::to_value(&data).map_err(|e| {
            KernelError::Codec(entity_types::error::CodecError::Encode(e.to_string()))
        })?;
        let (state, _) = self
            .manager
            .append_event(EventKind::SessionStart, value)
            .map_err(KernelError::State)?;
        Ok(state)
    }

    /// Queues a coupling request from a would-be partner. The request is
    /// served (removed) by the next `session_start` with the same partner.
    pub fn coupling_request(&self, partner: &str) -> Result<State, KernelError> {
        let state = self.manager.read_state().map_err(KernelError::State)?;
        let mut requests = state.coupling_requests.clone();
        if !requests.iter().any(|r| r.partner == partner) {
            requests.push(CouplingRequest {
                partner: partner.to_string(),
                requested_at: chrono::Utc::now(),
            });
        }
        let (state, _) = self
            .manager
            .append_event(
                EventKind::StateUpdate,
                serde_json::json!({ "coupling_requests": requests }),
            )
            .map_err(KernelError::State)?;
        Ok(state)
    }

    /// Ends the active coupling session.
    pub fn session_end(&self) -> Result<State, KernelError> {
        let state = self.manager.read_state().map_err(KernelError::State)?;
        let Some(session_id) = state.session.current_id.clone() else {
            return Err(SessionError::NotActive.into());
        };
        let data = SessionEndData { session_id };
        let value = serde_json::to_value(&data).map_err(|e| {
            KernelError::Codec(entity_types::error::CodecError::Encode(e.to_string()))
        })?;
        let (state, _) = self
            .manager
            .append_event(EventKind::SessionEnd, value)
            .map_err(KernelError::State)?;
        Ok(state)
    }

    /// Recharges energy through the catalog operation.
    pub fn recharge(&self, amount: Option<f64>) -> Result<(OperationOutcome, State), KernelError> {
        let params = match amount {
            Some(a) => serde_json::json!({ "amount": a }),
            None => Value::Null,
        };
        Ok(self.executor.exec("energy.recharge", &params)?)
    }

    /// Executes any catalog or ACTIVE generated operation.
    pub fn op_exec(
        &self,
        id: &str,
        params: &Value,
    ) -> Result<(OperationOutcome, State), KernelError> {
        Ok(self.executor.exec(id, params)?)
    }

    /// Forces one agent cycle.
    pub fn agent_force_cycle(&self) -> Result<CycleOutcome, KernelError> {
        Ok(self.agent.force_cycle()?)
    }

    /// Wakes the agent.
    pub fn agent_wake(&self) -> Result<State, KernelError> {
        Ok(self.agent.wake()?)
    }

    /// Puts the agent to sleep.
    pub fn agent_sleep(&self) -> Result<State, KernelError> {
        Ok(self.agent.sleep()?)
    }

    /// Creates a snapshot bundle.
    pub fn snapshot_create(&self, description: &str) -> Result<SnapshotInfo, KernelError> {
        Ok(snapshot::create(&self.manager, description)?)
    }

    /// Lists snapshot bundles.
    pub fn snapshot_list(&self) -> Result<Vec<SnapshotInfo>, KernelError> {
        Ok(snapshot::list(&self.manager)?)
    }

    /// Restores the state cache from a snapshot bundle.
    pub fn snapshot_restore(&self, id: &str) -> Result<State, KernelError> {
        Ok(snapshot::restore(&self.manager, id)?)
    }

    /// Defines a new generated operation.
    pub fn meta_define(
        &self,
        id: &str,
        template: TemplateKind,
        params: Value,
        energy_cost: f64,
        requires_coupling: bool,
    ) -> Result<GeneratedOperation, KernelError> {
        let cycle = self.current_cycle()?;
        let (op, _) = meta::define(
            &self.manager,
            self.executor.catalog(),
            id,
            template,
            params,
            energy_cost,
            requires_coupling,
            cycle,
        )?;
        Ok(op)
    }

    /// Composes existing operations into a bundle.
    pub fn meta_compose(
        &self,
        id: &str,
        components: &[String],
    ) -> Result<GeneratedOperation, KernelError> {
        let cycle = self.current_cycle()?;
        let (op, _) = meta::compose(&self.manager, self.executor.catalog(), id, components, cycle)?;
        Ok(op)
    }

    /// Specializes an existing operation with preset parameters.
    pub fn meta_specialize(
        &self,
        source_id: &str,
        id: &str,
        preset: Value,
        energy_cost: Option<f64>,
    ) -> Result<GeneratedOperation, KernelError> {
        let cycle = self.current_cycle()?;
        let (op, _) = meta::specialize(
            &self.manager,
            self.executor.catalog(),
            source_id,
            id,
            preset,
            energy_cost,
            cycle,
            false,
        )?;
        Ok(op)
    }

    /// Runs the recovery engine against a fresh pure verification.
    pub fn recover(&self) -> Result<RecoveryReport, KernelError> {
        let report = verifier::pure_verify(&self.manager)?;
        Ok(recovery::recover(&self.manager, &report)?)
    }

    /// Rebuilds the state cache from full replay.
    pub fn rebuild(&self) -> Result<State, KernelError> {
        Ok(self.manager.rebuild_from_replay()?)
    }

    /// Replays the full log without touching anything, as a consistency probe.
    pub fn replay_probe(&self) -> Result<State, KernelError> {
        let events = self.manager.events().map_err(KernelError::Storage)?;
        Ok(replay::replay(&events)?)
    }

    fn current_cycle(&self) -> Result<u64, KernelError> {
        let state = self.manager.read_state().map_err(KernelError::State)?;
        Ok(state.agent.cycle_count)
    }
}
