//! The guarded execution contract.
//!
//! `exec(id, params)` resolves the definition, applies the coupling and
//! energy gates, invokes the pure handler, and on success commits the state
//! delta, the energy debit, and the OPERATION event in one atomic write.
//! Failures leave state untouched; admission failures may be recorded as
//! BLOCK events when block logging is on.

use crate::catalog::Catalog;
use crate::templates;
use entity_state::manager::StateManager;
use entity_types::error::{ErrorCode, OperationError};
use entity_types::event::{BlockData, EventKind, OperationData};
use entity_types::ops::{GeneratedOperation, OperationOutcome, OperationSpec};
use entity_types::state::State;
use serde_json::Value;
use std::sync::Arc;

/// How a resolved operation will be invoked.
enum Resolved<'a> {
    Builtin(&'a crate::catalog::OperationDef),
    Generated(GeneratedOperation),
}

impl Resolved<'_> {
    fn spec(&self) -> &OperationSpec {
        match self {
            Resolved::Builtin(def) => &def.spec,
            Resolved::Generated(op) => &op.spec,
        }
    }
}

/// The guarded operation executor.
pub struct Executor {
    catalog: Catalog,
    manager: Arc<StateManager>,
    /// Record admission failures as BLOCK events.
    log_blocks: bool,
    /// Allow executing generated operations that are not yet ACTIVE. Used by
    /// the agent's trial runs and by explicit operator calls; the policy
    /// itself never selects unproven operations.
    include_unproven: bool,
}

impl Executor {
    /// Creates an executor over the standard catalog.
    pub fn new(manager: Arc<StateManager>) -> Self {
        Self {
            catalog: Catalog::standard(),
            manager,
            log_blocks: false,
            include_unproven: false,
        }
    }

    /// Enables BLOCK-event logging for admission failures.
    pub fn with_block_logging(mut self) -> Self {
        self.log_blocks = true;
        self
    }

    /// Permits execution of QUARANTINED/TRIAL/DEPRECATED operations.
    pub fn with_unproven(mut self) -> Self {
        self.include_unproven = true;
        self
    }

    /// The catalog behind this executor.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn resolve<'a>(
        &'a self,
        state: &State,
        id: &str,
    ) -> Result<Resolved<'a>, OperationError> {
        if let Some(def) = self.catalog.get(id) {
            return Ok(Resolved::Builtin(def));
        }
        let Some(op) = state
            .autopoiesis
            .generated
            .iter()
            .find(|g| g.spec.id == id)
        else {
            return Err(OperationError::Unknown(id.to_string()));
        };
        if !op.selectable() && !self.include_unproven {
            return Err(OperationError::NotExecutable {
                id: id.to_string(),
                status: format!("{:?}", op.status).to_uppercase(),
            });
        }
        Ok(Resolved::Generated(op.clone()))
    }

    fn record_block(&self, id: &str, err: &OperationError) {
        if !self.log_blocks {
            return;
        }
        let data = BlockData {
            op_id: id.to_string(),
            reason: err.code().to_string(),
            detail: err.to_string(),
        };
        match serde_json::to_value(&data) {
            Ok(value) => {
                if let Err(e) = self.manager.append_event(EventKind::Block, value) {
                    tracing::warn!(target: "ops", op = id, error = %e, "failed to record block");
                }
            }
            Err(e) => {
                tracing::warn!(target: "ops", op = id, error = %e, "failed to encode block");
            }
        }
    }

    /// Executes an operation under the full admission contract.
    pub fn exec(
        &self,
        id: &str,
        params: &Value,
    ) -> Result<(OperationOutcome, State), OperationError> {
        let state = self.manager.read_state()?;
        let resolved = self.resolve(&state, id)?;
        let spec = resolved.spec().clone();

        if spec.requires_coupling && !state.coupling.active {
            let err = OperationError::CouplingRequired(id.to_string());
            self.record_block(id, &err);
            return Err(err);
        }
        if state.energy.current < spec.energy_cost {
            let err = OperationError::InsufficientEnergy {
                required: spec.energy_cost,
                available: state.energy.current,
            };
            self.record_block(id, &err);
            return Err(err);
        }

        let outcome = match &resolved {
            Resolved::Builtin(def) => (def.handler)(&state, params),
            Resolved::Generated(op) => templates::run(
                &self.catalog,
                &state.autopoiesis.generated,
                op,
                &state,
                params,
            ),
        };

        if !outcome.success {
            let err = OperationError::HandlerFailed {
                id: id.to_string(),
                message: outcome.message.clone(),
            };
            self.record_block(id, &err);
            return Err(err);
        }

        let data = OperationData {
            op_id: spec.id.clone(),
            params: params.clone(),
            message: outcome.message.clone(),
            energy_cost: spec.energy_cost,
            state_changes: outcome.state_changes.clone(),
        };
        let value = serde_json::to_value(&data).map_err(|e| OperationError::HandlerFailed {
            id: id.to_string(),
            message: format!("result not serializable: {e}"),
        })?;
        let (state, _event) = self.manager.append_event(EventKind::Operation, value)?;

        tracing::debug!(target: "ops", op = %spec.id, "operation executed");
        Ok((outcome, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity_state::genesis;
    use entity_types::config::EntityPaths;
    use serde_json::json;
    use tempfile::tempdir;

    fn executor(dir: &std::path::Path) -> Executor {
        let paths = EntityPaths::new(dir);
        std::fs::create_dir_all(paths.spec_dir()).unwrap();
        std::fs::write(paths.spec_dir().join("01-identity.md"), b"# Test Spec").unwrap();
        genesis::instantiate(&paths, "entity/1.0", "operator", None).unwrap();
        Executor::new(Arc::new(StateManager::open(paths).unwrap()))
    }

    #[test]
    fn unknown_operation_is_refused() {
        let dir = tempdir().unwrap();
        let exec = executor(dir.path());
        assert!(matches!(
            exec.exec("no.such.op", &Value::Null),
            Err(OperationError::Unknown(_))
        ));
    }

    #[test]
    fn coupling_gate_blocks_without_session() {
        let dir = tempdir().unwrap();
        let exec = executor(dir.path());

        let err = exec
            .exec("memory.add", &json!({"memory": "hi"}))
            .unwrap_err();
        assert!(matches!(err, OperationError::CouplingRequired(_)));
        assert!(err.to_string().contains("coupling"));

        // No OPERATION event, no state change.
        let state = exec.manager.read_state().unwrap();
        assert!(state.important.is_empty());
        assert_eq!(state.memory.event_count, 1);
    }

    #[test]
    fn coupling_gate_opens_with_session() {
        let dir = tempdir().unwrap();
        let exec = executor(dir.path());
        exec.manager
            .append_event(
                EventKind::SessionStart,
                json!({"partner": "alice", "session_id": "s-1", "decay": 0.05}),
            )
            .unwrap();

        let (outcome, state) = exec.exec("memory.add", &json!({"memory": "hi"})).unwrap();
        assert!(outcome.success);
        assert_eq!(state.important.len(), 1);
        // 1.0 − 0.05 session decay − 0.02 operation cost.
        assert!((state.energy.current - 0.93).abs() < 1e-9);
    }

    #[test]
    fn energy_gate_blocks_and_debits_nothing() {
        let dir = tempdir().unwrap();
        let exec = executor(dir.path());
        exec.manager
            .append_event(EventKind::StateUpdate, json!({"energy": 0.001}))
            .unwrap();

        let err = exec.exec("learning.record", &json!({"patterns": []})).unwrap_err();
        assert!(matches!(err, OperationError::InsufficientEnergy { .. }));
        assert_eq!(exec.manager.read_state().unwrap().energy.current, 0.001);
    }

    #[test]
    fn block_logging_records_refusals() {
        let dir = tempdir().unwrap();
        let exec = executor(dir.path()).with_block_logging();

        let _ = exec.exec("memory.add", &json!({"memory": "hi"}));
        let events = exec.manager.events().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.kind, EventKind::Block);
        assert_eq!(last.data["reason"], "OP_COUPLING_REQUIRED");
    }

    #[test]
    fn handler_failure_appends_no_operation_event() {
        let dir = tempdir().unwrap();
        let exec = executor(dir.path());
        let before = exec.manager.events().unwrap().len();

        let err = exec.exec("learning.record", &json!({})).unwrap_err();
        assert!(matches!(err, OperationError::HandlerFailed { .. }));
        assert_eq!(exec.manager.events().unwrap().len(), before);
    }

    #[test]
    fn successful_execution_commits_exactly_one_event() {
        let dir = tempdir().unwrap();
        let exec = executor(dir.path());
        let before = exec.manager.events().unwrap().len();

        let (outcome, state) = exec.exec("state.summary", &Value::Null).unwrap();
        assert!(outcome.success);
        assert_eq!(exec.manager.events().unwrap().len(), before + 1);
        assert!((state.energy.current - 0.995).abs() < 1e-9);
    }
}
