//! The built-in operation catalog.
//!
//! A closed map from dotted identifier to definition. Handlers are pure
//! functions of `(state, params)`: they perform no I/O and request every
//! side effect through the returned state delta.

use entity_types::ops::{OperationOutcome, OperationSpec, StateChanges};
use entity_types::state::State;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// A pure built-in handler.
pub type BuiltinHandler = fn(&State, &Value) -> OperationOutcome;

/// A built-in operation: descriptor plus handler.
pub struct OperationDef {
    /// Descriptor.
    pub spec: OperationSpec,
    /// Pure handler.
    pub handler: BuiltinHandler,
}

/// The closed catalog of built-in operations.
pub struct Catalog {
    ops: BTreeMap<String, OperationDef>,
}

fn spec(
    id: &str,
    category: &str,
    complexity: u32,
    energy_cost: f64,
    requires_coupling: bool,
) -> OperationSpec {
    OperationSpec {
        id: id.to_string(),
        category: category.to_string(),
        complexity,
        energy_cost,
        requires_coupling,
    }
}

fn state_summary(state: &State, _params: &Value) -> OperationOutcome {
    OperationOutcome::observation(
        "state summary",
        json!({
            "specification": state.specification,
            "events": state.memory.event_count,
            "energy": state.energy.current,
            "v": state.lyapunov.v,
            "status": state.integrity.status,
            "sessions": state.session.total_count,
            "important_memories": state.important.len(),
            "generated_operations": state.autopoiesis.generated.len(),
        }),
    )
}

fn system_health(state: &State, _params: &Value) -> OperationOutcome {
    OperationOutcome::observation(
        "system health",
        json!({
            "status": state.integrity.status,
            "violation_count": state.integrity.violation_count,
            "last_verification": state.integrity.last_verification,
            "v": state.lyapunov.v,
            "v_previous": state.lyapunov.v_previous,
            "coupled": state.coupling.active,
        }),
    )
}

fn energy_status(state: &State, _params: &Value) -> OperationOutcome {
    OperationOutcome::observation(
        "energy status",
        json!({
            "current": state.energy.current,
            "min": state.energy.min,
            "threshold": state.energy.threshold,
            "viable": state.energy.current >= state.energy.min,
        }),
    )
}

fn memory_add(_state: &State, params: &Value) -> OperationOutcome {
    let Some(content) = params.get("memory").and_then(Value::as_str) else {
        return OperationOutcome::failure("missing `memory` parameter");
    };
    if content.trim().is_empty() {
        return OperationOutcome::failure("`memory` must not be empty");
    }
    OperationOutcome {
        success: true,
        message: format!("remembered {} bytes", content.len()),
        effects: Value::Null,
        state_changes: StateChanges {
            add_important: Some(content.to_string()),
            ..Default::default()
        },
    }
}

fn energy_recharge(state: &State, params: &Value) -> OperationOutcome {
    let amount = params
        .get("amount")
        .and_then(Value::as_f64)
        .unwrap_or(0.25)
        .clamp(0.0, 1.0);
    let headroom = 1.0 - state.energy.current;
    OperationOutcome {
        success: true,
        message: format!("recharged by {:.4}", amount.min(headroom)),
        effects: json!({ "requested": amount, "applied": amount.min(headroom) }),
        state_changes: StateChanges {
            energy_delta: Some(amount),
            ..Default::default()
        },
    }
}

fn learning_record(_state: &State, params: &Value) -> OperationOutcome {
    let Some(patterns) = params.get("patterns") else {
        return OperationOutcome::failure("missing `patterns` parameter");
    };
    match entity_types::codec::content_hash(patterns) {
        Ok(hash) => OperationOutcome {
            success: true,
            message: "patterns recorded".into(),
            effects: json!({ "patterns_hash": hash }),
            state_changes: StateChanges {
                patterns_hash: Some(hash),
                ..Default::default()
            },
        },
        Err(e) => OperationOutcome::failure(format!("patterns not hashable: {e}")),
    }
}

impl Catalog {
    /// The standard built-in set.
    pub fn standard() -> Self {
        let defs = [
            OperationDef {
                spec: spec("state.summary", "diagnostic", 1, 0.005, false),
                handler: state_summary,
            },
            OperationDef {
                spec: spec("system.health", "diagnostic", 1, 0.005, false),
                handler: system_health,
            },
            OperationDef {
                spec: spec("energy.status", "diagnostic", 1, 0.005, false),
                handler: energy_status,
            },
            OperationDef {
                spec: spec("memory.add", "memory", 2, 0.02, true),
                handler: memory_add,
            },
            OperationDef {
                spec: spec("energy.recharge", "maintenance", 2, 0.0, false),
                handler: energy_recharge,
            },
            OperationDef {
                spec: spec("learning.record", "learning", 3, 0.03, false),
                handler: learning_record,
            },
        ];
        let mut ops = BTreeMap::new();
        for def in defs {
            ops.insert(def.spec.id.clone(), def);
        }
        Self { ops }
    }

    /// Looks up a built-in by identifier.
    pub fn get(&self, id: &str) -> Option<&OperationDef> {
        self.ops.get(id)
    }

    /// Whether a built-in with this identifier exists.
    pub fn contains(&self, id: &str) -> bool {
        self.ops.contains_key(id)
    }

    /// Identifiers in the catalog, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ops.keys().map(String::as_str)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn state() -> State {
        State::genesis(
            "entity/1.0".into(),
            "hash".into(),
            "operator".into(),
            None,
            Utc::now(),
        )
    }

    #[test]
    fn standard_catalog_is_closed_and_sorted() {
        let catalog = Catalog::standard();
        let ids: Vec<_> = catalog.ids().collect();
        assert_eq!(
            ids,
            vec![
                "energy.recharge",
                "energy.status",
                "learning.record",
                "memory.add",
                "state.summary",
                "system.health",
            ]
        );
    }

    #[test]
    fn diagnostics_request_no_state_changes() {
        let state = state();
        for id in ["state.summary", "system.health", "energy.status"] {
            let def = Catalog::standard();
            let def = def.get(id).unwrap();
            let outcome = (def.handler)(&state, &Value::Null);
            assert!(outcome.success);
            assert!(outcome.state_changes.is_empty(), "{id} mutated state");
        }
    }

    #[test]
    fn memory_add_requires_content() {
        let state = state();
        let catalog = Catalog::standard();
        let def = catalog.get("memory.add").unwrap();
        assert!(def.spec.requires_coupling);

        let missing = (def.handler)(&state, &json!({}));
        assert!(!missing.success);

        let ok = (def.handler)(&state, &json!({"memory": "hi"}));
        assert!(ok.success);
        assert_eq!(ok.state_changes.add_important.as_deref(), Some("hi"));
    }

    #[test]
    fn recharge_reports_clamped_application() {
        let mut state = state();
        state.energy.current = 0.75;
        let catalog = Catalog::standard();
        let def = catalog.get("energy.recharge").unwrap();
        let outcome = (def.handler)(&state, &json!({"amount": 0.5}));
        assert!(outcome.success);
        assert_eq!(outcome.effects["applied"], json!(0.25));
        // The delta itself is clamped by the applier, not the handler.
        assert_eq!(outcome.state_changes.energy_delta, Some(0.5));
    }
}
