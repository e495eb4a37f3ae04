//! The generating set: `define`, `compose`, and `specialize`.
//!
//! Each generator validates its inputs against the catalog and the current
//! autopoiesis record, constructs a QUARANTINED operation, and commits the
//! replacement record as a META_OPERATION event. `specialize` carries the
//! restriction bounds: a child may never be more complex, more expensive,
//! less coupled, or deeper than its parent allows.

use crate::catalog::Catalog;
use chrono::Utc;
use entity_state::manager::StateManager;
use entity_types::error::OperationError;
use entity_types::event::{EventKind, MetaOperationData};
use entity_types::ops::{
    GeneratedOperation, LifecycleStatus, OperationSpec, TemplateKind,
};
use entity_types::state::{Autopoiesis, State};
use entity_types::{MAX_GENERATION_DEPTH, SELF_PRODUCTION_CAP};
use serde_json::{json, Value};

fn id_taken(catalog: &Catalog, autopoiesis: &Autopoiesis, id: &str) -> bool {
    catalog.contains(id) || autopoiesis.generated.iter().any(|g| g.spec.id == id)
}

fn commit(
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
        message: format!("meta-operation not serializable: {e}"),
    })?;
    let (state, _event) = manager.append_event(EventKind::MetaOperation, value)?;
    Ok(state)
}

fn template_params_valid(template: TemplateKind, params: &Value) -> Result<(), OperationError> {
    let ok = match template {
        TemplateKind::ReadField => params.get("field").and_then(Value::as_str).is_some(),
        TemplateKind::SetField => params.get("changes").is_some(),
        TemplateKind::Compose => params
            .get("sequence")
            .and_then(Value::as_array)
            .is_some_and(|s| !s.is_empty()),
        TemplateKind::Conditional => {
            params.get("field").is_some() && params.get("below").is_some()
        }
        TemplateKind::Transform => params.get("source").and_then(Value::as_str).is_some(),
        TemplateKind::Aggregate => params.get("series").and_then(Value::as_str).is_some(),
        TemplateKind::Echo => true,
    };
    if ok {
        Ok(())
    } else {
        Err(OperationError::BoundsViolation(format!(
            "template {template:?} parameters are incomplete"
        )))
    }
}

/// `define`: a new operation from a template tag and parameters.
pub fn define(
    manager: &StateManager,
    catalog: &Catalog,
    id: &str,
    template: TemplateKind,
    params: Value,
    energy_cost: f64,
    requires_coupling: bool,
    current_cycle: u64,
) -> Result<(GeneratedOperation, State), OperationError> {
    let state = manager.read_state()?;
    if id_taken(catalog, &state.autopoiesis, id) {
        return Err(OperationError::DuplicateId(id.to_string()));
    }
    template_params_valid(template, &params)?;

    let op = GeneratedOperation {
        spec: OperationSpec {
            id: id.to_string(),
            category: "generated".into(),
            complexity: 1,
            energy_cost,
            requires_coupling,
        },
        template,
        params,
        depth: 1,
        parents: Vec::new(),
        status: LifecycleStatus::Quarantined,
        status_changed_at: Utc::now(),
        quarantine_start_cycle: current_cycle,
        trial: None,
    };

    let mut autopoiesis = state.autopoiesis.clone();
    autopoiesis.generated.push(op.clone());
    let state = commit(manager, "define", id, autopoiesis)?;
    tracing::info!(target: "ops", op = id, ?template, "operation defined");
    Ok((op, state))
}

/// `compose`: a bundle of existing operations, run in order.
///
/// Complexity and energy cost default to the sum of the components; depth is
/// one plus the deepest component.
pub fn compose(
    manager: &StateManager,
    catalog: &Catalog,
    id: &str,
    components: &[String],
    current_cycle: u64,
) -> Result<(GeneratedOperation, State), OperationError> {
    let state = manager.read_state()?;
    if id_taken(catalog, &state.autopoiesis, id) {
        return Err(OperationError::DuplicateId(id.to_string()));
    }
    if components.is_empty() {
        return Err(OperationError::BoundsViolation(
            "compose requires at least one component".into(),
        ));
    }

    let mut complexity: u32 = 0;
    let mut energy_cost = 0.0;
    let mut requires_coupling = false;
    let mut max_component_depth: u32 = 0;
    for component in components {
        let (spec, depth) = if let Some(def) = catalog.get(component) {
            (&def.spec, 0)
        } else if let Some(g) = state
            .autopoiesis
            .generated
            .iter()
            .find(|g| g.spec.id == *component)
        {
            (&g.spec, g.depth)
        } else {
            return Err(OperationError::Unknown(component.clone()));
        };
        complexity += spec.complexity;
        energy_cost += spec.energy_cost;
        requires_coupling |= spec.requires_coupling;
        max_component_depth = max_component_depth.max(depth);
    }
    let depth = max_component_depth + 1;
    if depth > MAX_GENERATION_DEPTH {
        return Err(OperationError::DepthExceeded {
            depth,
            max: MAX_GENERATION_DEPTH,
        });
    }

    let op = GeneratedOperation {
        spec: OperationSpec {
            id: id.to_string(),
            category: "generated".into(),
            complexity,
            energy_cost,
            requires_coupling,
        },
        template: TemplateKind::Compose,
        params: json!({ "sequence": components }),
        depth,
        parents: components.to_vec(),
        status: LifecycleStatus::Quarantined,
        status_changed_at: Utc::now(),
        quarantine_start_cycle: current_cycle,
        trial: None,
    };

    let mut autopoiesis = state.autopoiesis.clone();
    autopoiesis.generated.push(op.clone());
    let state = commit(manager, "compose", id, autopoiesis)?;
    tracing::info!(target: "ops", op = id, components = components.len(), "operation composed");
    Ok((op, state))
}

/// `specialize`: a child of an existing operation with preset parameters.
///
/// Specialization is restriction: the child's complexity and energy cost may
/// not exceed the parent's, its coupling requirement may not weaken, and its
/// depth may not exceed the generation cap. When the agent itself produces
/// the child (`produced_by_agent`), the self-production cap applies and the
/// production counter advances.
pub fn specialize(
    manager: &StateManager,
    catalog: &Catalog,
    source_id: &str,
    id: &str,
    preset: Value,
    energy_cost: Option<f64>,
    current_cycle: u64,
    produced_by_agent: bool,
) -> Result<(GeneratedOperation, State), OperationError> {
    let state = manager.read_state()?;
    if id_taken(catalog, &state.autopoiesis, id) {
        return Err(OperationError::DuplicateId(id.to_string()));
    }
    if produced_by_agent && state.autopoiesis.operations_created as usize >= SELF_PRODUCTION_CAP {
        return Err(OperationError::ProductionCapReached(SELF_PRODUCTION_CAP));
    }

    let (parent_spec, parent_depth) = if let Some(def) = catalog.get(source_id) {
        (def.spec.clone(), 0)
    } else if let Some(g) = state
        .autopoiesis
        .generated
        .iter()
        .find(|g| g.spec.id == source_id)
    {
        (g.spec.clone(), g.depth)
    } else {
        return Err(OperationError::Unknown(source_id.to_string()));
    };

    let depth = parent_depth + 1;
    if depth > MAX_GENERATION_DEPTH {
        return Err(OperationError::DepthExceeded {
            depth,
            max: MAX_GENERATION_DEPTH,
        });
    }
    let energy_cost = energy_cost.unwrap_or(parent_spec.energy_cost);
    if energy_cost > parent_spec.energy_cost {
        return Err(OperationError::BoundsViolation(format!(
            "child energy cost {energy_cost} exceeds parent {}",
            parent_spec.energy_cost
        )));
    }

    let op = GeneratedOperation {
        spec: OperationSpec {
            id: id.to_string(),
            category: "generated".into(),
            // Restriction: the child inherits the parent's complexity and
            // coupling requirement, so neither bound can be exceeded.
            complexity: parent_spec.complexity,
            energy_cost,
            requires_coupling: parent_spec.requires_coupling,
        },
        template: TemplateKind::Transform,
        params: json!({ "source": source_id, "preset": preset }),
        depth,
        parents: vec![source_id.to_string()],
        status: LifecycleStatus::Quarantined,
        status_changed_at: Utc::now(),
        quarantine_start_cycle: current_cycle,
        trial: None,
    };

    let mut autopoiesis = state.autopoiesis.clone();
    autopoiesis.generated.push(op.clone());
    if produced_by_agent {
        autopoiesis.operations_created += 1;
    }
    let state = commit(manager, "specialize", id, autopoiesis)?;
    tracing::info!(target: "ops", op = id, source = source_id, "operation specialized");
    Ok((op, state))
}
