//! The template interpreter behind generated operations.
//!
//! A generated operation is a tagged instance of a closed template set; its
//! behaviour is rebuilt on demand by interpreting `(template, params)`
//! against the catalog and the autopoiesis record. Nothing here loads code.

use crate::catalog::Catalog;
use entity_types::ops::{
    GeneratedOperation, OperationOutcome, StateChanges, TemplateKind,
};
use entity_types::state::State;
use serde_json::{json, Map, Value};

/// Recursion budget for nested templates; matches the generation depth cap.
const DEPTH_BUDGET: u32 = entity_types::MAX_GENERATION_DEPTH;

fn merge_changes(into: &mut StateChanges, from: StateChanges) {
    if let Some(delta) = from.energy_delta {
        *into.energy_delta.get_or_insert(0.0) += delta;
    }
    if from.human.is_some() {
        into.human = from.human;
    }
    if from.add_important.is_some() {
        into.add_important = from.add_important;
    }
    if from.patterns_hash.is_some() {
        into.patterns_hash = from.patterns_hash;
    }
}

/// Reads a dotted field path out of the state's JSON projection.
fn read_field(state: &State, path: &str) -> Option<Value> {
    let mut node = serde_json::to_value(state).ok()?;
    for part in path.split('.') {
        node = node.get(part)?.clone();
    }
    Some(node)
}

fn run_by_id(
    catalog: &Catalog,
    generated: &[GeneratedOperation],
    id: &str,
    state: &State,
    params: &Value,
    budget: u32,
) -> OperationOutcome {
    if let Some(def) = catalog.get(id) {
        return (def.handler)(state, params);
    }
    if let Some(op) = generated.iter().find(|g| g.spec.id == id) {
        return run_with_budget(catalog, generated, op, state, params, budget);
    }
    OperationOutcome::failure(format!("unknown component operation {id}"))
}

/// Interprets a generated operation against the current state.
pub fn run(
    catalog: &Catalog,
    generated: &[GeneratedOperation],
    op: &GeneratedOperation,
    state: &State,
    params: &Value,
) -> OperationOutcome {
    run_with_budget(catalog, generated, op, state, params, DEPTH_BUDGET)
}

fn run_with_budget(
    catalog: &Catalog,
    generated: &[GeneratedOperation],
    op: &GeneratedOperation,
    state: &State,
    params: &Value,
    budget: u32,
) -> OperationOutcome {
    let Some(budget) = budget.checked_sub(1) else {
        return OperationOutcome::failure("template recursion budget exhausted");
    };

    match op.template {
        TemplateKind::ReadField => {
            let Some(field) = op.params.get("field").and_then(Value::as_str) else {
                return OperationOutcome::failure("read_field template missing `field`");
            };
            match read_field(state, field) {
                Some(value) => OperationOutcome::observation(
                    format!("read {field}"),
                    json!({ "field": field, "value": value }),
                ),
                None => OperationOutcome::failure(format!("no such field {field}")),
            }
        }
        TemplateKind::SetField => {
            let changes: StateChanges = match op
                .params
                .get("changes")
                .cloned()
                .map(serde_json::from_value)
            {
                Some(Ok(changes)) => changes,
                _ => return OperationOutcome::failure("set_field template missing `changes`"),
            };
            OperationOutcome {
                success: true,
                message: "state change requested".into(),
                effects: Value::Null,
                state_changes: changes,
            }
        }
        TemplateKind::Compose => {
            let Some(sequence) = op.params.get("sequence").and_then(Value::as_array) else {
                return OperationOutcome::failure("compose template missing `sequence`");
            };
            let mut effects = Vec::new();
            let mut changes = StateChanges::default();
            for entry in sequence {
                let Some(id) = entry.as_str() else {
                    return OperationOutcome::failure("compose sequence entries must be ids");
                };
                let outcome = run_by_id(catalog, generated, id, state, params, budget);
                if !outcome.success {
                    return OperationOutcome::failure(format!(
                        "component {id} failed: {}",
                        outcome.message
                    ));
                }
                effects.push(json!({ "op": id, "effects": outcome.effects }));
                merge_changes(&mut changes, outcome.state_changes);
            }
            OperationOutcome {
                success: true,
                message: format!("composed {} operations", sequence.len()),
                effects: Value::Array(effects),
                state_changes: changes,
            }
        }
        TemplateKind::Conditional => {
            let field = op.params.get("field").and_then(Value::as_str);
            let threshold = op.params.get("below").and_then(Value::as_f64);
            let (Some(field), Some(threshold)) = (field, threshold) else {
                return OperationOutcome::failure(
                    "conditional template requires `field` and `below`",
                );
            };
            let observed = read_field(state, field).and_then(|v| v.as_f64());
            let Some(observed) = observed else {
                return OperationOutcome::failure(format!("field {field} is not numeric"));
            };
            let branch = if observed < threshold { "then" } else { "else" };
            match op.params.get(branch).and_then(Value::as_str) {
                Some(id) => run_by_id(catalog, generated, id, state, params, budget),
                None => OperationOutcome::observation(
                    format!("no {branch} branch; observed {field} = {observed}"),
                    json!({ "field": field, "value": observed, "branch": branch }),
                ),
            }
        }
        TemplateKind::Transform => {
            let Some(source) = op.params.get("source").and_then(Value::as_str) else {
                return OperationOutcome::failure("transform template missing `source`");
            };
            // Preset parameters win over caller parameters.
            let mut merged = match params {
                Value::Object(map) => map.clone(),
                _ => Map::new(),
            };
            if let Some(Value::Object(preset)) = op.params.get("preset") {
                for (k, v) in preset {
                    merged.insert(k.clone(), v.clone());
                }
            }
            run_by_id(
                catalog,
                generated,
                source,
                state,
                &Value::Object(merged),
                budget,
            )
        }
        TemplateKind::Aggregate => {
            let series = op.params.get("series").and_then(Value::as_str).unwrap_or("");
            match series {
                "important" => OperationOutcome::observation(
                    "aggregated important memories",
                    json!({
                        "series": "important",
                        "count": state.important.len(),
                    }),
                ),
                "responses" => {
                    let r = &state.agent.responses;
                    let total = r.survival + r.integrity + r.stability + r.growth + r.rest;
                    OperationOutcome::observation(
                        "aggregated responses",
                        json!({ "series": "responses", "total": total, "by_priority": r }),
                    )
                }
                other => {
                    OperationOutcome::failure(format!("unknown aggregate series `{other}`"))
                }
            }
        }
        TemplateKind::Echo => OperationOutcome::observation(
            "echo",
            json!({ "template_params": op.params, "call_params": params }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use entity_types::ops::{LifecycleStatus, OperationSpec};

    fn state() -> State {
        State::genesis(
            "entity/1.0".into(),
            "hash".into(),
            "operator".into(),
            None,
            Utc::now(),
        )
    }

    fn generated(id: &str, template: TemplateKind, params: Value) -> GeneratedOperation {
        GeneratedOperation {
            spec: OperationSpec {
                id: id.to_string(),
                category: "generated".into(),
                complexity: 1,
                energy_cost: 0.005,
                requires_coupling: false,
            },
            template,
            params,
            depth: 1,
            parents: vec![],
            status: LifecycleStatus::Active,
            status_changed_at: Utc::now(),
            quarantine_start_cycle: 0,
            trial: None,
        }
    }

    #[test]
    fn read_field_resolves_dotted_paths() {
        let op = generated(
            "gen.energy",
            TemplateKind::ReadField,
            json!({"field": "energy.current"}),
        );
        let outcome = run(&Catalog::standard(), &[], &op, &state(), &Value::Null);
        assert!(outcome.success);
        assert_eq!(outcome.effects["value"], json!(1.0));
    }

    #[test]
    fn compose_runs_components_in_order() {
        let op = generated(
            "gen.checkup",
            TemplateKind::Compose,
            json!({"sequence": ["energy.status", "system.health"]}),
        );
        let outcome = run(&Catalog::standard(), &[], &op, &state(), &Value::Null);
        assert!(outcome.success);
        let effects = outcome.effects.as_array().unwrap();
        assert_eq!(effects[0]["op"], "energy.status");
        assert_eq!(effects[1]["op"], "system.health");
    }

    #[test]
    fn conditional_selects_branch_by_threshold() {
        let mut s = state();
        s.energy.current = 0.02;
        let op = generated(
            "gen.guard",
            TemplateKind::Conditional,
            json!({
                "field": "energy.current",
                "below": 0.1,
                "then": "energy.status",
            }),
        );
        let outcome = run(&Catalog::standard(), &[], &op, &s, &Value::Null);
        assert!(outcome.success);
        assert_eq!(outcome.effects["current"], json!(0.02));
    }

    #[test]
    fn transform_merges_preset_over_call_params() {
        let op = generated(
            "gen.topup",
            TemplateKind::Transform,
            json!({"source": "energy.recharge", "preset": {"amount": 0.125}}),
        );
        let outcome = run(
            &Catalog::standard(),
            &[],
            &op,
            &state(),
            &json!({"amount": 0.9}),
        );
        assert!(outcome.success);
        assert_eq!(outcome.effects["requested"], json!(0.125));
    }

    #[test]
    fn recursion_budget_stops_self_reference() {
        let looping = generated(
            "gen.loop",
            TemplateKind::Compose,
            json!({"sequence": ["gen.loop"]}),
        );
        let all = vec![looping.clone()];
        let outcome = run(&Catalog::standard(), &all, &looping, &state(), &Value::Null);
        assert!(!outcome.success);
        assert!(outcome.message.contains("budget"));
    }

    #[test]
    fn unknown_component_fails_cleanly() {
        let op = generated(
            "gen.bad",
            TemplateKind::Compose,
            json!({"sequence": ["no.such.op"]}),
        );
        let outcome = run(&Catalog::standard(), &[], &op, &state(), &Value::Null);
        assert!(!outcome.success);
    }
}
