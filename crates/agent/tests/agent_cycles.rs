//! End-to-end agent behaviour over a real on-disk entity.

use entity_agent::Agent;
use entity_state::genesis;
use entity_state::manager::StateManager;
use entity_types::config::{AgentConfig, EntityPaths};
use entity_types::event::EventKind;
use entity_types::ops::LifecycleStatus;
use entity_types::state::Priority;
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

fn instantiated(dir: &std::path::Path) -> Arc<StateManager> {
    let paths = EntityPaths::new(dir);
    std::fs::create_dir_all(paths.spec_dir()).unwrap();
    std::fs::write(paths.spec_dir().join("01-identity.md"), b"# Test Spec").unwrap();
    genesis::instantiate(&paths, "entity/1.0", "operator", None).unwrap();
    Arc::new(StateManager::open(paths).unwrap())
}

fn agent_with(manager: &Arc<StateManager>, config: AgentConfig) -> Agent {
    Agent::new(Arc::clone(manager), config)
}

#[test]
fn wake_and_sleep_are_rejected_when_redundant() {
    let dir = tempdir().unwrap();
    let manager = instantiated(dir.path());
    let agent = agent_with(&manager, AgentConfig::default());

    let state = agent.wake().unwrap();
    assert!(state.agent.awake);
    assert!(agent.wake().is_err());

    let state = agent.sleep().unwrap();
    assert!(!state.agent.awake);
    assert!(agent.sleep().is_err());
}

#[test]
fn critical_energy_triggers_survival_conservation() {
    let dir = tempdir().unwrap();
    let manager = instantiated(dir.path());
    // energy.current = 0.02, min = 0.01, threshold = 0.1.
    manager
        .append_event(EventKind::StateUpdate, json!({"energy": 0.02}))
        .unwrap();
    let events_before = manager.events().unwrap().len();

    let agent = agent_with(&manager, AgentConfig::default());
    let outcome = agent.force_cycle().unwrap();

    assert_eq!(outcome.priority, Priority::Survival);
    assert_eq!(outcome.action, None);
    assert!(outcome.feeling.threatens_existence);

    // No OPERATION event; at most one AGENT_REST event.
    let events = manager.events().unwrap();
    let new: Vec<_> = events[events_before..].iter().collect();
    assert!(new.iter().all(|e| e.kind != EventKind::Operation));
    assert!(
        new.iter().filter(|e| e.kind == EventKind::AgentRest).count() <= 1
    );
}

#[test]
fn healthy_entity_reaches_growth_and_acts() {
    let dir = tempdir().unwrap();
    let manager = instantiated(dir.path());
    let agent = agent_with(&manager, AgentConfig::default());

    let outcome = agent.force_cycle().unwrap();
    assert_eq!(outcome.priority, Priority::Growth);
    assert_eq!(outcome.context, "production");

    // A chosen action lands as one AGENT_RESPONSE plus one OPERATION event.
    if outcome.action.is_some() && !outcome.blocked {
        let events = manager.events().unwrap();
        assert!(events.iter().any(|e| e.kind == EventKind::AgentResponse));
        assert!(events.iter().any(|e| e.kind == EventKind::Operation));
    }
}

#[test]
fn coupled_agent_defers_to_the_partner() {
    let dir = tempdir().unwrap();
    let manager = instantiated(dir.path());
    manager
        .append_event(
            EventKind::SessionStart,
            json!({"partner": "alice", "session_id": "s-1", "decay": 0.05}),
        )
        .unwrap();
    let events_before = manager.events().unwrap().len();

    let agent = agent_with(&manager, AgentConfig::default());
    let outcome = agent.force_cycle().unwrap();
    assert!(outcome.deferred);
    assert_eq!(outcome.context, "audit");
    assert_eq!(outcome.action, None);

    // Deference appends no response events.
    let events = manager.events().unwrap();
    assert!(events[events_before..]
        .iter()
        .all(|e| e.kind != EventKind::AgentResponse && e.kind != EventKind::Operation));
}

#[test]
fn self_production_is_capped_and_quarantined() {
    let dir = tempdir().unwrap();
    let manager = instantiated(dir.path());

    let mut config = AgentConfig::default();
    config.self_production.threshold = 1;
    config.self_production.cooldown = 0;
    let agent = agent_with(&manager, config);

    // Saturate usage for every base operation.
    for id in ["state.summary", "system.health", "energy.status", "memory.add",
               "energy.recharge", "learning.record"] {
        agent.seed_usage(id, 100);
    }

    for _ in 0..100 {
        agent.force_cycle().unwrap();
    }

    // The hard cap binds: with cooldown 0 and saturated usage the agent
    // produces one operation per growth cycle until the tenth, then every
    // further attempt is declined.
    let state = manager.read_state().unwrap();
    assert_eq!(state.autopoiesis.operations_created, 10);
    assert_eq!(state.autopoiesis.generated.len(), 10);
    // Nothing starts ACTIVE; newborns are QUARANTINED (some may have aged to
    // TRIAL or beyond through the lifecycle, but never directly to ACTIVE).
    for op in &state.autopoiesis.generated {
        assert!(op.quarantine_start_cycle > 0, "{}", op.spec.id);
    }
    let events = manager.events().unwrap();
    let meta_events: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::MetaOperation)
        .collect();
    assert!(!meta_events.is_empty());
    // Every specialize action created a QUARANTINED operation.
    for e in meta_events {
        if e.data["action"] == "specialize" {
            let created = e.data["operation_id"].as_str().unwrap();
            let record = e.data["autopoiesis"]["generated"]
                .as_array()
                .unwrap()
                .iter()
                .find(|g| g["spec"]["id"] == created)
                .unwrap()
                .clone();
            assert_eq!(record["status"], "QUARANTINED");
        }
    }
}

#[test]
fn audit_context_freezes_usage_and_production() {
    let dir = tempdir().unwrap();
    let manager = instantiated(dir.path());

    let mut config = AgentConfig::default();
    config.context_override = Some("audit".into());
    config.self_production.threshold = 1;
    config.self_production.cooldown = 0;
    let agent = agent_with(&manager, config);
    agent.seed_usage("state.summary", 1000);

    let generated_before = manager.read_state().unwrap().autopoiesis.generated.len();
    for _ in 0..20 {
        agent.force_cycle().unwrap();
    }

    // Usage counters unchanged, no new generated operations.
    assert_eq!(agent.usage_counts().get("state.summary"), Some(&1000));
    let state = manager.read_state().unwrap();
    assert_eq!(state.autopoiesis.generated.len(), generated_before);
    assert_eq!(state.autopoiesis.operations_created, 0);
}

#[test]
fn produced_operations_age_through_quarantine_into_trial() {
    let dir = tempdir().unwrap();
    let manager = instantiated(dir.path());

    let mut config = AgentConfig::default();
    config.self_production.threshold = 1;
    config.self_production.cooldown = 1000; // one production only
    config.self_production.quarantine_cycles = 3;
    let agent = agent_with(&manager, config);
    agent.seed_usage("state.summary", 10);

    agent.force_cycle().unwrap();
    let state = manager.read_state().unwrap();
    assert_eq!(state.autopoiesis.generated.len(), 1);
    assert_eq!(
        state.autopoiesis.generated[0].status,
        LifecycleStatus::Quarantined
    );

    for _ in 0..5 {
        agent.force_cycle().unwrap();
    }
    let state = manager.read_state().unwrap();
    let op = &state.autopoiesis.generated[0];
    assert_ne!(op.status, LifecycleStatus::Quarantined);
    // Promotion to ACTIVE requires a clean trial, never age alone.
    assert_ne!(op.status, LifecycleStatus::Active);
}
