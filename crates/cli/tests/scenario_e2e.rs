//! End-to-end scenarios driven through the kernel library surface, exactly
//! as the binary drives it.

use entity_cli::Kernel;
use entity_types::chain::verify_chain;
use entity_types::error::KernelError;
use entity_types::event::EventKind;
use entity_types::ops::TemplateKind;
use serde_json::json;
use tempfile::tempdir;

fn instantiate(dir: &std::path::Path) -> Kernel {
    let spec_dir = dir.join("spec");
    std::fs::create_dir_all(&spec_dir).unwrap();
    std::fs::write(spec_dir.join("01-identity.md"), b"# Test Spec").unwrap();
    Kernel::instantiate(dir, "entity/1.0", "operator", Some("aria")).unwrap()
}

#[test]
fn genesis_then_session_round_trip() {
    let dir = tempdir().unwrap();
    let kernel = instantiate(dir.path());

    kernel.session_start("alice").unwrap();
    let state = kernel.session_end().unwrap();

    // Three events: GENESIS, SESSION_START, SESSION_END.
    let events = kernel.manager().events().unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(state.session.total_count, 1);
    assert!(!state.coupling.active);
    // Energy paid exactly one session decay.
    assert!((state.energy.current - 0.95).abs() < 1e-12);
    assert!(verify_chain(&events).is_ok());
}

#[test]
fn double_session_start_is_refused() {
    let dir = tempdir().unwrap();
    let kernel = instantiate(dir.path());

    kernel.session_start("alice").unwrap();
    let err = kernel.session_start("bob").unwrap_err();
    assert!(matches!(err, KernelError::Session(_)));
    assert!(matches!(
        kernel.session_end().and_then(|_| kernel.session_end()),
        Err(KernelError::Session(_))
    ));
}

#[test]
fn coupling_requests_queue_and_drain_on_session_start() {
    let dir = tempdir().unwrap();
    let kernel = instantiate(dir.path());

    let state = kernel.coupling_request("alice").unwrap();
    assert_eq!(state.coupling_requests.len(), 1);
    // Duplicate requests from the same partner collapse.
    let state = kernel.coupling_request("alice").unwrap();
    assert_eq!(state.coupling_requests.len(), 1);
    let state = kernel.coupling_request("bob").unwrap();
    assert_eq!(state.coupling_requests.len(), 2);

    // Starting a session serves the matching request only.
    let state = kernel.session_start("alice").unwrap();
    assert_eq!(state.coupling_requests.len(), 1);
    assert_eq!(state.coupling_requests[0].partner, "bob");
}

#[test]
fn coupling_gate_blocks_memory_add_without_session() {
    let dir = tempdir().unwrap();
    let kernel = instantiate(dir.path());

    let err = kernel
        .op_exec("memory.add", &json!({"memory": "hi"}))
        .unwrap_err();
    assert!(err.to_string().contains("coupling"));

    // The important list is unchanged, and the refusal is auditable.
    let state = kernel.manager().read_state().unwrap();
    assert!(state.important.is_empty());
    let events = kernel.manager().events().unwrap();
    assert_eq!(events.last().unwrap().kind, EventKind::Block);
}

#[test]
fn chain_tamper_is_detected_and_freezes_recovery() {
    let dir = tempdir().unwrap();
    let kernel = instantiate(dir.path());
    kernel.session_start("alice").unwrap();
    kernel.session_end().unwrap();

    // Flip one byte of event #3's payload on disk.
    let path = dir.path().join("events").join("000003");
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, text.replace("s-1", "s-9")).unwrap();

    let events = kernel.manager().events().unwrap();
    assert!(verify_chain(&events).is_err());

    let report = kernel.verify_readonly().unwrap();
    assert!(report.is_violated("INV-003"));
    assert!(!report.passed);

    // Recovery refuses automatic repair and appends nothing.
    let before = kernel.manager().events().unwrap().len();
    let recovery = kernel.recover().unwrap();
    assert_ne!(
        recovery.status,
        entity_state::recovery::RecoveryStatus::Recovered
    );
    assert_eq!(kernel.manager().events().unwrap().len(), before);
}

#[test]
fn status_reports_terminal_with_nonzero_exit() {
    let dir = tempdir().unwrap();
    let kernel = instantiate(dir.path());
    assert_eq!(kernel.status().unwrap().exit_code(), 0);

    // Mutate the organization documents: identity is lost, entity terminal.
    std::fs::write(dir.path().join("spec").join("01-identity.md"), b"# Mutated").unwrap();
    kernel.recover().unwrap();

    let status = kernel.status().unwrap();
    assert_eq!(status.status, entity_types::state::IntegrityStatus::Terminal);
    assert_eq!(status.exit_code(), 1);
}

#[test]
fn logged_verify_appends_and_pure_verify_does_not() {
    let dir = tempdir().unwrap();
    let kernel = instantiate(dir.path());

    let before = kernel.manager().events().unwrap().len();
    kernel.verify_readonly().unwrap();
    assert_eq!(kernel.manager().events().unwrap().len(), before);

    let (report, _) = kernel.verify().unwrap();
    assert!(report.passed);
    assert_eq!(kernel.manager().events().unwrap().len(), before + 1);
}

#[test]
fn meta_surface_defines_composes_and_specializes() {
    let dir = tempdir().unwrap();
    let kernel = instantiate(dir.path());

    let defined = kernel
        .meta_define(
            "gen.peek",
            TemplateKind::ReadField,
            json!({"field": "energy.current"}),
            0.002,
            false,
        )
        .unwrap();
    assert_eq!(
        defined.status,
        entity_types::ops::LifecycleStatus::Quarantined
    );

    let composed = kernel
        .meta_compose("gen.checkup", &["energy.status".into(), "system.health".into()])
        .unwrap();
    assert_eq!(composed.parents.len(), 2);

    let specialized = kernel
        .meta_specialize("energy.recharge", "gen.topup", json!({"amount": 0.1}), None)
        .unwrap();
    assert_eq!(specialized.parents, vec!["energy.recharge".to_string()]);

    // None of them is executable until its lifecycle reaches ACTIVE.
    let err = kernel.op_exec("gen.peek", &json!(null)).unwrap_err();
    assert!(err.to_string().contains("not executable"));
}

#[test]
fn snapshot_surface_round_trips() {
    let dir = tempdir().unwrap();
    let kernel = instantiate(dir.path());

    let info = kernel.snapshot_create("before maintenance").unwrap();
    let listed = kernel.snapshot_list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, info.id);

    let restored = kernel.snapshot_restore(&info.id).unwrap();
    assert_eq!(restored.memory.event_count, info.last_seq);
}

#[test]
fn recharge_restores_energy_after_sessions() {
    let dir = tempdir().unwrap();
    let kernel = instantiate(dir.path());
    for i in 0..4 {
        kernel.session_start(&format!("partner-{i}")).unwrap();
        kernel.session_end().unwrap();
    }
    let drained = kernel.status().unwrap().energy;
    assert!(drained < 0.85);

    kernel.recharge(Some(0.5)).unwrap();
    let status = kernel.status().unwrap();
    assert!(status.energy > drained);
    assert!(status.energy <= 1.0);
}
