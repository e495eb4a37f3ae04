//! Concurrency: independent writers serialised by the event-log lock must
//! produce one contiguous, valid chain.

use entity_state::genesis;
use entity_state::manager::StateManager;
use entity_types::chain::verify_chain;
use entity_types::config::EntityPaths;
use entity_types::event::EventKind;
use serde_json::json;
use tempfile::tempdir;

#[test]
fn concurrent_writers_produce_a_contiguous_chain() {
    const WRITERS: usize = 4;
    const APPENDS_PER_WRITER: usize = 5;

    let dir = tempdir().unwrap();
    let paths = EntityPaths::new(dir.path());
    std::fs::create_dir_all(paths.spec_dir()).unwrap();
    std::fs::write(paths.spec_dir().join("01-identity.md"), b"# Test Spec").unwrap();
    genesis::instantiate(&paths, "entity/1.0", "operator", None).unwrap();

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let paths = paths.clone();
            std::thread::spawn(move || {
                // Each writer opens its own manager, as separate processes would.
                let manager = StateManager::open(paths).unwrap();
                for i in 0..APPENDS_PER_WRITER {
                    manager
                        .append_event(
                            EventKind::StateUpdate,
                            json!({ "add_important": format!("w{w}-{i}") }),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let manager = StateManager::open(paths).unwrap();
    let events = manager.events().unwrap();
    assert_eq!(events.len(), 1 + WRITERS * APPENDS_PER_WRITER);
    for (i, e) in events.iter().enumerate() {
        assert_eq!(e.seq, i as u64 + 1);
    }
    assert!(verify_chain(&events).is_ok());

    // Every writer's appends landed.
    let state = manager.read_state().unwrap();
    assert_eq!(state.important.len(), WRITERS * APPENDS_PER_WRITER);
    assert_eq!(state.memory.event_count, events.len() as u64);
}
