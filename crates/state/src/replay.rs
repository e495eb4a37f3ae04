//! The single event applier.
//!
//! Every path that derives state runs through [`apply_event`]: full-log
//! replay, the StateManager's in-place commit, and recovery rebuilds. The
//! applier is total over the closed kind set, deterministic (it reads time
//! only from the event itself), and updates the memory bookkeeping for every
//! kind, including kinds this build does not recognise.

use chrono::{DateTime, Utc};
use entity_types::error::{ChainError, StateError};
use entity_types::event::{
    AgentPhaseData, AgentResponseData, AgentRestData, AgentUltrastabilityData, Event, EventKind,
    GenesisData, LearningData, MetaOperationData, OperationData, SessionStartData,
    SnapshotData, StateUpdateData, VerificationData,
};
use entity_types::ops::StateChanges;
use entity_types::state::{ImportantMemory, State};
use serde::de::DeserializeOwned;

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

fn payload<T: DeserializeOwned>(event: &Event) -> Result<T, StateError> {
    serde_json::from_value(event.data.clone()).map_err(|e| StateError::MalformedPayload {
        seq: event.seq,
        detail: e.to_string(),
    })
}

fn add_important(state: &mut State, content: String, at: DateTime<Utc>) {
    state.important.push(ImportantMemory {
        content,
        recorded_at: at,
    });
}

fn apply_state_changes(state: &mut State, changes: &StateChanges, at: DateTime<Utc>) {
    if let Some(delta) = changes.energy_delta {
        state.energy.current = clamp01(state.energy.current + delta);
    }
    if let Some(human) = &changes.human {
        state.human = human.clone();
    }
    if let Some(content) = &changes.add_important {
        add_important(state, content.clone(), at);
    }
    if let Some(hash) = &changes.patterns_hash {
        state.learning.patterns_hash = Some(hash.clone());
        state.learning.last_learned_at = Some(at);
    }
}

/// Applies one event to the prior state.
///
/// `prior` is `None` only for the GENESIS event; a GENESIS with a prior
/// state, or any other kind without one, is malformed history.
pub fn apply_event(prior: Option<State>, event: &Event) -> Result<State, StateError> {
    let mut state = match (prior, &event.kind) {
        (None, EventKind::Genesis) => {
            let data: GenesisData = payload(event)?;
            State::genesis(
                data.specification,
                data.organization_hash,
                data.instantiated_by,
                data.name,
                event.timestamp,
            )
        }
        (Some(_), EventKind::Genesis) => {
            return Err(StateError::Chain(ChainError::GenesisShape));
        }
        (None, _) => {
            return Err(StateError::Chain(ChainError::GenesisShape));
        }
        (Some(state), _) => state,
    };

    match &event.kind {
        EventKind::Genesis => {}
        EventKind::SessionStart => {
            let data: SessionStartData = payload(event)?;
            state.session.total_count += 1;
            state.session.current_id = Some(data.session_id);
            state.coupling.active = true;
            state.coupling.partner = Some(data.partner.clone());
            state.coupling.since = Some(event.timestamp);
            state.energy.current = clamp01(state.energy.current - data.decay);
            // A pending request from this partner is now served.
            if let Some(pos) = state
                .coupling_requests
                .iter()
                .position(|r| r.partner == data.partner)
            {
                state.coupling_requests.remove(pos);
            }
        }
        EventKind::SessionEnd => {
            state.coupling = Default::default();
            state.session.current_id = None;
        }
        EventKind::StateUpdate => {
            let data: StateUpdateData = payload(event)?;
            if let Some(energy) = data.energy {
                state.energy.current = clamp01(energy);
            }
            if let Some(v) = data.lyapunov {
                state.lyapunov.v_previous = state.lyapunov.v;
                state.lyapunov.v = v;
            }
            if let Some(human) = data.human {
                state.human = human;
            }
            if let Some(content) = data.add_important {
                add_important(&mut state, content, event.timestamp);
            }
            if let Some(requests) = data.coupling_requests {
                state.coupling_requests = requests;
            }
        }
        EventKind::Operation => {
            let data: OperationData = payload(event)?;
            apply_state_changes(&mut state, &data.state_changes, event.timestamp);
            state.energy.current = clamp01(state.energy.current - data.energy_cost);
        }
        EventKind::Block => {}
        EventKind::Verification => {
            let data: VerificationData = payload(event)?;
            state.integrity.last_verification = Some(event.timestamp);
            state.integrity.violation_count += data.violations.len() as u64;
            state.integrity.status = data.status;
            state.lyapunov.v_previous = state.lyapunov.v;
            state.lyapunov.v = data.v;
        }
        EventKind::Snapshot => {
            let _data: SnapshotData = payload(event)?;
            state.memory.last_snapshot_at = Some(event.timestamp);
        }
        EventKind::Learning => {
            let data: LearningData = payload(event)?;
            state.learning.last_learned_at = Some(event.timestamp);
            state.learning.patterns_hash = Some(data.patterns_hash);
        }
        EventKind::MetaOperation => {
            let data: MetaOperationData = payload(event)?;
            state.autopoiesis = data.autopoiesis;
        }
        EventKind::AgentWake => {
            let data: AgentPhaseData = payload(event)?;
            state.agent.awake = true;
            state.agent.cycle_count = state.agent.cycle_count.max(data.cycle);
        }
        EventKind::AgentSleep => {
            let data: AgentPhaseData = payload(event)?;
            state.agent.awake = false;
            state.agent.cycle_count = state.agent.cycle_count.max(data.cycle);
        }
        EventKind::AgentResponse => {
            let data: AgentResponseData = payload(event)?;
            // The cycle index is adopted, never incremented, so a response
            // can never double-count a cycle.
            state.agent.cycle_count = state.agent.cycle_count.max(data.cycle);
            state.agent.responses.bump(data.priority);
            if data.blocked {
                state.agent.actions_blocked += 1;
            } else if data.action.is_some() {
                state.agent.actions_taken += 1;
            }
            state.energy.current = clamp01(state.energy.current - data.feeling_cost);
        }
        EventKind::AgentRest => {
            let data: AgentRestData = payload(event)?;
            state.agent.cycle_count = state.agent.cycle_count.max(data.cycle);
            state.agent.responses.rest += data.rest_cycles;
        }
        EventKind::AgentUltrastability => {
            let data: AgentUltrastabilityData = payload(event)?;
            state.agent.cycle_count = state.agent.cycle_count.max(data.cycle);
        }
        // Kinds from a newer build replay as bookkeeping-only no-ops.
        EventKind::Other(_) => {}
    }

    state.memory.event_count = event.seq;
    state.memory.last_event_hash = Some(event.hash.clone());
    Ok(state)
}

/// Folds the full event list into a state, starting from GENESIS.
pub fn replay(events: &[Event]) -> Result<State, StateError> {
    let mut state: Option<State> = None;
    for event in events {
        state = Some(apply_event(state, event)?);
    }
    state.ok_or(StateError::Chain(ChainError::Empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity_types::event::SessionEndData;
    use serde_json::json;

    fn build_event(seq: u64, kind: EventKind, data: serde_json::Value, prev: Option<&Event>) -> Event {
        Event::build(
            seq,
            kind,
            Utc::now(),
            data,
            prev.map(|p| p.hash.clone()),
        )
        .unwrap()
    }

    fn genesis_event() -> Event {
        build_event(
            1,
            EventKind::Genesis,
            json!({
                "version": 1,
                "specification": "entity/1.0",
                "organization_hash": "deadbeef",
                "instantiated_by": "operator",
                "name": "aria"
            }),
            None,
        )
    }

    #[test]
    fn genesis_sets_documented_defaults() {
        let state = replay(&[genesis_event()]).unwrap();
        assert_eq!(state.organization_hash, "deadbeef");
        assert_eq!(state.energy.current, 1.0);
        assert_eq!(state.lyapunov.v, 0.0);
        assert!(state.important.is_empty());
        assert_eq!(
            state.integrity.status,
            entity_types::state::IntegrityStatus::Nominal
        );
        assert_eq!(state.memory.event_count, 1);
    }

    #[test]
    fn first_event_must_be_genesis() {
        let e = build_event(1, EventKind::Operation, json!({}), None);
        assert!(matches!(
            replay(&[e]),
            Err(StateError::Chain(ChainError::GenesisShape))
        ));
    }

    #[test]
    fn session_round_trip_updates_coupling_and_energy() {
        let g = genesis_event();
        let start = build_event(
            2,
            EventKind::SessionStart,
            serde_json::to_value(SessionStartData {
                partner: "alice".into(),
                session_id: "s-1".into(),
                decay: 0.05,
            })
            .unwrap(),
            Some(&g),
        );
        let mid = replay(&[g.clone(), start.clone()]).unwrap();
        assert!(mid.coupling.active);
        assert_eq!(mid.coupling.partner.as_deref(), Some("alice"));
        assert_eq!(mid.session.total_count, 1);
        assert!((mid.energy.current - 0.95).abs() < 1e-12);

        let end = build_event(
            3,
            EventKind::SessionEnd,
            serde_json::to_value(SessionEndData {
                session_id: "s-1".into(),
            })
            .unwrap(),
            Some(&start),
        );
        let done = replay(&[g, start, end]).unwrap();
        assert!(!done.coupling.active);
        assert_eq!(done.session.current_id, None);
        assert_eq!(done.session.total_count, 1);
    }

    #[test]
    fn replay_is_idempotent() {
        let g = genesis_event();
        let e2 = build_event(
            2,
            EventKind::StateUpdate,
            json!({"energy": 0.8, "lyapunov": 0.1}),
            Some(&g),
        );
        let events = vec![g, e2];
        assert_eq!(replay(&events).unwrap(), replay(&events).unwrap());
    }

    #[test]
    fn state_update_rotates_lyapunov() {
        let g = genesis_event();
        let e2 = build_event(2, EventKind::StateUpdate, json!({"lyapunov": 0.2}), Some(&g));
        let e3 = build_event(3, EventKind::StateUpdate, json!({"lyapunov": 0.1}), Some(&e2));
        let state = replay(&[g, e2, e3]).unwrap();
        assert_eq!(state.lyapunov.v, 0.1);
        assert_eq!(state.lyapunov.v_previous, 0.2);
    }

    #[test]
    fn operation_debits_energy_and_applies_changes() {
        let g = genesis_event();
        let op = build_event(
            2,
            EventKind::Operation,
            json!({
                "op_id": "memory.add",
                "params": {"memory": "hi"},
                "message": "recorded",
                "energy_cost": 0.02,
                "state_changes": {"add_important": "hi"}
            }),
            Some(&g),
        );
        let state = replay(&[g, op]).unwrap();
        assert_eq!(state.important.len(), 1);
        assert_eq!(state.important[0].content, "hi");
        assert!((state.energy.current - 0.98).abs() < 1e-12);
    }

    #[test]
    fn agent_response_adopts_cycle_without_double_counting() {
        let g = genesis_event();
        let wake = build_event(2, EventKind::AgentWake, json!({"cycle": 0}), Some(&g));
        let r1 = build_event(
            3,
            EventKind::AgentResponse,
            json!({
                "cycle": 7,
                "priority": "stability",
                "action": "state.summary",
                "blocked": false,
                "feeling_cost": 0.001
            }),
            Some(&wake),
        );
        // A replayed duplicate cycle index must not advance the counter.
        let r2 = build_event(
            4,
            EventKind::AgentResponse,
            json!({
                "cycle": 7,
                "priority": "stability",
                "action": null,
                "blocked": false,
                "feeling_cost": 0.001
            }),
            Some(&r1),
        );
        let state = replay(&[g, wake, r1, r2]).unwrap();
        assert_eq!(state.agent.cycle_count, 7);
        assert_eq!(state.agent.responses.stability, 2);
        assert_eq!(state.agent.actions_taken, 1);
        assert!(state.agent.awake);
    }

    #[test]
    fn unknown_kind_is_bookkeeping_only() {
        let g = genesis_event();
        let future = build_event(
            2,
            EventKind::Other("FUTURE_KIND".into()),
            json!({"anything": true}),
            Some(&g),
        );
        let state = replay(&[g.clone(), future.clone()]).unwrap();
        let baseline = replay(&[g]).unwrap();
        assert_eq!(state.energy, baseline.energy);
        assert_eq!(state.memory.event_count, 2);
        assert_eq!(state.memory.last_event_hash.as_deref(), Some(future.hash.as_str()));
    }
}
