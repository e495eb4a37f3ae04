//! The sense-making agent.
//!
//! Each cycle: FEEL (pure verification, feeling classification), COUPLING
//! DEFERENCE, RESPOND (constitutional priority hierarchy, active inference,
//! cycle-memory hints, constitutional admission), REMEMBER (one atomic event
//! per cycle at most), ADAPT (ultrastability), and the self-production gate.
//! The agent's statistics, cycle memory, and inference model are
//! process-local; everything durable flows through the StateManager.

use crate::context::{self, CycleContext};
use crate::feeling::{self, EnergyFeeling, Feeling, IntegrityFeeling, StabilityFeeling};
use crate::inference::{ActiveInference, ACTION_SET};
use crate::memory::{self, CycleMemory, CycleRecord, FeelingSnapshot};
use crate::ultrastability::{Ultrastability, ViolationFamily, ViolationRecord};
use entity_ops::{lifecycle, meta, Executor};
use entity_state::manager::StateManager;
use entity_state::verifier;
use entity_types::config::AgentConfig;
use entity_types::error::AgentError;
use entity_types::event::{
    AgentPhaseData, AgentResponseData, AgentRestData, AgentUltrastabilityData, EventKind,
};
use entity_types::ops::LifecycleStatus;
use entity_types::state::{AdaptiveParameters, Priority, State};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Rest cycles accumulated before one AGENT_REST event is written.
const REST_LOG_EVERY: u64 = 10;

/// What one cycle did, for callers and logs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CycleOutcome {
    /// The agent's monotonic cycle index.
    pub cycle: u64,
    /// Effective context (`test`, `audit`, `production`).
    pub context: String,
    /// The feeling computed in FEEL.
    pub feeling: Feeling,
    /// Chosen priority.
    pub priority: Priority,
    /// Chosen action; `None` is deliberate rest or conservation.
    pub action: Option<String>,
    /// Whether the admission check blocked the action.
    pub blocked: bool,
    /// Refusal reason when blocked.
    pub block_reason: Option<String>,
    /// The cycle deferred to an active partner.
    pub deferred: bool,
    /// Identifier of an operation produced this cycle, if any.
    pub produced: Option<String>,
    /// Family of a parameter adaptation taken this cycle, if any.
    pub adapted: Option<String>,
}

/// Process-local runtime of the agent.
struct Runtime {
    cycle: u64,
    params: AdaptiveParameters,
    memory: CycleMemory,
    inference: ActiveInference,
    ultra: Ultrastability,
    usage: BTreeMap<String, u64>,
    rest_since_event: u64,
    last_production_cycle: Option<u64>,
}

/// The sense-making agent.
pub struct Agent {
    manager: Arc<StateManager>,
    executor: Executor,
    trial_executor: Executor,
    config: AgentConfig,
    runtime: Mutex<Runtime>,
}

impl Agent {
    /// Creates an agent over a state manager.
    pub fn new(manager: Arc<StateManager>, config: AgentConfig) -> Self {
        let runtime = Runtime {
            cycle: 0,
            params: AdaptiveParameters::default(),
            memory: CycleMemory::new(config.cycle_memory_capacity),
            inference: ActiveInference::new(),
            ultra: Ultrastability::new(),
            usage: BTreeMap::new(),
            rest_since_event: 0,
            last_production_cycle: None,
        };
        Self {
            executor: Executor::new(Arc::clone(&manager)),
            trial_executor: Executor::new(Arc::clone(&manager)).with_unproven(),
            manager,
            config,
            runtime: Mutex::new(runtime),
        }
    }

    /// The manager behind this agent.
    pub fn manager(&self) -> &Arc<StateManager> {
        &self.manager
    }

    /// The current adaptive parameters.
    pub fn parameters(&self) -> AdaptiveParameters {
        self.runtime.lock().params.clone()
    }

    /// Current usage counters, sorted by action id.
    pub fn usage_counts(&self) -> BTreeMap<String, u64> {
        self.runtime.lock().usage.clone()
    }

    /// Seeds a usage counter. Operator tooling and scenario tests use this
    /// to shape the self-production gate.
    pub fn seed_usage(&self, action: &str, count: u64) {
        self.runtime.lock().usage.insert(action.to_string(), count);
    }

    /// Wakes the agent. Rejected when already awake.
    pub fn wake(&self) -> Result<State, AgentError> {
        let state = self.manager.read_state().map_err(AgentError::State)?;
        if state.agent.awake {
            return Err(AgentError::AlreadyAwake);
        }
        let cycle = self.runtime.lock().cycle.max(state.agent.cycle_count);
        let data = AgentPhaseData { cycle };
        let (state, _) = self
            .manager
            .append_event(EventKind::AgentWake, to_value(&data)?)
            .map_err(AgentError::State)?;
        tracing::info!(target: "agent", cycle, "agent awake");
        Ok(state)
    }

    /// Puts the agent to sleep. Rejected when already asleep.
    pub fn sleep(&self) -> Result<State, AgentError> {
        let state = self.manager.read_state().map_err(AgentError::State)?;
        if !state.agent.awake {
            return Err(AgentError::AlreadyAsleep);
        }
        let cycle = self.runtime.lock().cycle.max(state.agent.cycle_count);
        let data = AgentPhaseData { cycle };
        let (state, _) = self
            .manager
            .append_event(EventKind::AgentSleep, to_value(&data)?)
            .map_err(AgentError::State)?;
        tracing::info!(target: "agent", cycle, "agent asleep");
        Ok(state)
    }

    /// Runs one full cycle, regardless of the wake state. The periodic loop
    /// checks wakefulness; a forced cycle is an operator decision.
    pub fn force_cycle(&self) -> Result<CycleOutcome, AgentError> {
        self.cycle_inner()
    }

    /// Runs the periodic loop until the task is cancelled. Overlapping
    /// cycles are skipped, and the ticker follows the adaptive decision
    /// interval.
    pub async fn run(self: Arc<Self>) {
        let mut interval_ms = self.parameters().decision_interval_ms;
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let awake = match self.manager.read_state() {
                Ok(state) => state.agent.awake,
                Err(e) => {
                    tracing::warn!(target: "agent", error = %e, "state unavailable; skipping tick");
                    continue;
                }
            };
            if awake {
                // A failed cycle must not kill the runtime.
                if let Err(e) = self.force_cycle() {
                    tracing::error!(target: "agent", error = %e, "cycle failed");
                }
            }

            let next = self.parameters().decision_interval_ms;
            if next != interval_ms {
                interval_ms = next;
                ticker = tokio::time::interval(Duration::from_millis(interval_ms));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                tracing::info!(target: "agent", interval_ms, "decision interval rescheduled");
            }
        }
    }

    fn cycle_inner(&self) -> Result<CycleOutcome, AgentError> {
        let state = self.manager.read_state().map_err(AgentError::State)?;
        let cycle = {
            let mut runtime = self.runtime.lock();
            runtime.cycle = runtime.cycle.max(state.agent.cycle_count) + 1;
            runtime.cycle
        };
        let ctx = context::derive(&state, self.config.context_override.as_deref());

        // FEEL: pure verification only; the feeling path must never append.
        let report = verifier::pure_verify(&self.manager).map_err(AgentError::State)?;
        let params = self.parameters();
        let feeling = feeling::compute(&state, &report, &params);
        let before = FeelingSnapshot::from(&feeling);

        // COUPLING DEFERENCE: the partner leads.
        if state.coupling.active && !self.config.active_when_coupled {
            self.remember_rest(cycle)?;
            tracing::debug!(target: "agent", cycle, "deferred to active partner");
            return Ok(CycleOutcome {
                cycle,
                context: context_name(ctx),
                feeling,
                priority: Priority::Rest,
                action: None,
                blocked: false,
                block_reason: None,
                deferred: true,
                produced: None,
                adapted: None,
            });
        }

        // RESPOND: the constitutional hierarchy, in strict order.
        let (priority, action) = self.respond(&state, &feeling, &before);

        // Constitutional admission check.
        let mut blocked = false;
        let mut block_reason = None;
        if let Some(id) = action.clone() {
            if let Err(reason) = self.admit(&state, &id) {
                blocked = true;
                block_reason = Some(reason);
            }
        }

        // Execute the admitted action.
        let mut executed_cost = 0.0;
        if let (Some(id), false) = (&action, blocked) {
            match self.executor.exec(id, &Value::Null) {
                Ok((_, _)) => {
                    if let Some(def) = self.executor.catalog().get(id) {
                        executed_cost = def.spec.energy_cost;
                    }
                }
                Err(e) => {
                    blocked = true;
                    block_reason = Some(e.to_string());
                }
            }
        }

        // REMEMBER: AGENT_RESPONSE when an action was chosen (even blocked);
        // rest cycles batch into one AGENT_REST per ten.
        if action.is_some() {
            let data = AgentResponseData {
                cycle,
                priority,
                action: action.clone(),
                blocked,
                reason: block_reason.clone(),
                feeling_cost: self.config.feeling_cost,
            };
            self.manager
                .append_event(EventKind::AgentResponse, to_value(&data)?)
                .map_err(AgentError::State)?;
        } else {
            self.remember_rest(cycle)?;
        }

        // Observe the settled state for learning.
        let after_state = self.manager.read_state().map_err(AgentError::State)?;
        let after_report = verifier::pure_verify(&self.manager).map_err(AgentError::State)?;
        let after_feeling = feeling::compute(&after_state, &after_report, &params);
        let after = FeelingSnapshot::from(&after_feeling);
        let effectiveness = memory::effectiveness(priority, &before, &after);

        let mut produced = None;
        let mut adapted = None;

        if ctx.allows_side_effects() {
            let mut runtime = self.runtime.lock();
            runtime.inference.observe(
                action.as_deref(),
                after.energy - before.energy,
                after.v - before.v,
            );
            runtime.memory.push(CycleRecord {
                cycle,
                before,
                after: Some(after),
                priority,
                action: action.clone(),
                blocked,
                effectiveness,
                surprise_reduction: before.surprise - after.surprise,
                energy_cost: self.config.feeling_cost + executed_cost,
            });
            if let Some(id) = &action {
                if !blocked {
                    *runtime.usage.entry(id.clone()).or_insert(0) += 1;
                }
            }

            // ADAPT: classify this cycle's violations, adapt on schedule.
            if let Some(family) = classify_violation(&feeling, &report) {
                let cfg = self.config.adaptation.clone();
                runtime.ultra.record(ViolationRecord { cycle, family }, &cfg);
            }
            let interval = self.config.adaptation.interval.max(1);
            if cycle % interval == 0 {
                let cfg = self.config.adaptation.clone();
                let current = runtime.params.clone();
                if let Some(adaptation) = runtime.ultra.adapt(cycle, &current, &cfg) {
                    runtime.params = adaptation.parameters.clone();
                    adapted = Some(adaptation.family.clone());
                    let data = AgentUltrastabilityData {
                        cycle,
                        family: adaptation.family,
                        parameters: adaptation.parameters,
                    };
                    drop(runtime);
                    self.manager
                        .append_event(EventKind::AgentUltrastability, to_value(&data)?)
                        .map_err(AgentError::State)?;
                    runtime = self.runtime.lock();
                }
            }
            drop(runtime);

            // SELF-PRODUCTION and quarantine lifecycle only run for growth
            // in production context.
            if priority == Priority::Growth {
                produced = self.maybe_self_produce(cycle)?;
                self.exercise_one_trial(cycle)?;
            }
            self.advance_lifecycles(cycle)?;
        }

        Ok(CycleOutcome {
            cycle,
            context: context_name(ctx),
            feeling,
            priority,
            action,
            blocked,
            block_reason,
            deferred: false,
            produced,
            adapted,
        })
    }

    /// Priorities 1–5, in strict order; 3–5 select through active inference
    /// with cycle-memory hints.
    fn respond(
        &self,
        state: &State,
        feeling: &Feeling,
        before: &FeelingSnapshot,
    ) -> (Priority, Option<String>) {
        if feeling.threatens_existence {
            // Critically low energy conserves; low energy diagnoses.
            let action = if feeling.energy == EnergyFeeling::Critical {
                None
            } else {
                Some("energy.status".to_string())
            };
            return (Priority::Survival, action);
        }
        if feeling.integrity == IntegrityFeeling::Violated {
            // Repair belongs to the recovery engine, not the policy.
            return (Priority::Integrity, None);
        }
        if matches!(
            feeling.stability,
            StabilityFeeling::Unstable | StabilityFeeling::Drifting
        ) {
            return (Priority::Stability, self.select(state, before, Priority::Stability));
        }
        if feeling.needs_growth {
            return (Priority::Growth, self.select(state, before, Priority::Growth));
        }
        (Priority::Rest, None)
    }

    fn select(
        &self,
        state: &State,
        before: &FeelingSnapshot,
        priority: Priority,
    ) -> Option<String> {
        let runtime = self.runtime.lock();
        if !self.config.active_inference {
            // Without active inference the first non-none candidate stands.
            return ACTION_SET
                .iter()
                .flatten()
                .next()
                .map(|s| s.to_string());
        }
        let hint = runtime.memory.hint(before, priority);
        runtime.inference.select(
            state,
            &ACTION_SET,
            hint.as_ref(),
            self.config.epistemic_weight,
        )
    }

    /// The constitutional admission check: operation known, energy margin
    /// preserved, coupling honoured.
    fn admit(&self, state: &State, id: &str) -> Result<(), String> {
        let spec = if let Some(def) = self.executor.catalog().get(id) {
            def.spec.clone()
        } else if let Some(g) = state
            .autopoiesis
            .generated
            .iter()
            .find(|g| g.spec.id == id && g.status == LifecycleStatus::Active)
        {
            g.spec.clone()
        } else {
            return Err(format!("operation {id} not available"));
        };
        let after = state.energy.current - (spec.energy_cost + self.config.feeling_cost);
        if after < state.energy.min {
            return Err(format!(
                "energy margin violated: {:.4} after {id} is below min {:.4}",
                after, state.energy.min
            ));
        }
        if spec.requires_coupling && !state.coupling.active {
            return Err(format!("operation {id} requires an active coupling session"));
        }
        Ok(())
    }

    fn remember_rest(&self, cycle: u64) -> Result<(), AgentError> {
        let due = {
            let mut runtime = self.runtime.lock();
            runtime.rest_since_event += 1;
            if runtime.rest_since_event >= REST_LOG_EVERY {
                let batch = runtime.rest_since_event;
                runtime.rest_since_event = 0;
                Some(batch)
            } else {
                None
            }
        };
        if let Some(rest_cycles) = due {
            let data = AgentRestData { cycle, rest_cycles };
            self.manager
                .append_event(EventKind::AgentRest, to_value(&data)?)
                .map_err(AgentError::State)?;
        }
        Ok(())
    }

    /// The self-production gate: specialize the most-used base action once
    /// usage crosses the threshold, honouring cooldown and caps.
    fn maybe_self_produce(&self, cycle: u64) -> Result<Option<String>, AgentError> {
        let cfg = &self.config.self_production;

        let candidate = {
            let runtime = self.runtime.lock();
            if let Some(last) = runtime.last_production_cycle {
                if cycle.saturating_sub(last) < cfg.cooldown {
                    return Ok(None);
                }
            }
            // Most-used action over the threshold. The source must come
            // from the base catalog: specializing a self-produced child
            // would compound drift, so products are never sources. A hot
            // source may be specialized again; the hard cap bounds the
            // total.
            let catalog = self.executor.catalog();
            runtime
                .usage
                .iter()
                .filter(|(id, count)| **count >= cfg.threshold && catalog.contains(id))
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                .map(|(id, _)| id.clone())
        };
        let Some(source) = candidate else {
            return Ok(None);
        };

        let child_id = format!("{source}.auto{cycle}");
        match meta::specialize(
            &self.manager,
            self.executor.catalog(),
            &source,
            &child_id,
            serde_json::json!({}),
            None,
            cycle,
            true,
        ) {
            Ok((op, _)) => {
                self.runtime.lock().last_production_cycle = Some(cycle);
                tracing::info!(target: "agent", op = %op.spec.id, source = %source, "self-produced operation");
                Ok(Some(op.spec.id))
            }
            Err(e) => {
                // The cap and bounds are working as intended; nothing to do.
                tracing::debug!(target: "agent", source = %source, error = %e, "self-production declined");
                Ok(None)
            }
        }
    }

    /// Exercises one operation on trial so its metrics can accumulate.
    fn exercise_one_trial(&self, _cycle: u64) -> Result<(), AgentError> {
        let state = self.manager.read_state().map_err(AgentError::State)?;
        let Some(op) = state
            .autopoiesis
            .generated
            .iter()
            .find(|g| g.status == LifecycleStatus::Trial)
            .cloned()
        else {
            return Ok(());
        };

        let v_before = verifier::pure_verify(&self.manager)
            .map_err(AgentError::State)?
            .v;
        let surprise_before = {
            let report = verifier::pure_verify(&self.manager).map_err(AgentError::State)?;
            feeling::compute(&state, &report, &self.parameters()).surprise
        };

        let updated = match self.trial_executor.exec(&op.spec.id, &Value::Null) {
            Ok(_) => {
                let after_state = self.manager.read_state().map_err(AgentError::State)?;
                let report = verifier::pure_verify(&self.manager).map_err(AgentError::State)?;
                let surprise_after =
                    feeling::compute(&after_state, &report, &self.parameters()).surprise;
                lifecycle::record_use(
                    &after_state.autopoiesis,
                    &op.spec.id,
                    report.v - v_before,
                    surprise_after - surprise_before,
                )
            }
            Err(_) => {
                let state = self.manager.read_state().map_err(AgentError::State)?;
                lifecycle::record_block(&state.autopoiesis, &op.spec.id)
            }
        };
        if let Some(autopoiesis) = updated {
            lifecycle::commit(&self.manager, "trial_observation", &op.spec.id, autopoiesis)
                .map_err(AgentError::Operation)?;
        }
        Ok(())
    }

    /// Advances quarantine lifecycles once per cycle.
    fn advance_lifecycles(&self, cycle: u64) -> Result<(), AgentError> {
        let state = self.manager.read_state().map_err(AgentError::State)?;
        if state.autopoiesis.generated.is_empty() {
            return Ok(());
        }
        let (updated, transitions) =
            lifecycle::advance(&state.autopoiesis, cycle, &self.config.self_production);
        if transitions.is_empty() {
            return Ok(());
        }
        let ids: Vec<&str> = transitions.iter().map(|t| t.id.as_str()).collect();
        lifecycle::commit(&self.manager, "lifecycle", &ids.join(","), updated)
            .map_err(AgentError::Operation)?;
        for t in &transitions {
            tracing::info!(target: "agent", op = %t.id, from = ?t.from, to = ?t.to, %t.reason, "lifecycle transition");
        }
        Ok(())
    }
}

fn context_name(ctx: CycleContext) -> String {
    match ctx {
        CycleContext::Test => "test",
        CycleContext::Audit => "audit",
        CycleContext::Production => "production",
    }
    .to_string()
}

fn classify_violation(
    feeling: &Feeling,
    report: &verifier::VerificationReport,
) -> Option<ViolationFamily> {
    if feeling.energy == EnergyFeeling::Critical || report.is_violated(verifier::INV_ENERGY) {
        return Some(ViolationFamily::Energy);
    }
    if !report.passed {
        return Some(ViolationFamily::Integrity);
    }
    if feeling.v > 0.1 {
        return Some(ViolationFamily::Stability);
    }
    None
}

fn to_value<T: Serialize>(data: &T) -> Result<Value, AgentError> {
    serde_json::to_value(data).map_err(|e| AgentError::CycleFailed {
        cycle: 0,
        detail: format!("payload not serializable: {e}"),
    })
}
