//! Cycle memory: a bounded rolling window of past cycles used to hint
//! action selection.
//!
//! Records are process-local; they are recomputable and deliberately not
//! part of the durable state.

use crate::feeling::Feeling;
use entity_types::state::Priority;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// The slice of a feeling used for similarity matching.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FeelingSnapshot {
    /// Energy level.
    pub energy: f64,
    /// Lyapunov value.
    pub v: f64,
    /// Fraction of satisfied invariants.
    pub integrity_fraction: f64,
    /// Weighted surprise.
    pub surprise: f64,
}

impl From<&Feeling> for FeelingSnapshot {
    fn from(f: &Feeling) -> Self {
        Self {
            energy: f.energy_level,
            v: f.v,
            integrity_fraction: f.integrity_fraction,
            surprise: f.surprise,
        }
    }
}

/// One remembered cycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CycleRecord {
    /// The agent's monotonic cycle index.
    pub cycle: u64,
    /// Feeling before responding.
    pub before: FeelingSnapshot,
    /// Feeling after the response settled, when observed.
    pub after: Option<FeelingSnapshot>,
    /// Priority chosen.
    pub priority: Priority,
    /// Action chosen; `None` is deliberate rest.
    pub action: Option<String>,
    /// Whether the admission check blocked the action.
    pub blocked: bool,
    /// Priority-weighted effectiveness in `[-1, 1]`.
    pub effectiveness: f64,
    /// Observed surprise reduction.
    pub surprise_reduction: f64,
    /// Energy the cycle cost.
    pub energy_cost: f64,
}

/// Distance under which two feelings count as similar.
const SIMILARITY_RADIUS: f64 = 0.15;
/// Matches needed before the memory hints the selector.
const MIN_MATCHES: usize = 3;
/// Mean effectiveness needed before a hint is trusted.
const MIN_CONFIDENCE: f64 = 0.5;

fn distance(a: &FeelingSnapshot, b: &FeelingSnapshot) -> f64 {
    let de = a.energy - b.energy;
    let dv = a.v - b.v;
    let di = a.integrity_fraction - b.integrity_fraction;
    (de * de + dv * dv + di * di).sqrt()
}

/// Per-priority weights of the effectiveness score. Each row is positive and
/// sums to 1: energy-dominant for survival, surprise-dominant for growth.
fn effectiveness_weights(priority: Priority) -> [f64; 4] {
    // [energy, v, integrity, surprise]
    match priority {
        Priority::Survival => [0.6, 0.2, 0.1, 0.1],
        Priority::Integrity => [0.1, 0.2, 0.6, 0.1],
        Priority::Stability => [0.1, 0.6, 0.1, 0.2],
        Priority::Growth => [0.1, 0.2, 0.1, 0.6],
        Priority::Rest => [0.25, 0.25, 0.25, 0.25],
    }
}

/// Scores how much a cycle improved things, clamped to `[-1, 1]`.
pub fn effectiveness(priority: Priority, before: &FeelingSnapshot, after: &FeelingSnapshot) -> f64 {
    let [we, wv, wi, ws] = effectiveness_weights(priority);
    let score = we * (after.energy - before.energy)
        + wv * (before.v - after.v)
        + wi * (after.integrity_fraction - before.integrity_fraction)
        + ws * (before.surprise - after.surprise);
    score.clamp(-1.0, 1.0)
}

/// A hint from cycle memory: actions ranked by remembered effectiveness.
#[derive(Clone, Debug)]
pub struct MemoryHint {
    /// Candidate actions, best remembered first. `None` entries mean rest.
    pub ranked: Vec<Option<String>>,
    /// Mean effectiveness of the matching records.
    pub confidence: f64,
}

/// The bounded rolling window of cycle records.
pub struct CycleMemory {
    records: VecDeque<CycleRecord>,
    capacity: usize,
}

impl CycleMemory {
    /// Creates a window holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records a cycle, evicting the oldest record at capacity.
    pub fn push(&mut self, record: CycleRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates the records, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &CycleRecord> {
        self.records.iter()
    }

    /// Queries for a hint: past cycles with a similar before-feeling and the
    /// same priority. A hint emerges only from enough confident matches;
    /// active inference still makes the final choice.
    pub fn hint(&self, before: &FeelingSnapshot, priority: Priority) -> Option<MemoryHint> {
        let matches: Vec<&CycleRecord> = self
            .records
            .iter()
            .filter(|r| r.priority == priority && distance(&r.before, before) <= SIMILARITY_RADIUS)
            .collect();
        if matches.len() < MIN_MATCHES {
            return None;
        }
        let confidence =
            matches.iter().map(|r| r.effectiveness).sum::<f64>() / matches.len() as f64;
        if confidence <= MIN_CONFIDENCE {
            return None;
        }

        // Rank distinct actions by their mean remembered effectiveness.
        let mut scores: Vec<(Option<String>, f64, usize)> = Vec::new();
        for record in &matches {
            match scores.iter_mut().find(|(a, _, _)| *a == record.action) {
                Some((_, sum, n)) => {
                    *sum += record.effectiveness;
                    *n += 1;
                }
                None => scores.push((record.action.clone(), record.effectiveness, 1)),
            }
        }
        let mut ranked: Vec<(Option<String>, f64)> = scores
            .into_iter()
            .map(|(a, sum, n)| (a, sum / n as f64))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        Some(MemoryHint {
            ranked: ranked.into_iter().map(|(a, _)| a).collect(),
            confidence,
        })
    }
}
