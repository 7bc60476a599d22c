//! Portable engine bundles and deterministic replay verification.
//!
//! Three bundle shapes move simulations between processes:
//!
//! - [`StateBundle`] -- genesis snapshot plus the event log. Enough to
//!   rebuild any tick, at the cost of replaying from genesis.
//! - [`CacheBundle`] -- one hashed mid-stream snapshot. Seeds a cache so the
//!   receiver does not replay the ticks it covers.
//! - [`EngineBundle`] -- everything [`Engine::serialize`](crate::engine::Engine::serialize)
//!   writes: stepper name, options, dimensions, history and a checkpoint.
//!
//! A [`ReplayLog`] is the audit form of a state bundle: the events of every
//! tick together with state hashes recorded at a fixed interval.
//! [`verify_replay`] re-derives the run from genesis and reports the first
//! tick whose hash disagrees.
//!
//! # Example
//!
//! ```
//! use tumble_core::prelude::*;
//! use tumble_engine::prelude::*;
//!
//! let options = GameOptions {
//!     stepper_name: "puyo-endless".to_owned(),
//!     seed: Some([3, 1, 4, 1, 0]),
//!     ..Default::default()
//! };
//! let mut engine = Engine::initialize(options, EngineConfig::default()).unwrap();
//! engine.add_event(Event::new(2, EventKind::DropPiece)).unwrap();
//! for _ in 0..30 {
//!     engine.step().unwrap();
//! }
//!
//! let log = engine.record_replay(10).unwrap();
//! let result = verify_replay(engine.stepper(), &log).unwrap();
//! assert!(result.completed);
//! assert_eq!(result.ticks_replayed, 30);
//! ```

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tumble_core::event::Event;
use tumble_core::options::GameOptions;
use tumble_core::snapshot::Snapshot;
use tumble_core::stepper::Stepper;

use crate::engine::verified;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Bundles
// ---------------------------------------------------------------------------

/// Genesis snapshot plus the full event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    bound(serialize = "S: Serialize", deserialize = "S: DeserializeOwned")
)]
pub struct StateBundle<S> {
    pub genesis: Snapshot<S>,
    /// Events by tick, each tick's bucket in canonical order.
    pub events: Vec<Event>,
    /// The exporting engine's "now".
    pub time: u64,
}

/// A single hashed checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "S: Serialize", deserialize = "S: DeserializeOwned"))]
pub struct CacheBundle<S> {
    pub snapshot: Snapshot<S>,
}

/// Serialized engine: enough to resume without replaying from genesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    bound(serialize = "S: Serialize", deserialize = "S: DeserializeOwned")
)]
pub struct EngineBundle<S> {
    /// Registry name of the stepper.
    pub stepper: String,
    pub options: GameOptions,
    pub width: usize,
    pub height: usize,
    pub cache_size: usize,
    pub genesis: Snapshot<S>,
    pub events: Vec<Event>,
    pub time: u64,
    /// Newest valid cached state, absent when nothing past genesis was
    /// derived yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Snapshot<S>>,
}

// ---------------------------------------------------------------------------
// ReplayLog
// ---------------------------------------------------------------------------

/// A single entry in a replay log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ReplayEntry {
    /// The events consumed by `tick`. Ticks without events have no entry.
    Events { tick: u64, events: Vec<Event> },
    /// The state hash after `tick` was stepped.
    Checkpoint { tick: u64, state_hash: String },
}

/// A recorded run: genesis, per-tick events and periodic state hashes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    bound(serialize = "S: Serialize", deserialize = "S: DeserializeOwned")
)]
pub struct ReplayLog<S> {
    /// Registry name of the stepper that produced the run.
    pub stepper: String,
    pub genesis: Snapshot<S>,
    /// Number of ticks recorded after genesis.
    pub total_ticks: u64,
    pub entries: Vec<ReplayEntry>,
}

/// The outcome of [`verify_replay`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayResult {
    /// Whether every tick was replayed without divergence.
    pub completed: bool,
    /// Ticks stepped before completion or divergence.
    pub ticks_replayed: u64,
    pub first_divergence: Option<ReplayDivergence>,
}

/// The first checkpoint whose hash disagreed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayDivergence {
    pub tick: u64,
    pub expected_hash: String,
    pub actual_hash: String,
}

// ---------------------------------------------------------------------------
// ReplayRecorder
// ---------------------------------------------------------------------------

/// Builds a [`ReplayLog`] tick by tick.
#[derive(Debug)]
pub struct ReplayRecorder<S> {
    log: ReplayLog<S>,
    checkpoint_interval: u64,
    last_tick: u64,
}

impl<S> ReplayRecorder<S> {
    /// Start recording after `genesis`.
    ///
    /// An interval of 0 records a checkpoint whenever a hash is supplied.
    pub fn new(stepper: &str, genesis: Snapshot<S>, checkpoint_interval: u64) -> Self {
        let last_tick = genesis.time;
        Self {
            log: ReplayLog {
                stepper: stepper.to_owned(),
                genesis,
                total_ticks: 0,
                entries: Vec::new(),
            },
            checkpoint_interval,
            last_tick,
        }
    }

    /// Whether a hash supplied for `tick` would be recorded.
    pub fn wants_checkpoint(&self, tick: u64) -> bool {
        self.checkpoint_interval == 0 || tick % self.checkpoint_interval == 0
    }

    /// Record the events consumed by `tick` and, on checkpoint ticks, the
    /// hash of the state it produced.
    ///
    /// # Panics
    ///
    /// Panics unless `tick` directly follows the previously recorded tick
    /// (or genesis). Gaps would make the log replay a different run.
    pub fn record_tick(&mut self, tick: u64, events: &[Event], state_hash: Option<String>) {
        assert_eq!(
            tick,
            self.last_tick + 1,
            "ReplayRecorder::record_tick: expected tick {}, got {tick}",
            self.last_tick + 1
        );
        self.last_tick = tick;
        self.log.total_ticks += 1;

        if !events.is_empty() {
            self.log.entries.push(ReplayEntry::Events {
                tick,
                events: events.to_vec(),
            });
        }
        if let Some(state_hash) = state_hash {
            if self.wants_checkpoint(tick) {
                self.log
                    .entries
                    .push(ReplayEntry::Checkpoint { tick, state_hash });
            }
        }
    }

    pub fn finish(self) -> ReplayLog<S> {
        self.log
    }
}

// ---------------------------------------------------------------------------
// verify_replay()
// ---------------------------------------------------------------------------

/// Replay `log` from its genesis with `stepper`, comparing each recorded
/// checkpoint against the hash of the re-derived state.
///
/// Replay stops at the first divergence.
///
/// # Errors
///
/// Fails before stepping anything if the log names another stepper, holds
/// duplicate entries, entries outside its tick range, or a genesis that does
/// not match its hash.
pub fn verify_replay<S: Stepper>(
    stepper: &S,
    log: &ReplayLog<S::State>,
) -> Result<ReplayResult, EngineError> {
    if log.stepper != stepper.name() {
        return Err(EngineError::MalformedReplay(format!(
            "log was recorded with '{}' but is being verified with '{}'",
            log.stepper,
            stepper.name()
        )));
    }
    let start = log.genesis.time;
    let end = start.checked_add(log.total_ticks).ok_or_else(|| {
        EngineError::MalformedReplay(format!(
            "tick range overflow: genesis {start} + {} ticks",
            log.total_ticks
        ))
    })?;

    let mut events: BTreeMap<u64, &[Event]> = BTreeMap::new();
    let mut checkpoints: BTreeMap<u64, &str> = BTreeMap::new();
    for entry in &log.entries {
        let (tick, duplicate) = match entry {
            ReplayEntry::Events { tick, events: list } => {
                (*tick, events.insert(*tick, list.as_slice()).is_some())
            }
            ReplayEntry::Checkpoint { tick, state_hash } => {
                (*tick, checkpoints.insert(*tick, state_hash.as_str()).is_some())
            }
        };
        if duplicate {
            return Err(EngineError::MalformedReplay(format!(
                "duplicate entry at tick {tick}"
            )));
        }
        if tick <= start || tick > end {
            return Err(EngineError::MalformedReplay(format!(
                "entry at tick {tick} lies outside ({start}, {end}]"
            )));
        }
    }

    let genesis = verified(log.genesis.clone())?;
    let mut state = genesis.state;
    stepper.restore(&mut state);

    let mut ticks_replayed = 0;
    for tick in start + 1..=end {
        stepper.step(&mut state, events.get(&tick).copied().unwrap_or(&[]));
        ticks_replayed += 1;
        if let Some(&expected) = checkpoints.get(&tick) {
            let actual = Snapshot::capture(tick, state.clone()).hash;
            if actual != expected {
                tracing::warn!(tick, expected, actual = %actual, "replay diverged");
                return Ok(ReplayResult {
                    completed: false,
                    ticks_replayed,
                    first_divergence: Some(ReplayDivergence {
                        tick,
                        expected_hash: expected.to_owned(),
                        actual_hash: actual,
                    }),
                });
            }
        }
    }

    Ok(ReplayResult {
        completed: true,
        ticks_replayed,
        first_divergence: None,
    })
}
