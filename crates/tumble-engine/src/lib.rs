//! Tumble Engine -- event-sourced rollback simulation for tumble rule engines.
//!
//! The [`engine::Engine`] owns the canonical event log, a bounded cache of
//! past states and the "last valid tick" pointer. Late events lower the
//! pointer; the next query replays forward from the newest valid cached
//! state, so every peer that holds the same events holds the same state no
//! matter in which order the events arrived.
//!
//! Around the engine:
//!
//! - [`registry::AnyStepper`] -- the six rule variants behind one type,
//!   selected by name.
//! - [`bundle`] -- portable export/import bundles and replay verification.
//! - [`room`] -- a tokio task that owns one engine and serializes access.
//!
//! # Quick Start
//!
//! ```
//! use tumble_core::prelude::*;
//! use tumble_engine::prelude::*;
//!
//! let options = GameOptions {
//!     stepper_name: "panel-league".to_owned(),
//!     seed: Some([1, 2, 3, 4, 0]),
//!     ..Default::default()
//! };
//! let mut engine = Engine::initialize(options, EngineConfig::default()).unwrap();
//!
//! engine.add_event(Event::new(3, EventKind::AddRow)).unwrap();
//! for _ in 0..5 {
//!     engine.step().unwrap();
//! }
//! assert_eq!(engine.time(), 5);
//!
//! // A late event rolls the simulation back and replays it.
//! engine.add_event(Event::new(2, EventKind::Swap { index: 60 })).unwrap();
//! assert_eq!(engine.last_valid(), 1);
//! engine.current_state().unwrap();
//! assert_eq!(engine.last_valid(), 5);
//! ```

#![deny(unsafe_code)]

pub mod bundle;
pub mod engine;
pub mod registry;
pub mod room;

use tumble_core::CoreError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by the simulation engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration or request error from the rule engine.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The event targets a tick that can no longer be re-derived.
    #[error("event at tick {time} is at or before genesis tick {genesis}")]
    StaleEvent {
        /// Tick the event was addressed to.
        time: u64,
        /// Current genesis tick.
        genesis: u64,
    },

    /// A seek or checkpoint import asked for a tick before genesis.
    #[error("tick {time} is before genesis tick {genesis}")]
    BeforeGenesis { time: u64, genesis: u64 },

    /// The cache had no state where the valid-tick pointer promised one.
    ///
    /// This is a bookkeeping bug, never a normal runtime condition.
    #[error("cache miss at tick {tick}: the valid-tick pointer names a state that is not cached")]
    CacheMiss { tick: u64 },

    /// An imported snapshot does not match its recorded hash.
    #[error("snapshot at tick {time} failed verification: recorded {expected}, computed {actual}")]
    SnapshotHashMismatch {
        time: u64,
        expected: String,
        actual: String,
    },

    /// A replay log is internally inconsistent.
    #[error("malformed replay log: {0}")]
    MalformedReplay(String),

    /// JSON encoding or decoding failed.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The room task has stopped.
    #[error("room is closed")]
    RoomClosed,
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Configuration for the rollback cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of consecutive ticks kept in the state cache. Values below 1
    /// are treated as 1.
    pub cache_size: usize,
    /// Most recent first-time effects kept for [`engine::Engine::drain_effects`].
    pub effect_buffer: usize,
}

impl Default for EngineConfig {
    /// 256 cached ticks, 1024 buffered effects.
    fn default() -> Self {
        Self {
            cache_size: 256,
            effect_buffer: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use crate::bundle::{
        verify_replay, CacheBundle, EngineBundle, ReplayDivergence, ReplayEntry, ReplayLog,
        ReplayRecorder, ReplayResult, StateBundle,
    };
    pub use crate::engine::{Engine, ListenerId};
    pub use crate::registry::{AnyState, AnyStepper, STEPPER_NAMES};
    pub use crate::room::{spawn_room, RoomCommand, RoomHandle, StepReport};
    pub use crate::{EngineConfig, EngineError};
}
