//! Tumble Core -- shared building blocks for deterministic falling-block rules.
//!
//! This crate holds everything the rule engines ("steppers") and the
//! simulation engine agree on: the portable [`rng::Rng`], the input
//! [`event::Event`] and output [`effect::Effect`] vocabularies, the
//! [`options::GameOptions`] recognised at construction time, the
//! [`stepper::Stepper`] trait itself, and hashed [`snapshot::Snapshot`]s.
//!
//! # Quick Start
//!
//! ```
//! use tumble_core::prelude::*;
//!
//! let mut rng = Rng::from_state([1, 2, 3, 4, 0]);
//! let mut copy = Rng::from_words(&rng.to_words()).unwrap();
//! assert_eq!(rng.step(), copy.step());
//! ```

#![deny(unsafe_code)]

pub mod effect;
pub mod event;
pub mod options;
pub mod rng;
pub mod snapshot;
pub mod stepper;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while configuring or driving a rule engine.
///
/// Illegal player actions are never errors: steppers ignore them. These
/// variants cover malformed configuration and malformed requests only.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The initial colors do not cover the grid exactly.
    #[error(
        "initial colors have {actual} entries but the grid needs {expected} ({width}x{height})"
    )]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        width: usize,
        height: usize,
    },

    /// An option is out of its legal range.
    #[error("invalid option '{name}': {details}")]
    InvalidOption { name: &'static str, details: String },

    /// A garbage slab does not fit the playfield.
    #[error(
        "malformed garbage slab x={x} width={width} height={height} \
         on a {grid_width}x{grid_height} grid"
    )]
    MalformedGarbage {
        x: i64,
        width: i64,
        height: i64,
        grid_width: usize,
        grid_height: usize,
    },

    /// No stepper is registered under the requested name.
    #[error("unknown stepper '{name}'. Known steppers: [{known}]")]
    UnknownStepper { name: String, known: String },

    /// `call` was asked for an operation the stepper does not provide.
    #[error("stepper '{stepper}' has no operation '{operation}'")]
    UnknownOperation { stepper: String, operation: String },

    /// Arguments to `call` could not be interpreted.
    #[error("invalid argument for '{operation}': {details}")]
    InvalidArgument { operation: String, details: String },

    /// A serialized RNG or options payload could not be parsed.
    #[error("failed to deserialize {what}: {details}")]
    Serialization { what: &'static str, details: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::effect::{Effect, EffectKind, SlabShape};
    pub use crate::event::{Event, EventKind, PlacedPuyo};
    pub use crate::options::GameOptions;
    pub use crate::rng::Rng;
    pub use crate::snapshot::{canonical_json, content_hash, Snapshot};
    pub use crate::stepper::{sort_events, Stepper};
    pub use crate::CoreError;
}
