//! Tumble Puyo -- group-clear rules (falling pairs, connect four, nuisance).
//!
//! A board is a [`grid::Grid`] with invisible ghost rows on top. Puyos fall
//! to rest every tick; connected groups of `clearThreshold` or more vanish
//! and take adjacent nuisance with them. Chains are scored with the tables
//! in [`scoring`] and converted into nuisance for the opponents by the
//! [`nuisance::NuisanceLedger`].
//!
//! Steppers:
//!
//! - [`stepper::PuyoStepper::basic`] (`puyo`) -- puyos placed with `addPuyos`.
//! - [`stepper::PuyoStepper::endless`] (`puyo-endless`) -- dealt pieces.
//! - [`duel::PuyoDuelStepper`] (`puyo-duel`) -- endless boards sharing deals.
//!
//! # Quick Start
//!
//! ```
//! use tumble_core::prelude::*;
//! use tumble_puyo::prelude::*;
//!
//! let stepper = PuyoStepper::endless(GameOptions {
//!     seed: Some([1, 2, 3, 4, 0]),
//!     ..Default::default()
//! })
//! .unwrap();
//! let mut state = stepper.initialize_state().unwrap();
//! assert!(state.piece.is_some());
//!
//! stepper.step(&mut state, &[Event::new(1, EventKind::DropPiece)]);
//! assert_eq!(state.deals_drawn, stepper.options().num_deals + 1);
//! ```

#![deny(unsafe_code)]

pub mod duel;
pub mod grid;
pub mod nuisance;
pub mod piece;
pub mod scoring;
pub mod state;
pub mod stepper;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::duel::{PuyoDuelState, PuyoDuelStepper};
    pub use crate::grid::{Cell, Grid, Group};
    pub use crate::nuisance::NuisanceLedger;
    pub use crate::piece::{Deal, Orientation, Piece};
    pub use crate::scoring::clear_score;
    pub use crate::state::{DealSource, PuyoRules, PuyoState, SharedDeals};
    pub use crate::stepper::{check_play, step_board, PuyoStepper, Variant};
}
