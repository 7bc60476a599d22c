//! Tumble Panel -- match-grid rules (swap blocks, match three, chain).
//!
//! A board is a `width x height` grid of [`block::Block`]s plus a list of
//! [`garbage::GarbageSlab`]s. [`stepper::step_board`] advances a board by one
//! tick through a fixed nine-stage pipeline; the three steppers exposed here
//! wrap it:
//!
//! - [`stepper::PanelStepper`] -- standard single board.
//! - [`scoring::ScoringStepper`] -- the same board with combo/chain scoring.
//! - [`duel::PanelDuelStepper`] -- N boards exchanging garbage.
//!
//! # Quick Start
//!
//! ```
//! use tumble_core::prelude::*;
//! use tumble_panel::prelude::*;
//!
//! let stepper = PanelStepper::new(GameOptions {
//!     seed: Some([1, 2, 3, 4, 0]),
//!     ..Default::default()
//! })
//! .unwrap();
//! let mut state = stepper.initialize_state().unwrap();
//! let effects = stepper.step(&mut state, &[Event::new(1, EventKind::AddRow)]);
//! assert_eq!(state.time, 1);
//! assert!(effects.iter().all(|e| e.kind != EffectKind::GameOver));
//! ```

#![deny(unsafe_code)]

pub mod block;
pub mod duel;
pub mod garbage;
pub mod scoring;
pub mod state;
pub mod stepper;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::block::Block;
    pub use crate::duel::{combo_widths, place_slabs, PanelDuelState, PanelDuelStepper};
    pub use crate::garbage::GarbageSlab;
    pub use crate::scoring::ScoringStepper;
    pub use crate::state::PanelState;
    pub use crate::stepper::{step_board, PanelRules, PanelStepper};
}
