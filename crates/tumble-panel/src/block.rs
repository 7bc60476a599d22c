//! Per-cell block record for the match-grid board.
//!
//! A block moves through `Idle -> Swapping -> Floating -> Falling ->
//! Flashing -> Cleared`, with `chaining` as an orthogonal flag. The state is
//! encoded in three timers rather than an enum so that a cell can be, for
//! example, both chaining and floating:
//!
//! | timer | idle value | active meaning |
//! |---|---|---|
//! | `flash_timer` | `-1` | ticks left before the block clears |
//! | `float_timer` | `-1` | `> 0` hanging, `0` falling one row per tick |
//! | `swap_timer` | `0` | signed countdown while a swap is in progress |

use serde::{Deserialize, Serialize};

/// One grid cell. An empty cell is a block with no color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub color: Option<u8>,
    pub flash_timer: i32,
    pub float_timer: i32,
    pub swap_timer: i32,
    pub chaining: bool,
    /// Part of a run found this tick. Never survives a tick boundary.
    #[serde(skip)]
    pub matching: bool,
    /// Excluded from match detection for the current tick only.
    #[serde(skip)]
    pub prevent_matching: bool,
    /// Id of the garbage slab covering this cell. Recomputed from the slab
    /// list after every restore and slab movement.
    #[serde(skip)]
    pub slab: Option<u32>,
}

impl Default for Block {
    fn default() -> Self {
        Self {
            color: None,
            flash_timer: -1,
            float_timer: -1,
            swap_timer: 0,
            chaining: false,
            matching: false,
            prevent_matching: false,
            slab: None,
        }
    }
}

impl Block {
    pub fn with_color(color: u8) -> Self {
        Self {
            color: Some(color),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.color.is_none()
    }

    pub fn is_flashing(&self) -> bool {
        self.flash_timer >= 0
    }

    pub fn is_floating(&self) -> bool {
        self.float_timer >= 0
    }

    pub fn is_swapping(&self) -> bool {
        self.swap_timer != 0
    }

    pub fn is_garbage(&self) -> bool {
        self.slab.is_some()
    }

    /// Whether this cell may take part in a run this tick.
    pub fn can_match(&self) -> bool {
        self.color.is_some()
            && !self.is_flashing()
            && !self.is_floating()
            && !self.is_swapping()
            && !self.is_garbage()
            && !self.prevent_matching
    }

    /// Whether a swap may pick up this cell.
    pub fn can_swap(&self) -> bool {
        !self.is_flashing() && !self.is_floating() && !self.is_swapping() && !self.is_garbage()
    }

    /// Drop the per-tick flags.
    pub fn clear_transient(&mut self) {
        self.matching = false;
        self.prevent_matching = false;
    }
}
