//! Input events: player actions and system directives.
//!
//! An [`Event`] targets exactly one tick. Several events may share a tick;
//! within a tick they are applied in the canonical order defined by
//! [`EventKind::rank`] and [`Event::sort_key`], never in arrival order.

use serde::{Deserialize, Serialize};

/// A single puyo placed by an `addPuyos` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlacedPuyo {
    /// Cell index in the full grid (ghost rows included).
    pub index: usize,
    /// Color index, `0..num_colors`.
    pub color: u8,
}

/// The action carried by an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventKind {
    /// Empty the board and discard pending garbage.
    ClearAll,
    /// Fill the lower half of an empty board with match-free colors.
    Refill,
    /// Drop a garbage slab onto a match-grid board.
    AddGarbage { x: i64, width: i64, height: i64 },
    /// Owe nuisance puyos to a group-clear board.
    AddNuisance { amount: u32 },
    /// Push the preview row into the bottom of a match-grid board.
    AddRow,
    /// Exchange the cell at `index` with its right neighbour.
    Swap { index: usize },
    /// Place puyos directly into the ghost rows.
    AddPuyos { blocks: Vec<PlacedPuyo> },
    /// Shift the active piece horizontally.
    MovePiece { dx: i32 },
    /// Rotate the active piece around its pivot.
    RotatePiece { clockwise: bool },
    /// Commit the active piece into the grid.
    DropPiece,
}

impl EventKind {
    /// Rank of this kind in the canonical per-tick order.
    pub fn rank(&self) -> u8 {
        match self {
            EventKind::ClearAll => 0,
            EventKind::Refill => 1,
            EventKind::AddGarbage { .. } => 2,
            EventKind::AddNuisance { .. } => 3,
            EventKind::AddRow => 4,
            EventKind::Swap { .. } => 5,
            EventKind::AddPuyos { .. } => 6,
            EventKind::MovePiece { .. } => 7,
            EventKind::RotatePiece { .. } => 8,
            EventKind::DropPiece => 9,
        }
    }

    /// Stable wire name, matching the serde tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::ClearAll => "clearAll",
            EventKind::Refill => "refill",
            EventKind::AddGarbage { .. } => "addGarbage",
            EventKind::AddNuisance { .. } => "addNuisance",
            EventKind::AddRow => "addRow",
            EventKind::Swap { .. } => "swap",
            EventKind::AddPuyos { .. } => "addPuyos",
            EventKind::MovePiece { .. } => "movePiece",
            EventKind::RotatePiece { .. } => "rotatePiece",
            EventKind::DropPiece => "dropPiece",
        }
    }

    fn secondary_key(&self) -> i64 {
        match self {
            EventKind::Swap { index } => *index as i64,
            EventKind::AddGarbage { x, .. } => *x,
            EventKind::AddNuisance { amount } => i64::from(*amount),
            EventKind::MovePiece { dx } => i64::from(*dx),
            EventKind::RotatePiece { clockwise } => i64::from(*clockwise),
            _ => 0,
        }
    }
}

/// A timestamped input addressed to one tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    /// The tick this event is applied on.
    pub time: u64,
    /// Player index for multi-board compositions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<usize>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(time: u64, kind: EventKind) -> Self {
        Self {
            time,
            player: None,
            kind,
        }
    }

    pub fn for_player(time: u64, player: usize, kind: EventKind) -> Self {
        Self {
            time,
            player: Some(player),
            kind,
        }
    }

    /// Total order used inside a tick: kind rank, player, secondary key,
    /// then the canonical payload as a final tie-break.
    pub fn sort_key(&self) -> (u8, Option<usize>, i64, String) {
        (
            self.kind.rank(),
            self.player,
            self.kind.secondary_key(),
            crate::snapshot::canonical_json(&self.kind),
        )
    }
}
