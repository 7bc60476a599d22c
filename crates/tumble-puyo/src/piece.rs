//! Falling pieces: two-puyo deals and the active piece hovering over the
//! grid.

use serde::{Deserialize, Serialize};
use tumble_core::event::PlacedPuyo;
use tumble_core::rng::Rng;

use crate::grid::Grid;

/// Colors of one two-puyo piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Deal {
    pub pivot: u8,
    pub child: u8,
}

impl Deal {
    /// Draw a deal with a single RNG step.
    pub fn draw(rng: &mut Rng, num_colors: u8) -> Self {
        let n = u32::from(num_colors.max(1));
        let value = rng.step();
        Self {
            pivot: (value % n) as u8,
            child: ((value / n) % n) as u8,
        }
    }

    /// Whether `colors` is this deal's pair in either order.
    pub fn matches(&self, a: u8, b: u8) -> bool {
        (a, b) == (self.pivot, self.child) || (a, b) == (self.child, self.pivot)
    }
}

/// Where the child sits relative to the pivot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Orientation {
    #[default]
    Up,
    Right,
    Down,
    Left,
}

impl Orientation {
    pub fn rotated(self, clockwise: bool) -> Self {
        use Orientation::*;
        match (self, clockwise) {
            (Up, true) | (Down, false) => Right,
            (Right, true) | (Left, false) => Down,
            (Down, true) | (Up, false) => Left,
            (Left, true) | (Right, false) => Up,
        }
    }

    fn offset(self) -> (i64, i64) {
        match self {
            Orientation::Up => (0, -1),
            Orientation::Right => (1, 0),
            Orientation::Down => (0, 1),
            Orientation::Left => (-1, 0),
        }
    }
}

/// The piece the player is steering. The pivot always hovers in the
/// lowest ghost row; only its column and orientation change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Piece {
    pub deal: Deal,
    pub x: i64,
    pub orientation: Orientation,
}

impl Piece {
    pub fn spawn(deal: Deal, column: usize) -> Self {
        Self {
            deal,
            x: column as i64,
            orientation: Orientation::Up,
        }
    }

    fn pivot_row(grid: &Grid) -> i64 {
        grid.ghost_rows as i64 - 1
    }

    /// Pivot and child coordinates.
    pub fn coords(&self, grid: &Grid) -> [(i64, i64); 2] {
        let y = Self::pivot_row(grid);
        let (dx, dy) = self.orientation.offset();
        [(self.x, y), (self.x + dx, y + dy)]
    }

    /// Whether both cells are inside the grid and empty.
    pub fn fits(&self, grid: &Grid) -> bool {
        self.coords(grid).iter().all(|&(x, y)| {
            x >= 0
                && y >= 0
                && (x as usize) < grid.width
                && (y as usize) < grid.height
                && grid.cells[grid.index(x as usize, y as usize)].is_empty()
        })
    }

    /// The piece shifted by `dx`, if it fits there.
    pub fn moved(&self, dx: i32, grid: &Grid) -> Option<Self> {
        let next = Self {
            x: self.x + i64::from(dx),
            ..*self
        };
        next.fits(grid).then_some(next)
    }

    /// The piece rotated once, if it fits.
    pub fn rotated(&self, clockwise: bool, grid: &Grid) -> Option<Self> {
        let next = Self {
            orientation: self.orientation.rotated(clockwise),
            ..*self
        };
        next.fits(grid).then_some(next)
    }

    /// The two puyos this piece places, pivot first.
    pub fn placements(&self, grid: &Grid) -> [PlacedPuyo; 2] {
        let [(px, py), (cx, cy)] = self.coords(grid);
        [
            PlacedPuyo {
                index: grid.index(px as usize, py as usize),
                color: self.deal.pivot,
            },
            PlacedPuyo {
                index: grid.index(cx as usize, cy as usize),
                color: self.deal.child,
            },
        ]
    }
}
