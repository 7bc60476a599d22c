//! The group-clear playfield.
//!
//! The grid stores `ghost_rows` invisible rows above the visible field. Row 0
//! is the vanish row: anything left there after gravity is trimmed. Ghost
//! rows hold puyos but never take part in a clear.

use serde::{Deserialize, Serialize};
use tumble_core::options::NUISANCE_COLOR;
use tumble_core::rng::Rng;

/// One grid cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cell {
    #[default]
    Empty,
    Color(u8),
    Nuisance,
}

impl Cell {
    /// Decode an options color: `None` is empty, the nuisance marker is
    /// nuisance, anything else a color.
    pub fn from_option(color: Option<u8>) -> Self {
        match color {
            None => Cell::Empty,
            Some(NUISANCE_COLOR) => Cell::Nuisance,
            Some(c) => Cell::Color(c),
        }
    }

    pub fn is_empty(self) -> bool {
        self == Cell::Empty
    }

    pub fn color(self) -> Option<u8> {
        match self {
            Cell::Color(c) => Some(c),
            _ => None,
        }
    }
}

/// A connected same-color component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub color: u8,
    /// Sorted cell indices.
    pub indices: Vec<usize>,
}

/// Row-major grid, ghost rows first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grid {
    pub width: usize,
    /// Total rows, ghost rows included.
    pub height: usize,
    pub ghost_rows: usize,
    pub cells: Vec<Cell>,
}

impl Grid {
    pub fn new(width: usize, visible_height: usize, ghost_rows: usize) -> Self {
        let height = visible_height + ghost_rows;
        Self {
            width,
            height,
            ghost_rows,
            cells: vec![Cell::Empty; width * height],
        }
    }

    pub fn index(&self, x: usize, y: usize) -> usize {
        x + y * self.width
    }

    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
    }

    pub fn is_visible(&self, index: usize) -> bool {
        index / self.width >= self.ghost_rows
    }

    /// Orthogonal neighbours of a cell.
    pub fn neighbours(&self, index: usize) -> impl Iterator<Item = usize> {
        let (x, y) = self.coords(index);
        let (w, h) = (self.width, self.height);
        [
            (x > 0).then(|| index - 1),
            (x + 1 < w).then(|| index + 1),
            (y > 0).then(|| index - w),
            (y + 1 < h).then(|| index + w),
        ]
        .into_iter()
        .flatten()
    }

    pub fn is_cleared(&self) -> bool {
        self.cells.iter().all(|c| c.is_empty())
    }

    /// Whether no puyo hangs over an empty cell.
    pub fn is_resting(&self) -> bool {
        (0..self.cells.len() - self.width)
            .all(|i| self.cells[i].is_empty() || !self.cells[i + self.width].is_empty())
    }

    /// Drop everything one row at a time until nothing moves.
    ///
    /// Returns `(from, to)` for every puyo that moved, ordered by
    /// destination index.
    pub fn settle(&mut self) -> Vec<(usize, usize)> {
        let w = self.width;
        let mut origin: Vec<usize> = (0..self.cells.len()).collect();
        loop {
            let mut moved = false;
            for i in (0..self.cells.len() - w).rev() {
                if !self.cells[i].is_empty() && self.cells[i + w].is_empty() {
                    self.cells.swap(i, i + w);
                    origin.swap(i, i + w);
                    moved = true;
                }
            }
            if !moved {
                break;
            }
        }
        origin
            .into_iter()
            .enumerate()
            .filter(|&(to, from)| from != to && !self.cells[to].is_empty())
            .map(|(to, from)| (from, to))
            .collect()
    }

    /// Empty the vanish row. Returns the indices that were trimmed.
    pub fn trim_vanish_row(&mut self) -> Vec<usize> {
        if self.ghost_rows == 0 {
            return Vec::new();
        }
        let mut trimmed = Vec::new();
        for i in 0..self.width {
            if !self.cells[i].is_empty() {
                self.cells[i] = Cell::Empty;
                trimmed.push(i);
            }
        }
        trimmed
    }

    /// Colored components in the visible rows with at least `threshold`
    /// members, in order of their smallest index.
    pub fn groups(&self, threshold: usize) -> Vec<Group> {
        let mut seen = vec![false; self.cells.len()];
        let mut groups = Vec::new();
        for start in self.ghost_rows * self.width..self.cells.len() {
            let Some(color) = self.cells[start].color() else {
                continue;
            };
            if seen[start] {
                continue;
            }
            let indices = self.flood(start, color, &mut seen);
            if indices.len() >= threshold {
                groups.push(Group { color, indices });
            }
        }
        groups
    }

    fn flood(&self, start: usize, color: u8, seen: &mut [bool]) -> Vec<usize> {
        let mut stack = vec![start];
        let mut indices = Vec::new();
        seen[start] = true;
        while let Some(i) = stack.pop() {
            indices.push(i);
            for n in self.neighbours(i) {
                if !seen[n] && self.is_visible(n) && self.cells[n] == Cell::Color(color) {
                    seen[n] = true;
                    stack.push(n);
                }
            }
        }
        indices.sort_unstable();
        indices
    }

    /// Visible nuisance cells orthogonally adjacent to any of `indices`.
    pub fn adjacent_nuisance(&self, indices: &[usize]) -> Vec<usize> {
        let mut found: Vec<usize> = indices
            .iter()
            .flat_map(|&i| self.neighbours(i))
            .filter(|&n| self.is_visible(n) && self.cells[n] == Cell::Nuisance)
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }

    /// Lowest empty cell of column `x`, if any.
    pub fn column_top(&self, x: usize) -> Option<usize> {
        (0..self.height)
            .rev()
            .map(|y| self.index(x, y))
            .find(|&i| self.cells[i].is_empty())
    }

    /// Fill the lower `rows` visible rows with colors that form no group of
    /// `threshold` or more.
    pub fn fill_without_groups(
        &mut self,
        rows: usize,
        num_colors: u8,
        threshold: usize,
        rng: &mut Rng,
    ) {
        let top = self.height - rows.min(self.height - self.ghost_rows);
        for y in (top..self.height).rev() {
            for x in 0..self.width {
                let i = self.index(x, y);
                let allowed: Vec<u8> = (0..num_colors)
                    .filter(|&c| {
                        self.cells[i] = Cell::Color(c);
                        let mut seen = vec![false; self.cells.len()];
                        let size = self.flood(i, c, &mut seen).len();
                        size < threshold
                    })
                    .collect();
                let color = if allowed.is_empty() {
                    rng.below(u32::from(num_colors)) as u8
                } else {
                    allowed[rng.below(allowed.len() as u32) as usize]
                };
                self.cells[i] = Cell::Color(color);
            }
        }
    }
}
