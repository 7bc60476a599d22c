//! Garbage slabs: rectangular obstruction groups.
//!
//! A slab lives outside the block array. It may hang above the visible grid
//! (negative `y`) while it falls. Once it rests it samples the colors of its
//! bottom row; when shocked by an adjacent match it flashes and then turns
//! that bottom row into ordinary chaining blocks, shrinking by one row.

use serde::{Deserialize, Serialize};
use tumble_core::rng::Rng;

/// A rectangular garbage group. Coordinates are in cells, `y` grows down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GarbageSlab {
    /// Stable identifier so consumers can track the slab across ticks.
    pub id: u32,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    /// Ticks left before the bottom row releases, `-1` when idle.
    pub flash_timer: i32,
    /// Duration the current flash started with.
    pub flash_time: i32,
    /// Colors of the bottom row, sampled when the slab comes to rest.
    /// Empty while the slab has never rested.
    pub colors: Vec<u8>,
}

impl GarbageSlab {
    pub fn new(id: u32, x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            id,
            x,
            y,
            width,
            height,
            flash_timer: -1,
            flash_time: 0,
            colors: Vec::new(),
        }
    }

    pub fn is_flashing(&self) -> bool {
        self.flash_timer >= 0
    }

    pub fn has_landed(&self) -> bool {
        !self.colors.is_empty()
    }

    /// Row just below the slab.
    pub fn bottom(&self) -> i64 {
        self.y + self.height
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    /// Grid indices covered by the slab that lie inside a `width x height`
    /// grid, row-major.
    pub fn grid_cells(&self, width: usize, height: usize) -> Vec<usize> {
        let mut cells = Vec::new();
        for y in self.y.max(0)..self.bottom().min(height as i64) {
            for x in self.x.max(0)..(self.x + self.width).min(width as i64) {
                cells.push(x as usize + y as usize * width);
            }
        }
        cells
    }

    /// Sample colors for the bottom row, never producing three identical
    /// colors in a row.
    pub fn sample_colors(&mut self, rng: &mut Rng, num_colors: u8) {
        self.colors = sample_row(rng, self.width as usize, num_colors, |_, _| false);
    }
}

/// Draw `len` colors left to right. A color is disallowed if it would
/// complete a horizontal triple or if `forbid(x, color)` says so; the draw
/// consumes the RNG as `step() % allowed.len()`.
pub(crate) fn sample_row(
    rng: &mut Rng,
    len: usize,
    num_colors: u8,
    forbid: impl Fn(usize, u8) -> bool,
) -> Vec<u8> {
    let mut row: Vec<u8> = Vec::with_capacity(len);
    for x in 0..len {
        let allowed: Vec<u8> = (0..num_colors)
            .filter(|&c| {
                let triple = x >= 2 && row[x - 1] == c && row[x - 2] == c;
                !triple && !forbid(x, c)
            })
            .collect();
        let color = if allowed.is_empty() {
            rng.below(u32::from(num_colors)) as u8
        } else {
            allowed[rng.below(allowed.len() as u32) as usize]
        };
        row.push(color);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_cells_clip_to_the_visible_grid() {
        let slab = GarbageSlab::new(1, 2, -1, 3, 2);
        assert_eq!(slab.grid_cells(6, 12), vec![2, 3, 4]);
    }

    #[test]
    fn contains_uses_half_open_bounds() {
        let slab = GarbageSlab::new(1, 0, 3, 2, 2);
        assert!(slab.contains(0, 3));
        assert!(slab.contains(1, 4));
        assert!(!slab.contains(2, 3));
        assert!(!slab.contains(0, 5));
    }

    #[test]
    fn sampled_rows_have_no_triples() {
        let mut rng = Rng::default();
        for _ in 0..200 {
            let row = sample_row(&mut rng, 6, 2, |_, _| false);
            for w in row.windows(3) {
                assert!(!(w[0] == w[1] && w[1] == w[2]), "triple in {row:?}");
            }
        }
    }

    #[test]
    fn landing_samples_one_color_per_column() {
        let mut slab = GarbageSlab::new(3, 0, 10, 6, 2);
        assert!(!slab.has_landed());
        slab.sample_colors(&mut Rng::default(), 5);
        assert_eq!(slab.colors.len(), 6);
        assert!(slab.colors.iter().all(|&c| c < 5));
    }
}
