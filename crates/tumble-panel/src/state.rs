//! Match-grid game state.
//!
//! [`PanelState`] is a plain value: cloning it is the deep copy the rollback
//! cache relies on, and its JSON form is the canonical snapshot. The only
//! non-serialized data is the per-block slab back-reference, rebuilt by
//! [`PanelState::rebuild_cover`].

use serde::{Deserialize, Serialize};
use tumble_core::options::GameOptions;
use tumble_core::rng::Rng;
use tumble_core::CoreError;

use crate::block::Block;
use crate::garbage::{sample_row, GarbageSlab};

/// Complete state of one match-grid board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelState {
    pub time: u64,
    pub width: usize,
    pub height: usize,
    pub rng: Rng,
    /// Row-major from the top: index = `x + y * width`.
    pub blocks: Vec<Block>,
    /// Colors of the row that the next `addRow` pushes in.
    pub next_row: Vec<u8>,
    pub garbage: Vec<GarbageSlab>,
    pub next_slab_id: u32,
    /// Number of chain links in the current chain.
    pub chain_number: u32,
    pub score: u64,
    pub game_over: bool,
}

impl PanelState {
    /// Build a genesis board from options.
    ///
    /// Uses `colors` verbatim when given; otherwise fills `initial_rows`
    /// rows from the bottom with match-free colors.
    pub fn from_options(options: &GameOptions) -> Result<Self, CoreError> {
        options.validate()?;
        let mut state = Self::empty(options.width, options.height, options.make_rng());
        let num_colors = options.block_types.len() as u8;
        match &options.colors {
            Some(colors) => {
                for (block, color) in state.blocks.iter_mut().zip(colors) {
                    if let Some(c) = color {
                        if *c >= num_colors {
                            return Err(CoreError::InvalidOption {
                                name: "colors",
                                details: format!("color {c} outside 0..{num_colors}"),
                            });
                        }
                    }
                    block.color = *color;
                }
            }
            None => state.fill_bottom_rows(options.initial_rows, num_colors),
        }
        state.generate_next_row(num_colors);
        Ok(state)
    }

    pub fn empty(width: usize, height: usize, rng: Rng) -> Self {
        Self {
            time: 0,
            width,
            height,
            rng,
            blocks: vec![Block::default(); width * height],
            next_row: Vec::new(),
            garbage: Vec::new(),
            next_slab_id: 0,
            chain_number: 0,
            score: 0,
            game_over: false,
        }
    }

    pub fn index(&self, x: usize, y: usize) -> usize {
        x + y * self.width
    }

    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
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

    /// Colors of the grid, `None` for empty cells. Handy for tests and views.
    pub fn colors(&self) -> Vec<Option<u8>> {
        self.blocks.iter().map(|b| b.color).collect()
    }

    pub fn is_cleared(&self) -> bool {
        self.blocks.iter().all(Block::is_empty) && self.garbage.is_empty()
    }

    pub fn slab(&self, id: u32) -> Option<&GarbageSlab> {
        self.garbage.iter().find(|s| s.id == id)
    }

    /// Recompute every block's slab back-reference from the slab list.
    pub fn rebuild_cover(&mut self) {
        for block in &mut self.blocks {
            block.slab = None;
        }
        for slab in &self.garbage {
            for cell in slab.grid_cells(self.width, self.height) {
                self.blocks[cell].slab = Some(slab.id);
            }
        }
    }

    /// Whether the top row holds neither blocks nor garbage.
    pub fn top_row_empty(&self) -> bool {
        (0..self.width).all(|x| {
            let block = &self.blocks[x];
            block.is_empty() && !block.is_garbage()
        })
    }

    /// Append a slab stacked above everything already waiting to fall.
    pub fn push_garbage(&mut self, x: i64, width: i64, height: i64) -> u32 {
        let top = self.garbage.iter().map(|s| s.y).min().unwrap_or(0).min(0);
        let id = self.next_slab_id;
        self.next_slab_id += 1;
        self.garbage
            .push(GarbageSlab::new(id, x, top - height, width, height));
        id
    }

    /// Runs of three or more equal colors among cells accepted by `eligible`.
    ///
    /// Horizontal and vertical runs are found independently; a cell may
    /// appear in both.
    pub fn find_runs(&self, eligible: impl Fn(&Block) -> bool) -> Vec<Vec<usize>> {
        let mut runs = Vec::new();
        let lines = (0..self.height)
            .map(|y| (0..self.width).map(|x| self.index(x, y)).collect::<Vec<_>>())
            .chain(
                (0..self.width)
                    .map(|x| (0..self.height).map(|y| self.index(x, y)).collect::<Vec<_>>()),
            );
        for line in lines {
            let mut start = 0;
            while start < line.len() {
                let first = &self.blocks[line[start]];
                let mut end = start + 1;
                if eligible(first) {
                    while end < line.len() {
                        let next = &self.blocks[line[end]];
                        if !eligible(next) || next.color != first.color {
                            break;
                        }
                        end += 1;
                    }
                    if end - start >= 3 {
                        runs.push(line[start..end].to_vec());
                    }
                }
                start = end;
            }
        }
        runs
    }

    /// Pick a new preview row that does not match horizontally or with the
    /// two rows it will sit under.
    pub fn generate_next_row(&mut self, num_colors: u8) {
        let (w, h) = (self.width, self.height);
        let bottom: Vec<Option<u8>> = (0..w).map(|x| self.blocks[x + (h - 1) * w].color).collect();
        let above: Vec<Option<u8>> = (0..w).map(|x| self.blocks[x + (h - 2) * w].color).collect();
        self.next_row = sample_row(&mut self.rng, w, num_colors, |x, c| {
            bottom[x] == Some(c) && above[x] == Some(c)
        });
    }

    /// Fill the bottom `rows` rows with colors that form no runs.
    pub fn fill_bottom_rows(&mut self, rows: usize, num_colors: u8) {
        let (w, h) = (self.width, self.height);
        for y in (h - rows.min(h)..h).rev() {
            let below1: Vec<Option<u8>> = (0..w)
                .map(|x| (y + 1 < h).then(|| self.blocks[x + (y + 1) * w].color).flatten())
                .collect();
            let below2: Vec<Option<u8>> = (0..w)
                .map(|x| (y + 2 < h).then(|| self.blocks[x + (y + 2) * w].color).flatten())
                .collect();
            let row = sample_row(&mut self.rng, w, num_colors, |x, c| {
                below1[x] == Some(c) && below2[x] == Some(c)
            });
            for (x, color) in row.into_iter().enumerate() {
                self.blocks[x + y * w] = Block::with_color(color);
            }
        }
    }
}
