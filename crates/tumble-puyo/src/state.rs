//! Group-clear game state and the deal sources that feed it.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tumble_core::options::{GameOptions, NUISANCE_COLOR};
use tumble_core::rng::Rng;
use tumble_core::CoreError;

use crate::grid::{Cell, Grid};
use crate::nuisance::NuisanceLedger;
use crate::piece::{Deal, Piece};

/// Column where new pieces appear, and whose top visible cell decides
/// game over.
pub const SPAWN_COLUMN: usize = 2;

// ---------------------------------------------------------------------------
// PuyoRules
// ---------------------------------------------------------------------------

/// Constants extracted from [`GameOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PuyoRules {
    pub num_colors: u8,
    pub clear_threshold: usize,
    pub target_score: u64,
    pub max_nuisance_rows: usize,
    pub num_deals: usize,
    pub spawn_column: usize,
    pub refill_rows: usize,
}

impl PuyoRules {
    pub fn from_options(options: &GameOptions) -> Self {
        Self {
            num_colors: options.num_colors,
            clear_threshold: options.clear_threshold,
            target_score: options.target_score,
            max_nuisance_rows: options.max_nuisance_rows,
            num_deals: options.num_deals.max(1),
            spawn_column: SPAWN_COLUMN.min(options.width - 1),
            refill_rows: options.height / 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Deal sources
// ---------------------------------------------------------------------------

/// Deal history shared by every board of a duel, so all players see the
/// same sequence of pieces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedDeals {
    pub rng: Rng,
    pub history: Vec<Deal>,
}

impl SharedDeals {
    pub fn new(rng: Rng) -> Self {
        Self {
            rng,
            history: Vec::new(),
        }
    }

    /// The `index`th deal, drawing new ones as needed.
    pub fn get(&mut self, index: usize, num_colors: u8) -> Deal {
        while self.history.len() <= index {
            let deal = Deal::draw(&mut self.rng, num_colors);
            self.history.push(deal);
        }
        self.history[index]
    }
}

/// Where a board takes its next deal from.
pub enum DealSource<'a> {
    /// The board's own RNG.
    Own,
    /// A history shared with other boards.
    Shared(&'a mut SharedDeals),
}

// ---------------------------------------------------------------------------
// PuyoState
// ---------------------------------------------------------------------------

/// Complete state of one group-clear board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuyoState {
    pub time: u64,
    pub grid: Grid,
    pub rng: Rng,
    /// Links in the chain currently resolving; 0 when resting.
    pub chain: u32,
    /// Score collected by the current chain.
    pub chain_score: u64,
    pub score: u64,
    pub nuisance: NuisanceLedger,
    /// Upcoming deals, front first.
    pub deals: VecDeque<Deal>,
    /// Deals taken from the source so far.
    pub deals_drawn: usize,
    pub piece: Option<Piece>,
    /// Set when puyos were placed; cleared once pending nuisance drops.
    pub awaiting_nuisance: bool,
    pub game_over: bool,
}

impl PuyoState {
    /// Build a genesis board. `colors` covers the visible rows only.
    pub fn from_options(options: &GameOptions) -> Result<Self, CoreError> {
        options.validate()?;
        let mut grid = Grid::new(options.width, options.height, options.ghost_rows);
        if let Some(colors) = &options.colors {
            let offset = options.ghost_rows * options.width;
            for (k, color) in colors.iter().enumerate() {
                if let Some(c) = *color {
                    if c != NUISANCE_COLOR && c >= options.num_colors {
                        return Err(CoreError::InvalidOption {
                            name: "colors",
                            details: format!("color {c} outside 0..{}", options.num_colors),
                        });
                    }
                }
                grid.cells[offset + k] = Cell::from_option(*color);
            }
        }
        Ok(Self {
            time: 0,
            grid,
            rng: options.make_rng(),
            chain: 0,
            chain_score: 0,
            score: 0,
            nuisance: NuisanceLedger::default(),
            deals: VecDeque::new(),
            deals_drawn: 0,
            piece: None,
            awaiting_nuisance: false,
            game_over: false,
        })
    }

    /// Take the next deal from `source`.
    pub fn draw_deal(&mut self, rules: &PuyoRules, source: &mut DealSource<'_>) -> Deal {
        let deal = match source {
            DealSource::Own => Deal::draw(&mut self.rng, rules.num_colors),
            DealSource::Shared(shared) => shared.get(self.deals_drawn, rules.num_colors),
        };
        self.deals_drawn += 1;
        deal
    }

    /// Top the deal queue up to `rules.num_deals`.
    pub fn fill_deals(&mut self, rules: &PuyoRules, source: &mut DealSource<'_>) {
        while self.deals.len() < rules.num_deals {
            let deal = self.draw_deal(rules, source);
            self.deals.push_back(deal);
        }
    }

    /// Whether the spawn column's top visible cell is free.
    pub fn spawn_free(&self, rules: &PuyoRules) -> bool {
        let i = self.grid.index(rules.spawn_column, self.grid.ghost_rows);
        self.grid.cells[i].is_empty()
    }

    /// Put the front deal in play. Returns false if it does not fit.
    pub fn spawn_piece(&mut self, rules: &PuyoRules, source: &mut DealSource<'_>) -> bool {
        self.fill_deals(rules, source);
        let Some(&deal) = self.deals.front() else {
            return false;
        };
        let piece = Piece::spawn(deal, rules.spawn_column);
        if !piece.fits(&self.grid) {
            return false;
        }
        self.piece = Some(piece);
        true
    }

    /// Drop `amount` nuisance puyos on top of the columns. Returns the
    /// cells they landed in; puyos that find no room are lost.
    pub fn drop_nuisance(&mut self, amount: u32) -> Vec<usize> {
        let width = self.grid.width;
        let columns = self.nuisance.distribute(amount, width);
        let mut landed = Vec::new();
        for (x, count) in columns.into_iter().enumerate() {
            for _ in 0..count {
                let Some(i) = self.grid.column_top(x) else {
                    break;
                };
                self.grid.cells[i] = Cell::Nuisance;
                landed.push(i);
            }
        }
        landed.sort_unstable();
        landed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_are_offset_below_the_ghost_rows() {
        let options = GameOptions {
            width: 2,
            height: 2,
            ghost_rows: 2,
            colors: Some(vec![None, Some(1), Some(NUISANCE_COLOR), Some(0)]),
            ..Default::default()
        };
        let state = PuyoState::from_options(&options).unwrap();
        assert_eq!(state.grid.height, 4);
        assert_eq!(state.grid.cells[5], Cell::Color(1));
        assert_eq!(state.grid.cells[6], Cell::Nuisance);
        assert_eq!(state.grid.cells[7], Cell::Color(0));
    }

    #[test]
    fn out_of_range_colors_fail() {
        let options = GameOptions {
            width: 1,
            height: 2,
            initial_rows: 0,
            colors: Some(vec![None, Some(9)]),
            ..Default::default()
        };
        assert!(matches!(
            PuyoState::from_options(&options),
            Err(CoreError::InvalidOption { name: "colors", .. })
        ));
    }

    #[test]
    fn shared_deals_replay_the_same_sequence() {
        let mut shared = SharedDeals::new(Rng::from_state([1, 2, 3, 4, 0]));
        let second = shared.get(1, 4);
        let first = shared.get(0, 4);
        assert_eq!(shared.history, vec![first, second]);
    }

    #[test]
    fn nuisance_stacks_on_columns() {
        let options = GameOptions {
            width: 3,
            height: 3,
            ..Default::default()
        };
        let mut state = PuyoState::from_options(&options).unwrap();
        let idx = state.grid.index(0, 4);
        state.grid.cells[idx] = Cell::Color(0);
        let landed = state.drop_nuisance(4);
        // A full row plus one extra in column 0, on top of the red.
        assert_eq!(landed, vec![6, 9, 13, 14]);
        assert_eq!(state.nuisance.nuisance_x, 1);
    }
}
