//! Construction options shared by every stepper.
//!
//! [`GameOptions`] is the Rust form of the option bag accepted by
//! `initialize`. Every field has a default, so a JSON document only needs to
//! name what it changes:
//!
//! ```
//! use tumble_core::options::GameOptions;
//!
//! let opts = GameOptions::from_json(r#"{"width": 6, "height": 12, "stepperName": "puyo"}"#).unwrap();
//! assert_eq!(opts.stepper_name, "puyo");
//! assert_eq!(opts.clear_threshold, 4);
//! ```

use serde::{Deserialize, Serialize};

use crate::rng::Rng;
use crate::CoreError;

/// Color value used in `colors` to denote a nuisance puyo.
pub const NUISANCE_COLOR: u8 = u8::MAX;

/// Options recognised at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameOptions {
    /// Grid width in cells.
    pub width: usize,
    /// Visible grid height in cells.
    pub height: usize,
    /// Registry name of the stepper to build.
    pub stepper_name: String,
    /// Ticks a matched block flashes before it clears.
    pub flash_time: u32,
    /// Ticks an unsupported block hangs before falling.
    pub float_time: u32,
    /// Ticks a swap keeps both cells busy.
    pub swap_time: u32,
    /// Ticks a shocked garbage slab flashes before releasing a row.
    pub garbage_flash_time: u32,
    /// Names of the match-grid block colors; the count is what matters.
    pub block_types: Vec<String>,
    /// Number of puyo colors.
    pub num_colors: u8,
    /// Depth of the deal queue.
    pub num_deals: usize,
    /// Chain score converted into one nuisance puyo.
    pub target_score: u64,
    /// Minimum group size that clears.
    pub clear_threshold: usize,
    /// Invisible rows above the group-clear playfield.
    pub ghost_rows: usize,
    /// Rows of random blocks on a fresh match-grid board without `colors`,
    /// clamped to the height.
    pub initial_rows: usize,
    /// Number of child boards in duel compositions.
    pub players: usize,
    /// Narrowest garbage slab a combo produces.
    pub min_garbage_width: usize,
    /// Nuisance rows materialised per tick at most.
    pub max_nuisance_rows: usize,
    /// Explicit initial colors, row-major from the top, `None` = empty.
    pub colors: Option<Vec<Option<u8>>>,
    /// Explicit RNG state; absent means [`Rng::scramble`].
    pub seed: Option<[u32; 5]>,
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            width: 6,
            height: 12,
            stepper_name: "panel-league".to_owned(),
            flash_time: 40,
            float_time: 10,
            swap_time: 3,
            garbage_flash_time: 60,
            block_types: ["red", "green", "blue", "violet", "yellow"]
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            num_colors: 4,
            num_deals: 3,
            target_score: 70,
            clear_threshold: 4,
            ghost_rows: 2,
            initial_rows: 6,
            players: 2,
            min_garbage_width: 3,
            max_nuisance_rows: 5,
            colors: None,
            seed: None,
        }
    }
}

impl GameOptions {
    /// Parse options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        serde_json::from_str(json).map_err(|e| CoreError::Serialization {
            what: "game options",
            details: e.to_string(),
        })
    }

    /// Number of cells in the visible grid.
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// The seeded generator, or a scrambled one when no seed was given.
    pub fn make_rng(&self) -> Rng {
        match self.seed {
            Some(words) => Rng::from_state(words),
            None => Rng::scramble(),
        }
    }

    /// Check ranges shared by all steppers.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOption`] for out-of-range values and
    /// [`CoreError::DimensionMismatch`] if `colors` does not cover the grid.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.width == 0 {
            return Err(CoreError::InvalidOption {
                name: "width",
                details: "must be at least 1".to_owned(),
            });
        }
        if self.height < 2 {
            return Err(CoreError::InvalidOption {
                name: "height",
                details: format!("must be at least 2, got {}", self.height),
            });
        }
        if self.block_types.len() < 2 {
            return Err(CoreError::InvalidOption {
                name: "blockTypes",
                details: "needs at least two block types".to_owned(),
            });
        }
        if self.num_colors == 0 || self.num_colors == NUISANCE_COLOR {
            return Err(CoreError::InvalidOption {
                name: "numColors",
                details: format!("must be in 1..255, got {}", self.num_colors),
            });
        }
        if self.clear_threshold < 2 {
            return Err(CoreError::InvalidOption {
                name: "clearThreshold",
                details: format!("must be at least 2, got {}", self.clear_threshold),
            });
        }
        if self.target_score == 0 {
            return Err(CoreError::InvalidOption {
                name: "targetScore",
                details: "must be positive".to_owned(),
            });
        }
        if self.players == 0 {
            return Err(CoreError::InvalidOption {
                name: "players",
                details: "must be at least 1".to_owned(),
            });
        }
        if let Some(colors) = &self.colors {
            if colors.len() != self.area() {
                return Err(CoreError::DimensionMismatch {
                    expected: self.area(),
                    actual: colors.len(),
                    width: self.width,
                    height: self.height,
                });
            }
        }
        Ok(())
    }
}
