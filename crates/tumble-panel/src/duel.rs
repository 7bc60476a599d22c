//! Match-grid duel: N boards exchanging garbage.
//!
//! The duel composes N independent boards rather than extending the board
//! rules. Every tick, children step in player-index order; afterwards large
//! combos and finished chains are converted into garbage slabs and queued on
//! every other board. The conversion uses the parent RNG only for placement
//! ties, so the result is the same on every peer.

use serde::{Deserialize, Serialize};
use tumble_core::effect::{Effect, EffectKind, SlabShape};
use tumble_core::event::Event;
use tumble_core::options::GameOptions;
use tumble_core::rng::Rng;
use tumble_core::stepper::{unknown_operation, Stepper};
use tumble_core::CoreError;

use crate::state::PanelState;
use crate::stepper::{board_call, step_board, validate_garbage, PanelRules};

/// Parent state for a duel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelDuelState {
    pub time: u64,
    /// Tie-break RNG for garbage placement.
    pub rng: Rng,
    pub children: Vec<PanelState>,
    pub game_over: bool,
    pub loser: Option<usize>,
}

// ---------------------------------------------------------------------------
// Combo to slab conversion
// ---------------------------------------------------------------------------

/// Split a combo of `size` blocks into balanced slab widths.
///
/// A combo sends `size - 1` cells of garbage. Anything narrower than
/// `min_width` sends nothing; anything wider than the board is split into
/// `ceil(total / grid_width)` pieces whose widths differ by at most one.
pub fn combo_widths(size: usize, grid_width: usize, min_width: usize) -> Vec<usize> {
    let total = size.saturating_sub(1);
    if total < min_width.max(1) {
        return Vec::new();
    }
    let pieces = total.div_ceil(grid_width);
    let base = total / pieces;
    let extra = total % pieces;
    (0..pieces).map(|k| base + usize::from(k < extra)).collect()
}

/// Place slabs of the given widths on `target`, balancing left and right.
///
/// A slab goes on the side holding fewer narrow slabs; ties go to the side
/// holding fewer garbage cells, and remaining ties to a fresh RNG draw.
pub fn place_slabs(widths: &[usize], target: &PanelState, rng: &mut Rng) -> Vec<SlabShape> {
    let grid_width = target.width as i64;
    let mut placed: Vec<SlabShape> = Vec::with_capacity(widths.len());
    for &w in widths {
        let w = w as i64;
        if w >= grid_width {
            placed.push(SlabShape {
                x: 0,
                width: grid_width,
                height: 1,
            });
            continue;
        }
        let existing = target
            .garbage
            .iter()
            .map(|s| SlabShape {
                x: s.x,
                width: s.width,
                height: s.height,
            })
            .chain(placed.iter().copied())
            .filter(|s| s.width < grid_width);
        let (mut left, mut right, mut left_qty, mut right_qty) = (0, 0, 0, 0);
        for s in existing {
            if s.x == 0 {
                left += 1;
                left_qty += s.width * s.height;
            } else if s.x + s.width == grid_width {
                right += 1;
                right_qty += s.width * s.height;
            }
        }
        let go_left = match (left.cmp(&right), left_qty.cmp(&right_qty)) {
            (std::cmp::Ordering::Less, _) => true,
            (std::cmp::Ordering::Greater, _) => false,
            (_, std::cmp::Ordering::Less) => true,
            (_, std::cmp::Ordering::Greater) => false,
            _ => rng.below(2) == 0,
        };
        placed.push(SlabShape {
            x: if go_left { 0 } else { grid_width - w },
            width: w,
            height: 1,
        });
    }
    placed
}

// ---------------------------------------------------------------------------
// PanelDuelStepper
// ---------------------------------------------------------------------------

/// Match-grid duel over `options.players` boards.
#[derive(Debug, Clone)]
pub struct PanelDuelStepper {
    options: GameOptions,
    rules: PanelRules,
}

impl PanelDuelStepper {
    pub const NAME: &'static str = "panel-league-duel";

    pub fn new(options: GameOptions) -> Result<Self, CoreError> {
        options.validate()?;
        if options.players < 2 {
            return Err(CoreError::InvalidOption {
                name: "players",
                details: format!("a duel needs at least 2 players, got {}", options.players),
            });
        }
        let rules = PanelRules::from_options(&options);
        Ok(Self { options, rules })
    }

    /// Combo slab widths and chain slab heights owed to the opponents of a
    /// board after its effects.
    fn outgoing(&self, effects: &[Effect]) -> (Vec<usize>, Vec<i64>) {
        let mut widths = Vec::new();
        let mut chains = Vec::new();
        for effect in effects {
            match effect.kind {
                EffectKind::MatchMade { combo, .. } => {
                    widths.extend(combo_widths(
                        combo,
                        self.options.width,
                        self.options.min_garbage_width,
                    ));
                }
                EffectKind::ChainDone { chain } => chains.push(i64::from(chain)),
                _ => {}
            }
        }
        (widths, chains)
    }
}

impl Stepper for PanelDuelStepper {
    type State = PanelDuelState;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn options(&self) -> &GameOptions {
        &self.options
    }

    fn initialize_state(&self) -> Result<PanelDuelState, CoreError> {
        let mut rng = self.options.make_rng();
        let mut children = Vec::with_capacity(self.options.players);
        let first = PanelState::from_options(&GameOptions {
            seed: Some(rng.to_words()),
            ..self.options.clone()
        })?;
        for _ in 0..self.options.players {
            // Same starting board for everyone, independent RNG streams after.
            let mut child = first.clone();
            child.rng = Rng::from_state([rng.step(), rng.step() | 1, rng.step(), rng.step(), 0]);
            children.push(child);
        }
        Ok(PanelDuelState {
            time: 0,
            rng,
            children,
            game_over: false,
            loser: None,
        })
    }

    fn time(&self, state: &PanelDuelState) -> u64 {
        state.time
    }

    fn validate_event(&self, event: &Event) -> Result<(), CoreError> {
        validate_garbage(event, self.options.width, self.options.height)
    }

    fn step(&self, state: &mut PanelDuelState, events: &[Event]) -> Vec<Effect> {
        state.time += 1;
        let time = state.time;
        let mut effects = Vec::new();
        if state.game_over {
            for child in &mut state.children {
                child.time = time;
            }
            return effects;
        }

        let mut per_child: Vec<Vec<Effect>> = Vec::with_capacity(state.children.len());
        for (player, child) in state.children.iter_mut().enumerate() {
            let mine: Vec<Event> = events
                .iter()
                .filter(|e| e.player == Some(player))
                .cloned()
                .collect();
            let child_effects = step_board(&self.rules, child, &mine);
            per_child.push(child_effects);
        }
        let strays = events
            .iter()
            .filter(|e| e.player.map_or(true, |p| p >= state.children.len()))
            .count();
        if strays > 0 {
            tracing::warn!(strays, time, "ignored duel events without a valid player");
        }

        for (from, child_effects) in per_child.iter().enumerate() {
            let (widths, chains) = self.outgoing(child_effects);
            if widths.is_empty() && chains.is_empty() {
                continue;
            }
            for to in (0..state.children.len()).filter(|&to| to != from) {
                let mut slabs = place_slabs(&widths, &state.children[to], &mut state.rng);
                slabs.extend(chains.iter().map(|&height| SlabShape {
                    x: 0,
                    width: self.options.width as i64,
                    height,
                }));
                let target = &mut state.children[to];
                for slab in &slabs {
                    target.push_garbage(slab.x, slab.width, slab.height);
                }
                effects.push(Effect::new(time, EffectKind::Attack { from, to, slabs }));
            }
        }

        for (player, child_effects) in per_child.into_iter().enumerate() {
            for effect in child_effects {
                if effect.kind == EffectKind::GameOver && !state.game_over {
                    state.game_over = true;
                    state.loser = Some(player);
                }
                effects.push(effect.with_player(player));
            }
        }
        effects
    }

    fn restore(&self, state: &mut PanelDuelState) {
        for child in &mut state.children {
            child.rebuild_cover();
        }
    }

    fn call(
        &self,
        state: &PanelDuelState,
        operation: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value, CoreError> {
        if operation == "canStep" {
            return Ok(serde_json::Value::Bool(!state.game_over));
        }
        let player = args
            .get("player")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| CoreError::InvalidArgument {
                operation: operation.to_owned(),
                details: "expected {\"player\": <index>}".to_owned(),
            })? as usize;
        let child = state
            .children
            .get(player)
            .ok_or_else(|| CoreError::InvalidArgument {
                operation: operation.to_owned(),
                details: format!("no player {player}"),
            })?;
        match operation {
            "canAdd" => Ok(serde_json::Value::Bool(
                !state.game_over && child.top_row_empty(),
            )),
            _ => board_call(Self::NAME, child, operation)
                .map_err(|_| unknown_operation(Self::NAME, operation)),
        }
    }
}
