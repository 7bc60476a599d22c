//! Scoring variant of the match-grid rules.
//!
//! [`ScoringStepper`] composes the standard [`PanelStepper`]: it runs the
//! same pipeline and then prices the tick's matches.

use tumble_core::effect::{Effect, EffectKind};
use tumble_core::event::Event;
use tumble_core::options::GameOptions;
use tumble_core::stepper::Stepper;
use tumble_core::CoreError;

use crate::state::PanelState;
use crate::stepper::{board_call, PanelStepper};

/// Points per cleared block.
pub const POINTS_PER_BLOCK: u64 = 10;

/// Bonus for a combo of `size` blocks cleared at once.
pub fn combo_bonus(size: usize) -> u64 {
    match size {
        0..=3 => 0,
        4 => 20,
        5 => 30,
        6 => 50,
        7 => 60,
        8 => 70,
        9 => 80,
        10 => 100,
        11 => 140,
        12 => 170,
        n => 170 + 30 * (n as u64 - 12),
    }
}

/// Bonus for reaching displayed chain `step` (the second link is step 2).
pub fn chain_bonus(step: u32) -> u64 {
    const TABLE: [u64; 12] = [50, 80, 150, 300, 400, 500, 700, 900, 1100, 1300, 1500, 1800];
    match step {
        0 | 1 => 0,
        n => TABLE[(n as usize - 2).min(TABLE.len() - 1)],
    }
}

/// Match-grid rules that also keep score.
#[derive(Debug, Clone)]
pub struct ScoringStepper {
    inner: PanelStepper,
}

impl ScoringStepper {
    pub const NAME: &'static str = "panel-league-scoring";

    pub fn new(options: GameOptions) -> Result<Self, CoreError> {
        Ok(Self {
            inner: PanelStepper::new(options)?,
        })
    }
}

/// Score the effects of one tick, updating `state.score`.
pub fn score_effects(state: &mut PanelState, effects: &[Effect]) -> Option<Effect> {
    let mut amount = 0;
    for effect in effects {
        match &effect.kind {
            EffectKind::MatchMade { combo, .. } => {
                amount += POINTS_PER_BLOCK * *combo as u64 + combo_bonus(*combo);
            }
            EffectKind::ChainMatchMade { chain, .. } => {
                amount += chain_bonus(chain + 1);
            }
            _ => {}
        }
    }
    if amount == 0 {
        return None;
    }
    state.score += amount;
    Some(Effect::new(
        state.time,
        EffectKind::Score {
            amount,
            total: state.score,
        },
    ))
}

impl Stepper for ScoringStepper {
    type State = PanelState;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn options(&self) -> &GameOptions {
        self.inner.options()
    }

    fn initialize_state(&self) -> Result<PanelState, CoreError> {
        self.inner.initialize_state()
    }

    fn time(&self, state: &PanelState) -> u64 {
        state.time
    }

    fn validate_event(&self, event: &Event) -> Result<(), CoreError> {
        self.inner.validate_event(event)
    }

    fn step(&self, state: &mut PanelState, events: &[Event]) -> Vec<Effect> {
        let mut effects = self.inner.step(state, events);
        if let Some(score) = score_effects(state, &effects) {
            effects.push(score);
        }
        effects
    }

    fn restore(&self, state: &mut PanelState) {
        self.inner.restore(state);
    }

    fn call(
        &self,
        state: &PanelState,
        operation: &str,
        _args: &serde_json::Value,
    ) -> Result<serde_json::Value, CoreError> {
        match operation {
            "score" => Ok(serde_json::json!(state.score)),
            _ => board_call(Self::NAME, state, operation),
        }
    }
}
