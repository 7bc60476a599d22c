//! Group-clear duel: endless boards fed from one deal history, trading
//! nuisance.
//!
//! Children step in player-index order. Every board draws its pieces from
//! the shared [`SharedDeals`], so all players see the same sequence no
//! matter how far ahead one of them is. Nuisance a board sends at the end
//! of a chain is added to every opponent's pending count after all boards
//! have stepped.

use serde::{Deserialize, Serialize};
use tumble_core::effect::{Effect, EffectKind};
use tumble_core::event::Event;
use tumble_core::options::GameOptions;
use tumble_core::rng::Rng;
use tumble_core::stepper::Stepper;
use tumble_core::CoreError;

use crate::state::{DealSource, PuyoRules, PuyoState, SharedDeals};
use crate::stepper::{board_call, require_piece_room, step_board, validate_puyos, Variant};

/// Parent state for a duel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuyoDuelState {
    pub time: u64,
    pub deals: SharedDeals,
    pub children: Vec<PuyoState>,
    pub game_over: bool,
    pub loser: Option<usize>,
}

/// Group-clear duel over `options.players` boards.
#[derive(Debug, Clone)]
pub struct PuyoDuelStepper {
    options: GameOptions,
    rules: PuyoRules,
}

impl PuyoDuelStepper {
    pub const NAME: &'static str = "puyo-duel";

    pub fn new(options: GameOptions) -> Result<Self, CoreError> {
        options.validate()?;
        require_piece_room(&options)?;
        if options.players < 2 {
            return Err(CoreError::InvalidOption {
                name: "players",
                details: format!("a duel needs at least 2 players, got {}", options.players),
            });
        }
        let rules = PuyoRules::from_options(&options);
        Ok(Self { options, rules })
    }
}

impl Stepper for PuyoDuelStepper {
    type State = PuyoDuelState;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn options(&self) -> &GameOptions {
        &self.options
    }

    fn initialize_state(&self) -> Result<PuyoDuelState, CoreError> {
        let mut rng = self.options.make_rng();
        let base = PuyoState::from_options(&GameOptions {
            seed: Some(rng.to_words()),
            ..self.options.clone()
        })?;
        let mut children = Vec::with_capacity(self.options.players);
        for _ in 0..self.options.players {
            let mut child = base.clone();
            child.rng = Rng::from_state([rng.step(), rng.step() | 1, rng.step(), rng.step(), 0]);
            children.push(child);
        }
        let mut deals = SharedDeals::new(rng);
        for child in &mut children {
            if child.spawn_free(&self.rules) {
                child.spawn_piece(&self.rules, &mut DealSource::Shared(&mut deals));
            }
        }
        Ok(PuyoDuelState {
            time: 0,
            deals,
            children,
            game_over: false,
            loser: None,
        })
    }

    fn time(&self, state: &PuyoDuelState) -> u64 {
        state.time
    }

    fn validate_event(&self, event: &Event) -> Result<(), CoreError> {
        let cells = self.options.width * (self.options.height + self.options.ghost_rows);
        validate_puyos(event, cells, self.options.num_colors)
    }

    fn step(&self, state: &mut PuyoDuelState, events: &[Event]) -> Vec<Effect> {
        state.time += 1;
        let time = state.time;
        let mut effects = Vec::new();
        if state.game_over {
            for child in &mut state.children {
                child.time = time;
            }
            return effects;
        }

        let players = state.children.len();
        let strays = events
            .iter()
            .filter(|e| e.player.map_or(true, |p| p >= players))
            .count();
        if strays > 0 {
            tracing::warn!(strays, time, "ignored duel events without a valid player");
        }

        let mut outgoing = vec![0u32; players];
        for (player, child) in state.children.iter_mut().enumerate() {
            let mine: Vec<Event> = events
                .iter()
                .filter(|e| e.player == Some(player))
                .cloned()
                .collect();
            let child_effects = step_board(
                &self.rules,
                Variant::Endless,
                child,
                &mine,
                &mut DealSource::Shared(&mut state.deals),
            );
            for effect in child_effects {
                match effect.kind {
                    EffectKind::NuisanceSent { amount } => outgoing[player] += amount,
                    EffectKind::GameOver if !state.game_over => {
                        state.game_over = true;
                        state.loser = Some(player);
                    }
                    _ => {}
                }
                effects.push(effect.with_player(player));
            }
        }

        for (from, amount) in outgoing.into_iter().enumerate() {
            if amount == 0 {
                continue;
            }
            for (to, child) in state.children.iter_mut().enumerate() {
                if to != from {
                    child.nuisance.pending = child.nuisance.pending.saturating_add(amount);
                }
            }
            tracing::debug!(from, amount, time, "nuisance forwarded to opponents");
        }
        effects
    }

    fn call(
        &self,
        state: &PuyoDuelState,
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
        board_call(Self::NAME, &self.rules, Variant::Endless, child, operation, args)
    }
}
