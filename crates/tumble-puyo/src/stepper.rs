//! The group-clear tick pipeline and the single-board steppers.
//!
//! [`step_board`] runs, in order:
//!
//! 1. event application (canonical order)
//! 2. gravity to a fixed point
//! 3. vanish-row trim
//! 4. group extraction, clearing and scoring
//! 5. when nothing cleared: chain end, nuisance exchange, game-over check
//!    and piece spawn
//!
//! Two variants share the pipeline: `puyo` takes `addPuyos` anywhere, and
//! `puyo-endless` steers pieces dealt from a queue.

use tumble_core::effect::{Effect, EffectKind};
use tumble_core::event::{Event, EventKind, PlacedPuyo};
use tumble_core::options::GameOptions;
use tumble_core::stepper::{sort_events, unknown_operation, Stepper};
use tumble_core::CoreError;

use crate::grid::Cell;
use crate::scoring::clear_score;
use crate::state::{DealSource, PuyoRules, PuyoState};

/// Which group-clear rule set a board follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Puyos arrive only through `addPuyos`.
    Basic,
    /// Pieces come from the deal queue and are steered by the player.
    Endless,
}

impl Variant {
    pub fn has_pieces(self) -> bool {
        self == Variant::Endless
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Advance one board by one tick.
pub fn step_board(
    rules: &PuyoRules,
    variant: Variant,
    state: &mut PuyoState,
    events: &[Event],
    source: &mut DealSource<'_>,
) -> Vec<Effect> {
    state.time += 1;
    let time = state.time;
    let mut effects = Vec::new();
    if state.game_over {
        return effects;
    }

    for event in sort_events(events) {
        apply_event(rules, variant, state, &event.kind, source);
    }

    for (from, to) in state.grid.settle() {
        effects.push(Effect::new(time, EffectKind::PuyoDropped { from, to }));
    }
    let trimmed = state.grid.trim_vanish_row();
    if !trimmed.is_empty() {
        tracing::trace!(time, ?trimmed, "vanish row trimmed");
    }

    let groups = state.grid.groups(rules.clear_threshold);
    if !groups.is_empty() {
        state.chain += 1;
        let mut indices: Vec<usize> =
            groups.iter().flat_map(|g| g.indices.iter().copied()).collect();
        indices.sort_unstable();
        let nuisance = state.grid.adjacent_nuisance(&indices);
        for &i in indices.iter().chain(&nuisance) {
            state.grid.cells[i] = Cell::Empty;
        }
        let amount = clear_score(state.chain, &groups);
        state.chain_score += amount;
        state.score += amount;
        effects.push(Effect::new(time, EffectKind::GroupCleared { indices, nuisance }));
        effects.push(Effect::new(
            time,
            EffectKind::Score {
                amount,
                total: state.score,
            },
        ));
        return effects;
    }

    // The board is at rest.
    if state.chain > 0 {
        effects.push(Effect::new(time, EffectKind::ChainDone { chain: state.chain }));
        let sent = state.nuisance.send(state.chain_score, rules.target_score);
        if sent > 0 {
            effects.push(Effect::new(time, EffectKind::NuisanceSent { amount: sent }));
        }
        state.chain = 0;
        state.chain_score = 0;
    }

    if state.awaiting_nuisance {
        state.awaiting_nuisance = false;
        let amount = state.nuisance.take(rules.max_nuisance_rows, state.grid.width);
        if amount > 0 {
            let indices = state.drop_nuisance(amount);
            effects.push(Effect::new(time, EffectKind::NuisanceReceived { indices }));
        }
    }

    if variant.has_pieces() && state.piece.is_none() {
        if !state.spawn_free(rules) || !state.spawn_piece(rules, source) {
            state.game_over = true;
            effects.push(Effect::new(time, EffectKind::GameOver));
        }
    }
    effects
}

fn apply_event(
    rules: &PuyoRules,
    variant: Variant,
    state: &mut PuyoState,
    kind: &EventKind,
    source: &mut DealSource<'_>,
) {
    match kind {
        EventKind::ClearAll => {
            state.grid.cells.iter_mut().for_each(|c| *c = Cell::Empty);
            state.nuisance.pending = 0;
            state.chain = 0;
            state.chain_score = 0;
        }
        EventKind::Refill => {
            if state.grid.is_cleared() {
                let (rows, colors, threshold) =
                    (rules.refill_rows, rules.num_colors, rules.clear_threshold);
                state.grid.fill_without_groups(rows, colors, threshold, &mut state.rng);
            }
        }
        EventKind::AddNuisance { amount } => {
            state.nuisance.pending = state.nuisance.pending.saturating_add(*amount);
        }
        EventKind::AddPuyos { blocks } => {
            if check_play(rules, variant, state, blocks).is_err() {
                return;
            }
            for puyo in blocks {
                state.grid.cells[puyo.index] = Cell::Color(puyo.color);
            }
            if variant.has_pieces() {
                advance_deal(rules, state, source);
            }
            state.awaiting_nuisance = true;
        }
        EventKind::MovePiece { dx } => {
            if let Some(next) = state.piece.and_then(|p| p.moved(*dx, &state.grid)) {
                state.piece = Some(next);
            }
        }
        EventKind::RotatePiece { clockwise } => {
            if let Some(next) = state.piece.and_then(|p| p.rotated(*clockwise, &state.grid)) {
                state.piece = Some(next);
            }
        }
        EventKind::DropPiece => {
            let Some(piece) = state.piece else {
                return;
            };
            for puyo in piece.placements(&state.grid) {
                state.grid.cells[puyo.index] = Cell::Color(puyo.color);
            }
            advance_deal(rules, state, source);
            state.awaiting_nuisance = true;
        }
        EventKind::AddGarbage { .. } | EventKind::AddRow | EventKind::Swap { .. } => {
            tracing::trace!(
                event = kind.type_name(),
                "event has no meaning on a group-clear board"
            );
        }
    }
}

/// Retire the front deal and draw a replacement.
fn advance_deal(rules: &PuyoRules, state: &mut PuyoState, source: &mut DealSource<'_>) {
    state.piece = None;
    state.deals.pop_front();
    state.fill_deals(rules, source);
}

/// Whether an `addPuyos` payload is a legal play on this board.
///
/// Endless boards only accept the front deal as two adjacent puyos.
pub fn check_play(
    rules: &PuyoRules,
    variant: Variant,
    state: &PuyoState,
    blocks: &[PlacedPuyo],
) -> Result<(), &'static str> {
    if state.game_over {
        return Err("game over");
    }
    if blocks.is_empty() {
        return Err("no puyos");
    }
    let grid = &state.grid;
    for (k, puyo) in blocks.iter().enumerate() {
        if puyo.index >= grid.cells.len() {
            return Err("index out of range");
        }
        if puyo.color >= rules.num_colors {
            return Err("unknown color");
        }
        if !grid.cells[puyo.index].is_empty() {
            return Err("cell occupied");
        }
        if blocks[..k].iter().any(|other| other.index == puyo.index) {
            return Err("duplicate cell");
        }
    }
    if variant.has_pieces() {
        let [a, b] = blocks else {
            return Err("a play places exactly two puyos");
        };
        let Some(deal) = state.deals.front() else {
            return Err("no deal available");
        };
        if !deal.matches(a.color, b.color) {
            return Err("does not match the next deal");
        }
        if !grid.neighbours(a.index).any(|n| n == b.index) {
            return Err("puyos are not adjacent");
        }
    }
    Ok(())
}

/// Fail fast on payloads that can never be legal on a board of this shape.
pub(crate) fn validate_puyos(event: &Event, cells: usize, num_colors: u8) -> Result<(), CoreError> {
    if let EventKind::AddPuyos { blocks } = &event.kind {
        for puyo in blocks {
            if puyo.index >= cells || puyo.color >= num_colors {
                return Err(CoreError::InvalidArgument {
                    operation: "addPuyos".to_owned(),
                    details: format!(
                        "puyo {{index: {}, color: {}}} does not fit {cells} cells \
                         and {num_colors} colors",
                        puyo.index, puyo.color
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Predicates shared by every group-clear variant.
pub(crate) fn board_call(
    stepper: &str,
    rules: &PuyoRules,
    variant: Variant,
    state: &PuyoState,
    operation: &str,
    args: &serde_json::Value,
) -> Result<serde_json::Value, CoreError> {
    match operation {
        "canStep" => Ok(serde_json::Value::Bool(!state.game_over)),
        "canAdd" => Ok(serde_json::Value::Bool(
            !state.game_over && state.spawn_free(rules),
        )),
        "canPlay" => {
            let blocks: Vec<PlacedPuyo> = args
                .get("blocks")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| CoreError::InvalidArgument {
                    operation: operation.to_owned(),
                    details: e.to_string(),
                })?
                .ok_or_else(|| CoreError::InvalidArgument {
                    operation: operation.to_owned(),
                    details: "expected {\"blocks\": [{\"index\", \"color\"}]}".to_owned(),
                })?;
            let verdict = check_play(rules, variant, state, &blocks);
            Ok(serde_json::json!({
                "ok": verdict.is_ok(),
                "reason": verdict.err(),
            }))
        }
        _ => Err(unknown_operation(stepper, operation)),
    }
}

// ---------------------------------------------------------------------------
// PuyoStepper
// ---------------------------------------------------------------------------

/// Single-board group-clear rules.
#[derive(Debug, Clone)]
pub struct PuyoStepper {
    options: GameOptions,
    rules: PuyoRules,
    variant: Variant,
}

impl PuyoStepper {
    pub const BASIC: &'static str = "puyo";
    pub const ENDLESS: &'static str = "puyo-endless";

    /// Free placement through `addPuyos`.
    pub fn basic(options: GameOptions) -> Result<Self, CoreError> {
        Self::new(options, Variant::Basic)
    }

    /// Dealt pieces steered by the player.
    pub fn endless(options: GameOptions) -> Result<Self, CoreError> {
        Self::new(options, Variant::Endless)
    }

    fn new(options: GameOptions, variant: Variant) -> Result<Self, CoreError> {
        options.validate()?;
        if variant.has_pieces() {
            require_piece_room(&options)?;
        }
        let rules = PuyoRules::from_options(&options);
        Ok(Self {
            options,
            rules,
            variant,
        })
    }

    pub fn rules(&self) -> &PuyoRules {
        &self.rules
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }
}

/// Pieces hover in the two lowest ghost rows.
pub(crate) fn require_piece_room(options: &GameOptions) -> Result<(), CoreError> {
    if options.ghost_rows < 2 {
        return Err(CoreError::InvalidOption {
            name: "ghostRows",
            details: format!("pieces need at least 2 ghost rows, got {}", options.ghost_rows),
        });
    }
    Ok(())
}

impl Stepper for PuyoStepper {
    type State = PuyoState;

    fn name(&self) -> &'static str {
        match self.variant {
            Variant::Basic => Self::BASIC,
            Variant::Endless => Self::ENDLESS,
        }
    }

    fn options(&self) -> &GameOptions {
        &self.options
    }

    fn initialize_state(&self) -> Result<PuyoState, CoreError> {
        let mut state = PuyoState::from_options(&self.options)?;
        if self.variant.has_pieces() && state.spawn_free(&self.rules) {
            state.spawn_piece(&self.rules, &mut DealSource::Own);
        }
        Ok(state)
    }

    fn time(&self, state: &PuyoState) -> u64 {
        state.time
    }

    fn validate_event(&self, event: &Event) -> Result<(), CoreError> {
        let cells = self.options.width * (self.options.height + self.options.ghost_rows);
        validate_puyos(event, cells, self.options.num_colors)
    }

    fn step(&self, state: &mut PuyoState, events: &[Event]) -> Vec<Effect> {
        step_board(&self.rules, self.variant, state, events, &mut DealSource::Own)
    }

    fn call(
        &self,
        state: &PuyoState,
        operation: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value, CoreError> {
        board_call(self.name(), &self.rules, self.variant, state, operation, args)
    }
}
