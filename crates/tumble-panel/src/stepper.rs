//! The match-grid tick pipeline.
//!
//! Each call to [`step_board`] runs the stages below in a fixed order; every
//! stage sees the whole grid as left by the previous one:
//!
//! 1. swap-timer decay
//! 2. event application (canonical order)
//! 3. garbage gravity
//! 4. grid gravity
//! 5. match detection
//! 6. garbage shock
//! 7. garbage release
//! 8. chain propagation
//! 9. timer and effect resolution
//!
//! [`PanelStepper`] wraps the pipeline as the standard single-board rule set.

use std::collections::VecDeque;

use tumble_core::effect::{Effect, EffectKind};
use tumble_core::event::{Event, EventKind};
use tumble_core::options::GameOptions;
use tumble_core::stepper::{sort_events, unknown_operation, Stepper};
use tumble_core::CoreError;

use crate::block::Block;
use crate::state::PanelState;

// ---------------------------------------------------------------------------
// PanelRules
// ---------------------------------------------------------------------------

/// Timing constants extracted from [`GameOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelRules {
    pub flash_time: i32,
    pub float_time: i32,
    pub swap_time: i32,
    pub garbage_flash_time: i32,
    pub num_colors: u8,
    pub refill_rows: usize,
}

impl PanelRules {
    pub fn from_options(options: &GameOptions) -> Self {
        Self {
            flash_time: options.flash_time as i32,
            float_time: options.float_time as i32,
            swap_time: options.swap_time as i32,
            garbage_flash_time: options.garbage_flash_time.max(1) as i32,
            num_colors: options.block_types.len() as u8,
            refill_rows: if options.initial_rows == 0 {
                options.height / 2
            } else {
                options.initial_rows
            },
        }
    }
}

/// Reject slabs that cannot fit a `grid_width` x `grid_height` board.
pub fn validate_garbage(
    event: &Event,
    grid_width: usize,
    grid_height: usize,
) -> Result<(), CoreError> {
    if let EventKind::AddGarbage { x, width, height } = event.kind {
        check_slab(x, width, height, grid_width, grid_height)?;
    }
    Ok(())
}

/// A slab must lie inside the columns and be no taller than the board.
fn check_slab(
    x: i64,
    width: i64,
    height: i64,
    grid_width: usize,
    grid_height: usize,
) -> Result<(), CoreError> {
    let inside = x >= 0
        && width >= 1
        && x.checked_add(width).is_some_and(|right| right <= grid_width as i64);
    if inside && (1..=grid_height as i64).contains(&height) {
        return Ok(());
    }
    Err(CoreError::MalformedGarbage {
        x,
        width,
        height,
        grid_width,
        grid_height,
    })
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Advance one board by one tick. `events` must already be addressed to
/// this board; they are sorted here.
pub fn step_board(rules: &PanelRules, state: &mut PanelState, events: &[Event]) -> Vec<Effect> {
    state.time += 1;
    let time = state.time;
    let mut effects = Vec::new();
    state.rebuild_cover();

    if state.game_over {
        return effects;
    }

    decay_swap_timers(state);

    for event in sort_events(events) {
        apply_event(rules, state, &event.kind, &mut effects);
        if state.game_over {
            break;
        }
    }

    if !state.game_over {
        garbage_gravity(rules, state, &mut effects);
        grid_gravity(rules, state, &mut effects);
        detect_matches(state);
        let shocked = shock_garbage(rules, state);
        let released = release_garbage(rules, state, &shocked, &mut effects);
        propagate_chains(state);
        resolve(rules, state, &released, &mut effects);
    }

    for block in &mut state.blocks {
        block.clear_transient();
    }
    for effect in &mut effects {
        effect.time = time;
    }
    effects
}

fn emit(effects: &mut Vec<Effect>, kind: EffectKind) {
    // Time is stamped once the tick finishes.
    effects.push(Effect::new(0, kind));
}

// -- 1. swap-timer decay ----------------------------------------------------

fn decay_swap_timers(state: &mut PanelState) {
    for block in &mut state.blocks {
        block.swap_timer -= block.swap_timer.signum();
    }
}

// -- 2. events ----------------------------------------------------------------

fn apply_event(
    rules: &PanelRules,
    state: &mut PanelState,
    kind: &EventKind,
    effects: &mut Vec<Effect>,
) {
    match kind {
        EventKind::ClearAll => {
            state.blocks.iter_mut().for_each(|b| *b = Block::default());
            state.garbage.clear();
            state.chain_number = 0;
        }
        EventKind::Refill => {
            if state.is_cleared() {
                state.fill_bottom_rows(rules.refill_rows, rules.num_colors);
            }
        }
        EventKind::AddGarbage { x, width, height } => {
            if check_slab(*x, *width, *height, state.width, state.height).is_ok() {
                state.push_garbage(*x, *width, *height);
                state.rebuild_cover();
            } else {
                tracing::warn!(x, width, height, "ignoring a slab that does not fit the board");
            }
        }
        EventKind::AddRow => add_row(rules, state, effects),
        EventKind::Swap { index } => swap(rules, state, *index),
        _ => {}
    }
}

fn add_row(rules: &PanelRules, state: &mut PanelState, effects: &mut Vec<Effect>) {
    if !state.top_row_empty() {
        state.game_over = true;
        emit(effects, EffectKind::GameOver);
        return;
    }
    let w = state.width;
    state.blocks.drain(..w);
    state
        .blocks
        .extend(state.next_row.iter().map(|&c| Block::with_color(c)));
    for slab in &mut state.garbage {
        slab.y -= 1;
    }
    state.rebuild_cover();

    // The preview was generated against an older board; runs it forces now
    // are not the player's doing and must not score.
    let bottom_start = w * (state.height - 1);
    let forced: Vec<usize> = state
        .find_runs(Block::can_match)
        .into_iter()
        .filter(|run| run.iter().any(|&i| i >= bottom_start))
        .flatten()
        .collect();
    for i in forced {
        state.blocks[i].prevent_matching = true;
    }
    state.generate_next_row(rules.num_colors);
}

fn swap(rules: &PanelRules, state: &mut PanelState, index: usize) {
    let (x, y) = state.coords(index);
    if index >= state.blocks.len() || x + 1 >= state.width {
        return;
    }
    let (left, right) = (index, index + 1);
    if !state.blocks[left].can_swap() || !state.blocks[right].can_swap() {
        return;
    }
    if state.blocks[left].is_empty() && state.blocks[right].is_empty() {
        return;
    }
    if y > 0 {
        let above_falling =
            |i: usize| !state.blocks[i].is_empty() && state.blocks[i].is_floating();
        if above_falling(left - state.width) || above_falling(right - state.width) {
            return;
        }
    }
    state.blocks.swap(left, right);
    state.blocks[left].swap_timer = rules.swap_time;
    state.blocks[right].swap_timer = -rules.swap_time;
}

// -- 3. garbage gravity -------------------------------------------------------

fn garbage_gravity(rules: &PanelRules, state: &mut PanelState, effects: &mut Vec<Effect>) {
    let mut order: Vec<usize> = (0..state.garbage.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(state.garbage[i].bottom()));

    for i in order {
        if state.garbage[i].is_flashing() {
            continue;
        }
        let slab = &state.garbage[i];
        let below = slab.bottom();
        let blocked = below >= state.height as i64
            || (slab.x..slab.x + slab.width).any(|x| {
                let solid_block = below >= 0
                    && !state.blocks[state.index(x as usize, below as usize)].is_empty();
                let solid_slab = state
                    .garbage
                    .iter()
                    .any(|other| other.id != slab.id && other.contains(x, below));
                solid_block || solid_slab
            });

        if !blocked {
            state.garbage[i].y += 1;
        } else if !state.garbage[i].has_landed() && state.garbage[i].y >= 0 {
            let slab = &mut state.garbage[i];
            slab.sample_colors(&mut state.rng, rules.num_colors);
            tracing::trace!(slab = slab.id, y = slab.y, "garbage slab landed");
            emit(effects, EffectKind::GarbageLanded { slab: slab.id });
        }
    }
    state.rebuild_cover();
}

// -- 4. grid gravity ----------------------------------------------------------

enum Support {
    Grounded,
    Riding { timer: i32, chaining: bool },
    Air,
}

fn grid_gravity(rules: &PanelRules, state: &mut PanelState, effects: &mut Vec<Effect>) {
    let (w, h) = (state.width, state.height);
    for y in (0..h).rev() {
        for x in 0..w {
            let i = x + y * w;
            let block = &state.blocks[i];
            if block.is_empty() || block.is_flashing() || block.is_swapping() {
                continue;
            }
            let support = if y + 1 == h {
                Support::Grounded
            } else {
                let below = &state.blocks[i + w];
                if below.is_garbage() {
                    Support::Grounded
                } else if !below.is_empty() {
                    if below.is_floating() {
                        Support::Riding {
                            timer: below.float_timer,
                            chaining: below.chaining,
                        }
                    } else {
                        Support::Grounded
                    }
                } else if below.is_swapping() {
                    Support::Grounded
                } else {
                    Support::Air
                }
            };

            let block = &mut state.blocks[i];
            match support {
                Support::Grounded => {
                    if block.is_floating() {
                        block.float_timer = -1;
                        emit(effects, EffectKind::BlockLanded { index: i });
                    }
                }
                Support::Riding { timer, chaining } => {
                    if !block.is_floating() && chaining {
                        block.chaining = true;
                    }
                    block.float_timer = timer;
                }
                Support::Air => {
                    if block.float_timer < 0 {
                        block.float_timer = rules.float_time;
                    } else if block.float_timer > 0 {
                        block.float_timer -= 1;
                    }
                    if block.float_timer == 0 {
                        state.blocks.swap(i, i + w);
                    }
                }
            }
        }
    }
}

// -- 5. match detection -------------------------------------------------------

fn detect_matches(state: &mut PanelState) {
    for run in state.find_runs(Block::can_match) {
        for i in run {
            state.blocks[i].matching = true;
        }
    }
}

// -- 6. garbage shock ---------------------------------------------------------

/// Flood from matching blocks into adjacent resting slabs; a shocked slab
/// passes the shock on to slabs touching it. Returns the shocked slab ids.
fn shock_garbage(rules: &PanelRules, state: &mut PanelState) -> Vec<u32> {
    let mut shocked: Vec<u32> = Vec::new();
    let mut queue: VecDeque<usize> = state
        .blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| b.matching)
        .map(|(i, _)| i)
        .collect();
    let mut visited = vec![false; state.blocks.len()];

    while let Some(i) = queue.pop_front() {
        if std::mem::replace(&mut visited[i], true) {
            continue;
        }
        let neighbours: Vec<usize> = state.neighbours(i).collect();
        for n in neighbours {
            let Some(id) = state.blocks[n].slab else {
                continue;
            };
            if shocked.contains(&id) {
                continue;
            }
            let Some(slab) = state.garbage.iter_mut().find(|s| s.id == id) else {
                continue;
            };
            if slab.is_flashing() || !slab.has_landed() {
                continue;
            }
            slab.flash_timer = rules.garbage_flash_time;
            slab.flash_time = rules.garbage_flash_time;
            shocked.push(id);
            queue.extend(slab.grid_cells(state.width, state.height));
        }
    }
    shocked
}

// -- 7. garbage release -------------------------------------------------------

/// Count down flashing slabs and release bottom rows. Returns the indices
/// of blocks created this tick.
fn release_garbage(
    rules: &PanelRules,
    state: &mut PanelState,
    shocked: &[u32],
    effects: &mut Vec<Effect>,
) -> Vec<usize> {
    let mut released = Vec::new();
    let width = state.width;
    for slab in &mut state.garbage {
        if !slab.is_flashing() || shocked.contains(&slab.id) {
            continue;
        }
        slab.flash_timer -= 1;
        if slab.flash_timer > 0 {
            continue;
        }
        let row = slab.bottom() - 1;
        let mut indices = Vec::with_capacity(slab.width as usize);
        if row >= 0 {
            for (k, x) in (slab.x..slab.x + slab.width).enumerate() {
                let i = x as usize + row as usize * width;
                state.blocks[i] = Block {
                    chaining: true,
                    ..Block::with_color(slab.colors[k])
                };
                indices.push(i);
            }
        }
        slab.height -= 1;
        slab.flash_timer = -1;
        if slab.height > 0 {
            slab.sample_colors(&mut state.rng, rules.num_colors);
        }
        emit(
            effects,
            EffectKind::GarbageReleased {
                slab: slab.id,
                indices: indices.clone(),
            },
        );
        released.extend(indices);
    }
    state.garbage.retain(|s| s.height > 0);
    state.rebuild_cover();
    released
}

// -- 8. chain propagation -----------------------------------------------------

fn propagate_chains(state: &mut PanelState) {
    loop {
        let mut changed = false;
        for i in 0..state.blocks.len() {
            let block = &state.blocks[i];
            if !block.matching || block.chaining {
                continue;
            }
            let touches_chain = state.neighbours(i).any(|n| {
                let other = &state.blocks[n];
                other.matching && other.chaining
            });
            if touches_chain {
                state.blocks[i].chaining = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

// -- 9. resolution ------------------------------------------------------------

fn resolve(
    rules: &PanelRules,
    state: &mut PanelState,
    released: &[usize],
    effects: &mut Vec<Effect>,
) {
    let (w, len) = (state.width, state.blocks.len());

    for i in 0..len {
        if released.contains(&i) {
            continue;
        }
        let riding_swap = i + w < len && state.blocks[i + w].is_swapping();
        let block = &mut state.blocks[i];
        if block.chaining
            && !block.is_floating()
            && !block.is_flashing()
            && !block.matching
            && !block.is_swapping()
            && !riding_swap
        {
            block.chaining = false;
        }
    }

    for i in 0..len {
        let block = &mut state.blocks[i];
        if !block.is_flashing() || block.matching {
            continue;
        }
        block.flash_timer -= 1;
        if block.flash_timer > 0 {
            continue;
        }
        *block = Block::default();
        if i >= w {
            let above = &mut state.blocks[i - w];
            if !above.is_empty() && !above.is_flashing() {
                above.chaining = true;
            }
        }
    }

    let matched: Vec<usize> = (0..len).filter(|&i| state.blocks[i].matching).collect();
    if !matched.is_empty() {
        let is_chain = matched.iter().any(|&i| state.blocks[i].chaining);
        for &i in &matched {
            state.blocks[i].flash_timer = rules.flash_time.max(1);
        }
        emit(
            effects,
            EffectKind::MatchMade {
                indices: matched.clone(),
                combo: matched.len(),
            },
        );
        if is_chain {
            state.chain_number += 1;
            emit(
                effects,
                EffectKind::ChainMatchMade {
                    indices: matched,
                    chain: state.chain_number,
                },
            );
        }
    }

    let chain_alive = state.blocks.iter().any(|b| b.chaining);
    if !chain_alive && state.chain_number > 0 {
        emit(
            effects,
            EffectKind::ChainDone {
                chain: state.chain_number,
            },
        );
        state.chain_number = 0;
    }
}

// ---------------------------------------------------------------------------
// PanelStepper
// ---------------------------------------------------------------------------

/// Standard single-board match-grid rules.
#[derive(Debug, Clone)]
pub struct PanelStepper {
    options: GameOptions,
    rules: PanelRules,
}

impl PanelStepper {
    pub const NAME: &'static str = "panel-league";

    pub fn new(options: GameOptions) -> Result<Self, CoreError> {
        options.validate()?;
        let rules = PanelRules::from_options(&options);
        Ok(Self { options, rules })
    }

    pub fn rules(&self) -> &PanelRules {
        &self.rules
    }
}

/// Predicates shared by every match-grid variant.
pub(crate) fn board_call(
    stepper: &str,
    state: &PanelState,
    operation: &str,
) -> Result<serde_json::Value, CoreError> {
    match operation {
        "canStep" => Ok(serde_json::Value::Bool(!state.game_over)),
        "canAdd" => Ok(serde_json::Value::Bool(
            !state.game_over && state.top_row_empty(),
        )),
        _ => Err(unknown_operation(stepper, operation)),
    }
}

impl Stepper for PanelStepper {
    type State = PanelState;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn options(&self) -> &GameOptions {
        &self.options
    }

    fn initialize_state(&self) -> Result<PanelState, CoreError> {
        PanelState::from_options(&self.options)
    }

    fn time(&self, state: &PanelState) -> u64 {
        state.time
    }

    fn validate_event(&self, event: &Event) -> Result<(), CoreError> {
        validate_garbage(event, self.options.width, self.options.height)
    }

    fn step(&self, state: &mut PanelState, events: &[Event]) -> Vec<Effect> {
        step_board(&self.rules, state, events)
    }

    fn restore(&self, state: &mut PanelState) {
        state.rebuild_cover();
    }

    fn call(
        &self,
        state: &PanelState,
        operation: &str,
        _args: &serde_json::Value,
    ) -> Result<serde_json::Value, CoreError> {
        board_call(Self::NAME, state, operation)
    }
}
