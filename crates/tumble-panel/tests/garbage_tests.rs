//! Garbage slab lifecycle: falling, landing, shock, release.

use tumble_core::prelude::*;
use tumble_panel::prelude::*;

fn empty_board(garbage_flash_time: u32) -> (PanelStepper, PanelState) {
    let stepper = PanelStepper::new(GameOptions {
        width: 6,
        height: 12,
        initial_rows: 0,
        garbage_flash_time,
        seed: Some([5, 6, 7, 8, 0]),
        ..Default::default()
    })
    .unwrap();
    let state = stepper.initialize_state().unwrap();
    (stepper, state)
}

fn drop_slab(
    stepper: &PanelStepper,
    state: &mut PanelState,
    width: i64,
    height: i64,
) -> Vec<Effect> {
    let t = state.time + 1;
    let mut effects = stepper.step(
        state,
        &[Event::new(t, EventKind::AddGarbage { x: 0, width, height })],
    );
    for _ in 0..20 {
        effects.extend(stepper.step(state, &[]));
    }
    effects
}

/// Step until a slab releases; returns the tick and released indices.
fn run_until_release(stepper: &PanelStepper, state: &mut PanelState) -> (u64, Vec<usize>) {
    for _ in 0..100 {
        for effect in stepper.step(state, &[]) {
            if let EffectKind::GarbageReleased { indices, .. } = effect.kind {
                return (effect.time, indices);
            }
        }
    }
    panic!("no garbage released");
}

#[test]
fn slab_falls_one_row_per_tick_and_lands_on_the_floor() {
    let (stepper, mut state) = empty_board(5);
    stepper.step(
        &mut state,
        &[Event::new(1, EventKind::AddGarbage { x: 0, width: 6, height: 1 })],
    );
    assert_eq!(state.garbage[0].y, 0);
    assert!(!state.garbage[0].has_landed());

    let mut landed_at = None;
    for _ in 0..15 {
        for effect in stepper.step(&mut state, &[]) {
            if matches!(effect.kind, EffectKind::GarbageLanded { .. }) {
                landed_at.get_or_insert(effect.time);
            }
        }
    }
    assert_eq!(landed_at, Some(13));
    assert_eq!(state.garbage[0].y, 11);
    assert_eq!(state.garbage[0].colors.len(), 6);
    assert!(state.blocks[66..72].iter().all(Block::is_garbage));
}

#[test]
fn shocked_slab_releases_its_bottom_row_as_chaining_blocks() {
    let (stepper, mut state) = empty_board(5);
    drop_slab(&stepper, &mut state, 6, 1);
    assert!(state.garbage[0].has_landed());

    for i in 60..63 {
        state.blocks[i] = Block::with_color(0);
    }
    let shock_tick = state.time + 1;
    let (time, indices) = run_until_release(&stepper, &mut state);

    assert_eq!(time, shock_tick + 5);
    assert_eq!(indices, (66..72).collect::<Vec<_>>());
    assert!(state.garbage.is_empty());
    for i in 66..72 {
        let block = &state.blocks[i];
        assert!(block.color.is_some());
        assert!(block.chaining);
        assert!(!block.is_garbage());
    }
}

#[test]
fn tall_slab_shrinks_by_one_row() {
    let (stepper, mut state) = empty_board(3);
    drop_slab(&stepper, &mut state, 6, 2);
    assert_eq!(state.garbage[0].y, 10);

    for i in 54..57 {
        state.blocks[i] = Block::with_color(1);
    }
    let (_, indices) = run_until_release(&stepper, &mut state);

    assert_eq!(indices, (66..72).collect::<Vec<_>>());
    let slab = &state.garbage[0];
    assert_eq!(slab.height, 1);
    assert_eq!(slab.y, 10);
    assert!(slab.has_landed());
    assert!(!slab.is_flashing());
}

#[test]
fn falling_slab_is_not_shocked() {
    let (stepper, mut state) = empty_board(5);
    for i in 66..69 {
        state.blocks[i] = Block::with_color(2);
    }
    stepper.step(
        &mut state,
        &[Event::new(1, EventKind::AddGarbage { x: 0, width: 6, height: 1 })],
    );
    assert!(state.garbage.iter().all(|s| !s.is_flashing()));
}

#[test]
fn malformed_garbage_is_rejected() {
    let (stepper, _) = empty_board(5);
    let too_wide = Event::new(1, EventKind::AddGarbage { x: 4, width: 3, height: 1 });
    assert!(matches!(
        stepper.validate_event(&too_wide),
        Err(CoreError::MalformedGarbage { grid_width: 6, .. })
    ));
    let flat = Event::new(1, EventKind::AddGarbage { x: 0, width: 3, height: 0 });
    assert!(stepper.validate_event(&flat).is_err());
    let fine = Event::new(1, EventKind::AddGarbage { x: 3, width: 3, height: 2 });
    assert!(stepper.validate_event(&fine).is_ok());
}

#[test]
fn extreme_slab_geometry_is_rejected_not_overflowed() {
    let (stepper, _) = empty_board(5);
    for kind in [
        EventKind::AddGarbage { x: i64::MAX, width: 1, height: 1 },
        EventKind::AddGarbage { x: 1, width: i64::MAX, height: 1 },
        EventKind::AddGarbage { x: 0, width: 6, height: i64::MAX },
        EventKind::AddGarbage { x: 0, width: 6, height: 13 },
    ] {
        assert!(
            matches!(
                stepper.validate_event(&Event::new(1, kind.clone())),
                Err(CoreError::MalformedGarbage { grid_width: 6, grid_height: 12, .. })
            ),
            "{kind:?}"
        );
    }
    let full_height = Event::new(1, EventKind::AddGarbage { x: 0, width: 6, height: 12 });
    assert!(stepper.validate_event(&full_height).is_ok());
}

#[test]
fn unvalidated_oversized_slabs_are_ignored_by_step() {
    let (stepper, mut state) = empty_board(5);
    let huge = EventKind::AddGarbage { x: 0, width: 6, height: i64::MAX };
    stepper.step(&mut state, &[Event::new(1, huge.clone()), Event::new(1, huge)]);
    assert!(state.garbage.is_empty());
    stepper.step(&mut state, &[]);
    assert_eq!(state.time, 2);
}

#[test]
fn add_row_lifts_resting_garbage() {
    let (stepper, mut state) = empty_board(5);
    drop_slab(&stepper, &mut state, 3, 1);
    assert_eq!(state.garbage[0].y, 11);

    let t = state.time + 1;
    stepper.step(&mut state, &[Event::new(t, EventKind::AddRow)]);
    assert_eq!(state.garbage[0].y, 10);
    assert!(state.blocks[60].is_garbage());
    assert!(!state.blocks[66].is_empty());
}
