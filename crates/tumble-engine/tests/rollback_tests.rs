//! Integration tests for rollback, cache invalidation and order independence.
//!
//! Every test compares two engines that must agree: one that received its
//! events up front and one that received them late, shuffled or across a
//! cache reset.

use rand::seq::SliceRandom;
use rand::{Rng as _, SeedableRng};
use rand_pcg::Pcg64;
use tumble_core::prelude::*;
use tumble_engine::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn options(name: &str) -> GameOptions {
    GameOptions {
        stepper_name: name.to_owned(),
        seed: Some([12, 34, 56, 78, 0]),
        ..Default::default()
    }
}

fn engine(name: &str, cache_size: usize) -> Engine<AnyStepper> {
    Engine::initialize(
        options(name),
        EngineConfig {
            cache_size,
            ..Default::default()
        },
    )
    .unwrap()
}

/// A random workload of legal-looking events for `name`, ticks 1..=`ticks`.
fn workload(name: &str, ticks: u64, count: usize, seed: u64) -> Vec<Event> {
    let mut rng = Pcg64::seed_from_u64(seed);
    let players = if name.ends_with("duel") { Some(2) } else { None };
    (0..count)
        .map(|_| {
            let time = rng.gen_range(1..=ticks);
            let kind = if name.starts_with("panel") {
                match rng.gen_range(0..10) {
                    0 => EventKind::AddRow,
                    1 => EventKind::AddGarbage {
                        x: rng.gen_range(0..3),
                        width: 3,
                        height: 1,
                    },
                    _ => EventKind::Swap {
                        index: rng.gen_range(0..71),
                    },
                }
            } else {
                match rng.gen_range(0..6) {
                    0 => EventKind::MovePiece {
                        dx: rng.gen_range(-2..=2),
                    },
                    1 => EventKind::RotatePiece {
                        clockwise: rng.gen(),
                    },
                    2 => EventKind::AddNuisance {
                        amount: rng.gen_range(1..8),
                    },
                    _ => EventKind::DropPiece,
                }
            };
            match players {
                Some(n) => Event::for_player(time, rng.gen_range(0..n), kind),
                None => Event::new(time, kind),
            }
        })
        .collect()
}

fn run_up_front(name: &str, events: &[Event], ticks: u64) -> String {
    let mut engine = engine(name, 256);
    for event in events {
        engine.add_event(event.clone()).unwrap();
    }
    for _ in 0..ticks {
        engine.step().unwrap();
    }
    engine.state_hash().unwrap()
}

// ---------------------------------------------------------------------------
// Order independence
// ---------------------------------------------------------------------------

#[test]
fn shuffled_and_late_events_reach_the_same_state() {
    const TICKS: u64 = 60;
    for name in ["panel-league", "panel-league-duel", "puyo-endless", "puyo-duel"] {
        let events = workload(name, TICKS, 40, 99);
        let expected = run_up_front(name, &events, TICKS);

        for shuffle_seed in 0..3 {
            let mut shuffled = events.clone();
            shuffled.shuffle(&mut Pcg64::seed_from_u64(shuffle_seed));

            // Interleave arrivals with steps: each event shows up a random
            // number of ticks after the engine has passed its time.
            let mut rng = Pcg64::seed_from_u64(shuffle_seed + 100);
            let mut late = engine(name, 8);
            let mut pending = shuffled.into_iter().peekable();
            for _ in 0..TICKS {
                late.step().unwrap();
                let arrivals = rng.gen_range(0..3);
                for _ in 0..arrivals {
                    if let Some(event) = pending.next() {
                        late.add_event(event).unwrap();
                    }
                }
            }
            for event in pending {
                late.add_event(event).unwrap();
            }
            assert_eq!(late.time(), TICKS);
            assert_eq!(late.state_hash().unwrap(), expected, "{name} / shuffle {shuffle_seed}");
        }
    }
}

#[test]
fn event_before_the_cache_window_matches_an_engine_that_never_rolled_back() {
    let event = Event::new(3, EventKind::AddRow);

    let mut early = engine("panel-league", 4);
    early.add_event(event.clone()).unwrap();
    for _ in 0..30 {
        early.step().unwrap();
    }

    let mut late = engine("panel-league", 4);
    for _ in 0..30 {
        late.step().unwrap();
    }
    assert_eq!(late.cached_ticks().next(), Some(27));
    late.add_event(event).unwrap();
    assert_eq!(late.last_valid(), 0);
    assert_eq!(late.cached_ticks().collect::<Vec<_>>(), vec![0]);

    assert_eq!(late.state_hash().unwrap(), early.state_hash().unwrap());
    assert_eq!(late.last_valid(), 30);
}

#[test]
fn seeking_backwards_reads_cached_history() {
    let mut engine = engine("puyo-endless", 16);
    engine.add_event(Event::new(1, EventKind::DropPiece)).unwrap();
    for _ in 0..10 {
        engine.step().unwrap();
    }
    let at_four = engine.snapshot_at(4).unwrap();
    engine.set_time(4).unwrap();
    assert_eq!(engine.state_hash().unwrap(), at_four.hash);
    // Seeking does not invalidate anything newer.
    assert_eq!(engine.last_valid(), 10);
    engine.set_time(10).unwrap();
    assert_eq!(engine.current_state().unwrap().time(), 10);
}

#[test]
fn rebase_drops_history_but_keeps_the_future() {
    let mut reference = engine("panel-league", 256);
    let mut rebased = engine("panel-league", 256);
    for engine in [&mut reference, &mut rebased] {
        engine.add_event(Event::new(2, EventKind::AddRow)).unwrap();
        engine.add_event(Event::new(12, EventKind::AddRow)).unwrap();
    }
    for _ in 0..20 {
        reference.step().unwrap();
        rebased.step().unwrap();
    }

    let checkpoint = rebased.snapshot_at(10).unwrap();
    rebased.rebase(checkpoint).unwrap();
    assert_eq!(rebased.genesis().time, 10);
    assert_eq!(rebased.events().count(), 1);
    assert!(matches!(
        rebased.add_event(Event::new(10, EventKind::AddRow)),
        Err(EngineError::StaleEvent { time: 10, genesis: 10 })
    ));

    assert_eq!(rebased.state_hash().unwrap(), reference.state_hash().unwrap());
    for _ in 0..10 {
        reference.step().unwrap();
        rebased.step().unwrap();
    }
    assert_eq!(rebased.state_hash().unwrap(), reference.state_hash().unwrap());
}

#[test]
fn imported_checkpoint_does_not_revive_stale_ticks() {
    let late_row = Event::new(4, EventKind::AddRow);
    let later_row = Event::new(7, EventKind::AddRow);

    let mut peer = engine("panel-league", 256);
    peer.add_event(late_row.clone()).unwrap();
    for _ in 0..10 {
        peer.step().unwrap();
    }
    let checkpoint = peer.export_cache().unwrap();

    let mut engine = engine("panel-league", 256);
    for _ in 0..6 {
        engine.step().unwrap();
    }
    engine.add_event(late_row.clone()).unwrap();
    assert_eq!(engine.last_valid(), 3);
    engine.import_cache(checkpoint).unwrap();
    assert_eq!(engine.cached_ticks().collect::<Vec<_>>(), vec![0, 1, 2, 3, 10]);
    assert_eq!(engine.last_valid(), 10);

    engine.add_event(later_row.clone()).unwrap();
    assert_eq!(engine.last_valid(), 0);

    let mut reference = engine_with(&[late_row, later_row], 10);
    assert_eq!(engine.state_hash().unwrap(), reference.state_hash().unwrap());
    assert_eq!(
        engine.snapshot_at(5).unwrap().hash,
        reference.snapshot_at(5).unwrap().hash
    );
}

fn engine_with(events: &[Event], ticks: u64) -> Engine<AnyStepper> {
    let mut engine = engine("panel-league", 256);
    for event in events {
        engine.add_event(event.clone()).unwrap();
    }
    for _ in 0..ticks {
        engine.step().unwrap();
    }
    engine
}

#[test]
fn malformed_garbage_is_refused_before_logging() {
    let mut engine = engine("panel-league", 16);
    for kind in [
        EventKind::AddGarbage { x: 4, width: 5, height: 1 },
        EventKind::AddGarbage { x: i64::MAX, width: 1, height: 1 },
        EventKind::AddGarbage { x: 0, width: 3, height: i64::MAX },
    ] {
        let err = engine.add_event(Event::new(1, kind)).unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::MalformedGarbage { .. })));
    }
    assert_eq!(engine.events().count(), 0);
    assert_eq!(engine.step().unwrap().time(), 1);
}

#[test]
fn out_of_range_swaps_are_logged_and_ignored() {
    let mut reference = engine("panel-league", 16);
    let mut engine = engine("panel-league", 16);
    engine
        .add_event(Event::new(2, EventKind::Swap { index: usize::MAX }))
        .unwrap();
    for _ in 0..5 {
        engine.step().unwrap();
        reference.step().unwrap();
    }
    assert_eq!(engine.state_hash().unwrap(), reference.state_hash().unwrap());
}

#[test]
fn call_stepper_answers_for_the_current_tick() {
    let mut engine = engine("puyo-duel", 16);
    assert_eq!(
        engine.call_stepper("canStep", &serde_json::Value::Null).unwrap(),
        serde_json::Value::Bool(true)
    );
    let can_add = engine
        .call_stepper("canAdd", &serde_json::json!({"player": 1}))
        .unwrap();
    assert_eq!(can_add, serde_json::Value::Bool(true));
    assert!(matches!(
        engine.call_stepper("teleport", &serde_json::json!({"player": 0})),
        Err(EngineError::Core(CoreError::UnknownOperation { .. }))
    ));
}
