//! Property tests: the final state depends only on the set of events, never
//! on the order or the moment they reach the engine.

use proptest::prelude::*;
use tumble_core::prelude::*;
use tumble_engine::prelude::*;

const TICKS: u64 = 40;

fn engine(cache_size: usize) -> Engine<AnyStepper> {
    Engine::initialize(
        GameOptions {
            stepper_name: "panel-league".to_owned(),
            seed: Some([8, 6, 7, 5, 0]),
            ..Default::default()
        },
        EngineConfig {
            cache_size,
            ..Default::default()
        },
    )
    .unwrap()
}

fn event_strategy() -> impl Strategy<Value = Event> {
    let kind = prop_oneof![
        6 => (0usize..72).prop_map(|index| EventKind::Swap { index }),
        1 => Just(EventKind::AddRow),
        1 => (0i64..4, 1i64..3)
            .prop_map(|(x, height)| EventKind::AddGarbage { x, width: 3, height }),
    ];
    (1..=TICKS, kind).prop_map(|(time, kind)| Event::new(time, kind))
}

/// Events plus, for each, the tick after which it is delivered.
fn schedule_strategy() -> impl Strategy<Value = Vec<(Event, u64)>> {
    prop::collection::vec((event_strategy(), 0..=TICKS), 0..24)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn delivery_order_never_changes_the_outcome(
        schedule in schedule_strategy(),
        cache_size in 1usize..12,
    ) {
        let mut reference = engine(256);
        for (event, _) in &schedule {
            reference.add_event(event.clone()).unwrap();
        }
        for _ in 0..TICKS {
            reference.step().unwrap();
        }

        let mut late = engine(cache_size);
        let mut by_arrival = schedule.clone();
        by_arrival.sort_by_key(|(_, arrival)| *arrival);
        let mut arrivals = by_arrival.into_iter().peekable();
        for now in 0..TICKS {
            while let Some((event, _)) = arrivals.next_if(|(_, at)| *at <= now) {
                late.add_event(event).unwrap();
            }
            late.step().unwrap();
        }
        for (event, _) in arrivals {
            late.add_event(event).unwrap();
        }

        prop_assert_eq!(late.state_hash().unwrap(), reference.state_hash().unwrap());
        let late_log: Vec<Event> = late.events().cloned().collect();
        let reference_log: Vec<Event> = reference.events().cloned().collect();
        prop_assert_eq!(late_log, reference_log);
    }

    #[test]
    fn reversed_submission_yields_the_same_log_and_state(schedule in schedule_strategy()) {
        let mut forward = engine(16);
        let mut backward = engine(16);
        for (event, _) in &schedule {
            forward.add_event(event.clone()).unwrap();
        }
        for (event, _) in schedule.iter().rev() {
            backward.add_event(event.clone()).unwrap();
        }
        for _ in 0..TICKS {
            forward.step().unwrap();
            backward.step().unwrap();
        }
        prop_assert_eq!(forward.export_state().events, backward.export_state().events);
        prop_assert_eq!(forward.state_hash().unwrap(), backward.state_hash().unwrap());
    }
}
