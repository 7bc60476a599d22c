//! The rule-engine interface.
//!
//! A [`Stepper`] is a pure function family over its own state type:
//! `initialize_state` builds the genesis state and `step` advances a state
//! by exactly one tick, mutating it in place and returning the effects the
//! tick produced. Steppers never read wall-clock time or unseeded
//! randomness; all randomness lives in the state's [`Rng`](crate::rng::Rng).

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::effect::Effect;
use crate::event::Event;
use crate::options::GameOptions;
use crate::CoreError;

/// A deterministic tick function for one game family.
pub trait Stepper {
    /// Value-typed game state. Cloning is the deep copy used by the cache.
    type State: Clone + Serialize + DeserializeOwned + Send + 'static;

    /// Stable registry name.
    fn name(&self) -> &'static str;

    /// Options this stepper was built from.
    fn options(&self) -> &GameOptions;

    /// Build the genesis state (tick 0).
    fn initialize_state(&self) -> Result<Self::State, CoreError>;

    /// Tick counter stored inside `state`.
    fn time(&self, state: &Self::State) -> u64;

    /// Reject malformed events before they enter the log.
    ///
    /// Illegal-but-well-formed actions are accepted here and ignored by
    /// [`step`](Self::step).
    fn validate_event(&self, event: &Event) -> Result<(), CoreError>;

    /// Advance `state` by one tick, applying `events` (all addressed to the
    /// new tick) in canonical order.
    fn step(&self, state: &mut Self::State, events: &[Event]) -> Vec<Effect>;

    /// Rebuild transient caches after a state was deserialized.
    fn restore(&self, _state: &mut Self::State) {}

    /// Stepper-specific predicates (`canStep`, `canAdd`, `canPlay`, ...).
    fn call(
        &self,
        state: &Self::State,
        operation: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value, CoreError>;
}

/// Sort events into the canonical per-tick order.
///
/// This order, not arrival order, decides how simultaneous events apply.
pub fn sort_events(events: &[Event]) -> Vec<&Event> {
    let mut sorted: Vec<(_, &Event)> = events.iter().map(|e| (e.sort_key(), e)).collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted.into_iter().map(|(_, e)| e).collect()
}

/// Build the error returned for an unsupported `call` operation.
pub fn unknown_operation(stepper: &str, operation: &str) -> CoreError {
    CoreError::UnknownOperation {
        stepper: stepper.to_owned(),
        operation: operation.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn sort_ignores_arrival_order() {
        let a = Event::new(1, EventKind::Swap { index: 4 });
        let b = Event::new(1, EventKind::AddRow);
        let c = Event::new(1, EventKind::Swap { index: 2 });
        let forward_input = [a.clone(), b.clone(), c.clone()];
        let backward_input = [c, b, a];
        let forward = sort_events(&forward_input);
        let backward = sort_events(&backward_input);
        assert_eq!(forward, backward);
        assert_eq!(forward[0].kind, EventKind::AddRow);
        assert_eq!(forward[1].kind, EventKind::Swap { index: 2 });
    }

    #[test]
    fn players_break_ties_before_payload() {
        let p1 = Event::for_player(1, 1, EventKind::Swap { index: 0 });
        let p0 = Event::for_player(1, 0, EventKind::Swap { index: 9 });
        let input = [p1, p0];
        let sorted = sort_events(&input);
        assert_eq!(sorted[0].player, Some(0));
    }
}
