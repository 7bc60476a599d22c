//! Name-keyed registry of every rule variant.
//!
//! [`AnyStepper`] lets one engine type drive any game family: the variant
//! is picked from `GameOptions::stepper_name` at construction and every
//! [`Stepper`] method dispatches on it. Duel variants are compositions of
//! child boards inside their own crates, not subclasses here.

use serde::{Deserialize, Serialize};
use tumble_core::effect::Effect;
use tumble_core::event::Event;
use tumble_core::options::GameOptions;
use tumble_core::stepper::Stepper;
use tumble_core::CoreError;
use tumble_panel::prelude::{
    PanelDuelState, PanelDuelStepper, PanelState, PanelStepper, ScoringStepper,
};
use tumble_puyo::prelude::{PuyoDuelState, PuyoDuelStepper, PuyoState, PuyoStepper};

/// Every name [`AnyStepper::from_name`] accepts.
pub const STEPPER_NAMES: [&str; 6] = [
    PanelStepper::NAME,
    ScoringStepper::NAME,
    PanelDuelStepper::NAME,
    PuyoStepper::BASIC,
    PuyoStepper::ENDLESS,
    PuyoDuelStepper::NAME,
];

/// One of the registered steppers.
#[derive(Debug, Clone)]
pub enum AnyStepper {
    Panel(PanelStepper),
    PanelScoring(ScoringStepper),
    PanelDuel(PanelDuelStepper),
    /// Both `puyo` and `puyo-endless`.
    Puyo(PuyoStepper),
    PuyoDuel(PuyoDuelStepper),
}

/// State of whichever stepper an [`AnyStepper`] wraps.
///
/// Serialized without a tag so that hashes match the wrapped stepper's own.
/// The four state shapes have disjoint required fields, which keeps the
/// untagged decoding unambiguous.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnyState {
    PanelDuel(PanelDuelState),
    PuyoDuel(PuyoDuelState),
    Panel(PanelState),
    Puyo(PuyoState),
}

impl AnyState {
    /// Tick counter of the wrapped state.
    pub fn time(&self) -> u64 {
        match self {
            AnyState::Panel(s) => s.time,
            AnyState::PanelDuel(s) => s.time,
            AnyState::Puyo(s) => s.time,
            AnyState::PuyoDuel(s) => s.time,
        }
    }
}

impl AnyStepper {
    /// Build the stepper registered under `name`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownStepper`] for unregistered names, or the
    /// stepper's own option validation error.
    pub fn from_name(name: &str, options: GameOptions) -> Result<Self, CoreError> {
        let options = GameOptions {
            stepper_name: name.to_owned(),
            ..options
        };
        let stepper = match name {
            PanelStepper::NAME => Self::Panel(PanelStepper::new(options)?),
            ScoringStepper::NAME => Self::PanelScoring(ScoringStepper::new(options)?),
            PanelDuelStepper::NAME => Self::PanelDuel(PanelDuelStepper::new(options)?),
            PuyoStepper::BASIC => Self::Puyo(PuyoStepper::basic(options)?),
            PuyoStepper::ENDLESS => Self::Puyo(PuyoStepper::endless(options)?),
            PuyoDuelStepper::NAME => Self::PuyoDuel(PuyoDuelStepper::new(options)?),
            _ => {
                return Err(CoreError::UnknownStepper {
                    name: name.to_owned(),
                    known: STEPPER_NAMES.join(", "),
                })
            }
        };
        tracing::debug!(stepper = name, "stepper constructed");
        Ok(stepper)
    }

    /// Build the stepper named by `options.stepper_name`.
    pub fn from_options(options: GameOptions) -> Result<Self, CoreError> {
        let name = options.stepper_name.clone();
        Self::from_name(&name, options)
    }
}

fn mismatch(stepper: &str) -> CoreError {
    CoreError::InvalidArgument {
        operation: "state".to_owned(),
        details: format!("state does not belong to stepper '{stepper}'"),
    }
}

impl Stepper for AnyStepper {
    type State = AnyState;

    fn name(&self) -> &'static str {
        match self {
            Self::Panel(s) => s.name(),
            Self::PanelScoring(s) => s.name(),
            Self::PanelDuel(s) => s.name(),
            Self::Puyo(s) => s.name(),
            Self::PuyoDuel(s) => s.name(),
        }
    }

    fn options(&self) -> &GameOptions {
        match self {
            Self::Panel(s) => s.options(),
            Self::PanelScoring(s) => s.options(),
            Self::PanelDuel(s) => s.options(),
            Self::Puyo(s) => s.options(),
            Self::PuyoDuel(s) => s.options(),
        }
    }

    fn initialize_state(&self) -> Result<AnyState, CoreError> {
        Ok(match self {
            Self::Panel(s) => AnyState::Panel(s.initialize_state()?),
            Self::PanelScoring(s) => AnyState::Panel(s.initialize_state()?),
            Self::PanelDuel(s) => AnyState::PanelDuel(s.initialize_state()?),
            Self::Puyo(s) => AnyState::Puyo(s.initialize_state()?),
            Self::PuyoDuel(s) => AnyState::PuyoDuel(s.initialize_state()?),
        })
    }

    fn time(&self, state: &AnyState) -> u64 {
        state.time()
    }

    fn validate_event(&self, event: &Event) -> Result<(), CoreError> {
        match self {
            Self::Panel(s) => s.validate_event(event),
            Self::PanelScoring(s) => s.validate_event(event),
            Self::PanelDuel(s) => s.validate_event(event),
            Self::Puyo(s) => s.validate_event(event),
            Self::PuyoDuel(s) => s.validate_event(event),
        }
    }

    fn step(&self, state: &mut AnyState, events: &[Event]) -> Vec<Effect> {
        match (self, state) {
            (Self::Panel(s), AnyState::Panel(state)) => s.step(state, events),
            (Self::PanelScoring(s), AnyState::Panel(state)) => s.step(state, events),
            (Self::PanelDuel(s), AnyState::PanelDuel(state)) => s.step(state, events),
            (Self::Puyo(s), AnyState::Puyo(state)) => s.step(state, events),
            (Self::PuyoDuel(s), AnyState::PuyoDuel(state)) => s.step(state, events),
            _ => {
                tracing::error!(stepper = self.name(), "refusing to step a foreign state");
                Vec::new()
            }
        }
    }

    fn restore(&self, state: &mut AnyState) {
        match (self, state) {
            (Self::Panel(s), AnyState::Panel(state)) => s.restore(state),
            (Self::PanelScoring(s), AnyState::Panel(state)) => s.restore(state),
            (Self::PanelDuel(s), AnyState::PanelDuel(state)) => s.restore(state),
            (Self::Puyo(s), AnyState::Puyo(state)) => s.restore(state),
            (Self::PuyoDuel(s), AnyState::PuyoDuel(state)) => s.restore(state),
            _ => tracing::error!(stepper = self.name(), "refusing to restore a foreign state"),
        }
    }

    fn call(
        &self,
        state: &AnyState,
        operation: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value, CoreError> {
        match (self, state) {
            (Self::Panel(s), AnyState::Panel(state)) => s.call(state, operation, args),
            (Self::PanelScoring(s), AnyState::Panel(state)) => s.call(state, operation, args),
            (Self::PanelDuel(s), AnyState::PanelDuel(state)) => s.call(state, operation, args),
            (Self::Puyo(s), AnyState::Puyo(state)) => s.call(state, operation, args),
            (Self::PuyoDuel(s), AnyState::PuyoDuel(state)) => s.call(state, operation, args),
            _ => Err(mismatch(self.name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tumble_core::snapshot::content_hash;

    fn options() -> GameOptions {
        GameOptions {
            seed: Some([2, 7, 1, 8, 0]),
            ..Default::default()
        }
    }

    #[test]
    fn every_registered_name_builds() {
        for name in STEPPER_NAMES {
            let stepper = AnyStepper::from_name(name, options()).unwrap();
            assert_eq!(stepper.name(), name);
            assert_eq!(stepper.options().stepper_name, name);
            let state = stepper.initialize_state().unwrap();
            assert_eq!(stepper.time(&state), 0);
        }
    }

    #[test]
    fn unknown_names_list_the_known_ones() {
        let err = AnyStepper::from_name("tetris", options()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("tetris"));
        assert!(message.contains("puyo-duel"));
    }

    #[test]
    fn states_hash_like_the_wrapped_stepper() {
        let any = AnyStepper::from_name("puyo", options()).unwrap();
        let direct = PuyoStepper::basic(options()).unwrap();
        let a = any.initialize_state().unwrap();
        let b = direct.initialize_state().unwrap();
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn untagged_states_decode_to_their_own_variant() {
        for (name, expected) in [
            ("panel-league", "panel"),
            ("panel-league-duel", "panelDuel"),
            ("puyo-endless", "puyo"),
            ("puyo-duel", "puyoDuel"),
        ] {
            let stepper = AnyStepper::from_name(name, options()).unwrap();
            let state = stepper.initialize_state().unwrap();
            let json = serde_json::to_string(&state).unwrap();
            let back: AnyState = serde_json::from_str(&json).unwrap();
            let variant = match back {
                AnyState::Panel(_) => "panel",
                AnyState::PanelDuel(_) => "panelDuel",
                AnyState::Puyo(_) => "puyo",
                AnyState::PuyoDuel(_) => "puyoDuel",
            };
            assert_eq!(variant, expected, "{name}");
            assert_eq!(serde_json::to_string(&back).unwrap(), json);
        }
    }

    #[test]
    fn foreign_states_are_refused() {
        let panel = AnyStepper::from_name("panel-league", options()).unwrap();
        let puyo = AnyStepper::from_name("puyo", options()).unwrap();
        let mut state = puyo.initialize_state().unwrap();
        assert!(panel.step(&mut state, &[]).is_empty());
        assert!(panel.call(&state, "canStep", &serde_json::Value::Null).is_err());
    }
}
