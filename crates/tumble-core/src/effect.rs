//! Output effects emitted by steppers.
//!
//! Effects are observable notifications (matches, chains, landings, scores).
//! They are content-addressed: [`Effect::hash`] is the BLAKE3 digest of the
//! canonical JSON form, which lets the engine suppress a second emission of
//! the same effect when a tick is replayed after a rollback.

use serde::{Deserialize, Serialize};

use crate::snapshot::content_hash;

/// Geometry of a garbage slab sent between boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlabShape {
    pub x: i64,
    pub width: i64,
    pub height: i64,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EffectKind {
    /// Blocks started flashing because of a (non-chain) match.
    MatchMade { indices: Vec<usize>, combo: usize },
    /// A match that extended the current chain.
    ChainMatchMade { indices: Vec<usize>, chain: u32 },
    /// The current chain ended after `chain` links.
    ChainDone { chain: u32 },
    /// A falling block came to rest.
    BlockLanded { index: usize },
    /// A garbage slab came to rest and sampled its bottom colors.
    GarbageLanded { slab: u32 },
    /// The bottom row of a slab turned into ordinary blocks.
    GarbageReleased { slab: u32, indices: Vec<usize> },
    /// A connected group was removed, with adjacent nuisance.
    GroupCleared { indices: Vec<usize>, nuisance: Vec<usize> },
    /// Points were scored.
    Score { amount: u64, total: u64 },
    /// The board overflowed.
    GameOver,
    /// A puyo moved from one cell to another during gravity.
    PuyoDropped { from: usize, to: usize },
    /// Nuisance was sent to opponents.
    NuisanceSent { amount: u32 },
    /// Nuisance materialised on this board.
    NuisanceReceived { indices: Vec<usize> },
    /// A duel forwarded garbage from one player to another.
    Attack {
        from: usize,
        to: usize,
        slabs: Vec<SlabShape>,
    },
}

impl EffectKind {
    /// Stable wire name, matching the serde tag. Used for subscriptions.
    pub fn type_name(&self) -> &'static str {
        match self {
            EffectKind::MatchMade { .. } => "matchMade",
            EffectKind::ChainMatchMade { .. } => "chainMatchMade",
            EffectKind::ChainDone { .. } => "chainDone",
            EffectKind::BlockLanded { .. } => "blockLanded",
            EffectKind::GarbageLanded { .. } => "garbageLanded",
            EffectKind::GarbageReleased { .. } => "garbageReleased",
            EffectKind::GroupCleared { .. } => "groupCleared",
            EffectKind::Score { .. } => "score",
            EffectKind::GameOver => "gameOver",
            EffectKind::PuyoDropped { .. } => "puyoDropped",
            EffectKind::NuisanceSent { .. } => "nuisanceSent",
            EffectKind::NuisanceReceived { .. } => "nuisanceReceived",
            EffectKind::Attack { .. } => "attack",
        }
    }
}

/// A timestamped effect, optionally attributed to a player.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Effect {
    pub time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<usize>,
    #[serde(flatten)]
    pub kind: EffectKind,
}

impl Effect {
    pub fn new(time: u64, kind: EffectKind) -> Self {
        Self {
            time,
            player: None,
            kind,
        }
    }

    /// Attribute this effect to `player` (used by duel compositions).
    pub fn with_player(mut self, player: usize) -> Self {
        self.player = Some(player);
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// BLAKE3 hex digest of the canonical JSON form.
    pub fn hash(&self) -> String {
        content_hash(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_effects_share_a_hash() {
        let a = Effect::new(4, EffectKind::ChainDone { chain: 2 });
        let b = Effect::new(4, EffectKind::ChainDone { chain: 2 });
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
    }

    #[test]
    fn time_and_player_change_the_hash() {
        let base = Effect::new(4, EffectKind::GameOver);
        assert_ne!(base.hash(), Effect::new(5, EffectKind::GameOver).hash());
        assert_ne!(base.hash(), base.clone().with_player(1).hash());
    }

    #[test]
    fn wire_format_uses_type_tag() {
        let effect = Effect::new(9, EffectKind::Score { amount: 40, total: 40 });
        let json = serde_json::to_value(&effect).unwrap();
        assert_eq!(json["type"], "score");
        assert_eq!(json["amount"], 40);
        assert_eq!(effect.type_name(), "score");
    }
}
