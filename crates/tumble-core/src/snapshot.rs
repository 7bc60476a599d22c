//! Canonical serialization and BLAKE3-hashed snapshots.
//!
//! A [`Snapshot`] is a game state frozen at a tick together with the BLAKE3
//! hex digest of its canonical JSON form. The digest doubles as the
//! determinism check: two peers that agree on every input hold snapshots
//! with identical hashes.
//!
//! Canonical form relies on every state type using ordered containers
//! (`Vec`, `BTreeMap`, `VecDeque`); hash maps never appear in state.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Serialize a value to its canonical JSON text.
///
/// # Panics
///
/// Panics if `value` is not JSON-serializable. State, event and effect types
/// are plain data with string keys, so this only fires on a programming error.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).expect("state types should always be JSON-serializable")
}

/// BLAKE3 hex digest (64 lowercase hex chars) of the canonical JSON form.
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> String {
    blake3::hash(canonical_json(value).as_bytes())
        .to_hex()
        .to_string()
}

/// A game state captured at a tick, with its content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "S: Serialize", deserialize = "S: DeserializeOwned"))]
pub struct Snapshot<S> {
    /// Tick at which the state was captured.
    pub time: u64,
    /// The captured state.
    pub state: S,
    /// BLAKE3 hex digest over `time` and `state`.
    pub hash: String,
}

#[derive(Serialize)]
struct HashableSnapshot<'a, S> {
    time: u64,
    state: &'a S,
}

impl<S: Serialize> Snapshot<S> {
    /// Capture `state` at `time`, computing its hash.
    pub fn capture(time: u64, state: S) -> Self {
        let hash = content_hash(&HashableSnapshot {
            time,
            state: &state,
        });
        Self { time, state, hash }
    }

    /// Recompute the hash from the snapshot's data.
    pub fn recompute_hash(&self) -> String {
        content_hash(&HashableSnapshot {
            time: self.time,
            state: &self.state,
        })
    }

    /// Whether the recorded hash matches the data.
    pub fn is_intact(&self) -> bool {
        self.recompute_hash() == self.hash
    }
}
