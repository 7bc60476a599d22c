//! Portable deterministic random number generator.
//!
//! [`Rng`] is a JKISS-style generator: a 32-bit xorshift register combined
//! with an add-with-carry lag and a Weyl increment. The whole state is five
//! `u32` words (`x, y, z, w, c`) and the step function uses only wrapping
//! integer arithmetic, so every peer produces the same sequence regardless of
//! platform.
//!
//! Every random decision made by a stepper (new row colors, garbage colors,
//! deals) goes through [`Rng::step`] or [`Rng::below`]. The only
//! non-deterministic entry point is [`Rng::scramble`], used once when a
//! genesis state is created without an explicit seed.

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Largest value returned by [`Rng::step`] (`2^31 - 1`).
pub const MAX_VALUE: u32 = 0x7fff_ffff;

const WEYL_INCREMENT: u32 = 1_411_392_427;

/// Five-word generator state. Serializes as a plain struct so that it
/// travels inside every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rng {
    x: u32,
    y: u32,
    z: u32,
    w: u32,
    c: u32,
}

impl Default for Rng {
    /// The reference seed of the JKISS family.
    fn default() -> Self {
        Self {
            x: 123_456_789,
            y: 234_567_891,
            z: 345_678_912,
            w: 456_789_123,
            c: 0,
        }
    }
}

impl Rng {
    /// Build a generator from raw words.
    ///
    /// The xorshift register must never be zero; a zero `y` is replaced by
    /// the reference value so that the generator cannot get stuck.
    pub fn from_state(words: [u32; 5]) -> Self {
        let [x, y, z, w, c] = words;
        Self {
            x,
            y: if y == 0 { Self::default().y } else { y },
            z,
            w: w & MAX_VALUE,
            c: c & 1,
        }
    }

    /// Seed from the operating system. Used once per genesis state and never
    /// during stepping.
    pub fn scramble() -> Self {
        let words: [u32; 5] = rand::random();
        let rng = Self::from_state(words);
        tracing::debug!(state = ?rng.to_words(), "scrambled rng state");
        rng
    }

    /// Advance the generator and return a value in `[0, MAX_VALUE]`.
    pub fn step(&mut self) -> u32 {
        self.y ^= self.y << 5;
        self.y ^= self.y >> 7;
        self.y ^= self.y << 22;

        let t = self.z.wrapping_add(self.w).wrapping_add(self.c);
        self.z = self.w;
        self.c = t >> 31;
        self.w = t & MAX_VALUE;

        self.x = self.x.wrapping_add(WEYL_INCREMENT);

        self.x.wrapping_add(self.y).wrapping_add(self.w) & MAX_VALUE
    }

    /// Draw a value in `[0, n)` via `step() % n`. Returns 0 when `n` is 0.
    pub fn below(&mut self, n: u32) -> u32 {
        if n == 0 {
            return 0;
        }
        self.step() % n
    }

    /// The complete state as five words.
    pub fn to_words(&self) -> [u32; 5] {
        [self.x, self.y, self.z, self.w, self.c]
    }

    /// Restore a generator from [`to_words`](Self::to_words) output.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Serialization`] if `words` does not hold exactly
    /// five values or carries an impossible state.
    pub fn from_words(words: &[u32]) -> Result<Self, CoreError> {
        let words: [u32; 5] = words.try_into().map_err(|_| CoreError::Serialization {
            what: "rng state",
            details: format!("expected 5 words, got {}", words.len()),
        })?;
        if words[1] == 0 || words[3] > MAX_VALUE || words[4] > 1 {
            return Err(CoreError::Serialization {
                what: "rng state",
                details: format!("state {words:?} is outside the generator's range"),
            });
        }
        Ok(Self::from_state(words))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
