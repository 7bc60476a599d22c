//! Nuisance bookkeeping: converting chain score into nuisance and spreading
//! received nuisance evenly over the columns.

use serde::{Deserialize, Serialize};

/// Per-board nuisance ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NuisanceLedger {
    /// Nuisance owed to this board and not yet dropped.
    pub pending: u32,
    /// Score left over from the last conversion.
    pub leftover_score: u64,
    /// Column where the next partial row starts.
    pub nuisance_x: usize,
}

impl NuisanceLedger {
    /// Convert `score` into nuisance for the opponents.
    ///
    /// The remainder of the division by `target_score` is carried to the
    /// next call. Nuisance this board still owes itself is cancelled first;
    /// the return value is what actually goes out.
    pub fn send(&mut self, score: u64, target_score: u64) -> u32 {
        let total = score + self.leftover_score;
        let target = target_score.max(1);
        self.leftover_score = total % target;
        let amount = u32::try_from(total / target).unwrap_or(u32::MAX);
        let cancelled = amount.min(self.pending);
        self.pending -= cancelled;
        amount - cancelled
    }

    /// Take at most `max_rows` rows worth of pending nuisance.
    pub fn take(&mut self, max_rows: usize, width: usize) -> u32 {
        let cap = u32::try_from(max_rows * width).unwrap_or(u32::MAX);
        let amount = self.pending.min(cap);
        self.pending -= amount;
        amount
    }

    /// How many nuisance puyos each column receives out of `amount`.
    ///
    /// Full rows go everywhere; the remainder is laid left to right from the
    /// cursor, wrapping around, and the cursor moves past it.
    pub fn distribute(&mut self, amount: u32, width: usize) -> Vec<usize> {
        let amount = amount as usize;
        let mut columns = vec![amount / width; width];
        let rest = amount % width;
        for k in 0..rest {
            columns[(self.nuisance_x + k) % width] += 1;
        }
        self.nuisance_x = (self.nuisance_x + rest) % width;
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leftover_score_carries() {
        let mut ledger = NuisanceLedger::default();
        assert_eq!(ledger.send(100, 70), 1);
        assert_eq!(ledger.leftover_score, 30);
        assert_eq!(ledger.send(40, 70), 1);
        assert_eq!(ledger.leftover_score, 0);
    }

    #[test]
    fn pending_is_cancelled_first() {
        let mut ledger = NuisanceLedger {
            pending: 3,
            ..Default::default()
        };
        assert_eq!(ledger.send(350, 70), 2);
        assert_eq!(ledger.pending, 0);

        ledger.pending = 10;
        assert_eq!(ledger.send(140, 70), 0);
        assert_eq!(ledger.pending, 8);
    }

    #[test]
    fn take_caps_rows() {
        let mut ledger = NuisanceLedger {
            pending: 40,
            ..Default::default()
        };
        assert_eq!(ledger.take(5, 6), 30);
        assert_eq!(ledger.pending, 10);
    }

    #[test]
    fn partial_rows_wrap_around() {
        let mut ledger = NuisanceLedger {
            nuisance_x: 4,
            ..Default::default()
        };
        assert_eq!(ledger.distribute(9, 6), vec![2, 1, 1, 1, 2, 2]);
        assert_eq!(ledger.nuisance_x, 1);
        assert_eq!(ledger.distribute(2, 6), vec![0, 1, 1, 0, 0, 0]);
        assert_eq!(ledger.nuisance_x, 3);
    }
}
