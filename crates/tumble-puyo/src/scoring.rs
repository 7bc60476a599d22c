//! Group-clear scoring tables.
//!
//! A clear scores `10 * cleared * bonus`, where the bonus sums the chain
//! power of the current link, a bonus for the number of distinct colors and
//! a per-group size bonus, clamped to `[1, MAX_BONUS]`.

use crate::grid::Group;

/// Chain power indexed by `chain - 1`; later links reuse the last entry.
pub const CHAIN_POWER: [u64; 19] = [
    0, 8, 16, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 480, 512,
];

/// Bonus indexed by `distinct colors - 1`.
pub const COLOR_BONUS: [u64; 5] = [0, 3, 6, 12, 24];

/// Bonus indexed by group size; larger groups reuse the last entry.
pub const GROUP_BONUS: [u64; 12] = [0, 0, 0, 0, 0, 2, 3, 4, 5, 6, 7, 10];

pub const MAX_BONUS: u64 = 999;

fn capped(table: &[u64], index: usize) -> u64 {
    table[index.min(table.len() - 1)]
}

/// Score for clearing `groups` as link `chain` (first link is 1).
pub fn clear_score(chain: u32, groups: &[Group]) -> u64 {
    if groups.is_empty() {
        return 0;
    }
    let cleared: usize = groups.iter().map(|g| g.indices.len()).sum();
    let mut colors: Vec<u8> = groups.iter().map(|g| g.color).collect();
    colors.sort_unstable();
    colors.dedup();

    let bonus = capped(&CHAIN_POWER, chain.saturating_sub(1) as usize)
        + capped(&COLOR_BONUS, colors.len() - 1)
        + groups
            .iter()
            .map(|g| capped(&GROUP_BONUS, g.indices.len()))
            .sum::<u64>();
    10 * cleared as u64 * bonus.clamp(1, MAX_BONUS)
}
