//! # Difficulty Retargeting
//!
//! A windowed feedback controller. Difficulty is constant across each
//! 144-block window; when a window closes, the required difficulty for the
//! next window is the old one nudged by the base-2 log of how far observed
//! block production ran ahead of (or behind) the 10-minute target —
//! clamped to ±2 per window, and never below [`MINIMUM_DIFFICULTY`].
//!
//! The log scale matches the puzzle: one extra difficulty bit roughly
//! doubles expected mining work, so a hash rate that doubled deserves a +1.
//!
//! The windowing itself (finding the anchor header that opened the window)
//! lives in the chain engine, which owns the ancestry walks; this module is
//! the pure adjustment rule.

use crate::config::{MINIMUM_DIFFICULTY, RETARGET_WINDOW, TARGET_BLOCK_INTERVAL_NANOS};

/// Compute the difficulty for the window following a just-closed one.
///
/// `window_difficulty` is the difficulty the closing window ran at and
/// `window_nanos` the observed time from the window's anchor block to its
/// last. A non-positive or nonsensical observation leaves difficulty
/// unchanged, except that an instantaneous window counts as maximally fast.
pub fn retarget(window_difficulty: u64, window_nanos: i64) -> u64 {
    let target_nanos = TARGET_BLOCK_INTERVAL_NANOS as f64 * RETARGET_WINDOW as f64;
    let log2_ratio = (target_nanos / window_nanos as f64).log2();

    let adjusted = if log2_ratio.is_nan() {
        window_difficulty
    } else if log2_ratio > 2.0 {
        window_difficulty + 2
    } else if log2_ratio < -2.0 {
        window_difficulty.saturating_sub(2)
    } else if log2_ratio > 0.0 {
        window_difficulty + log2_ratio as u64
    } else {
        window_difficulty.saturating_sub((-log2_ratio) as u64)
    };

    adjusted.max(MINIMUM_DIFFICULTY)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Nanoseconds a window is supposed to take: 144 blocks at 10 minutes.
    const TARGET_WINDOW_NANOS: i64 = TARGET_BLOCK_INTERVAL_NANOS * RETARGET_WINDOW as i64;

    #[test]
    fn on_schedule_window_is_unchanged() {
        assert_eq!(retarget(100, TARGET_WINDOW_NANOS), 100);
    }

    #[test]
    fn much_too_fast_gains_two() {
        // A window finished in a hundredth of the target time.
        assert_eq!(retarget(100, TARGET_WINDOW_NANOS / 100), 102);
    }

    #[test]
    fn instantaneous_window_gains_two() {
        assert_eq!(retarget(100, 0), 102);
    }

    #[test]
    fn moderately_fast_gains_log2() {
        // 3x too fast: log2(3) ~ 1.58, floors to +1.
        assert_eq!(retarget(100, TARGET_WINDOW_NANOS / 3), 101);
        // Exactly 4x too fast sits on the clamp boundary: +2.
        assert_eq!(retarget(100, TARGET_WINDOW_NANOS / 4), 102);
    }

    #[test]
    fn slightly_fast_rounds_to_unchanged() {
        // 1.5x too fast: log2(1.5) ~ 0.58, floors to zero.
        assert_eq!(retarget(100, TARGET_WINDOW_NANOS * 2 / 3), 100);
    }

    #[test]
    fn moderately_slow_loses_log2() {
        // Twice too slow: log2(1/2) = -1.
        assert_eq!(retarget(100, TARGET_WINDOW_NANOS * 2), 99);
    }

    #[test]
    fn much_too_slow_loses_two() {
        // Eight times too slow would be -3; the clamp holds it at -2.
        assert_eq!(retarget(100, TARGET_WINDOW_NANOS * 8), 98);
    }

    #[test]
    fn never_drops_below_the_floor() {
        assert_eq!(
            retarget(MINIMUM_DIFFICULTY, TARGET_WINDOW_NANOS * 8),
            MINIMUM_DIFFICULTY
        );
        assert_eq!(
            retarget(MINIMUM_DIFFICULTY + 1, TARGET_WINDOW_NANOS * 8),
            MINIMUM_DIFFICULTY
        );
    }

    #[test]
    fn negative_window_is_unchanged() {
        // A window that apparently ended before it began says nothing
        // useful about hash rate.
        assert_eq!(retarget(100, -TARGET_WINDOW_NANOS), 100);
    }
}
