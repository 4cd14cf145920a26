//! Pure typing metrics: position, correctness, WPM and accuracy derived from
//! the typed stream against the canonical text. No state, no clocks.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Standard typing convention: five characters count as one word.
pub const CHARS_PER_WORD: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CharCounts {
    pub correct: usize,
    pub incorrect: usize,
    pub total: usize,
}

/// Per-round result, computed once at the finished transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceResult {
    pub wpm: u16,
    pub raw_wpm: u16,
    pub accuracy: f64,
    pub correct_chars: usize,
    pub incorrect_chars: usize,
    pub total_chars: usize,
}

/// Largest `k` such that `typed[0..k)` equals `canonical[0..k)`, char-wise.
///
/// The first mismatch freezes the position: later coincidental matches do not
/// advance it. Errors must be erased before the cursor moves on.
pub fn prefix_position(typed: &str, canonical: &str) -> usize {
    typed
        .chars()
        .zip(canonical.chars())
        .take_while(|(t, c)| t == c)
        .count()
}

/// Indices of typed characters that do not match the canonical text.
/// Characters typed beyond the canonical length always count as wrong.
pub fn wrong_indices(typed: &str, canonical: &str) -> Vec<usize> {
    let mut canon = canonical.chars();
    typed
        .chars()
        .enumerate()
        .filter_map(|(i, t)| match canon.next() {
            Some(c) if c == t => None,
            _ => Some(i),
        })
        .collect()
}

/// Per-index comparison over everything typed so far.
pub fn char_counts(typed: &str, canonical: &str) -> CharCounts {
    let mut canon = canonical.chars();
    let mut counts = CharCounts::default();
    for t in typed.chars() {
        counts.total += 1;
        match canon.next() {
            Some(c) if c == t => counts.correct += 1,
            _ => counts.incorrect += 1,
        }
    }
    counts
}

/// Words per minute from correct characters only. Zero elapsed time yields 0,
/// not an error.
pub fn wpm(correct_chars: usize, elapsed: Duration) -> u16 {
    per_minute(correct_chars, elapsed)
}

/// Words per minute from everything typed, errors included.
pub fn raw_wpm(total_chars: usize, elapsed: Duration) -> u16 {
    per_minute(total_chars, elapsed)
}

fn per_minute(chars: usize, elapsed: Duration) -> u16 {
    if elapsed <= Duration::zero() {
        return 0;
    }
    let minutes = elapsed.num_milliseconds() as f64 / 60_000.0;
    (chars as f64 / CHARS_PER_WORD / minutes).round() as u16
}

/// Accuracy percentage in [0, 100]. An empty input is 100% accurate.
pub fn accuracy(counts: CharCounts) -> f64 {
    if counts.total == 0 {
        return 100.0;
    }
    let correct = (counts.total - counts.incorrect) as f64;
    (correct / counts.total as f64 * 100.0).max(0.0)
}

/// The once-per-round aggregate. Callers guarantee `typed` never exceeds the
/// canonical length.
pub fn race_result(typed: &str, canonical: &str, elapsed: Duration) -> RaceResult {
    let counts = char_counts(typed, canonical);
    RaceResult {
        wpm: wpm(counts.correct, elapsed),
        raw_wpm: raw_wpm(counts.total, elapsed),
        accuracy: accuracy(counts),
        correct_chars: counts.correct,
        incorrect_chars: counts.incorrect,
        total_chars: counts.total,
    }
}
