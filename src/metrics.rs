//! Headline numbers for a finished typing session.
//!
//! Every calculation here is total: degenerate inputs (zero elapsed time,
//! nothing typed, non-finite durations) produce zero instead of NaN or
//! infinity, so downstream averages can never be poisoned.

use crate::util::std_dev;

/// Characters per "word" in the standard WPM definition
pub const CHARS_PER_WORD: f64 = 5.0;

/// Words per minute, rounded to the nearest integer.
///
/// Zero, negative or non-finite durations yield 0.
pub fn compute_wpm(elapsed_minutes: f64, total_characters_typed: usize) -> f64 {
    unrounded_wpm(elapsed_minutes, total_characters_typed).round()
}

pub(crate) fn unrounded_wpm(elapsed_minutes: f64, characters: usize) -> f64 {
    if !elapsed_minutes.is_finite() || elapsed_minutes <= 0.0 {
        return 0.0;
    }
    (characters as f64 / CHARS_PER_WORD) / elapsed_minutes
}

/// Accuracy percentage (0-100), rounded to the nearest integer.
///
/// An empty session scores 0. `correct_characters` is clamped to
/// `total_characters_typed`.
pub fn compute_accuracy(total_characters_typed: usize, correct_characters: usize) -> f64 {
    if total_characters_typed == 0 {
        return 0.0;
    }
    let correct = correct_characters.min(total_characters_typed);
    (correct as f64 / total_characters_typed as f64 * 100.0).round()
}

/// Raw keystrokes per minute, rounded.
pub fn compute_raw_kpm(elapsed_minutes: f64, total_characters_typed: usize) -> f64 {
    if !elapsed_minutes.is_finite() || elapsed_minutes <= 0.0 {
        return 0.0;
    }
    (total_characters_typed as f64 / elapsed_minutes).round()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionMetrics {
    pub wpm: f64,
    pub accuracy: f64,
    pub raw_kpm: f64,
    /// Standard deviation of the per-second WPM samples, 0 with fewer than two samples
    pub consistency: f64,
}

impl SessionMetrics {
    pub fn calculate(
        elapsed_minutes: f64,
        total_characters_typed: usize,
        correct_characters: usize,
    ) -> Self {
        Self {
            wpm: compute_wpm(elapsed_minutes, total_characters_typed),
            accuracy: compute_accuracy(total_characters_typed, correct_characters),
            raw_kpm: compute_raw_kpm(elapsed_minutes, total_characters_typed),
            consistency: 0.0,
        }
    }

    pub fn with_consistency(mut self, wpm_samples: &[f64]) -> Self {
        self.consistency = if wpm_samples.len() < 2 {
            0.0
        } else {
            std_dev(wpm_samples).unwrap_or(0.0)
        };
        self
    }
}
