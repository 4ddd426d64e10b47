//! Per-key latency and error analysis.
//!
//! Every adjacent pair of keystrokes in a replay yields one latency sample,
//! charged to the key pressed second. Samples are folded into a running mean
//! per key so the profile keeps O(1) state per key no matter how many sessions
//! it has seen. The first keystroke of a replay has no predecessor and is
//! never sampled.
//!
//! Errors go to the key the target asked for, not the key that was hit, so a
//! key the user keeps missing is the one that turns error prone.

use crate::error::StoreError;
use crate::session::{Outcome, Replay, SessionResult, BACKSPACE};
use crate::store::KeyValueStore;
use crate::util::mean;
use chrono::Utc;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Storage key for the persisted profile
pub const PROFILE_KEY: &str = "weakness_profile";

/// Key pairs slower than this on average are bottlenecks
pub const BOTTLENECK_THRESHOLD_MS: f64 = 400.0;
pub const BOTTLENECK_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerSettings {
    /// Keys slower than this on average are "slow"
    pub slow_threshold_ms: f64,
    /// Keys with an error rate (percent) above this are "error prone"
    pub error_rate_threshold: f64,
    /// Full analysis only looks at this many of the most recent sessions
    pub max_sessions_to_analyze: usize,
    /// Length cap for the slow and error-prone lists
    pub ranked_keys_limit: usize,
    /// How many keys from each list feed the critical set
    pub critical_keys_per_list: usize,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            slow_threshold_ms: 200.0,
            error_rate_threshold: 10.0,
            max_sessions_to_analyze: 10,
            ranked_keys_limit: 10,
            critical_keys_per_list: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyLatencyRecord {
    pub key: char,
    /// Mean over `frequency` latency samples
    pub avg_latency_ms: f64,
    /// Percent of presses that were wrong, 0 until the key has a press
    pub error_rate: f64,
    /// Times this key was the one to type
    pub total_presses: u64,
    pub total_errors: u64,
    /// Times this key was actually hit, one latency sample each
    pub frequency: u64,
    pub last_seen_ms: i64,
}

impl KeyLatencyRecord {
    pub fn new(key: char) -> Self {
        Self {
            key,
            avg_latency_ms: 0.0,
            error_rate: 0.0,
            total_presses: 0,
            total_errors: 0,
            frequency: 0,
            last_seen_ms: 0,
        }
    }

    /// A correctly typed key: one latency sample and one clean press
    pub fn observe(&mut self, latency_ms: f64, was_error: bool, seen_at_ms: i64) {
        self.observe_latency(latency_ms, seen_at_ms);
        self.observe_press(was_error, seen_at_ms);
    }

    pub fn observe_latency(&mut self, latency_ms: f64, seen_at_ms: i64) {
        self.frequency += 1;
        let n = self.frequency as f64;
        self.avg_latency_ms = (self.avg_latency_ms * (n - 1.0) + latency_ms) / n;
        self.last_seen_ms = self.last_seen_ms.max(seen_at_ms);
    }

    pub fn observe_press(&mut self, was_error: bool, seen_at_ms: i64) {
        self.total_presses += 1;
        if was_error {
            self.total_errors += 1;
        }
        self.error_rate = self.total_errors as f64 / self.total_presses as f64 * 100.0;
        self.last_seen_ms = self.last_seen_ms.max(seen_at_ms);
    }
}

/// A slow transition between two keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub pair: (char, char),
    pub avg_latency_ms: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeaknessProfile {
    pub key_data: BTreeMap<char, KeyLatencyRecord>,
    /// Derived from `key_data`, slowest first
    pub slow_keys: Vec<KeyLatencyRecord>,
    /// Derived from `key_data`, highest error rate first
    pub error_prone_keys: Vec<KeyLatencyRecord>,
    pub last_analyzed_ms: i64,
    pub sessions_analyzed: u64,
    pub total_keys_tracked: usize,
}

impl WeaknessProfile {
    /// Analyze the first `max_sessions_to_analyze` of `sessions` (most recent
    /// first) into a fresh profile. Pure: nothing is persisted.
    pub fn from_sessions(
        sessions: &[SessionResult],
        settings: &AnalyzerSettings,
        analyzed_at_ms: i64,
    ) -> Self {
        let mut profile = Self::default();
        for session in sessions.iter().take(settings.max_sessions_to_analyze) {
            profile.fold_session(session);
        }
        profile.finish_pass(settings, analyzed_at_ms);
        profile
    }

    /// Fold a single session's replay into `key_data` and count it as analyzed.
    ///
    /// Returns the number of latency samples taken. Sessions without a replay,
    /// or with fewer than two keystrokes, contribute no samples.
    pub fn fold_session(&mut self, session: &SessionResult) -> usize {
        self.sessions_analyzed += 1;

        let Some(replay) = session.replay() else {
            tracing::debug!(session = %session.id, "session has no replay, skipping");
            return 0;
        };
        if replay.events.len() < 2 {
            tracing::debug!(session = %session.id, "replay too short for latency, skipping");
            return 0;
        }

        let graded = replay.graded();
        let mut samples = 0;
        for (i, (prev, current)) in replay.events.iter().tuple_windows().enumerate() {
            let Some(latency) = current.timestamp_ms.checked_sub(prev.timestamp_ms) else {
                tracing::warn!(
                    session = %session.id,
                    index = i + 1,
                    "keystroke timestamps go backwards, skipping pair"
                );
                continue;
            };
            let seen_at = session.timestamp_ms;
            self.record_mut(current.character).observe_latency(latency as f64, seen_at);

            let Some(grade) = graded.get(i + 1) else {
                continue;
            };
            match (grade.outcome, grade.expected) {
                (Outcome::Incorrect, Some(expected)) => {
                    self.record_mut(expected).observe_press(true, seen_at)
                }
                (outcome, _) => self
                    .record_mut(current.character)
                    .observe_press(outcome == Outcome::Incorrect, seen_at),
            }
            samples += 1;
        }

        tracing::debug!(session = %session.id, samples, "folded session into weakness profile");
        samples
    }

    fn record_mut(&mut self, key: char) -> &mut KeyLatencyRecord {
        self.key_data.entry(key).or_insert_with(|| KeyLatencyRecord::new(key))
    }

    /// Recompute the derived views after `key_data` changed
    pub fn refresh_rankings(&mut self, settings: &AnalyzerSettings) {
        self.slow_keys = ranked(
            &self.key_data,
            |k| k.avg_latency_ms > settings.slow_threshold_ms,
            |k| k.avg_latency_ms,
            settings.ranked_keys_limit,
        );
        self.error_prone_keys = ranked(
            &self.key_data,
            |k| k.error_rate > settings.error_rate_threshold,
            |k| k.error_rate,
            settings.ranked_keys_limit,
        );
        self.total_keys_tracked = self.key_data.len();
    }

    fn finish_pass(&mut self, settings: &AnalyzerSettings, analyzed_at_ms: i64) {
        self.refresh_rankings(settings);
        self.last_analyzed_ms = analyzed_at_ms;
    }

    /// Union of the top `per_list` slow and error-prone keys, slow keys first
    pub fn critical_keys(&self, per_list: usize) -> Vec<char> {
        self.slow_keys
            .iter()
            .take(per_list)
            .chain(self.error_prone_keys.iter().take(per_list))
            .map(|k| k.key)
            .unique()
            .collect()
    }

    /// Two-line, human readable digest of the weakest keys
    pub fn summary(&self) -> String {
        let slow = self
            .slow_keys
            .iter()
            .take(5)
            .map(|k| format!("{} ({}ms)", key_label(k.key), k.avg_latency_ms.round()))
            .join(", ");
        let error_prone = self
            .error_prone_keys
            .iter()
            .take(5)
            .map(|k| format!("{} ({:.1}%)", key_label(k.key), k.error_rate))
            .join(", ");

        format!(
            "Slow keys: {}\nError-prone keys: {}",
            if slow.is_empty() { "None" } else { slow.as_str() },
            if error_prone.is_empty() { "None" } else { error_prone.as_str() },
        )
    }
}

/// Critical keys with the default of five per list
pub fn critical_keys(profile: &WeaknessProfile) -> Vec<char> {
    profile.critical_keys(AnalyzerSettings::default().critical_keys_per_list)
}

/// Slowest transitions between correctly typed keys in one replay.
///
/// Only pairs where both keys were typed correctly count, and only pairs
/// averaging above `BOTTLENECK_THRESHOLD_MS` are kept, slowest first.
pub fn identify_bottlenecks(replay: &Replay) -> Vec<Bottleneck> {
    let graded = replay.graded();
    let mut pairs: BTreeMap<(char, char), Vec<f64>> = BTreeMap::new();

    let graded_events = replay.events.iter().zip(&graded);
    for ((prev, prev_grade), (current, grade)) in graded_events.tuple_windows() {
        if prev_grade.outcome != Outcome::Correct || grade.outcome != Outcome::Correct {
            continue;
        }
        if let Some(latency) = current.timestamp_ms.checked_sub(prev.timestamp_ms) {
            pairs
                .entry((prev.character, current.character))
                .or_default()
                .push(latency as f64);
        }
    }

    pairs
        .into_iter()
        .filter_map(|(pair, latencies)| {
            let avg_latency_ms = mean(&latencies)?;
            Some(Bottleneck {
                pair,
                avg_latency_ms,
                samples: latencies.len(),
            })
        })
        .filter(|b| b.avg_latency_ms > BOTTLENECK_THRESHOLD_MS)
        .sorted_by(|a, b| b.avg_latency_ms.total_cmp(&a.avg_latency_ms))
        .take(BOTTLENECK_LIMIT)
        .collect()
}

/// Printable name for a key
pub fn key_label(key: char) -> String {
    match key {
        ' ' => "space".to_string(),
        BACKSPACE => "backspace".to_string(),
        '\t' => "tab".to_string(),
        '\n' => "enter".to_string(),
        other => other.to_string(),
    }
}

fn ranked<F, M>(
    key_data: &BTreeMap<char, KeyLatencyRecord>,
    include: F,
    measure: M,
    limit: usize,
) -> Vec<KeyLatencyRecord>
where
    F: Fn(&KeyLatencyRecord) -> bool,
    M: Fn(&KeyLatencyRecord) -> f64,
{
    key_data
        .values()
        .filter(|k| include(*k))
        .sorted_by(|a, b| match measure(*b).total_cmp(&measure(*a)) {
            Ordering::Equal => a.key.cmp(&b.key),
            other => other,
        })
        .take(limit)
        .cloned()
        .collect()
}

/// Builds and persists weakness profiles against a key-value store.
///
/// Updates take `&mut self`, so one analyzer serializes the
/// load-modify-save cycle for the store it owns.
#[derive(Debug)]
pub struct WeaknessAnalyzer<S> {
    store: S,
    settings: AnalyzerSettings,
}

impl<S: KeyValueStore> WeaknessAnalyzer<S> {
    pub fn new(store: S) -> Self {
        Self::with_settings(store, AnalyzerSettings::default())
    }

    pub fn with_settings(store: S, settings: AnalyzerSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Rebuild the profile from the most recent sessions and overwrite the stored one
    pub fn analyze_weaknesses(
        &mut self,
        sessions: &[SessionResult],
    ) -> Result<WeaknessProfile, StoreError> {
        let profile =
            WeaknessProfile::from_sessions(sessions, &self.settings, Utc::now().timestamp_millis());
        self.save_profile(&profile)?;
        tracing::info!(
            sessions = profile.sessions_analyzed,
            keys = profile.total_keys_tracked,
            slow = profile.slow_keys.len(),
            error_prone = profile.error_prone_keys.len(),
            "analyzed weaknesses"
        );
        Ok(profile)
    }

    /// Fold one new session into the stored profile (starting empty if none exists)
    pub fn update_profile_with_session(
        &mut self,
        session: &SessionResult,
    ) -> Result<WeaknessProfile, StoreError> {
        let mut profile = self.load_profile()?.unwrap_or_default();
        profile.fold_session(session);
        profile.finish_pass(&self.settings, Utc::now().timestamp_millis());
        self.save_profile(&profile)?;
        tracing::info!(
            session = %session.id,
            sessions = profile.sessions_analyzed,
            keys = profile.total_keys_tracked,
            "updated weakness profile"
        );
        Ok(profile)
    }

    pub fn load_profile(&self) -> Result<Option<WeaknessProfile>, StoreError> {
        self.store.get(PROFILE_KEY)
    }

    pub fn save_profile(&mut self, profile: &WeaknessProfile) -> Result<(), StoreError> {
        self.store.set(PROFILE_KEY, profile)
    }

    pub fn reset_profile(&mut self) -> Result<(), StoreError> {
        self.store.remove(PROFILE_KEY)
    }

    pub fn critical_keys(&self, profile: &WeaknessProfile) -> Vec<char> {
        profile.critical_keys(self.settings.critical_keys_per_list)
    }
}
