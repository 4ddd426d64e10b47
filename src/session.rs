use crate::metrics::SessionMetrics;
use crate::time_series::{sample_replay, GraphSample};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Keystroke that deletes the previous character
pub const BACKSPACE: char = '\u{8}';

const SESSION_ID_LEN: usize = 8;
const SESSION_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Correct,
    Incorrect,
    /// A backspace: moves the cursor back, neither right nor wrong
    Correction,
}

/// How one keystroke compared with the target text
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GradedKeystroke {
    pub outcome: Outcome,
    /// Target character under the cursor when the key was pressed
    pub expected: Option<char>,
}

/// One accepted keystroke, timed relative to the start of the session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystrokeEvent {
    pub character: char,
    pub timestamp_ms: u64,
}

impl KeystrokeEvent {
    pub fn new(character: char, timestamp_ms: u64) -> Self {
        Self {
            character,
            timestamp_ms,
        }
    }

    pub fn is_backspace(&self) -> bool {
        self.character == BACKSPACE
    }
}

/// The ordered keystrokes of one session together with the text being typed
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Replay {
    pub target: String,
    pub events: Vec<KeystrokeEvent>,
}

impl Replay {
    pub fn new(target: impl Into<String>, events: Vec<KeystrokeEvent>) -> Self {
        Self {
            target: target.into(),
            events,
        }
    }

    /// Grade every event against the target text.
    ///
    /// A cursor walks the target: backspace steps it back, any other key is
    /// compared with the character under the cursor and advances it. Keys typed
    /// past the end of the target are incorrect and have no expected character.
    pub fn graded(&self) -> Vec<GradedKeystroke> {
        let target: Vec<char> = self.target.chars().collect();
        let mut cursor = 0usize;

        self.events
            .iter()
            .map(|event| {
                if event.is_backspace() {
                    cursor = cursor.saturating_sub(1);
                    return GradedKeystroke {
                        outcome: Outcome::Correction,
                        expected: None,
                    };
                }
                let expected = target.get(cursor).copied();
                cursor += 1;
                let outcome = if expected == Some(event.character) {
                    Outcome::Correct
                } else {
                    Outcome::Incorrect
                };
                GradedKeystroke { outcome, expected }
            })
            .collect()
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.graded().into_iter().map(|g| g.outcome).collect()
    }

    /// Milliseconds from the first keystroke to the last
    pub fn elapsed_ms(&self) -> u64 {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => last.timestamp_ms.saturating_sub(first.timestamp_ms),
            _ => 0,
        }
    }

    pub fn metrics(&self) -> SessionMetrics {
        let outcomes = self.outcomes();
        let typed = outcomes
            .iter()
            .filter(|o| **o != Outcome::Correction)
            .count();
        let correct = outcomes.iter().filter(|o| **o == Outcome::Correct).count();
        let minutes = self.elapsed_ms() as f64 / 60_000.0;

        let samples: Vec<f64> = self.graph_samples_for(&outcomes).iter().map(|s| s.wpm).collect();
        SessionMetrics::calculate(minutes, typed, correct).with_consistency(&samples)
    }

    pub fn graph_samples(&self) -> Vec<GraphSample> {
        self.graph_samples_for(&self.outcomes())
    }

    fn graph_samples_for(&self, outcomes: &[Outcome]) -> Vec<GraphSample> {
        sample_replay(&self.events, outcomes)
    }
}

/// Keystroke telemetry attached to a session, if any was captured
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Telemetry {
    WithReplay(Replay),
    WithoutReplay,
}

/// A completed typing session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub id: String,
    pub lesson_id: String,
    pub wpm: f64,
    pub accuracy: f64,
    /// Wall-clock creation time, milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    pub telemetry: Telemetry,
    #[serde(default)]
    pub graph_data: Vec<GraphSample>,
}

impl SessionResult {
    /// Build a result from a replay, deriving metrics and the speed graph from it
    pub fn from_replay(
        id: impl Into<String>,
        lesson_id: impl Into<String>,
        timestamp_ms: i64,
        replay: Replay,
    ) -> Self {
        let metrics = replay.metrics();
        let graph_data = replay.graph_samples();
        Self {
            id: id.into(),
            lesson_id: lesson_id.into(),
            wpm: metrics.wpm,
            accuracy: metrics.accuracy,
            timestamp_ms,
            telemetry: Telemetry::WithReplay(replay),
            graph_data,
        }
    }

    /// A result carrying only headline numbers
    pub fn without_replay(
        id: impl Into<String>,
        lesson_id: impl Into<String>,
        timestamp_ms: i64,
        wpm: f64,
        accuracy: f64,
    ) -> Self {
        Self {
            id: id.into(),
            lesson_id: lesson_id.into(),
            wpm,
            accuracy,
            timestamp_ms,
            telemetry: Telemetry::WithoutReplay,
            graph_data: Vec::new(),
        }
    }

    pub fn replay(&self) -> Option<&Replay> {
        match &self.telemetry {
            Telemetry::WithReplay(replay) => Some(replay),
            Telemetry::WithoutReplay => None,
        }
    }
}

/// Random base-36 identifier for a session
pub fn generate_session_id<R: Rng>(rng: &mut R) -> String {
    (0..SESSION_ID_LEN)
        .map(|_| SESSION_ID_ALPHABET[rng.gen_range(0..SESSION_ID_ALPHABET.len())] as char)
        .collect()
}

/// Captures keystrokes while a session is in progress
#[derive(Debug, Clone)]
pub struct SessionRecorder {
    lesson_id: String,
    target: String,
    events: Vec<KeystrokeEvent>,
}

impl SessionRecorder {
    pub fn new(lesson_id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            lesson_id: lesson_id.into(),
            target: target.into(),
            events: Vec::new(),
        }
    }

    /// Record a keystroke. Timestamps earlier than the previous event are
    /// raised to it so the recorded sequence stays monotonic.
    pub fn record(&mut self, character: char, timestamp_ms: u64) {
        let floor = self.events.last().map_or(0, |e| e.timestamp_ms);
        if timestamp_ms < floor {
            tracing::debug!(timestamp_ms, floor, "keystroke timestamp went backwards, clamping");
        }
        self.events.push(KeystrokeEvent::new(character, timestamp_ms.max(floor)));
    }

    pub fn events(&self) -> &[KeystrokeEvent] {
        &self.events
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether every character of the target has been typed correctly in place
    pub fn is_complete(&self) -> bool {
        let replay = Replay::new(self.target.clone(), self.events.clone());
        let target_len = self.target.chars().count();
        let mut line: Vec<Outcome> = Vec::with_capacity(target_len);
        for outcome in replay.outcomes() {
            match outcome {
                Outcome::Correction => {
                    line.pop();
                }
                other => line.push(other),
            }
        }
        line.len() >= target_len && line.iter().take(target_len).all(|o| *o == Outcome::Correct)
    }

    pub fn finish(self, id: impl Into<String>, created_at_ms: i64) -> SessionResult {
        if self.events.is_empty() {
            return SessionResult::without_replay(id, self.lesson_id, created_at_ms, 0.0, 0.0);
        }
        let replay = Replay::new(self.target, self.events);
        SessionResult::from_replay(id, self.lesson_id, created_at_ms, replay)
    }

    /// Finish with a fresh random id, stamped with the current time
    pub fn finish_now<R: Rng>(self, rng: &mut R) -> SessionResult {
        let id = generate_session_id(rng);
        self.finish(id, Utc::now().timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn replay_of(target: &str, keys: &[(char, u64)]) -> Replay {
        Replay::new(
            target,
            keys.iter().map(|&(c, t)| KeystrokeEvent::new(c, t)).collect(),
        )
    }

    #[test]
    fn outcomes_compare_against_target() {
        let replay = replay_of("test", &[('t', 0), ('x', 100), ('s', 200), ('t', 300)]);
        assert_eq!(
            replay.outcomes(),
            vec![
                Outcome::Correct,
                Outcome::Incorrect,
                Outcome::Correct,
                Outcome::Correct
            ]
        );
    }

    #[test]
    fn backspace_moves_cursor_back() {
        let replay = replay_of(
            "ab",
            &[('x', 0), (BACKSPACE, 100), ('a', 200), ('b', 300)],
        );
        assert_eq!(
            replay.outcomes(),
            vec![
                Outcome::Incorrect,
                Outcome::Correction,
                Outcome::Correct,
                Outcome::Correct
            ]
        );
    }

    #[test]
    fn backspace_at_start_is_harmless() {
        let replay = replay_of("a", &[(BACKSPACE, 0), ('a', 100)]);
        assert_eq!(replay.outcomes(), vec![Outcome::Correction, Outcome::Correct]);
    }

    #[test]
    fn keys_past_target_end_are_incorrect() {
        let replay = replay_of("a", &[('a', 0), ('b', 100)]);
        assert_eq!(replay.outcomes(), vec![Outcome::Correct, Outcome::Incorrect]);
    }

    #[test]
    fn graded_keys_carry_the_expected_character() {
        let replay = replay_of(
            "ab",
            &[('a', 0), ('v', 100), (BACKSPACE, 200), ('b', 300), ('c', 400)],
        );
        let expected: Vec<Option<char>> = replay.graded().iter().map(|g| g.expected).collect();
        assert_eq!(expected, vec![Some('a'), Some('b'), None, Some('b'), None]);
        assert_eq!(replay.graded()[1].outcome, Outcome::Incorrect);
    }

    #[test]
    fn epoch_timestamps_measure_from_first_keystroke() {
        let replay = replay_of("ab", &[('a', 1_700_000_000_000), ('b', 1_700_000_000_150)]);
        assert_eq!(replay.elapsed_ms(), 150);

        let result = SessionResult::from_replay("s", "l1", 0, replay);
        // 2 chars in 150ms
        assert_eq!(result.wpm, 160.0);
        assert_eq!(result.graph_data.len(), 1);
    }

    #[test]
    fn far_apart_keystrokes_still_produce_a_result() {
        let replay = replay_of("ab", &[('a', 0), ('b', u64::MAX / 2)]);
        let result = SessionResult::from_replay("s", "l1", 0, replay);
        assert_eq!(result.wpm, 0.0);
        assert_eq!(result.accuracy, 100.0);
        assert!(!result.graph_data.is_empty());
    }

    #[test]
    fn replay_metrics() {
        // 10 chars, 9 correct, first to last keystroke in 6s = 0.1 minutes
        // -> 2 words / 0.1 = 20 wpm
        let keys: Vec<(char, u64)> = "abcdefghiz"
            .chars()
            .enumerate()
            .map(|(i, c)| (c, i as u64 * 6000 / 9))
            .collect();
        let replay = replay_of("abcdefghij", &keys);
        let metrics = replay.metrics();

        assert_eq!(metrics.wpm, 20.0);
        assert_eq!(metrics.accuracy, 90.0);
        assert_eq!(metrics.raw_kpm, 100.0);
    }

    #[test]
    fn recorder_finish_builds_result_with_replay() {
        let mut recorder = SessionRecorder::new("l1", "hi");
        recorder.record('h', 0);
        recorder.record('i', 600);
        assert!(recorder.is_complete());

        let result = recorder.finish("abc", 1_700_000_000_000);
        assert_eq!(result.id, "abc");
        assert_eq!(result.lesson_id, "l1");
        assert_eq!(result.accuracy, 100.0);
        // 2 chars in 0.01 min
        assert_eq!(result.wpm, 40.0);
        assert_eq!(result.graph_data.len(), 1);

        let replay = result.replay().unwrap();
        assert_eq!(replay.target, "hi");
        assert_eq!(replay.events.len(), 2);
    }

    #[test]
    fn recorder_without_events_finishes_without_replay() {
        let recorder = SessionRecorder::new("l1", "hi");
        let result = recorder.finish("abc", 0);
        assert_eq!(result.telemetry, Telemetry::WithoutReplay);
        assert_eq!(result.wpm, 0.0);
        assert_eq!(result.accuracy, 0.0);
    }

    #[test]
    fn recorder_clamps_backwards_timestamps() {
        let mut recorder = SessionRecorder::new("l1", "abc");
        recorder.record('a', 100);
        recorder.record('b', 50);
        assert_eq!(recorder.events()[1].timestamp_ms, 100);
    }

    #[test]
    fn recorder_completion_tracks_corrections() {
        let mut recorder = SessionRecorder::new("l1", "ab");
        recorder.record('a', 0);
        recorder.record('x', 100);
        assert!(!recorder.is_complete());
        recorder.record(BACKSPACE, 200);
        recorder.record('b', 300);
        assert!(recorder.is_complete());
    }

    #[test]
    fn session_ids_are_base36() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = generate_session_id(&mut rng);
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_ne!(id, generate_session_id(&mut rng));
    }

    #[test]
    fn telemetry_serializes_with_kind_tag() {
        let result = SessionResult::without_replay("a", "l1", 0, 50.0, 98.0);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["telemetry"]["kind"], "without_replay");

        let replayed = SessionResult::from_replay("b", "l1", 0, replay_of("a", &[('a', 0)]));
        let json = serde_json::to_string(&replayed).unwrap();
        let back: SessionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, replayed);
    }

    #[test]
    fn graph_data_defaults_when_missing() {
        let json = r#"{
            "id": "x",
            "lesson_id": "l2",
            "wpm": 30.0,
            "accuracy": 90.0,
            "timestamp_ms": 5,
            "telemetry": { "kind": "without_replay" }
        }"#;
        let result: SessionResult = serde_json::from_str(json).unwrap();
        assert!(result.graph_data.is_empty());
        assert!(result.replay().is_none());
    }
}
