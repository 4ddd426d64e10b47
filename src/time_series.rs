use crate::metrics::unrounded_wpm;
use crate::session::{KeystrokeEvent, Outcome};
use serde::{Deserialize, Serialize};

/// One point of a session's speed graph
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphSample {
    /// Seconds since session start
    pub time: f64,
    /// Speed counting only correct characters
    pub wpm: f64,
    /// Speed counting every typed character
    pub raw: f64,
}

impl GraphSample {
    pub fn new(time: f64, wpm: f64, raw: f64) -> Self {
        Self { time, wpm, raw }
    }
}

/// Upper bound on samples per replay. Longer sessions get a wider step.
pub const MAX_GRAPH_SAMPLES: u64 = 600;

/// Build one sample per elapsed whole second of the replay.
///
/// Time is measured from the first keystroke. The last sample sits at the true
/// end of the session when it does not fall on a step boundary. Sessions longer
/// than `MAX_GRAPH_SAMPLES` seconds are sampled every few seconds instead.
/// `outcomes` must be aligned with `events`.
pub fn sample_replay(events: &[KeystrokeEvent], outcomes: &[Outcome]) -> Vec<GraphSample> {
    let (Some(first), Some(last)) = (events.first(), events.last()) else {
        return Vec::new();
    };
    let span_ms = last.timestamp_ms.saturating_sub(first.timestamp_ms);
    if span_ms == 0 {
        return Vec::new();
    }

    let step_secs = span_ms.div_ceil(1000).div_ceil(MAX_GRAPH_SAMPLES).max(1);
    let step_ms = step_secs.saturating_mul(1000);
    let mut samples = Vec::new();
    let mut idx = 0;
    let mut typed = 0usize;
    let mut correct = 0usize;
    let mut offset_ms = 0u64;

    while offset_ms < span_ms {
        offset_ms = offset_ms.saturating_add(step_ms).min(span_ms);
        let cutoff = first.timestamp_ms.saturating_add(offset_ms);
        while idx < events.len() && events[idx].timestamp_ms <= cutoff {
            match outcomes.get(idx) {
                Some(Outcome::Correct) => {
                    typed += 1;
                    correct += 1;
                }
                Some(Outcome::Incorrect) => typed += 1,
                Some(Outcome::Correction) | None => {}
            }
            idx += 1;
        }

        let minutes = offset_ms as f64 / 60_000.0;
        samples.push(GraphSample::new(
            offset_ms as f64 / 1000.0,
            unrounded_wpm(minutes, correct),
            unrounded_wpm(minutes, typed),
        ));
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(character: char, timestamp_ms: u64) -> KeystrokeEvent {
        KeystrokeEvent::new(character, timestamp_ms)
    }

    #[test]
    fn empty_replay_has_no_samples() {
        assert!(sample_replay(&[], &[]).is_empty());
    }

    #[test]
    fn zero_length_replay_has_no_samples() {
        let events = [event('a', 0)];
        assert!(sample_replay(&events, &[Outcome::Correct]).is_empty());
    }

    #[test]
    fn one_sample_per_second_with_partial_tail() {
        let events = [event('a', 0), event('b', 900), event('c', 1500), event('d', 2500)];
        let outcomes = [
            Outcome::Correct,
            Outcome::Incorrect,
            Outcome::Correct,
            Outcome::Correct,
        ];
        let samples = sample_replay(&events, &outcomes);

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].time, 1.0);
        assert_eq!(samples[1].time, 2.0);
        assert_eq!(samples[2].time, 2.5);

        // first second: 2 typed, 1 correct -> raw 24 wpm, wpm 12
        assert!((samples[0].raw - 24.0).abs() < 1e-9);
        assert!((samples[0].wpm - 12.0).abs() < 1e-9);

        // full session: 4 typed, 3 correct over 2.5s
        assert!((samples[2].raw - 19.2).abs() < 1e-9);
        assert!((samples[2].wpm - 14.4).abs() < 1e-9);
    }

    #[test]
    fn corrections_do_not_count_as_typed() {
        let events = [event('a', 0), event(crate::session::BACKSPACE, 500), event('a', 1000)];
        let outcomes = [Outcome::Incorrect, Outcome::Correction, Outcome::Correct];
        let samples = sample_replay(&events, &outcomes);

        assert_eq!(samples.len(), 1);
        // 2 typed over one second = 24 raw
        assert!((samples[0].raw - 24.0).abs() < 1e-9);
        assert!((samples[0].wpm - 12.0).abs() < 1e-9);
    }

    #[test]
    fn time_is_measured_from_first_keystroke() {
        let events = [event('a', 1_700_000_000_000), event('b', 1_700_000_000_150)];
        let samples = sample_replay(&events, &[Outcome::Correct, Outcome::Correct]);

        assert_eq!(samples.len(), 1);
        assert!((samples[0].time - 0.15).abs() < 1e-9);
        // 2 chars in 0.15s
        assert!((samples[0].raw - 160.0).abs() < 1e-6);
    }

    #[test]
    fn huge_spans_are_sampled_coarsely() {
        let events = [event('a', 0), event('b', u64::MAX / 2)];
        let samples = sample_replay(&events, &[Outcome::Correct, Outcome::Correct]);

        assert!(!samples.is_empty());
        assert!(samples.len() as u64 <= MAX_GRAPH_SAMPLES);
        let last = samples[samples.len() - 1];
        assert_eq!(last.time, (u64::MAX / 2) as f64 / 1000.0);
        assert!(samples.iter().all(|s| s.wpm.is_finite() && s.raw.is_finite()));
        assert!(samples.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[test]
    fn long_pause_stays_within_sample_budget() {
        // one hour between the two keystrokes
        let events = [event('a', 0), event('b', 3_600_000)];
        let samples = sample_replay(&events, &[Outcome::Correct, Outcome::Correct]);

        assert_eq!(samples.len(), 600);
        assert_eq!(samples[0].time, 6.0);
        assert_eq!(samples[599].time, 3600.0);
    }

    #[test]
    fn timestamps_before_the_first_event_do_not_panic() {
        let events = [event('a', 500), event('b', 100)];
        assert!(sample_replay(&events, &[Outcome::Correct, Outcome::Correct]).is_empty());
    }
}
