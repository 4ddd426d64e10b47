use crate::error::StoreError;
use crate::session::SessionResult;
use crate::store::KeyValueStore;
use crate::util::mean;
use std::collections::VecDeque;

/// Storage key for the persisted session history
pub const HISTORY_KEY: &str = "typing_history";
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Completed sessions, most recent first, capped at `capacity` entries
#[derive(Debug, Clone, PartialEq)]
pub struct SessionHistory {
    entries: VecDeque<SessionResult>,
    capacity: usize,
}

impl Default for SessionHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl SessionHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Build from an already most-recent-first list, dropping anything past the cap
    pub fn from_sessions(sessions: Vec<SessionResult>, capacity: usize) -> Self {
        let mut history = Self::with_capacity(capacity);
        history
            .entries
            .extend(sessions.into_iter().take(history.capacity));
        history
    }

    /// Add a new session at the front, evicting the oldest on overflow
    pub fn record(&mut self, session: SessionResult) -> Option<SessionResult> {
        self.entries.push_front(session);
        if self.entries.len() > self.capacity {
            self.entries.pop_back()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&SessionResult> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionResult> {
        self.entries.iter()
    }

    /// The `n` most recent sessions, most recent first
    pub fn recent(&self, n: usize) -> Vec<SessionResult> {
        self.entries.iter().take(n).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<SessionResult> {
        self.entries.iter().cloned().collect()
    }

    /// Mean WPM over the `n` most recent sessions
    pub fn average_wpm(&self, n: usize) -> Option<f64> {
        let speeds: Vec<f64> = self.entries.iter().take(n).map(|s| s.wpm).collect();
        mean(&speeds)
    }

    pub fn peak_wpm(&self) -> Option<f64> {
        self.entries.iter().map(|s| s.wpm).reduce(f64::max)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn load<S: KeyValueStore>(store: &S, capacity: usize) -> Result<Self, StoreError> {
        let sessions: Vec<SessionResult> = store.get(HISTORY_KEY)?.unwrap_or_default();
        Ok(Self::from_sessions(sessions, capacity))
    }

    pub fn save<S: KeyValueStore>(&self, store: &mut S) -> Result<(), StoreError> {
        store.set(HISTORY_KEY, &self.to_vec())?;
        tracing::info!(sessions = self.entries.len(), "saved session history");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn session(n: usize, wpm: f64) -> SessionResult {
        SessionResult::without_replay(format!("s{n}"), "l1", n as i64, wpm, 95.0)
    }

    fn full_history() -> SessionHistory {
        let mut history = SessionHistory::default();
        for n in 0..100 {
            assert!(history.record(session(n, 40.0)).is_none());
        }
        history
    }

    #[test]
    fn record_is_most_recent_first() {
        let mut history = SessionHistory::default();
        history.record(session(1, 30.0));
        history.record(session(2, 40.0));
        assert_eq!(history.latest().unwrap().id, "s2");
        let ids: Vec<&str> = history.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s1"]);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut history = full_history();
        assert_eq!(history.len(), 100);

        let evicted = history.record(session(100, 50.0)).unwrap();
        assert_eq!(evicted.id, "s0");
        assert_eq!(history.len(), 100);
        assert_eq!(history.latest().unwrap().id, "s100");
        assert_eq!(history.iter().last().unwrap().id, "s1");
    }

    #[test]
    fn from_sessions_truncates_to_capacity() {
        let sessions: Vec<SessionResult> = (0..5).map(|n| session(n, 10.0)).collect();
        let history = SessionHistory::from_sessions(sessions, 3);
        assert_eq!(history.len(), 3);
        assert_eq!(history.latest().unwrap().id, "s0");
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut history = SessionHistory::with_capacity(0);
        history.record(session(1, 10.0));
        history.record(session(2, 10.0));
        assert_eq!(history.len(), 1);
        assert_eq!(history.capacity(), 1);
    }

    #[test]
    fn averages_and_peak() {
        let mut history = SessionHistory::default();
        assert_eq!(history.average_wpm(10), None);
        assert_eq!(history.peak_wpm(), None);

        history.record(session(1, 90.0));
        history.record(session(2, 30.0));
        history.record(session(3, 60.0));

        assert_eq!(history.average_wpm(2), Some(45.0));
        assert_eq!(history.average_wpm(10), Some(60.0));
        assert_eq!(history.peak_wpm(), Some(90.0));
        assert_eq!(history.recent(1)[0].id, "s3");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let mut store = MemoryStore::new();
        let mut history = SessionHistory::default();
        history.record(session(1, 30.0));
        history.record(session(2, 40.0));
        history.save(&mut store).unwrap();

        let loaded = SessionHistory::load(&store, DEFAULT_HISTORY_CAPACITY).unwrap();
        assert_eq!(loaded, history);
    }

    #[test]
    fn load_from_empty_store_is_empty() {
        let store = MemoryStore::new();
        let history = SessionHistory::load(&store, 10).unwrap();
        assert!(history.is_empty());
        assert_eq!(history.capacity(), 10);
    }
}
