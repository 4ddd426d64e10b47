// Library surface for the CLI and integration tests.
pub mod app_dirs;
pub mod config;
pub mod drill;
pub mod error;
pub mod history;
pub mod metrics;
pub mod rank;
pub mod session;
pub mod store;
pub mod time_series;
pub mod util;
pub mod weakness;

pub use error::{ConfigError, StoreError};
pub use history::SessionHistory;
pub use session::{
    GradedKeystroke, KeystrokeEvent, Replay, SessionRecorder, SessionResult, Telemetry,
};
pub use store::KeyValueStore;
pub use weakness::{critical_keys, WeaknessAnalyzer, WeaknessProfile};
