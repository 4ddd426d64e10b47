use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use keycoach::{
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore, StoreBackend},
    drill::{generate_drill, DrillConfig},
    history::SessionHistory,
    rank::{calculate_xp, rank_change, RankProgress, RANK_TABLE_VERSION},
    session::{KeystrokeEvent, SessionRecorder},
    store::{JsonFileStore, KeyValueStore, SqliteStore},
    weakness::{identify_bottlenecks, key_label, AnalyzerSettings, WeaknessAnalyzer},
    StoreError,
};
use serde::Deserialize;
use std::{error::Error, fs, path::PathBuf};
use tracing_subscriber::EnvFilter;

/// keystroke analytics for typing practice
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "Turns recorded typing sessions into speed metrics, a per-key weakness profile, a rank, and targeted practice drills."
)]
struct Cli {
    /// config file to use instead of the platform default
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// store location (database file for sqlite, directory for json)
    #[clap(long, global = true)]
    store: Option<PathBuf>,

    /// storage backend, overriding the config file
    #[clap(long, value_enum, global = true)]
    backend: Option<StoreBackend>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// add a recorded session (JSON keystroke log) to history and update the profile
    Record {
        file: PathBuf,
        /// current practice streak, for the XP bonus
        #[clap(long, default_value_t = 0)]
        streak: u32,
    },
    /// rebuild the weakness profile from the most recent sessions
    Analyze,
    /// show the rank for a speed, or for the stored history
    Rank {
        #[clap(long)]
        wpm: Option<f64>,
    },
    /// print a practice drill targeting the current weak keys
    Drill {
        #[clap(short = 'w', long, default_value_t = 30)]
        words: usize,
    },
    /// write the session history to a CSV file
    Export { out: PathBuf },
    /// delete the stored history and weakness profile
    Reset,
}

/// On-disk shape of a keystroke log handed to `record`
#[derive(Debug, Deserialize)]
struct KeystrokeLog {
    lesson_id: String,
    target: String,
    events: Vec<KeystrokeEvent>,
}

enum AppStore {
    Json(JsonFileStore),
    Sqlite(SqliteStore),
}

impl KeyValueStore for AppStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            AppStore::Json(store) => store.get_raw(key),
            AppStore::Sqlite(store) => store.get_raw(key),
        }
    }

    fn set_raw(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        match self {
            AppStore::Json(store) => store.set_raw(key, value),
            AppStore::Sqlite(store) => store.set_raw(key, value),
        }
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        match self {
            AppStore::Json(store) => store.remove(key),
            AppStore::Sqlite(store) => store.remove(key),
        }
    }
}

fn open_store(cli: &Cli, cfg: &Config) -> Result<AppStore, StoreError> {
    let backend = cli.backend.unwrap_or(cfg.store_backend);
    tracing::debug!(%backend, "opening store");
    match backend {
        StoreBackend::Json => {
            let dir = cli
                .store
                .clone()
                .or_else(AppDirs::json_store_dir)
                .unwrap_or_else(|| PathBuf::from("keycoach_store"));
            Ok(AppStore::Json(JsonFileStore::with_dir(dir)))
        }
        StoreBackend::Sqlite => {
            let path = cli
                .store
                .clone()
                .or_else(AppDirs::sqlite_store_path)
                .unwrap_or_else(|| PathBuf::from("keycoach_store.db"));
            Ok(AppStore::Sqlite(SqliteStore::open(path)?))
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_rank(progress: &RankProgress) {
    println!(
        "Rank: {} (level {}) at {} wpm, {:.0}% through tier",
        progress.rank.name, progress.rank.level, progress.average_wpm, progress.progress
    );
    if progress.rank.is_top() {
        println!("Top rank reached");
    } else {
        println!("{} wpm to next rank", progress.wpm_to_next.ceil());
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let cli = Cli::parse();

    let config_store = match &cli.config {
        Some(path) => FileConfigStore::with_path(path),
        None => FileConfigStore::new(),
    };
    let cfg = config_store.load();
    let settings = AnalyzerSettings::from(&cfg);
    let mut store = open_store(&cli, &cfg)?;

    match &cli.command {
        Command::Record { file, streak } => {
            let log: KeystrokeLog = serde_json::from_slice(&fs::read(file)?)?;
            let mut recorder = SessionRecorder::new(log.lesson_id, log.target);
            for event in log.events {
                recorder.record(event.character, event.timestamp_ms);
            }
            let session = recorder.finish_now(&mut rand::thread_rng());

            let mut history = SessionHistory::load(&store, cfg.history_capacity)?;
            let previous_average = history.average_wpm(keycoach::rank::RANKED_SESSIONS);
            history.record(session.clone());
            history.save(&mut store)?;

            let mut analyzer = WeaknessAnalyzer::with_settings(&mut store, settings);
            let profile = analyzer.update_profile_with_session(&session)?;

            println!(
                "Session {}: {} wpm, {}% accuracy, {} XP",
                session.id,
                session.wpm,
                session.accuracy,
                calculate_xp(session.wpm, session.accuracy, *streak)
            );
            let progress = RankProgress::from_history(&history);
            if let Some(change) =
                previous_average.and_then(|prev| rank_change(prev, progress.average_wpm))
            {
                let verb = if change.is_promotion() { "Promoted" } else { "Dropped" };
                println!("{verb} from {} to {}", change.from.name, change.to.name);
            }
            println!("{}", profile.summary());

            let bottlenecks = session.replay().map(identify_bottlenecks).unwrap_or_default();
            if !bottlenecks.is_empty() {
                let pairs = bottlenecks
                    .iter()
                    .map(|b| {
                        let (from, to) = b.pair;
                        let latency = b.avg_latency_ms.round();
                        format!("{}{} ({latency}ms)", key_label(from), key_label(to))
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("Bottlenecks: {pairs}");
            }
        }
        Command::Analyze => {
            let history = SessionHistory::load(&store, cfg.history_capacity)?;
            let mut analyzer = WeaknessAnalyzer::with_settings(&mut store, settings);
            let profile = analyzer.analyze_weaknesses(&history.to_vec())?;
            println!(
                "Analyzed {} sessions, {} keys tracked",
                profile.sessions_analyzed, profile.total_keys_tracked
            );
            println!("{}", profile.summary());
            let critical: String = analyzer.critical_keys(&profile).into_iter().collect();
            if !critical.is_empty() {
                println!("Critical keys: {critical}");
            }
        }
        Command::Rank { wpm } => {
            let progress = match wpm {
                Some(wpm) => RankProgress::for_wpm(*wpm),
                None => RankProgress::from_history(&SessionHistory::load(
                    &store,
                    cfg.history_capacity,
                )?),
            };
            print_rank(&progress);
            tracing::debug!(version = RANK_TABLE_VERSION, "rank table");
        }
        Command::Drill { words } => {
            let analyzer = WeaknessAnalyzer::with_settings(&mut store, settings);
            let critical = analyzer
                .load_profile()?
                .map(|profile| analyzer.critical_keys(&profile))
                .unwrap_or_default();
            let config = DrillConfig {
                word_count: *words,
                ..DrillConfig::default()
            };
            let drill = generate_drill(&critical, &config, &mut rand::thread_rng());
            println!("{}", drill.title);
            println!("{}", drill.content);
        }
        Command::Export { out } => {
            let history = SessionHistory::load(&store, cfg.history_capacity)?;
            let mut writer = csv::Writer::from_path(out)?;
            writer.write_record(["id", "lesson_id", "date", "wpm", "accuracy", "keystrokes"])?;
            for session in history.iter() {
                let date = DateTime::<Utc>::from_timestamp_millis(session.timestamp_ms)
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_default();
                let keystrokes = session.replay().map_or(0, |r| r.events.len());
                writer.write_record([
                    session.id.clone(),
                    session.lesson_id.clone(),
                    date,
                    session.wpm.to_string(),
                    session.accuracy.to_string(),
                    keystrokes.to_string(),
                ])?;
            }
            writer.flush()?;
            println!("Exported {} sessions to {}", history.len(), out.display());
        }
        Command::Reset => {
            let mut history = SessionHistory::load(&store, cfg.history_capacity)?;
            history.clear();
            history.save(&mut store)?;
            WeaknessAnalyzer::with_settings(&mut store, settings).reset_profile()?;
            println!("Cleared history and weakness profile");
        }
    }

    Ok(())
}
