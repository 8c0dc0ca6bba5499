use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Runtime settings, read from `FLEETBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub wal_file: String,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub compact_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            wal_file: "fleetbook.wal".into(),
            metrics_port: None,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparsable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            data_dir: lookup("FLEETBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            wal_file: lookup("FLEETBOOK_WAL_FILE")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.wal_file),
            metrics_port: parse_var(&lookup, "FLEETBOOK_METRICS_PORT"),
            compact_threshold: parse_var(&lookup, "FLEETBOOK_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            compact_interval: parse_var(&lookup, "FLEETBOOK_COMPACT_INTERVAL_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.compact_interval),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(&self.wal_file)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}
