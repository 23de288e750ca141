use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;
const DEFAULT_COMPACT_INTERVAL_SECS: u64 = 60;
const WAL_FILE_NAME: &str = "fleet.wal";

/// Process-level settings, read from `RENTAL_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Prometheus exporter port; metrics stay in-process when unset.
    pub metrics_port: Option<u16>,
    /// WAL appends between compactions.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            metrics_port: None,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            compact_interval: Duration::from_secs(DEFAULT_COMPACT_INTERVAL_SECS),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset or unparsable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let data_dir = lookup("RENTAL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let metrics_port: Option<u16> = lookup("RENTAL_METRICS_PORT").and_then(|s| s.parse().ok());
        let compact_threshold: u64 = lookup("RENTAL_COMPACT_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.compact_threshold);
        let compact_interval = lookup("RENTAL_COMPACT_INTERVAL_SECS")
            .and_then(|s| s.parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.compact_interval);
        Self {
            data_dir,
            metrics_port,
            compact_threshold,
            compact_interval,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup_from(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.wal_path(), PathBuf::from("./data/fleet.wal"));
    }

    #[test]
    fn reads_every_variable() {
        let config = Config::from_lookup(lookup_from(&[
            ("RENTAL_DATA_DIR", "/var/lib/rental"),
            ("RENTAL_METRICS_PORT", "9100"),
            ("RENTAL_COMPACT_THRESHOLD", "50"),
            ("RENTAL_COMPACT_INTERVAL_SECS", "5"),
        ]));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/rental"));
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.compact_threshold, 50);
        assert_eq!(config.compact_interval, Duration::from_secs(5));
        assert_eq!(config.wal_path(), PathBuf::from("/var/lib/rental/fleet.wal"));
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("RENTAL_METRICS_PORT", "not-a-port"),
            ("RENTAL_COMPACT_THRESHOLD", "-3"),
            ("RENTAL_COMPACT_INTERVAL_SECS", "0"),
        ]));
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.compact_threshold, DEFAULT_COMPACT_THRESHOLD);
        assert_eq!(config.compact_interval, Duration::from_secs(DEFAULT_COMPACT_INTERVAL_SECS));
    }
}
