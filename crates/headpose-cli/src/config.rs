//! Persistent CLI settings in `~/.headpose/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use headpose_middleware::bus::DEFAULT_CAPACITY;
use headpose_middleware::{DEFAULT_MARKER_LABELS, MarkerSelection};
use headpose_runtime::EstimatorConfig;
use headpose_runtime::estimator::DEFAULT_POLL_INTERVAL_MS;
use headpose_types::{DEFAULT_MARKER_COUNT, PoseError};
use serde::{Deserialize, Serialize};

/// Settings shared by every subcommand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Markers per tracked cluster.
    #[serde(default = "default_marker_count")]
    pub marker_count: usize,

    /// Positions of the tracked markers inside each raw frame.
    #[serde(default = "default_marker_indices")]
    pub marker_indices: Vec<usize>,

    /// Names used in log messages, one per tracked marker.
    #[serde(default = "default_marker_labels")]
    pub marker_labels: Vec<String>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_normalization_tolerance")]
    pub normalization_tolerance: f64,

    /// Events buffered per bus topic before slow subscribers lag.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

fn default_marker_count() -> usize {
    DEFAULT_MARKER_COUNT
}
fn default_marker_indices() -> Vec<usize> {
    (0..DEFAULT_MARKER_COUNT).collect()
}
fn default_marker_labels() -> Vec<String> {
    DEFAULT_MARKER_LABELS.iter().map(|l| l.to_string()).collect()
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_normalization_tolerance() -> f64 {
    EstimatorConfig::default().normalization_tolerance
}
fn default_bus_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            marker_count: default_marker_count(),
            marker_indices: default_marker_indices(),
            marker_labels: default_marker_labels(),
            poll_interval_ms: default_poll_interval_ms(),
            normalization_tolerance: default_normalization_tolerance(),
            bus_capacity: default_bus_capacity(),
        }
    }
}

impl Config {
    pub fn estimator_config(&self) -> EstimatorConfig {
        EstimatorConfig {
            marker_count: self.marker_count,
            poll_interval_ms: self.poll_interval_ms,
            normalization_tolerance: self.normalization_tolerance,
            ..EstimatorConfig::default()
        }
    }

    /// Build the ingestion selection.
    ///
    /// # Errors
    ///
    /// [`PoseError::InvalidInput`] when `marker_indices` disagrees with
    /// `marker_count` or the labels do not line up.
    pub fn marker_selection(&self) -> Result<MarkerSelection, PoseError> {
        if self.marker_indices.len() != self.marker_count {
            return Err(PoseError::InvalidInput(format!(
                "marker_indices lists {} markers but marker_count is {}",
                self.marker_indices.len(),
                self.marker_count
            )));
        }
        MarkerSelection::new(self.marker_indices.clone(), self.marker_labels.clone())
    }
}

/// `~/.headpose/config.toml`, falling back to the working directory when no
/// home directory is known.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".headpose").join("config.toml")
}

/// Read `path` and apply `HEADPOSE_*` overrides.  A missing file yields the
/// defaults (still overridden).
pub fn load_from(path: &Path) -> Result<Config, String> {
    let mut cfg = read_from(path)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

pub(crate) fn read_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw =
        fs::read_to_string(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    toml::from_str(&raw).map_err(|e| format!("cannot parse {}: {e}", path.display()))
}

/// Override fields from the environment.
///
/// | Variable | Field |
/// |---|---|
/// | `HEADPOSE_MARKER_COUNT` | `marker_count` |
/// | `HEADPOSE_POLL_INTERVAL_MS` | `poll_interval_ms` |
/// | `HEADPOSE_BUS_CAPACITY` | `bus_capacity` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(n) = env_number("HEADPOSE_MARKER_COUNT") {
        cfg.marker_count = n;
    }
    if let Some(ms) = env_number("HEADPOSE_POLL_INTERVAL_MS") {
        cfg.poll_interval_ms = ms;
    }
    if let Some(cap) = env_number("HEADPOSE_BUS_CAPACITY") {
        cfg.bus_capacity = cap;
    }
}

fn env_number<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok()?.trim().parse().ok()
}

/// Write `cfg` to `path`, readable by the owner only on Unix.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create {}: {e}", parent.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("cannot restrict {}: {e}", parent.display()))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("cannot serialize config: {e}"))?;

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("cannot write {}: {e}", path.display()))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("cannot write {}: {e}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path(dir: &tempfile::TempDir) -> PathBuf {
        config_path_for_home(&dir.path().to_string_lossy())
    }

    #[test]
    fn path_lives_under_dot_headpose() {
        let p = config_path_for_home("/home/tracker");
        assert_eq!(p, PathBuf::from("/home/tracker/.headpose/config.toml"));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let cfg = read_from(&temp_config_path(&dir)).expect("load");
        assert_eq!(cfg.marker_indices, vec![0, 1, 2, 3]);
        assert_eq!(cfg.marker_labels[2], "chin");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = temp_config_path(&dir);
        let cfg = Config {
            marker_indices: vec![2, 3, 4, 5],
            bus_capacity: 32,
            ..Config::default()
        };
        save_to(&cfg, &path).expect("save");
        let loaded = read_from(&path).expect("load");
        assert_eq!(loaded.marker_indices, vec![2, 3, 4, 5]);
        assert_eq!(loaded.bus_capacity, 32);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "poll_interval_ms = 10\n").expect("write");
        let cfg = read_from(&path).expect("load");
        assert_eq!(cfg.poll_interval_ms, 10);
        assert_eq!(cfg.marker_count, 4);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "marker_count = \"four\"\n").expect("write");
        assert!(read_from(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = temp_config_path(&dir);
        save_to(&Config::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).expect("meta").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let parent = path.parent().expect("parent");
        let dir_mode = fs::metadata(parent).expect("meta").permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn selection_must_match_marker_count() {
        let cfg = Config {
            marker_count: 5,
            ..Config::default()
        };
        assert!(matches!(cfg.marker_selection(), Err(PoseError::InvalidInput(_))));
        assert_eq!(Config::default().marker_selection().expect("sel").len(), 4);
    }

    #[test]
    fn estimator_config_carries_overrides() {
        let cfg = Config {
            poll_interval_ms: 7,
            ..Config::default()
        };
        let est = cfg.estimator_config();
        assert_eq!(est.poll_interval_ms, 7);
        assert_eq!(est.min_spread, EstimatorConfig::default().min_spread);
    }

    // All environment mutation lives in this one test so parallel tests never
    // observe a half-applied override.
    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        // SAFETY: no other test in this binary reads HEADPOSE_* variables.
        unsafe {
            std::env::set_var("HEADPOSE_MARKER_COUNT", "6");
            std::env::set_var("HEADPOSE_POLL_INTERVAL_MS", "not-a-number");
            std::env::set_var("HEADPOSE_BUS_CAPACITY", " 64 ");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("HEADPOSE_MARKER_COUNT");
            std::env::remove_var("HEADPOSE_POLL_INTERVAL_MS");
            std::env::remove_var("HEADPOSE_BUS_CAPACITY");
        }
        assert_eq!(cfg.marker_count, 6);
        assert_eq!(cfg.poll_interval_ms, default_poll_interval_ms());
        assert_eq!(cfg.bus_capacity, 64);
    }
}
