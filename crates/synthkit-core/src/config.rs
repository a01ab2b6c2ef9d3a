//! # Configuration File Parser
//!
//! Reads and parses `synthkit.toml`, the optional configuration file that tunes
//! generation and names the warehouse backends. Supports:
//!
//! - `[generation]`: batch size, worker count, NULL probabilities, artifact root
//! - `[warehouse]`: connection URLs for the analytics, cloud emulator and
//!   embedded backends
//! - `[runs]`: run state directory and the stale-run threshold
//!
//! Example `synthkit.toml`:
//!
//! ```toml
//! [generation]
//! batch_size = 10000
//! workers = 4
//! null_probability = 0.05
//! fk_null_probability = 0.10
//! artifact_root = ".synthkit/artifacts"
//!
//! [warehouse]
//! analytics = "postgres://localhost/analytics"
//! embedded = "sqlite://.synthkit/warehouse.db?mode=rwc"
//!
//! [runs]
//! state_dir = ".synthkit/runs"
//! stale_after_secs = 3600
//! ```
//!
//! Warehouse URLs may also come from the environment (`SYNTHKIT_ANALYTICS_URL`,
//! `SYNTHKIT_CLOUD_EMULATOR_URL`, `SYNTHKIT_EMBEDDED_URL`), which take
//! precedence over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SynthKitError};

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = "synthkit.toml";

/// Default number of rows per batch.
pub const DEFAULT_BATCH_SIZE: u64 = 10_000;

/// Default probability of NULL for optional, non-unique columns.
pub const DEFAULT_NULL_PROBABILITY: f64 = 0.05;

/// Default probability of NULL for nullable foreign keys.
pub const DEFAULT_FK_NULL_PROBABILITY: f64 = 0.10;

pub const ENV_ANALYTICS_URL: &str = "SYNTHKIT_ANALYTICS_URL";
pub const ENV_CLOUD_EMULATOR_URL: &str = "SYNTHKIT_CLOUD_EMULATOR_URL";
pub const ENV_EMBEDDED_URL: &str = "SYNTHKIT_EMBEDDED_URL";

/// Top-level synthkit.toml structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SynthKitConfig {
    /// Generation engine settings.
    pub generation: GenerationConfig,
    /// Warehouse backend URLs.
    pub warehouse: WarehouseConfig,
    /// Run persistence settings.
    pub runs: RunsConfig,

    /// Absolute path to the directory containing synthkit.toml.
    ///
    /// Relative `artifact_root` and `state_dir` values resolve against it.
    #[serde(skip)]
    pub config_dir: Option<PathBuf>,
}

/// Generation engine settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Rows per batch.
    pub batch_size: u64,
    /// Worker pool size. `None` means available cores minus one (at least 1).
    pub workers: Option<usize>,
    /// NULL probability for optional, non-unique columns.
    pub null_probability: f64,
    /// NULL probability for nullable foreign keys.
    pub fk_null_probability: f64,
    /// Where batch artifacts are written.
    pub artifact_root: PathBuf,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: None,
            null_probability: DEFAULT_NULL_PROBABILITY,
            fk_null_probability: DEFAULT_FK_NULL_PROBABILITY,
            artifact_root: PathBuf::from(".synthkit/artifacts"),
        }
    }
}

impl GenerationConfig {
    /// The effective worker pool size.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(default_worker_count).max(1)
    }
}

/// Available cores minus one, never below one.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Warehouse backend URLs. Unset backends are unavailable, except the
/// embedded one, which falls back to a SQLite file in the state directory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub analytics: Option<String>,
    pub cloud_emulator: Option<String>,
    pub embedded: Option<String>,
}

/// Run persistence settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunsConfig {
    /// Directory holding one JSON file per generation run.
    pub state_dir: PathBuf,
    /// If set, RUNNING runs older than this are marked ABORTED at start-up.
    pub stale_after_secs: Option<u64>,
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".synthkit/runs"),
            stale_after_secs: None,
        }
    }
}

impl RunsConfig {
    pub fn stale_after(&self) -> Option<Duration> {
        self.stale_after_secs.map(Duration::from_secs)
    }
}

/// Read and parse a synthkit.toml file from the given directory.
///
/// Returns `None` if the file doesn't exist (config is optional).
/// Returns an error if the file exists but can't be parsed.
pub fn read_config(dir: &Path) -> Result<Option<SynthKitConfig>> {
    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path).map_err(|e| SynthKitError::Config {
        message: format!("Failed to read {}: {}", path.display(), e),
    })?;

    let mut config: SynthKitConfig =
        toml::from_str(&content).map_err(|e| SynthKitError::Config {
            message: format!("Failed to parse {}: {}", path.display(), e),
        })?;

    config.config_dir = Some(std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf()));
    config.validate()?;

    Ok(Some(config))
}

/// Load the configuration for a working directory: `.env` first, then
/// synthkit.toml (or defaults), then environment overrides.
pub fn load_config(dir: &Path) -> Result<SynthKitConfig> {
    // A missing .env is normal.
    let _ = dotenvy::from_path(dir.join(".env"));

    let mut config = read_config(dir)?.unwrap_or_else(|| SynthKitConfig {
        config_dir: Some(dir.to_path_buf()),
        ..Default::default()
    });
    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

impl SynthKitConfig {
    /// Overlay warehouse URLs from the environment. The lookup is injected so
    /// tests don't have to mutate process-wide state.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_ANALYTICS_URL) {
            self.warehouse.analytics = Some(url);
        }
        if let Some(url) = non_empty(ENV_CLOUD_EMULATOR_URL) {
            self.warehouse.cloud_emulator = Some(url);
        }
        if let Some(url) = non_empty(ENV_EMBEDDED_URL) {
            self.warehouse.embedded = Some(url);
        }
    }

    /// Validate semantic constraints that serde cannot enforce.
    pub fn validate(&self) -> Result<()> {
        let g = &self.generation;
        if g.batch_size == 0 {
            return Err(SynthKitError::Config {
                message: "generation.batch_size must be greater than 0".to_string(),
            });
        }
        if g.workers == Some(0) {
            return Err(SynthKitError::Config {
                message: "generation.workers must be greater than 0 (omit it to use cores - 1)"
                    .to_string(),
            });
        }
        for (key, p) in [
            ("generation.null_probability", g.null_probability),
            ("generation.fk_null_probability", g.fk_null_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(SynthKitError::Config {
                    message: format!("{} must be within [0, 1], got {}", key, p),
                });
            }
        }
        Ok(())
    }

    /// Resolve a configured path against the config directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match (&self.config_dir, path.is_absolute()) {
            (Some(dir), false) => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Absolute artifact root.
    pub fn artifact_root(&self) -> PathBuf {
        self.resolve_path(&self.generation.artifact_root)
    }

    /// Absolute run state directory.
    pub fn state_dir(&self) -> PathBuf {
        self.resolve_path(&self.runs.state_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[generation]
batch_size = 500
workers = 3
null_probability = 0.2
fk_null_probability = 0.0
artifact_root = "/tmp/artifacts"

[warehouse]
analytics = "postgres://localhost/analytics"
cloud_emulator = "mysql://localhost/emulator"
embedded = "sqlite://warehouse.db"

[runs]
state_dir = "state"
stale_after_secs = 60
"#;

        let config: SynthKitConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.generation.batch_size, 500);
        assert_eq!(config.generation.worker_count(), 3);
        assert_eq!(config.generation.null_probability, 0.2);
        assert_eq!(config.generation.fk_null_probability, 0.0);
        assert_eq!(
            config.warehouse.analytics.as_deref(),
            Some("postgres://localhost/analytics")
        );
        assert_eq!(
            config.warehouse.cloud_emulator.as_deref(),
            Some("mysql://localhost/emulator")
        );
        assert_eq!(config.runs.stale_after(), Some(Duration::from_secs(60)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_empty_config() {
        let config: SynthKitConfig = toml::from_str("").unwrap();

        assert_eq!(config.generation.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.generation.null_probability, 0.05);
        assert_eq!(config.generation.fk_null_probability, 0.10);
        assert!(config.generation.worker_count() >= 1);
        assert!(config.warehouse.analytics.is_none());
        assert!(config.runs.stale_after_secs.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let config: SynthKitConfig = toml::from_str("[generation]\nbatch_size = 0").unwrap();
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("batch_size"), "{}", msg);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config: SynthKitConfig = toml::from_str("[generation]\nworkers = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_probability_out_of_range() {
        let config: SynthKitConfig =
            toml::from_str("[generation]\nnull_probability = 1.5").unwrap();
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("null_probability"), "{}", msg);
    }

    #[test]
    fn test_env_overrides_win_over_file() {
        let mut config: SynthKitConfig =
            toml::from_str("[warehouse]\nanalytics = \"postgres://file/db\"").unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_ANALYTICS_URL, "postgres://env/db"),
            (ENV_EMBEDDED_URL, "  "),
        ]
        .into_iter()
        .collect();

        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.warehouse.analytics.as_deref(), Some("postgres://env/db"));
        // Blank values are ignored.
        assert!(config.warehouse.embedded.is_none());
    }

    #[test]
    fn test_read_config_nonexistent() {
        let result = read_config(Path::new("/nonexistent/dir"));
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_read_config_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "this is not valid [[[toml").unwrap();
        assert!(read_config(dir.path()).is_err());
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[runs]\nstate_dir = \"state\"\n",
        )
        .unwrap();

        let config = read_config(dir.path()).unwrap().unwrap();
        let expected = std::fs::canonicalize(dir.path()).unwrap().join("state");
        assert_eq!(config.state_dir(), expected);
    }
}
