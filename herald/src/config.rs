//! Binary configuration and its discovery

use std::path::{Path, PathBuf};

use herald_common::internal;
use herald_delivery::EngineConfig;
use serde::{Deserialize, Serialize};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "HERALD_CONFIG";

const fn default_latency_ms() -> u64 {
    25
}

/// Behaviour of the dry-run senders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryRunConfig {
    /// Simulated gateway round trip per message
    ///
    /// Default: 25 ms
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
}

impl Default for DryRunConfig {
    fn default() -> Self {
        Self {
            latency_ms: default_latency_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub dry_run: DryRunConfig,
}

impl HeraldConfig {
    /// Load `explicit` if given, otherwise whatever [`find_config_file`]
    /// finds, otherwise the defaults
    ///
    /// # Errors
    /// If a configuration file exists but cannot be read or parsed, or
    /// `HERALD_CONFIG` names a file that does not exist
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file()?,
        };

        match path {
            Some(path) => Self::from_path(&path),
            None => {
                internal!(level = INFO, "No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// # Errors
    /// If the file cannot be read or is not valid RON for this struct
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
        })?;
        let config = ron::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse config from {}: {}", path.display(), e)
        })?;

        internal!(level = INFO, path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}

/// Find the configuration file using the following precedence:
/// 1. `HERALD_CONFIG` environment variable
/// 2. ./herald.config.ron (current working directory)
/// 3. /etc/herald/herald.config.ron (system-wide config)
///
/// # Errors
/// If `HERALD_CONFIG` points to a file that does not exist
pub fn find_config_file() -> anyhow::Result<Option<PathBuf>> {
    find_config_in(
        std::env::var(CONFIG_ENV).ok(),
        &[
            PathBuf::from("./herald.config.ron"),
            PathBuf::from("/etc/herald/herald.config.ron"),
        ],
    )
}

fn find_config_in(
    env_path: Option<String>,
    default_paths: &[PathBuf],
) -> anyhow::Result<Option<PathBuf>> {
    if let Some(env_path) = env_path {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    Ok(default_paths.iter().find(|path| path.exists()).cloned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn env_path_takes_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "()").unwrap();
        let fallback = tempfile::NamedTempFile::new().unwrap();

        let found = find_config_in(
            Some(file.path().display().to_string()),
            &[fallback.path().to_path_buf()],
        )
        .unwrap();
        assert_eq!(found.as_deref(), Some(file.path()));
    }

    #[test]
    fn missing_env_path_is_an_error() {
        let result = find_config_in(Some("/definitely/not/here.ron".to_string()), &[]);
        assert!(result.is_err());
    }

    #[test]
    fn first_existing_default_wins() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.ron");
        let present = dir.path().join("herald.config.ron");
        std::fs::write(&present, "()").unwrap();

        let found = find_config_in(None, &[missing, present.clone()]).unwrap();
        assert_eq!(found, Some(present));

        let none = find_config_in(None, &[dir.path().join("nope.ron")]).unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn parse_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("herald.config.ron");
        std::fs::write(
            &path,
            r"(
                engine: (
                    concurrency: 12,
                    shared_rate_limit: true,
                    retry: (max_retries: 4),
                ),
                dry_run: (latency_ms: 0),
            )",
        )
        .unwrap();

        let config = HeraldConfig::load(Some(&path)).unwrap();
        assert_eq!(config.engine.workers(), 12);
        assert!(config.engine.shared_rate_limit);
        assert_eq!(config.engine.retry.max_retries, 4);
        assert_eq!(config.engine.progress_every, 5);
        assert_eq!(config.dry_run.latency_ms, 0);
    }

    #[test]
    fn empty_config_is_default() {
        let config: HeraldConfig = ron::from_str("()").unwrap();
        assert_eq!(config, HeraldConfig::default());
        assert_eq!(config.dry_run.latency_ms, 25);
    }

    #[test]
    fn invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ron");
        std::fs::write(&path, "(engine: (concurrency: \"many\"))").unwrap();

        let error = HeraldConfig::from_path(&path).unwrap_err();
        assert!(error.to_string().starts_with("Failed to parse config"));
    }
}
