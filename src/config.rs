//! Bridge Configuration
//!
//! Handles parsing of bfbridge.toml: where the engine artifact lives, which
//! symbols to bind, and how the dispatch worker is set up.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::handle::library_filename;

/// Name of the configuration file searched for by [`BridgeConfig::find_and_load`]
pub const CONFIG_FILE: &str = "bfbridge.toml";

/// Environment variable that overrides the resolved engine path
pub const ENGINE_PATH_ENV: &str = "BFBRIDGE_ENGINE_PATH";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching bfbridge.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Engine artifact location and entry points
    #[serde(default)]
    pub engine: EngineConfig,

    /// Dispatch worker settings
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub root: Option<PathBuf>,
}

impl BridgeConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let mut config: BridgeConfig = toml::from_str(&content)?;
        config.root = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Load configuration from the current directory or parents.
    pub fn load_from_cwd() -> ConfigResult<Self> {
        let cwd = std::env::current_dir().map_err(ConfigError::Io)?;
        Self::find_and_load(&cwd)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Self::load(&config_path);
            }
            if !dir.pop() {
                // Reached root without finding config
                return Ok(Self {
                    root: Some(start_dir.to_path_buf()),
                    ..Self::default()
                });
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Full path of the engine artifact.
    ///
    /// `BFBRIDGE_ENGINE_PATH` wins when set; otherwise the configured
    /// directory (resolved against `root`) joined with the platform filename.
    pub fn engine_path(&self) -> PathBuf {
        if let Some(path) = std::env::var_os(ENGINE_PATH_ENV) {
            return PathBuf::from(path);
        }
        let dir = Path::new(&self.engine.directory);
        let dir = match &self.root {
            Some(root) if dir.is_relative() => root.join(dir),
            _ => dir.to_path_buf(),
        };
        dir.join(self.engine.filename())
    }
}

/// Engine artifact settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Library stem, without platform prefix or extension
    #[serde(default = "default_library")]
    pub library: String,

    /// Directory holding the built library
    #[serde(default = "default_directory")]
    pub directory: String,

    /// Override the platform extension (`so`, `dylib`, `dll`)
    #[serde(default)]
    pub extension: Option<String>,

    /// Name of the execute entry point
    #[serde(default = "default_exec_symbol")]
    pub exec_symbol: String,

    /// Name of the free entry point
    #[serde(default = "default_free_symbol")]
    pub free_symbol: String,
}

fn default_library() -> String {
    "bfbridge_engine".to_string()
}

fn default_directory() -> String {
    "target/release".to_string()
}

fn default_exec_symbol() -> String {
    "bf_exec".to_string()
}

fn default_free_symbol() -> String {
    "bf_free".to_string()
}

impl EngineConfig {
    /// Platform-specific filename of the artifact
    pub fn filename(&self) -> String {
        library_filename(&self.library, self.extension.as_deref())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            library: default_library(),
            directory: default_directory(),
            extension: None,
            exec_symbol: default_exec_symbol(),
            free_symbol: default_free_symbol(),
        }
    }
}

/// Dispatch worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Name given to the worker thread
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// How often a cancellable wait checks its token, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_thread_name() -> String {
    "bfbridge-worker".to_string()
}

fn default_poll_interval_ms() -> u64 {
    50
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.engine.library, "bfbridge_engine");
        assert_eq!(config.engine.exec_symbol, "bf_exec");
        assert_eq!(config.engine.free_symbol, "bf_free");
        assert_eq!(config.worker.poll_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[engine]
library = "tape"
directory = "/opt/engines"
extension = "so"

[worker]
thread_name = "tape-worker"
"#;
        let config: BridgeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.library, "tape");
        assert_eq!(config.engine.filename(), "libtape.so");
        assert_eq!(config.engine.exec_symbol, "bf_exec");
        assert_eq!(config.worker.thread_name, "tape-worker");
        assert_eq!(config.worker.poll_interval_ms, 50);
    }

    #[test]
    fn test_relative_directory_resolves_against_root() {
        let config = BridgeConfig {
            engine: EngineConfig {
                extension: Some("so".to_string()),
                ..EngineConfig::default()
            },
            root: Some(PathBuf::from("/srv/project")),
            ..BridgeConfig::default()
        };
        if std::env::var_os(ENGINE_PATH_ENV).is_none() {
            assert_eq!(
                config.engine_path(),
                PathBuf::from("/srv/project/target/release/libbfbridge_engine.so")
            );
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut config = BridgeConfig::default();
        config.worker.poll_interval_ms = 5;
        config.save(&path).unwrap();

        let loaded = BridgeConfig::find_and_load(dir.path()).unwrap();
        assert_eq!(loaded.worker.poll_interval_ms, 5);
        assert_eq!(loaded.root.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_missing_file() {
        let err = BridgeConfig::load(Path::new("/definitely/not/here/bfbridge.toml"));
        assert!(matches!(err, Err(ConfigError::NotFound(_))));
    }
}
