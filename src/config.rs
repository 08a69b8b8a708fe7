//! Configuration model and discovery
//!
//! Configuration is read from the first existing file in this hierarchy:
//! 1. Current directory: ./autobrain.toml or ./.autobrain/config.toml
//! 2. User config: ~/.autobrain/config.toml
//! 3. System config: /etc/autobrain/config.toml
//! 4. Built-in defaults
//!
//! Relative paths inside the file are resolved against `project_root`.

use crate::env;
use crate::executor::ExecutorConfig;
use crate::task::RoutingTable;
use serde::{Deserialize, Serialize};
use std::env as std_env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration to TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub project_root: PathBuf,
    pub scripts_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub registry_path: PathBuf,
    pub executor: ExecutorSettings,
    pub dispatch: DispatchSettings,
    pub logging: LoggingSettings,
    /// Replaces the built-in routing tables when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingTable>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorSettings {
    pub default_timeout_secs: u64,
    pub max_timeout_secs: u64,
    pub history_capacity: usize,
    pub batch_pause_ms: u64,
    pub write_run_logs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchSettings {
    pub max_per_cycle: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing` filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Also write a daily rolling file under `logs_dir`
    pub file: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            scripts_dir: PathBuf::from(env::SCRIPTS_DIR_NAME),
            logs_dir: PathBuf::from(env::LOGS_DIR_NAME),
            registry_path: env::default_registry_path(),
            executor: ExecutorSettings::default(),
            dispatch: DispatchSettings::default(),
            logging: LoggingSettings::default(),
            routing: None,
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: 300,
            max_timeout_secs: 1800,
            history_capacity: 100,
            batch_pause_ms: 1000,
            write_run_logs: true,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self { max_per_cycle: 5 }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: true,
        }
    }
}

impl EngineConfig {
    /// Defaults rooted at `project_root`
    pub fn for_project(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Default::default()
        }
    }

    /// Anchor a relative `project_root` at the current directory
    pub fn with_absolute_root(mut self) -> Self {
        if self.project_root.is_relative() {
            match std::path::absolute(&self.project_root) {
                Ok(root) => self.project_root = root,
                Err(e) => warn!(
                    "Could not make project root {:?} absolute: {}",
                    self.project_root, e
                ),
            }
        }
        self
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Convert configuration to a TOML string
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let executor = &self.executor;
        if executor.default_timeout_secs == 0 || executor.max_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if executor.default_timeout_secs > executor.max_timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "default_timeout_secs ({}) exceeds max_timeout_secs ({})",
                executor.default_timeout_secs, executor.max_timeout_secs
            )));
        }
        if executor.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve a configured path against `project_root`
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn scripts_dir_path(&self) -> PathBuf {
        self.resolve(&self.scripts_dir)
    }

    pub fn logs_dir_path(&self) -> PathBuf {
        self.resolve(&self.logs_dir)
    }

    pub fn registry_file_path(&self) -> PathBuf {
        self.resolve(&self.registry_path)
    }

    pub fn routing_table(&self) -> RoutingTable {
        self.routing.clone().unwrap_or_default()
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            default_timeout: Duration::from_secs(self.executor.default_timeout_secs),
            max_timeout: Duration::from_secs(self.executor.max_timeout_secs),
            history_capacity: self.executor.history_capacity,
            batch_pause: Duration::from_millis(self.executor.batch_pause_ms),
            working_dir: self.project_root.clone(),
            run_log_dir: self
                .executor
                .write_run_logs
                .then(|| self.logs_dir_path()),
        }
    }
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Discover and load configuration using the hierarchy
    pub fn discover_config() -> Result<EngineConfig, ConfigError> {
        if let Some(config_path) = Self::find_config_file() {
            info!("Loading configuration from: {:?}", config_path);
            return EngineConfig::from_toml_file(config_path);
        }

        info!("No configuration file found, using defaults");
        Ok(EngineConfig::default())
    }

    /// Explicit path wins over discovery
    pub fn load(config_override: Option<&Path>) -> Result<EngineConfig, ConfigError> {
        match config_override {
            Some(path) => {
                info!("Loading configuration override from: {:?}", path);
                EngineConfig::from_toml_file(path)
            }
            None => Self::discover_config(),
        }
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        for candidate in Self::config_candidates() {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// Configuration file candidates in priority order
    pub fn config_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = std_env::current_dir() {
            candidates.push(env::project_config_file_path(&current_dir));
            candidates.push(env::local_config_file_path(&current_dir));
        }

        if let Some(home_dir) = Self::home_dir() {
            candidates.push(env::user_config_file_path(&home_dir));
        }

        #[cfg(unix)]
        candidates.push(PathBuf::from(env::SYSTEM_CONFIG_FILE_PATH));

        candidates
    }

    fn home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskKind, TriggerRoute};
    use tempfile::TempDir;

    #[test]
    fn test_relative_project_root_is_anchored() {
        let config = EngineConfig::for_project("proj").with_absolute_root();
        let cwd = std_env::current_dir().unwrap();

        assert_eq!(config.project_root, cwd.join("proj"));
        assert_eq!(
            config.scripts_dir_path(),
            cwd.join("proj").join("brain_scripts")
        );

        let absolute = EngineConfig::for_project("/srv/brain").with_absolute_root();
        assert_eq!(absolute.project_root, Path::new("/srv/brain"));
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.scripts_dir, Path::new("brain_scripts"));
        assert_eq!(
            config.registry_file_path(),
            Path::new("./logs/configs/script_registry.json")
        );
        assert_eq!(config.dispatch.max_per_cycle, 5);

        let executor = config.executor_config();
        assert_eq!(executor.default_timeout, Duration::from_secs(300));
        assert_eq!(executor.max_timeout, Duration::from_secs(1800));
        assert_eq!(executor.history_capacity, 100);
        assert_eq!(executor.batch_pause, Duration::from_secs(1));
        assert_eq!(executor.run_log_dir, Some(PathBuf::from("./logs")));
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
project_root = "/srv/brain"

[executor]
default_timeout_secs = 10
write_run_logs = false
"#,
        )
        .unwrap();

        assert_eq!(config.executor.default_timeout_secs, 10);
        assert_eq!(config.executor.max_timeout_secs, 1800);
        assert_eq!(config.scripts_dir_path(), Path::new("/srv/brain/brain_scripts"));
        assert!(config.executor_config().run_log_dir.is_none());
        assert!(config.routing.is_none());
        assert!(config.routing_table().goals.contains_key("evolve"));
    }

    #[test]
    fn test_routing_override() {
        let config = EngineConfig::from_toml_str(
            r#"
[routing.triggers.ping]
unit = "pinger"
kind = "utility"
priority = 3
"#,
        )
        .unwrap();

        let table = config.routing_table();
        assert_eq!(
            table.triggers.get("ping"),
            Some(&TriggerRoute {
                unit: "pinger".to_string(),
                kind: TaskKind::Utility,
                priority: 3,
            })
        );
        assert!(!table.triggers.contains_key("teach"));
    }

    #[test]
    fn test_validation_rejects_inverted_timeouts() {
        let err = EngineConfig::from_toml_str(
            r#"
[executor]
default_timeout_secs = 100
max_timeout_secs = 10
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = EngineConfig::from_toml_str("executor = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_config_file_operations() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("autobrain.toml");

        let mut original = EngineConfig::for_project(temp_dir.path());
        original.dispatch.max_per_cycle = 2;
        original.routing = Some(RoutingTable::default());

        original.to_toml_file(&config_path).unwrap();
        let loaded = EngineConfig::from_toml_file(&config_path).unwrap();
        assert_eq!(original, loaded);

        let missing = EngineConfig::from_toml_file(temp_dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_config_candidates() {
        let candidates = ConfigDiscovery::config_candidates();
        assert!(!candidates.is_empty());
        assert_eq!(candidates[0].file_name().unwrap(), "autobrain.toml");
    }
}
