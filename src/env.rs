//! Environment constants and path utilities for autobrain.
//!
//! This module centralizes the directory and file names used throughout
//! the application, making them easier to maintain and modify.

use std::path::{Path, PathBuf};

/// Hidden application directory name
pub const AUTOBRAIN_DIR_NAME: &str = ".autobrain";

/// Configuration file name inside the application directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name at a project root
pub const LOCAL_CONFIG_FILE_NAME: &str = "autobrain.toml";

/// System-wide configuration file
#[cfg(unix)]
pub const SYSTEM_CONFIG_FILE_PATH: &str = "/etc/autobrain/config.toml";

/// Directory holding external-process units resolved by name
pub const SCRIPTS_DIR_NAME: &str = "brain_scripts";

/// Directory for per-run log artifacts and the rolling application log
pub const LOGS_DIR_NAME: &str = "logs";

/// Registry file location relative to the project root
pub mod registry {
    /// Directory for configuration artifacts inside the logs directory
    pub const CONFIGS_DIR_NAME: &str = "configs";

    /// Unit registry file name
    pub const REGISTRY_FILE_NAME: &str = "script_registry.json";
}

/// Prefix of the daily rolling application log
pub const APP_LOG_FILE_PREFIX: &str = "autobrain";

/// Registry path relative to a project root
pub fn default_registry_path() -> PathBuf {
    Path::new(LOGS_DIR_NAME)
        .join(registry::CONFIGS_DIR_NAME)
        .join(registry::REGISTRY_FILE_NAME)
}

/// Build config directory path in user's home directory
pub fn user_config_dir_path(home_dir: &Path) -> PathBuf {
    home_dir.join(AUTOBRAIN_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    user_config_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build `./autobrain.toml`
pub fn project_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(LOCAL_CONFIG_FILE_NAME)
}

/// Build `./.autobrain/config.toml`
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(AUTOBRAIN_DIR_NAME).join(CONFIG_FILE_NAME)
}
