//! # Unit Registry
//!
//! Resolves a task name to the executable unit that runs it. The registry is
//! an external collaborator: the engine only consumes [`UnitRegistry::resolve`].
//!
//! Two implementations ship with the crate:
//!
//! - **[`StaticRegistry`]**: in-memory map, populated programmatically
//! - **[`JsonRegistry`]**: loads `script_registry.json`, a JSON object keyed
//!   by unit name
//!
//! ```json
//! {
//!   "data_collector": { "location": "brain_scripts/data_collector.sh", "enabled": true },
//!   "learning_module": { "location": "learning_module", "kind": "in_process" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// How a unit is executed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Entry point registered in the process-local unit catalog
    InProcess,
    /// Executable path run as a child process
    #[default]
    ExternalProcess,
}

/// Where and how a task's executable unit runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitDescriptor {
    /// Unit name; filled from the registry key when omitted
    #[serde(default)]
    pub name: String,
    /// Catalog entry name for in-process units, executable path otherwise
    pub location: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub kind: UnitKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl UnitDescriptor {
    pub fn external(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            enabled: true,
            kind: UnitKind::ExternalProcess,
            version: None,
            description: None,
        }
    }

    pub fn in_process(name: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            kind: UnitKind::InProcess,
            ..Self::external(name, entry_point)
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Lookup capability consumed by the dispatcher
pub trait UnitRegistry: Send + Sync {
    /// Return the descriptor registered for `name`, enabled or not
    fn resolve(&self, name: &str) -> Option<UnitDescriptor>;
}

/// Errors while loading a registry file
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Failed to read registry {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid registry {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// In-memory registry
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    units: HashMap<String, UnitDescriptor>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit(mut self, unit: UnitDescriptor) -> Self {
        self.insert(unit);
        self
    }

    pub fn insert(&mut self, unit: UnitDescriptor) {
        self.units.insert(unit.name.clone(), unit);
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl UnitRegistry for StaticRegistry {
    fn resolve(&self, name: &str) -> Option<UnitDescriptor> {
        self.units.get(name).cloned()
    }
}

/// Registry backed by a `script_registry.json` file
#[derive(Debug, Clone, Default)]
pub struct JsonRegistry {
    inner: StaticRegistry,
    source: Option<PathBuf>,
}

impl JsonRegistry {
    /// Load the registry file. A missing file yields an empty registry.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Script registry not found at {:?}, using empty registry", path);
            return Ok(Self {
                inner: StaticRegistry::new(),
                source: Some(path.to_path_buf()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_json_str(&content).map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Loaded script registry with {} units", registry.len());
        Ok(Self {
            source: Some(path.to_path_buf()),
            ..registry
        })
    }

    /// Load the registry file, logging and swallowing any error
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(registry) => registry,
            Err(e) => {
                error!("Failed to load script registry: {}", e);
                Self::default()
            }
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self, serde_json::Error> {
        let entries: HashMap<String, UnitDescriptor> = serde_json::from_str(content)?;
        let mut inner = StaticRegistry::new();
        for (name, mut unit) in entries {
            if unit.name.is_empty() {
                unit.name = name.clone();
            }
            debug!("Registered unit {} ({:?})", name, unit.kind);
            inner.units.insert(name, unit);
        }
        Ok(Self {
            inner,
            source: None,
        })
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl UnitRegistry for JsonRegistry {
    fn resolve(&self, name: &str) -> Option<UnitDescriptor> {
        self.inner.resolve(name)
    }
}
