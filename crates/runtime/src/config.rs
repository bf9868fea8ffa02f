//! Heap configuration
//!
//! Initial capacities for the four stack roles, an optional bound on the
//! collector's trace worklist and an optional byte budget for the allocation
//! counter. Loaded from TOML or from environment
//! variables; every field has a default so an empty document is valid.
//!
//! ```toml
//! initial_frames = 8
//! initial_objects = 256
//! initial_roots = 8
//! initial_worklist = 64
//! max_worklist = 4096
//! memory_limit = 1048576
//! ```
//!
//! Environment overrides (applied on top of defaults by [`HeapConfig::from_env`]):
//! - `SNEK_MEMORY_LIMIT`: byte budget
//! - `SNEK_INITIAL_OBJECTS`: initial registry capacity

use serde::Deserialize;
use snek_core::DEFAULT_STACK_CAPACITY;
use std::fmt;
use std::path::Path;

/// Error loading a [`HeapConfig`]
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read
    Io(std::io::Error),
    /// Config document is not valid TOML or has wrong field types
    Parse(String),
    /// A field has a value the heap cannot use
    InvalidValue { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read heap config: {}", e),
            ConfigError::Parse(msg) => write!(f, "Failed to parse heap config: {}", msg),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid heap config value for '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

/// Heap configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeapConfig {
    /// Initial capacity of the frame stack
    pub initial_frames: usize,
    /// Initial capacity of the object registry
    pub initial_objects: usize,
    /// Initial capacity of each frame's root list
    pub initial_roots: usize,
    /// Initial capacity of the collector's trace worklist
    pub initial_worklist: usize,
    /// Most entries the trace worklist may hold; a cycle that needs more is
    /// abandoned (unbounded when absent)
    pub max_worklist: Option<usize>,
    /// Byte budget for the allocation counter (unlimited when absent)
    pub memory_limit: Option<usize>,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            initial_frames: DEFAULT_STACK_CAPACITY,
            initial_objects: DEFAULT_STACK_CAPACITY,
            initial_roots: DEFAULT_STACK_CAPACITY,
            initial_worklist: DEFAULT_STACK_CAPACITY,
            max_worklist: None,
            memory_limit: None,
        }
    }
}

impl HeapConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: HeapConfig =
            toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from environment variables
    ///
    /// Unset or unparsable variables keep their default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let memory_limit = std::env::var("SNEK_MEMORY_LIMIT")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .filter(|&v: &usize| v > 0);

        let initial_objects = std::env::var("SNEK_INITIAL_OBJECTS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .filter(|&v: &usize| v > 0)
            .unwrap_or(defaults.initial_objects);

        Self {
            initial_objects,
            memory_limit,
            ..defaults
        }
    }

    /// Set the byte budget
    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = Some(limit);
        self
    }

    /// Reject values the heap cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacities = [
            ("initial_frames", self.initial_frames),
            ("initial_objects", self.initial_objects),
            ("initial_roots", self.initial_roots),
            ("initial_worklist", self.initial_worklist),
        ];
        for (field, value) in capacities {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "capacity must be at least 1".to_string(),
                });
            }
        }

        if self.max_worklist == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_worklist",
                reason: "bound must be at least 1; omit it for no bound".to_string(),
            });
        }

        if self.memory_limit == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "memory_limit",
                reason: "limit must be positive; omit it for no limit".to_string(),
            });
        }

        Ok(())
    }
}
