//! Compiler configuration (`flatline.toml`)
//!
//! Every section and field is optional; missing values fall back to the
//! defaults below.
//!
//! ```toml
//! [variables]
//! max_global = 128
//! max_entity = 128
//!
//! [bake]
//! yield_interval = 6
//!
//! [vm]
//! watchdog_budget = 2000
//! max_steps = 1000000
//! trace = false
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::backend::pathfind::DEFAULT_YIELD_INTERVAL;
use crate::backend::target::VmConfig;

/// Default file name looked up next to a program
pub const CONFIG_FILE_NAME: &str = "flatline.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub variables: VariableLimits,
    pub bake: BakeConfig,
    pub vm: VmConfig,
}

/// Size of the target's storage banks
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VariableLimits {
    pub max_global: usize,
    pub max_entity: usize,
}

impl Default for VariableLimits {
    fn default() -> Self {
        Self {
            max_global: 128,
            max_entity: 128,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BakeConfig {
    /// Search ticks between two waits
    pub yield_interval: u32,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            yield_interval: DEFAULT_YIELD_INTERVAL,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            Self::Parse(e) => write!(f, "Invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(e) => Some(e),
        }
    }
}

impl CompilerConfig {
    /// Parse a configuration from TOML content.
    pub fn parse_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_toml(&content).map_err(ConfigError::Parse)
    }

    /// Load `flatline.toml` from `dir` if present, defaults otherwise
    pub fn load_or_default(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}
