//! Scratch configuration from environment variables or TOML.
//!
//! Invalid or missing environment values fall back to defaults without
//! failing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `SCRATCH_HOST_CAPACITY` | 67108864 | Host arena size (bytes) |
//! | `SCRATCH_PINNED_CAPACITY` | 16777216 | Pinned arena size (bytes) |
//! | `SCRATCH_DEVICE_CAPACITY` | 268435456 | Device arena size (bytes) |
//! | `SCRATCH_UNIFIED_CAPACITY` | 16777216 | Unified arena size (bytes) |
//! | `SCRATCH_MAX_ALIGNMENT` | 4096 | Largest supported alignment (bytes) |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::MemoryKind;

const MIN_ALIGNMENT: usize = 64;

/// Arena sizes and alignment limit for an [`ArenaScratchpad`].
///
/// [`ArenaScratchpad`]: crate::memory::ArenaScratchpad
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScratchConfig {
    pub host_capacity: usize,
    pub pinned_capacity: usize,
    pub device_capacity: usize,
    pub unified_capacity: usize,
    /// Power of two; every arena base is aligned to it.
    pub max_alignment: usize,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            host_capacity: 64 * 1024 * 1024,
            pinned_capacity: 16 * 1024 * 1024,
            device_capacity: 256 * 1024 * 1024,
            unified_capacity: 16 * 1024 * 1024,
            max_alignment: 4096,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid scratch config: {0}")]
    Parse(String),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("max_alignment must be a power of two, got {0}")]
    InvalidAlignment(usize),
}

impl ScratchConfig {
    /// Parse a TOML document; absent keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_alignment.is_power_of_two() {
            return Err(ConfigError::InvalidAlignment(self.max_alignment));
        }
        Ok(())
    }

    pub fn capacity(&self, kind: MemoryKind) -> usize {
        match kind {
            MemoryKind::Host => self.host_capacity,
            MemoryKind::Pinned => self.pinned_capacity,
            MemoryKind::Device => self.device_capacity,
            MemoryKind::Unified => self.unified_capacity,
        }
    }

    /// Capacities indexed by [`MemoryKind::index`].
    pub fn capacities(&self) -> [usize; MemoryKind::COUNT] {
        MemoryKind::ALL.map(|kind| self.capacity(kind))
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Load configuration from `SCRATCH_*` environment variables.
///
/// `max_alignment` is rounded up to a power of two and never drops below 64.
pub fn load() -> ScratchConfig {
    let defaults = ScratchConfig::default();
    let max_alignment = parse_usize("SCRATCH_MAX_ALIGNMENT", defaults.max_alignment)
        .max(MIN_ALIGNMENT)
        .checked_next_power_of_two()
        .unwrap_or(defaults.max_alignment);

    ScratchConfig {
        host_capacity: parse_usize("SCRATCH_HOST_CAPACITY", defaults.host_capacity),
        pinned_capacity: parse_usize("SCRATCH_PINNED_CAPACITY", defaults.pinned_capacity),
        device_capacity: parse_usize("SCRATCH_DEVICE_CAPACITY", defaults.device_capacity),
        unified_capacity: parse_usize("SCRATCH_UNIFIED_CAPACITY", defaults.unified_capacity),
        max_alignment,
    }
}
