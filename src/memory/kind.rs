// Copyright 2024-2026 Scratch-Core Contributors
// Licensed under the Apache License, Version 2.0

//! Memory kinds and the access capability each one carries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Memory space a scratch allocation lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// Ordinary pageable host memory
    Host,
    /// Page-locked host memory, usable as a DMA source
    Pinned,
    /// Device-resident memory
    Device,
    /// Memory addressable from both host and device
    Unified,
}

/// Which processors can dereference an address in a given memory kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageAccess {
    Host,
    Device,
    Both,
}

impl StorageAccess {
    pub const fn is_host_accessible(self) -> bool {
        matches!(self, Self::Host | Self::Both)
    }

    pub const fn is_device_accessible(self) -> bool {
        matches!(self, Self::Device | Self::Both)
    }
}

impl MemoryKind {
    /// Number of memory kinds.
    pub const COUNT: usize = 4;

    /// All kinds, in index order.
    pub const ALL: [MemoryKind; Self::COUNT] = [
        MemoryKind::Host,
        MemoryKind::Pinned,
        MemoryKind::Device,
        MemoryKind::Unified,
    ];

    /// Dense index, stable across releases, for per-kind tables.
    pub const fn index(self) -> usize {
        match self {
            MemoryKind::Host => 0,
            MemoryKind::Pinned => 1,
            MemoryKind::Device => 2,
            MemoryKind::Unified => 3,
        }
    }

    pub const fn access(self) -> StorageAccess {
        match self {
            MemoryKind::Host | MemoryKind::Pinned => StorageAccess::Host,
            MemoryKind::Device => StorageAccess::Device,
            MemoryKind::Unified => StorageAccess::Both,
        }
    }

    pub const fn is_host_accessible(self) -> bool {
        self.access().is_host_accessible()
    }

    pub const fn is_device_accessible(self) -> bool {
        self.access().is_device_accessible()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            MemoryKind::Host => "host",
            MemoryKind::Pinned => "pinned",
            MemoryKind::Device => "device",
            MemoryKind::Unified => "unified",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown memory kind name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown memory kind: {0}")]
pub struct UnknownMemoryKind(pub String);

impl FromStr for MemoryKind {
    type Err = UnknownMemoryKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(MemoryKind::Host),
            "pinned" => Ok(MemoryKind::Pinned),
            "device" | "gpu" => Ok(MemoryKind::Device),
            "unified" | "managed" => Ok(MemoryKind::Unified),
            _ => Err(UnknownMemoryKind(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_table() {
        assert_eq!(MemoryKind::Host.access(), StorageAccess::Host);
        assert_eq!(MemoryKind::Pinned.access(), StorageAccess::Host);
        assert_eq!(MemoryKind::Device.access(), StorageAccess::Device);
        assert_eq!(MemoryKind::Unified.access(), StorageAccess::Both);
    }

    #[test]
    fn host_and_device_readability() {
        let host_readable: Vec<_> = MemoryKind::ALL
            .iter()
            .filter(|k| k.is_host_accessible())
            .copied()
            .collect();
        assert_eq!(
            host_readable,
            vec![MemoryKind::Host, MemoryKind::Pinned, MemoryKind::Unified]
        );

        let device_readable: Vec<_> = MemoryKind::ALL
            .iter()
            .filter(|k| k.is_device_accessible())
            .copied()
            .collect();
        assert_eq!(device_readable, vec![MemoryKind::Device, MemoryKind::Unified]);
    }

    #[test]
    fn index_matches_all_order() {
        for (i, kind) in MemoryKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn display_and_parse() {
        for kind in MemoryKind::ALL {
            assert_eq!(kind.to_string().parse::<MemoryKind>(), Ok(kind));
        }
        assert_eq!("GPU".parse::<MemoryKind>(), Ok(MemoryKind::Device));
        assert!("texture".parse::<MemoryKind>().is_err());
    }
}
