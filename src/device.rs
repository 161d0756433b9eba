//! Device identifier parsing.
//!
//! A region is named by a device string: `disk:<path>` selects a regular file,
//! `disk:shm:<name>` selects a POSIX shared-memory object.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::{DiskIoError, Result};

const DISK_PREFIX: &str = "disk:";
const SHM_PREFIX: &str = "shm:";

/// The OS resource backing a region, resolved from a device identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceName {
    /// Regular file at the given path.
    File(PathBuf),
    /// Shared-memory segment with the given name (without the `shm:` prefix).
    Shm(String),
}

impl ResourceName {
    /// Parse a `disk:` device identifier.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::InvalidDevice` if the prefix is missing or the
    /// path/name is empty.
    pub fn parse(device: &str) -> Result<Self> {
        let rest = device
            .strip_prefix(DISK_PREFIX)
            .ok_or_else(|| DiskIoError::InvalidDevice(device.to_owned()))?;
        match rest.strip_prefix(SHM_PREFIX) {
            Some("") => Err(DiskIoError::InvalidDevice(device.to_owned())),
            Some(name) => Ok(Self::Shm(name.to_owned())),
            None if rest.is_empty() => Err(DiskIoError::InvalidDevice(device.to_owned())),
            None => Ok(Self::File(PathBuf::from(rest))),
        }
    }

    /// Whether this names a shared-memory segment.
    #[must_use]
    pub fn is_shm(&self) -> bool {
        matches!(self, Self::Shm(_))
    }

    /// File path, if this is file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(p) => Some(p),
            Self::Shm(_) => None,
        }
    }
}

impl FromStr for ResourceName {
    type Err = DiskIoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(p) => write!(f, "{DISK_PREFIX}{}", p.display()),
            Self::Shm(name) => write!(f, "{DISK_PREFIX}{SHM_PREFIX}{name}"),
        }
    }
}
