//! Protocol version numbers.
//!
//! Versions travel as `"major.minor"` strings and compare by `(major, minor)`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// A protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    /// Incompatible changes bump the major number.
    pub major: u16,
    /// Additive changes (new message types) bump the minor number.
    pub minor: u16,
}

impl Version {
    /// The original protocol.
    pub const V1_0: Version = Version::new(1, 0);
    /// Adds binary broadcast and relay payloads.
    pub const V1_1: Version = Version::new(1, 1);
    /// Newest version this library speaks.
    pub const CURRENT: Version = Version::V1_1;

    /// Construct a version.
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| ProtocolError::InvalidVersion(s.to_string()))?;
        let major = major
            .parse()
            .map_err(|_| ProtocolError::InvalidVersion(s.to_string()))?;
        let minor = minor
            .parse()
            .map_err(|_| ProtocolError::InvalidVersion(s.to_string()))?;
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for Version {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}
