//! Match rule implementation
//!
//! This module decides whether the prefix peeked from a connection identifies
//! a registered protocol key. Rules are pure functions of the peeked bytes and
//! the key; the selector owns the bytes and the registry.

use log::trace;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::common::{Result, SelectorError};

/// Match rule trait
///
/// This trait defines the comparison between a peeked prefix and a registered
/// protocol key. Implementations must be cheap and side-effect free; they run
/// once per registered key for every accepted connection.
pub trait MatchRule: Send + Sync + fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Validate a key at registration time
    ///
    /// The selector has already rejected empty keys and keys longer than
    /// `header_size` before this is called.
    ///
    /// # Parameters
    ///
    /// * `key` - Key being registered
    /// * `header_size` - Number of bytes peeked from every connection
    fn validate_key(&self, key: &[u8], header_size: usize) -> Result<()>;

    /// Compare a peeked prefix with a registered key
    ///
    /// # Parameters
    ///
    /// * `peeked` - Bytes read from the connection
    /// * `key` - Registered key
    /// * `header_size` - Number of bytes peeked from every connection
    ///
    /// # Returns
    ///
    /// Returns `true` if the connection belongs to `key`
    fn matches(&self, peeked: &[u8], key: &[u8], header_size: usize) -> bool;
}

/// Built-in match modes
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Byte-exact comparison; keys must be exactly `header_size` bytes
    #[default]
    Equal,
    /// The peeked prefix starts with the key; keys may be shorter than `header_size`
    Prefix,
    /// ASCII case-insensitive comparison; keys must be exactly `header_size` bytes
    CaseInsensitive,
}

fn require_exact_len(key: &[u8], header_size: usize) -> Result<()> {
    if key.len() != header_size {
        return Err(SelectorError::InvalidKeyLength {
            key: String::from_utf8_lossy(key).into_owned(),
            len: key.len(),
            reason: format!("this match mode requires exactly {} bytes", header_size),
        });
    }
    Ok(())
}

impl MatchRule for MatchMode {
    fn name(&self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::Prefix => "prefix",
            Self::CaseInsensitive => "case_insensitive",
        }
    }

    fn validate_key(&self, key: &[u8], header_size: usize) -> Result<()> {
        match self {
            Self::Equal | Self::CaseInsensitive => require_exact_len(key, header_size),
            Self::Prefix => Ok(()),
        }
    }

    fn matches(&self, peeked: &[u8], key: &[u8], header_size: usize) -> bool {
        if peeked.len() != header_size {
            trace!("Short prefix: got {} bytes, need {}", peeked.len(), header_size);
            return false;
        }

        match self {
            Self::Equal => peeked == key,
            Self::Prefix => !key.is_empty() && peeked.starts_with(key),
            Self::CaseInsensitive => peeked.eq_ignore_ascii_case(key),
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MatchMode {
    type Err = SelectorError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "equal" | "exact" => Ok(Self::Equal),
            "prefix" => Ok(Self::Prefix),
            "case_insensitive" | "nocase" => Ok(Self::CaseInsensitive),
            _ => Err(SelectorError::Config(format!(
                "Invalid match mode: {}. Valid values are: equal, prefix, case_insensitive",
                s
            ))),
        }
    }
}

// Case-insensitive, like the command line parser
impl<'de> Deserialize<'de> for MatchMode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MatchMode::from_str(&s).map_err(serde::de::Error::custom)
    }
}
