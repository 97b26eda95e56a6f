//! Cache entries and `KEY[:TYPE]=VALUE` assignments

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::ConfigError;

/// Matches `KEY[:TYPE]=VALUE`; the key stops at the first `:` or `=`
static ASSIGNMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<key>[^:=]+)(?::(?P<type>[^=]*))?=(?P<value>.*)$")
        .expect("assignment pattern is a valid regex")
});

/// Type tag of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    Bool,
    String,
    Path,
    Filepath,
    Static,
    Internal,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Bool => "BOOL",
            EntryType::String => "STRING",
            EntryType::Path => "PATH",
            EntryType::Filepath => "FILEPATH",
            EntryType::Static => "STATIC",
            EntryType::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BOOL" => Ok(EntryType::Bool),
            "STRING" => Ok(EntryType::String),
            "PATH" => Ok(EntryType::Path),
            "FILEPATH" => Ok(EntryType::Filepath),
            "STATIC" => Ok(EntryType::Static),
            "INTERNAL" => Ok(EntryType::Internal),
            _ => Err(ConfigError::InvalidEntryType(s.to_string())),
        }
    }
}

/// A persisted key/value/type configuration variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, entry_type: EntryType) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            entry_type,
            properties: BTreeMap::new(),
        }
    }
}

/// A parsed `KEY[:TYPE]=VALUE` assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub key: String,
    pub entry_type: EntryType,
    pub value: String,
}

impl Assignment {
    /// Parse a command-line style argument, with or without the leading `-D`
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let body = raw.strip_prefix("-D").unwrap_or(raw);
        let captures = ASSIGNMENT_PATTERN
            .captures(body)
            .ok_or_else(|| ConfigError::InvalidAssignment(raw.to_string()))?;

        let key = captures["key"].trim().to_string();
        if key.is_empty() {
            return Err(ConfigError::InvalidAssignment(raw.to_string()));
        }

        // Untyped assignments are STRING, even when the value looks boolean
        let entry_type = match captures.name("type") {
            Some(ty) => ty.as_str().parse()?,
            None => EntryType::String,
        };

        Ok(Self {
            key,
            entry_type,
            value: captures["value"].to_string(),
        })
    }

    pub fn into_entry(self) -> CacheEntry {
        CacheEntry::new(self.key, self.value, self.entry_type)
    }
}
