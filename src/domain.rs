use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::FilingError;

/// Registry-assigned submitter code, `E` followed by five digits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityCode(String);

impl EntityCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityCode {
    type Err = FilingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let is_valid = normalized.len() == 6
            && normalized.starts_with('E')
            && normalized[1..].chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(FilingError::InvalidEntityCode(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Stable internal identifier: the four-digit listed-company code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The master list carries a five-digit securities code whose last
    /// character is a check digit; strip it to get the listed code.
    pub fn from_securities_code(value: &str) -> Result<Self, FilingError> {
        let trimmed = value.trim();
        if trimmed.len() == 5 && trimmed.is_ascii() {
            trimmed[..4].parse()
        } else {
            trimmed.parse()
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = FilingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let is_valid = normalized.len() == 4
            && normalized.chars().all(|ch| ch.is_ascii_alphanumeric());
        if !is_valid {
            return Err(FilingError::InvalidEntityId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Registry document id, e.g. `S100ABCD`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(String);

impl DocId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocId {
    type Err = FilingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid =
            !normalized.is_empty() && normalized.chars().all(|ch| ch.is_ascii_alphanumeric());
        if !is_valid {
            return Err(FilingError::InvalidDocId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Tracked document types, keyed by the registry's type code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum DocType {
    SecuritiesRegistration,
    SecuritiesReport,
    QuarterlyReport,
}

impl DocType {
    pub fn code(&self) -> &'static str {
        match self {
            DocType::SecuritiesRegistration => "030",
            DocType::SecuritiesReport => "120",
            DocType::QuarterlyReport => "140",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocType::SecuritiesRegistration => "securities_registration_statement",
            DocType::SecuritiesReport => "annual_securities_report",
            DocType::QuarterlyReport => "quarterly_report",
        }
    }

    pub fn all() -> [DocType; 3] {
        [
            DocType::SecuritiesRegistration,
            DocType::SecuritiesReport,
            DocType::QuarterlyReport,
        ]
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for DocType {
    type Err = FilingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "030" => Ok(DocType::SecuritiesRegistration),
            "120" => Ok(DocType::SecuritiesReport),
            "140" => Ok(DocType::QuarterlyReport),
            other => Err(FilingError::InvalidDocType(other.to_string())),
        }
    }
}

/// A tracked entity resolved from the master code list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub entity_id: EntityId,
    pub display_name: String,
}
