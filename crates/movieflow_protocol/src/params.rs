//! Run parameter validation (the input resolver).
//!
//! Parameters arrive loosely typed from configuration: `quantity` may be any
//! TOML/JSON value, `sort_by` any string. [`RequestedParams::resolve`] turns
//! them into [`RunParams`] or fails without producing anything.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::defaults::DEFAULT_QUANTITY;

/// Validation failures for run parameters. Never worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsError {
    #[error("Required parameter [search] not found. Optional parameters [sort_by, quantity]")]
    MissingSearch,

    #[error("Invalid value for sort_by: '{0}'. Expected one of: hottest, votes, updated, active")]
    InvalidSortBy(String),

    #[error("Invalid value for quantity: {0}. Expected a non-negative integer")]
    InvalidQuantity(String),
}

/// Catalog sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Hottest,
    Votes,
    Updated,
    Active,
}

impl SortBy {
    pub const ALL: [SortBy; 4] = [SortBy::Hottest, SortBy::Votes, SortBy::Updated, SortBy::Active];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Hottest => "hottest",
            SortBy::Votes => "votes",
            SortBy::Updated => "updated",
            SortBy::Active => "active",
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SortBy {
    type Err = ParamsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hottest" => Ok(SortBy::Hottest),
            "votes" => Ok(SortBy::Votes),
            "updated" => Ok(SortBy::Updated),
            "active" => Ok(SortBy::Active),
            other => Err(ParamsError::InvalidSortBy(other.to_string())),
        }
    }
}

/// Parameters exactly as the operator supplied them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestedParams {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub quantity: Option<serde_json::Value>,
}

impl RequestedParams {
    pub fn new(search: impl Into<String>) -> Self {
        Self {
            search: Some(search.into()),
            ..Self::default()
        }
    }

    pub fn with_sort_by(mut self, sort_by: impl Into<String>) -> Self {
        self.sort_by = Some(sort_by.into());
        self
    }

    pub fn with_quantity(mut self, quantity: impl Into<serde_json::Value>) -> Self {
        self.quantity = Some(quantity.into());
        self
    }

    /// Validate and apply defaults (`sort_by = hottest`, `quantity = 1`).
    pub fn resolve(&self) -> Result<RunParams, ParamsError> {
        let search = self.search.clone().ok_or(ParamsError::MissingSearch)?;

        let sort_by = match self.sort_by.as_deref() {
            Some(raw) => raw.parse()?,
            None => SortBy::default(),
        };

        let quantity = match &self.quantity {
            None => DEFAULT_QUANTITY,
            Some(value) => parse_quantity(value)?,
        };

        Ok(RunParams {
            search,
            sort_by,
            quantity,
        })
    }
}

// Only JSON integers count; "3", 3.0 and -1 are all rejected.
fn parse_quantity(value: &serde_json::Value) -> Result<u64, ParamsError> {
    match value {
        serde_json::Value::Number(n) if n.is_u64() => n
            .as_u64()
            .ok_or_else(|| ParamsError::InvalidQuantity(value.to_string())),
        _ => Err(ParamsError::InvalidQuantity(value.to_string())),
    }
}

/// Validated run parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParams {
    pub search: String,
    pub sort_by: SortBy,
    /// Maximum number of datasets to download.
    pub quantity: u64,
}
