use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::naming::{partition_filename, processed_filename};
use crate::params::{ParamsError, RequestedParams, RunParams};

/// Immutable per-run context handed to every task of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    logical_date: NaiveDate,
    params: RunParams,
}

impl RunContext {
    pub fn new(logical_date: NaiveDate, params: RunParams) -> Self {
        Self {
            logical_date,
            params,
        }
    }

    /// Resolve raw parameters for a logical date.
    pub fn resolve(logical_date: NaiveDate, requested: &RequestedParams) -> Result<Self, ParamsError> {
        Ok(Self::new(logical_date, requested.resolve()?))
    }

    pub fn logical_date(&self) -> NaiveDate {
        self.logical_date
    }

    pub fn params(&self) -> &RunParams {
        &self.params
    }

    /// Logical date as `YYYY-MM-DD`.
    pub fn ds(&self) -> String {
        self.logical_date.format("%Y-%m-%d").to_string()
    }

    pub fn year(&self) -> String {
        format!("{:04}", self.logical_date.year())
    }

    pub fn month(&self) -> String {
        format!("{:02}", self.logical_date.month())
    }

    pub fn day(&self) -> String {
        format!("{:02}", self.logical_date.day())
    }

    pub fn partition_filename(&self) -> String {
        partition_filename(self.logical_date)
    }

    pub fn processed_filename(&self) -> String {
        processed_filename(self.logical_date)
    }
}
