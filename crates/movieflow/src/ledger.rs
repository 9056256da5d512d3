//! Record of finished runs, used by `catchup`.
//!
//! Stored as `runs.json` under the state directory. One entry per logical
//! date; a later run of the same date replaces the earlier entry.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::{PathsConfig, ScheduleConfig};
use crate::runner::RunReport;

pub const LEDGER_FILE: &str = "runs.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub status: RunStatus,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_tasks: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunLedger {
    path: PathBuf,
    entries: BTreeMap<NaiveDate, LedgerEntry>,
}

impl RunLedger {
    /// Ledger location for `paths`; `~/.movieflow/state/runs.json` by default.
    pub fn default_path(paths: &PathsConfig) -> PathBuf {
        paths
            .state_dir
            .clone()
            .unwrap_or_else(|| movieflow_logging::movieflow_home().join("state"))
            .join(LEDGER_FILE)
    }

    /// Read the ledger at `path`. A missing file is an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse run ledger {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read run ledger {}", path.display()))
            }
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry(&self, date: NaiveDate) -> Option<&LedgerEntry> {
        self.entries.get(&date)
    }

    pub fn succeeded(&self, date: NaiveDate) -> bool {
        matches!(
            self.entries.get(&date),
            Some(LedgerEntry {
                status: RunStatus::Succeeded,
                ..
            })
        )
    }

    pub fn record(&mut self, report: &RunReport) {
        let status = if report.succeeded() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        let failed_tasks = report
            .failed_tasks()
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();
        self.entries.insert(
            report.logical_date,
            LedgerEntry {
                status,
                finished_at: Utc::now(),
                failed_tasks,
            },
        );
    }

    /// Write through a temp file so a crash never leaves a torn ledger.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "Saved run ledger");
        Ok(())
    }
}

/// Logical dates still owed as of `today`.
///
/// The newest schedulable date is yesterday. With catchup on, every date
/// from `start_date` without a successful run is owed; with catchup off,
/// only yesterday (if it has not succeeded).
pub fn catchup_dates(
    schedule: &ScheduleConfig,
    today: NaiveDate,
    ledger: &RunLedger,
) -> Vec<NaiveDate> {
    let latest = today - Duration::days(1);
    let first = match (schedule.catchup, schedule.start_date) {
        (true, Some(start)) => start,
        _ => latest,
    };
    first
        .iter_days()
        .take_while(|d| *d <= latest)
        .filter(|d| !ledger.succeeded(*d))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use movieflow_protocol::TaskId;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn success(date: NaiveDate) -> RunReport {
        let mut report = RunReport::new(date);
        for task in TaskId::ALL {
            report.tasks.insert(
                task,
                crate::runner::TaskOutcome {
                    state: crate::runner::TaskState::Success,
                    attempts: 1,
                    error: None,
                },
            );
        }
        report
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RunLedger::load(dir.path().join(LEDGER_FILE)).unwrap();
        assert!(ledger.entry(date(2024, 1, 1)).is_none());
    }

    #[test]
    fn record_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join(LEDGER_FILE);

        let mut ledger = RunLedger::load(&path).unwrap();
        ledger.record(&success(date(2024, 1, 1)));
        ledger.record(&RunReport::failed_inputs(
            date(2024, 1, 2),
            &TaskError::validation("bad quantity"),
        ));
        ledger.save().unwrap();

        let reloaded = RunLedger::load(&path).unwrap();
        assert!(reloaded.succeeded(date(2024, 1, 1)));
        let failed = reloaded.entry(date(2024, 1, 2)).unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.failed_tasks, vec!["get_inputs".to_string()]);
    }

    #[test]
    fn catchup_skips_succeeded_dates() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = RunLedger::load(dir.path().join(LEDGER_FILE)).unwrap();
        ledger.record(&success(date(2024, 1, 2)));
        let schedule = ScheduleConfig {
            start_date: Some(date(2024, 1, 1)),
            catchup: true,
        };

        let owed = catchup_dates(&schedule, date(2024, 1, 5), &ledger);

        assert_eq!(owed, vec![date(2024, 1, 1), date(2024, 1, 3), date(2024, 1, 4)]);
    }

    #[test]
    fn catchup_disabled_runs_only_yesterday() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RunLedger::load(dir.path().join(LEDGER_FILE)).unwrap();
        let schedule = ScheduleConfig {
            start_date: Some(date(2024, 1, 1)),
            catchup: false,
        };
        assert_eq!(
            catchup_dates(&schedule, date(2024, 1, 5), &ledger),
            vec![date(2024, 1, 4)]
        );
    }

    proptest! {
        #[test]
        fn owed_dates_are_ordered_and_before_today(
            start_offset in 0i64..60,
            today_offset in 0i64..90,
            done in proptest::collection::vec(0i64..90, 0..20),
        ) {
            let base = date(2024, 1, 1);
            let dir = tempfile::tempdir().unwrap();
            let mut ledger = RunLedger::load(dir.path().join(LEDGER_FILE)).unwrap();
            for offset in &done {
                ledger.record(&success(base + Duration::days(*offset)));
            }
            let schedule = ScheduleConfig {
                start_date: Some(base + Duration::days(start_offset)),
                catchup: true,
            };
            let today = base + Duration::days(today_offset);

            let owed = catchup_dates(&schedule, today, &ledger);

            prop_assert!(owed.windows(2).all(|w| w[0] < w[1]));
            for d in &owed {
                prop_assert!(*d < today);
                prop_assert!(*d >= base + Duration::days(start_offset));
                prop_assert!(!ledger.succeeded(*d));
            }
        }
    }
}
