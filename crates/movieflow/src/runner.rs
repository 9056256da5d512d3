//! Local task runner.
//!
//! Runs the tasks of one logical date in dependency order. Ready tasks run
//! concurrently on a `JoinSet`. A task starts only when every upstream task
//! succeeded; a failure marks everything downstream `upstream_failed` while
//! independent branches keep going.

use async_trait::async_trait;
use chrono::NaiveDate;
use movieflow_protocol::TaskId;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::RetryConfig;
use crate::dag::{downstream, upstream};
use crate::error::TaskError;

/// Executes a single task of a run.
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    async fn execute(&self, task: TaskId) -> Result<(), TaskError>;
}

/// Fixed-delay retry policy for retryable errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self::new(config.retries, config.delay())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Success,
    Failed,
    UpstreamFailed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Success => "success",
            TaskState::Failed => "failed",
            TaskState::UpstreamFailed => "upstream_failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub state: TaskState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskOutcome {
    fn upstream_failed() -> Self {
        Self {
            state: TaskState::UpstreamFailed,
            attempts: 0,
            error: None,
        }
    }
}

/// Final state of every task of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub logical_date: NaiveDate,
    pub tasks: BTreeMap<TaskId, TaskOutcome>,
}

impl RunReport {
    pub fn new(logical_date: NaiveDate) -> Self {
        Self {
            logical_date,
            tasks: BTreeMap::new(),
        }
    }

    /// Report for a run whose inputs could not be resolved.
    pub fn failed_inputs(logical_date: NaiveDate, error: &TaskError) -> Self {
        let mut report = Self::new(logical_date);
        report.tasks.insert(
            TaskId::GetInputs,
            TaskOutcome {
                state: TaskState::Failed,
                attempts: 1,
                error: Some(error.to_string()),
            },
        );
        for task in TaskId::ALL.iter().skip(1) {
            report.tasks.insert(*task, TaskOutcome::upstream_failed());
        }
        report
    }

    pub fn state(&self, task: TaskId) -> Option<TaskState> {
        self.tasks.get(&task).map(|o| o.state)
    }

    pub fn succeeded(&self) -> bool {
        TaskId::ALL
            .iter()
            .all(|t| self.state(*t) == Some(TaskState::Success))
    }

    pub fn failed_tasks(&self) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|(_, o)| o.state == TaskState::Failed)
            .map(|(t, _)| *t)
            .collect()
    }
}

/// Run every task for `logical_date` and report final states.
pub async fn run_graph(
    executor: Arc<dyn TaskExecutor>,
    policy: RetryPolicy,
    logical_date: NaiveDate,
) -> RunReport {
    let mut report = RunReport::new(logical_date);
    let mut running: BTreeSet<TaskId> = BTreeSet::new();
    let mut set: JoinSet<(TaskId, TaskOutcome)> = JoinSet::new();

    loop {
        for task in TaskId::ALL {
            if report.tasks.contains_key(&task) || running.contains(&task) {
                continue;
            }
            let ready = upstream(task)
                .iter()
                .all(|u| report.state(*u) == Some(TaskState::Success));
            if !ready {
                continue;
            }
            running.insert(task);
            let executor = Arc::clone(&executor);
            let span = info_span!("task", task = %task, logical_date = %logical_date);
            set.spawn(async move {
                // Inner spawn so a panicking task still reports which task it was.
                let attempt = tokio::spawn(
                    async move { run_with_retry(executor.as_ref(), task, policy).await }
                        .instrument(span),
                );
                let outcome = match attempt.await {
                    Ok(outcome) => outcome,
                    Err(join_err) => {
                        error!(task = %task, error = %join_err, "Task panicked");
                        TaskOutcome {
                            state: TaskState::Failed,
                            attempts: 1,
                            error: Some(join_err.to_string()),
                        }
                    }
                };
                (task, outcome)
            });
        }

        let Some(joined) = set.join_next().await else {
            break;
        };
        let (task, outcome) = match joined {
            Ok(result) => result,
            Err(join_err) => {
                error!(error = %join_err, "Runner task was cancelled");
                continue;
            }
        };
        running.remove(&task);
        let failed = outcome.state != TaskState::Success;
        report.tasks.insert(task, outcome);
        if failed {
            mark_upstream_failed(&mut report, task);
        }
    }

    for task in TaskId::ALL {
        report
            .tasks
            .entry(task)
            .or_insert_with(TaskOutcome::upstream_failed);
    }

    if report.succeeded() {
        info!(logical_date = %logical_date, "Run succeeded");
    } else {
        warn!(
            logical_date = %logical_date,
            failed = ?report.failed_tasks(),
            "Run finished with failures"
        );
    }
    report
}

fn mark_upstream_failed(report: &mut RunReport, failed: TaskId) {
    let mut stack = downstream(failed);
    while let Some(task) = stack.pop() {
        if report.tasks.contains_key(&task) {
            continue;
        }
        warn!(task = %task, upstream = %failed, "Marking task upstream_failed");
        report.tasks.insert(task, TaskOutcome::upstream_failed());
        stack.extend(downstream(task));
    }
}

async fn run_with_retry(executor: &dyn TaskExecutor, task: TaskId, policy: RetryPolicy) -> TaskOutcome {
    let max_attempts = policy.retries.saturating_add(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match executor.execute(task).await {
            Ok(()) => {
                info!(attempt, "Task succeeded");
                return TaskOutcome {
                    state: TaskState::Success,
                    attempts: attempt,
                    error: None,
                };
            }
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                warn!(
                    attempt,
                    max_attempts,
                    kind = err.kind(),
                    error = %err,
                    "Task failed, retrying in {:?}",
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(err) => {
                error!(attempt, kind = err.kind(), error = ?err, "Task failed");
                return TaskOutcome {
                    state: TaskState::Failed,
                    attempts: attempt,
                    error: Some(err.to_string()),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedExecutor {
        /// Tasks that fail with a retryable error on every attempt
        transient: Vec<TaskId>,
        /// Tasks that fail validation
        invalid: Vec<TaskId>,
        /// Tasks that fail once then succeed
        flaky: Vec<TaskId>,
        calls: Mutex<Vec<TaskId>>,
        flaky_failures: AtomicU32,
    }

    #[async_trait]
    impl TaskExecutor for ScriptedExecutor {
        async fn execute(&self, task: TaskId) -> Result<(), TaskError> {
            self.calls.lock().unwrap().push(task);
            if self.invalid.contains(&task) {
                return Err(TaskError::validation("bad input"));
            }
            if self.transient.contains(&task) {
                return Err(TaskError::transient("network", anyhow::anyhow!("reset")));
            }
            if self.flaky.contains(&task) && self.flaky_failures.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(TaskError::transient("flaky", anyhow::anyhow!("once")));
            }
            Ok(())
        }
    }

    impl ScriptedExecutor {
        fn calls_for(&self, task: TaskId) -> usize {
            self.calls.lock().unwrap().iter().filter(|t| **t == task).count()
        }

        fn position(&self, task: TaskId) -> usize {
            self.calls.lock().unwrap().iter().position(|t| *t == task).unwrap()
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[tokio::test]
    async fn all_tasks_succeed_in_dependency_order() {
        let executor = Arc::new(ScriptedExecutor::default());
        let report = run_graph(executor.clone(), RetryPolicy::none(), date()).await;

        assert!(report.succeeded());
        assert_eq!(report.tasks.len(), TaskId::ALL.len());
        for task in TaskId::ALL {
            for up in upstream(task) {
                assert!(executor.position(*up) < executor.position(task));
            }
        }
    }

    #[tokio::test]
    async fn failure_skips_downstream_but_not_independent_branches() {
        let executor = Arc::new(ScriptedExecutor {
            invalid: vec![TaskId::PushToRds],
            ..Default::default()
        });
        let report = run_graph(executor.clone(), RetryPolicy::new(3, Duration::ZERO), date()).await;

        assert_eq!(report.state(TaskId::PushToRds), Some(TaskState::Failed));
        assert_eq!(report.tasks[&TaskId::PushToRds].attempts, 1);
        assert_eq!(report.state(TaskId::RemoveCsvFiles), Some(TaskState::UpstreamFailed));
        assert_eq!(report.state(TaskId::RemoveParquetFiles), Some(TaskState::UpstreamFailed));
        assert_eq!(report.state(TaskId::PushToDatabase), Some(TaskState::Success));
        assert_eq!(report.state(TaskId::ProcessedDataToS3), Some(TaskState::Success));
        assert_eq!(executor.calls_for(TaskId::RemoveCsvFiles), 0);
        assert_eq!(report.failed_tasks(), vec![TaskId::PushToRds]);
    }

    #[tokio::test]
    async fn retryable_failures_use_every_retry() {
        let executor = Arc::new(ScriptedExecutor {
            transient: vec![TaskId::RawDataToS3],
            ..Default::default()
        });
        let report = run_graph(executor.clone(), RetryPolicy::new(5, Duration::ZERO), date()).await;

        assert_eq!(report.tasks[&TaskId::RawDataToS3].attempts, 6);
        assert_eq!(executor.calls_for(TaskId::RawDataToS3), 6);
        assert_eq!(report.state(TaskId::ProcessData), Some(TaskState::UpstreamFailed));
        assert!(!report.succeeded());
    }

    #[tokio::test]
    async fn flaky_task_recovers_on_retry() {
        let executor = Arc::new(ScriptedExecutor {
            flaky: vec![TaskId::GetFiles],
            ..Default::default()
        });
        let report = run_graph(executor, RetryPolicy::new(1, Duration::ZERO), date()).await;

        assert!(report.succeeded());
        assert_eq!(report.tasks[&TaskId::GetFiles].attempts, 2);
    }

    #[test]
    fn failed_inputs_report_marks_everything_else_upstream_failed() {
        let report = RunReport::failed_inputs(date(), &TaskError::validation("sort_by"));
        assert_eq!(report.state(TaskId::GetInputs), Some(TaskState::Failed));
        assert!(TaskId::ALL
            .iter()
            .skip(1)
            .all(|t| report.state(*t) == Some(TaskState::UpstreamFailed)));
    }

    #[test]
    fn report_serializes_task_ids_as_snake_case() {
        let report = RunReport::failed_inputs(date(), &TaskError::validation("x"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tasks"]["get_inputs"]["state"], "failed");
        assert_eq!(json["tasks"]["push_to_rds"]["state"], "upstream_failed");
    }
}
