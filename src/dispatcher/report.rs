//! Per-task outcomes and the batch summary built from them.

use crate::error::{CryptionError, ErrorKind};
use crate::task::{Action, TaskDescriptor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why one task failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Offending path, or `None` when the queued record itself was unreadable.
    pub path: Option<String>,
    pub kind: ErrorKind,
    pub reason: String,
}

impl TaskFailure {
    #[must_use]
    pub fn new(path: Option<String>, error: &CryptionError) -> Self {
        Self {
            path,
            kind: error.kind(),
            reason: error.to_string(),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path.as_deref().unwrap_or("<unreadable task>");
        write!(f, "{path}: {} ({})", self.kind, self.reason)
    }
}

/// Terminal state of one dequeued task. There is no retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskOutcome {
    Succeeded { path: String, action: Action },
    Failed(TaskFailure),
}

impl TaskOutcome {
    #[must_use]
    pub fn from_result(task: &TaskDescriptor, result: Result<(), CryptionError>) -> Self {
        match result {
            Ok(()) => TaskOutcome::Succeeded {
                path: task.path_str().to_owned(),
                action: task.action(),
            },
            Err(err) => TaskOutcome::Failed(TaskFailure::new(Some(task.path_str().to_owned()), &err)),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded { .. })
    }
}

/// Summary of a completed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: Vec<TaskFailure>,
}

impl BatchReport {
    #[must_use]
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = TaskOutcome>) -> Self {
        let mut report = Self::default();
        report.extend(outcomes);
        report
    }

    pub fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Succeeded { .. } => self.succeeded += 1,
            TaskOutcome::Failed(failure) => self.failed.push(failure),
        }
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded + self.failed.len()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Extend<TaskOutcome> for BatchReport {
    fn extend<I: IntoIterator<Item = TaskOutcome>>(&mut self, outcomes: I) {
        for outcome in outcomes {
            self.record(outcome);
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed",
            self.succeeded,
            self.failed.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_outcomes() {
        let ok = TaskDescriptor::new(Action::Encrypt, "a").unwrap();
        let bad = TaskDescriptor::new(Action::Decrypt, "b").unwrap();
        let report = BatchReport::from_outcomes([
            TaskOutcome::from_result(&ok, Ok(())),
            TaskOutcome::from_result(&bad, Err(CryptionError::Format("short".into()))),
        ]);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.failed[0].path.as_deref(), Some("b"));
        assert_eq!(report.failed[0].kind, ErrorKind::Format);
        assert_eq!(report.to_string(), "1 succeeded, 1 failed");
    }

    #[test]
    fn outcome_json_line_shape() {
        let task = TaskDescriptor::new(Action::Encrypt, "x.txt").unwrap();
        let line = serde_json::to_string(&TaskOutcome::from_result(&task, Ok(()))).unwrap();
        assert_eq!(
            line,
            r#"{"status":"succeeded","path":"x.txt","action":"encrypt"}"#
        );
        let back: TaskOutcome = serde_json::from_str(&line).unwrap();
        assert!(back.is_success());
    }
}
