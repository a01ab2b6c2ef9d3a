use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SynthKitError};

/// Lifecycle state of a generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Aborted,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "RUNNING"),
            RunStatus::Completed => write!(f, "COMPLETED"),
            RunStatus::Failed => write!(f, "FAILED"),
            RunStatus::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Why a run did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    /// The stage the run was in, then the error's source chain.
    pub trace: Vec<String>,
}

impl ErrorDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: Vec::new(),
        }
    }

    pub fn from_error(stage: &str, error: &SynthKitError) -> Self {
        let mut chain = error.source_chain().into_iter();
        let message = chain.next().unwrap_or_default();
        let mut trace = vec![format!("during {}", stage)];
        trace.extend(chain);
        Self { message, trace }
    }
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed,
    Failed(ErrorDetail),
    Aborted(ErrorDetail),
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Completed => RunStatus::Completed,
            RunOutcome::Failed(_) => RunStatus::Failed,
            RunOutcome::Aborted(_) => RunStatus::Aborted,
        }
    }
}

/// One generation attempt for an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRun {
    pub id: Uuid,
    pub experiment: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Effective seed; present whenever generation was attempted.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub table_order: Vec<String>,
    #[serde(default)]
    pub row_overrides: BTreeMap<String, u64>,
    /// Rows loaded per table. Partial when the run did not complete.
    #[serde(default)]
    pub row_counts: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl GenerationRun {
    pub fn new(
        experiment: &str,
        seed: u64,
        table_order: Vec<String>,
        row_overrides: BTreeMap<String, u64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            experiment: experiment.to_string(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            seed: Some(seed),
            table_order,
            row_overrides,
            row_counts: BTreeMap::new(),
            error: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    /// Move to a terminal state. A run leaves RUNNING exactly once.
    pub fn finish(&mut self, outcome: RunOutcome, row_counts: BTreeMap<String, u64>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(SynthKitError::Other(format!(
                "run {} is already {}",
                self.id, self.status
            )));
        }
        self.status = outcome.status();
        self.completed_at = Some(Utc::now());
        self.row_counts = row_counts;
        self.error = match outcome {
            RunOutcome::Completed => None,
            RunOutcome::Failed(detail) | RunOutcome::Aborted(detail) => Some(detail),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> GenerationRun {
        GenerationRun::new("shop", 42, vec!["customers".into()], BTreeMap::new())
    }

    #[test]
    fn test_finish_is_terminal_once() {
        let mut run = run();
        assert!(run.is_running());

        let counts: BTreeMap<String, u64> = [("customers".to_string(), 10)].into_iter().collect();
        run.finish(RunOutcome::Completed, counts.clone()).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.row_counts, counts);
        assert!(run.completed_at.is_some());

        let again = run.finish(RunOutcome::Aborted(ErrorDetail::new("late")), BTreeMap::new());
        assert!(again.is_err());
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.error.is_none());
    }

    #[test]
    fn test_error_detail_trace() {
        let err = SynthKitError::WarehouseLoad {
            table: "shop__orders".to_string(),
            backend: "embedded".to_string(),
            bulk_error: "no bulk load path".to_string(),
            source: Box::new(SynthKitError::Other("constraint failed".to_string())),
        };
        let detail = ErrorDetail::from_error("load orders", &err);
        assert!(detail.message.contains("shop__orders"));
        assert_eq!(detail.trace, vec!["during load orders", "constraint failed"]);
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let original = run();
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains("\"status\":\"RUNNING\""), "{}", json);
        let back: GenerationRun = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }
}
