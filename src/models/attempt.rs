use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AttemptError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AttemptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptStatus::Completed | AttemptStatus::Failed)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttemptTotals {
    pub games_processed: u32,
    pub positions_processed: u32,
    pub assignments_made: u32,
    pub assignments_failed: u32,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Theoretical-max figures frozen at the start of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TheoreticalMaxSnapshot {
    pub fillable: usize,
    pub total_positions: usize,
    pub report: String,
}

/// One batch run of the assignment pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentAttempt {
    pub id: Uuid,
    pub model: String,
    pub status: AttemptStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub totals: AttemptTotals,
    pub theoretical_max: Option<TheoreticalMaxSnapshot>,
    pub errors: Vec<AttemptError>,
}

impl AssignmentAttempt {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model: model.into(),
            status: AttemptStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            totals: AttemptTotals::default(),
            theoretical_max: None,
            errors: Vec::new(),
        }
    }

    pub fn start(&mut self) -> Result<(), AppError> {
        if self.status != AttemptStatus::Pending {
            return Err(AppError::Conflict(format!(
                "attempt {} cannot start from {:?}",
                self.id, self.status
            )));
        }

        self.status = AttemptStatus::Processing;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Only transport-class errors fail an attempt; crew shortfalls leave it
    /// completed with a nonzero failed count.
    pub fn finish(&mut self) -> Result<AttemptStatus, AppError> {
        if self.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "attempt {} already {:?}",
                self.id, self.status
            )));
        }

        self.status = if self.errors.iter().any(AttemptError::is_transport) {
            AttemptStatus::Failed
        } else {
            AttemptStatus::Completed
        };
        self.completed_at = Some(Utc::now());
        Ok(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::{AssignmentAttempt, AttemptStatus};
    use crate::error::AttemptError;
    use crate::llm::LlmError;

    #[test]
    fn validation_errors_still_complete() {
        let mut attempt = AssignmentAttempt::new("llama3.1");
        attempt.start().unwrap();
        attempt
            .errors
            .push(AttemptError::validation(7, "unknown role: water boy"));

        assert_eq!(attempt.finish().unwrap(), AttemptStatus::Completed);
        assert!(attempt.completed_at.is_some());
    }

    #[test]
    fn transport_error_fails_attempt() {
        let mut attempt = AssignmentAttempt::new("llama3.1");
        attempt.start().unwrap();
        attempt.errors.push(AttemptError::transport(
            7,
            &LlmError::Network("connection refused".to_string()),
        ));

        assert_eq!(attempt.finish().unwrap(), AttemptStatus::Failed);
    }

    #[test]
    fn terminal_status_is_final() {
        let mut attempt = AssignmentAttempt::new("llama3.1");
        attempt.start().unwrap();
        attempt.finish().unwrap();

        assert!(attempt.finish().is_err());
        assert!(attempt.start().is_err());
    }
}
