use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::game::Role;

/// Token and latency figures from the model call that produced a row.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallMetrics {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub game_id: i64,
    pub role: Role,
    pub official_id: Option<i64>,
    pub success: bool,
    pub score: Option<u8>,
    pub reasoning: String,
    pub metrics: CallMetrics,
    /// `None` for assignments entered by hand.
    pub attempt_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Request to record an outcome for one position.
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub game_id: i64,
    pub role: Role,
    pub official_id: Option<i64>,
    pub score: Option<u8>,
    pub reasoning: String,
    pub metrics: CallMetrics,
    pub attempt_id: Option<Uuid>,
}

impl NewAssignment {
    pub fn new(game_id: i64, role: Role, attempt_id: Option<Uuid>) -> Self {
        Self {
            game_id,
            role,
            official_id: None,
            score: None,
            reasoning: String::new(),
            metrics: CallMetrics::default(),
            attempt_id,
        }
    }

    pub fn official(mut self, official_id: i64) -> Self {
        self.official_id = Some(official_id);
        self
    }

    pub fn score(mut self, score: u8) -> Self {
        self.score = Some(score.min(100));
        self
    }

    pub fn reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn metrics(mut self, metrics: CallMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub(crate) fn into_assignment(self, success: bool) -> Assignment {
        Assignment {
            id: Uuid::new_v4(),
            game_id: self.game_id,
            role: self.role,
            official_id: self.official_id,
            success,
            score: self.score,
            reasoning: self.reasoning,
            metrics: self.metrics,
            attempt_id: self.attempt_id,
            created_at: Utc::now(),
        }
    }
}
