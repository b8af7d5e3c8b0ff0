use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    Distance,
    BackToBack,
    CustomRule,
    RoleMismatch,
    RoleCapability,
    Availability,
    SimultaneousGames,
    DoubleBooking,
}

/// Counter bucket a violation type rolls up into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationCategory {
    Distance,
    Conflict,
    Rule,
}

impl ViolationType {
    pub fn category(&self) -> ViolationCategory {
        match self {
            ViolationType::Distance => ViolationCategory::Distance,
            ViolationType::BackToBack
            | ViolationType::SimultaneousGames
            | ViolationType::DoubleBooking
            | ViolationType::Availability => ViolationCategory::Conflict,
            ViolationType::CustomRule
            | ViolationType::RoleMismatch
            | ViolationType::RoleCapability => ViolationCategory::Rule,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Major => "major",
            Severity::Minor => "minor",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleViolation {
    pub id: Uuid,
    pub violation_type: ViolationType,
    pub severity: Severity,
    pub description: String,
    pub assignment_id: Uuid,
    pub official_id: i64,
    pub rule_id: Option<i64>,
}

impl RuleViolation {
    pub fn new(
        violation_type: ViolationType,
        severity: Severity,
        description: impl Into<String>,
        assignment_id: Uuid,
        official_id: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            violation_type,
            severity,
            description: description.into(),
            assignment_id,
            official_id,
            rule_id: None,
        }
    }

    pub fn with_rule(mut self, rule_id: i64) -> Self {
        self.rule_id = Some(rule_id);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TheoreticalMaxComparison {
    pub actual: usize,
    pub theoretical_max: usize,
    pub difference: i64,
    pub efficiency_percent: f64,
    pub exceeded_theoretical_max: bool,
}

impl TheoreticalMaxComparison {
    pub fn new(actual: usize, theoretical_max: usize) -> Self {
        let difference = actual as i64 - theoretical_max as i64;
        let efficiency_percent = if theoretical_max == 0 {
            0.0
        } else {
            ((actual as f64 / theoretical_max as f64) * 1000.0).round() / 10.0
        };

        Self {
            actual,
            theoretical_max,
            difference,
            efficiency_percent,
            exceeded_theoretical_max: difference > 0,
        }
    }
}

/// Audit of one attempt. Counters move with every violation recorded or
/// retracted, so they always equal the per-category tally of `violations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentEvaluation {
    pub attempt_id: Uuid,
    pub distance_violations: u32,
    pub conflict_violations: u32,
    pub rule_violations: u32,
    pub overall_score: Option<u8>,
    pub reasoning: String,
    pub comparison: Option<TheoreticalMaxComparison>,
    pub violations: Vec<RuleViolation>,
    pub created_at: DateTime<Utc>,
}

impl AssignmentEvaluation {
    pub fn new(attempt_id: Uuid) -> Self {
        Self {
            attempt_id,
            distance_violations: 0,
            conflict_violations: 0,
            rule_violations: 0,
            overall_score: None,
            reasoning: String::new(),
            comparison: None,
            violations: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn record(&mut self, violation: RuleViolation) {
        *self.counter_mut(violation.violation_type.category()) += 1;
        self.violations.push(violation);
    }

    pub fn retract(&mut self, violation_id: Uuid) -> Option<RuleViolation> {
        let index = self.violations.iter().position(|v| v.id == violation_id)?;
        let violation = self.violations.remove(index);
        let counter = self.counter_mut(violation.violation_type.category());
        *counter = counter.saturating_sub(1);
        Some(violation)
    }

    pub fn total_violations(&self) -> u32 {
        self.distance_violations + self.conflict_violations + self.rule_violations
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity == severity)
            .count()
    }

    fn counter_mut(&mut self, category: ViolationCategory) -> &mut u32 {
        match category {
            ViolationCategory::Distance => &mut self.distance_violations,
            ViolationCategory::Conflict => &mut self.conflict_violations,
            ViolationCategory::Rule => &mut self.rule_violations,
        }
    }
}
