use std::collections::HashMap;
use std::sync::Arc;

use chrono::Datelike;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::parser::parse_evaluation;
use crate::engine::prompt::{EvaluationPromptContext, render_evaluation_prompt};
use crate::error::AppError;
use crate::geo::distance_miles;
use crate::llm::schema::evaluation_schema;
use crate::llm::{GenerateRequest, LlmBackend};
use crate::models::assignment::Assignment;
use crate::models::evaluation::{
    AssignmentEvaluation, RuleViolation, Severity, TheoreticalMaxComparison, ViolationType,
};
use crate::models::game::Game;
use crate::models::official::Official;
use crate::observability::metrics::Metrics;
use crate::store::Store;

const CRITICAL_PENALTY: u32 = 15;
const MAJOR_PENALTY: u32 = 8;
const MINOR_PENALTY: u32 = 3;

/// Overshoot of the travel limit: up to 10% is minor, up to 25% major.
pub fn distance_severity(distance: f64, max_distance: f64) -> Severity {
    if max_distance <= 0.0 {
        return Severity::Critical;
    }
    let over_percent = (distance - max_distance) / max_distance * 100.0;
    if over_percent <= 10.0 {
        Severity::Minor
    } else if over_percent <= 25.0 {
        Severity::Major
    } else {
        Severity::Critical
    }
}

/// Checks every successful row in `subject` against the wider `context`
/// (all successful assignments on record). Simultaneous kickoffs only count
/// within one attempt. A conflicting pair is reported once, on whichever row
/// was created later.
pub fn detect_violations(
    subject: &[Assignment],
    context: &[Assignment],
    games: &HashMap<i64, Game>,
    officials: &HashMap<i64, Official>,
) -> Vec<RuleViolation> {
    let mut violations = Vec::new();

    for assignment in subject.iter().filter(|a| a.success) {
        let Some(official) = assignment.official_id.and_then(|id| officials.get(&id)) else {
            continue;
        };
        let Some(game) = games.get(&assignment.game_id) else {
            continue;
        };

        check_distance(assignment, official, game, &mut violations);
        check_capability(assignment, official, game, &mut violations);
        check_availability(assignment, official, game, &mut violations);

        let earlier = context.iter().filter(|other| {
            other.success
                && other.id != assignment.id
                && other.official_id == Some(official.id)
                && (other.created_at, other.id) < (assignment.created_at, assignment.id)
        });
        for other in earlier {
            check_pair(assignment, other, official, game, games, &mut violations);
        }

        check_weekday_rules(assignment, official, game, &mut violations);
    }

    violations
}

fn check_distance(
    assignment: &Assignment,
    official: &Official,
    game: &Game,
    out: &mut Vec<RuleViolation>,
) {
    let Some(max) = official.max_distance else {
        return;
    };
    let Some(distance) = distance_miles(official.location.as_ref(), game.location.as_ref()) else {
        return;
    };
    if distance <= max {
        return;
    }

    let over_percent = if max > 0.0 {
        (distance - max) / max * 100.0
    } else {
        100.0
    };
    out.push(RuleViolation::new(
        ViolationType::Distance,
        distance_severity(distance, max),
        format!(
            "{} travels {distance:.2} miles to {} ({over_percent:.1}% over the {max:.0}-mile limit)",
            official.name, game.name
        ),
        assignment.id,
        official.id,
    ));
}

fn check_capability(
    assignment: &Assignment,
    official: &Official,
    game: &Game,
    out: &mut Vec<RuleViolation>,
) {
    if official.can_fill(assignment.role) {
        return;
    }
    out.push(RuleViolation::new(
        ViolationType::RoleCapability,
        Severity::Critical,
        format!(
            "{} is not qualified as {} but holds it on {}",
            official.name, assignment.role, game.name
        ),
        assignment.id,
        official.id,
    ));
}

fn check_availability(
    assignment: &Assignment,
    official: &Official,
    game: &Game,
    out: &mut Vec<RuleViolation>,
) {
    let date = game.date();
    if official.available_on(date) {
        return;
    }
    out.push(RuleViolation::new(
        ViolationType::Availability,
        Severity::Critical,
        format!(
            "{} is not available on {date} but is assigned to {} (windows: {})",
            official.name,
            game.name,
            official.availability_windows_text()
        ),
        assignment.id,
        official.id,
    ));
}

fn check_pair(
    assignment: &Assignment,
    other: &Assignment,
    official: &Official,
    game: &Game,
    games: &HashMap<i64, Game>,
    out: &mut Vec<RuleViolation>,
) {
    if other.game_id == assignment.game_id {
        out.push(RuleViolation::new(
            ViolationType::DoubleBooking,
            Severity::Critical,
            format!(
                "{} holds both {} and {} on {}",
                official.name, other.role, assignment.role, game.name
            ),
            assignment.id,
            official.id,
        ));
        return;
    }

    let Some(other_game) = games.get(&other.game_id) else {
        return;
    };

    if other_game.starts_at == game.starts_at {
        // Simultaneous kickoffs only clash within one attempt.
        if other.attempt_id != assignment.attempt_id {
            return;
        }
        out.push(RuleViolation::new(
            ViolationType::SimultaneousGames,
            Severity::Critical,
            format!(
                "{} is assigned to {} and {}, both starting {}",
                official.name,
                other_game.name,
                game.name,
                game.starts_at.format("%Y-%m-%d %H:%M UTC")
            ),
            assignment.id,
            official.id,
        ));
        return;
    }

    if other_game.date() != game.date() {
        return;
    }
    for rule in official.active_rules().filter(|r| r.forbids_back_to_back()) {
        out.push(
            RuleViolation::new(
                ViolationType::BackToBack,
                Severity::Major,
                format!(
                    "{} works {} and {} on {} despite rule \"{}\"",
                    official.name,
                    other_game.name,
                    game.name,
                    game.date(),
                    rule.text
                ),
                assignment.id,
                official.id,
            )
            .with_rule(rule.id),
        );
    }
}

fn check_weekday_rules(
    assignment: &Assignment,
    official: &Official,
    game: &Game,
    out: &mut Vec<RuleViolation>,
) {
    let weekday = game.starts_at.weekday();
    for rule in official.active_rules().filter(|r| r.excludes_weekday(weekday)) {
        out.push(
            RuleViolation::new(
                ViolationType::CustomRule,
                Severity::Minor,
                format!(
                    "{} is assigned to {} on a {weekday} despite rule \"{}\"",
                    official.name, game.name, rule.text
                ),
                assignment.id,
                official.id,
            )
            .with_rule(rule.id),
        );
    }
}

/// Score used when no model judges the attempt.
pub fn deterministic_score(violations: &[RuleViolation]) -> u8 {
    let penalty: u32 = violations
        .iter()
        .map(|v| match v.severity {
            Severity::Critical => CRITICAL_PENALTY,
            Severity::Major => MAJOR_PENALTY,
            Severity::Minor => MINOR_PENALTY,
        })
        .sum();
    100u32.saturating_sub(penalty) as u8
}

pub struct EvaluationEngine {
    store: Arc<Store>,
    judge: Option<Arc<dyn LlmBackend>>,
    max_output_tokens: u32,
    metrics: Metrics,
}

impl EvaluationEngine {
    pub fn new(store: Arc<Store>, metrics: Metrics) -> Self {
        Self {
            store,
            judge: None,
            max_output_tokens: 1024,
            metrics,
        }
    }

    /// Asks the model for the overall score instead of deriving it.
    pub fn with_judge(mut self, backend: Arc<dyn LlmBackend>, max_output_tokens: u32) -> Self {
        self.judge = Some(backend);
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub async fn evaluate(
        &self,
        attempt_id: Uuid,
        theoretical_max: usize,
    ) -> Result<AssignmentEvaluation, AppError> {
        let rows = self.store.assignments_for_attempt(attempt_id);
        let (made, failed): (Vec<Assignment>, Vec<Assignment>) =
            rows.into_iter().partition(|a| a.success);

        let games: HashMap<i64, Game> = self
            .store
            .games()
            .into_iter()
            .map(|g| (g.id, g))
            .collect();
        let officials: HashMap<i64, Official> = self
            .store
            .officials()
            .into_iter()
            .map(|o| (o.id, o))
            .collect();
        let context: Vec<Assignment> = self
            .store
            .successful_assignments()
            .into_values()
            .flatten()
            .collect();

        self.store
            .insert_evaluation(AssignmentEvaluation::new(attempt_id))?;

        for violation in detect_violations(&made, &context, &games, &officials) {
            self.metrics
                .violations_total
                .with_label_values(&[violation.severity.as_str()])
                .inc();
            self.store.add_violation(attempt_id, violation)?;
        }

        let comparison = TheoreticalMaxComparison::new(made.len(), theoretical_max);
        let recorded = self
            .store
            .evaluation(attempt_id)
            .ok_or_else(|| AppError::Internal(format!("evaluation for {attempt_id} vanished")))?;

        let (score, reasoning) = match &self.judge {
            Some(backend) => {
                let ctx = EvaluationPromptContext {
                    assignments_made: made.len(),
                    assignments_failed: failed.len(),
                    theoretical_max,
                    efficiency_percent: comparison.efficiency_percent,
                    assignment_lines: assignment_lines(&made, &games, &officials),
                    violation_lines: recorded
                        .violations
                        .iter()
                        .map(|v| format!("[{}] {}", v.severity.as_str(), v.description))
                        .collect(),
                };
                self.judge(backend.as_ref(), &ctx).await
            }
            None => (
                deterministic_score(&recorded.violations),
                deterministic_reasoning(&recorded, &comparison),
            ),
        };

        info!(
            attempt_id = %attempt_id,
            violations = recorded.total_violations(),
            score,
            efficiency = comparison.efficiency_percent,
            "attempt evaluated"
        );

        self.store.update_evaluation(attempt_id, |evaluation| {
            evaluation.overall_score = Some(score);
            evaluation.reasoning = reasoning;
            evaluation.comparison = Some(comparison);
            evaluation.clone()
        })
    }

    async fn judge(&self, backend: &dyn LlmBackend, ctx: &EvaluationPromptContext) -> (u8, String) {
        let request = GenerateRequest::new(render_evaluation_prompt(ctx), self.max_output_tokens)
            .with_schema(evaluation_schema());

        match backend.generate(request).await {
            Ok(generation) => {
                self.metrics
                    .add_tokens(generation.prompt_tokens, generation.completion_tokens);
                let verdict = parse_evaluation(&generation.text);
                (verdict.score, verdict.reasoning)
            }
            Err(err) => {
                warn!(error = %err, "evaluation call failed");
                (0, format!("Evaluation failed: {err}"))
            }
        }
    }
}

fn assignment_lines(
    made: &[Assignment],
    games: &HashMap<i64, Game>,
    officials: &HashMap<i64, Official>,
) -> Vec<String> {
    made.iter()
        .map(|a| {
            let game = games
                .get(&a.game_id)
                .map(|g| g.name.as_str())
                .unwrap_or("unknown game");
            let official = a
                .official_id
                .and_then(|id| officials.get(&id))
                .map(|o| o.name.as_str())
                .unwrap_or("unknown official");
            match a.score {
                Some(score) => format!("{game} {}: {official} (score {score})", a.role),
                None => format!("{game} {}: {official}", a.role),
            }
        })
        .collect()
}

fn deterministic_reasoning(
    evaluation: &AssignmentEvaluation,
    comparison: &TheoreticalMaxComparison,
) -> String {
    format!(
        "{} critical, {} major, {} minor violations. Filled {} of an estimated {} fillable positions ({:.1}% efficiency).",
        evaluation.count_by_severity(Severity::Critical),
        evaluation.count_by_severity(Severity::Major),
        evaluation.count_by_severity(Severity::Minor),
        comparison.actual,
        comparison.theoretical_max,
        comparison.efficiency_percent
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::llm::{LlmError, ScriptedBackend};
    use crate::models::assignment::NewAssignment;
    use crate::models::attempt::AssignmentAttempt;
    use crate::models::game::Role;
    use crate::models::official::{AvailabilityWindow, GeoPoint, Rule};

    fn game(id: i64, hour: u32, lng: f64) -> Game {
        Game {
            id,
            name: format!("Game {id}"),
            starts_at: Utc.with_ymd_and_hms(2026, 9, 12, hour, 0, 0).unwrap(),
            location: Some(GeoPoint { lat: 0.0, lng }),
        }
    }

    fn official(id: i64, max_distance: Option<f64>) -> Official {
        Official {
            id,
            name: format!("Official {id}"),
            location: Some(GeoPoint { lat: 0.0, lng: 0.0 }),
            max_distance,
            roles: BTreeSet::from([Role::Referee, Role::Umpire]),
            rules: Vec::new(),
            availability: Vec::new(),
        }
    }

    fn row(game_id: i64, role: Role, official_id: i64, offset_secs: i64) -> Assignment {
        let mut assignment = NewAssignment::new(game_id, role, None)
            .official(official_id)
            .into_assignment(true);
        assignment.created_at = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap()
            + Duration::seconds(offset_secs);
        assignment
    }

    fn by_id<T, F: Fn(&T) -> i64>(items: Vec<T>, key: F) -> HashMap<i64, T> {
        items.into_iter().map(|item| (key(&item), item)).collect()
    }

    #[test]
    fn distance_severity_bands() {
        assert_eq!(distance_severity(10.5, 10.0), Severity::Minor);
        assert_eq!(distance_severity(11.0, 10.0), Severity::Minor);
        assert_eq!(distance_severity(12.0, 10.0), Severity::Major);
        assert_eq!(distance_severity(12.5, 10.0), Severity::Major);
        assert_eq!(distance_severity(13.0, 10.0), Severity::Critical);
        assert_eq!(distance_severity(1.0, 0.0), Severity::Critical);
    }

    #[test]
    fn flags_travel_beyond_limit_with_concrete_numbers() {
        // One degree of longitude at the equator is about 69.09 miles.
        let games = by_id(vec![game(1, 19, 1.0)], |g| g.id);
        let officials = by_id(vec![official(7, Some(50.0)), official(8, Some(65.0))], |o| o.id);
        let rows = vec![row(1, Role::Referee, 7, 0), row(1, Role::Umpire, 8, 1)];

        let violations = detect_violations(&rows, &rows, &games, &officials);
        assert_eq!(violations.len(), 2);

        let far = violations.iter().find(|v| v.official_id == 7).unwrap();
        assert_eq!(far.violation_type, ViolationType::Distance);
        assert_eq!(far.severity, Severity::Critical);
        assert!(far.description.contains("69.09 miles"));
        assert!(far.description.contains("50-mile limit"));

        let near = violations.iter().find(|v| v.official_id == 8).unwrap();
        assert_eq!(near.severity, Severity::Minor);
    }

    #[test]
    fn capability_and_availability_are_critical() {
        let games = by_id(vec![game(1, 19, 0.0)], |g| g.id);
        let mut pat = official(7, None);
        pat.availability.push(AvailabilityWindow {
            start: Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 10, 2, 0, 0, 0).unwrap(),
        });
        let officials = by_id(vec![pat], |o| o.id);
        let rows = vec![row(1, Role::BackJudge, 7, 0)];

        let violations = detect_violations(&rows, &rows, &games, &officials);
        let kinds: Vec<ViolationType> = violations.iter().map(|v| v.violation_type).collect();
        assert_eq!(
            kinds,
            vec![ViolationType::RoleCapability, ViolationType::Availability]
        );
        assert!(violations.iter().all(|v| v.severity == Severity::Critical));
        assert!(violations[1].description.contains("2026-09-12"));
    }

    #[test]
    fn conflicting_pairs_are_reported_once() {
        let games = by_id(vec![game(1, 19, 0.0), game(2, 19, 0.0)], |g| g.id);
        let officials = by_id(vec![official(7, None)], |o| o.id);
        let rows = vec![
            row(1, Role::Referee, 7, 0),
            row(1, Role::Umpire, 7, 1),
            row(2, Role::Referee, 7, 2),
        ];

        let violations = detect_violations(&rows, &rows, &games, &officials);
        let double = violations
            .iter()
            .filter(|v| v.violation_type == ViolationType::DoubleBooking)
            .count();
        let simultaneous = violations
            .iter()
            .filter(|v| v.violation_type == ViolationType::SimultaneousGames)
            .count();
        assert_eq!(double, 1);
        // The game-2 row clashes with both game-1 rows.
        assert_eq!(simultaneous, 2);
        assert!(violations.iter().all(|v| v.assignment_id != rows[0].id));
    }

    #[test]
    fn simultaneous_kickoffs_only_clash_within_one_attempt() {
        let games = by_id(vec![game(1, 19, 0.0), game(2, 19, 0.0)], |g| g.id);
        let officials = by_id(vec![official(7, None)], |o| o.id);
        let attempt_id = Uuid::new_v4();

        let manual = row(1, Role::Referee, 7, 0);
        let mut from_attempt = row(2, Role::Referee, 7, 1);
        from_attempt.attempt_id = Some(attempt_id);
        let context = vec![manual.clone(), from_attempt.clone()];

        let violations = detect_violations(
            std::slice::from_ref(&from_attempt),
            &context,
            &games,
            &officials,
        );
        assert!(violations.is_empty());

        let mut sibling = row(1, Role::Referee, 7, 0);
        sibling.attempt_id = Some(attempt_id);
        let context = vec![sibling, from_attempt.clone()];
        let violations = detect_violations(
            std::slice::from_ref(&from_attempt),
            &context,
            &games,
            &officials,
        );
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].violation_type, ViolationType::SimultaneousGames);
    }

    #[tokio::test]
    async fn manual_booking_at_same_kickoff_is_not_flagged() {
        let store = Arc::new(Store::new());
        store.upsert_game(game(1, 19, 0.0));
        store.upsert_game(game(2, 19, 0.0));
        store.upsert_official(official(7, None));
        store
            .create_assignment(NewAssignment::new(1, Role::Referee, None).official(7))
            .unwrap();

        let attempt = AssignmentAttempt::new("test-model");
        let attempt_id = attempt.id;
        store.insert_attempt(attempt);
        store
            .create_assignment(NewAssignment::new(2, Role::Referee, Some(attempt_id)).official(7))
            .unwrap();

        let engine = EvaluationEngine::new(store, Metrics::new());
        let evaluation = engine.evaluate(attempt_id, 1).await.unwrap();
        assert_eq!(evaluation.total_violations(), 0);
        assert_eq!(evaluation.overall_score, Some(100));
    }

    #[test]
    fn personal_rules_raise_softer_violations() {
        let games = by_id(vec![game(1, 13, 0.0), game(2, 19, 0.0)], |g| g.id);
        let mut pat = official(7, None);
        pat.rules = vec![
            Rule {
                id: 11,
                text: "No back-to-back games".to_string(),
                active: true,
            },
            Rule {
                id: 12,
                text: "Avoid Saturday games".to_string(),
                active: true,
            },
        ];
        let officials = by_id(vec![pat], |o| o.id);
        let rows = vec![row(1, Role::Referee, 7, 0), row(2, Role::Referee, 7, 1)];

        let violations = detect_violations(&rows, &rows, &games, &officials);
        let back_to_back: Vec<_> = violations
            .iter()
            .filter(|v| v.violation_type == ViolationType::BackToBack)
            .collect();
        assert_eq!(back_to_back.len(), 1);
        assert_eq!(back_to_back[0].severity, Severity::Major);
        assert_eq!(back_to_back[0].rule_id, Some(11));

        let weekday = violations
            .iter()
            .filter(|v| v.violation_type == ViolationType::CustomRule)
            .count();
        assert_eq!(weekday, 2);
    }

    #[test]
    fn score_drops_with_severity() {
        let v = |severity| RuleViolation::new(ViolationType::Distance, severity, "", Uuid::nil(), 1);
        assert_eq!(deterministic_score(&[]), 100);
        assert_eq!(
            deterministic_score(&[v(Severity::Critical), v(Severity::Major), v(Severity::Minor)]),
            74
        );
        assert_eq!(deterministic_score(&vec![v(Severity::Critical); 8]), 0);
    }

    fn seeded_store() -> (Arc<Store>, Uuid) {
        let store = Arc::new(Store::new());
        store.upsert_game(game(1, 19, 1.0));
        store.upsert_official(official(7, Some(50.0)));
        let attempt = AssignmentAttempt::new("test-model");
        let attempt_id = attempt.id;
        store.insert_attempt(attempt);
        store
            .create_assignment(NewAssignment::new(1, Role::Referee, Some(attempt_id)).official(7))
            .unwrap();
        (store, attempt_id)
    }

    #[tokio::test]
    async fn evaluation_persists_counters_and_comparison() {
        let (store, attempt_id) = seeded_store();
        let engine = EvaluationEngine::new(store.clone(), Metrics::new());

        let evaluation = engine.evaluate(attempt_id, 2).await.unwrap();
        assert_eq!(evaluation.distance_violations, 1);
        assert_eq!(evaluation.total_violations(), 1);
        assert_eq!(evaluation.overall_score, Some(85));

        let comparison = evaluation.comparison.unwrap();
        assert_eq!(comparison.actual, 1);
        assert_eq!(comparison.difference, -1);
        assert_eq!(comparison.efficiency_percent, 50.0);

        assert!(matches!(
            engine.evaluate(attempt_id, 2).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn judge_failure_scores_zero() {
        let (store, attempt_id) = seeded_store();
        let backend = Arc::new(
            ScriptedBackend::new("judge").with_failure(LlmError::Timeout(600)),
        );
        let engine = EvaluationEngine::new(store, Metrics::new()).with_judge(backend, 512);

        let evaluation = engine.evaluate(attempt_id, 1).await.unwrap();
        assert_eq!(evaluation.overall_score, Some(0));
        assert!(evaluation.reasoning.starts_with("Evaluation failed:"));
        assert_eq!(evaluation.total_violations(), 1);
    }

    #[tokio::test]
    async fn judge_verdict_is_recorded() {
        let (store, attempt_id) = seeded_store();
        let backend = Arc::new(
            ScriptedBackend::new("judge")
                .with_reply(r#"{"score": 72, "reasoning": "One long trip."}"#),
        );
        let engine = EvaluationEngine::new(store, Metrics::new()).with_judge(backend.clone(), 512);

        let evaluation = engine.evaluate(attempt_id, 1).await.unwrap();
        assert_eq!(evaluation.overall_score, Some(72));
        assert_eq!(evaluation.reasoning, "One long trip.");
        assert!(backend.prompts()[0].contains("69.09 miles"));
    }
}
