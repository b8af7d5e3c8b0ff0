use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::eligibility::{DistanceMatrix, build_distance_matrix, filter_eligible};
use crate::engine::evaluation::EvaluationEngine;
use crate::engine::parser::parse_assignments;
use crate::engine::prompt::{build_game_prompt_data, render_assignment_prompt};
use crate::engine::theoretical_max;
use crate::error::{AppError, AttemptError};
use crate::llm::schema::assignment_schema;
use crate::llm::{GenerateRequest, LlmBackend};
use crate::models::assignment::{Assignment, CallMetrics, NewAssignment};
use crate::models::attempt::{AssignmentAttempt, AttemptTotals, TheoreticalMaxSnapshot};
use crate::models::evaluation::AssignmentEvaluation;
use crate::models::game::{Game, Role};
use crate::models::official::Official;
use crate::observability::metrics::Metrics;
use crate::store::{Store, open_roles};

pub const MISSED_ROLE_REASONING: &str = "AI did not provide an assignment for this position.";

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_output_tokens: u32,
    pub max_concurrent_games: usize,
    pub llm_evaluation: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_output_tokens: 4096,
            max_concurrent_games: 4,
            llm_evaluation: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameStage {
    #[default]
    NotStarted,
    CandidatesFiltered,
    PromptBuilt,
    ResponseReceived,
    Processed,
    Done,
}

/// What one game's unit of work produced.
#[derive(Debug, Clone, Default)]
pub struct GameOutcome {
    pub game_id: i64,
    pub stage: GameStage,
    pub positions: u32,
    pub made: u32,
    pub failed: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub duration_ms: u64,
    pub llm_called: bool,
    pub prompt: Option<String>,
    pub response: Option<String>,
    pub diagnostics: Vec<String>,
    pub errors: Vec<AttemptError>,
}

impl GameOutcome {
    fn new(game_id: i64) -> Self {
        Self {
            game_id,
            ..Self::default()
        }
    }

    fn advance(&mut self, stage: GameStage) {
        debug!(game_id = self.game_id, from = ?self.stage, to = ?stage, "game stage");
        self.stage = stage;
    }
}

pub struct Orchestrator {
    store: Arc<Store>,
    backend: Arc<dyn LlmBackend>,
    evaluator: EvaluationEngine,
    settings: OrchestratorSettings,
    metrics: Metrics,
}

impl Orchestrator {
    pub fn new(
        store: Arc<Store>,
        backend: Arc<dyn LlmBackend>,
        settings: OrchestratorSettings,
        metrics: Metrics,
    ) -> Self {
        let mut evaluator = EvaluationEngine::new(store.clone(), metrics.clone());
        if settings.llm_evaluation {
            evaluator = evaluator.with_judge(backend.clone(), settings.max_output_tokens);
        }

        Self {
            store,
            backend,
            evaluator,
            settings,
            metrics,
        }
    }

    /// Registers a pending attempt against the configured model.
    pub fn create_attempt(&self) -> AssignmentAttempt {
        let attempt = AssignmentAttempt::new(self.backend.model());
        self.store.insert_attempt(attempt.clone());
        attempt
    }

    /// Runs every game with open positions, evaluates, and settles the
    /// attempt's final status.
    pub async fn run_attempt(&self, attempt_id: Uuid) -> Result<AssignmentAttempt, AppError> {
        self.store
            .update_attempt(attempt_id, AssignmentAttempt::start)??;
        self.metrics.attempts_in_progress.inc();
        info!(attempt_id = %attempt_id, model = self.backend.model(), "attempt started");

        let result = self.process_attempt(attempt_id).await;
        self.metrics.attempts_in_progress.dec();

        match &result {
            Ok(attempt) => info!(
                attempt_id = %attempt_id,
                status = ?attempt.status,
                made = attempt.totals.assignments_made,
                failed = attempt.totals.assignments_failed,
                "attempt finished"
            ),
            Err(err) => error!(attempt_id = %attempt_id, error = %err, "attempt aborted"),
        }
        result
    }

    async fn process_attempt(&self, attempt_id: Uuid) -> Result<AssignmentAttempt, AppError> {
        let officials = self.store.officials();
        let games: Vec<Game> = self
            .store
            .games()
            .into_iter()
            .filter(|game| !self.store.is_full(game.id))
            .collect();

        let solved =
            theoretical_max::solve(&games, &officials, &self.store.successful_assignments());
        info!(
            attempt_id = %attempt_id,
            games = games.len(),
            fillable = solved.theoretical_max,
            open_positions = solved.total_positions,
            "theoretical maximum computed"
        );
        let snapshot = TheoreticalMaxSnapshot {
            fillable: solved.theoretical_max,
            total_positions: solved.total_positions,
            report: solved.render_report(),
        };
        self.store
            .update_attempt(attempt_id, |attempt| attempt.theoretical_max = Some(snapshot))?;

        let matrix = build_distance_matrix(&games, &officials);
        let counts = self.store.assignment_counts();

        let units: Vec<_> = games
            .iter()
            .map(|game| self.assign_game(Some(attempt_id), game, &officials, &matrix, &counts))
            .collect();
        let outcomes: Vec<GameOutcome> = stream::iter(units)
            .buffer_unordered(self.settings.max_concurrent_games.max(1))
            .collect()
            .await;

        let mut totals = AttemptTotals::default();
        let mut errors = Vec::new();
        for outcome in outcomes {
            if outcome.llm_called {
                totals.games_processed += 1;
                totals.positions_processed += outcome.positions;
            }
            totals.assignments_made += outcome.made;
            totals.assignments_failed += outcome.failed;
            totals.prompt_tokens += u64::from(outcome.prompt_tokens);
            totals.completion_tokens += u64::from(outcome.completion_tokens);
            errors.extend(outcome.errors);
        }
        self.store.update_attempt(attempt_id, |attempt| {
            attempt.totals = totals;
            attempt.errors.extend(errors);
        })?;

        if let Err(err) = self.evaluator.evaluate(attempt_id, solved.theoretical_max).await {
            warn!(attempt_id = %attempt_id, error = %err, "evaluation failed");
            self.record_failed_evaluation(attempt_id, &err);
        }

        self.store
            .update_attempt(attempt_id, AssignmentAttempt::finish)??;
        self.store
            .attempt(attempt_id)
            .ok_or_else(|| AppError::NotFound(format!("attempt {attempt_id} not found")))
    }

    fn record_failed_evaluation(&self, attempt_id: Uuid, err: &AppError) {
        let reasoning = format!("Evaluation failed: {err}");
        let mut fallback = AssignmentEvaluation::new(attempt_id);
        fallback.overall_score = Some(0);
        fallback.reasoning = reasoning.clone();

        if self.store.insert_evaluation(fallback).is_err() {
            let _ = self.store.update_evaluation(attempt_id, |evaluation| {
                evaluation.overall_score = Some(0);
                evaluation.reasoning = reasoning;
            });
        }
    }

    /// One game's unit of work. Never fails: transport problems land in
    /// `errors`, rejected picks become failed rows.
    pub async fn assign_game(
        &self,
        attempt_id: Option<Uuid>,
        game: &Game,
        roster: &[Official],
        matrix: &DistanceMatrix,
        counts: &HashMap<i64, usize>,
    ) -> GameOutcome {
        let mut outcome = GameOutcome::new(game.id);

        let filled: Vec<Assignment> = self.store.successful_assignments_for_game(game.id);
        let open = open_roles(&filled);
        if open.is_empty() {
            outcome.advance(GameStage::Done);
            return outcome;
        }
        outcome.positions = open.len() as u32;

        let report = filter_eligible(roster, game, &open, &filled, Some(matrix));
        outcome.advance(GameStage::CandidatesFiltered);

        if report.eligible.is_empty() {
            let reasons = report
                .top_rejection_reasons(3)
                .into_iter()
                .map(|(label, count)| format!("{label} ({count})"))
                .collect::<Vec<_>>();
            let reasoning = if reasons.is_empty() {
                "No eligible officials available.".to_string()
            } else {
                format!(
                    "No eligible officials available. Top reasons: {}",
                    reasons.join(", ")
                )
            };
            info!(game_id = game.id, reasoning = %reasoning, "skipping model call");

            for role in &open {
                self.record_failure(
                    NewAssignment::new(game.id, *role, attempt_id).reasoning(reasoning.clone()),
                    &mut outcome,
                );
            }
            outcome.advance(GameStage::Done);
            return outcome;
        }

        let data = build_game_prompt_data(
            game,
            &filled,
            roster,
            &report.eligible,
            &open,
            matrix,
            counts,
        );
        let prompt = render_assignment_prompt(&data);
        outcome.advance(GameStage::PromptBuilt);

        let request = GenerateRequest::new(prompt.clone(), self.settings.max_output_tokens)
            .with_schema(assignment_schema());
        outcome.prompt = Some(prompt);
        outcome.llm_called = true;

        let started = Instant::now();
        let result = self.backend.generate(request).await;
        let elapsed = started.elapsed();
        outcome.duration_ms = elapsed.as_millis() as u64;

        let generation = match result {
            Ok(generation) => {
                self.metrics.observe_llm_call("success", elapsed.as_secs_f64());
                generation
            }
            Err(err) => {
                self.metrics.observe_llm_call("error", elapsed.as_secs_f64());
                warn!(game_id = game.id, error = %err, "model call failed");
                outcome.errors.push(AttemptError::transport(game.id, &err));
                outcome.advance(GameStage::Done);
                return outcome;
            }
        };
        outcome.advance(GameStage::ResponseReceived);

        outcome.prompt_tokens = generation.prompt_tokens;
        outcome.completion_tokens = generation.completion_tokens;
        self.metrics
            .add_tokens(generation.prompt_tokens, generation.completion_tokens);
        let call = CallMetrics {
            prompt_tokens: generation.prompt_tokens,
            completion_tokens: generation.completion_tokens,
            duration_ms: outcome.duration_ms,
        };

        let candidates: Vec<&Official> = report.eligible.iter().map(|e| e.official).collect();
        let parsed = parse_assignments(&generation.text, &[game], &candidates);
        debug!(
            game_id = game.id,
            format = ?parsed.format,
            decisions = parsed.assignments.len(),
            dropped = parsed.diagnostics.len(),
            "response parsed"
        );

        let mut mentioned: HashSet<Role> = HashSet::new();
        for decision in parsed.assignments {
            let role: Role = match decision.role.parse() {
                Ok(role) => role,
                Err(err) => {
                    outcome
                        .errors
                        .push(AttemptError::validation(game.id, err.to_string()));
                    continue;
                }
            };
            mentioned.insert(role);

            let new = NewAssignment::new(game.id, role, attempt_id)
                .official(decision.official.id)
                .score(decision.score)
                .reasoning(decision.reasoning)
                .metrics(call);

            match self.store.create_assignment(new.clone()) {
                Ok(assignment) => {
                    self.metrics
                        .assignments_total
                        .with_label_values(&["success"])
                        .inc();
                    info!(
                        game_id = game.id,
                        role = %assignment.role,
                        official_id = decision.official.id,
                        score = decision.score,
                        "position filled"
                    );
                    outcome.made += 1;
                }
                Err(rejection) => {
                    debug!(game_id = game.id, role = %role, %rejection, "pick rejected");
                    self.record_failure(new.reasoning(rejection.to_string()), &mut outcome);
                }
            }
        }

        for role in open.iter().filter(|role| !mentioned.contains(role)) {
            self.record_failure(
                NewAssignment::new(game.id, *role, attempt_id)
                    .reasoning(MISSED_ROLE_REASONING)
                    .metrics(call),
                &mut outcome,
            );
        }

        outcome.diagnostics = parsed.diagnostics.into_iter().map(|d| d.reason).collect();
        outcome.response = Some(generation.text);
        outcome.advance(GameStage::Processed);
        outcome.advance(GameStage::Done);
        outcome
    }

    fn record_failure(&self, new: NewAssignment, outcome: &mut GameOutcome) {
        self.store.record_failure(new);
        self.metrics
            .assignments_total
            .with_label_values(&["failed"])
            .inc();
        outcome.failed += 1;
    }
}
