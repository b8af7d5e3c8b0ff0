//! In-process persistence. Assignment invariants hold under the game's entry lock.

use std::collections::HashMap;

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::{Assignment, NewAssignment};
use crate::models::attempt::AssignmentAttempt;
use crate::models::evaluation::{AssignmentEvaluation, RuleViolation};
use crate::models::game::{Game, Role};
use crate::models::official::Official;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssignmentRejection {
    #[error("game {0} does not exist")]
    UnknownGame(i64),

    #[error("official {0} does not exist")]
    UnknownOfficial(i64),

    #[error("a successful assignment needs an official")]
    MissingOfficial,

    #[error("{official} is not qualified to work {role}")]
    LacksRole { official: String, role: Role },

    #[error("{role} is already filled for this game")]
    RoleFilled { role: Role },

    #[error("{official} is already assigned to this game")]
    AlreadyOnGame { official: String },
}

#[derive(Default)]
pub struct Store {
    officials: DashMap<i64, Official>,
    games: DashMap<i64, Game>,
    assignments: DashMap<i64, Vec<Assignment>>,
    attempts: DashMap<Uuid, AssignmentAttempt>,
    evaluations: DashMap<Uuid, AssignmentEvaluation>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_official(&self, official: Official) {
        self.officials.insert(official.id, official);
    }

    pub fn official(&self, id: i64) -> Option<Official> {
        self.officials.get(&id).map(|entry| entry.value().clone())
    }

    /// Officials ordered by id.
    pub fn officials(&self) -> Vec<Official> {
        let mut officials: Vec<Official> = self
            .officials
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        officials.sort_by_key(|o| o.id);
        officials
    }

    pub fn upsert_game(&self, game: Game) {
        self.games.insert(game.id, game);
    }

    pub fn game(&self, id: i64) -> Option<Game> {
        self.games.get(&id).map(|entry| entry.value().clone())
    }

    /// Games ordered by kickoff, then id.
    pub fn games(&self) -> Vec<Game> {
        let mut games: Vec<Game> = self.games.iter().map(|entry| entry.value().clone()).collect();
        games.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then(a.id.cmp(&b.id)));
        games
    }

    /// Removes a game together with every assignment it owns.
    pub fn remove_game(&self, id: i64) -> Option<Game> {
        let removed = self.games.remove(&id).map(|(_, game)| game);
        self.assignments.remove(&id);
        removed
    }

    pub fn assignments_for_game(&self, game_id: i64) -> Vec<Assignment> {
        self.assignments
            .get(&game_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn successful_assignments_for_game(&self, game_id: i64) -> Vec<Assignment> {
        self.assignments_for_game(game_id)
            .into_iter()
            .filter(|a| a.success)
            .collect()
    }

    /// Every successful assignment, keyed by game.
    pub fn successful_assignments(&self) -> HashMap<i64, Vec<Assignment>> {
        self.assignments
            .iter()
            .map(|entry| {
                let filled = entry.value().iter().filter(|a| a.success).cloned().collect();
                (*entry.key(), filled)
            })
            .collect()
    }

    pub fn assignments_for_attempt(&self, attempt_id: Uuid) -> Vec<Assignment> {
        let mut rows: Vec<Assignment> = self
            .assignments
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|a| a.attempt_id == Some(attempt_id))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        rows.sort_by_key(|a| a.created_at);
        rows
    }

    /// Successful assignment totals per official id.
    pub fn assignment_counts(&self) -> HashMap<i64, usize> {
        let mut counts = HashMap::new();
        for entry in self.assignments.iter() {
            for assignment in entry.value().iter().filter(|a| a.success) {
                if let Some(official_id) = assignment.official_id {
                    *counts.entry(official_id).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    pub fn open_roles(&self, game_id: i64) -> Vec<Role> {
        open_roles(&self.successful_assignments_for_game(game_id))
    }

    pub fn is_full(&self, game_id: i64) -> bool {
        self.open_roles(game_id).is_empty()
    }

    /// Records a successful assignment, or explains why it cannot stand.
    pub fn create_assignment(&self, new: NewAssignment) -> Result<Assignment, AssignmentRejection> {
        if !self.games.contains_key(&new.game_id) {
            return Err(AssignmentRejection::UnknownGame(new.game_id));
        }

        let official_id = new.official_id.ok_or(AssignmentRejection::MissingOfficial)?;
        let official = self
            .official(official_id)
            .ok_or(AssignmentRejection::UnknownOfficial(official_id))?;

        if !official.can_fill(new.role) {
            return Err(AssignmentRejection::LacksRole {
                official: official.name,
                role: new.role,
            });
        }

        let mut rows = self.assignments.entry(new.game_id).or_default();
        let filled = rows.iter().filter(|a| a.success);

        for existing in filled {
            if existing.role == new.role {
                return Err(AssignmentRejection::RoleFilled { role: new.role });
            }
            if existing.official_id == Some(official_id) {
                return Err(AssignmentRejection::AlreadyOnGame {
                    official: official.name,
                });
            }
        }

        let assignment = new.into_assignment(true);
        rows.push(assignment.clone());
        Ok(assignment)
    }

    /// Failed rows carry no uniqueness constraints.
    pub fn record_failure(&self, new: NewAssignment) -> Assignment {
        let assignment = new.into_assignment(false);
        self.assignments
            .entry(assignment.game_id)
            .or_default()
            .push(assignment.clone());
        assignment
    }

    pub fn insert_attempt(&self, attempt: AssignmentAttempt) {
        self.attempts.insert(attempt.id, attempt);
    }

    pub fn attempt(&self, id: Uuid) -> Option<AssignmentAttempt> {
        self.attempts.get(&id).map(|entry| entry.value().clone())
    }

    /// Attempts, newest first.
    pub fn attempts(&self) -> Vec<AssignmentAttempt> {
        let mut attempts: Vec<AssignmentAttempt> = self
            .attempts
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        attempts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        attempts
    }

    pub fn update_attempt<R>(
        &self,
        id: Uuid,
        update: impl FnOnce(&mut AssignmentAttempt) -> R,
    ) -> Result<R, AppError> {
        let mut attempt = self
            .attempts
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("attempt {id} not found")))?;
        Ok(update(&mut attempt))
    }

    /// Removes an attempt with its assignments and evaluation.
    pub fn remove_attempt(&self, id: Uuid) -> Option<AssignmentAttempt> {
        self.remove_attempt_if(id, |_| true)
    }

    /// Like [`Store::remove_attempt`], but only when `allow` accepts the
    /// attempt. The check runs under the attempt's entry lock, so a status
    /// change cannot slip in between.
    pub fn remove_attempt_if(
        &self,
        id: Uuid,
        allow: impl FnOnce(&AssignmentAttempt) -> bool,
    ) -> Option<AssignmentAttempt> {
        let (_, removed) = self.attempts.remove_if(&id, |_, attempt| allow(attempt))?;
        for mut entry in self.assignments.iter_mut() {
            entry.value_mut().retain(|a| a.attempt_id != Some(id));
        }
        self.evaluations.remove(&id);
        Some(removed)
    }

    pub fn insert_evaluation(&self, evaluation: AssignmentEvaluation) -> Result<(), AppError> {
        let attempt_id = evaluation.attempt_id;
        if !self.attempts.contains_key(&attempt_id) {
            return Err(AppError::NotFound(format!("attempt {attempt_id} not found")));
        }

        match self.evaluations.entry(attempt_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "attempt {attempt_id} already has an evaluation"
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(evaluation);
                Ok(())
            }
        }
    }

    pub fn evaluation(&self, attempt_id: Uuid) -> Option<AssignmentEvaluation> {
        self.evaluations
            .get(&attempt_id)
            .map(|entry| entry.value().clone())
    }

    pub fn update_evaluation<R>(
        &self,
        attempt_id: Uuid,
        update: impl FnOnce(&mut AssignmentEvaluation) -> R,
    ) -> Result<R, AppError> {
        let mut evaluation = self
            .evaluations
            .get_mut(&attempt_id)
            .ok_or_else(|| AppError::NotFound(format!("evaluation for {attempt_id} not found")))?;
        Ok(update(&mut evaluation))
    }

    pub fn add_violation(&self, attempt_id: Uuid, violation: RuleViolation) -> Result<(), AppError> {
        let mut evaluation = self
            .evaluations
            .get_mut(&attempt_id)
            .ok_or_else(|| AppError::NotFound(format!("evaluation for {attempt_id} not found")))?;
        evaluation.record(violation);
        Ok(())
    }

    pub fn retract_violation(
        &self,
        attempt_id: Uuid,
        violation_id: Uuid,
    ) -> Result<RuleViolation, AppError> {
        let mut evaluation = self
            .evaluations
            .get_mut(&attempt_id)
            .ok_or_else(|| AppError::NotFound(format!("evaluation for {attempt_id} not found")))?;
        evaluation
            .retract(violation_id)
            .ok_or_else(|| AppError::NotFound(format!("violation {violation_id} not found")))
    }
}

/// Roster roles without a successful assignment among `filled`.
pub fn open_roles(filled: &[Assignment]) -> Vec<Role> {
    Role::ALL
        .into_iter()
        .filter(|role| !filled.iter().any(|a| a.success && a.role == *role))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::attempt::AttemptStatus;
    use crate::models::evaluation::{Severity, ViolationType};

    fn seeded() -> Store {
        let store = Store::new();
        store.upsert_game(Game {
            id: 1,
            name: "Ridge vs Valley".to_string(),
            starts_at: Utc.with_ymd_and_hms(2026, 9, 12, 19, 0, 0).unwrap(),
            location: None,
        });
        store.upsert_official(Official {
            id: 10,
            name: "Sam".to_string(),
            location: None,
            max_distance: None,
            roles: BTreeSet::from([Role::Referee, Role::Umpire]),
            rules: Vec::new(),
            availability: Vec::new(),
        });
        store.upsert_official(Official {
            id: 11,
            name: "Kim".to_string(),
            location: None,
            max_distance: None,
            roles: BTreeSet::from([Role::Referee]),
            rules: Vec::new(),
            availability: Vec::new(),
        });
        store
    }

    #[test]
    fn second_success_for_same_role_is_rejected() {
        let store = seeded();
        store
            .create_assignment(NewAssignment::new(1, Role::Referee, None).official(10))
            .unwrap();

        let err = store
            .create_assignment(NewAssignment::new(1, Role::Referee, None).official(11))
            .unwrap_err();
        assert_eq!(err, AssignmentRejection::RoleFilled { role: Role::Referee });
    }

    #[test]
    fn same_official_cannot_take_two_roles_on_one_game() {
        let store = seeded();
        store
            .create_assignment(NewAssignment::new(1, Role::Referee, None).official(10))
            .unwrap();

        let err = store
            .create_assignment(NewAssignment::new(1, Role::Umpire, None).official(10))
            .unwrap_err();
        assert!(matches!(err, AssignmentRejection::AlreadyOnGame { .. }));
    }

    #[test]
    fn official_without_role_is_rejected() {
        let store = seeded();
        let err = store
            .create_assignment(NewAssignment::new(1, Role::Umpire, None).official(11))
            .unwrap_err();
        assert_eq!(err.to_string(), "Kim is not qualified to work umpire");
    }

    #[test]
    fn failures_do_not_close_roles() {
        let store = seeded();
        store.record_failure(NewAssignment::new(1, Role::Referee, None).reasoning("nobody"));
        assert_eq!(store.open_roles(1).len(), 5);
        assert!(
            store
                .create_assignment(NewAssignment::new(1, Role::Referee, None).official(11))
                .is_ok()
        );
        assert_eq!(store.open_roles(1).len(), 4);
    }

    #[test]
    fn removing_attempt_cascades() {
        let store = seeded();
        let attempt = AssignmentAttempt::new("m");
        let attempt_id = attempt.id;
        store.insert_attempt(attempt);
        let row = store
            .create_assignment(NewAssignment::new(1, Role::Referee, Some(attempt_id)).official(10))
            .unwrap();
        store
            .insert_evaluation(AssignmentEvaluation::new(attempt_id))
            .unwrap();
        store
            .add_violation(
                attempt_id,
                RuleViolation::new(ViolationType::Distance, Severity::Minor, "far", row.id, 10),
            )
            .unwrap();

        assert!(store.remove_attempt(attempt_id).is_some());
        assert!(store.assignments_for_game(1).is_empty());
        assert!(store.evaluation(attempt_id).is_none());
    }

    #[test]
    fn processing_attempt_is_not_removed() {
        let store = seeded();
        let mut attempt = AssignmentAttempt::new("m");
        let attempt_id = attempt.id;
        attempt.start().unwrap();
        store.insert_attempt(attempt);
        store
            .create_assignment(NewAssignment::new(1, Role::Referee, Some(attempt_id)).official(10))
            .unwrap();

        let settled = |a: &AssignmentAttempt| a.status != AttemptStatus::Processing;
        assert!(store.remove_attempt_if(attempt_id, settled).is_none());
        assert!(store.attempt(attempt_id).is_some());
        assert_eq!(store.assignments_for_game(1).len(), 1);

        store
            .update_attempt(attempt_id, |a| a.finish())
            .unwrap()
            .unwrap();
        assert!(store.remove_attempt_if(attempt_id, settled).is_some());
        assert!(store.assignments_for_game(1).is_empty());
    }

    #[test]
    fn concurrent_writers_fill_a_role_once() {
        let store = seeded();
        for id in 20..36 {
            store.upsert_official(Official {
                id,
                name: format!("Official {id}"),
                location: None,
                max_distance: None,
                roles: BTreeSet::from([Role::Referee]),
                rules: Vec::new(),
                availability: Vec::new(),
            });
        }

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (20..36)
                .map(|id| {
                    let store = &store;
                    scope.spawn(move || {
                        store.create_assignment(
                            NewAssignment::new(1, Role::Referee, None).official(id),
                        )
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| *e == AssignmentRejection::RoleFilled { role: Role::Referee })
        );
        assert_eq!(
            store
                .assignments_for_game(1)
                .iter()
                .filter(|a| a.success)
                .count(),
            1
        );
    }

    #[test]
    fn concurrent_writers_seat_an_official_once_per_game() {
        let store = seeded();
        let roles = [Role::Referee, Role::Umpire];

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = roles
                .into_iter()
                .cycle()
                .take(8)
                .map(|role| {
                    let store = &store;
                    scope.spawn(move || {
                        store.create_assignment(NewAssignment::new(1, role, None).official(10))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    }

    #[test]
    fn evaluation_is_unique_per_attempt() {
        let store = seeded();
        let attempt = AssignmentAttempt::new("m");
        let attempt_id = attempt.id;
        store.insert_attempt(attempt);

        store
            .insert_evaluation(AssignmentEvaluation::new(attempt_id))
            .unwrap();
        assert!(matches!(
            store.insert_evaluation(AssignmentEvaluation::new(attempt_id)),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn violation_counters_follow_store_writes() {
        let store = seeded();
        let attempt = AssignmentAttempt::new("m");
        let attempt_id = attempt.id;
        store.insert_attempt(attempt);
        store
            .insert_evaluation(AssignmentEvaluation::new(attempt_id))
            .unwrap();

        let violation = RuleViolation::new(
            ViolationType::SimultaneousGames,
            Severity::Critical,
            "two games at once",
            Uuid::new_v4(),
            10,
        );
        let violation_id = violation.id;
        store.add_violation(attempt_id, violation).unwrap();
        assert_eq!(store.evaluation(attempt_id).unwrap().conflict_violations, 1);

        store.retract_violation(attempt_id, violation_id).unwrap();
        assert_eq!(store.evaluation(attempt_id).unwrap().conflict_violations, 0);
    }
}
