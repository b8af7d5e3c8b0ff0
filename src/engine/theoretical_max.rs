//! Upper-bound estimate of how many open positions could be filled.
//!
//! This is a greedy heuristic, not an exact maximum matching: positions are
//! walked hardest-first (fewest eligible officials) and each takes the
//! nearest usable official, preferring one with no soft concerns. On most
//! crews this lands on the true optimum, but it can undercount when an
//! early pick blocks a better global arrangement.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;

use crate::engine::eligibility::{Ineligibility, check_travel, is_assigned_to};
use crate::geo::distance_miles;
use crate::models::assignment::Assignment;
use crate::models::game::{Game, Role};
use crate::models::official::Official;
use crate::store::open_roles;

/// Candidates at or below this count mark a position as difficult.
const DIFFICULT_THRESHOLD: usize = 2;

/// Soft issue tracked on an eligible candidate without disqualifying them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Concern {
    BackToBack { rule_id: i64, date: NaiveDate },
    CustomRule { rule_id: i64, text: String },
}

impl Concern {
    pub fn label(&self) -> &'static str {
        match self {
            Concern::BackToBack { .. } => "back_to_back",
            Concern::CustomRule { .. } => "custom_rule",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub official_id: i64,
    pub distance_miles: Option<f64>,
    pub concerns: Vec<Concern>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub game_id: i64,
    pub game_name: String,
    pub role: Role,
    pub starts_at: DateTime<Utc>,
    pub candidates: Vec<Candidate>,
    pub rejections: BTreeMap<&'static str, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedAssignment {
    pub game_id: i64,
    pub role: Role,
    pub official_id: i64,
    pub distance_miles: Option<f64>,
    pub concerns: Vec<Concern>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OfficialCoverage {
    pub official_id: i64,
    pub name: String,
    pub eligible_positions: usize,
    pub total_positions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TheoreticalMax {
    pub theoretical_max: usize,
    pub total_positions: usize,
    pub plan: Vec<PlannedAssignment>,
    /// Positions nobody is eligible for.
    pub impossible: Vec<Position>,
    /// Positions with eligible officials who were all used elsewhere.
    pub contended: Vec<Position>,
    pub difficult: Vec<Position>,
    pub coverage: Vec<OfficialCoverage>,
    pub rejection_tally: BTreeMap<&'static str, usize>,
    pub concern_tally: BTreeMap<&'static str, usize>,
}

/// Runs the greedy solver over every open position of `games`.
///
/// `filled` holds the successful assignments already on record, keyed by
/// game; their positions are skipped and their officials count as busy.
pub fn solve(
    games: &[Game],
    officials: &[Official],
    filled: &HashMap<i64, Vec<Assignment>>,
) -> TheoreticalMax {
    let no_rows: Vec<Assignment> = Vec::new();
    let schedule = OfficialSchedule::new(games, filled);

    let mut positions = Vec::new();
    let mut rejection_tally: BTreeMap<&'static str, usize> = BTreeMap::new();

    for game in games {
        let assigned = filled.get(&game.id).unwrap_or(&no_rows);
        for role in open_roles(assigned) {
            let position = build_position(game, role, officials, assigned, &schedule);
            for (label, count) in &position.rejections {
                *rejection_tally.entry(*label).or_insert(0) += count;
            }
            positions.push(position);
        }
    }

    let total_positions = positions.len();
    let coverage = officials
        .iter()
        .map(|official| OfficialCoverage {
            official_id: official.id,
            name: official.name.clone(),
            eligible_positions: positions
                .iter()
                .filter(|p| p.candidates.iter().any(|c| c.official_id == official.id))
                .count(),
            total_positions,
        })
        .collect();

    // Stable sort keeps kickoff/roster order among equally scarce positions.
    positions.sort_by_key(|p| p.candidates.len());

    let mut used_on_game: HashSet<(i64, i64)> = HashSet::new();
    let mut used_at_time: HashSet<(DateTime<Utc>, i64)> = HashSet::new();
    for game in games {
        for assignment in filled.get(&game.id).unwrap_or(&no_rows).iter().filter(|a| a.success) {
            if let Some(official_id) = assignment.official_id {
                used_on_game.insert((game.id, official_id));
                used_at_time.insert((game.starts_at, official_id));
            }
        }
    }

    let mut plan = Vec::new();
    let mut impossible = Vec::new();
    let mut contended = Vec::new();
    let mut difficult = Vec::new();
    let mut concern_tally: BTreeMap<&'static str, usize> = BTreeMap::new();

    for position in positions {
        if position.candidates.len() <= DIFFICULT_THRESHOLD && !position.candidates.is_empty() {
            difficult.push(position.clone());
        }
        if position.candidates.is_empty() {
            impossible.push(position);
            continue;
        }

        let usable = |c: &&Candidate| {
            !used_on_game.contains(&(position.game_id, c.official_id))
                && !used_at_time.contains(&(position.starts_at, c.official_id))
        };
        let pick = position
            .candidates
            .iter()
            .filter(usable)
            .find(|c| c.concerns.is_empty())
            .or_else(|| position.candidates.iter().find(usable))
            .cloned();

        match pick {
            Some(candidate) => {
                used_on_game.insert((position.game_id, candidate.official_id));
                used_at_time.insert((position.starts_at, candidate.official_id));
                for concern in &candidate.concerns {
                    *concern_tally.entry(concern.label()).or_insert(0) += 1;
                }
                plan.push(PlannedAssignment {
                    game_id: position.game_id,
                    role: position.role,
                    official_id: candidate.official_id,
                    distance_miles: candidate.distance_miles,
                    concerns: candidate.concerns,
                });
            }
            None => contended.push(position),
        }
    }

    TheoreticalMax {
        theoretical_max: plan.len(),
        total_positions,
        plan,
        impossible,
        contended,
        difficult,
        coverage,
        rejection_tally,
        concern_tally,
    }
}

fn build_position(
    game: &Game,
    role: Role,
    officials: &[Official],
    assigned: &[Assignment],
    schedule: &OfficialSchedule,
) -> Position {
    let mut candidates = Vec::new();
    let mut rejections: BTreeMap<&'static str, usize> = BTreeMap::new();

    for official in officials {
        let distance = distance_miles(official.location.as_ref(), game.location.as_ref());
        match check_position(official, game, role, assigned, distance) {
            Ok(()) => candidates.push(Candidate {
                official_id: official.id,
                distance_miles: distance,
                concerns: concerns_for(official, game, schedule),
            }),
            Err(reason) => *rejections.entry(rejection_label(&reason)).or_insert(0) += 1,
        }
    }

    // Nearest first; unknown distances after every known one.
    candidates.sort_by(|a, b| match (a.distance_miles, b.distance_miles) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    Position {
        game_id: game.id,
        game_name: game.name.clone(),
        role,
        starts_at: game.starts_at,
        candidates,
        rejections,
    }
}

fn check_position(
    official: &Official,
    game: &Game,
    role: Role,
    assigned: &[Assignment],
    distance: Option<f64>,
) -> Result<(), Ineligibility> {
    if !official.can_fill(role) {
        return Err(Ineligibility::NoOpenRole);
    }
    if is_assigned_to(assigned, official.id) {
        return Err(Ineligibility::AlreadyAssigned);
    }
    if !official.available_on(game.date()) {
        return Err(Ineligibility::Unavailable { date: game.date() });
    }
    check_travel(official, distance)
}

fn rejection_label(reason: &Ineligibility) -> &'static str {
    match reason {
        Ineligibility::NoOpenRole => "lacks role",
        Ineligibility::AlreadyAssigned => "already assigned",
        Ineligibility::Unavailable { .. } => "unavailable",
        Ineligibility::TooFar { .. } => "too far",
    }
}

fn concerns_for(official: &Official, game: &Game, schedule: &OfficialSchedule) -> Vec<Concern> {
    let mut concerns = Vec::new();

    for rule in official.active_rules() {
        if rule.forbids_back_to_back() && schedule.works_other_game_on(official.id, game) {
            concerns.push(Concern::BackToBack {
                rule_id: rule.id,
                date: game.date(),
            });
        } else if rule.excludes_weekday(game.starts_at.weekday()) {
            concerns.push(Concern::CustomRule {
                rule_id: rule.id,
                text: rule.text.clone(),
            });
        }
    }

    concerns
}

/// Which dates each official already works, from recorded assignments.
pub(crate) struct OfficialSchedule {
    dates: HashMap<i64, Vec<(NaiveDate, i64)>>,
}

impl OfficialSchedule {
    pub(crate) fn new(games: &[Game], filled: &HashMap<i64, Vec<Assignment>>) -> Self {
        let game_dates: HashMap<i64, NaiveDate> = games.iter().map(|g| (g.id, g.date())).collect();
        let mut dates: HashMap<i64, Vec<(NaiveDate, i64)>> = HashMap::new();

        for (game_id, rows) in filled {
            let Some(date) = game_dates.get(game_id) else {
                continue;
            };
            for row in rows.iter().filter(|a| a.success) {
                if let Some(official_id) = row.official_id {
                    dates.entry(official_id).or_default().push((*date, *game_id));
                }
            }
        }

        Self { dates }
    }

    /// True when the official is on `game`'s date for some other game.
    pub(crate) fn works_other_game_on(&self, official_id: i64, game: &Game) -> bool {
        self.dates.get(&official_id).is_some_and(|days| {
            days.iter()
                .any(|(date, game_id)| *date == game.date() && *game_id != game.id)
        })
    }
}

impl TheoreticalMax {
    pub fn render_report(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "THEORETICAL MAXIMUM (greedy estimate, not a proven optimum)");
        let _ = writeln!(
            out,
            "Fillable positions: {} of {} open",
            self.theoretical_max, self.total_positions
        );

        if !self.impossible.is_empty() {
            let _ = writeln!(out, "\nImpossible positions ({}):", self.impossible.len());
            for position in &self.impossible {
                let reasons = position
                    .rejections
                    .iter()
                    .map(|(label, count)| format!("{label}: {count}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = writeln!(
                    out,
                    "  - {} ({}) {}: {}",
                    position.game_name,
                    position.starts_at.format("%Y-%m-%d %H:%M"),
                    position.role,
                    reasons
                );
            }
        }

        if !self.contended.is_empty() {
            let _ = writeln!(
                out,
                "\nPositions lost to scheduling conflicts ({}):",
                self.contended.len()
            );
            for position in &self.contended {
                let _ = writeln!(
                    out,
                    "  - {} {}: {} eligible, all committed elsewhere",
                    position.game_name,
                    position.role,
                    position.candidates.len()
                );
            }
        }

        if !self.difficult.is_empty() {
            let _ = writeln!(out, "\nDifficult positions ({}):", self.difficult.len());
            for position in &self.difficult {
                let _ = writeln!(
                    out,
                    "  - {} {}: {} eligible",
                    position.game_name,
                    position.role,
                    position.candidates.len()
                );
            }
        }

        if !self.coverage.is_empty() {
            let _ = writeln!(out, "\nOfficial coverage:");
            for coverage in &self.coverage {
                let _ = writeln!(
                    out,
                    "  - {}: eligible for {}/{}",
                    coverage.name, coverage.eligible_positions, coverage.total_positions
                );
            }
        }

        if !self.rejection_tally.is_empty() {
            let _ = writeln!(out, "\nRejections by type:");
            for (label, count) in &self.rejection_tally {
                let _ = writeln!(out, "  - {label}: {count}");
            }
        }

        if !self.concern_tally.is_empty() {
            let _ = writeln!(out, "\nConcerns accepted in plan:");
            for (label, count) in &self.concern_tally {
                let _ = writeln!(out, "  - {label}: {count}");
            }
        }

        out
    }
}
