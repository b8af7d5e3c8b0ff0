use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::NaiveDate;

use crate::geo::distance_miles;
use crate::models::assignment::Assignment;
use crate::models::game::{Game, Role};
use crate::models::official::Official;

/// Precomputed miles keyed by `(game_id, official_id)`. Games without
/// coordinates have no entries at all.
pub type DistanceMatrix = HashMap<(i64, i64), Option<f64>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Ineligibility {
    NoOpenRole,
    TooFar { distance: f64, max_distance: f64 },
    Unavailable { date: NaiveDate },
    AlreadyAssigned,
}

impl Ineligibility {
    /// Stable label used when tallying rejections.
    pub fn label(&self) -> &'static str {
        match self {
            Ineligibility::NoOpenRole => "cannot fill any open position",
            Ineligibility::TooFar { .. } => "outside travel distance",
            Ineligibility::Unavailable { .. } => "not available on game date",
            Ineligibility::AlreadyAssigned => "already assigned to this game",
        }
    }
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ineligibility::NoOpenRole => f.write_str("cannot fill any open position"),
            Ineligibility::TooFar {
                distance,
                max_distance,
            } => write!(
                f,
                "too far: {distance:.2} miles exceeds max {max_distance:.2} miles"
            ),
            Ineligibility::Unavailable { date } => write!(f, "not available on {date}"),
            Ineligibility::AlreadyAssigned => f.write_str("already assigned to this game"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EligibleOfficial<'a> {
    pub official: &'a Official,
    pub fillable_roles: Vec<Role>,
    pub distance_miles: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct IneligibleOfficial<'a> {
    pub official: &'a Official,
    pub reason: Ineligibility,
}

#[derive(Debug, Clone, Default)]
pub struct EligibilityReport<'a> {
    pub eligible: Vec<EligibleOfficial<'a>>,
    pub ineligible: Vec<IneligibleOfficial<'a>>,
}

impl EligibilityReport<'_> {
    /// Rejection labels with counts, most common first.
    pub fn top_rejection_reasons(&self, limit: usize) -> Vec<(&'static str, usize)> {
        let mut tally: BTreeMap<&'static str, usize> = BTreeMap::new();
        for rejected in &self.ineligible {
            *tally.entry(rejected.reason.label()).or_insert(0) += 1;
        }

        let mut reasons: Vec<(&'static str, usize)> = tally.into_iter().collect();
        reasons.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        reasons.truncate(limit);
        reasons
    }
}

/// Sorts `officials` into eligible and ineligible for `game`'s open roles.
/// The first failing check decides the rejection reason.
pub fn filter_eligible<'a>(
    officials: &'a [Official],
    game: &Game,
    open_roles: &[Role],
    assigned: &[Assignment],
    matrix: Option<&DistanceMatrix>,
) -> EligibilityReport<'a> {
    let mut report = EligibilityReport::default();

    for official in officials {
        match check_official(official, game, open_roles, assigned, matrix) {
            Ok(eligible) => report.eligible.push(eligible),
            Err(reason) => report.ineligible.push(IneligibleOfficial { official, reason }),
        }
    }

    report
}

fn check_official<'a>(
    official: &'a Official,
    game: &Game,
    open_roles: &[Role],
    assigned: &[Assignment],
    matrix: Option<&DistanceMatrix>,
) -> Result<EligibleOfficial<'a>, Ineligibility> {
    // Roster order, whatever order the open roles arrive in.
    let mut fillable_roles: Vec<Role> = open_roles
        .iter()
        .copied()
        .filter(|role| official.can_fill(*role))
        .collect();
    fillable_roles.sort();
    fillable_roles.dedup();
    if fillable_roles.is_empty() {
        return Err(Ineligibility::NoOpenRole);
    }

    let distance = lookup_distance(matrix, game, official);
    check_travel(official, distance)?;

    if !official.available_on(game.date()) {
        return Err(Ineligibility::Unavailable { date: game.date() });
    }

    if is_assigned_to(assigned, official.id) {
        return Err(Ineligibility::AlreadyAssigned);
    }

    Ok(EligibleOfficial {
        official,
        fillable_roles,
        distance_miles: distance,
    })
}

pub fn check_travel(official: &Official, distance: Option<f64>) -> Result<(), Ineligibility> {
    if official.within_travel_distance(distance) {
        return Ok(());
    }

    match (distance, official.max_distance) {
        (Some(distance), Some(max_distance)) => Err(Ineligibility::TooFar {
            distance,
            max_distance,
        }),
        _ => Ok(()),
    }
}

pub fn is_assigned_to(assigned: &[Assignment], official_id: i64) -> bool {
    assigned
        .iter()
        .any(|a| a.success && a.official_id == Some(official_id))
}

/// Matrix hit when available, otherwise computed on the spot.
pub fn lookup_distance(matrix: Option<&DistanceMatrix>, game: &Game, official: &Official) -> Option<f64> {
    match matrix.and_then(|m| m.get(&(game.id, official.id))) {
        Some(distance) => *distance,
        None => distance_miles(official.location.as_ref(), game.location.as_ref()),
    }
}

pub fn build_distance_matrix(games: &[Game], officials: &[Official]) -> DistanceMatrix {
    let mut matrix = DistanceMatrix::with_capacity(games.len() * officials.len());

    for game in games.iter().filter(|g| g.location.is_some()) {
        for official in officials {
            matrix.insert(
                (game.id, official.id),
                distance_miles(official.location.as_ref(), game.location.as_ref()),
            );
        }
    }

    matrix
}
