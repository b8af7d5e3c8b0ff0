//! Facts handed to the model, and the prompt text built from them.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::engine::eligibility::{DistanceMatrix, EligibleOfficial, lookup_distance};
use crate::models::assignment::Assignment;
use crate::models::game::{Game, Role};
use crate::models::official::Official;

#[derive(Debug, Clone, Serialize)]
pub struct CandidateFacts {
    pub official_id: i64,
    pub name: String,
    pub roles: Vec<Role>,
    pub fillable_roles: Vec<Role>,
    pub rules: Vec<String>,
    pub total_assignments: usize,
    pub distance_miles: Option<f64>,
    pub distance_text: String,
    pub availability_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GamePromptData {
    pub game_id: i64,
    pub game_name: String,
    pub starts_at: DateTime<Utc>,
    pub open_roles: Vec<Role>,
    pub assigned_summary: String,
    pub candidates: Vec<CandidateFacts>,
}

pub fn build_game_prompt_data(
    game: &Game,
    assigned: &[Assignment],
    roster: &[Official],
    eligible: &[EligibleOfficial<'_>],
    open_roles: &[Role],
    matrix: &DistanceMatrix,
    assignment_counts: &HashMap<i64, usize>,
) -> GamePromptData {
    let candidates = eligible
        .iter()
        .map(|entry| {
            let official = entry.official;
            let distance = lookup_distance(Some(matrix), game, official);
            CandidateFacts {
                official_id: official.id,
                name: official.name.clone(),
                roles: official.roles.iter().copied().collect(),
                fillable_roles: entry.fillable_roles.clone(),
                rules: official.active_rules().map(|r| r.text.clone()).collect(),
                total_assignments: assignment_counts.get(&official.id).copied().unwrap_or(0),
                distance_miles: distance,
                distance_text: distance_text(distance, official.max_distance),
                availability_text: availability_text(official, game.date()),
            }
        })
        .collect();

    GamePromptData {
        game_id: game.id,
        game_name: game.name.clone(),
        starts_at: game.starts_at,
        open_roles: open_roles.to_vec(),
        assigned_summary: assigned_summary(assigned, roster),
        candidates,
    }
}

pub fn distance_text(distance: Option<f64>, max_distance: Option<f64>) -> String {
    match (distance, max_distance) {
        (Some(d), Some(max)) => format!("{d:.2} miles from venue (travel limit {max:.0} miles)"),
        (Some(d), None) => format!("{d:.2} miles from venue (no travel limit)"),
        (None, _) => "distance unknown".to_string(),
    }
}

pub fn availability_text(official: &Official, date: NaiveDate) -> String {
    if official.availability.is_empty() {
        "always available".to_string()
    } else if official.available_on(date) {
        "available for this date".to_string()
    } else {
        format!(
            "not available on {date} (windows: {})",
            official.availability_windows_text()
        )
    }
}

fn assigned_summary(assigned: &[Assignment], roster: &[Official]) -> String {
    let filled: Vec<String> = assigned
        .iter()
        .filter(|a| a.success)
        .map(|a| {
            let name = a
                .official_id
                .and_then(|id| roster.iter().find(|o| o.id == id))
                .map(|o| o.name.as_str())
                .unwrap_or("unknown official");
            format!("{}: {}", a.role, name)
        })
        .collect();

    if filled.is_empty() {
        "none".to_string()
    } else {
        filled.join(", ")
    }
}

pub fn render_assignment_prompt(data: &GamePromptData) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "You are assigning football officials to open crew positions for one game."
    );
    let _ = writeln!(
        out,
        "Each official may take at most one position on this game and only a role they hold.\n"
    );
    let _ = writeln!(out, "GAME {}: {}", data.game_id, data.game_name);
    let _ = writeln!(out, "Kickoff: {}", data.starts_at.format("%A %Y-%m-%d %H:%M UTC"));
    let _ = writeln!(out, "Already assigned: {}", data.assigned_summary);
    let open = data
        .open_roles
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(out, "Open roles: {open}\n");

    let _ = writeln!(out, "ELIGIBLE OFFICIALS:");
    for candidate in &data.candidates {
        let fillable = candidate
            .fillable_roles
            .iter()
            .map(Role::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "- official_id {}: {}", candidate.official_id, candidate.name);
        let _ = writeln!(out, "  can fill: {fillable}");
        let _ = writeln!(out, "  distance: {}", candidate.distance_text);
        let _ = writeln!(out, "  availability: {}", candidate.availability_text);
        let _ = writeln!(out, "  current assignments: {}", candidate.total_assignments);
        if !candidate.rules.is_empty() {
            let _ = writeln!(out, "  personal rules: {}", candidate.rules.join("; "));
        }
    }

    let _ = writeln!(
        out,
        "\nRespond with JSON only: {{\"assignments\": [{{\"game_id\": {}, \"role\": \"<role>\", \
         \"official_id\": <id>, \"score\": <0-100>, \"reasoning\": \"<why>\"}}], \"summary\": \"<overview>\"}}",
        data.game_id
    );
    let _ = writeln!(
        out,
        "Score each pick 0-100 for fit. Prefer shorter travel and respect personal rules. \
         Leave a role out rather than assign someone unsuitable."
    );

    out
}

/// Inputs for the qualitative review of a finished attempt.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationPromptContext {
    pub assignments_made: usize,
    pub assignments_failed: usize,
    pub theoretical_max: usize,
    pub efficiency_percent: f64,
    pub assignment_lines: Vec<String>,
    pub violation_lines: Vec<String>,
}

pub fn render_evaluation_prompt(ctx: &EvaluationPromptContext) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Review this batch of officiating assignments and score its overall quality from 0 to 100.\n"
    );
    let _ = writeln!(out, "Positions filled: {}", ctx.assignments_made);
    let _ = writeln!(out, "Positions left open: {}", ctx.assignments_failed);
    let _ = writeln!(
        out,
        "Estimated fillable maximum: {} (efficiency {:.1}%)\n",
        ctx.theoretical_max, ctx.efficiency_percent
    );

    let _ = writeln!(out, "ASSIGNMENTS:");
    for line in &ctx.assignment_lines {
        let _ = writeln!(out, "- {line}");
    }

    let _ = writeln!(out, "\nDETECTED VIOLATIONS:");
    if ctx.violation_lines.is_empty() {
        let _ = writeln!(out, "- none");
    }
    for line in &ctx.violation_lines {
        let _ = writeln!(out, "- {line}");
    }

    let _ = writeln!(
        out,
        "\nRespond with JSON only: {{\"score\": <0-100>, \"reasoning\": \"<assessment>\"}}"
    );

    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::TimeZone;

    use super::*;
    use crate::engine::eligibility::{build_distance_matrix, filter_eligible};
    use crate::models::assignment::NewAssignment;
    use crate::models::official::{AvailabilityWindow, GeoPoint, Rule};

    fn game() -> Game {
        Game {
            id: 4,
            name: "Eagles at Hawks".to_string(),
            starts_at: Utc.with_ymd_and_hms(2026, 9, 12, 19, 0, 0).unwrap(),
            location: Some(GeoPoint {
                lat: 39.7392,
                lng: -104.9903,
            }),
        }
    }

    fn official(id: i64, name: &str, roles: &[Role]) -> Official {
        Official {
            id,
            name: name.to_string(),
            location: Some(GeoPoint {
                lat: 39.8,
                lng: -105.0,
            }),
            max_distance: Some(30.0),
            roles: roles.iter().copied().collect::<BTreeSet<_>>(),
            rules: vec![
                Rule {
                    id: 1,
                    text: "No back-to-back games".to_string(),
                    active: true,
                },
                Rule {
                    id: 2,
                    text: "retired rule".to_string(),
                    active: false,
                },
            ],
            availability: Vec::new(),
        }
    }

    #[test]
    fn bundle_carries_candidate_facts() {
        let game = game();
        let roster = vec![
            official(1, "Alex", &[Role::Referee, Role::Umpire]),
            official(2, "Blair", &[Role::Referee]),
        ];
        let assigned = vec![
            NewAssignment::new(4, Role::Referee, None)
                .official(2)
                .into_assignment(true),
        ];
        let open = vec![Role::HeadLinesman, Role::LineJudge, Role::BackJudge, Role::Umpire];
        let matrix = build_distance_matrix(std::slice::from_ref(&game), &roster);
        let report = filter_eligible(&roster, &game, &open, &assigned, Some(&matrix));
        let counts = HashMap::from([(1, 3)]);

        let data = build_game_prompt_data(
            &game,
            &assigned,
            &roster,
            &report.eligible,
            &open,
            &matrix,
            &counts,
        );

        assert_eq!(data.assigned_summary, "referee: Blair");
        assert_eq!(data.candidates.len(), 1);
        let alex = &data.candidates[0];
        assert_eq!(alex.fillable_roles, vec![Role::Umpire]);
        assert_eq!(alex.rules, vec!["No back-to-back games".to_string()]);
        assert_eq!(alex.total_assignments, 3);
        assert_eq!(alex.availability_text, "always available");
        assert!(alex.distance_text.contains("miles from venue (travel limit 30 miles)"));

        let prompt = render_assignment_prompt(&data);
        assert!(prompt.contains("official_id 1: Alex"));
        assert!(prompt.contains("Open roles: head-linesman, line-judge, back-judge, umpire"));
        assert!(prompt.contains("personal rules: No back-to-back games"));
    }

    #[test]
    fn availability_text_variants() {
        let mut alex = official(1, "Alex", &[Role::Referee]);
        let date = game().date();
        assert_eq!(availability_text(&alex, date), "always available");

        alex.availability.push(AvailabilityWindow {
            start: Utc.with_ymd_and_hms(2026, 9, 10, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 9, 12, 23, 0, 0).unwrap(),
        });
        assert_eq!(availability_text(&alex, date), "available for this date");

        let later = date.succ_opt().unwrap();
        assert_eq!(
            availability_text(&alex, later),
            "not available on 2026-09-13 (windows: 2026-09-10 to 2026-09-12)"
        );
    }

    #[test]
    fn distance_text_variants() {
        assert_eq!(distance_text(None, Some(10.0)), "distance unknown");
        assert_eq!(
            distance_text(Some(4.5), None),
            "4.50 miles from venue (no travel limit)"
        );
    }

    #[test]
    fn evaluation_prompt_lists_violations() {
        let prompt = render_evaluation_prompt(&EvaluationPromptContext {
            assignments_made: 8,
            assignments_failed: 2,
            theoretical_max: 9,
            efficiency_percent: 88.9,
            assignment_lines: vec!["Game 1 referee: Alex".to_string()],
            violation_lines: vec!["[major] distance: Alex 12% over limit".to_string()],
        });
        assert!(prompt.contains("efficiency 88.9%"));
        assert!(prompt.contains("[major] distance"));
    }
}
