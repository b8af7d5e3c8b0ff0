use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::models::game::Role;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Free-text preference an official attaches to their profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub text: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

const NEGATIONS: [&str; 7] = ["no ", "not ", "never", "avoid", "don't", "unavailable", "day off"];

impl Rule {
    pub fn forbids_back_to_back(&self) -> bool {
        let text = self.text.to_lowercase();
        text.contains("back-to-back") || text.contains("back to back") || text.contains("consecutive")
    }

    /// Matches rules like "no Sunday games" or "avoid saturdays".
    pub fn excludes_weekday(&self, weekday: Weekday) -> bool {
        let text = self.text.to_lowercase();
        text.contains(weekday_name(weekday)) && NEGATIONS.iter().any(|n| text.contains(n))
    }
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AvailabilityWindow {
    /// A window covers every calendar day it touches.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start.date_naive() <= date && date <= self.end.date_naive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Official {
    pub id: i64,
    pub name: String,
    pub location: Option<GeoPoint>,
    /// Miles; `None` means the official travels anywhere.
    pub max_distance: Option<f64>,
    pub roles: BTreeSet<Role>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub availability: Vec<AvailabilityWindow>,
}

impl Official {
    pub fn can_fill(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// No windows on file means always available.
    pub fn available_on(&self, date: NaiveDate) -> bool {
        self.availability.is_empty() || self.availability.iter().any(|w| w.covers(date))
    }

    pub fn active_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|rule| rule.active)
    }

    pub fn within_travel_distance(&self, distance_miles: Option<f64>) -> bool {
        match (self.max_distance, distance_miles) {
            (Some(max), Some(distance)) => distance <= max,
            _ => true,
        }
    }

    pub fn availability_windows_text(&self) -> String {
        self.availability
            .iter()
            .map(|w| format!("{} to {}", w.start.date_naive(), w.end.date_naive()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{NaiveDate, TimeZone, Utc, Weekday};

    use super::{AvailabilityWindow, Official, Rule};
    use crate::models::game::Role;

    fn official(max_distance: Option<f64>) -> Official {
        Official {
            id: 1,
            name: "Pat".to_string(),
            location: None,
            max_distance,
            roles: BTreeSet::from([Role::Referee]),
            rules: Vec::new(),
            availability: Vec::new(),
        }
    }

    #[test]
    fn unlimited_travel_accepts_any_distance() {
        let pat = official(None);
        assert!(pat.within_travel_distance(Some(10_000.0)));
        assert!(pat.within_travel_distance(None));
    }

    #[test]
    fn limited_travel_rejects_longer_trips() {
        let pat = official(Some(25.0));
        assert!(pat.within_travel_distance(Some(25.0)));
        assert!(!pat.within_travel_distance(Some(25.01)));
        assert!(pat.within_travel_distance(None));
    }

    #[test]
    fn availability_windows_cover_whole_days() {
        let mut pat = official(None);
        let day = NaiveDate::from_ymd_opt(2026, 9, 12).unwrap();
        assert!(pat.available_on(day));

        pat.availability.push(AvailabilityWindow {
            start: Utc.with_ymd_and_hms(2026, 9, 12, 18, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 9, 13, 2, 0, 0).unwrap(),
        });
        assert!(pat.available_on(day));
        assert!(pat.available_on(day.succ_opt().unwrap()));
        assert!(!pat.available_on(day.pred_opt().unwrap()));
    }

    #[test]
    fn rule_text_keywords() {
        let rule = |text: &str| Rule {
            id: 1,
            text: text.to_string(),
            active: true,
        };

        assert!(rule("No back-to-back games please").forbids_back_to_back());
        assert!(rule("avoid consecutive assignments").forbids_back_to_back());
        assert!(!rule("prefers varsity").forbids_back_to_back());

        assert!(rule("No Sunday games").excludes_weekday(Weekday::Sun));
        assert!(rule("I avoid saturdays").excludes_weekday(Weekday::Sat));
        assert!(!rule("Sunday is great").excludes_weekday(Weekday::Sun));
        assert!(!rule("No Sunday games").excludes_weekday(Weekday::Mon));
    }
}
