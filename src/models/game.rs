use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::official::GeoPoint;

/// One seat on a game's officiating crew.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Referee,
    HeadLinesman,
    LineJudge,
    BackJudge,
    Umpire,
}

impl Role {
    /// The fixed crew every game requires, in roster order.
    pub const ALL: [Role; 5] = [
        Role::Referee,
        Role::HeadLinesman,
        Role::LineJudge,
        Role::BackJudge,
        Role::Umpire,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Referee => "referee",
            Role::HeadLinesman => "head-linesman",
            Role::LineJudge => "line-judge",
            Role::BackJudge => "back-judge",
            Role::Umpire => "umpire",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    /// Accepts the kebab-case names plus the snake_case and spaced spellings
    /// models tend to produce.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "referee" => Ok(Role::Referee),
            "head-linesman" => Ok(Role::HeadLinesman),
            "line-judge" => Ok(Role::LineJudge),
            "back-judge" => Ok(Role::BackJudge),
            "umpire" => Ok(Role::Umpire),
            _ => Err(UnknownRole(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub location: Option<GeoPoint>,
}

impl Game {
    pub fn date(&self) -> NaiveDate {
        self.starts_at.date_naive()
    }
}
