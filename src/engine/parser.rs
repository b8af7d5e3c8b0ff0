//! Turns model text into assignment decisions; JSON first, then the
//! `ASSIGNMENT:` / `SCORE:` / `REASONING:` line format.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::models::game::Game;
use crate::models::official::Official;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)\s*```").expect("valid fence regex"));

static ASSIGNMENT_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ASSIGNMENT:\s*game_(\d+)\s*-\s*([a-z][a-z _-]*?)\s*-\s*official_(\d+)")
        .expect("valid assignment header regex")
});

static SUMMARY_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)SUMMARY:").expect("valid summary regex"));

static SCORE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)SCORE:\s*(-?\d+(?:\.\d+)?)").expect("valid score regex"));

static REASONING_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)REASONING:\s*(.*)").expect("valid reasoning regex"));

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    Json,
    Text,
    Unparsed,
}

#[derive(Debug, Clone)]
pub struct ParsedAssignment<'a> {
    pub game: &'a Game,
    pub official: &'a Official,
    /// Lowercased as written by the model; may still name an unknown role.
    pub role: String,
    pub score: u8,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseDiagnostic {
    pub entry: usize,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ParsedResponse<'a> {
    pub format: ResponseFormat,
    pub assignments: Vec<ParsedAssignment<'a>>,
    pub diagnostics: Vec<ParseDiagnostic>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationVerdict {
    pub score: u8,
    pub reasoning: String,
}

/// Raw decision before IDs are checked against the candidates.
struct RawEntry {
    game_id: Option<i64>,
    game_raw: String,
    official_id: Option<i64>,
    official_raw: String,
    role: String,
    score: u8,
    reasoning: String,
}

pub fn parse_assignments<'a>(
    text: &str,
    games: &[&'a Game],
    officials: &[&'a Official],
) -> ParsedResponse<'a> {
    let (format, entries, summary) = match json_payload(text, "assignments")
        .and_then(|payload| json_entries(&payload))
    {
        Some((entries, summary)) => (ResponseFormat::Json, entries, summary),
        None => {
            let (entries, summary) = text_entries(text);
            let format = if entries.is_empty() {
                ResponseFormat::Unparsed
            } else {
                ResponseFormat::Text
            };
            (format, entries, summary)
        }
    };

    let mut response = ParsedResponse {
        format,
        assignments: Vec::new(),
        diagnostics: Vec::new(),
        summary,
    };

    for (index, entry) in entries.into_iter().enumerate() {
        match resolve(entry, games, officials) {
            Ok(parsed) => response.assignments.push(parsed),
            Err(reason) => response.diagnostics.push(ParseDiagnostic {
                entry: index,
                reason,
            }),
        }
    }

    response
}

pub fn parse_evaluation(text: &str) -> EvaluationVerdict {
    if let Some(payload) = json_payload(text, "score") {
        return EvaluationVerdict {
            score: coerce_score(&payload["score"]),
            reasoning: payload["reasoning"]
                .as_str()
                .unwrap_or_default()
                .trim()
                .to_string(),
        };
    }

    if let Some(caps) = SCORE_LINE.captures(text) {
        let score = clamp_score(caps[1].parse::<f64>().unwrap_or(0.0) as i64);
        let reasoning = REASONING_LINE
            .captures(text)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_default();
        return EvaluationVerdict { score, reasoning };
    }

    EvaluationVerdict {
        score: 0,
        reasoning: text.trim().to_string(),
    }
}

pub fn strip_code_fences(text: &str) -> &str {
    CODE_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
        .trim()
}

fn json_payload(text: &str, key: &str) -> Option<Value> {
    let cleaned = strip_code_fences(text);

    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        if value.get(key).is_some() {
            return Some(value);
        }
    }

    embedded_object(cleaned, key)
}

/// First complete JSON object in `text` carrying `key`, wherever it starts.
fn embedded_object(text: &str, key: &str) -> Option<Value> {
    text.char_indices()
        .filter(|(_, c)| *c == '{')
        .find_map(|(start, _)| {
            serde_json::Deserializer::from_str(&text[start..])
                .into_iter::<Value>()
                .next()
                .and_then(Result::ok)
                .filter(|value| value.get(key).is_some())
        })
}

fn json_entries(payload: &Value) -> Option<(Vec<RawEntry>, Option<String>)> {
    let items = payload.get("assignments")?.as_array()?;
    let summary = payload
        .get("summary")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string());

    let entries = items
        .iter()
        .map(|item| RawEntry {
            game_id: coerce_id(&item["game_id"], "game_"),
            game_raw: raw_text(&item["game_id"]),
            official_id: coerce_id(&item["official_id"], "official_"),
            official_raw: raw_text(&item["official_id"]),
            role: item["role"].as_str().unwrap_or_default().trim().to_lowercase(),
            score: coerce_score(&item["score"]),
            reasoning: item["reasoning"]
                .as_str()
                .unwrap_or_default()
                .trim()
                .to_string(),
        })
        .collect();

    Some((entries, summary))
}

fn text_entries(text: &str) -> (Vec<RawEntry>, Option<String>) {
    let headers: Vec<_> = ASSIGNMENT_HEADER.captures_iter(text).collect();
    let mut entries = Vec::with_capacity(headers.len());

    for (index, caps) in headers.iter().enumerate() {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let body_start = whole.end();
        let next_header = headers
            .get(index + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());
        let body_end = SUMMARY_MARKER
            .find_at(text, body_start)
            .map(|m| m.start().min(next_header))
            .unwrap_or(next_header);
        let body = &text[body_start..body_end];

        let score = SCORE_LINE
            .captures(body)
            .map(|c| clamp_score(c[1].parse::<f64>().unwrap_or(0.0) as i64))
            .unwrap_or(0);
        let reasoning = REASONING_LINE
            .captures(body)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_default();

        entries.push(RawEntry {
            game_id: caps[1].parse().ok(),
            game_raw: caps[1].to_string(),
            official_id: caps[3].parse().ok(),
            official_raw: caps[3].to_string(),
            role: caps[2].trim().to_lowercase(),
            score,
            reasoning,
        });
    }

    let summary = SUMMARY_MARKER
        .find(text)
        .map(|m| text[m.end()..].trim().to_string())
        .filter(|s| !s.is_empty());

    (entries, summary)
}

fn resolve<'a>(
    entry: RawEntry,
    games: &[&'a Game],
    officials: &[&'a Official],
) -> Result<ParsedAssignment<'a>, String> {
    let game = entry
        .game_id
        .and_then(|id| games.iter().find(|g| g.id == id).copied())
        .ok_or_else(|| format!("game_id {} not found among candidate games", entry.game_raw))?;
    let official = entry
        .official_id
        .and_then(|id| officials.iter().find(|o| o.id == id).copied())
        .ok_or_else(|| {
            format!(
                "official_id {} not found among candidate officials",
                entry.official_raw
            )
        })?;

    if entry.role.is_empty() {
        return Err(format!(
            "missing role for official_id {} on game_id {}",
            official.id, game.id
        ));
    }

    Ok(ParsedAssignment {
        game,
        official,
        role: entry.role,
        score: entry.score,
        reasoning: entry.reasoning,
    })
}

fn coerce_id(value: &Value, prefix: &str) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => {
            let s = s.trim();
            s.strip_prefix(prefix).unwrap_or(s).parse().ok()
        }
        _ => None,
    }
}

fn raw_text(value: &Value) -> String {
    match value {
        Value::Null => "(missing)".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Integer-coerces a score and clamps it to 0..=100; unreadable scores are 0.
pub fn coerce_score(value: &Value) -> u8 {
    let raw = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    };
    clamp_score(raw.unwrap_or(0))
}

fn clamp_score(raw: i64) -> u8 {
    raw.clamp(0, 100) as u8
}
