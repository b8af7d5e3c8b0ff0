use serde_json::{Value, json};

/// Output contract for a per-game crew request.
pub fn assignment_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "assignments": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "game_id": { "type": "integer" },
                        "role": { "type": "string" },
                        "official_id": { "type": "integer" },
                        "score": { "type": "integer", "minimum": 0, "maximum": 100 },
                        "reasoning": { "type": "string" }
                    },
                    "required": ["game_id", "role", "official_id", "score", "reasoning"]
                }
            },
            "summary": { "type": "string" }
        },
        "required": ["assignments", "summary"]
    })
}

/// Output contract for a single qualitative score.
pub fn evaluation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "score": { "type": "integer", "minimum": 0, "maximum": 100 },
            "reasoning": { "type": "string" }
        },
        "required": ["score", "reasoning"]
    })
}
