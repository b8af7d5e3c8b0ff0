use std::env;
use std::time::Duration;

use crate::engine::assignment::OrchestratorSettings;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    pub llm_health_timeout_secs: u64,
    pub llm_max_output_tokens: u32,
    pub max_concurrent_games: usize,
    pub llm_evaluation: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            llm_base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "llama3.1".to_string()),
            llm_timeout_secs: parse_or_default("LLM_TIMEOUT_SECS", 600)?,
            llm_health_timeout_secs: parse_or_default("LLM_HEALTH_TIMEOUT_SECS", 5)?,
            llm_max_output_tokens: parse_or_default("LLM_MAX_OUTPUT_TOKENS", 4096)?,
            max_concurrent_games: parse_or_default("MAX_CONCURRENT_GAMES", 4)?,
            llm_evaluation: parse_or_default("LLM_EVALUATION", false)?,
        };

        if config.max_concurrent_games == 0 {
            return Err(AppError::Internal(
                "invalid MAX_CONCURRENT_GAMES: must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn llm_health_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_health_timeout_secs)
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            max_output_tokens: self.llm_max_output_tokens,
            max_concurrent_games: self.max_concurrent_games,
            llm_evaluation: self.llm_evaluation,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
