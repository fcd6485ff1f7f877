use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::llm_client::{LlmSettings, DEFAULT_API_URL, DEFAULT_MODEL};
use crate::plan::worker::StageBudgets;

const DEFAULT_STAGE_A_MS: u64 = 20_000;
const DEFAULT_STAGE_B_MS: u64 = 20_000;
const DEFAULT_CEILING_MS: u64 = 60_000;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or the stage budgets do not
/// fit under the execution ceiling.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// JobStore backend. `None` selects the in-process store.
    pub redis_url: Option<String>,
    pub llm: LlmSettings,
    pub budgets: StageBudgets,
    /// Host execution ceiling. Also bounds how long a `running` record lives.
    pub execution_ceiling: Duration,
    /// Value the `x-admin-key` header must carry on state writes.
    pub admin_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let budgets = StageBudgets {
            stage_a: Duration::from_millis(parse_or(
                &lookup,
                "STAGE_A_TIMEOUT_MS",
                DEFAULT_STAGE_A_MS,
            )?),
            stage_b: Duration::from_millis(parse_or(
                &lookup,
                "STAGE_B_TIMEOUT_MS",
                DEFAULT_STAGE_B_MS,
            )?),
        };
        let execution_ceiling =
            Duration::from_millis(parse_or(&lookup, "EXECUTION_CEILING_MS", DEFAULT_CEILING_MS)?);

        if budgets.total() >= execution_ceiling {
            bail!(
                "STAGE_A_TIMEOUT_MS + STAGE_B_TIMEOUT_MS ({}ms) must stay under EXECUTION_CEILING_MS ({}ms)",
                budgets.total().as_millis(),
                execution_ceiling.as_millis()
            );
        }

        let llm = LlmSettings {
            api_url: lookup("LLM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key: require(&lookup, "OPENAI_API_KEY")?,
            model: lookup("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: parse_or(&lookup, "LLM_MAX_TOKENS", 900)?,
            temperature: parse_or(&lookup, "LLM_TEMPERATURE", 0.0)?,
            top_p: parse_or(&lookup, "LLM_TOP_P", 0.1)?,
        };

        Ok(Config {
            database_url: require(&lookup, "DATABASE_URL")?,
            redis_url: lookup("REDIS_URL").filter(|v| !v.trim().is_empty()),
            llm,
            budgets,
            execution_ceiling,
            admin_key: lookup("TRADE_ADMIN_KEY").filter(|v| !v.is_empty()),
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn require<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        None => Ok(default),
    }
}
