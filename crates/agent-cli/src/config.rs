//! Runtime settings read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Agent settings for one invocation
#[derive(Clone, Debug, PartialEq)]
pub struct CliConfig {
    pub model: String,
    pub stream: bool,
    pub temperature: f32,
    /// `None` when `AGENT_MAX_ROUNDS=0`
    pub max_rounds: Option<usize>,
    pub round_timeout: Option<Duration>,
    /// Table overriding the embedded calendar
    pub calendar_table: Option<PathBuf>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            stream: false,
            temperature: 0.2,
            max_rounds: Some(10),
            round_timeout: Some(Duration::from_secs(120)),
            calendar_table: None,
        }
    }
}

impl CliConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let max_rounds = match parse::<usize>(&get, "AGENT_MAX_ROUNDS")? {
            Some(0) => None,
            Some(n) => Some(n),
            None => defaults.max_rounds,
        };
        let round_timeout = match parse::<u64>(&get, "AGENT_ROUND_TIMEOUT_SECS")? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.round_timeout,
        };

        Ok(Self {
            model: get("AGENT_MODEL").unwrap_or(defaults.model),
            stream: parse_flag(&get, "AGENT_STREAM")?.unwrap_or(defaults.stream),
            temperature: parse(&get, "AGENT_TEMPERATURE")?.unwrap_or(defaults.temperature),
            max_rounds,
            round_timeout,
            calendar_table: get("CALENDAR_TABLE").map(PathBuf::from),
        })
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("invalid {key}: {raw:?}")))
        .transpose()
}

fn parse_flag(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    get(key)
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("invalid {key}: {raw:?}"),
        })
        .transpose()
}
