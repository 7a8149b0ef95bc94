//! calendar-agent
//!
//! Asks a tool-calling model to propose meeting slots, answering its
//! `meetings` lookups from the static calendar table.
//!
//! ```text
//! calendar-agent [question...]
//! ```

mod config;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{AgentBuilder, CancellationToken, LlmProvider};
use agent_runtime::OpenAiProvider;
use calendar_advisor::{CalendarProvider, DEFAULT_QUERY, SCHEDULING_PROMPT, StaticCalendar, scheduling_tools};

use crate::config::CliConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = CliConfig::from_env().context("reading configuration")?;

    // Calendar data is loaded once; a bad table stops startup
    let calendar = match &config.calendar_table {
        Some(path) => StaticCalendar::from_path(path)
            .with_context(|| format!("loading calendar table {}", path.display()))?,
        None => StaticCalendar::embedded().context("loading embedded calendar table")?,
    };
    tracing::info!(meetings = calendar.len(), "Calendar loaded");
    let calendar: Arc<dyn CalendarProvider> = Arc::new(calendar);

    let provider = Arc::new(OpenAiProvider::from_env().context("creating provider")?);
    match provider.health_check().await {
        Ok(true) => tracing::info!(base_url = %provider.config().base_url, "Connected to provider"),
        Ok(false) | Err(_) => {
            tracing::warn!(base_url = %provider.config().base_url, "Provider not reachable, the run will likely fail");
        }
    }

    let tools = scheduling_tools(calendar);
    tracing::info!("Registered {} tools: {}", tools.len(), tools.names().join(", "));

    let agent = AgentBuilder::new()
        .provider(provider)
        .tools(tools)
        .system_prompt(SCHEDULING_PROMPT)
        .model(config.model.clone())
        .temperature(config.temperature)
        .stream(config.stream)
        .max_rounds(config.max_rounds)
        .round_timeout(config.round_timeout)
        .build()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let question = if args.is_empty() {
        DEFAULT_QUERY.to_string()
    } else {
        args.join(" ")
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    let outcome = agent
        .run_detailed(&question, cancel)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()).context("agent run failed"))?;

    tracing::info!(
        rounds = outcome.rounds,
        tool_calls = outcome.tool_calls,
        "Run complete"
    );
    println!("{}", outcome.answer);

    Ok(())
}
