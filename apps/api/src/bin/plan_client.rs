//! Caller side of the plan protocol: read the stored snapshot, start, trigger
//! generation when needed, poll, print the document.

use std::time::Duration;

use anyhow::{bail, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tradeplan::plan::client::PlanApiClient;
use tradeplan::plan::poller::{poll, PollOutcome, PollPolicy};
use tradeplan::plan::starter::StartOutcome;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tradeplan=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let base_url =
        std::env::var("PLAN_API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let policy = PollPolicy {
        interval: Duration::from_millis(env_or("POLL_INTERVAL_MS", 2000)),
        max_attempts: env_or("POLL_MAX_ATTEMPTS", 30),
    };
    let client = PlanApiClient::new(base_url);

    let state = client.fetch_state().await?;
    let key = match client.start(&state).await? {
        StartOutcome::Ready { data, .. } => {
            info!("cache hit");
            println!("{}", serde_json::to_string_pretty(&data)?);
            return Ok(());
        }
        StartOutcome::Running { key } => {
            info!(%key, "generation already running");
            key
        }
        StartOutcome::Start { key } => {
            info!(%key, "triggering generation");
            client.trigger_generate(&key, &state).await?;
            key
        }
    };

    match poll(&client, &key, policy).await {
        PollOutcome::Ready(document) => {
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(())
        }
        PollOutcome::Failed { error, preview } => match preview {
            Some(preview) => bail!("generation failed: {error}\npreview: {preview}"),
            None => bail!("generation failed: {error}"),
        },
        PollOutcome::TimedOut { attempts } => {
            bail!(
                "plan {key} was not ready after {attempts} status checks; \
                 generation may still finish"
            )
        }
    }
}
