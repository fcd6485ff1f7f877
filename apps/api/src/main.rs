use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tradeplan::config::Config;
use tradeplan::db::{create_pool, portfolio_store};
use tradeplan::llm_client::LlmClient;
use tradeplan::plan::jobs::{JobStore, MemoryJobStore, RedisJobStore};
use tradeplan::plan::worker::Worker;
use tradeplan::routes::build_router;
use tradeplan::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tradeplan API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (portfolio snapshot)
    let db = create_pool(&config.database_url).await?;
    let portfolio = Arc::new(portfolio_store(db).await?);

    // Initialize job store. A running record expires at the execution ceiling.
    let jobs: Arc<dyn JobStore> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            let store = RedisJobStore::connect(&client, config.execution_ceiling).await?;
            info!("Redis job store initialized");
            Arc::new(store)
        }
        None => {
            warn!("REDIS_URL not set; using in-process job store (single instance only)");
            Arc::new(MemoryJobStore::new(config.execution_ceiling))
        }
    };

    // Initialize LLM client
    let llm = LlmClient::new(config.llm.clone())?;
    info!("LLM client initialized (model: {})", llm.model());

    let worker = Worker::new(jobs.clone(), Arc::new(llm), config.budgets);
    info!(
        "Stage budgets: A={}ms B={}ms, ceiling {}ms",
        config.budgets.stage_a.as_millis(),
        config.budgets.stage_b.as_millis(),
        config.execution_ceiling.as_millis()
    );

    // Build app state
    let state = AppState {
        jobs,
        worker,
        portfolio,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the dashboard host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
