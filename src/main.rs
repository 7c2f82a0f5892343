use anyhow::Context;
use lotledger::orchestration::Ingestor;
use lotledger::pricing::{HttpPriceResolver, PriceResolver};
use lotledger::query::PnlQueries;
use lotledger::{api, config::Config, db::init_db, LedgerEngine, Repository};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("failed to initialize database at {}", config.database_path))?;

    let repo = Arc::new(Repository::new(pool));
    let prices: Arc<dyn PriceResolver> =
        Arc::new(HttpPriceResolver::new(config.price_api_url.clone()));
    let engine = LedgerEngine::new(repo.clone(), prices.clone());
    let ingestor = Ingestor::new(repo.clone(), engine);
    let queries = PnlQueries::new(repo.clone(), prices, config.week_start);

    let shutdown = CancellationToken::new();
    let state = api::AppState::new(repo, config, ingestor, queries).with_shutdown(shutdown.clone());
    let app = api::create_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C and cancel in-flight replays.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown requested");
    shutdown.cancel();
}
