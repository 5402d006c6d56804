use anyhow::{Context, Result};
use scrapegate::legality::HttpRobotsFetcher;
use scrapegate::{AdminKey, AdmissionGateway, ExtractionEngine, HttpRenderer, JsonFileStore};
use server_core::kernel::start_scheduler;
use server_core::server::{build_app, AppState};
use server_core::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,scrapegate=debug,server_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Starting scrapegate server on port {}", config.port);

    let gateway_config = config.gateway_config();
    let user_agent = gateway_config.legality.user_agent.clone();

    let renderer = HttpRenderer::new(&user_agent).context("Failed to build page renderer")?;
    let robots = HttpRobotsFetcher::new(&user_agent, gateway_config.legality.robots_timeout())
        .context("Failed to build robots.txt fetcher")?;

    let mut builder = AdmissionGateway::builder(
        gateway_config,
        Arc::new(ExtractionEngine::new(renderer)),
        Arc::new(robots),
    );

    match &config.data_dir {
        Some(dir) => {
            let store = JsonFileStore::open(dir)
                .await
                .with_context(|| format!("Failed to open data directory {}", dir.display()))?;
            tracing::info!(dir = %dir.display(), "Persisting ledgers to disk");
            builder = builder.with_store(Arc::new(store));
        }
        None => tracing::warn!("DATA_DIR not set, ledgers are kept in memory only"),
    }

    let gateway = builder.build();
    gateway.restore().await;

    // Start scheduled tasks (ledger compaction)
    let _scheduler = start_scheduler(gateway.clone())
        .await
        .context("Failed to start scheduled tasks")?;

    let app = build_app(
        AppState::new(gateway, AdminKey::new(config.admin_api_key.clone()))
            .with_trusted_proxies(config.trusted_proxies.clone()),
        &config.allowed_origins,
    );

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
