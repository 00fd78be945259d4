use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use nexus_gateway::config::GatewayConfig;
use nexus_gateway::consts::format_millis;
use nexus_gateway::engine::EngineContext;
use nexus_gateway::engine::supervisor::Supervisor;
use nexus_gateway::gateway::{self, AppState};
use nexus_gateway::limiter::TokenBucket;
use nexus_gateway::loader::IndicatorSource;
use nexus_gateway::loader::postgres::PostgresSource;
use nexus_gateway::loader::sqlite::SqliteSource;

#[derive(Parser)]
#[command(
    name = "nexus-gateway",
    author,
    version,
    about = "Rate-limited HTTP gateway in front of the Nexus-SUS indicator engine."
)]
struct Cli {
    #[command(flatten)]
    config: GatewayConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config;

    config.logging.init()?;
    config.validate()?;

    let source: Arc<dyn IndicatorSource> = match &config.db.sqlite_path {
        Some(path) => Arc::new(SqliteSource::open(path)?),
        None => Arc::new(PostgresSource::new(config.db.connection_string())),
    };
    info!(
        source = source.name(),
        engine = %config.engine.program.display(),
        "starting nexus-gateway"
    );

    let ctx = Arc::new(EngineContext::new(config.engine.query_timeout()));
    let limiter = Arc::new(TokenBucket::new(config.limiter.capacity));
    let refill = limiter.spawn_refill(config.limiter.refill_period());
    info!(
        capacity = limiter.capacity(),
        refill = %format_millis(config.limiter.refill_period()),
        "rate limiter armed"
    );

    // Bind before spawning anything: a taken port is fatal.
    let listener = TcpListener::bind(config.http.listen_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.http.listen_addr()))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let supervisor = Supervisor::new(Arc::clone(&ctx), config.engine.clone(), source);
    let supervisor = tokio::spawn(supervisor.run(shutdown_rx));

    let state = AppState {
        engine: Arc::clone(&ctx),
        limiter,
    };
    let served = gateway::serve(listener, state, shutdown_signal()).await;

    // HTTP is down; now stop the engine.
    let _ = shutdown_tx.send(true);
    if let Err(e) = supervisor.await {
        warn!("engine supervisor task failed: {}", e);
    }
    refill.abort();

    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
