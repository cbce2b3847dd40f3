use anyhow::{Context, Result};
use clap::Parser;
use filebox::{config::ServerConfig, router, sessions::SessionStore, AppState};
use std::sync::Arc;
use tokio::signal;
use tokio::time::{interval, Duration};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::parse();
    let state = Arc::new(AppState::open(&config).context("Failed to initialize storage")?);

    let sessions = state.sessions.clone();
    let prune_every = config.session_prune_interval();
    tokio::spawn(async move {
        session_pruner(sessions, prune_every).await;
    });

    let app = router(state, config.max_upload_bytes).layer(TraceLayer::new_for_http());

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, data_dir = %config.data_dir.display(), upload_dir = %config.upload_dir.display(), "file server running");
    info!("endpoints: GET / | POST /upload | POST /rename/:id | POST /delete/:id | GET /download/:id | /login | /sign-up | POST /logout");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("server shut down");
    Ok(())
}

async fn session_pruner(sessions: Arc<dyn SessionStore>, every: Duration) {
    let mut interval = interval(every);

    loop {
        interval.tick().await;

        let removed = sessions.prune().await;
        if removed > 0 {
            debug!(removed, "pruned expired sessions");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
