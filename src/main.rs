mod config;
mod db;
mod error;
mod middleware;
mod rate_limit;
mod recommend;
mod routes;
mod services;
mod state;

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("database init failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("server: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    // A missing .env file is normal outside local development.
    let _ = dotenvy::dotenv();

    let settings = config::Settings::from_env()?;
    init_tracing(&settings);

    let pool = db::init_pool(&settings.database_url, settings.db_max_connections).await?;
    let store = services::token_store::connect(settings.redis_url.as_deref()).await;
    let port = settings.port;
    let state = state::AppState::new(pool, settings, store);

    if let Err(e) = state.rebuild_engines().await {
        tracing::error!(error = %e, "recommenders failed to initialize; starting without them");
    }

    let app = routes::app(state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tracing::info!(%port, app = %state.settings.app_name, version = %state.settings.version, "scentmatch listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

/// JSON logs in production, human-readable otherwise. `RUST_LOG` wins over
/// the `DEBUG` default.
fn init_tracing(settings: &config::Settings) {
    let default_level = if settings.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if settings.production {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
