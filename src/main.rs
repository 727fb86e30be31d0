// Server entry: load configuration, prepare storage, serve the dashboard and API.
use anyhow::Context;
use semaforo_telemetry::config::{load_config, Config};
use semaforo_telemetry::shutdown::shutdown_signal;
use semaforo_telemetry::state::AppState;
use semaforo_telemetry::{build_app, i18n};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config loading logs before the configured filter exists.
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(env_filter("info"))
        .finish();
    let config = tracing::subscriber::with_default(bootstrap, load_config)
        .context("configuration is invalid")?;
    init_tracing(&config);
    i18n::configure_i18n(&config.i18n.default_language);

    let addr = config.bind_address();
    let state = Arc::new(AppState::new(config).context("storage configuration is invalid")?);
    state.prepare_storage().await?;

    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(addr.as_str())
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    info!("telemetry server listening on http://{addr}");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(err) = server.await {
        warn!("server stopped with error: {err}");
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let default_level = config.observability.log_level.trim();
    let default_level = if default_level.is_empty() {
        "info".to_string()
    } else {
        default_level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(&default_level))
        .init();
}

fn env_filter(default_level: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level))
}
