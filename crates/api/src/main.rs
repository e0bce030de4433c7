use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use facerelay_api::config::ServerConfig;
use facerelay_api::router::build_app_router;
use facerelay_api::state::AppState;
use facerelay_pipeline::{Orchestrator, OrchestratorConfig};

const DEFAULT_LOG_FILTER: &str =
    "facerelay_api=debug,facerelay_pipeline=debug,facerelay_comfyui=debug,tower_http=debug";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = or_exit(ServerConfig::from_env(), "Invalid server configuration");
    let pipeline_config = or_exit(OrchestratorConfig::from_env(), "Invalid pipeline configuration");
    or_exit(
        config.check_pipeline(&pipeline_config),
        "Invalid pipeline configuration",
    );
    tracing::info!(
        host = %config.host,
        port = config.port,
        max_body_bytes = config.max_body_bytes,
        comfy_url = %pipeline_config.comfy_url,
        workflow_path = %pipeline_config.workflow_path.display(),
        cache_workflow = pipeline_config.cache_workflow,
        "Loaded configuration",
    );

    // --- Orchestrator ---
    let orchestrator = or_exit(
        Orchestrator::from_config(&pipeline_config),
        "Failed to initialise job pipeline",
    );

    // --- App state ---
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        config: Arc::new(config.clone()),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let host = or_exit(
        config
            .host
            .parse::<IpAddr>()
            .map_err(|e| format!("Invalid HOST address: {e}")),
        "Invalid server configuration",
    );
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// `LOG_FORMAT=json` switches to line-delimited JSON output.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn or_exit<T, E: std::fmt::Display>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %e, "{context}");
            std::process::exit(1);
        }
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix). In-flight jobs
/// are allowed to finish before the process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
