mod cli;
mod error;
mod exposition;
mod handlers;
mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, Response};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use nvsmi_collector::{GpuCollector, NvidiaSmi};
use nvsmi_core::MetricSchema;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::Cli;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let config = Cli::parse().into_config();
    config.validate().context("Invalid configuration")?;

    // A broken schema must stop the exporter before it serves anything.
    let schema = Arc::new(MetricSchema::nvidia().context("Invalid metric schema")?);
    info!(metrics = schema.len(), "Loaded metric schema");

    let runner = Arc::new(NvidiaSmi::new(&config.smi));
    let collector = GpuCollector::new(schema, runner);
    let state = Arc::new(AppState::new(collector).context("Failed to set up metrics registry")?);

    let app = router(state, &config.telemetry_path);

    let listener = tokio::net::TcpListener::bind(config.listen_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_address))?;
    info!(
        "Serving metrics on http://{}{}",
        config.listen_address, config.telemetry_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub(crate) fn router(state: Arc<AppState>, telemetry_path: &str) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "scrape",
                method = %req.method(),
                uri = %req.uri(),
            )
        })
        .on_response(|res: &Response<Body>, latency: Duration, _span: &tracing::Span| {
            info!(
                latency = %format!("{} ms", latency.as_millis()),
                status = %res.status().as_u16(),
                "finished processing scrape"
            );
        });

    Router::new()
        .route(telemetry_path, get(handlers::metrics))
        .layer(trace_layer)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down");
}
