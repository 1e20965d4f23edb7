//! pantheon-sse server entry point.
//!
//! Starts the Axum HTTP server with the REST and SSE endpoints and the
//! heartbeat driver, and drains open streams on Ctrl-C.

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pantheon_sse::api;
use pantheon_sse::app_state::AppState;
use pantheon_sse::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing; LOG_FORMAT=json switches to structured output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = ServerConfig::from_env()?;
    tracing::info!(
        addr = %config.listen_addr,
        capacity = config.pubsub.channel_capacity,
        policy = %config.pubsub.backpressure,
        retention = config.pubsub.replay_retention,
        "starting pantheon-sse"
    );

    // Build core state and background drivers
    let app_state = AppState::new(&config);
    let heartbeat = app_state
        .heartbeat()
        .spawn(app_state.connections.shutdown_signal());

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state.clone());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    let connections = app_state.connections;
    let grace = config.pubsub.shutdown_grace;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown signal received");
            let report = connections.shutdown(grace).await;
            tracing::info!(
                closed = report.closed,
                remaining = report.remaining,
                timed_out = report.timed_out,
                "streams drained"
            );
        })
        .await?;

    if let Err(e) = heartbeat.await {
        tracing::warn!(error = %e, "heartbeat driver ended abnormally");
    }
    tracing::info!("server stopped");
    Ok(())
}
