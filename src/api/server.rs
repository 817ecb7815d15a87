use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{health_check, index, receive_alert, stats, AppState};
use crate::alerts::{Clock, Dispatcher, RateLimitSweeper, RateLimiter, SystemClock};
use crate::channels::{ChannelError, ChannelSender, EmailSender, WebhookSender};
use crate::config::AppConfig;

/// Build the dispatcher and its channels from configuration
pub fn build_dispatcher(
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> Result<Dispatcher, ChannelError> {
    let channels: Vec<Arc<dyn ChannelSender>> = vec![
        Arc::new(EmailSender::from_config(config.email.clone())?),
        Arc::new(WebhookSender::from_config(config.webhook.clone())?),
    ];

    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

    Ok(Dispatcher::new(limiter, channels, clock)
        .with_channel_timeout(Duration::from_secs(config.server.channel_timeout_secs)))
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/alert", post(receive_alert))
        .route("/stats", get(stats))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let dispatcher = Arc::new(build_dispatcher(&config, Arc::clone(&clock))?);

    let sweeper = Arc::new(RateLimitSweeper::new(
        Arc::clone(dispatcher.limiter()),
        clock,
        Duration::from_secs(config.server.sweep_interval_secs),
    ));
    let sweeper_handle = Arc::clone(&sweeper).start();

    let state = Arc::new(AppState {
        dispatcher,
        dispatch_deadline: Duration::from_secs(config.server.dispatch_deadline_secs),
    });

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Starting alert relay on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&sweeper)))
        .await?;

    sweeper_handle.abort();

    tracing::info!("Alert relay stopped");
    Ok(())
}

async fn shutdown_signal(sweeper: Arc<RateLimitSweeper>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutdown signal received, stopping workers...");
    sweeper.stop();
}
