//! Alert Relay Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - ALERT_RELAY_HOST: Bind address (default: 0.0.0.0)
//! - PORT: Port number (default: 8080)
//! - CONFIG_FILE: YAML configuration (default: /app/config/config.yml)
//! - SMTP_SERVER, SMTP_PORT, SMTP_USER, SMTP_PASSWORD: SMTP relay; setting
//!   SMTP_SERVER enables email
//! - ALERT_FROM: Sender address
//! - ALERT_TO: Comma-separated recipient addresses
//! - WEBHOOK_URLS: Comma-separated webhook URLs; setting it enables webhooks
//! - RUST_LOG: Log level (default: info)

use alert_relay::api::run_server;
use alert_relay::config::AppConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alert_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load();

    tracing::info!("Alert relay configuration:");
    tracing::info!("  Listen: {}:{}", config.server.host, config.server.port);
    if config.email.enabled {
        tracing::info!(
            "  Email: {}:{} -> {} recipient(s)",
            config.email.smtp_server,
            config.email.smtp_port,
            config.email.to_addresses.len()
        );
    } else {
        tracing::info!("  Email: DISABLED");
    }
    if config.webhook.enabled {
        tracing::info!(
            "  Webhook: {} {} URL(s)",
            config.webhook.method,
            config.webhook.urls.len()
        );
    } else {
        tracing::info!("  Webhook: DISABLED");
    }
    if config.rate_limit.enabled {
        tracing::info!(
            "  Rate limit: {} similar alerts per {} seconds",
            config.rate_limit.max_similar_alerts,
            config.rate_limit.window_seconds
        );
    } else {
        tracing::info!("  Rate limit: DISABLED");
    }

    println!(
        r#"
  Alert Relay
  Security alert intake and notification fan-out
  Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}
