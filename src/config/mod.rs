//! Service configuration
//!
//! Defaults, then environment variables, then an optional YAML file whose
//! `email`, `webhook` and `alert_rate_limit` sections override individual
//! keys. Configuration is read once at startup and never mutated after.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "/app/config/config.yml";

/// Longest accepted suppression window (ten years)
pub const MAX_WINDOW_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

const DEFAULT_SUBJECT_TEMPLATE: &str = "SecuriWatch Alert: {{ severity | upper }} - {{ event_type }}";

const DEFAULT_BODY_TEMPLATE: &str = r#"
<h2>SecuriWatch Security Alert</h2>
<p><strong>Severity:</strong> {{ severity | upper }}</p>
<p><strong>Source:</strong> {{ source }}</p>
<p><strong>Timestamp:</strong> {{ timestamp }}</p>
<p><strong>Event Type:</strong> {{ event_type }}</p>
<p><strong>Message:</strong></p>
<pre>{{ message }}</pre>
"#;

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub email: EmailConfig,
    pub webhook: WebhookConfig,
    pub rate_limit: RateLimitConfig,
    pub server: ServerConfig,
}

/// SMTP delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
    pub from_address: String,
    pub to_addresses: Vec<String>,
    pub subject_template: String,
    pub body_template: String,
    /// SMTP transport timeout
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: String::new(),
            smtp_port: 587,
            smtp_user: String::new(),
            smtp_password: String::new(),
            from_address: "alerter@securiwatch.local".to_string(),
            to_addresses: Vec::new(),
            subject_template: DEFAULT_SUBJECT_TEMPLATE.to_string(),
            body_template: DEFAULT_BODY_TEMPLATE.to_string(),
            timeout_secs: 10,
        }
    }
}

impl EmailConfig {
    /// Credentials are only used when both user and password are set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.smtp_user.is_empty() || self.smtp_password.is_empty() {
            None
        } else {
            Some((&self.smtp_user, &self.smtp_password))
        }
    }
}

/// Outbound webhook settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub urls: Vec<String>,
    pub method: String,
    pub headers: HashMap<String, String>,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            enabled: false,
            urls: Vec::new(),
            method: "POST".to_string(),
            headers,
            timeout_secs: 5,
        }
    }
}

/// Similar-alert suppression settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_seconds: u64,
    pub max_similar_alerts: usize,
}

impl RateLimitConfig {
    /// The window as a signed duration, capped at [`MAX_WINDOW_SECONDS`]
    pub fn window(&self) -> chrono::Duration {
        let secs = i64::try_from(self.window_seconds.min(MAX_WINDOW_SECONDS)).unwrap_or(i64::MAX);
        chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_seconds > MAX_WINDOW_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "alert_rate_limit.window_seconds {} exceeds the maximum of {}",
                self.window_seconds, MAX_WINDOW_SECONDS
            )));
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_seconds: 300,
            max_similar_alerts: 3,
        }
    }
}

/// HTTP server and dispatch timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on handling one alert end to end
    pub dispatch_deadline_secs: u64,
    /// Upper bound on one channel's send
    pub channel_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            dispatch_deadline_secs: 30,
            channel_timeout_secs: 20,
            sweep_interval_secs: 60,
        }
    }
}

/// YAML overlay; every key is optional
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    email: Option<EmailOverlay>,
    #[serde(default)]
    webhook: Option<WebhookOverlay>,
    #[serde(default)]
    alert_rate_limit: Option<RateLimitOverlay>,
}

#[derive(Debug, Default, Deserialize)]
struct EmailOverlay {
    enabled: Option<bool>,
    smtp_server: Option<String>,
    smtp_port: Option<u16>,
    smtp_user: Option<String>,
    smtp_password: Option<String>,
    from_address: Option<String>,
    to_addresses: Option<Vec<String>>,
    subject_template: Option<String>,
    body_template: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookOverlay {
    enabled: Option<bool>,
    urls: Option<Vec<String>>,
    method: Option<String>,
    headers: Option<HashMap<String, String>>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitOverlay {
    enabled: Option<bool>,
    window_seconds: Option<u64>,
    max_similar_alerts: Option<usize>,
}

macro_rules! overlay {
    ($target:expr, $source:expr, $($field:ident),+) => {
        $(if let Some(value) = $source.$field {
            $target.$field = value;
        })+
    };
}

impl AppConfig {
    /// Load from the process environment and the file named by `CONFIG_FILE`
    pub fn load() -> Self {
        let path = std::env::var("CONFIG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_with(|key| std::env::var(key).ok(), &path)
    }

    /// Load using `env` for variable lookup.
    ///
    /// A missing file is a warning and an unreadable or invalid one an
    /// error; both fall back to environment and defaults.
    pub fn load_with<F>(env: F, path: &Path) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::from_env(&env);

        if path.exists() {
            match config.merge_file(path) {
                Ok(()) => tracing::info!("Loaded configuration from {}", path.display()),
                Err(e) => tracing::error!("Error loading config file: {}", e),
            }
        } else {
            tracing::warn!(
                "Config file {} not found, using default configuration",
                path.display()
            );
        }

        let present = |key: &str| env(key).map(|v| !v.is_empty()).unwrap_or(false);
        if present("SMTP_SERVER") {
            config.email.enabled = true;
        }
        if present("WEBHOOK_URLS") {
            config.webhook.enabled = true;
        }

        config
    }

    /// Defaults overlaid with environment variables
    pub fn from_env<F>(env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(server) = env("SMTP_SERVER") {
            config.email.smtp_server = server;
        }
        if let Some(port) = env("SMTP_PORT").and_then(|p| p.parse().ok()) {
            config.email.smtp_port = port;
        }
        if let Some(user) = env("SMTP_USER") {
            config.email.smtp_user = user;
        }
        if let Some(password) = env("SMTP_PASSWORD") {
            config.email.smtp_password = password;
        }
        if let Some(from) = env("ALERT_FROM") {
            config.email.from_address = from;
        }
        if let Some(to) = env("ALERT_TO") {
            config.email.to_addresses = split_list(&to);
        }
        if let Some(urls) = env("WEBHOOK_URLS") {
            config.webhook.urls = split_list(&urls);
        }
        if let Some(host) = env("ALERT_RELAY_HOST") {
            config.server.host = host;
        }
        if let Some(port) = env("PORT").and_then(|p| p.parse().ok()) {
            config.server.port = port;
        }

        config
    }

    /// Overlay the keys present in a YAML file
    pub fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.merge_yaml(&content)
    }

    /// Overlay the keys present in a YAML document. Nothing is applied
    /// unless the merged result validates.
    pub fn merge_yaml(&mut self, content: &str) -> Result<(), ConfigError> {
        // An empty document deserializes to unit, not a mapping
        if content.trim().is_empty() {
            return Ok(());
        }
        let file: Option<FileConfig> = serde_yaml::from_str(content)?;
        let Some(file) = file else {
            return Ok(());
        };

        let mut merged = self.clone();
        if let Some(email) = file.email {
            overlay!(
                merged.email, email, enabled, smtp_server, smtp_port, smtp_user, smtp_password,
                from_address, to_addresses, subject_template, body_template, timeout_secs
            );
        }
        if let Some(webhook) = file.webhook {
            overlay!(merged.webhook, webhook, enabled, urls, method, headers, timeout_secs);
        }
        if let Some(rate_limit) = file.alert_rate_limit {
            overlay!(
                merged.rate_limit, rate_limit, enabled, window_seconds, max_similar_alerts
            );
        }

        merged.rate_limit.validate()?;
        *self = merged;
        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
