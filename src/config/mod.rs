/// Configuration management for the Upflo service
///
/// Handles server binding, database location, scheduler cadence and the
/// outbound email provider. Every value can be overridden from the environment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Workflow email scheduler configuration
    pub scheduler: SchedulerConfig,
    /// Outbound email configuration
    pub email: EmailConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file, created on first start (default: "data/upflo.db")
    pub path: String,
}

/// Scheduler tick and delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between two ticks of the scheduler
    pub tick_interval_secs: u64,
    /// Upper bound on a single send call, in seconds
    pub send_timeout_secs: u64,
    /// Failed sends tolerated before an entry is dead-lettered (0 = retry forever)
    pub max_tries: u32,
}

/// Which provider delivers outgoing email
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum EmailProviderConfig {
    /// Log every message instead of delivering it
    Log,
    /// Deliver through an SMTP relay
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: String,
    },
    /// Deliver through the Mailgun HTTP API
    Mailgun {
        domain: String,
        api_key: String,
        base_url: String,
    },
}

/// Outbound email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Envelope sender used by the providers
    pub from_address: String,
    /// Selected provider and its credentials
    pub provider: EmailProviderConfig,
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs.max(1))
    }

    /// Max tries as an option, `None` meaning unlimited retries
    pub fn max_tries(&self) -> Option<u32> {
        if self.max_tries == 0 {
            None
        } else {
            Some(self.max_tries)
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 45,
            send_timeout_secs: 30,
            max_tries: 5,
        }
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            server: ServerConfig {
                host: std::env::var("UPFLO_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_parse("UPFLO_PORT", 3004),
            },
            database: DatabaseConfig {
                path: std::env::var("UPFLO_DATABASE_PATH")
                    .unwrap_or_else(|_| "data/upflo.db".to_string()),
            },
            scheduler: SchedulerConfig {
                tick_interval_secs: env_parse(
                    "UPFLO_TICK_INTERVAL_SECS",
                    defaults.tick_interval_secs,
                ),
                send_timeout_secs: env_parse("UPFLO_SEND_TIMEOUT_SECS", defaults.send_timeout_secs),
                max_tries: env_parse("UPFLO_MAX_TRIES", defaults.max_tries),
            },
            email: EmailConfig {
                from_address: std::env::var("UPFLO_EMAIL_FROM")
                    .unwrap_or_else(|_| "noreply@localhost".to_string()),
                provider: provider_from_env(),
            },
        }
    }
}

/// Read the provider selection; missing credentials stay empty and are
/// rejected when the sender is built.
fn provider_from_env() -> EmailProviderConfig {
    let var = |key: &str| std::env::var(key).unwrap_or_default();
    match std::env::var("UPFLO_EMAIL_PROVIDER")
        .unwrap_or_else(|_| "log".to_string())
        .to_lowercase()
        .as_str()
    {
        "smtp" => EmailProviderConfig::Smtp {
            host: var("UPFLO_SMTP_HOST"),
            port: env_parse("UPFLO_SMTP_PORT", 587),
            username: var("UPFLO_SMTP_USERNAME"),
            password: var("UPFLO_SMTP_PASSWORD"),
        },
        "mailgun" => EmailProviderConfig::Mailgun {
            domain: var("UPFLO_MAILGUN_DOMAIN"),
            api_key: var("UPFLO_MAILGUN_API_KEY"),
            base_url: std::env::var("UPFLO_MAILGUN_BASE_URL")
                .unwrap_or_else(|_| "https://api.mailgun.net".to_string()),
        },
        _ => EmailProviderConfig::Log,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
