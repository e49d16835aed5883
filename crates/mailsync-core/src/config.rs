//! Configuration module for the mail ingestion worker.
//!
//! Unlike the desktop-sync lineage this crate descends from (which loads a
//! YAML file), this worker is a headless service configured entirely from
//! the process environment, following twelve-factor convention for server
//! workloads. `Config::from_env` reads and validates every variable once
//! at startup; a missing or malformed required variable is a fatal
//! configuration error, not a runtime retry path.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while assembling [`Config`] from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("GRAPH_CLIENT_SECRET or GRAPH_CERT_PRIVATE_KEY_PATH+GRAPH_CERT_THUMBPRINT must be set")]
    MissingCredential,
}

/// Top-level configuration for the worker process.
#[derive(Debug, Clone)]
pub struct Config {
    pub env: String,
    pub log_level: String,
    pub host: String,
    pub port: u16,
    pub worker_instance_id: String,
    pub public_base_url: String,

    pub db_path: String,

    pub attachments: AttachmentConfig,
    pub graph: GraphConfig,
    pub subscription: SubscriptionConfig,
    pub delta: DeltaConfig,
    pub scheduler: SchedulerConfig,

    pub case_number_prefix: String,
    pub admin_api_key: String,
}

/// Attachment content-addressed store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentConfig {
    pub dir: String,
    pub max_size_mb: u64,
    pub allowed_extensions: Option<Vec<String>>,
    pub blocked_extensions: Vec<String>,
}

/// Microsoft Graph auth and tenant settings.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub credential: GraphCredential,
    pub client_state: String,
    pub mailbox_email: String,
}

/// The two supported client-credential shapes; certificate auth is
/// preferred when both are configured.
#[derive(Debug, Clone)]
pub enum GraphCredential {
    ClientSecret(String),
    Certificate {
        private_key_path: String,
        thumbprint: String,
    },
}

/// Subscription lifecycle settings.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    pub change_type: String,
    pub resource_template: String,
    pub lifetime_minutes: i64,
    pub renew_threshold_minutes: i64,
}

/// Delta backstop poller settings.
#[derive(Debug, Clone)]
pub struct DeltaConfig {
    pub page_size: u32,
    pub max_pages_per_run: u32,
    pub max_messages: u32,
    pub concurrency: usize,
}

/// Background scheduler interval/jitter settings for both loops.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub subscription_loop_interval: Duration,
    pub subscription_loop_jitter: Duration,
    pub delta_loop_interval: Duration,
    pub delta_loop_jitter: Duration,
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn env_var_or(name: &'static str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw,
            reason: "not parseable".to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn split_csv_lower(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Reads and validates configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let credential = match (
            env::var("GRAPH_CERT_PRIVATE_KEY_PATH").ok(),
            env::var("GRAPH_CERT_THUMBPRINT").ok(),
            env::var("GRAPH_CLIENT_SECRET").ok(),
        ) {
            (Some(path), Some(thumbprint), _) => GraphCredential::Certificate {
                private_key_path: path,
                thumbprint,
            },
            (_, _, Some(secret)) => GraphCredential::ClientSecret(secret),
            _ => return Err(ConfigError::MissingCredential),
        };

        let blocked_extensions = split_csv_lower(&env_var_or(
            "BLOCKED_ATTACHMENT_EXT",
            "exe,bat,cmd,sh,scr,com,msi",
        ));
        let allowed_extensions = env::var("ALLOWED_ATTACHMENT_EXT")
            .ok()
            .map(|raw| split_csv_lower(&raw));

        Ok(Config {
            env: env_var_or("ENV", "dev"),
            log_level: env_var_or("LOG_LEVEL", "info"),
            host: env_var_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8080u16)?,
            worker_instance_id: env_var_or("WORKER_INSTANCE_ID", "mailsync-worker-1"),
            public_base_url: env_var("PUBLIC_BASE_URL")?,

            db_path: env_var_or("DB_PATH", "mailsync.db"),

            attachments: AttachmentConfig {
                dir: env_var_or("ATTACHMENTS_DIR", "./attachments"),
                max_size_mb: env_parse_or("MAX_ATTACHMENT_SIZE_MB", 25u64)?,
                allowed_extensions,
                blocked_extensions,
            },

            graph: GraphConfig {
                tenant_id: env_var("GRAPH_TENANT_ID")?,
                client_id: env_var("GRAPH_CLIENT_ID")?,
                credential,
                client_state: env_var("GRAPH_CLIENT_STATE")?,
                mailbox_email: env_var("MAILBOX_EMAIL")?,
            },

            subscription: SubscriptionConfig {
                change_type: env_var_or("SUBSCRIPTION_CHANGE_TYPE", "created"),
                resource_template: env_var_or(
                    "SUBSCRIPTION_RESOURCE",
                    "users/{MAILBOX_EMAIL}/mailFolders('inbox')/messages",
                ),
                lifetime_minutes: env_parse_or("SUBSCRIPTION_LIFETIME_MINUTES", 4230i64)?,
                renew_threshold_minutes: env_parse_or("SUB_RENEW_THRESHOLD_MINUTES", 60i64)?,
            },

            delta: DeltaConfig {
                page_size: env_parse_or("DELTA_PAGE_SIZE", 50u32)?,
                max_pages_per_run: env_parse_or("DELTA_MAX_PAGES_PER_RUN", 20u32)?,
                max_messages: env_parse_or("DELTA_MAX_MESSAGES", 500u32)?,
                concurrency: env_parse_or("DELTA_CONCURRENCY", 3usize)?,
            },

            scheduler: SchedulerConfig {
                subscription_loop_interval: Duration::from_secs(env_parse_or(
                    "SUB_LOOP_INTERVAL_SECS",
                    120u64,
                )?),
                subscription_loop_jitter: Duration::from_secs(env_parse_or(
                    "SUB_LOOP_JITTER_SECS",
                    15u64,
                )?),
                delta_loop_interval: Duration::from_secs(env_parse_or(
                    "DELTA_LOOP_INTERVAL_SECS",
                    300u64,
                )?),
                delta_loop_jitter: Duration::from_secs(env_parse_or(
                    "DELTA_LOOP_JITTER_SECS",
                    20u64,
                )?),
            },

            case_number_prefix: env_var_or("CASE_NUMBER_PREFIX", "CASE"),
            admin_api_key: env_var("ADMIN_API_KEY")?,
        })
    }

    /// Substitutes `{MAILBOX_EMAIL}` into the configured subscription
    /// resource template.
    pub fn subscription_resource(&self) -> String {
        self.subscription
            .resource_template
            .replace("{MAILBOX_EMAIL}", &self.graph.mailbox_email)
    }

    /// The webhook notification URL derived from `public_base_url`.
    pub fn notification_url(&self) -> String {
        format!("{}/graph/webhook", self.public_base_url.trim_end_matches('/'))
    }
}
