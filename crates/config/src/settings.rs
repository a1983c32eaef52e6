use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub jwt: JwtSettings,
    pub dispatch: DispatchSettings,
    pub push: PushSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub name: String,
    pub max_pool_size: Option<u32>,
    pub min_pool_size: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,
    pub issuer: String,
}

/// Tuning for the send pipeline.
#[derive(Debug, Deserialize, Clone)]
pub struct DispatchSettings {
    /// Characters kept in summaries and push bodies before the ellipsis.
    pub preview_length: usize,
    /// How long a live push waits for the client `ack` before giving up.
    pub ack_timeout_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_initial_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PushSettings {
    /// `log` or `fcm`.
    pub provider: String,
    pub fcm_endpoint: String,
    pub fcm_server_key: Option<String>,
    pub request_timeout_ms: u64,
    pub token_max_age_days: u32,
    pub prune_interval_secs: u64,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("PARLEY"),
            )
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 3000)?
            .set_default("app.cors_origins", Vec::<String>::new())?
            .set_default("database.url", "mongodb://localhost:27017/?replicaSet=rs0")?
            .set_default("database.name", "parley")?
            .set_default("jwt.secret", "change-me-in-production")?
            .set_default("jwt.access_token_ttl_secs", 3600)?
            .set_default("jwt.refresh_token_ttl_secs", 604800)?
            .set_default("jwt.issuer", "parley")?
            .set_default("dispatch.preview_length", 30)?
            .set_default("dispatch.ack_timeout_ms", 5000)?
            .set_default("dispatch.retry_max_attempts", 4)?
            .set_default("dispatch.retry_initial_delay_ms", 500)?
            .set_default("push.provider", "log")?
            .set_default("push.fcm_endpoint", "https://fcm.googleapis.com/fcm/send")?
            .set_default("push.fcm_server_key", None::<String>)?
            .set_default("push.request_timeout_ms", 10000)?
            .set_default("push.token_max_age_days", 30)?
            .set_default("push.prune_interval_secs", 86400)?
            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app: AppSettings {
                host: "0.0.0.0".to_string(),
                port: 3000,
                cors_origins: Vec::new(),
            },
            database: DatabaseSettings {
                url: "mongodb://localhost:27017/?replicaSet=rs0".to_string(),
                name: "parley".to_string(),
                max_pool_size: None,
                min_pool_size: None,
            },
            jwt: JwtSettings {
                secret: "change-me-in-production".to_string(),
                access_token_ttl_secs: 3600,
                refresh_token_ttl_secs: 604800,
                issuer: "parley".to_string(),
            },
            dispatch: DispatchSettings {
                preview_length: 30,
                ack_timeout_ms: 5000,
                retry_max_attempts: 4,
                retry_initial_delay_ms: 500,
            },
            push: PushSettings {
                provider: "log".to_string(),
                fcm_endpoint: "https://fcm.googleapis.com/fcm/send".to_string(),
                fcm_server_key: None,
                request_timeout_ms: 10000,
                token_max_age_days: 30,
                prune_interval_secs: 86400,
            },
        }
    }
}
