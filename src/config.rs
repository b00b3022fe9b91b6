//! Process configuration, read once from the environment at startup.

use {
    crate::{domain::money::Currency, services::EngineSettings},
    std::{env, net::SocketAddr, str::FromStr, time::Duration},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bind_addr: SocketAddr,
    /// Key for gateway credentials stored at rest.
    pub payment_encryption_key: String,
    pub frontend_url: String,
    pub public_api_url: String,
    pub paymob_base_url: String,
    pub duplicate_order_window: Duration,
    /// `None` leaves pending payments pending until a gateway answers.
    pub payment_expiry: Option<Duration>,
    pub default_currency: Currency,
    pub request_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections: parsed("DB_MAX_CONNECTIONS")?.unwrap_or(20),
            bind_addr: parsed("BIND_ADDR")?
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000))),
            payment_encryption_key: required("PAYMENT_ENCRYPTION_KEY")?,
            frontend_url: trimmed_url("FRONTEND_URL", "http://localhost:3030"),
            public_api_url: trimmed_url("PUBLIC_API_URL", "http://localhost:3000"),
            paymob_base_url: trimmed_url(
                "PAYMOB_BASE_URL",
                crate::adapters::paymob_client::DEFAULT_BASE_URL,
            ),
            duplicate_order_window: Duration::from_secs(
                parsed("DUPLICATE_ORDER_WINDOW_SECS")?.unwrap_or(600),
            ),
            payment_expiry: parsed("PAYMENT_EXPIRY_SECS")?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            default_currency: match optional("DEFAULT_CURRENCY") {
                Some(code) => Currency::try_from(code.as_str()).map_err(|e| {
                    ConfigError::Invalid {
                        name: "DEFAULT_CURRENCY",
                        reason: e.to_string(),
                    }
                })?,
                None => Currency::Aed,
            },
            request_timeout: Duration::from_secs(parsed("REQUEST_TIMEOUT_SECS")?.unwrap_or(30)),
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            frontend_url: self.frontend_url.clone(),
            public_api_url: self.public_api_url.clone(),
            duplicate_order_window: chrono::Duration::from_std(self.duplicate_order_window)
                .unwrap_or_else(|_| chrono::Duration::minutes(10)),
        }
    }
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parsed<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional(name)
        .map(|raw| {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn trimmed_url(name: &'static str, default: &str) -> String {
    optional(name)
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}
