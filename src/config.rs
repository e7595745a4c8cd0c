use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgSslMode};

const DEFAULT_JWT_SECRET: &str = "change-me-in-production";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: PgSslMode,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
            .ssl_mode(self.ssl_mode)
    }
}

/// Bootstrap admin account created at start-up when both email and password are set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub env: Environment,
    pub log_level: String,
    pub store: StoreKind,
    pub database: DatabaseConfig,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub metrics_port: Option<u16>,
    pub admin: Option<AdminSeed>,
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
    InsecureSecret,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {var}: {value:?}"),
            ConfigError::InsecureSecret => {
                write!(f, "JWT_SECRET must be set to a non-default value in production")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Read configuration from the process environment (after `.env` is loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let text = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        fn parsed<T: FromStr>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
            match raw {
                None => Ok(default),
                Some(v) => v.parse().map_err(|_| ConfigError::Invalid { var, value: v }),
            }
        }

        let env = match text("ENV", "development").as_str() {
            "production" | "prod" => Environment::Production,
            "development" | "dev" | "test" => Environment::Development,
            other => return Err(ConfigError::Invalid { var: "ENV", value: other.to_string() }),
        };
        let store = match text("FLEETBOOK_STORE", "postgres").as_str() {
            "postgres" => StoreKind::Postgres,
            "memory" => StoreKind::Memory,
            other => {
                return Err(ConfigError::Invalid { var: "FLEETBOOK_STORE", value: other.to_string() });
            }
        };

        let jwt_secret = text("JWT_SECRET", DEFAULT_JWT_SECRET);
        if env == Environment::Production && jwt_secret == DEFAULT_JWT_SECRET {
            return Err(ConfigError::InsecureSecret);
        }

        let metrics_port = match get("FLEETBOOK_METRICS_PORT") {
            None => None,
            Some(v) => Some(parsed("FLEETBOOK_METRICS_PORT", Some(v), 0)?),
        };

        let jwt_expiration_hours = parsed("JWT_EXPIRATION_HOURS", get("JWT_EXPIRATION_HOURS"), 24)?;
        if jwt_expiration_hours <= 0 {
            return Err(ConfigError::Invalid {
                var: "JWT_EXPIRATION_HOURS",
                value: jwt_expiration_hours.to_string(),
            });
        }

        let admin = match (get("ADMIN_EMAIL"), get("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed {
                name: text("ADMIN_NAME", "Administrator"),
                email,
                password,
            }),
            _ => None,
        };

        Ok(Config {
            bind: text("BIND", "0.0.0.0"),
            port: parsed("PORT", get("PORT"), 8080)?,
            env,
            log_level: text("RUST_LOG", "info"),
            store,
            database: DatabaseConfig {
                host: text("DB_HOST", "localhost"),
                port: parsed("DB_PORT", get("DB_PORT"), 5432)?,
                user: text("DB_USER", "postgres"),
                password: text("DB_PASSWORD", "postgres"),
                name: text("DB_NAME", "car_rental"),
                ssl_mode: parsed("DB_SSL_MODE", get("DB_SSL_MODE"), PgSslMode::Disable)?,
                max_connections: parsed("DB_MAX_CONNECTIONS", get("DB_MAX_CONNECTIONS"), 10)?,
            },
            jwt_secret,
            jwt_expiration_hours,
            metrics_port,
            admin,
        })
    }
}
