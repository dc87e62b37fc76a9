use std::env;
use std::time::Duration;
use thiserror::Error;

const PREFIX: &str = "RESILIENCE_";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("{0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub logging: LogConfig,
    pub health: HealthConfig,
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub version: String,
    pub environment: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "http://{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteServiceConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub readiness_timeout: Duration,
    pub diagnostic_timeout: Duration,
    pub remote_timeout: Duration,
    pub remote_services: Vec<RemoteServiceConfig>,
    pub database_url: Option<String>,
    pub cache_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    pub timeout: Duration,
}

impl Config {
    /// Reads the configuration from `RESILIENCE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Keys are the full variable
    /// names, including the `RESILIENCE_` prefix.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let config = Config {
            service: ServiceConfig {
                name: vars.string("SERVICE_NAME", env!("CARGO_PKG_NAME")),
                version: vars.string("SERVICE_VERSION", env!("CARGO_PKG_VERSION")),
                environment: vars.string("ENVIRONMENT", "development"),
            },
            server: ServerConfig {
                address: vars.string("SERVER_ADDRESS", "127.0.0.1"),
                port: vars.parse("SERVER_PORT", 8080)?,
            },
            logging: LogConfig {
                level: vars.string("LOG_LEVEL", "info"),
                format: match vars.string("LOG_FORMAT", "text").as_str() {
                    "text" | "console" => LogFormat::Text,
                    "json" => LogFormat::Json,
                    other => return Err(vars.invalid("LOG_FORMAT", other)),
                },
            },
            health: HealthConfig {
                readiness_timeout: vars.seconds("READINESS_TIMEOUT", 10)?,
                diagnostic_timeout: vars.seconds("DIAGNOSTIC_TIMEOUT", 30)?,
                remote_timeout: vars.seconds("REMOTE_TIMEOUT", 5)?,
                remote_services: vars.remote_services("REMOTE_SERVICES")?,
                database_url: vars.optional("DATABASE_URL"),
                cache_url: vars.optional("CACHE_URL"),
            },
            shutdown: ShutdownConfig {
                timeout: vars.seconds("SHUTDOWN_TIMEOUT", 30)?,
            },
        };

        if config.health.readiness_timeout > config.health.diagnostic_timeout {
            return Err(ConfigError::Inconsistent(format!(
                "readiness timeout ({:?}) exceeds diagnostic timeout ({:?})",
                config.health.readiness_timeout, config.health.diagnostic_timeout
            )));
        }

        Ok(config)
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(&format!("{}{}", PREFIX, key))
    }

    fn invalid(&self, key: &str, value: &str) -> ConfigError {
        ConfigError::InvalidValue {
            key: format!("{}{}", PREFIX, key),
            value: value.to_string(),
        }
    }

    fn optional(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            Some(value) => value.parse().map_err(|_| self.invalid(key, &value)),
            None => Ok(default),
        }
    }

    fn seconds(&self, key: &str, default: u64) -> Result<Duration, ConfigError> {
        let seconds: u64 = self.parse(key, default)?;
        if seconds == 0 {
            return Err(self.invalid(key, "0"));
        }
        Ok(Duration::from_secs(seconds))
    }

    /// Parses `name=url` pairs separated by commas.
    fn remote_services(&self, key: &str) -> Result<Vec<RemoteServiceConfig>, ConfigError> {
        let Some(value) = self.optional(key) else {
            return Ok(Vec::new());
        };
        value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.split_once('=') {
                Some((name, url)) if !name.trim().is_empty() && !url.trim().is_empty() => {
                    Ok(RemoteServiceConfig {
                        name: name.trim().to_string(),
                        url: url.trim().to_string(),
                    })
                }
                _ => Err(self.invalid(key, entry)),
            })
            .collect()
    }
}
