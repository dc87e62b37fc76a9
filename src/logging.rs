//! Logging capability handed to every component at construction.
//!
//! The backend is `env_logger` behind the `log` facade. It is installed with a permissive
//! filter and the effective level is governed by `log::max_level()`, which is what makes
//! [`Logger::set_level`] take effect on the running process.

use crate::config::{LogConfig, LogFormat, ServiceConfig};
use crate::middleware::RequestContext;
use log::{Level, LevelFilter};
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("logger not initialized")]
    NotInitialized,
    #[error("logger already initialized")]
    AlreadyInitialized,
    #[error("invalid log level: {0}")]
    InvalidLevel(String),
}

const DEFAULT_TARGET: &str = "resilience";

#[derive(Clone)]
pub struct Logger {
    target: Arc<str>,
    fields: Arc<Vec<(String, String)>>,
    attached: bool,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("target", &self.target)
            .field("fields", &self.fields)
            .field("attached", &self.attached)
            .finish()
    }
}

/// Installs the logging backend and returns the root logger, carrying the service identity.
pub fn init(config: &LogConfig, service: &ServiceConfig) -> Result<Logger, LoggingError> {
    let level = parse_level(&config.level)?;

    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Trace);
    if config.format == LogFormat::Json {
        builder.format(|buf, record| {
            let line = serde_json::json!({
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "level": record.level().to_string(),
                "target": record.target(),
                "message": record.args().to_string(),
            });
            writeln!(buf, "{}", line)
        });
    }
    builder
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;
    log::set_max_level(level);

    Ok(Logger {
        target: Arc::from(DEFAULT_TARGET),
        fields: Arc::new(Vec::new()),
        attached: true,
    }
    .with_field("service", &service.name)
    .with_field("version", &service.version)
    .with_field("environment", &service.environment))
}

fn parse_level(level: &str) -> Result<LevelFilter, LoggingError> {
    LevelFilter::from_str(level.trim()).map_err(|_| LoggingError::InvalidLevel(level.to_string()))
}

impl Logger {
    /// A logger that writes through the `log` facade without owning the backend. Used when
    /// the crate is embedded in a process that set up logging itself, and in tests.
    pub fn detached() -> Self {
        Logger {
            target: Arc::from(DEFAULT_TARGET),
            fields: Arc::new(Vec::new()),
            attached: false,
        }
    }

    /// Returns a child logger that logs under `target`.
    pub fn named(&self, target: &str) -> Self {
        Logger {
            target: Arc::from(target),
            fields: self.fields.clone(),
            attached: self.attached,
        }
    }

    /// Returns a child logger carrying one more context field.
    pub fn with_field(&self, key: &str, value: impl fmt::Display) -> Self {
        let mut fields = (*self.fields).clone();
        fields.push((key.to_string(), value.to_string()));
        Logger {
            target: self.target.clone(),
            fields: Arc::new(fields),
            attached: self.attached,
        }
    }

    /// Returns a child logger carrying the trace and request ids, if any.
    pub fn for_request(&self, request: Option<&RequestContext>) -> Self {
        match request {
            Some(request) => self
                .with_field("trace_id", &request.trace_id)
                .with_field("request_id", &request.request_id),
            None => self.clone(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Changes the level of the running process.
    pub fn set_level(&self, level: &str) -> Result<LevelFilter, LoggingError> {
        if !self.attached {
            return Err(LoggingError::NotInitialized);
        }
        let level = parse_level(level)?;
        log::set_max_level(level);
        self.info(format_args!("Log level changed new_level={}", level));
        Ok(level)
    }

    pub fn flush(&self) {
        log::logger().flush();
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.log(Level::Error, message);
    }

    fn log(&self, level: Level, message: impl fmt::Display) {
        log::log!(target: &*self.target, level, "{}{}", message, Fields(&self.fields));
    }
}

struct Fields<'a>(&'a [(String, String)]);

impl fmt::Display for Fields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in self.0 {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_logger_rejects_level_change() {
        let logger = Logger::detached();
        assert!(matches!(
            logger.set_level("debug"),
            Err(LoggingError::NotInitialized)
        ));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level(" WARN ").unwrap(), LevelFilter::Warn);
        assert!(matches!(
            parse_level("loud"),
            Err(LoggingError::InvalidLevel(level)) if level == "loud"
        ));
    }

    #[test]
    fn test_child_loggers_accumulate_fields() {
        let root = Logger::detached().with_field("service", "api");
        let request = RequestContext {
            trace_id: "t1".to_string(),
            request_id: "r1".to_string(),
        };
        let child = root.named("health").for_request(Some(&request));

        assert_eq!(child.target(), "health");
        assert_eq!(
            child.fields(),
            &[
                ("service".to_string(), "api".to_string()),
                ("trace_id".to_string(), "t1".to_string()),
                ("request_id".to_string(), "r1".to_string()),
            ]
        );
        // The parent is left untouched.
        assert_eq!(root.fields().len(), 1);
        assert_eq!(root.for_request(None).fields().len(), 1);
    }

    #[test]
    fn test_fields_rendering() {
        let fields = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "two".to_string()),
        ];
        assert_eq!(Fields(&fields).to_string(), " a=1 b=two");
        assert_eq!(Fields(&[]).to_string(), "");
    }
}
