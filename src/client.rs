//! HTTP client that queries the health endpoints of a running server.
use crate::config::ServerConfig;
use crate::logging::Logger;
use crate::responder::{DIAGNOSTIC_PATH, LIVE_PATH};
use crate::status::AggregateReport;
use reqwest::{Client, StatusCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Server error: {0} - {1}")]
    ServerError(StatusCode, String),
}

pub struct HealthClient {
    base_url: String,
    client: Client,
    logger: Logger,
}

impl HealthClient {
    pub fn new(server: &ServerConfig, logger: Logger) -> Self {
        Self::with_base_url(server.to_string(), logger)
    }

    pub fn with_base_url(base_url: impl Into<String>, logger: Logger) -> Self {
        HealthClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            logger: logger.named("client"),
        }
    }

    /// Checks if the server answers its liveness probe.
    pub async fn is_running(&self) -> bool {
        match self.get(LIVE_PATH).await {
            Ok((status, body)) => status == StatusCode::OK && body == "alive",
            Err(_) => false,
        }
    }

    /// Retrieves the full health report. An unhealthy service answers 503 with a report,
    /// which is not an error.
    pub async fn get_report(&self) -> Result<AggregateReport, ClientError> {
        let (status, body) = self.get(DIAGNOSTIC_PATH).await?;
        if status != StatusCode::OK && status != StatusCode::SERVICE_UNAVAILABLE {
            return Err(ClientError::ServerError(status, body));
        }
        let report = serde_json::from_str(&body)?;
        Ok(report)
    }

    /// Send a GET request to the server.
    async fn get(&self, path: &str) -> Result<(StatusCode, String), ClientError> {
        let url = format!("{}{}", self.base_url, path);
        self.logger.debug(format_args!("GET {}", url));
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}
