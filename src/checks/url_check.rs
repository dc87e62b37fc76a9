use crate::checks::{CheckContext, Checker};
use crate::logging::Logger;
use crate::status::{CheckOutcome, CheckStatus};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Probes a remote service over HTTP. Any 2xx response is healthy.
pub struct UrlCheck {
    url: String,
    timeout: Duration,
    client: Client,
    logger: Logger,
}

impl UrlCheck {
    /// Fails when the HTTP client cannot be set up, e.g. when the system TLS or resolver
    /// configuration cannot be loaded.
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        logger: Logger,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            timeout,
            client,
            logger: logger.named("health::remote"),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Checker for UrlCheck {
    async fn check(&self, ctx: &CheckContext) -> CheckOutcome {
        let start = Instant::now();
        let timeout = self.timeout.min(ctx.remaining());

        let response = self.client.get(&self.url).timeout(timeout).send();
        let result = match tokio::time::timeout_at(ctx.deadline(), response).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("deadline exceeded".to_string()),
        };
        let duration = start.elapsed();

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.logger.for_request(ctx.request()).error(format_args!(
                    "Remote service health check failed url={} error={} duration={:?}",
                    self.url, e, duration
                ));
                return CheckOutcome::unhealthy(
                    format!("Remote service unreachable: {}", e),
                    duration,
                );
            }
        };

        let status_code = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let metadata = HashMap::from([
            ("service_url".to_string(), self.url.clone()),
            ("status_code".to_string(), status_code.as_u16().to_string()),
            ("content_type".to_string(), content_type),
        ]);

        if status_code.is_success() {
            CheckOutcome::new(CheckStatus::Healthy, duration)
                .with_message("Remote service responding")
                .with_metadata(metadata)
        } else {
            CheckOutcome::unhealthy(
                format!("Remote service returned status {}", status_code.as_u16()),
                duration,
            )
            .with_metadata(metadata)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn check(url: String, timeout: Duration) -> UrlCheck {
        UrlCheck::new(url, timeout, Logger::detached()).unwrap()
    }

    fn ctx() -> CheckContext {
        CheckContext::with_timeout(Duration::from_secs(10))
    }

    #[test]
    fn test_new_keeps_target() {
        let check = UrlCheck::new(
            "http://billing.internal/health",
            Duration::from_millis(750),
            Logger::detached(),
        )
        .expect("A client without TLS settings should always build.");

        assert_eq!(check.url(), "http://billing.internal/health");
        assert_eq!(check.timeout(), Duration::from_millis(750));
    }

    #[tokio::test]
    async fn test_run_with_successful_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("content-type", "application/json"),
            )
            .mount(&mock_server)
            .await;

        let url = mock_server.uri() + "/health";
        let outcome = check(url.clone(), Duration::from_secs(5)).check(&ctx()).await;

        assert_eq!(outcome.status, CheckStatus::Healthy);
        assert_eq!(outcome.metadata["status_code"], "200");
        assert_eq!(outcome.metadata["content_type"], "application/json");
        assert_eq!(outcome.metadata["service_url"], url);
    }

    #[tokio::test]
    async fn test_any_2xx_is_healthy() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let outcome = check(mock_server.uri(), Duration::from_secs(5))
            .check(&ctx())
            .await;
        assert_eq!(outcome.status, CheckStatus::Healthy);
    }

    #[tokio::test]
    async fn test_run_with_error_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let outcome = check(mock_server.uri(), Duration::from_secs(5))
            .check(&ctx())
            .await;

        assert_eq!(outcome.status, CheckStatus::Unhealthy);
        assert_eq!(
            outcome.message.as_deref(),
            Some("Remote service returned status 503")
        );
        assert_eq!(outcome.metadata["status_code"], "503");
    }

    #[tokio::test]
    async fn test_not_found_is_unhealthy() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let outcome = check(mock_server.uri() + "/missing", Duration::from_secs(5))
            .check(&ctx())
            .await;
        assert_eq!(outcome.status, CheckStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_run_with_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&mock_server)
            .await;

        let outcome = check(mock_server.uri(), Duration::from_millis(200))
            .check(&ctx())
            .await;

        assert_eq!(outcome.status, CheckStatus::Unhealthy);
        assert!(outcome
            .message
            .unwrap()
            .starts_with("Remote service unreachable"));
    }

    #[tokio::test]
    async fn test_context_deadline_bounds_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&mock_server)
            .await;

        let start = Instant::now();
        let outcome = check(mock_server.uri(), Duration::from_secs(30))
            .check(&CheckContext::with_timeout(Duration::from_millis(200)))
            .await;

        assert_eq!(outcome.status, CheckStatus::Unhealthy);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        // Nothing listens on the port once the listener is dropped.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let uri = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let outcome = check(uri, Duration::from_secs(1)).check(&ctx()).await;

        assert_eq!(outcome.status, CheckStatus::Unhealthy);
        assert!(outcome.metadata.is_empty());
    }
}
