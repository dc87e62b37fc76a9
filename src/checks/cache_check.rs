use crate::checks::{BoxError, CheckContext, Checker};
use crate::logging::Logger;
use crate::status::CheckOutcome;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

const EXPECTED_REPLY: &str = "PONG";

/// A keyed store answering `PING` with `PONG`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Round-trips a ping and returns the server reply.
    async fn ping(&self) -> Result<String, BoxError>;
    /// Fetches the server info section.
    async fn info(&self) -> Result<String, BoxError>;
}

pub struct CacheCheck {
    store: Arc<dyn KeyValueStore>,
    logger: Logger,
}

impl CacheCheck {
    pub fn new(store: Arc<dyn KeyValueStore>, logger: Logger) -> Self {
        Self {
            store,
            logger: logger.named("health::cache"),
        }
    }
}

#[async_trait]
impl Checker for CacheCheck {
    async fn check(&self, ctx: &CheckContext) -> CheckOutcome {
        let start = Instant::now();

        let result = match tokio::time::timeout_at(ctx.deadline(), self.store.ping()).await {
            Ok(result) => result,
            Err(_) => Err(BoxError::from("deadline exceeded")),
        };
        let duration = start.elapsed();

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                self.logger.for_request(ctx.request()).error(format_args!(
                    "Cache health check failed error={} duration={:?}",
                    e, duration
                ));
                return CheckOutcome::unhealthy(format!("Cache ping failed: {}", e), duration);
            }
        };

        if reply != EXPECTED_REPLY {
            return CheckOutcome::unhealthy(
                format!("Cache ping returned unexpected response: {}", reply),
                duration,
            );
        }

        let mut metadata = HashMap::from([("ping_response".to_string(), reply)]);
        if let Ok(Ok(_)) = tokio::time::timeout_at(ctx.deadline(), self.store.info()).await {
            metadata.insert("info_available".to_string(), "true".to_string());
        }

        CheckOutcome::healthy(duration)
            .with_message("Cache connection healthy")
            .with_metadata(metadata)
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl KeyValueStore for redis::Client {
    async fn ping(&self) -> Result<String, BoxError> {
        let mut connection = self.get_multiplexed_async_connection().await?;
        let reply: String = redis::cmd("PING").query_async(&mut connection).await?;
        Ok(reply)
    }

    async fn info(&self) -> Result<String, BoxError> {
        let mut connection = self.get_multiplexed_async_connection().await?;
        let info: String = redis::cmd("INFO").query_async(&mut connection).await?;
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::CheckStatus;
    use std::time::Duration;

    struct FakeStore {
        reply: Result<&'static str, &'static str>,
        info: bool,
    }

    #[async_trait]
    impl KeyValueStore for FakeStore {
        async fn ping(&self) -> Result<String, BoxError> {
            self.reply.map(str::to_string).map_err(|e| e.into())
        }

        async fn info(&self) -> Result<String, BoxError> {
            if self.info {
                Ok("redis_version:7.2.0".to_string())
            } else {
                Err("INFO is disabled".into())
            }
        }
    }

    async fn run(store: FakeStore) -> CheckOutcome {
        CacheCheck::new(Arc::new(store), Logger::detached())
            .check(&CheckContext::with_timeout(Duration::from_secs(1)))
            .await
    }

    #[tokio::test]
    async fn test_pong_is_healthy() {
        let outcome = run(FakeStore {
            reply: Ok("PONG"),
            info: true,
        })
        .await;

        assert_eq!(outcome.status, CheckStatus::Healthy);
        assert_eq!(outcome.metadata["ping_response"], "PONG");
        assert_eq!(outcome.metadata["info_available"], "true");
    }

    #[tokio::test]
    async fn test_info_is_optional() {
        let outcome = run(FakeStore {
            reply: Ok("PONG"),
            info: false,
        })
        .await;

        assert_eq!(outcome.status, CheckStatus::Healthy);
        assert!(!outcome.metadata.contains_key("info_available"));
    }

    #[tokio::test]
    async fn test_unexpected_reply() {
        let outcome = run(FakeStore {
            reply: Ok("LOADING"),
            info: true,
        })
        .await;

        assert_eq!(outcome.status, CheckStatus::Unhealthy);
        assert_eq!(
            outcome.message.as_deref(),
            Some("Cache ping returned unexpected response: LOADING")
        );
    }

    #[tokio::test]
    async fn test_unreachable_cache() {
        let outcome = run(FakeStore {
            reply: Err("connection refused"),
            info: true,
        })
        .await;

        assert_eq!(outcome.status, CheckStatus::Unhealthy);
        assert_eq!(
            outcome.message.as_deref(),
            Some("Cache ping failed: connection refused")
        );
    }
}
