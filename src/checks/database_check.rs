use crate::checks::{BoxError, CheckContext, Checker};
use crate::logging::Logger;
use crate::status::CheckOutcome;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Occupancy of a connection pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub open: u32,
    pub idle: u32,
    pub in_use: u32,
}

/// A pooled database connection that can be pinged.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    async fn ping(&self) -> Result<(), BoxError>;
    fn stats(&self) -> PoolStats;
}

pub struct DatabaseCheck {
    pool: Arc<dyn ConnectionPool>,
    logger: Logger,
}

impl DatabaseCheck {
    pub fn new(pool: Arc<dyn ConnectionPool>, logger: Logger) -> Self {
        Self {
            pool,
            logger: logger.named("health::database"),
        }
    }
}

#[async_trait]
impl Checker for DatabaseCheck {
    async fn check(&self, ctx: &CheckContext) -> CheckOutcome {
        let start = Instant::now();

        let result = match tokio::time::timeout_at(ctx.deadline(), self.pool.ping()).await {
            Ok(result) => result,
            Err(_) => Err(BoxError::from("deadline exceeded")),
        };
        let duration = start.elapsed();

        if let Err(e) = result {
            self.logger.for_request(ctx.request()).error(format_args!(
                "Database health check failed error={} duration={:?}",
                e, duration
            ));
            return CheckOutcome::unhealthy(format!("Database ping failed: {}", e), duration);
        }

        let stats = self.pool.stats();
        let metadata = HashMap::from([
            ("open_connections".to_string(), stats.open.to_string()),
            ("idle".to_string(), stats.idle.to_string()),
            ("in_use".to_string(), stats.in_use.to_string()),
        ]);

        CheckOutcome::healthy(duration)
            .with_message("Database connection healthy")
            .with_metadata(metadata)
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl ConnectionPool for sqlx::PgPool {
    async fn ping(&self) -> Result<(), BoxError> {
        use sqlx::Connection;

        let mut connection = self.acquire().await?;
        connection.ping().await?;
        Ok(())
    }

    fn stats(&self) -> PoolStats {
        let open = self.size();
        let idle = u32::try_from(self.num_idle()).unwrap_or(u32::MAX);
        PoolStats {
            open,
            idle,
            in_use: open.saturating_sub(idle),
        }
    }
}
