mod cache_check;
mod custom_check;
mod database_check;
mod registry;
mod url_check;

pub use cache_check::{CacheCheck, KeyValueStore};
pub use custom_check::{CustomCheck, Probe, ProbeReport};
pub use database_check::{ConnectionPool, DatabaseCheck, PoolStats};
pub use registry::{HealthRegistry, RegistryError};
pub use url_check::UrlCheck;

use crate::middleware::RequestContext;
use crate::status::CheckOutcome;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Error type returned by the driver capabilities the checkers wrap.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A pluggable unit that evaluates the health of one dependency on demand.
///
/// Implementations must not fail: every fault is reported as an unhealthy
/// [`CheckOutcome`]. They are expected to honor the deadline carried by the context; the
/// registry does not cancel a checker that ignores it.
#[async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, ctx: &CheckContext) -> CheckOutcome;
}

/// Deadline-bearing execution context handed to every checker of a pass.
#[derive(Debug, Clone)]
pub struct CheckContext {
    deadline: Instant,
    request: Option<RequestContext>,
}

impl CheckContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        CheckContext {
            deadline,
            request: None,
        }
    }

    pub fn for_request(mut self, request: Option<RequestContext>) -> Self {
        self.request = request;
        self
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn request(&self) -> Option<&RequestContext> {
        self.request.as_ref()
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}
