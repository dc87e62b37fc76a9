use crate::checks::{CheckContext, Checker};
use crate::status::{CheckOutcome, CheckStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Instant;

/// What an embedding service reports about a dependency only it knows how to check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    pub healthy: bool,
    pub message: String,
    pub metadata: HashMap<String, String>,
}

impl ProbeReport {
    pub fn healthy(message: impl Into<String>) -> Self {
        ProbeReport {
            healthy: true,
            message: message.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        ProbeReport {
            healthy: false,
            message: message.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A predicate supplied by the embedding service.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, ctx: &CheckContext) -> ProbeReport;
}

#[async_trait]
impl<F> Probe for F
where
    F: Fn(&CheckContext) -> ProbeReport + Send + Sync,
{
    async fn probe(&self, ctx: &CheckContext) -> ProbeReport {
        self(ctx)
    }
}

/// Adapts a [`Probe`] into a [`Checker`], adding timing and deadline handling.
pub struct CustomCheck<P> {
    probe: P,
}

impl<P: Probe> CustomCheck<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl<P: Probe> Checker for CustomCheck<P> {
    async fn check(&self, ctx: &CheckContext) -> CheckOutcome {
        let start = Instant::now();

        let result = tokio::time::timeout_at(ctx.deadline(), self.probe.probe(ctx)).await;
        let duration = start.elapsed();

        let Ok(report) = result else {
            return CheckOutcome::unhealthy(format!("timed out after {:?}", duration), duration);
        };
        let status = if report.healthy {
            CheckStatus::Healthy
        } else {
            CheckStatus::Unhealthy
        };
        let outcome = CheckOutcome::new(status, duration).with_metadata(report.metadata);
        if report.message.is_empty() {
            outcome
        } else {
            outcome.with_message(report.message)
        }
    }
}
