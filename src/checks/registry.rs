use crate::checks::{CheckContext, Checker};
use crate::logging::Logger;
use crate::status::{AggregateReport, CheckOutcome};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("checker name must not be empty")]
    EmptyName,
}

/// Named checkers of a service, executed together on every health pass.
///
/// Cloning is cheap and every clone shares the same set of checkers.
#[derive(Clone)]
pub struct HealthRegistry {
    service: Arc<str>,
    version: Arc<str>,
    started: Instant,
    checkers: Arc<RwLock<BTreeMap<String, Arc<dyn Checker>>>>,
    logger: Logger,
}

impl HealthRegistry {
    pub fn new(service: &str, version: &str, logger: Logger) -> Self {
        Self {
            service: Arc::from(service),
            version: Arc::from(version),
            started: Instant::now(),
            checkers: Arc::new(RwLock::new(BTreeMap::new())),
            logger: logger.named("health"),
        }
    }

    /// Registers `checker` under `name`, replacing any checker with the same name.
    pub fn register(
        &self,
        name: impl Into<String>,
        checker: impl Checker + 'static,
    ) -> Result<(), RegistryError> {
        self.register_arc(name, Arc::new(checker))
    }

    pub fn register_arc(
        &self,
        name: impl Into<String>,
        checker: Arc<dyn Checker>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        self.logger.debug(format_args!("Registering checker {}", name));
        self.checkers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, checker);
        Ok(())
    }

    /// Removes the checker registered under `name`, if any.
    pub fn unregister(&self, name: &str) {
        if self
            .checkers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
        {
            self.logger.debug(format_args!("Unregistered checker {}", name));
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|(name, _)| name).collect()
    }

    pub fn len(&self) -> usize {
        self.checkers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Copies the current checkers so a pass never holds the lock while checks run.
    fn snapshot(&self) -> Vec<(String, Arc<dyn Checker>)> {
        self.checkers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, checker)| (name.clone(), Arc::clone(checker)))
            .collect()
    }

    /// Runs every registered checker concurrently and waits for all of them.
    ///
    /// The set of checkers is fixed when the pass starts. A checker that ignores the
    /// deadline in `ctx` stalls the whole pass.
    pub async fn run_all(&self, ctx: &CheckContext) -> AggregateReport {
        let start = Instant::now();
        let logger = self.logger.for_request(ctx.request());

        let handles: Vec<_> = self
            .snapshot()
            .into_iter()
            .map(|(name, checker)| {
                let ctx = ctx.clone();
                let handle = tokio::spawn(async move { checker.check(&ctx).await });
                (name, handle)
            })
            .collect();

        let mut checks = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome.named(name),
                Err(e) => {
                    logger.error(format_args!("Checker {} did not complete: {}", name, e));
                    let message = format!("check did not complete: {}", e);
                    CheckOutcome::unhealthy(message, Duration::ZERO).named(name)
                }
            };
            checks.push(outcome);
        }

        let report = AggregateReport::new(&self.service, &self.version, self.uptime(), checks);

        logger.info(format_args!(
            "Health check completed overall_status={} duration={:?} checks_count={}",
            report.status,
            start.elapsed(),
            report.checks.len()
        ));

        report
    }
}
