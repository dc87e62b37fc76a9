//! Orderly teardown of a service.
//!
//! Hooks are registered while the service runs and executed once, sequentially and in
//! reverse registration order, when a termination signal arrives or [`ShutdownManager::shutdown`]
//! is called. All hooks share a single deadline derived from the configured timeout.

mod signals;

pub use signals::{ManualTrigger, OsSignals, TerminationSource};

use crate::logging::Logger;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Error, Debug, PartialEq)]
pub enum ShutdownError {
    #[error("shutdown already started")]
    AlreadyStarted,
}

#[derive(Error, Debug)]
pub enum HookError {
    #[error("{0}")]
    Failed(String),
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl HookError {
    pub fn failed(error: impl fmt::Display) -> Self {
        HookError::Failed(error.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Idle,
    ShuttingDown,
    Done,
}

/// The deadline shared by every hook of one shutdown sequence.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownContext {
    deadline: Instant,
}

impl ShutdownContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        ShutdownContext {
            deadline: Instant::now() + timeout,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// A cleanup action run during teardown.
#[async_trait]
pub trait ShutdownHook: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, ctx: &ShutdownContext) -> Result<(), HookError>;
}

/// A hook backed by an async closure. See [`hook_fn`].
pub struct FnHook<F> {
    name: String,
    f: F,
}

/// Wraps an async closure as a named [`ShutdownHook`].
pub fn hook_fn<F, Fut>(name: impl Into<String>, f: F) -> FnHook<F>
where
    F: Fn(ShutdownContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HookError>> + Send + 'static,
{
    FnHook {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F, Fut> ShutdownHook for FnHook<F>
where
    F: Fn(ShutdownContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HookError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &ShutdownContext) -> Result<(), HookError> {
        (self.f)(*ctx).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    Completed,
    Failed(String),
    /// Not started because the shared deadline had already passed.
    Skipped,
}

/// What happened to each hook, in execution order.
#[derive(Debug, Clone)]
pub struct ShutdownSummary {
    pub hooks: Vec<(String, HookOutcome)>,
    pub elapsed: Duration,
}

impl ShutdownSummary {
    pub fn is_clean(&self) -> bool {
        self.hooks
            .iter()
            .all(|(_, outcome)| *outcome == HookOutcome::Completed)
    }

    pub fn executed(&self) -> Vec<&str> {
        self.hooks
            .iter()
            .filter(|(_, outcome)| *outcome != HookOutcome::Skipped)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

pub struct ShutdownManager {
    hooks: Mutex<Vec<Arc<dyn ShutdownHook>>>,
    timeout: Duration,
    started: AtomicBool,
    phase: watch::Sender<ShutdownPhase>,
    logger: Logger,
}

impl ShutdownManager {
    pub fn new(timeout: Duration, logger: Logger) -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Idle);
        ShutdownManager {
            hooks: Mutex::new(Vec::new()),
            timeout,
            started: AtomicBool::new(false),
            phase,
            logger: logger.named("shutdown"),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    /// Appends a hook. Hooks run last-registered first.
    pub fn add_hook(&self, hook: impl ShutdownHook + 'static) -> Result<(), ShutdownError> {
        let mut hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
        // Checked under the lock, so a hook is either rejected or seen by the sequence.
        if self.started.load(Ordering::SeqCst) {
            return Err(ShutdownError::AlreadyStarted);
        }
        self.logger
            .debug(format_args!("Registered shutdown hook {}", hook.name()));
        hooks.push(Arc::new(hook));
        Ok(())
    }

    /// Runs the shutdown sequence.
    ///
    /// Only the first call runs the hooks and returns a summary. Every later or
    /// concurrent call returns `None` straight away.
    pub async fn shutdown(&self) -> Option<ShutdownSummary> {
        if self.started.swap(true, Ordering::SeqCst) {
            self.logger.debug("Shutdown already in progress");
            return None;
        }
        self.phase.send_replace(ShutdownPhase::ShuttingDown);

        let start = Instant::now();
        let ctx = ShutdownContext::with_timeout(self.timeout);
        let hooks = self
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        self.logger.info(format_args!(
            "Initiating graceful shutdown hooks_count={} timeout={:?}",
            hooks.len(),
            self.timeout
        ));

        let mut outcomes = Vec::with_capacity(hooks.len());
        for (index, hook) in hooks.iter().enumerate().rev() {
            let name = hook.name().to_string();
            if ctx.is_expired() {
                self.logger.warn(format_args!(
                    "Shutdown hook skipped index={} hook={} reason=deadline exceeded",
                    index, name
                ));
                outcomes.push((name, HookOutcome::Skipped));
                continue;
            }

            let result = match tokio::time::timeout_at(ctx.deadline(), hook.run(&ctx)).await {
                Ok(result) => result,
                Err(_) => Err(HookError::DeadlineExceeded),
            };
            let outcome = match result {
                Ok(()) => HookOutcome::Completed,
                Err(e) => {
                    self.logger.error(format_args!(
                        "Shutdown hook failed index={} hook={} error={}",
                        index, name, e
                    ));
                    HookOutcome::Failed(e.to_string())
                }
            };
            outcomes.push((name, outcome));
        }

        let summary = ShutdownSummary {
            hooks: outcomes,
            elapsed: start.elapsed(),
        };
        self.logger.info(format_args!(
            "Graceful shutdown completed duration={:?} clean={}",
            summary.elapsed,
            summary.is_clean()
        ));
        self.phase.send_replace(ShutdownPhase::Done);

        Some(summary)
    }

    /// Resolves once a shutdown sequence has finished.
    pub async fn wait_done(&self) {
        let mut phase = self.phase.subscribe();
        // The sender lives as long as `self`, so this cannot fail while we borrow it.
        let _ = phase.wait_for(|phase| *phase == ShutdownPhase::Done).await;
    }

    /// Waits for SIGINT or SIGTERM, then runs the shutdown sequence.
    pub async fn listen(&self) -> io::Result<Option<ShutdownSummary>> {
        let source = OsSignals::new()?;
        self.listen_with(source).await
    }

    /// Waits for `source` to request termination, then runs the shutdown sequence.
    ///
    /// Always returns after the sequence is done. When another trigger already started
    /// it, this waits for that run to finish and returns `None`.
    pub async fn listen_with<S: TerminationSource>(
        &self,
        mut source: S,
    ) -> io::Result<Option<ShutdownSummary>> {
        let reason = source.wait().await?;
        self.logger
            .info(format_args!("Received shutdown signal signal={}", reason));
        let summary = self.shutdown().await;
        if summary.is_none() {
            self.wait_done().await;
        }
        Ok(summary)
    }

    /// Like [`listen`](Self::listen), then exits the process.
    pub async fn wait_for_shutdown(&self) {
        match OsSignals::new() {
            Ok(source) => self.wait_for_shutdown_with(source).await,
            Err(e) => self.exit_on_listen_error(e),
        }
    }

    /// Like [`listen_with`](Self::listen_with), then exits the process with status 0.
    pub async fn wait_for_shutdown_with<S: TerminationSource>(&self, source: S) {
        match self.listen_with(source).await {
            Ok(_) => {
                self.logger.flush();
                std::process::exit(0);
            }
            Err(e) => self.exit_on_listen_error(e),
        }
    }

    fn exit_on_listen_error(&self, error: io::Error) -> ! {
        self.logger.error(format_args!(
            "Failed to listen for shutdown signals: {}",
            error
        ));
        self.logger.flush();
        std::process::exit(1);
    }
}
