use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::sync::Notify;

/// Something that eventually asks the process to terminate.
#[async_trait]
pub trait TerminationSource: Send {
    /// Resolves with a short description of what requested termination.
    async fn wait(&mut self) -> io::Result<String>;
}

/// Process termination signals: SIGINT and SIGTERM on unix, Ctrl+C elsewhere.
///
/// The handlers are installed by [`OsSignals::new`], so a signal delivered after
/// construction is never lost, even if nobody is waiting yet.
#[cfg(unix)]
pub struct OsSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    pub fn new() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(OsSignals {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }
}

#[cfg(unix)]
#[async_trait]
impl TerminationSource for OsSignals {
    async fn wait(&mut self) -> io::Result<String> {
        let name = tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        };
        Ok(name.to_string())
    }
}

#[cfg(not(unix))]
pub struct OsSignals {
    _private: (),
}

#[cfg(not(unix))]
impl OsSignals {
    pub fn new() -> io::Result<Self> {
        Ok(OsSignals { _private: () })
    }
}

#[cfg(not(unix))]
#[async_trait]
impl TerminationSource for OsSignals {
    async fn wait(&mut self) -> io::Result<String> {
        tokio::signal::ctrl_c().await?;
        Ok("ctrl-c".to_string())
    }
}

/// Programmatic trigger. Clones share the same trigger.
#[derive(Clone, Default)]
pub struct ManualTrigger {
    notify: Arc<Notify>,
}

impl ManualTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests termination. A request made before anyone waits is kept.
    pub fn trigger(&self) {
        self.notify.notify_one();
    }
}

#[async_trait]
impl TerminationSource for ManualTrigger {
    async fn wait(&mut self) -> io::Result<String> {
        self.notify.notified().await;
        Ok("manual".to_string())
    }
}
