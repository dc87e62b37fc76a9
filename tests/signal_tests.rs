//! Delivers real signals to the test process. Kept in its own test binary so the signal
//! handlers it installs cannot interfere with other tests.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use resilience_core::logging::Logger;
use resilience_core::shutdown::{hook_fn, OsSignals, ShutdownManager, TerminationSource};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Sends `signal` to this process.
fn raise(signal: Signal) {
    let pid = Pid::from_raw(std::process::id() as i32);
    kill(pid, signal).expect("The signal should be sent.");
}

#[tokio::test]
#[serial]
async fn test_os_signals_report_sigterm() {
    let mut signals = OsSignals::new().expect("Signal handlers should be installed.");

    raise(Signal::SIGTERM);

    let reason = tokio::time::timeout(Duration::from_secs(5), signals.wait())
        .await
        .expect("The signal should be received.")
        .unwrap();
    assert_eq!(reason, "SIGTERM");
}

#[tokio::test]
#[serial]
async fn test_listen_runs_hooks_on_sigint() {
    let manager = ShutdownManager::new(Duration::from_secs(5), Logger::detached());
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    manager
        .add_hook(hook_fn("count", move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
        .unwrap();

    let signals = OsSignals::new().expect("Signal handlers should be installed.");
    raise(Signal::SIGINT);

    let summary = tokio::time::timeout(Duration::from_secs(5), manager.listen_with(signals))
        .await
        .expect("The shutdown sequence should run.")
        .unwrap()
        .expect("The first trigger runs the sequence.");

    assert!(summary.is_clean());
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // A later signal is a no-op.
    let signals = OsSignals::new().unwrap();
    raise(Signal::SIGINT);
    let again = manager.listen_with(signals).await.unwrap();
    assert!(again.is_none());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}
