//! Debounce-with-cancel: collapse bursts of work into one delayed execution.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A stateful timer wrapper with `schedule` and `cancel`.
///
/// `schedule` replaces any pending execution, so a burst of calls within the
/// quiet period runs the last scheduled future exactly once, after the quiet
/// period has elapsed with no further calls. Cancellation (by `cancel`,
/// re-`schedule`, or drop) covers only the quiet period: once it elapses the
/// run is committed and detached, and a later cancel never tears it down
/// mid-flight. Independent of any UI lifecycle.
pub struct Debouncer {
  quiet_period: Duration,
  pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
  pub fn new(quiet_period: Duration) -> Self {
    Self {
      quiet_period,
      pending: Mutex::new(None),
    }
  }

  pub fn quiet_period(&self) -> Duration {
    self.quiet_period
  }

  /// Schedule `fut` to run after the quiet period, cancelling any run still
  /// waiting out its quiet period.
  pub fn schedule<F>(&self, fut: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let quiet_period = self.quiet_period;
    let handle = tokio::spawn(async move {
      tokio::time::sleep(quiet_period).await;
      // Detached: aborting this handle must never kill work already past the
      // quiet period.
      tokio::spawn(fut);
    });

    let mut pending = self.lock_pending();
    if let Some(previous) = pending.replace(handle) {
      previous.abort();
    }
  }

  /// Cancel the pending execution, if any.
  pub fn cancel(&self) {
    if let Some(handle) = self.lock_pending().take() {
      handle.abort();
    }
  }

  fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
    self.pending.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl Drop for Debouncer {
  fn drop(&mut self) {
    self.cancel();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  #[tokio::test]
  async fn test_burst_collapses_to_one_run() {
    let debouncer = Debouncer::new(Duration::from_millis(30));
    let runs = Arc::new(AtomicU32::new(0));

    for _ in 0..5 {
      let runs = runs.clone();
      debouncer.schedule(async move {
        runs.fetch_add(1, Ordering::SeqCst);
      });
      tokio::time::sleep(Duration::from_millis(5)).await;
    }

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_cancel_prevents_run() {
    let debouncer = Debouncer::new(Duration::from_millis(20));
    let runs = Arc::new(AtomicU32::new(0));

    let counter = runs.clone();
    debouncer.schedule(async move {
      counter.fetch_add(1, Ordering::SeqCst);
    });
    debouncer.cancel();

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_cancel_after_quiet_period_lets_run_finish() {
    let debouncer = Debouncer::new(Duration::from_millis(10));
    let runs = Arc::new(AtomicU32::new(0));

    let counter = runs.clone();
    debouncer.schedule(async move {
      tokio::time::sleep(Duration::from_millis(40)).await;
      counter.fetch_add(1, Ordering::SeqCst);
    });

    // The quiet period has elapsed and the run is in flight; cancelling now
    // must not abort it.
    tokio::time::sleep(Duration::from_millis(25)).await;
    debouncer.cancel();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_separate_quiet_periods_run_separately() {
    let debouncer = Debouncer::new(Duration::from_millis(15));
    let runs = Arc::new(AtomicU32::new(0));

    for _ in 0..2 {
      let counter = runs.clone();
      debouncer.schedule(async move {
        counter.fetch_add(1, Ordering::SeqCst);
      });
      tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(runs.load(Ordering::SeqCst), 2);
  }
}
