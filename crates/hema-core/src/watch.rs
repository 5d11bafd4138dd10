//! Subscription handles and live record watches.
//!
//! Backends hand out [`RecordWatch`] bundles: a `tokio::sync::watch`
//! receiver carrying the latest record value, plus a [`Subscription`]
//! guard that tears the server-side registration down. Guards must be
//! cancelled exactly once; calling [`Subscription::cancel`] on an
//! already-cancelled guard is a no-op, so a view teardown that runs after
//! an error path has already cancelled is harmless.

use std::fmt;

use tokio::sync::watch;

// ─── Subscription ────────────────────────────────────────────────────────────

/// An idempotent cancel handle. Dropping the guard cancels it.
pub struct Subscription {
  teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
  pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
    Self { teardown: Some(Box::new(teardown)) }
  }

  /// A guard with nothing to tear down.
  pub fn noop() -> Self {
    Self { teardown: None }
  }

  /// Run the teardown. Safe to call any number of times.
  pub fn cancel(&mut self) {
    if let Some(teardown) = self.teardown.take() {
      teardown();
    }
  }

  pub fn is_cancelled(&self) -> bool {
    self.teardown.is_none()
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.cancel();
  }
}

impl fmt::Debug for Subscription {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Subscription")
      .field("cancelled", &self.is_cancelled())
      .finish()
  }
}

// ─── RecordWatch ─────────────────────────────────────────────────────────────

/// A live watch over one record (or the auth state).
///
/// The receiver always holds the latest value; `None` means the record is
/// absent (or no identity is signed in).
#[derive(Debug)]
pub struct RecordWatch<T> {
  pub rx:    watch::Receiver<Option<T>>,
  pub guard: Subscription,
}

impl<T: Clone> RecordWatch<T> {
  /// Snapshot of the latest value.
  pub fn current(&self) -> Option<T> {
    self.rx.borrow().clone()
  }

  /// Wait for the next change. Returns `false` once the sender is gone.
  pub async fn changed(&mut self) -> bool {
    self.rx.changed().await.is_ok()
  }

  pub fn cancel(&mut self) {
    self.guard.cancel();
  }
}
