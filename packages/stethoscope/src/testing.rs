//! Testing utilities for stores wired to a watcher.
//!
//! # Feature Flag
//!
//! This module is only available with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! stethoscope = { path = "../stethoscope", features = ["testing"] }
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use stethoscope::testing::{init_test_tracing, DispatchRecorder};
//!
//! init_test_tracing();
//!
//! let recorder = DispatchRecorder::new();
//! let store = Store::builder(state, reducer)
//!     .with_middleware(recorder.clone())
//!     .with_interceptor(watcher.interceptor())
//!     .build();
//!
//! store.dispatch_action(action);
//! assert!(recorder.was_dispatched("[inbox] request messages"));
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once};

use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::action::Action;
use crate::middleware::{Middleware, Next};
use crate::store::{Dispatchable, Dispatched, Store};

// =============================================================================
// Tracing
// =============================================================================

static TRACING: Once = Once::new();

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `stethoscope=debug`. Output goes through
/// the test writer so it is captured unless `--nocapture` is passed.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stethoscope=debug"));
        // Another subscriber may already be installed by the host test suite.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

// =============================================================================
// Dispatch Recorder
// =============================================================================

/// Spy middleware that records the identifier of every plain action that
/// passes through it.
///
/// The recorder never alters the pipeline: each value is forwarded unchanged.
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct DispatchRecorder {
    dispatched: Arc<Mutex<Vec<String>>>,
}

impl DispatchRecorder {
    /// Create a new empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, Vec<String>> {
        self.dispatched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check if an action with the given identifier was dispatched.
    pub fn was_dispatched(&self, action_type: &str) -> bool {
        self.log().iter().any(|t| t == action_type)
    }

    /// Number of dispatches of the given identifier.
    pub fn count_of(&self, action_type: &str) -> usize {
        self.log().iter().filter(|t| *t == action_type).count()
    }

    /// All recorded identifiers in dispatch order.
    pub fn all(&self) -> Vec<String> {
        self.log().clone()
    }

    /// Total number of recorded dispatches.
    pub fn len(&self) -> usize {
        self.log().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.log().is_empty()
    }

    /// Clear all recorded dispatches.
    pub fn clear(&self) {
        self.log().clear();
    }
}

impl<S, A> Middleware<S, A> for DispatchRecorder
where
    S: Clone + Send + Sync + 'static,
    A: Action,
{
    fn handle(
        &self,
        _store: &Store<S, A>,
        action: Dispatchable<S, A>,
        next: Next<'_, S, A>,
    ) -> Dispatched<A> {
        if let Some(action_type) = action.action_type() {
            self.log().push(action_type.to_owned());
        }
        next.run(action)
    }
}

// =============================================================================
// Dispatch Latch
// =============================================================================

/// Counts down as actions are observed and lets a test wait for zero.
///
/// Unlike a watch session, a latch has no timeout and no targets; it is meant
/// for background traffic generators in tests.
///
/// ```ignore
/// let latch = DispatchLatch::shared(3);
/// store.subscribe({
///     let latch = latch.clone();
///     move |_| latch.dec()
/// });
/// ```
#[derive(Debug)]
pub struct DispatchLatch {
    remaining: AtomicUsize,
    notify: Notify,
}

impl DispatchLatch {
    /// Create a latch expecting `expected` decrements.
    pub fn new(expected: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(expected),
            notify: Notify::new(),
        }
    }

    /// Create an `Arc`-wrapped latch for sharing across closures.
    pub fn shared(expected: usize) -> Arc<Self> {
        Arc::new(Self::new(expected))
    }

    /// Decrement the remaining count. Extra decrements are ignored.
    pub fn dec(&self) {
        let prev = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if prev == Ok(1) {
            self.notify.notify_waiters();
        }
    }

    /// Wait for the count to reach zero.
    pub async fn await_zero(&self) {
        loop {
            // Register before checking
            let notified = self.notify.notified();
            if self.remaining.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// The current remaining count.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::AnyAction;
    use std::time::Duration;

    fn count(state: &usize, _: &AnyAction) -> usize {
        state + 1
    }

    #[test]
    fn test_recorder_records_in_order() {
        let recorder = DispatchRecorder::new();
        let store = Store::builder(0usize, count)
            .with_middleware(recorder.clone())
            .build();

        store.dispatch_action(AnyAction::new("a"));
        store.dispatch_action(AnyAction::new("b"));
        store.dispatch_action(AnyAction::new("a"));

        assert_eq!(recorder.all(), vec!["a", "b", "a"]);
        assert_eq!(recorder.count_of("a"), 2);
        assert!(recorder.was_dispatched("b"));
        assert!(!recorder.was_dispatched("c"));
        assert_eq!(store.state(), 3);

        recorder.clear();
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_latch_releases_waiter() {
        let latch = DispatchLatch::shared(2);
        let waiter = tokio::spawn({
            let latch = latch.clone();
            async move { latch.await_zero().await }
        });

        latch.dec();
        assert_eq!(latch.remaining(), 1);
        latch.dec();
        latch.dec();
        assert_eq!(latch.remaining(), 0);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("latch did not release")
            .unwrap();
    }

    #[test]
    fn test_init_test_tracing_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
    }
}
