//! Targets and session requests.
//!
//! A [`Target`] names an action identifier a session waits for, plus an
//! optional callback that runs once the matching action has settled.
//! A [`ListenInfo`] bundles the triggering operation with its targets and
//! timeout.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;

/// Type-erased match callback.
///
/// Synchronous callbacks are wrapped in a ready future, so the watcher only
/// has one shape to drive.
pub type MatchCallback = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// An action identifier a session is waiting to observe.
///
/// # Example
///
/// ```ignore
/// use stethoscope::Target;
///
/// let target = Target::new("[inbox] receive messages").on_matched({
///     let view = view.clone();
///     move || {
///         anyhow::ensure!(view.contains("Hello, World"));
///         Ok(())
///     }
/// });
/// ```
pub struct Target {
    pub(crate) action_type: String,
    pub(crate) on_matched: Option<MatchCallback>,
}

impl Target {
    /// Wait for `action_type` without running anything when it matches.
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            on_matched: None,
        }
    }

    /// Run a synchronous callback once the matching action has settled.
    pub fn on_matched<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.on_matched = Some(Box::new(move || futures::future::ready(callback()).boxed()));
        self
    }

    /// Run an asynchronous callback once the matching action has settled.
    ///
    /// The target only counts as done when the returned future completes.
    pub fn on_matched_async<F, Fut>(mut self, callback: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_matched = Some(Box::new(move || callback().boxed()));
        self
    }

    /// The identifier this target waits for.
    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    /// Whether a callback is attached.
    pub fn has_callback(&self) -> bool {
        self.on_matched.is_some()
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("action_type", &self.action_type)
            .field("has_callback", &self.has_callback())
            .finish()
    }
}

/// One watch session request: a triggering operation, the targets it is
/// expected to produce and an optional timeout.
///
/// The triggering operation is an async closure. A purely synchronous trigger
/// is written as `|| async { store.dispatch_action(a); Ok(()) }`; its body runs
/// entirely inside the triggering phase.
pub struct ListenInfo<F> {
    /// The triggering operation.
    pub act: F,
    /// Targets to wait for, in registration order.
    pub targets: Vec<Target>,
    /// Session budget; the watcher default when `None`.
    pub timeout: Option<Duration>,
}

impl<F> ListenInfo<F> {
    /// Start a request around a triggering operation.
    pub fn new(act: F) -> Self {
        Self {
            act,
            targets: Vec::new(),
            timeout: None,
        }
    }

    /// Append one target.
    pub fn target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    /// Append several targets, keeping their order.
    pub fn targets(mut self, targets: impl IntoIterator<Item = Target>) -> Self {
        self.targets.extend(targets);
        self
    }

    /// Override the watcher's default timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<F> fmt::Debug for ListenInfo<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenInfo")
            .field("targets", &self.targets)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_target_without_callback() {
        let target = Target::new("ping");
        assert_eq!(target.action_type(), "ping");
        assert!(!target.has_callback());
    }

    #[test]
    fn test_sync_callback_is_ready_immediately() {
        let count = Arc::new(AtomicUsize::new(0));
        let target = Target::new("ping").on_matched({
            let count = count.clone();
            move || {
                count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        });
        assert!(target.has_callback());

        let callback = target.on_matched.unwrap();
        let result = callback().now_or_never();
        assert!(matches!(result, Some(Ok(()))));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_async_callback_runs_when_awaited() {
        let count = Arc::new(AtomicUsize::new(0));
        let target = Target::new("pong").on_matched_async({
            let count = count.clone();
            move || async move {
                tokio::task::yield_now().await;
                count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        });

        let callback = target.on_matched.unwrap();
        callback().await.unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_listen_info_builder_keeps_order() {
        let info = ListenInfo::new(|| async { Ok::<(), anyhow::Error>(()) })
            .target(Target::new("a"))
            .targets([Target::new("b"), Target::new("c")])
            .with_timeout(Duration::from_millis(200));

        let types: Vec<&str> = info.targets.iter().map(|t| t.action_type()).collect();
        assert_eq!(types, vec!["a", "b", "c"]);
        assert_eq!(info.timeout, Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_debug_impls() {
        let info = ListenInfo::new(()).target(Target::new("a").on_matched(|| Ok(())));
        let debug_str = format!("{:?}", info);
        assert!(debug_str.contains("ListenInfo"));
        assert!(debug_str.contains("has_callback: true"));
    }
}
