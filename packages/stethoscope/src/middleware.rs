//! Pipeline stages.
//!
//! A [`Middleware`] sits between a caller's `dispatch` and the reducer. Each
//! stage receives the dispatched value and a [`Next`] continuation, and must
//! hand back a [`Dispatched`] result, normally the one `next` returned.
//!
//! # Execution Order
//!
//! ```text
//! dispatch
//!  → stage 0 (e.g. ThunkMiddleware)
//!  → stage 1 (e.g. LoggerMiddleware)
//!  → DispatchInterceptor   ← always innermost
//!  → reducer + subscribers
//! ```
//!
//! # Example
//!
//! ```ignore
//! use stethoscope::{Dispatchable, Dispatched, Middleware, Next, Store};
//!
//! struct CountingMiddleware(AtomicUsize);
//!
//! impl<S, A> Middleware<S, A> for CountingMiddleware
//! where
//!     S: Clone + Send + Sync + 'static,
//!     A: Action,
//! {
//!     fn handle(&self, _store: &Store<S, A>, action: Dispatchable<S, A>, next: Next<'_, S, A>) -> Dispatched<A> {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!         next.run(action)
//!     }
//! }
//! ```

use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, trace, warn};

use crate::action::Action;
use crate::error::StoreError;
use crate::store::{Dispatchable, Dispatched, Store, ThunkHandle};

// =============================================================================
// Middleware Trait
// =============================================================================

/// A stage of the dispatch pipeline.
///
/// Stages are called synchronously and may call `next` at most once.
/// Whatever `next` returns should be passed back unchanged unless the stage
/// deliberately handles the value itself (as [`ThunkMiddleware`] does).
pub trait Middleware<S, A>: Send + Sync + 'static {
    /// Handle one dispatched value.
    fn handle(
        &self,
        store: &Store<S, A>,
        action: Dispatchable<S, A>,
        next: Next<'_, S, A>,
    ) -> Dispatched<A>;
}

/// Continuation into the rest of the pipeline.
pub struct Next<'a, S, A> {
    store: &'a Store<S, A>,
    index: usize,
}

impl<'a, S, A> Next<'a, S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Action,
{
    pub(crate) fn new(store: &'a Store<S, A>, index: usize) -> Self {
        Self { store, index }
    }

    /// Pass a value to the following stage (or the reducer).
    pub fn run(self, action: Dispatchable<S, A>) -> Dispatched<A> {
        self.store.dispatch_from(self.index, action)
    }

    /// Pass a plain action to the following stage.
    pub fn run_action(self, action: A) -> Dispatched<A> {
        self.run(Dispatchable::Action(action))
    }
}

// =============================================================================
// Thunk Middleware
// =============================================================================

/// Runs [`Dispatchable::Thunk`] values instead of forwarding them.
///
/// The thunk's future is polled once inline, so everything it does before its
/// first real suspension (typically dispatching a "request" action) happens
/// inside the caller's `dispatch` call. The remainder is spawned on the
/// current tokio runtime and exposed as a [`ThunkHandle`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThunkMiddleware;

impl<S, A> Middleware<S, A> for ThunkMiddleware
where
    S: Clone + Send + Sync + 'static,
    A: Action,
{
    fn handle(
        &self,
        store: &Store<S, A>,
        action: Dispatchable<S, A>,
        next: Next<'_, S, A>,
    ) -> Dispatched<A> {
        let thunk = match action {
            Dispatchable::Thunk(thunk) => thunk,
            action => return next.run(action),
        };

        let mut fut = thunk(store.clone());
        if let Some(result) = (&mut fut).now_or_never() {
            trace!("thunk completed synchronously");
            return Dispatched::Thunk(ThunkHandle::ready(result));
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Dispatched::Thunk(ThunkHandle::running(runtime.spawn(fut))),
            Err(_) => {
                warn!("thunk suspended outside of a tokio runtime; dropping it");
                Dispatched::Thunk(ThunkHandle::ready(Err(StoreError::NoRuntime.into())))
            }
        }
    }
}

// =============================================================================
// Logger Middleware
// =============================================================================

/// Logs every plain action with the time its downstream dispatch took.
#[derive(Debug, Clone)]
pub struct LoggerMiddleware {
    name: &'static str,
}

impl LoggerMiddleware {
    /// Create a logger tagged with `name`.
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl Default for LoggerMiddleware {
    fn default() -> Self {
        Self::new("store")
    }
}

impl<S, A> Middleware<S, A> for LoggerMiddleware
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
        let Some(action_type) = action.action_type().map(str::to_owned) else {
            trace!(store = self.name, "dispatching thunk");
            return next.run(action);
        };

        let started = Instant::now();
        let result = next.run(action);
        debug!(
            store = self.name,
            action_type = %action_type,
            elapsed_us = started.elapsed().as_micros() as u64,
            "action dispatched"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::action::AnyAction;

    struct OrderProbe {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware<Vec<String>, AnyAction> for OrderProbe {
        fn handle(
            &self,
            _store: &Store<Vec<String>, AnyAction>,
            action: Dispatchable<Vec<String>, AnyAction>,
            next: Next<'_, Vec<String>, AnyAction>,
        ) -> Dispatched<AnyAction> {
            self.log.lock().unwrap().push(format!("{} in", self.label));
            let result = next.run(action);
            self.log.lock().unwrap().push(format!("{} out", self.label));
            result
        }
    }

    fn record(state: &Vec<String>, action: &AnyAction) -> Vec<String> {
        let mut next = state.clone();
        next.push(action.action_type().to_string());
        next
    }

    #[test]
    fn test_stages_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let store = Store::builder(Vec::new(), record)
            .with_middleware(OrderProbe {
                label: "a",
                log: log.clone(),
            })
            .with_middleware(OrderProbe {
                label: "b",
                log: log.clone(),
            })
            .build();

        store.dispatch_action(AnyAction::new("ping"));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a in", "b in", "b out", "a out"]
        );
        assert_eq!(store.state(), vec!["ping".to_string()]);
    }

    #[test]
    fn test_logger_passes_result_through() {
        let store = Store::builder(Vec::new(), record)
            .with_middleware(LoggerMiddleware::new("test"))
            .build();

        let result = store.dispatch_action(AnyAction::new("ping"));
        assert_eq!(result.into_action().unwrap().action_type(), "ping");
    }

    #[tokio::test]
    async fn test_thunk_dispatches_through_full_pipeline() {
        let count = Arc::new(AtomicUsize::new(0));

        struct Counting(Arc<AtomicUsize>);
        impl Middleware<Vec<String>, AnyAction> for Counting {
            fn handle(
                &self,
                _store: &Store<Vec<String>, AnyAction>,
                action: Dispatchable<Vec<String>, AnyAction>,
                next: Next<'_, Vec<String>, AnyAction>,
            ) -> Dispatched<AnyAction> {
                if action.action_type().is_some() {
                    self.0.fetch_add(1, Ordering::Relaxed);
                }
                next.run(action)
            }
        }

        let store = Store::builder(Vec::new(), record)
            .with_middleware(ThunkMiddleware)
            .with_middleware(Counting(count.clone()))
            .build();

        store
            .dispatch_thunk(|store| async move {
                store.dispatch_action(AnyAction::new("first"));
                tokio::task::yield_now().await;
                store.dispatch_action(AnyAction::new("second"));
                Ok(())
            })
            .wait()
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::Relaxed), 2);
        assert_eq!(store.state(), vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_synchronous_thunk_completes_without_runtime() {
        let store = Store::builder(Vec::new(), record)
            .with_middleware(ThunkMiddleware)
            .build();

        let result = store.dispatch_thunk(|store| async move {
            store.dispatch_action(AnyAction::new("inline"));
            Ok(())
        });

        match result {
            Dispatched::Thunk(handle) => assert!(handle.is_finished()),
            Dispatched::Action(_) => panic!("expected a thunk handle"),
        }
        assert_eq!(store.state(), vec!["inline".to_string()]);
    }
}
