//! A minimal state container with an explicitly composed dispatch pipeline.
//!
//! ```text
//! store.dispatch(x)
//!     │
//!     ▼
//! Middleware 0 ──► Middleware 1 ──► ... ──► DispatchInterceptor ──► reducer
//!                                                                     │
//!                                         subscribers(&new_state) ◄───┘
//! ```
//!
//! # Guarantees
//!
//! - **One pass per dispatch**: every `dispatch` call walks the chain exactly once
//! - **Interceptor innermost**: the interceptor always runs after every other stage
//! - **Synchronous reactions**: subscribers run before `dispatch` returns
//!
//! # Example
//!
//! ```ignore
//! use stethoscope::{Store, ThunkMiddleware, Watcher};
//!
//! let watcher = Watcher::new();
//! let store = Store::builder(CounterState::default(), counter_reducer)
//!     .with_middleware(ThunkMiddleware)
//!     .with_interceptor(watcher.interceptor())
//!     .build();
//!
//! store.subscribe(|state| render(state));
//! store.dispatch_action(CounterAction::Increment);
//! ```

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::action::Action;
use crate::error::StoreError;
use crate::interceptor::DispatchInterceptor;
use crate::middleware::{Middleware, Next};

/// Pure state transition function.
pub type Reducer<S, A> = Arc<dyn Fn(&S, &A) -> S + Send + Sync>;

/// Reactive consumer notified with the new state after every reduction.
pub type Subscriber<S> = Arc<dyn Fn(&S) + Send + Sync>;

/// Deferred asynchronous action receiving the store.
pub type Thunk<S, A> = Box<dyn FnOnce(Store<S, A>) -> BoxFuture<'static, Result<()>> + Send>;

// =============================================================================
// Dispatch Input / Output
// =============================================================================

/// What can be sent through the pipeline.
pub enum Dispatchable<S, A> {
    /// A plain action, reduced into the state.
    Action(A),
    /// An async action; requires [`ThunkMiddleware`](crate::ThunkMiddleware).
    Thunk(Thunk<S, A>),
}

impl<S, A> Dispatchable<S, A> {
    /// Wrap an async closure as a thunk.
    pub fn thunk<F, Fut>(f: F) -> Self
    where
        F: FnOnce(Store<S, A>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Dispatchable::Thunk(Box::new(move |store| f(store).boxed()))
    }

    /// The action identifier, `None` for thunks.
    pub fn action_type(&self) -> Option<&str>
    where
        A: Action,
    {
        match self {
            Dispatchable::Action(action) => Some(action.action_type()),
            Dispatchable::Thunk(_) => None,
        }
    }
}

impl<S, A> From<A> for Dispatchable<S, A> {
    fn from(action: A) -> Self {
        Dispatchable::Action(action)
    }
}

impl<S, A: fmt::Debug> fmt::Debug for Dispatchable<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatchable::Action(action) => f.debug_tuple("Action").field(action).finish(),
            Dispatchable::Thunk(_) => f.write_str("Thunk"),
        }
    }
}

/// Result of a dispatch, handed back unchanged by every stage.
#[derive(Debug)]
pub enum Dispatched<A> {
    /// A plain action echoes back the action itself.
    Action(A),
    /// A thunk yields a handle to await its completion.
    Thunk(ThunkHandle),
}

impl<A> Dispatched<A> {
    /// The echoed action, if this was a plain dispatch.
    pub fn action(&self) -> Option<&A> {
        match self {
            Dispatched::Action(action) => Some(action),
            Dispatched::Thunk(_) => None,
        }
    }

    /// Consume into the echoed action.
    pub fn into_action(self) -> Option<A> {
        match self {
            Dispatched::Action(action) => Some(action),
            Dispatched::Thunk(_) => None,
        }
    }

    /// Returns true if this came from a thunk.
    pub fn is_thunk(&self) -> bool {
        matches!(self, Dispatched::Thunk(_))
    }

    /// Wait until the dispatched work has finished.
    ///
    /// Plain actions are already applied and resolve immediately.
    pub async fn wait(self) -> Result<()> {
        match self {
            Dispatched::Action(_) => Ok(()),
            Dispatched::Thunk(handle) => handle.join().await,
        }
    }
}

/// Awaitable completion of a dispatched thunk.
pub struct ThunkHandle {
    state: ThunkState,
}

enum ThunkState {
    Ready(Result<()>),
    Running(JoinHandle<Result<()>>),
}

impl ThunkHandle {
    pub(crate) fn ready(result: Result<()>) -> Self {
        Self {
            state: ThunkState::Ready(result),
        }
    }

    pub(crate) fn running(handle: JoinHandle<Result<()>>) -> Self {
        Self {
            state: ThunkState::Running(handle),
        }
    }

    /// Whether the thunk has already completed.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            ThunkState::Ready(_) => true,
            ThunkState::Running(handle) => handle.is_finished(),
        }
    }

    /// Wait for the thunk and return its result.
    pub async fn join(self) -> Result<()> {
        match self.state {
            ThunkState::Ready(result) => result,
            ThunkState::Running(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => Err(StoreError::ThunkAborted {
                    reason: e.to_string(),
                }
                .into()),
            },
        }
    }
}

impl fmt::Debug for ThunkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThunkHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

// =============================================================================
// Store
// =============================================================================

/// Handle returned by [`Store::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// State container with a reducer, subscribers and a middleware chain.
///
/// Cloning is cheap and every clone shares the same state.
pub struct Store<S, A> {
    inner: Arc<StoreInner<S, A>>,
}

struct StoreInner<S, A> {
    state: RwLock<S>,
    reducer: Reducer<S, A>,
    middleware: Vec<Arc<dyn Middleware<S, A>>>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber<S>)>>,
    next_subscription: AtomicU64,
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, A> Store<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Action,
{
    /// Start building a store.
    pub fn builder<R>(initial: S, reducer: R) -> StoreBuilder<S, A>
    where
        R: Fn(&S, &A) -> S + Send + Sync + 'static,
    {
        StoreBuilder::new(initial, reducer)
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> S {
        self.read_state().clone()
    }

    /// Read the current state without cloning it.
    pub fn with_state<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        f(&self.read_state())
    }

    /// Send anything dispatchable through the full pipeline.
    pub fn dispatch(&self, action: impl Into<Dispatchable<S, A>>) -> Dispatched<A> {
        self.dispatch_from(0, action.into())
    }

    /// Dispatch a plain action.
    pub fn dispatch_action(&self, action: A) -> Dispatched<A> {
        self.dispatch_from(0, Dispatchable::Action(action))
    }

    /// Dispatch an async closure as a thunk.
    pub fn dispatch_thunk<F, Fut>(&self, f: F) -> Dispatched<A>
    where
        F: FnOnce(Store<S, A>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.dispatch_from(0, Dispatchable::thunk(f))
    }

    /// Register a reactive consumer.
    pub fn subscribe<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.lock_subscribers().push((id, Arc::new(subscriber)));
        id
    }

    /// Remove a consumer. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock_subscribers();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Number of registered consumers.
    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    /// Number of middleware stages, the interceptor included.
    pub fn middleware_count(&self) -> usize {
        self.inner.middleware.len()
    }

    pub(crate) fn dispatch_from(&self, index: usize, action: Dispatchable<S, A>) -> Dispatched<A> {
        match self.inner.middleware.get(index) {
            Some(stage) => stage.handle(self, action, Next::new(self, index + 1)),
            None => self.reduce(action),
        }
    }

    fn reduce(&self, action: Dispatchable<S, A>) -> Dispatched<A> {
        let action = match action {
            Dispatchable::Action(action) => action,
            Dispatchable::Thunk(_) => {
                warn!("thunk reached the reducer; add ThunkMiddleware to the pipeline");
                return Dispatched::Thunk(ThunkHandle::ready(Err(StoreError::UnhandledThunk.into())));
            }
        };

        let snapshot = {
            let mut state = self.write_state();
            let next = (self.inner.reducer)(&state, &action);
            *state = next;
            state.clone()
        };

        // Copy the list so subscribers may (un)subscribe or dispatch reentrantly.
        let subscribers: Vec<Subscriber<S>> = self
            .lock_subscribers()
            .iter()
            .map(|(_, subscriber)| subscriber.clone())
            .collect();
        for subscriber in subscribers {
            subscriber(&snapshot);
        }

        Dispatched::Action(action)
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, S> {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, S> {
        self.inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Subscriber<S>)>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S, A> fmt::Debug for Store<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("middleware_count", &self.inner.middleware.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Store Builder
// =============================================================================

/// Builder composing a store's pipeline.
///
/// Middleware stages run in registration order. The interceptor, if any, is
/// always placed innermost so that it sees actions only after every other
/// stage has handled them.
///
/// # Example
///
/// ```ignore
/// let store = StoreBuilder::new(AppState::default(), app_reducer)
///     .with_middleware(ThunkMiddleware)
///     .with_interceptor(watcher.interceptor())
///     .with_middleware(LoggerMiddleware::new("app"))
///     .build();
/// // Pipeline: ThunkMiddleware -> LoggerMiddleware -> interceptor -> reducer
/// ```
pub struct StoreBuilder<S, A> {
    initial: S,
    reducer: Reducer<S, A>,
    middleware: Vec<Arc<dyn Middleware<S, A>>>,
    interceptor: Option<DispatchInterceptor>,
}

impl<S, A> StoreBuilder<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Action,
{
    /// Create a builder from an initial state and a reducer.
    pub fn new<R>(initial: S, reducer: R) -> Self
    where
        R: Fn(&S, &A) -> S + Send + Sync + 'static,
    {
        Self {
            initial,
            reducer: Arc::new(reducer),
            middleware: Vec::new(),
            interceptor: None,
        }
    }

    /// Append a middleware stage.
    pub fn with_middleware<M>(mut self, middleware: M) -> Self
    where
        M: Middleware<S, A>,
    {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Append an already shared middleware stage.
    pub fn with_shared_middleware(mut self, middleware: Arc<dyn Middleware<S, A>>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Install the watcher interceptor as the innermost stage.
    ///
    /// Installing a second interceptor replaces the first.
    pub fn with_interceptor(mut self, interceptor: DispatchInterceptor) -> Self {
        if self.interceptor.is_some() {
            warn!("replacing previously installed dispatch interceptor");
        }
        self.interceptor = Some(interceptor);
        self
    }

    /// Build the store.
    pub fn build(self) -> Store<S, A> {
        let mut middleware = self.middleware;
        if let Some(interceptor) = self.interceptor {
            middleware.push(Arc::new(interceptor));
        }

        Store {
            inner: Arc::new(StoreInner {
                state: RwLock::new(self.initial),
                reducer: self.reducer,
                middleware,
                subscribers: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(0),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::ThunkMiddleware;
    use crate::target::{ListenInfo, Target};
    use crate::watcher::Watcher;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum CounterAction {
        Increment,
        Add(i64),
    }

    impl Action for CounterAction {
        fn action_type(&self) -> &str {
            match self {
                CounterAction::Increment => "increment",
                CounterAction::Add(_) => "add",
            }
        }
    }

    fn reducer(state: &i64, action: &CounterAction) -> i64 {
        match action {
            CounterAction::Increment => state + 1,
            CounterAction::Add(n) => state + n,
        }
    }

    fn counter_store() -> Store<i64, CounterAction> {
        Store::builder(0, reducer)
            .with_middleware(ThunkMiddleware)
            .build()
    }

    #[test]
    fn test_dispatch_reduces_and_echoes_action() {
        let store = counter_store();
        let result = store.dispatch_action(CounterAction::Add(5));
        assert_eq!(result.action(), Some(&CounterAction::Add(5)));
        assert_eq!(store.state(), 5);

        store.dispatch(CounterAction::Increment);
        assert_eq!(store.with_state(|s| *s), 6);
    }

    #[test]
    fn test_subscribers_see_new_state_before_dispatch_returns() {
        let store = counter_store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        store.subscribe({
            let seen = seen.clone();
            move |state| seen.lock().unwrap().push(*state)
        });

        store.dispatch_action(CounterAction::Increment);
        assert_eq!(*seen.lock().unwrap(), vec![1]);
        store.dispatch_action(CounterAction::Add(2));
        assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_unsubscribe() {
        let store = counter_store();
        let count = Arc::new(AtomicUsize::new(0));
        let id = store.subscribe({
            let count = count.clone();
            move |_| {
                count.fetch_add(1, Ordering::Relaxed);
            }
        });
        assert_eq!(store.subscriber_count(), 1);

        store.dispatch_action(CounterAction::Increment);
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.dispatch_action(CounterAction::Increment);

        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_subscriber_may_dispatch_reentrantly() {
        let store = counter_store();
        store.subscribe({
            let store = store.clone();
            move |state| {
                if *state == 1 {
                    store.dispatch_action(CounterAction::Add(10));
                }
            }
        });

        store.dispatch_action(CounterAction::Increment);
        assert_eq!(store.state(), 11);
    }

    #[tokio::test]
    async fn test_thunk_result_is_awaitable() {
        let store = counter_store();
        let result = store.dispatch_thunk(|store| async move {
            store.dispatch_action(CounterAction::Increment);
            tokio::time::sleep(Duration::from_millis(5)).await;
            store.dispatch_action(CounterAction::Increment);
            Ok(())
        });

        assert!(result.is_thunk());
        // Synchronous prefix already ran inside dispatch
        assert_eq!(store.state(), 1);

        result.wait().await.unwrap();
        assert_eq!(store.state(), 2);
    }

    #[tokio::test]
    async fn test_thunk_error_propagates_through_handle() {
        let store = counter_store();
        let result = store.dispatch_thunk(|_store| async move {
            tokio::task::yield_now().await;
            Err(anyhow::anyhow!("fetch failed"))
        });

        let err = result.wait().await.unwrap_err();
        assert_eq!(err.to_string(), "fetch failed");
    }

    #[tokio::test]
    async fn test_thunk_without_middleware_is_rejected() {
        let store: Store<i64, CounterAction> = Store::builder(0, reducer).build();
        let result = store.dispatch_thunk(|_store| async move { Ok(()) });

        let err = result.wait().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::UnhandledThunk)
        ));
        assert_eq!(store.state(), 0);
    }

    /// Logs when an action enters and leaves the stage.
    struct StageLog(Arc<Mutex<Vec<&'static str>>>);

    impl Middleware<i64, CounterAction> for StageLog {
        fn handle(
            &self,
            _store: &Store<i64, CounterAction>,
            action: Dispatchable<i64, CounterAction>,
            next: Next<'_, i64, CounterAction>,
        ) -> Dispatched<CounterAction> {
            self.0.lock().unwrap().push("in");
            let result = next.run(action);
            self.0.lock().unwrap().push("out");
            result
        }
    }

    #[tokio::test]
    async fn test_interceptor_is_innermost() {
        let watcher = Watcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        // Registered after the interceptor on purpose
        let store = Store::builder(0, reducer)
            .with_interceptor(watcher.interceptor())
            .with_middleware(StageLog(log.clone()))
            .build();
        assert_eq!(store.middleware_count(), 2);

        let seen = Arc::new(Mutex::new(None));
        let dispatcher = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            dispatcher.dispatch_action(CounterAction::Increment);
        });

        watcher
            .listen_async(ListenInfo::new(|| async { Ok(()) }).target(
                Target::new("increment").on_matched({
                    let log = log.clone();
                    let seen = seen.clone();
                    let store = store.clone();
                    move || {
                        *seen.lock().unwrap() = Some((log.lock().unwrap().clone(), store.state()));
                        Ok(())
                    }
                }),
            ))
            .await
            .unwrap();

        // Matched inside the outer stage, after the reducer ran
        assert_eq!(*seen.lock().unwrap(), Some((vec!["in"], 1)));
        assert_eq!(*log.lock().unwrap(), vec!["in", "out"]);
    }

    #[test]
    fn test_dispatchable_action_type() {
        let action: Dispatchable<i64, CounterAction> = CounterAction::Increment.into();
        assert_eq!(action.action_type(), Some("increment"));
        let thunk: Dispatchable<i64, CounterAction> =
            Dispatchable::thunk(|_store| async move { Ok(()) });
        assert_eq!(thunk.action_type(), None);
        assert_eq!(format!("{:?}", thunk), "Thunk");
    }
}
