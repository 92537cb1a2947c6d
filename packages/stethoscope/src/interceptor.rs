//! Dispatch interceptor - routes every dispatched action through a watcher.
//!
//! The interceptor has no state of its own. It either forwards to
//! [`Watcher::execute`] or, when detached, straight to the wrapped dispatch.
//! In both cases the underlying dispatch result is returned unchanged.
//!
//! # Installation
//!
//! With the bundled [`Store`](crate::Store), install it through
//! [`StoreBuilder::with_interceptor`](crate::StoreBuilder::with_interceptor),
//! which always places it innermost. Hosts with their own pipeline can use
//! [`DispatchInterceptor::wrap`] around their raw dispatch function:
//!
//! ```ignore
//! let raw = |action: MyAction| my_reducer_dispatch(action);
//! let dispatch = watcher.interceptor().wrap(raw);
//! dispatch(MyAction::Refresh);
//! ```

use crate::action::Action;
use crate::middleware::{Middleware, Next};
use crate::store::{Dispatchable, Dispatched, Store};
use crate::watcher::Watcher;

/// Pipeline stage delegating plain actions to [`Watcher::execute`].
#[derive(Debug, Clone, Default)]
pub struct DispatchInterceptor {
    watcher: Option<Watcher>,
}

impl DispatchInterceptor {
    /// Create an interceptor bound to `watcher`.
    pub fn new(watcher: Watcher) -> Self {
        Self {
            watcher: Some(watcher),
        }
    }

    /// Create a passthrough interceptor with no watcher attached.
    pub fn detached() -> Self {
        Self { watcher: None }
    }

    /// The attached watcher, if any.
    pub fn watcher(&self) -> Option<&Watcher> {
        self.watcher.as_ref()
    }

    /// Returns true if a watcher is attached.
    pub fn is_attached(&self) -> bool {
        self.watcher.is_some()
    }

    /// Wrap a dispatch function so that every call goes through the watcher.
    pub fn wrap<A, R, F>(&self, dispatch: F) -> impl Fn(A) -> R + Send + Sync + 'static
    where
        A: Action,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        let watcher = self.watcher.clone();
        move |action| match &watcher {
            Some(watcher) => watcher.execute(&dispatch, action),
            None => dispatch(action),
        }
    }
}

impl<S, A> Middleware<S, A> for DispatchInterceptor
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
        match (action, &self.watcher) {
            (Dispatchable::Action(action), Some(watcher)) => {
                watcher.execute(|action| next.run_action(action), action)
            }
            (action, _) => next.run(action),
        }
    }
}
