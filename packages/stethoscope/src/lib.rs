//! # Stethoscope
//!
//! Deterministic waiting on dispatched actions. A watcher is installed as the
//! innermost stage of a store's dispatch pipeline and lets a test (or any
//! caller) trigger an operation, then wait until a declared set of actions
//! has been dispatched and fully settled.
//!
//! ## Core Concepts
//!
//! - [`Action`] = a state-transition request with a string identifier
//! - [`Target`] = an identifier a session waits for, plus an optional callback
//! - [`Watcher`] = runs one session at a time and matches dispatches to targets
//! - [`DispatchInterceptor`] = the pipeline stage that feeds the watcher
//!
//! ## Architecture
//!
//! ```text
//! store.dispatch(action)
//!     │
//!     ▼
//! ThunkMiddleware ── thunk? ──► run it (inline first, then spawned)
//!     │                              │
//!     ▼                              └─► store.dispatch(...) ─┐
//! LoggerMiddleware / host stages                              │
//!     │ ◄──────────────────────────────────────────────────────┘
//!     ▼
//! DispatchInterceptor ──► Watcher::execute
//!                            ├─► reducer + subscribers (settle)
//!                            └─► match pending targets ─► callback
//!
//! Watcher::listen_async(info)
//!     ├─► act()              (triggering phase, matching deferred)
//!     └─► heartbeat loop     until pending is empty or timeout
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Settle before match** - callbacks observe the state after their action
//! 2. **One session at a time** - concurrent sessions queue in FIFO order
//! 3. **First match wins** - one dispatch consumes at most one target
//! 4. **Transparent** - the interceptor never alters what dispatch returns
//! 5. **Errors pass through** - user errors come back unchanged
//!
//! ## Example
//!
//! ```ignore
//! use stethoscope::{AnyAction, ListenInfo, Store, Target, ThunkMiddleware, Watcher};
//!
//! let watcher = Watcher::new();
//! let store = Store::builder(State::default(), reducer)
//!     .with_middleware(ThunkMiddleware)
//!     .with_interceptor(watcher.interceptor())
//!     .build();
//!
//! watcher
//!     .listen_async(
//!         ListenInfo::new(|| async {
//!             store.dispatch_thunk(fetch_messages);
//!             Ok(())
//!         })
//!         .target(Target::new("[inbox] request messages"))
//!         .target(Target::new("[inbox] receive messages").on_matched(|| {
//!             anyhow::ensure!(!store.state().messages.is_empty());
//!             Ok(())
//!         })),
//!     )
//!     .await?;
//! ```
//!
//! ## Testing
//!
//! Enable the `testing` feature for [`testing::init_test_tracing`] and the
//! [`testing::DispatchRecorder`] spy middleware.

mod action;
mod config;
mod error;
mod interceptor;
mod middleware;
mod store;
mod target;
mod watcher;

#[cfg(feature = "testing")]
pub mod testing;


pub use action::{Action, AnyAction, SessionId};
pub use config::{WatcherConfig, DEFAULT_HEARTBEAT, DEFAULT_TIMEOUT};
pub use error::{StoreError, WatchError};
pub use interceptor::DispatchInterceptor;
pub use middleware::{LoggerMiddleware, Middleware, Next, ThunkMiddleware};
pub use store::{
    Dispatchable, Dispatched, Reducer, Store, StoreBuilder, Subscriber, SubscriptionId, Thunk,
    ThunkHandle,
};
pub use target::{ListenInfo, MatchCallback, Target};
pub use watcher::{Watcher, WatcherBuilder};
