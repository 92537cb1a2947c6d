//! Structured error types for stethoscope.
//!
//! `WatchError` covers failures that originate in the watcher itself.
//! `StoreError` covers failures of the store's dispatch pipeline.
//!
//! # The Error Boundary Rule
//!
//! > **User errors cross the watcher untouched.**
//!
//! Errors returned by a trigger operation or a match callback are handed back
//! from [`Watcher::listen_async`](crate::Watcher::listen_async) as the very same
//! `anyhow::Error`, never wrapped. Only failures the watcher detects on its own,
//! such as a timeout or a panicking callback, are reported as [`WatchError`],
//! which callers can recover through `downcast_ref`.
//!
//! # Example
//!
//! ```ignore
//! use stethoscope::{ListenInfo, WatchError};
//!
//! let result = watcher.listen_async(info).await;
//! match result {
//!     Ok(()) => println!("all targets matched"),
//!     Err(e) => match e.downcast_ref::<WatchError>() {
//!         Some(WatchError::Timeout { pending, .. }) => {
//!             eprintln!("still waiting for {:?}", pending);
//!         }
//!         _ => eprintln!("callback failed: {e:#}"),
//!     },
//! }
//! ```

use std::time::Duration;

use thiserror::Error;

/// Failures detected by the watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Not every target matched within the heartbeat-bounded budget.
    #[error(
        "stethoscope timed out after waiting for all the dispatched updates for {}s",
        .timeout.as_secs_f64()
    )]
    Timeout {
        /// The configured timeout of the session.
        timeout: Duration,
        /// Identifiers of the targets that were still pending.
        pending: Vec<String>,
    },

    /// The watcher configuration cannot be used.
    #[error("invalid watcher configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with it.
        reason: &'static str,
    },

    /// An asynchronous match callback needed a tokio runtime to finish but
    /// the dispatch happened outside of one.
    #[error("no tokio runtime available to complete the callback for action type {action_type}")]
    NoRuntime {
        /// The identifier whose callback could not be driven.
        action_type: String,
    },

    /// A match callback panicked instead of returning.
    #[error("match callback for action type {action_type} panicked: {message}")]
    CallbackPanicked {
        /// The identifier whose callback panicked.
        action_type: String,
        /// The panic payload, when it was a string.
        message: String,
    },
}

impl WatchError {
    /// Returns true for the timeout variant.
    pub fn is_timeout(&self) -> bool {
        matches!(self, WatchError::Timeout { .. })
    }
}

/// Failures of the store's dispatch pipeline.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A thunk reached the reducer because no thunk middleware was installed.
    #[error("thunk dispatched without a thunk middleware in the pipeline")]
    UnhandledThunk,

    /// A thunk could not finish synchronously and there was no tokio runtime
    /// to drive the rest of it.
    #[error("no tokio runtime available to drive the thunk")]
    NoRuntime,

    /// The task driving a thunk was cancelled or panicked.
    #[error("thunk task aborted: {reason}")]
    ThunkAborted {
        /// The underlying join error message.
        reason: String,
    },
}
