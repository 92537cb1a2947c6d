//! Core types that flow through a dispatch pipeline.
//!
//! # Overview
//!
//! An [`Action`] is a discrete, identifiable request for a state transition.
//! The only thing the watcher ever looks at is its identifier, returned by
//! [`Action::action_type`]. Payloads are opaque.
//!
//! A [`SessionId`] tags one watch session so that log lines and late callback
//! completions can be attributed to the session that produced them.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A dispatchable state-transition request.
///
/// Implementors only need to expose a stable string identifier. The watcher
/// compares identifiers for equality and never inspects anything else.
///
/// # Example
///
/// ```ignore
/// use stethoscope::Action;
///
/// #[derive(Debug, Clone)]
/// enum CounterAction {
///     Increment,
///     Reset,
/// }
///
/// impl Action for CounterAction {
///     fn action_type(&self) -> &str {
///         match self {
///             CounterAction::Increment => "[counter] increment",
///             CounterAction::Reset => "[counter] reset",
///         }
///     }
/// }
/// ```
pub trait Action: Send + 'static {
    /// The identifier used to match this action against pending targets.
    fn action_type(&self) -> &str;
}

/// An untyped action: an identifier plus an arbitrary JSON payload.
///
/// Useful for hosts that do not model their actions as an enum, and in tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnyAction {
    /// The action identifier.
    #[serde(rename = "type")]
    pub action_type: Cow<'static, str>,
    /// Opaque payload, `Null` when absent.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl AnyAction {
    /// Create an action without payload.
    pub fn new(action_type: impl Into<Cow<'static, str>>) -> Self {
        Self {
            action_type: action_type.into(),
            payload: serde_json::Value::Null,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

impl Action for AnyAction {
    fn action_type(&self) -> &str {
        &self.action_type
    }
}

/// Identifier of one watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get a reference to the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
