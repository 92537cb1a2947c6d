//! Sample inbox application driven through a watched store.
//!
//! Two state slices (`inbox`, `polling`), thunks that talk to an
//! [`InboxApi`](api::InboxApi), a text [`InboxView`](view::InboxView) and a
//! background [`PollingClient`](client::PollingClient). Integration tests use
//! a [`stethoscope::Watcher`] to wait for the dispatches these produce.

pub mod api;
pub mod app;
pub mod client;
pub mod config;
pub mod inbox;
pub mod polling;
pub mod view;

pub use api::{ApiError, InboxApi, MockInboxApi};
pub use app::{configure_store, AppAction, AppState, AppStore, InboxApp};
pub use client::{PollingClient, PollingHandle};
pub use config::Config;
pub use view::InboxView;
