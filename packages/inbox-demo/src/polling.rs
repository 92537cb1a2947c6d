// Polling slice - asks the backend whether the inbox changed

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::api::InboxApi;
use crate::app::{AppDispatchable, AppStore};
use crate::inbox;

pub const REQUEST_INBOX_POLLING: &str = "[polling] request inbox polling";
pub const RECEIVE_INBOX_POLLING: &str = "[polling] receive inbox polling";
pub const RESET_INBOX_POLLING: &str = "[polling] reset inbox polling state";
pub const RECEIVE_ERROR_FOR_INBOX_POLLING_REQUEST: &str =
    "[polling] receive error for inbox polling request";

/// Backend answer to a polling request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxPolling {
    /// `Some(true)` when new messages are waiting.
    #[serde(default)]
    pub messages: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollingState {
    /// `None` while a polling request is in flight.
    pub inbox: Option<InboxPolling>,
}

impl Default for PollingState {
    fn default() -> Self {
        Self {
            inbox: Some(InboxPolling {
                messages: Some(false),
            }),
        }
    }
}

impl PollingState {
    /// Whether a new polling request may start.
    pub fn can_poll(&self) -> bool {
        matches!(&self.inbox, Some(polling) if polling.messages != Some(true))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollingAction {
    RequestInboxPolling,
    ReceiveInboxPolling(InboxPolling),
    ResetInboxPolling,
    ReceiveErrorForInboxPollingRequest(String),
}

impl PollingAction {
    pub fn action_type(&self) -> &'static str {
        match self {
            PollingAction::RequestInboxPolling => REQUEST_INBOX_POLLING,
            PollingAction::ReceiveInboxPolling(_) => RECEIVE_INBOX_POLLING,
            PollingAction::ResetInboxPolling => RESET_INBOX_POLLING,
            PollingAction::ReceiveErrorForInboxPollingRequest(_) => {
                RECEIVE_ERROR_FOR_INBOX_POLLING_REQUEST
            }
        }
    }
}

pub fn reduce(_state: &PollingState, action: &PollingAction) -> PollingState {
    match action {
        PollingAction::RequestInboxPolling => PollingState { inbox: None },
        PollingAction::ReceiveInboxPolling(polling) => PollingState {
            inbox: Some(polling.clone()),
        },
        PollingAction::ReceiveErrorForInboxPollingRequest(_) => PollingState {
            inbox: Some(InboxPolling { messages: None }),
        },
        PollingAction::ResetInboxPolling => PollingState::default(),
    }
}

/// Poll the backend; when it reports new messages, load them before
/// resetting the polling state.
///
/// Skipped while a poll is in flight or new messages are already flagged.
pub fn request_polling(api: Arc<dyn InboxApi>) -> AppDispatchable {
    AppDispatchable::thunk(move |store: AppStore| async move {
        if !store.with_state(|s| s.polling.can_poll()) {
            debug!("polling skipped");
            return Ok(());
        }

        store.dispatch_action(PollingAction::RequestInboxPolling.into());

        let polling = match api.fetch_polling().await {
            Ok(polling) => polling,
            Err(e) => {
                error!(error = %e, "received error after requesting inbox polling");
                store.dispatch_action(
                    PollingAction::ReceiveErrorForInboxPollingRequest(e.to_string()).into(),
                );
                return Ok(());
            }
        };

        let has_messages = polling.messages == Some(true);
        store.dispatch_action(PollingAction::ReceiveInboxPolling(polling).into());

        if has_messages {
            info!("new messages available");
            store.dispatch(inbox::request_messages(api)).wait().await?;
        }
        store.dispatch_action(PollingAction::ResetInboxPolling.into());
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_marks_in_flight() {
        let next = reduce(&PollingState::default(), &PollingAction::RequestInboxPolling);
        assert_eq!(next.inbox, None);
        assert!(!next.can_poll());
    }

    #[test]
    fn test_flagged_messages_block_polling() {
        let next = reduce(
            &PollingState { inbox: None },
            &PollingAction::ReceiveInboxPolling(InboxPolling {
                messages: Some(true),
            }),
        );
        assert!(!next.can_poll());

        let reset = reduce(&next, &PollingAction::ResetInboxPolling);
        assert_eq!(reset, PollingState::default());
        assert!(reset.can_poll());
    }

    #[test]
    fn test_error_clears_flag() {
        let next = reduce(
            &PollingState { inbox: None },
            &PollingAction::ReceiveErrorForInboxPollingRequest("boom".into()),
        );
        assert_eq!(next.inbox, Some(InboxPolling { messages: None }));
        assert!(next.can_poll());
    }

    #[test]
    fn test_polling_body_decodes() {
        let polling: InboxPolling = serde_json::from_str(r#"{"messages":true}"#).unwrap();
        assert_eq!(polling.messages, Some(true));
        let empty: InboxPolling = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.messages, None);
    }
}
