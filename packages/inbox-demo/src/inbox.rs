// Inbox slice - messages list and selection

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::api::InboxApi;
use crate::app::{AppAction, AppDispatchable, AppStore};

pub const REQUEST_MESSAGES: &str = "[inbox] request messages";
pub const RECEIVE_MESSAGES: &str = "[inbox] receive messages";
pub const RECEIVE_ERROR_FOR_MESSAGES_REQUEST: &str = "[inbox] receive error for messages request";
pub const SELECT_MESSAGE: &str = "[inbox] select a message";
pub const SELECT_SINGLE_MESSAGE: &str = "[inbox] select a single message and deselect all the others";
pub const SELECT_ALL_MESSAGES: &str = "[inbox] select all messages";
pub const DESELECT_MESSAGE: &str = "[inbox] deselect a message";
pub const DESELECT_ALL_MESSAGES: &str = "[inbox] deselect all messages";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagesState {
    pub loading: bool,
    pub data: Vec<Message>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboxState {
    pub selected_ids: Vec<u64>,
    pub messages: MessagesState,
}

impl InboxState {
    pub fn is_selected(&self, id: u64) -> bool {
        self.selected_ids.contains(&id)
    }

    pub fn is_all_selected(&self) -> bool {
        self.messages.data.len() == self.selected_ids.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboxAction {
    RequestMessages,
    ReceiveMessages(Vec<Message>),
    ReceiveErrorForMessagesRequest(String),
    SelectMessage(u64),
    SelectSingleMessage(u64),
    SelectAllMessages,
    DeselectMessage(u64),
    DeselectAllMessages,
}

impl InboxAction {
    pub fn action_type(&self) -> &'static str {
        match self {
            InboxAction::RequestMessages => REQUEST_MESSAGES,
            InboxAction::ReceiveMessages(_) => RECEIVE_MESSAGES,
            InboxAction::ReceiveErrorForMessagesRequest(_) => RECEIVE_ERROR_FOR_MESSAGES_REQUEST,
            InboxAction::SelectMessage(_) => SELECT_MESSAGE,
            InboxAction::SelectSingleMessage(_) => SELECT_SINGLE_MESSAGE,
            InboxAction::SelectAllMessages => SELECT_ALL_MESSAGES,
            InboxAction::DeselectMessage(_) => DESELECT_MESSAGE,
            InboxAction::DeselectAllMessages => DESELECT_ALL_MESSAGES,
        }
    }
}

pub fn reduce(state: &InboxState, action: &InboxAction) -> InboxState {
    match action {
        InboxAction::RequestMessages => InboxState {
            selected_ids: state.selected_ids.clone(),
            messages: MessagesState {
                loading: true,
                data: Vec::new(),
                error: None,
            },
        },
        InboxAction::ReceiveMessages(messages) => InboxState {
            // Drop selections of messages that disappeared
            selected_ids: state
                .selected_ids
                .iter()
                .copied()
                .filter(|id| messages.iter().any(|m| m.id == *id))
                .collect(),
            messages: MessagesState {
                loading: false,
                data: messages.clone(),
                error: None,
            },
        },
        InboxAction::ReceiveErrorForMessagesRequest(reason) => InboxState {
            selected_ids: Vec::new(),
            messages: MessagesState {
                loading: false,
                data: Vec::new(),
                error: Some(if reason.is_empty() {
                    "received unknown error".to_string()
                } else {
                    reason.clone()
                }),
            },
        },
        InboxAction::SelectMessage(id) => {
            let mut next = state.clone();
            next.selected_ids.push(*id);
            next
        }
        InboxAction::SelectSingleMessage(id) => InboxState {
            selected_ids: vec![*id],
            messages: state.messages.clone(),
        },
        InboxAction::SelectAllMessages => InboxState {
            selected_ids: state.messages.data.iter().map(|m| m.id).collect(),
            messages: state.messages.clone(),
        },
        InboxAction::DeselectMessage(id) => InboxState {
            selected_ids: state.selected_ids.iter().copied().filter(|s| s != id).collect(),
            messages: state.messages.clone(),
        },
        InboxAction::DeselectAllMessages => InboxState {
            selected_ids: Vec::new(),
            messages: state.messages.clone(),
        },
    }
}

// =============================================================================
// Thunks
// =============================================================================

/// Request the message list, unless a request is already in flight.
///
/// Dispatches `request messages` synchronously, then `receive messages` (or
/// the error action) once the api answers.
pub fn request_messages(api: Arc<dyn InboxApi>) -> AppDispatchable {
    AppDispatchable::thunk(move |store: AppStore| async move {
        if store.with_state(|s| s.inbox.messages.loading) {
            debug!("messages request already in flight");
            return Ok(());
        }

        store.dispatch_action(InboxAction::RequestMessages.into());

        match api.fetch_messages().await {
            Ok(messages) => {
                store.dispatch_action(InboxAction::ReceiveMessages(messages).into());
            }
            Err(e) => {
                error!(error = %e, "received error after requesting messages");
                store.dispatch_action(InboxAction::ReceiveErrorForMessagesRequest(e.to_string()).into());
            }
        }
        Ok(())
    })
}

fn dispatching(action: InboxAction) -> AppDispatchable {
    AppDispatchable::thunk(move |store: AppStore| async move {
        store.dispatch_action(AppAction::Inbox(action));
        Ok(())
    })
}

pub fn select_message(message: &Message) -> AppDispatchable {
    dispatching(InboxAction::SelectMessage(message.id))
}

pub fn select_single_message(message: &Message) -> AppDispatchable {
    dispatching(InboxAction::SelectSingleMessage(message.id))
}

pub fn select_all_messages() -> AppDispatchable {
    dispatching(InboxAction::SelectAllMessages)
}

pub fn deselect_message(message: &Message) -> AppDispatchable {
    dispatching(InboxAction::DeselectMessage(message.id))
}

pub fn deselect_all_messages() -> AppDispatchable {
    dispatching(InboxAction::DeselectAllMessages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: u64, subject: &str) -> Message {
        Message {
            id,
            from: "zzz@gmail.com".into(),
            to: "aaa@gmail.com".into(),
            subject: subject.into(),
            content: String::new(),
        }
    }

    #[test]
    fn test_request_clears_data_and_sets_loading() {
        let state = InboxState {
            selected_ids: vec![1],
            messages: MessagesState {
                loading: false,
                data: vec![message(1, "a")],
                error: Some("old".into()),
            },
        };
        let next = reduce(&state, &InboxAction::RequestMessages);
        assert!(next.messages.loading);
        assert!(next.messages.data.is_empty());
        assert!(next.messages.error.is_none());
        assert_eq!(next.selected_ids, vec![1]);
    }

    #[test]
    fn test_receive_keeps_only_surviving_selection() {
        let state = InboxState {
            selected_ids: vec![1, 2],
            messages: MessagesState::default(),
        };
        let next = reduce(&state, &InboxAction::ReceiveMessages(vec![message(2, "b"), message(3, "c")]));
        assert_eq!(next.selected_ids, vec![2]);
        assert_eq!(next.messages.data.len(), 2);
        assert!(!next.messages.loading);
    }

    #[test]
    fn test_error_without_reason_uses_fallback() {
        let next = reduce(
            &InboxState::default(),
            &InboxAction::ReceiveErrorForMessagesRequest(String::new()),
        );
        assert_eq!(next.messages.error.as_deref(), Some("received unknown error"));
    }

    #[test]
    fn test_selection_actions() {
        let loaded = reduce(
            &InboxState::default(),
            &InboxAction::ReceiveMessages(vec![message(1, "a"), message(2, "b")]),
        );

        let all = reduce(&loaded, &InboxAction::SelectAllMessages);
        assert!(all.is_all_selected());

        let one_less = reduce(&all, &InboxAction::DeselectMessage(1));
        assert_eq!(one_less.selected_ids, vec![2]);

        let single = reduce(&one_less, &InboxAction::SelectSingleMessage(1));
        assert_eq!(single.selected_ids, vec![1]);

        let added = reduce(&single, &InboxAction::SelectMessage(2));
        assert!(added.is_selected(1) && added.is_selected(2));

        let none = reduce(&added, &InboxAction::DeselectAllMessages);
        assert!(none.selected_ids.is_empty());
    }

    #[test]
    fn test_action_types() {
        assert_eq!(InboxAction::RequestMessages.action_type(), "[inbox] request messages");
        assert_eq!(
            InboxAction::ReceiveMessages(Vec::new()).action_type(),
            "[inbox] receive messages"
        );
    }
}
