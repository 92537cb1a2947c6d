// App - root state, root action and store wiring

use std::sync::Arc;

use stethoscope::{
    Action, DispatchInterceptor, Dispatchable, Dispatched, LoggerMiddleware, Middleware, Store,
    ThunkMiddleware,
};

use crate::api::InboxApi;
use crate::inbox::{self, InboxAction, InboxState, Message};
use crate::polling::{self, PollingAction, PollingState};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub polling: PollingState,
    pub inbox: InboxState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    Inbox(InboxAction),
    Polling(PollingAction),
}

impl Action for AppAction {
    fn action_type(&self) -> &str {
        match self {
            AppAction::Inbox(action) => action.action_type(),
            AppAction::Polling(action) => action.action_type(),
        }
    }
}

impl From<InboxAction> for AppAction {
    fn from(action: InboxAction) -> Self {
        AppAction::Inbox(action)
    }
}

impl From<PollingAction> for AppAction {
    fn from(action: PollingAction) -> Self {
        AppAction::Polling(action)
    }
}

pub type AppStore = Store<AppState, AppAction>;
pub type AppDispatchable = Dispatchable<AppState, AppAction>;
pub type AppMiddleware = Arc<dyn Middleware<AppState, AppAction>>;

/// Root reducer: each slice only sees its own actions.
pub fn reduce(state: &AppState, action: &AppAction) -> AppState {
    match action {
        AppAction::Inbox(action) => AppState {
            polling: state.polling.clone(),
            inbox: inbox::reduce(&state.inbox, action),
        },
        AppAction::Polling(action) => AppState {
            polling: polling::reduce(&state.polling, action),
            inbox: state.inbox.clone(),
        },
    }
}

/// Build the application store.
///
/// Pipeline: thunks, logger, `extra_middleware` in order, then the
/// interceptor (if any) innermost.
pub fn configure_store(
    extra_middleware: Vec<AppMiddleware>,
    interceptor: Option<DispatchInterceptor>,
) -> AppStore {
    let mut builder = Store::builder(AppState::default(), reduce)
        .with_middleware(ThunkMiddleware)
        .with_middleware(LoggerMiddleware::new("inbox"));

    for middleware in extra_middleware {
        builder = builder.with_shared_middleware(middleware);
    }
    if let Some(interceptor) = interceptor {
        builder = builder.with_interceptor(interceptor);
    }
    builder.build()
}

/// A store bound to its backend: the entry point the UI layer calls into.
#[derive(Clone)]
pub struct InboxApp {
    store: AppStore,
    api: Arc<dyn InboxApi>,
}

impl InboxApp {
    pub fn new(
        api: Arc<dyn InboxApi>,
        extra_middleware: Vec<AppMiddleware>,
        interceptor: Option<DispatchInterceptor>,
    ) -> Self {
        Self {
            store: configure_store(extra_middleware, interceptor),
            api,
        }
    }

    pub fn store(&self) -> &AppStore {
        &self.store
    }

    pub fn state(&self) -> AppState {
        self.store.state()
    }

    /// The "Load messages" / refresh button.
    pub fn request_messages(&self) -> Dispatched<AppAction> {
        self.store.dispatch(inbox::request_messages(self.api.clone()))
    }

    pub fn request_polling(&self) -> Dispatched<AppAction> {
        self.store.dispatch(polling::request_polling(self.api.clone()))
    }

    /// Toggle one row's checkbox.
    pub fn toggle_message(&self, message: &Message) -> Dispatched<AppAction> {
        if self.store.with_state(|s| s.inbox.is_selected(message.id)) {
            self.store.dispatch(inbox::deselect_message(message))
        } else {
            self.store.dispatch(inbox::select_message(message))
        }
    }

    /// Open a message, selecting only that one.
    pub fn open_message(&self, message: &Message) -> Dispatched<AppAction> {
        self.store.dispatch(inbox::select_single_message(message))
    }

    /// The header checkbox.
    pub fn toggle_all(&self) -> Dispatched<AppAction> {
        if self.store.with_state(|s| s.inbox.is_all_selected()) {
            self.store.dispatch(inbox::deselect_all_messages())
        } else {
            self.store.dispatch(inbox::select_all_messages())
        }
    }
}
