// InboxView - text rendering of the app state
//
// Subscribed to the store, so it re-renders synchronously on every reduction
// and is always up to date when a dispatch returns.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use stethoscope::SubscriptionId;

use crate::app::{AppState, AppStore};

pub const LOADING: &str = "Loading...";
pub const LOAD_MESSAGES: &str = "Load messages";
pub const REFRESH: &str = "↺";

/// Render the state into display lines.
pub fn render(state: &AppState) -> Vec<String> {
    let inbox = &state.inbox;
    let mut lines = vec![
        format!("{REFRESH} Inbox"),
        format!("[{}] From | Subject", checkbox(inbox.is_all_selected())),
    ];

    if let Some(error) = &inbox.messages.error {
        lines.push(error.clone());
    } else if inbox.messages.loading {
        lines.push(LOADING.to_string());
    } else if inbox.messages.data.is_empty() {
        lines.push(LOAD_MESSAGES.to_string());
    } else {
        for message in &inbox.messages.data {
            lines.push(format!(
                "[{}] {} | {}",
                checkbox(inbox.is_selected(message.id)),
                message.from,
                message.subject
            ));
        }
    }
    lines
}

fn checkbox(checked: bool) -> char {
    if checked {
        'x'
    } else {
        ' '
    }
}

/// Live rendering of a store.
#[derive(Clone)]
pub struct InboxView {
    lines: Arc<Mutex<Vec<String>>>,
    renders: Arc<AtomicUsize>,
    subscription: SubscriptionId,
}

impl InboxView {
    /// Render the current state and re-render on every change.
    pub fn attach(store: &AppStore) -> Self {
        let lines = Arc::new(Mutex::new(store.with_state(render)));
        let renders = Arc::new(AtomicUsize::new(1));

        let subscription = store.subscribe({
            let lines = lines.clone();
            let renders = renders.clone();
            move |state: &AppState| {
                let rendered = render(state);
                *lock(&lines) = rendered;
                renders.fetch_add(1, Ordering::Relaxed);
            }
        });

        Self {
            lines,
            renders,
            subscription,
        }
    }

    /// Stop following the store.
    pub fn detach(&self, store: &AppStore) -> bool {
        store.unsubscribe(self.subscription)
    }

    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }

    /// Number of lines containing `text`.
    pub fn count_text(&self, text: &str) -> usize {
        lock(&self.lines).iter().filter(|line| line.contains(text)).count()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.count_text(text) > 0
    }

    /// Number of renders so far, the initial one included.
    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::Relaxed)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
