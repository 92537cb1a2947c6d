// InboxApi - the backend the thunks talk to
//
// The real transport is out of scope; MockInboxApi answers with canned JSON
// bodies that are decoded the same way a real response would be.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

use crate::inbox::Message;
use crate::polling::InboxPolling;

pub const MESSAGES_PATH: &str = "/api/inbox/messages";
pub const POLLING_PATH: &str = "/api/inbox/polling";

/// Backend operations used by the inbox thunks.
#[async_trait]
pub trait InboxApi: Send + Sync {
    /// Fetch the current list of messages.
    async fn fetch_messages(&self) -> Result<Vec<Message>>;

    /// Ask whether new messages are available.
    async fn fetch_polling(&self) -> Result<InboxPolling>;
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {path} failed: {reason}")]
    Request { path: &'static str, reason: String },

    #[error("unexpected response body from {path}")]
    Decode {
        path: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(serde::Deserialize)]
struct MessagesBody {
    messages: Vec<Message>,
}

fn decode<T: DeserializeOwned>(path: &'static str, body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|source| ApiError::Decode { path, source }.into())
}

// =============================================================================
// Mock Inbox Api
// =============================================================================

/// In-memory backend with a fixed script of responses.
///
/// - polling answers `messages: true` on the 1st, 6th, 11th... call
/// - messages returns two messages, and a third one from the second call on
pub struct MockInboxApi {
    latency: Duration,
    messages_calls: AtomicUsize,
    polling_calls: AtomicUsize,
    fail_messages: AtomicBool,
}

impl MockInboxApi {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Delay every response by `latency`.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            messages_calls: AtomicUsize::new(0),
            polling_calls: AtomicUsize::new(0),
            fail_messages: AtomicBool::new(false),
        }
    }

    /// Make subsequent message requests fail.
    pub fn fail_messages(&self, fail: bool) {
        self.fail_messages.store(fail, Ordering::Relaxed);
    }

    pub fn messages_calls(&self) -> usize {
        self.messages_calls.load(Ordering::Relaxed)
    }

    pub fn polling_calls(&self) -> usize {
        self.polling_calls.load(Ordering::Relaxed)
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn messages_body(counter: usize) -> Value {
        let mut data = vec![
            json!({
                "id": 90001,
                "from": "zzz@gmail.com",
                "to": "aaa@gmail.com",
                "subject": "Hello, World",
                "content": "I just wanted to say, \"Hello, World\"",
            }),
            json!({
                "id": 90002,
                "from": "yyy@gmail.com",
                "to": "aaa@gmail.com",
                "subject": "Yo, World",
                "content": "I just wanted to say, \"Yo, World\"",
            }),
        ];
        if counter > 1 {
            data.push(json!({
                "id": 90003,
                "from": "xxx@gmail.com",
                "to": "aaa@gmail.com",
                "subject": "こんにちは",
                "content": "I just wanted to say, \"こんにちは、世界の皆さん\"",
            }));
        }
        json!({ "messages": data })
    }
}

impl Default for MockInboxApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InboxApi for MockInboxApi {
    async fn fetch_messages(&self) -> Result<Vec<Message>> {
        let counter = self.messages_calls.fetch_add(1, Ordering::Relaxed) + 1;
        info!(path = MESSAGES_PATH, counter, "mock api received request");
        self.delay().await;

        if self.fail_messages.load(Ordering::Relaxed) {
            return Err(ApiError::Request {
                path: MESSAGES_PATH,
                reason: "service unavailable".into(),
            }
            .into());
        }

        let body: MessagesBody = decode(MESSAGES_PATH, Self::messages_body(counter))?;
        Ok(body.messages)
    }

    async fn fetch_polling(&self) -> Result<InboxPolling> {
        let counter = self.polling_calls.fetch_add(1, Ordering::Relaxed) + 1;
        info!(path = POLLING_PATH, counter = counter % 5, "mock api received request");
        self.delay().await;

        decode(POLLING_PATH, json!({ "messages": counter % 5 == 1 }))
    }
}
