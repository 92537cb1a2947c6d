// PollingClient - periodic background polling of the inbox

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::app::InboxApp;

pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(1000);

pub struct PollingClient {
    app: InboxApp,
    interval: Duration,
}

impl PollingClient {
    pub fn new(app: InboxApp) -> Self {
        Self::with_interval(app, DEFAULT_POLLING_INTERVAL)
    }

    pub fn with_interval(app: InboxApp, interval: Duration) -> Self {
        Self { app, interval }
    }

    /// Dispatch one polling request.
    pub fn poll(&self) {
        debug!("polling inbox");
        self.app.request_polling();
    }

    /// Poll every interval until the handle is stopped or dropped.
    ///
    /// The first poll happens one interval after start.
    pub fn start(self) -> PollingHandle {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + self.interval,
                self.interval,
            );
            loop {
                ticker.tick().await;
                let finished = self.app.request_polling();
                if let Err(e) = finished.wait().await {
                    warn!(error = %e, "polling request failed");
                }
            }
        });
        PollingHandle { task }
    }
}

/// Stops the polling loop on [`stop`](Self::stop) or drop.
pub struct PollingHandle {
    task: JoinHandle<()>,
}

impl PollingHandle {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
