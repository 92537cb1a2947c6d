//! Test harness wiring a mock backend, a watched store and a live view.

use std::sync::Arc;
use std::time::Duration;

use inbox_demo::{AppStore, InboxApp, InboxView, MockInboxApi};
use stethoscope::testing::{init_test_tracing, DispatchRecorder};
use stethoscope::Watcher;

/// Mock api latency; long enough that receive actions land after the
/// triggering phase.
pub const API_LATENCY: Duration = Duration::from_millis(30);

pub struct TestHarness {
    pub watcher: Watcher,
    pub api: Arc<MockInboxApi>,
    pub app: InboxApp,
    pub view: InboxView,
    pub recorder: DispatchRecorder,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_api(MockInboxApi::with_latency(API_LATENCY))
    }

    pub fn with_api(api: MockInboxApi) -> Self {
        init_test_tracing();

        let watcher = Watcher::builder()
            .name("inbox-tests")
            .heartbeat(Duration::from_millis(10))
            .default_timeout(Duration::from_secs(2))
            .build()
            .expect("valid watcher config");
        let api = Arc::new(api);
        let recorder = DispatchRecorder::new();
        let app = InboxApp::new(
            api.clone(),
            vec![Arc::new(recorder.clone())],
            Some(watcher.interceptor()),
        );
        let view = InboxView::attach(app.store());

        Self {
            watcher,
            api,
            app,
            view,
            recorder,
        }
    }

    pub fn store(&self) -> &AppStore {
        self.app.store()
    }
}
