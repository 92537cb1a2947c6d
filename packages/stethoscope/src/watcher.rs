//! Watcher - deterministic waiting on a declared set of dispatched actions.
//!
//! The watcher is fed by a [`DispatchInterceptor`] and runs one session at a
//! time:
//!
//! ```text
//! listen_async(info)
//!     │
//!     ├─► acquire session lock (FIFO)
//!     ├─► install targets as the pending set
//!     ├─► triggering phase: act().await     (matching suppressed)
//!     ├─► re-check the last dispatched action
//!     └─► poll every heartbeat until pending is empty, a callback failed,
//!         or the heartbeat budget is spent
//!
//! store.dispatch(action)
//!     └─► interceptor ─► execute(dispatch, action)
//!                           ├─► record in-flight action
//!                           ├─► dispatch(action)      (reducer + subscribers)
//!                           └─► match against pending (first unclaimed wins)
//! ```
//!
//! # Guarantees
//!
//! - **Settled before matched**: a target's callback only runs after the real
//!   dispatch of its action returned, so every synchronous subscriber has
//!   already seen the new state
//! - **One session at a time**: concurrent `listen_async` calls queue in FIFO order
//! - **First match wins**: one dispatch consumes at most one target
//! - **Errors pass through**: trigger and callback errors are returned verbatim
//!
//! # Example
//!
//! ```ignore
//! use stethoscope::{ListenInfo, Target, Watcher};
//!
//! let watcher = Watcher::new();
//! let store = configure_store(watcher.interceptor());
//!
//! watcher
//!     .listen_async(
//!         ListenInfo::new(|| async {
//!             store.dispatch(thunks::request_messages());
//!             Ok(())
//!         })
//!         .target(Target::new(REQUEST_MESSAGES).on_matched(|| {
//!             anyhow::ensure!(view.contains("Loading..."));
//!             Ok(())
//!         }))
//!         .target(Target::new(RECEIVE_MESSAGES)),
//!     )
//!     .await?;
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::FutureExt;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use crate::action::{Action, SessionId};
use crate::config::WatcherConfig;
use crate::error::WatchError;
use crate::interceptor::DispatchInterceptor;
use crate::target::{ListenInfo, MatchCallback, Target};

// =============================================================================
// Session State
// =============================================================================

/// A target that has not completed yet.
struct PendingTarget {
    id: u64,
    action_type: String,
    /// Set once a dispatch matched this target; its callback may still run.
    claimed: bool,
    on_matched: Option<MatchCallback>,
}

/// The most recently started dispatch.
struct InFlight {
    seq: u64,
    action_type: String,
}

/// A target taken by one dispatch, ready to run its callback.
struct Claimed {
    session: SessionId,
    target_id: u64,
    callback: Option<MatchCallback>,
}

/// Mutable state of the current session, guarded by one mutex.
///
/// The triggering flag lives here so that deferring a match and the
/// post-trigger re-check are decided under the same lock.
#[derive(Default)]
struct SessionState {
    session: Option<SessionId>,
    pending: Vec<PendingTarget>,
    triggering: bool,
    dispatch_seq: u64,
    in_flight: Option<InFlight>,
    /// Dispatch already matched by the post-trigger re-check.
    rechecked: Option<u64>,
    /// First callback error of the session.
    failure: Option<anyhow::Error>,
}

impl SessionState {
    /// Claim the first unclaimed target waiting for `action_type`.
    fn claim(&mut self, action_type: &str) -> Option<Claimed> {
        let session = self.session?;
        let target = self
            .pending
            .iter_mut()
            .find(|target| !target.claimed && target.action_type == action_type)?;
        target.claimed = true;
        Some(Claimed {
            session,
            target_id: target.id,
            callback: target.on_matched.take(),
        })
    }
}

struct WatcherInner {
    name: Option<String>,
    config: WatcherConfig,
    session_lock: tokio::sync::Mutex<()>,
    next_target_id: AtomicU64,
    state: Mutex<SessionState>,
}

impl WatcherInner {
    /// Acquire the state lock, recovering from poison if necessary.
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// RAII guard for the installed session.
///
/// Clears the pending set and the triggering flag on drop, so a session that
/// ends by error, timeout or cancellation leaves nothing behind for the next.
struct ActiveSession<'a> {
    inner: &'a WatcherInner,
}

impl<'a> ActiveSession<'a> {
    fn install(inner: &'a WatcherInner, session: SessionId, targets: Vec<Target>) -> Self {
        let pending: Vec<PendingTarget> = targets
            .into_iter()
            .map(|target| PendingTarget {
                id: inner.next_target_id.fetch_add(1, Ordering::Relaxed),
                action_type: target.action_type,
                claimed: false,
                on_matched: target.on_matched,
            })
            .collect();

        let stale = {
            let mut state = inner.lock_state();
            state.session = Some(session);
            state.in_flight = None;
            state.rechecked = None;
            state.failure = None;
            std::mem::replace(&mut state.pending, pending)
        };
        drop(stale);

        Self { inner }
    }
}

impl Drop for ActiveSession<'_> {
    fn drop(&mut self) {
        let stale = {
            let mut state = self.inner.lock_state();
            state.triggering = false;
            state.session = None;
            state.failure = None;
            std::mem::take(&mut state.pending)
        };
        // Callbacks are dropped outside the lock; their captures may dispatch.
        drop(stale);
    }
}

/// RAII guard for the triggering phase flag.
struct TriggeringPhase<'a> {
    inner: &'a WatcherInner,
}

impl<'a> TriggeringPhase<'a> {
    fn enter(inner: &'a WatcherInner) -> Self {
        inner.lock_state().triggering = true;
        Self { inner }
    }

    /// End the phase and claim a target for the last dispatched action.
    ///
    /// Done under one lock: a dispatch whose matching step runs after this
    /// point sees that it was already re-checked and does not match again.
    fn finish(self) -> Option<(String, Claimed)> {
        let mut state = self.inner.lock_state();
        state.triggering = false;
        let (seq, action_type) = state
            .in_flight
            .as_ref()
            .map(|marker| (marker.seq, marker.action_type.clone()))?;
        state.rechecked = Some(seq);
        let claimed = state.claim(&action_type)?;
        Some((action_type, claimed))
    }
}

impl Drop for TriggeringPhase<'_> {
    fn drop(&mut self) {
        self.inner.lock_state().triggering = false;
    }
}

// =============================================================================
// Watcher
// =============================================================================

/// Waits for a declared set of actions to be dispatched and settled.
///
/// Cloning is cheap; clones share the same sessions and state.
#[derive(Clone)]
pub struct Watcher {
    inner: Arc<WatcherInner>,
}

impl Watcher {
    /// Create a watcher with the default configuration.
    pub fn new() -> Self {
        Self::from_parts(None, WatcherConfig::default())
    }

    /// Create a named watcher with the default configuration.
    ///
    /// The name only appears in log output.
    pub fn named(name: impl Into<String>) -> Self {
        Self::from_parts(Some(name.into()), WatcherConfig::default())
    }

    /// Start building a watcher.
    pub fn builder() -> WatcherBuilder {
        WatcherBuilder::default()
    }

    fn from_parts(name: Option<String>, config: WatcherConfig) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                name,
                config,
                session_lock: tokio::sync::Mutex::new(()),
                next_target_id: AtomicU64::new(0),
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    /// A pipeline stage that feeds this watcher.
    pub fn interceptor(&self) -> DispatchInterceptor {
        DispatchInterceptor::new(self.clone())
    }

    /// The watcher's name, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// The timing configuration.
    pub fn config(&self) -> &WatcherConfig {
        &self.inner.config
    }

    /// Number of targets of the current session that have not completed.
    ///
    /// Targets whose callback is still running count as pending.
    pub fn pending_count(&self) -> usize {
        self.inner.lock_state().pending.len()
    }

    /// Identifiers of the targets that have not completed, in order.
    pub fn pending_action_types(&self) -> Vec<String> {
        self.inner
            .lock_state()
            .pending
            .iter()
            .map(|target| target.action_type.clone())
            .collect()
    }

    /// Returns true while a session is installed.
    pub fn is_listening(&self) -> bool {
        self.inner.lock_state().session.is_some()
    }

    /// Returns true while a session's triggering operation is running.
    pub fn is_triggering(&self) -> bool {
        self.inner.lock_state().triggering
    }

    /// Identifier of the most recently dispatched action.
    pub fn last_action_type(&self) -> Option<String> {
        self.inner
            .lock_state()
            .in_flight
            .as_ref()
            .map(|marker| marker.action_type.clone())
    }

    fn display_name(&self) -> &str {
        self.inner.name.as_deref().unwrap_or("stethoscope")
    }

    // -------------------------------------------------------------------------
    // Dispatch path
    // -------------------------------------------------------------------------

    /// Intercepted dispatch entry point.
    ///
    /// Records the action as in flight, runs the real `dispatch`, then runs
    /// the matching step, and returns whatever `dispatch` returned. Nested
    /// calls from inside `dispatch` are expected; they settle and match first.
    pub fn execute<A, R, F>(&self, dispatch: F, action: A) -> R
    where
        A: Action,
        F: FnOnce(A) -> R,
    {
        let action_type = action.action_type().to_owned();
        let seq = {
            let mut state = self.inner.lock_state();
            state.dispatch_seq += 1;
            let seq = state.dispatch_seq;
            state.in_flight = Some(InFlight {
                seq,
                action_type: action_type.clone(),
            });
            seq
        };

        trace!(watcher = self.display_name(), action_type = %action_type, "starting dispatching action");
        let result = dispatch(action);
        self.on_dispatch(seq, &action_type);
        trace!(watcher = self.display_name(), action_type = %action_type, "finished dispatching action");

        result
    }

    /// Matching step for one settled dispatch.
    fn on_dispatch(&self, seq: u64, action_type: &str) {
        let claimed = {
            let mut state = self.inner.lock_state();
            if state.triggering {
                trace!(action_type, "triggering phase active, matching deferred");
                return;
            }
            if state.rechecked == Some(seq) {
                trace!(action_type, "already matched by the post-trigger re-check");
                return;
            }
            state.claim(action_type)
        };
        if let Some(claimed) = claimed {
            self.run_hook(action_type, claimed);
        }
    }

    /// Run the callback of a claimed target. The target is removed once the
    /// callback has completed.
    ///
    /// A panicking callback completes its target with
    /// [`WatchError::CallbackPanicked`].
    fn run_hook(&self, action_type: &str, claimed: Claimed) {
        let Claimed {
            session,
            target_id,
            callback,
        } = claimed;

        debug!(%session, action_type, "target matched");

        let Some(callback) = callback else {
            self.complete(session, target_id, Ok(()));
            return;
        };

        // No lock is held here: the callback may dispatch reentrantly.
        let fut = match std::panic::catch_unwind(AssertUnwindSafe(callback)) {
            Ok(fut) => fut,
            Err(panic) => {
                self.complete(session, target_id, Err(callback_panicked(action_type, &*panic)));
                return;
            }
        };
        let mut fut = AssertUnwindSafe(fut).catch_unwind();
        if let Some(result) = (&mut fut).now_or_never() {
            self.complete(session, target_id, settle(action_type, result));
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let watcher = self.clone();
                let action_type = action_type.to_owned();
                runtime.spawn(async move {
                    let result = fut.await;
                    watcher.complete(session, target_id, settle(&action_type, result));
                });
            }
            Err(_) => {
                warn!(%session, action_type, "async callback suspended outside of a tokio runtime");
                let err = WatchError::NoRuntime {
                    action_type: action_type.to_owned(),
                };
                self.complete(session, target_id, Err(err.into()));
            }
        }
    }

    /// Remove a finished target and record its failure, if any.
    fn complete(&self, session: SessionId, target_id: u64, result: Result<()>) {
        let mut state = self.inner.lock_state();
        if state.session != Some(session) {
            drop(state);
            debug!(%session, "ignoring callback completion from a finished session");
            return;
        }

        state.pending.retain(|target| target.id != target_id);
        let remaining = state.pending.len();

        match result {
            Ok(()) => {
                drop(state);
                debug!(%session, remaining, "target completed");
            }
            Err(e) => {
                let first = state.failure.is_none();
                let message = format!("{e:#}");
                if first {
                    state.failure = Some(e);
                }
                drop(state);
                error!(%session, error = %message, first, "match callback failed");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    /// Run a triggering operation and wait until every target has matched.
    ///
    /// Sessions on the same watcher never overlap: a call issued while another
    /// session is active waits for it to finish (successfully or not).
    ///
    /// # Returns
    ///
    /// - `Ok(())` once the pending set is empty
    /// - the trigger's or a callback's error, unchanged
    /// - [`WatchError::Timeout`] when more than `floor(timeout / heartbeat)`
    ///   heartbeats pass with targets still pending
    pub async fn listen_async<F, Fut>(&self, info: ListenInfo<F>) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let _session_lock = self.inner.session_lock.lock().await;

        let session = SessionId::new();
        let timeout = info.timeout.unwrap_or(self.inner.config.default_timeout);
        let span = info_span!("listen", watcher = self.display_name(), %session);

        self.run_session(session, info.act, info.targets, timeout)
            .instrument(span)
            .await
    }

    async fn run_session<F, Fut>(
        &self,
        session: SessionId,
        act: F,
        targets: Vec<Target>,
        timeout: Duration,
    ) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let started = Instant::now();
        let target_count = targets.len();
        let _active = ActiveSession::install(&self.inner, session, targets);

        info!(
            targets = target_count,
            timeout_ms = timeout.as_millis() as u64,
            "starting triggering"
        );
        let phase = TriggeringPhase::enter(&self.inner);
        if let Err(e) = act().await {
            drop(phase);
            warn!(error = %e, "triggering operation failed");
            return Err(e);
        }

        // Covers a target whose only action was dispatched during the phase.
        if let Some((action_type, claimed)) = phase.finish() {
            self.run_hook(&action_type, claimed);
        }
        info!("finished triggering");

        let heartbeat = self.inner.config.heartbeat;
        let max_count = self.inner.config.max_heartbeats(timeout);
        let mut counter: u64 = 0;

        loop {
            {
                let mut state = self.inner.lock_state();
                if let Some(e) = state.failure.take() {
                    return Err(e);
                }
                if state.pending.is_empty() {
                    break;
                }
            }

            debug!(counter, max_count, "waiting... ({} / {})", counter, max_count);
            if counter > max_count {
                let err = WatchError::Timeout {
                    timeout,
                    pending: self.pending_action_types(),
                };
                error!(error = %err, "session timed out");
                return Err(err.into());
            }

            tokio::time::sleep(heartbeat).await;
            counter += 1;
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            heartbeats = counter,
            "all targets matched"
        );
        Ok(())
    }
}

/// Fold a caught panic into the callback's result.
fn settle(action_type: &str, result: std::thread::Result<Result<()>>) -> Result<()> {
    result.unwrap_or_else(|panic| Err(callback_panicked(action_type, &*panic)))
}

fn callback_panicked(action_type: &str, panic: &(dyn Any + Send)) -> anyhow::Error {
    let message = if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    WatchError::CallbackPanicked {
        action_type: action_type.to_owned(),
        message,
    }
    .into()
}

impl Default for Watcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Watcher Builder
// =============================================================================

/// Builder for a [`Watcher`] with a custom name or timing.
///
/// # Example
///
/// ```ignore
/// let watcher = Watcher::builder()
///     .name("inbox")
///     .heartbeat(Duration::from_millis(10))
///     .default_timeout(Duration::from_secs(1))
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct WatcherBuilder {
    name: Option<String>,
    config: WatcherConfig,
}

impl WatcherBuilder {
    /// Set the name used in log output.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the whole configuration (e.g. one loaded from the environment).
    pub fn config(mut self, config: WatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the polling interval.
    pub fn heartbeat(mut self, heartbeat: Duration) -> Self {
        self.config.heartbeat = heartbeat;
        self
    }

    /// Set the timeout used by sessions that do not set one.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    /// Validate the configuration and build the watcher.
    pub fn build(self) -> Result<Watcher, WatchError> {
        self.config.validate()?;
        Ok(Watcher::from_parts(self.name, self.config))
    }
}
