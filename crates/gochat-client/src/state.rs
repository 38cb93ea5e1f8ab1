//! Shared session state.
//!
//! One [`ClientState`] is shared by a connection manager and its two loops.
//! The session phase lives in a `watch` channel: every transition is a
//! compare-and-set under the channel lock, and waiters are woken when the
//! session terminates.
//!
//! ```text
//! Disconnected ──begin──▶ Pending ──success──▶ Connected
//!       │                    │                     │
//!       └──────terminate─────┴──fail / closed──────┴──▶ Terminated
//! ```

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No handshake sent yet.
    Disconnected,
    /// Handshake sent, waiting for `success`.
    Pending,
    /// Server accepted the handshake.
    Connected,
    /// Session over. Absorbing.
    Terminated,
}

impl SessionPhase {
    /// Whether the loops should keep running.
    pub fn is_running(self) -> bool {
        matches!(self, SessionPhase::Pending | SessionPhase::Connected)
    }
}

/// Point-in-time counters for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionMetrics {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub pongs_sent: u64,
    pub keepalives_sent: u64,
    pub malformed_frames: u64,
    pub unknown_frames: u64,
    pub chat_messages: u64,
    pub room_updates: u64,
    pub transport_errors: u64,
    /// Keep-alive ticks that found the peer silent past the warning threshold.
    pub idle_warnings: u64,
    /// Wall-clock start of the session (unix seconds).
    pub started_at: Option<i64>,
}

#[derive(Default)]
struct Counters {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    pongs_sent: AtomicU64,
    keepalives_sent: AtomicU64,
    malformed_frames: AtomicU64,
    unknown_frames: AtomicU64,
    chat_messages: AtomicU64,
    room_updates: AtomicU64,
    transport_errors: AtomicU64,
    idle_warnings: AtomicU64,
}

/// Synchronized state shared by the session tasks.
pub struct ClientState {
    phase: watch::Sender<SessionPhase>,
    last_activity: Mutex<Instant>,
    started_at: Mutex<Option<i64>>,
    counters: Counters,
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientState {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(SessionPhase::Disconnected);
        Self {
            phase,
            last_activity: Mutex::new(Instant::now()),
            started_at: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Watch phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.phase().is_running()
    }

    pub fn is_connected(&self) -> bool {
        self.phase() == SessionPhase::Connected
    }

    fn transition(&self, f: impl FnOnce(SessionPhase) -> Option<SessionPhase>) -> bool {
        self.phase.send_if_modified(|phase| match f(*phase) {
            Some(next) if next != *phase => {
                *phase = next;
                true
            }
            _ => false,
        })
    }

    /// `Disconnected -> Pending`: the handshake is on the wire and the loops may run.
    pub fn begin(&self) -> bool {
        let started = self.transition(|phase| match phase {
            SessionPhase::Disconnected => Some(SessionPhase::Pending),
            _ => None,
        });
        if started {
            *self.started_at.lock() = Some(chrono::Utc::now().timestamp());
            self.touch();
        }
        started
    }

    /// `Pending -> Connected` on a `success` frame. Never re-enters after termination.
    pub fn mark_connected(&self) -> bool {
        self.transition(|phase| match phase {
            SessionPhase::Pending => Some(SessionPhase::Connected),
            _ => None,
        })
    }

    /// End a running session (`fail` frame, peer close, exhausted budget).
    pub fn stop(&self) -> bool {
        self.transition(|phase| phase.is_running().then_some(SessionPhase::Terminated))
    }

    /// End the client instance from any phase.
    pub fn terminate(&self) -> bool {
        self.transition(|phase| match phase {
            SessionPhase::Terminated => None,
            _ => Some(SessionPhase::Terminated),
        })
    }

    /// Resolve once the session is terminated.
    pub async fn cancelled(&self) {
        let mut rx = self.phase.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|phase| *phase == SessionPhase::Terminated).await;
    }

    /// Record activity now. Never moves backwards.
    pub fn touch(&self) {
        let now = Instant::now();
        let mut last = self.last_activity.lock();
        if now > *last {
            *last = now;
        }
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_activity())
    }

    pub fn record_sent(&self) {
        self.counters.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.counters.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pong(&self) {
        self.counters.pongs_sent.fetch_add(1, Ordering::Relaxed);
        self.record_sent();
    }

    pub fn record_keepalive(&self) {
        self.counters.keepalives_sent.fetch_add(1, Ordering::Relaxed);
        self.record_sent();
    }

    pub fn record_malformed(&self) {
        self.counters.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown(&self) {
        self.counters.unknown_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chat_message(&self) {
        self.counters.chat_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_room_update(&self) {
        self.counters.room_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.counters.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_idle_warning(&self) {
        self.counters.idle_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn metrics(&self) -> SessionMetrics {
        let c = &self.counters;
        SessionMetrics {
            frames_sent: c.frames_sent.load(Ordering::Relaxed),
            frames_received: c.frames_received.load(Ordering::Relaxed),
            pongs_sent: c.pongs_sent.load(Ordering::Relaxed),
            keepalives_sent: c.keepalives_sent.load(Ordering::Relaxed),
            malformed_frames: c.malformed_frames.load(Ordering::Relaxed),
            unknown_frames: c.unknown_frames.load(Ordering::Relaxed),
            chat_messages: c.chat_messages.load(Ordering::Relaxed),
            room_updates: c.room_updates.load(Ordering::Relaxed),
            transport_errors: c.transport_errors.load(Ordering::Relaxed),
            idle_warnings: c.idle_warnings.load(Ordering::Relaxed),
            started_at: *self.started_at.lock(),
        }
    }
}

/// Consecutive-failure counter for one loop.
///
/// A limit of zero never exhausts.
#[derive(Debug)]
pub struct FailureBudget {
    limit: u32,
    consecutive: u32,
}

impl FailureBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            consecutive: 0,
        }
    }

    /// Count a failure. Returns `true` once the budget is exhausted.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.limit != 0 && self.consecutive >= self.limit
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = ClientState::new();
        assert_eq!(state.phase(), SessionPhase::Disconnected);
        assert!(!state.is_running());
        assert!(!state.is_connected());
        assert_eq!(state.metrics(), SessionMetrics::default());
    }

    #[test]
    fn test_happy_path_transitions() {
        let state = ClientState::new();

        assert!(!state.mark_connected());
        assert!(state.begin());
        assert!(state.is_running());
        assert!(!state.is_connected());
        assert!(state.metrics().started_at.is_some());

        assert!(state.mark_connected());
        assert!(state.is_connected());
        assert!(!state.mark_connected());

        assert!(state.stop());
        assert_eq!(state.phase(), SessionPhase::Terminated);
        assert!(!state.is_running());
        assert!(!state.is_connected());
    }

    #[test]
    fn test_terminated_is_absorbing() {
        let state = ClientState::new();
        state.begin();
        state.stop();

        assert!(!state.begin());
        assert!(!state.mark_connected());
        assert!(!state.stop());
        assert!(!state.terminate());
        assert_eq!(state.phase(), SessionPhase::Terminated);
    }

    #[test]
    fn test_stop_ignores_idle_client_but_terminate_does_not() {
        let state = ClientState::new();
        assert!(!state.stop());
        assert_eq!(state.phase(), SessionPhase::Disconnected);

        assert!(state.terminate());
        assert_eq!(state.phase(), SessionPhase::Terminated);
        assert!(!state.begin());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_is_monotonic() {
        let state = ClientState::new();
        let first = state.last_activity();

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(state.idle_for(), Duration::from_secs(3));

        state.touch();
        let second = state.last_activity();
        assert!(second >= first);
        assert_eq!(state.idle_for(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_cancelled_wakes_on_termination() {
        let state = std::sync::Arc::new(ClientState::new());
        state.begin();

        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.cancelled().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        state.stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_terminated() {
        let state = ClientState::new();
        state.terminate();
        tokio::time::timeout(Duration::from_millis(100), state.cancelled())
            .await
            .unwrap();
    }

    #[test]
    fn test_counters() {
        let state = ClientState::new();
        state.record_pong();
        state.record_keepalive();
        state.record_keepalive();
        state.record_malformed();
        state.record_received();

        let metrics = state.metrics();
        assert_eq!(metrics.pongs_sent, 1);
        assert_eq!(metrics.keepalives_sent, 2);
        assert_eq!(metrics.frames_sent, 3);
        assert_eq!(metrics.malformed_frames, 1);
        assert_eq!(metrics.frames_received, 1);
    }

    #[test]
    fn test_failure_budget() {
        let mut budget = FailureBudget::new(3);
        assert!(!budget.record_failure());
        assert!(!budget.record_failure());
        budget.reset();
        assert_eq!(budget.consecutive(), 0);
        assert!(!budget.record_failure());
        assert!(!budget.record_failure());
        assert!(budget.record_failure());
    }

    #[test]
    fn test_unbounded_budget() {
        let mut budget = FailureBudget::new(0);
        for _ in 0..1000 {
            assert!(!budget.record_failure());
        }
    }
}
