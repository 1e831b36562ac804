//! Heartbeat probing and liveness tracking.
//!
//! Every interval the prober sends the client a `ping` carrying a fresh
//! stamp and records it as outstanding. A `pong` echoing a stamp clears that
//! probe and every older one. A connection with more outstanding probes than
//! the configured maximum is dead.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mooz_core::{ClientId, Message};
use parking_lot::Mutex;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::router::MessageRouter;

/// Outcome of the prober loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// Too many probes went unanswered.
    TimedOut,
    /// The session was cancelled externally.
    Cancelled,
}

/// Outstanding probe stamps for one connection.
///
/// Shared between the prober (records) and the reader (acknowledges).
#[derive(Debug)]
pub struct HeartbeatTracker {
    state: Mutex<TrackerState>,
    max_outstanding: usize,
}

#[derive(Debug, Default)]
struct TrackerState {
    outstanding: BTreeSet<i64>,
    last_stamp: i64,
}

impl HeartbeatTracker {
    /// Create a tracker that declares the connection dead once more than
    /// `max_outstanding` probes are unanswered.
    pub fn new(max_outstanding: usize) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            max_outstanding,
        }
    }

    /// Record a new probe stamped with the current wall clock (Unix millis).
    pub fn record_probe(&self) -> i64 {
        self.record_probe_at(Utc::now().timestamp_millis())
    }

    /// Record a probe stamped `now`, bumped so stamps strictly increase.
    pub fn record_probe_at(&self, now: i64) -> i64 {
        let mut state = self.state.lock();
        let stamp = now.max(state.last_stamp.saturating_add(1));
        state.last_stamp = stamp;
        let _ = state.outstanding.insert(stamp);
        stamp
    }

    /// Acknowledge probe `stamp`, clearing it and every older probe.
    ///
    /// Stamps that were never issued (or already cleared) are ignored.
    /// Returns the number of probes cleared.
    pub fn acknowledge(&self, stamp: i64) -> usize {
        let mut state = self.state.lock();
        if !state.outstanding.contains(&stamp) {
            return 0;
        }
        let mut newer = state.outstanding.split_off(&stamp);
        let _ = newer.remove(&stamp);
        let cleared = state.outstanding.len() + 1;
        state.outstanding = newer;
        cleared
    }

    /// Number of unanswered probes.
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    /// Whether the unanswered count exceeds the maximum.
    pub fn is_dead(&self) -> bool {
        self.outstanding() > self.max_outstanding
    }
}

/// Run the prober role for `client_id` until cancelled or dead.
///
/// The first probe goes out one `interval` after start. Each tick checks
/// liveness before probing, so with a maximum of N the connection is
/// declared dead on the tick after the (N+1)th unanswered probe.
pub async fn run_prober(
    client_id: ClientId,
    tracker: Arc<HeartbeatTracker>,
    router: MessageRouter,
    interval: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticks = time::interval_at(Instant::now() + interval, interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            _ = ticks.tick() => {}
        }

        if tracker.is_dead() {
            return HeartbeatResult::TimedOut;
        }
        let stamp = tracker.record_probe();
        trace!(client_id = %client_id, stamp, "probe");
        let _ = router
            .send(&client_id, Message::ping(client_id.clone(), stamp))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::endpoint::ClientEndpoint;
    use crate::hub::registry::ClientRegistry;
    use mooz_core::MessageType;
    use tokio::sync::mpsc;

    #[test]
    fn stamps_strictly_increase() {
        let tracker = HeartbeatTracker::new(5);
        let a = tracker.record_probe_at(1000);
        let b = tracker.record_probe_at(1000);
        let c = tracker.record_probe_at(900);
        assert_eq!(a, 1000);
        assert_eq!(b, 1001);
        assert_eq!(c, 1002);
        assert_eq!(tracker.outstanding(), 3);
    }

    #[test]
    fn wall_clock_stamps_are_unique() {
        let tracker = HeartbeatTracker::new(100);
        let stamps: Vec<i64> = (0..50).map(|_| tracker.record_probe()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(tracker.outstanding(), 50);
    }

    #[test]
    fn acknowledge_clears_stamp_and_older() {
        let tracker = HeartbeatTracker::new(5);
        for t in [10, 20, 30, 40] {
            let _ = tracker.record_probe_at(t);
        }
        assert_eq!(tracker.acknowledge(30), 3);
        assert_eq!(tracker.outstanding(), 1);
        assert_eq!(tracker.acknowledge(40), 1);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn acknowledge_unknown_stamp_is_ignored() {
        let tracker = HeartbeatTracker::new(5);
        let _ = tracker.record_probe_at(10);
        let _ = tracker.record_probe_at(20);
        assert_eq!(tracker.acknowledge(15), 0);
        assert_eq!(tracker.acknowledge(999), 0);
        assert_eq!(tracker.outstanding(), 2);
    }

    #[test]
    fn acknowledge_twice_is_noop() {
        let tracker = HeartbeatTracker::new(5);
        let t = tracker.record_probe_at(10);
        assert_eq!(tracker.acknowledge(t), 1);
        assert_eq!(tracker.acknowledge(t), 0);
    }

    #[test]
    fn dead_only_above_maximum() {
        let tracker = HeartbeatTracker::new(5);
        for t in 1..=5 {
            let _ = tracker.record_probe_at(t);
        }
        assert!(!tracker.is_dead());
        let _ = tracker.record_probe_at(6);
        assert!(tracker.is_dead());
        let _ = tracker.acknowledge(6);
        assert!(!tracker.is_dead());
    }

    async fn registered(id: &str) -> (MessageRouter, mpsc::Receiver<Message>) {
        let registry = Arc::new(ClientRegistry::new());
        let (ep, rx) = ClientEndpoint::channel(ClientId::from(id), 64);
        registry.register(ep).await;
        (MessageRouter::new(registry), rx)
    }

    #[tokio::test]
    async fn prober_cancelled() {
        let (router, _rx) = registered("c1").await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_prober(
            ClientId::from("c1"),
            Arc::new(HeartbeatTracker::new(5)),
            router,
            Duration::from_secs(100),
            cancel,
        )
        .await;
        assert_eq!(result, HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_times_out_after_six_probes() {
        let (router, mut rx) = registered("c1").await;
        let tracker = Arc::new(HeartbeatTracker::new(5));

        let result = run_prober(
            ClientId::from("c1"),
            tracker.clone(),
            router,
            Duration::from_secs(3),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result, HeartbeatResult::TimedOut);

        let mut pings = 0;
        while let Ok(msg) = rx.try_recv() {
            assert_eq!(msg.kind, MessageType::Ping);
            assert_eq!(msg.to, Some(ClientId::from("c1")));
            pings += 1;
        }
        assert_eq!(pings, 6);
        assert_eq!(tracker.outstanding(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn answering_client_stays_alive() {
        let (router, mut rx) = registered("c1").await;
        let tracker = Arc::new(HeartbeatTracker::new(1));
        let cancel = CancellationToken::new();

        let prober = tokio::spawn(run_prober(
            ClientId::from("c1"),
            tracker.clone(),
            router,
            Duration::from_secs(3),
            cancel.clone(),
        ));

        for _ in 0..10 {
            let ping = rx.recv().await.unwrap();
            let stamp = ping.probe_stamp().unwrap();
            assert_eq!(tracker.acknowledge(stamp), 1);
        }
        cancel.cancel();
        assert_eq!(prober.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn first_probe_waits_one_interval() {
        let (router, mut rx) = registered("c1").await;
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let prober = tokio::spawn(run_prober(
            ClientId::from("c1"),
            Arc::new(HeartbeatTracker::new(5)),
            router,
            Duration::from_secs(3),
            cancel.clone(),
        ));

        let _ = rx.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
        cancel.cancel();
        let _ = prober.await.unwrap();
    }
}
