//! Session lifecycle for a single connected client.
//!
//! A session runs three concurrent roles over one connection:
//!
//! - **writer**: drains the client's endpoint queue onto the transport
//! - **reader**: consumes inbound messages, acknowledging `pong`s and
//!   relaying everything else to its addressee
//! - **prober**: sends a `ping` every heartbeat interval and gives up on
//!   the client once too many go unanswered
//!
//! Any role stopping cancels the session. The session then announces
//! `left` to the remaining clients (unless the whole hub is shutting down),
//! unregisters, and waits for all three roles to finish.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use metrics::{counter, gauge, histogram};
use mooz_core::{ClientId, Message, MessageType};
use tokio::sync::{Barrier, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::endpoint::ClientEndpoint;
use super::heartbeat::{HeartbeatResult, HeartbeatTracker, run_prober};
use super::router::MessageRouter;
use super::transport::{MessageReader, MessageWriter};
use crate::config::HubConfig;
use crate::metrics::{
    HUB_CONNECTIONS_ACTIVE, HUB_CONNECTIONS_TOTAL, HUB_DISCONNECTIONS_TOTAL,
    HUB_HEARTBEAT_TIMEOUTS_TOTAL, HUB_SESSION_DURATION_SECONDS,
};

/// Number of parties at the start barrier: three roles and the session.
const START_PARTIES: usize = 4;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The hub is shutting down; no `left` was announced.
    Shutdown,
    /// The client went away or was dropped; `left` was announced.
    Disconnected,
}

impl SessionEnd {
    fn as_str(self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown",
            Self::Disconnected => "disconnected",
        }
    }
}

/// One client's session.
pub struct ClientSession {
    id: ClientId,
    router: MessageRouter,
    config: HubConfig,
    shutdown: CancellationToken,
}

impl ClientSession {
    /// Create a session with a fresh client id.
    ///
    /// `shutdown` is the hub-wide token; the session's own token is derived
    /// from it.
    pub fn new(router: MessageRouter, config: HubConfig, shutdown: CancellationToken) -> Self {
        Self {
            id: ClientId::new(),
            router,
            config,
            shutdown,
        }
    }

    /// The id assigned to this session's client.
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Run the session to completion.
    #[instrument(skip_all, fields(client_id = %self.id))]
    pub async fn run<R, W>(self, reader: R, writer: W) -> SessionEnd
    where
        R: MessageReader,
        W: MessageWriter,
    {
        let Self {
            id,
            router,
            config,
            shutdown,
        } = self;
        let connected_at = Instant::now();

        let (endpoint, outbound) = ClientEndpoint::channel(id.clone(), config.send_queue_capacity);
        router.registry().register(endpoint.clone()).await;
        info!("client connected");
        counter!(HUB_CONNECTIONS_TOTAL).increment(1);
        gauge!(HUB_CONNECTIONS_ACTIVE).increment(1.0);

        let cancel = shutdown.child_token();
        let tracker = Arc::new(HeartbeatTracker::new(config.max_outstanding_probes));
        let started = Arc::new(Barrier::new(START_PARTIES));

        let roles = [
            spawn_role(
                &started,
                &cancel,
                run_writer(writer, outbound, cancel.clone()),
            ),
            spawn_role(
                &started,
                &cancel,
                run_reader(
                    reader,
                    id.clone(),
                    router.clone(),
                    tracker.clone(),
                    cancel.clone(),
                ),
            ),
            spawn_role(&started, &cancel, {
                let prober = run_prober(
                    id.clone(),
                    tracker,
                    router.clone(),
                    config.heartbeat_interval,
                    cancel.clone(),
                );
                async move {
                    if prober.await == HeartbeatResult::TimedOut {
                        warn!("heartbeat timed out, dropping client");
                        counter!(HUB_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
                    }
                }
            }),
        ];

        let _ = started.wait().await;
        let _ = router.send(&id, Message::initialized()).await;
        let _ = router.broadcast(&Message::joined(id.clone()), Some(&id)).await;

        let end = tokio::select! {
            biased;
            () = shutdown.cancelled() => SessionEnd::Shutdown,
            () = cancel.cancelled() => SessionEnd::Disconnected,
        };
        cancel.cancel();

        if end == SessionEnd::Disconnected {
            let _ = router.broadcast(&Message::left(id.clone()), Some(&id)).await;
        }
        if !router.registry().unregister(&id).await {
            debug!("client already unregistered");
        }

        for joined in join_all(roles).await {
            if let Err(e) = joined {
                warn!(error = %e, "session role failed");
            }
        }

        let dropped = endpoint.drop_count();
        info!(
            reason = end.as_str(),
            dropped_messages = dropped,
            "client disconnected"
        );
        counter!(HUB_DISCONNECTIONS_TOTAL, "reason" => end.as_str()).increment(1);
        gauge!(HUB_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(HUB_SESSION_DURATION_SECONDS).record(connected_at.elapsed().as_secs_f64());
        end
    }
}

/// Spawn a role that starts at the barrier and cancels the session when it
/// stops, whether it returns or panics.
fn spawn_role<F>(started: &Arc<Barrier>, cancel: &CancellationToken, role: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let started = started.clone();
    let guard = cancel.clone().drop_guard();
    tokio::spawn(async move {
        let _guard = guard;
        let _ = started.wait().await;
        role.await;
    })
}

/// Drain the outbound queue onto the transport until cancelled or the
/// transport fails, then close it.
async fn run_writer<W: MessageWriter>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = outbound.recv() => match next {
                Some(message) => message,
                None => break,
            },
        };
        if let Err(e) = writer.send(&message).await {
            debug!(error = %e, "send failed");
            break;
        }
    }
    if let Err(e) = writer.close().await {
        debug!(error = %e, "close failed");
    }
}

/// Consume inbound messages until cancelled, the transport fails, or the
/// client violates the heartbeat protocol.
async fn run_reader<R: MessageReader>(
    mut reader: R,
    id: ClientId,
    router: MessageRouter,
    tracker: Arc<HeartbeatTracker>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            received = reader.receive() => received,
        };
        let mut message = match received {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "receive ended");
                return;
            }
        };

        if message.kind == MessageType::Pong {
            match message.probe_stamp() {
                Ok(stamp) => {
                    let cleared = tracker.acknowledge(stamp);
                    debug!(stamp, cleared, "pong");
                }
                Err(e) => {
                    warn!(error = %e, "protocol violation, dropping client");
                    return;
                }
            }
            continue;
        }

        message.from = Some(id.clone());
        match message.to.clone() {
            Some(to) => {
                let _ = router.send(&to, message).await;
            }
            None => debug!(message_type = %message.kind, "message without recipient dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::registry::ClientRegistry;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use mooz_core::TransportError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct ChannelReader(mpsc::UnboundedReceiver<Result<Message, TransportError>>);

    #[async_trait]
    impl MessageReader for ChannelReader {
        async fn receive(&mut self) -> Result<Message, TransportError> {
            self.0.recv().await.unwrap_or(Err(TransportError::Closed))
        }
    }

    struct ChannelWriter {
        tx: mpsc::UnboundedSender<Message>,
        closed: Arc<AtomicBool>,
        fail_sends: bool,
    }

    #[async_trait]
    impl MessageWriter for ChannelWriter {
        async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
            if self.fail_sends {
                return Err(TransportError::Io("broken pipe".into()));
            }
            self.tx
                .send(message.clone())
                .map_err(|_| TransportError::Closed)
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Hub {
        router: MessageRouter,
        shutdown: CancellationToken,
        config: HubConfig,
    }

    impl Hub {
        fn new() -> Self {
            Self {
                router: MessageRouter::new(Arc::new(ClientRegistry::new())),
                shutdown: CancellationToken::new(),
                config: HubConfig {
                    heartbeat_interval: Duration::from_secs(600),
                    ..HubConfig::default()
                },
            }
        }

        fn spawn(&self, fail_sends: bool) -> TestClient {
            let session = ClientSession::new(
                self.router.clone(),
                self.config.clone(),
                self.shutdown.clone(),
            );
            let id = session.id().clone();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let closed = Arc::new(AtomicBool::new(false));
            let writer = ChannelWriter {
                tx: out_tx,
                closed: closed.clone(),
                fail_sends,
            };
            let handle = tokio::spawn(session.run(ChannelReader(in_rx), writer));
            TestClient {
                id,
                inbound: in_tx,
                outbound: out_rx,
                closed,
                handle,
            }
        }

        async fn connect(&self) -> TestClient {
            let mut client = self.spawn(false);
            let first = client.next().await;
            assert_eq!(first.kind, MessageType::Initialized);
            client
        }
    }

    struct TestClient {
        id: ClientId,
        inbound: mpsc::UnboundedSender<Result<Message, TransportError>>,
        outbound: mpsc::UnboundedReceiver<Message>,
        closed: Arc<AtomicBool>,
        handle: JoinHandle<SessionEnd>,
    }

    impl TestClient {
        fn push(&self, message: Message) {
            self.inbound.send(Ok(message)).unwrap();
        }

        async fn next(&mut self) -> Message {
            timeout(TIMEOUT, self.outbound.recv())
                .await
                .expect("timed out waiting for message")
                .expect("writer stopped")
        }

        async fn finish(self) -> SessionEnd {
            timeout(TIMEOUT, self.handle)
                .await
                .expect("session did not finish")
                .unwrap()
        }
    }

    #[tokio::test]
    async fn first_message_is_initialized() {
        let hub = Hub::new();
        let client = hub.connect().await;
        assert!(hub.router.registry().lookup(&client.id).await.is_some());
    }

    #[tokio::test]
    async fn others_see_joined() {
        let hub = Hub::new();
        let mut a = hub.connect().await;
        let b = hub.connect().await;

        let joined = a.next().await;
        assert_eq!(joined.kind, MessageType::Joined);
        assert_eq!(joined.from, Some(b.id.clone()));
    }

    #[tokio::test]
    async fn addressed_message_is_relayed_with_sender() {
        let hub = Hub::new();
        let mut a = hub.connect().await;
        let mut b = hub.connect().await;
        let _ = a.next().await; // joined(b)

        a.push(
            Message::new("chat")
                .addressed_to(b.id.clone())
                .with_data("hello"),
        );
        let got = b.next().await;
        assert_eq!(got.kind, MessageType::Custom("chat".into()));
        assert_eq!(got.to, Some(b.id.clone()));
        assert_eq!(got.from, Some(a.id.clone()));
        assert_eq!(got.data, Some(serde_json::json!("hello")));
    }

    #[tokio::test]
    async fn forged_sender_is_overwritten() {
        let hub = Hub::new();
        let mut a = hub.connect().await;
        let mut b = hub.connect().await;
        let _ = a.next().await;

        a.push(
            Message::new("chat")
                .addressed_to(b.id.clone())
                .sent_by(ClientId::from("mallory")),
        );
        assert_eq!(b.next().await.from, Some(a.id.clone()));
    }

    #[tokio::test]
    async fn relay_preserves_order() {
        let hub = Hub::new();
        let mut a = hub.connect().await;
        let mut b = hub.connect().await;
        let _ = a.next().await;

        for i in 0..20 {
            a.push(Message::new("seq").addressed_to(b.id.clone()).with_data(i));
        }
        for i in 0..20 {
            assert_eq!(b.next().await.data, Some(serde_json::json!(i)));
        }
    }

    #[tokio::test]
    async fn unaddressed_and_unknown_messages_are_dropped() {
        let hub = Hub::new();
        let mut a = hub.connect().await;
        let mut b = hub.connect().await;
        let _ = a.next().await;

        a.push(Message::new("chat"));
        a.push(Message::new("chat").addressed_to(ClientId::from("ghost")));
        a.push(Message::new("marker").addressed_to(b.id.clone()));

        // Only the marker arrives, and the sender's session is still up.
        assert_eq!(b.next().await.kind, MessageType::Custom("marker".into()));
        assert!(!a.handle.is_finished());
    }

    #[tokio::test]
    async fn client_close_announces_left() {
        let hub = Hub::new();
        let mut a = hub.connect().await;
        let b = hub.connect().await;
        let _ = a.next().await;

        let b_id = b.id.clone();
        let closed = b.closed.clone();
        drop(b.inbound);
        let end = timeout(TIMEOUT, b.handle).await.unwrap().unwrap();
        assert_eq!(end, SessionEnd::Disconnected);
        assert!(closed.load(Ordering::SeqCst));

        let left = a.next().await;
        assert_eq!(left.kind, MessageType::Left);
        assert_eq!(left.from, Some(b_id.clone()));
        assert!(hub.router.registry().lookup(&b_id).await.is_none());
    }

    #[tokio::test]
    async fn transport_error_ends_session() {
        let hub = Hub::new();
        let client = hub.connect().await;
        client
            .inbound
            .send(Err(TransportError::Io("reset".into())))
            .unwrap();
        assert_eq!(client.finish().await, SessionEnd::Disconnected);
        assert!(hub.router.registry().is_empty().await);
    }

    #[tokio::test]
    async fn pong_keeps_session_alive() {
        let hub = Hub::new();
        let mut a = hub.connect().await;
        let mut b = hub.connect().await;
        let _ = a.next().await;

        a.push(Message::pong(12345));
        a.push(Message::new("after").addressed_to(b.id.clone()));
        assert_eq!(b.next().await.kind, MessageType::Custom("after".into()));
    }

    #[tokio::test]
    async fn malformed_pong_ends_session() {
        let hub = Hub::new();
        let mut a = hub.connect().await;
        let b = hub.connect().await;
        let _ = a.next().await;

        b.push(Message::new(MessageType::Pong).with_data("not-a-number"));
        let b_id = b.id.clone();
        assert_eq!(b.finish().await, SessionEnd::Disconnected);

        let left = a.next().await;
        assert_eq!(left.kind, MessageType::Left);
        assert_eq!(left.from, Some(b_id));
    }

    #[tokio::test]
    async fn pong_without_data_ends_session() {
        let hub = Hub::new();
        let client = hub.connect().await;
        client.push(Message::new(MessageType::Pong));
        assert_eq!(client.finish().await, SessionEnd::Disconnected);
    }

    #[tokio::test]
    async fn writer_failure_ends_session() {
        let hub = Hub::new();
        let client = hub.spawn(true);
        assert_eq!(client.finish().await, SessionEnd::Disconnected);
        assert!(hub.router.registry().is_empty().await);
    }

    #[tokio::test]
    async fn shutdown_skips_left() {
        let hub = Hub::new();
        let mut a = hub.connect().await;
        let b = hub.connect().await;
        let _ = a.next().await;

        hub.shutdown.cancel();
        assert_eq!(b.finish().await, SessionEnd::Shutdown);
        let TestClient {
            mut outbound,
            handle,
            closed,
            ..
        } = a;
        assert_eq!(
            timeout(TIMEOUT, handle).await.unwrap().unwrap(),
            SessionEnd::Shutdown
        );
        assert!(closed.load(Ordering::SeqCst));

        while let Ok(msg) = outbound.try_recv() {
            assert_ne!(msg.kind, MessageType::Left);
        }
        assert!(hub.router.registry().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_is_dropped_by_heartbeat() {
        let mut hub = Hub::new();
        hub.config.heartbeat_interval = Duration::from_secs(3);
        hub.config.max_outstanding_probes = 2;
        let mut a = hub.connect().await;
        let mut silent = hub.connect().await;
        let _ = a.next().await;

        // `a` answers its probes; `silent` never does.
        loop {
            let msg = a.next().await;
            match msg.kind {
                MessageType::Ping => a.push(Message::pong(msg.probe_stamp().unwrap())),
                MessageType::Left => {
                    assert_eq!(msg.from, Some(silent.id.clone()));
                    break;
                }
                other => panic!("unexpected {other}"),
            }
        }

        let mut pings = 0;
        while let Some(msg) = silent.outbound.recv().await {
            assert_matches!(msg.kind, MessageType::Ping);
            pings += 1;
        }
        assert_eq!(pings, 3);
        assert_eq!(silent.finish().await, SessionEnd::Disconnected);
        assert!(!a.handle.is_finished());
    }
}
