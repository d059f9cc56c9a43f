//! One live streaming connection: the hub-facing handle plus its two pumps.
//!
//! The socket is split at connect time. The write half is moved into the
//! outbound pump and the read half into the inbound pump, so no other code
//! can ever touch either. Everything else (hub, broadcaster, shutdown) talks
//! to the client through [`Client`], which only holds the queue sender, the
//! lifecycle state and the shared done signal.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, Utf8Bytes};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use pulse_core::types::{ClientId, TenantId};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::hub::Hub;
use crate::types::{ClientSettings, ClientState, CloseReason};

/// Number of pumps per client; Closed is entered when both have exited.
const PUMP_COUNT: u8 = 2;

/// Result of a non-blocking enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueue {
    Queued,
    /// Queue at capacity: the client is a slow consumer.
    Full,
    /// Client is no longer Active.
    Closed,
}

/// Hub-side handle for one connection.
pub struct Client {
    id: ClientId,
    tenant: TenantId,
    state: AtomicU8,
    reason: OnceLock<CloseReason>,
    queue: mpsc::Sender<Utf8Bytes>,
    /// Cancelled exactly once, on Active → Closing. Both pumps watch it.
    done: CancellationToken,
    /// Cancelled once both pumps have released their connection half.
    released: CancellationToken,
    pumps: AtomicU8,
    connected_at: Instant,
    /// Millis since `connected_at` of the last inbound frame, plus one.
    /// Zero means nothing has been heard yet.
    last_seen_ms: AtomicU64,
}

impl Client {
    /// Build an Active client with an empty bounded queue.
    ///
    /// The receiver goes to the outbound pump; until a pump owns it nothing
    /// drains the queue.
    pub(crate) fn new(
        id: ClientId,
        tenant: TenantId,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Utf8Bytes>) {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        let client = Arc::new(Self {
            id,
            tenant,
            state: AtomicU8::new(ClientState::Active as u8),
            reason: OnceLock::new(),
            queue,
            done: CancellationToken::new(),
            released: CancellationToken::new(),
            pumps: AtomicU8::new(PUMP_COUNT),
            connected_at: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
        });
        (client, rx)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == ClientState::Active
    }

    /// Reason recorded by whoever moved the client out of Active.
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.reason.get()
    }

    /// Resolves once the client is Closed and holds no connection.
    pub async fn closed(&self) {
        self.released.cancelled().await;
    }

    /// Never waits: a full queue is reported, not awaited.
    pub(crate) fn try_enqueue(&self, text: Utf8Bytes) -> Enqueue {
        if !self.is_active() {
            return Enqueue::Closed;
        }
        match self.queue.try_send(text) {
            Ok(()) => Enqueue::Queued,
            Err(TrySendError::Full(_)) => Enqueue::Full,
            Err(TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }

    /// Request Active → Closing. Returns `true` for the caller that won the
    /// transition; every later call is a no-op.
    pub(crate) fn begin_close(&self, reason: CloseReason) -> bool {
        if self
            .state
            .compare_exchange(
                ClientState::Active as u8,
                ClientState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }
        let _ = self.reason.set(reason);
        self.done.cancel();
        true
    }

    fn offset_ms(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.connected_at).as_millis() as u64
    }

    fn touch(&self) {
        let now = self.offset_ms(Instant::now()) + 1;
        self.last_seen_ms.store(now, Ordering::Relaxed);
    }

    /// Whether any inbound frame arrived at or after `at` (millisecond
    /// resolution).
    fn heard_since(&self, at: Instant) -> bool {
        match self.last_seen_ms.load(Ordering::Relaxed) {
            0 => false,
            seen => seen - 1 >= self.offset_ms(at),
        }
    }

    /// Called by each pump after dropping its connection half.
    fn release_pump(&self) {
        if self.pumps.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state.store(ClientState::Closed as u8, Ordering::Release);
            self.released.cancel();
            debug!(client_id = %self.id, tenant = %self.tenant, "client closed");
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("tenant", &self.tenant)
            .field("state", &self.state())
            .field("reason", &self.reason.get())
            .finish()
    }
}

/// Exclusive writer. Writes `welcome` first, then drains the queue to the
/// wire, sends keepalive pings and writes the close handshake once the client
/// leaves Active.
///
/// The keepalive deadline runs from the oldest ping the peer has not answered:
/// any inbound frame after that ping counts as an answer.
pub(crate) async fn run_outbound<W>(
    client: Arc<Client>,
    hub: Hub,
    mut sink: W,
    mut queue: mpsc::Receiver<Utf8Bytes>,
    welcome: Option<Utf8Bytes>,
    settings: ClientSettings,
) where
    W: Sink<Message> + Unpin,
    W::Error: fmt::Display,
{
    let mut ping = tokio::time::interval_at(
        Instant::now() + settings.ping_interval,
        settings.ping_interval,
    );
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut unanswered: Option<Instant> = None;
    let mut first = welcome.map(Message::Text);

    loop {
        let frame = match first.take() {
            Some(frame) => frame,
            None => tokio::select! {
                biased;
                _ = client.done.cancelled() => break,
                _ = ping.tick() => {
                    if let Some(sent) = unanswered {
                        if client.heard_since(sent) {
                            unanswered = None;
                        } else if sent.elapsed() >= settings.pong_timeout {
                            hub.disconnect(&client, CloseReason::KeepaliveTimeout);
                            break;
                        }
                    }
                    unanswered.get_or_insert_with(Instant::now);
                    Message::Ping(Bytes::new())
                }
                next = queue.recv() => match next {
                    Some(text) => Message::Text(text),
                    None => break,
                },
            },
        };

        // a stalled write must not outlive the client
        let written = tokio::select! {
            biased;
            _ = client.done.cancelled() => break,
            res = send_frame(&mut sink, frame, settings.write_timeout) => res,
        };
        if let Err(reason) = written {
            hub.disconnect(&client, reason);
            break;
        }
    }

    // no-op unless the queue ended on its own
    hub.disconnect(&client, CloseReason::Shutdown);
    queue.close();

    if let Some(frame) = client.close_reason().and_then(CloseReason::close_frame) {
        let _ = send_frame(&mut sink, Message::Close(Some(frame)), settings.write_timeout).await;
    }
    let _ = tokio::time::timeout(settings.write_timeout, sink.close()).await;
    drop(sink);
    client.release_pump();
}

/// Exclusive reader. Observes liveness and peer close; application payloads
/// are size-checked and otherwise ignored.
pub(crate) async fn run_inbound<R, E>(
    client: Arc<Client>,
    hub: Hub,
    mut stream: R,
    settings: ClientSettings,
) where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = client.done.cancelled() => break,
            next = stream.next() => next,
        };

        let reason = match next {
            Some(Ok(msg)) => {
                client.touch();
                match inspect_inbound(&client, msg, settings.max_message_bytes) {
                    Some(reason) => reason,
                    None => continue,
                }
            }
            Some(Err(e)) => CloseReason::ReadFailed(e.to_string()),
            None => CloseReason::PeerClosed,
        };
        hub.disconnect(&client, reason);
        break;
    }

    drop(stream);
    client.release_pump();
}

/// Returns a close reason when the frame ends the connection.
fn inspect_inbound(client: &Client, msg: Message, max: usize) -> Option<CloseReason> {
    let size = match msg {
        Message::Ping(_) | Message::Pong(_) => return None,
        Message::Close(frame) => {
            info!(
                client_id = %client.id,
                code = frame.as_ref().map(|f| f.code),
                "client sent close frame"
            );
            return Some(CloseReason::PeerClosed);
        }
        Message::Text(text) => text.len(),
        Message::Binary(data) => data.len(),
    };
    if size > max {
        return Some(CloseReason::PayloadTooLarge { size, max });
    }
    debug!(client_id = %client.id, size, "ignoring inbound application frame");
    None
}

async fn send_frame<W>(sink: &mut W, frame: Message, timeout: Duration) -> Result<(), CloseReason>
where
    W: Sink<Message> + Unpin,
    W::Error: fmt::Display,
{
    match tokio::time::timeout(timeout, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(CloseReason::WriteFailed(e.to_string())),
        Err(_) => Err(CloseReason::WriteTimeout),
    }
}
