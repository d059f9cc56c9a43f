use std::fmt;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame};
use pulse_core::config::StreamConfig;

/// Client lifecycle. Monotonic: Active → Closing → Closed, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    /// Registered with the hub; accepts enqueues.
    Active = 0,
    /// Unregistered; pumps are winding down, enqueues are refused.
    Closing = 1,
    /// Both pumps have released their half of the connection.
    Closed = 2,
}

impl ClientState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ClientState::Active,
            1 => ClientState::Closing,
            _ => ClientState::Closed,
        }
    }
}

/// Why a client left the Active state. Recorded once, first request wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame or the stream ended.
    PeerClosed,
    ReadFailed(String),
    WriteFailed(String),
    WriteTimeout,
    /// Nothing heard from the peer within the pong deadline.
    KeepaliveTimeout,
    /// Outbound queue was full when a broadcast arrived.
    SlowConsumer,
    PayloadTooLarge { size: usize, max: usize },
    /// Hub-wide shutdown.
    Shutdown,
}

impl CloseReason {
    /// Close frame the outbound pump writes on the way out, if any.
    ///
    /// Transport failures get none: the connection is already unusable.
    /// A peer-initiated close is answered by the transport itself.
    pub fn close_frame(&self) -> Option<CloseFrame> {
        let (code, reason) = match self {
            CloseReason::PeerClosed
            | CloseReason::ReadFailed(_)
            | CloseReason::WriteFailed(_)
            | CloseReason::WriteTimeout => return None,
            CloseReason::KeepaliveTimeout => (close_code::POLICY, "keepalive timeout"),
            CloseReason::SlowConsumer => (close_code::POLICY, "slow consumer"),
            CloseReason::PayloadTooLarge { .. } => (close_code::SIZE, "message too large"),
            CloseReason::Shutdown => (close_code::AWAY, "server shutting down"),
        };
        Some(CloseFrame {
            code,
            reason: reason.into(),
        })
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::ReadFailed(e) => write!(f, "read failed: {e}"),
            CloseReason::WriteFailed(e) => write!(f, "write failed: {e}"),
            CloseReason::WriteTimeout => write!(f, "write timed out"),
            CloseReason::KeepaliveTimeout => write!(f, "keepalive timeout"),
            CloseReason::SlowConsumer => write!(f, "slow consumer"),
            CloseReason::PayloadTooLarge { size, max } => {
                write!(f, "inbound message too large: {size} bytes (max {max})")
            }
            CloseReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Per-client pump settings, shared by every client of one hub.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub queue_capacity: usize,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub write_timeout: Duration,
    pub max_message_bytes: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from(&StreamConfig::default())
    }
}

impl From<&StreamConfig> for ClientSettings {
    fn from(cfg: &StreamConfig) -> Self {
        Self {
            // tokio's bounded channel panics on zero capacity
            queue_capacity: cfg.queue_capacity.max(1),
            ping_interval: cfg.ping_interval(),
            pong_timeout: cfg.pong_timeout(),
            write_timeout: cfg.write_timeout(),
            max_message_bytes: cfg.max_message_bytes,
        }
    }
}

/// Outcome of one [`crate::Hub::broadcast`] call. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub seq: u64,
    /// Clients whose queue accepted the frame.
    pub delivered: usize,
    /// Slow consumers disconnected by this call.
    pub dropped: usize,
}
