//! In-memory stand-in for a split WebSocket, for pump and hub tests.

use std::time::Duration;

use axum::extract::ws::Message;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;

use crate::types::ClientSettings;

pub(crate) type FakeWriter = UnboundedSender<Message>;
pub(crate) type FakeReader = UnboundedReceiver<Result<Message, std::io::Error>>;

/// The remote end: what the server wrote, and a handle to feed it frames.
pub(crate) struct FakePeer {
    pub outbound: UnboundedReceiver<Message>,
    pub inbound: UnboundedSender<Result<Message, std::io::Error>>,
}

pub(crate) fn fake_connection() -> (FakeWriter, FakeReader, FakePeer) {
    let (writer, outbound) = unbounded();
    let (inbound, reader) = unbounded();
    (writer, reader, FakePeer { outbound, inbound })
}

/// Quiet keepalive so tests only see the frames they cause.
pub(crate) fn settings() -> ClientSettings {
    ClientSettings {
        queue_capacity: 8,
        ping_interval: Duration::from_secs(60),
        pong_timeout: Duration::from_secs(120),
        write_timeout: Duration::from_millis(200),
        max_message_bytes: 1024,
    }
}

/// Next frame the server wrote, or `None` once the writer was closed.
pub(crate) async fn next_frame(outbound: &mut UnboundedReceiver<Message>) -> Option<Message> {
    tokio::time::timeout(Duration::from_secs(3), outbound.next())
        .await
        .expect("timed out waiting for a server frame")
}

/// Next frame, which must be a JSON text frame.
pub(crate) async fn next_text(outbound: &mut UnboundedReceiver<Message>) -> serde_json::Value {
    match next_frame(outbound).await {
        Some(Message::Text(text)) => serde_json::from_str(text.as_str()).expect("frame is not JSON"),
        other => panic!("expected text frame, got {other:?}"),
    }
}
