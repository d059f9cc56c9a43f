//! End-to-end tests over a real socket: axum server, tungstenite client.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    Router,
};
use futures::{SinkExt, StreamExt};
use pulse_core::types::TenantId;
use pulse_protocol::frames::EventFrame;
use pulse_stream::{router, ClientSettings, Hub, OriginGate, StreamState, STREAM_PATH};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{
    self, client::IntoClientRequest, http::HeaderValue, protocol::frame::coding::CloseCode,
    Message,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const ORIGIN: &str = "https://app.example.com";

/// Stand-in for the gateway auth layer: `?tenant=<name>` becomes the tenant.
async fn tenant_from_query(mut req: Request, next: Next) -> Response {
    let tenant = req
        .uri()
        .query()
        .and_then(|q| q.split('&').find_map(|kv| kv.strip_prefix("tenant=")))
        .and_then(TenantId::new);
    if let Some(tenant) = tenant {
        req.extensions_mut().insert(tenant);
    }
    next.run(req).await
}

async fn serve(settings: ClientSettings) -> (SocketAddr, Hub) {
    let hub = Hub::new(settings);
    let state = StreamState::new(hub.clone(), OriginGate::new([ORIGIN]));
    let app: Router = router(state).layer(middleware::from_fn(tenant_from_query));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hub)
}

fn quiet_settings() -> ClientSettings {
    ClientSettings {
        queue_capacity: 16,
        ping_interval: Duration::from_secs(60),
        pong_timeout: Duration::from_secs(120),
        write_timeout: Duration::from_secs(2),
        max_message_bytes: 1024,
    }
}

async fn dial(addr: SocketAddr, tenant: &str, origin: &str) -> Result<Ws, tungstenite::Error> {
    let mut req = format!("ws://{addr}{STREAM_PATH}?tenant={tenant}")
        .into_client_request()
        .unwrap();
    req.headers_mut()
        .insert("origin", HeaderValue::from_str(origin).unwrap());
    tokio_tungstenite::connect_async(req).await.map(|(ws, _)| ws)
}

async fn next_message(ws: &mut Ws) -> Message {
    tokio::time::timeout(Duration::from_secs(3), ws.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended")
        .expect("read failed")
}

async fn next_json(ws: &mut Ws) -> Value {
    match next_message(ws).await {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

async fn wait_for_clients(hub: &Hub, expected: usize) {
    for _ in 0..100 {
        if hub.client_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {expected} clients, hub has {}", hub.client_count());
}

fn tenant(name: &str) -> TenantId {
    TenantId::new(name).unwrap()
}

#[tokio::test]
async fn welcome_then_broadcast() {
    let (addr, hub) = serve(quiet_settings()).await;
    let mut ws = dial(addr, "acme", ORIGIN).await.unwrap();

    let welcome = next_json(&mut ws).await;
    assert_eq!(welcome["event"], "connection.established");
    assert_eq!(welcome["payload"]["tenant"], "acme");
    assert_eq!(hub.tenant_client_count(&tenant("acme")), 1);

    let report = hub.broadcast(
        &tenant("acme"),
        EventFrame::new("pageview", json!({ "path": "/pricing" })),
    );
    assert_eq!(report.delivered, 1);

    let event = next_json(&mut ws).await;
    assert_eq!(event["type"], "event");
    assert_eq!(event["event"], "pageview");
    assert_eq!(event["payload"]["path"], "/pricing");
    assert_eq!(event["seq"], report.seq);
}

#[tokio::test]
async fn tenants_do_not_see_each_other() {
    let (addr, hub) = serve(quiet_settings()).await;
    let mut acme = dial(addr, "acme", ORIGIN).await.unwrap();
    let mut globex = dial(addr, "globex", ORIGIN).await.unwrap();
    next_json(&mut acme).await;
    next_json(&mut globex).await;

    hub.broadcast(&tenant("acme"), EventFrame::bare("acme.only"));
    hub.broadcast(&tenant("globex"), EventFrame::bare("globex.only"));

    assert_eq!(next_json(&mut acme).await["event"], "acme.only");
    assert_eq!(next_json(&mut globex).await["event"], "globex.only");
}

#[tokio::test]
async fn foreign_origin_is_refused_before_upgrade() {
    let (addr, hub) = serve(quiet_settings()).await;
    match dial(addr, "acme", "https://evil.example.com").await {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), 403),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("foreign origin was upgraded"),
    }
    assert_eq!(hub.client_count(), 0);
}

#[tokio::test]
async fn missing_tenant_is_refused_before_upgrade() {
    let (addr, hub) = serve(quiet_settings()).await;
    let mut req = format!("ws://{addr}{STREAM_PATH}")
        .into_client_request()
        .unwrap();
    req.headers_mut()
        .insert("origin", HeaderValue::from_static(ORIGIN));
    match tokio_tungstenite::connect_async(req).await {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), 401),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("anonymous request was upgraded"),
    }
    assert_eq!(hub.client_count(), 0);
}

#[tokio::test]
async fn peer_close_unregisters_client() {
    let (addr, hub) = serve(quiet_settings()).await;
    let mut ws = dial(addr, "acme", ORIGIN).await.unwrap();
    next_json(&mut ws).await;
    wait_for_clients(&hub, 1).await;

    ws.send(Message::Close(None)).await.unwrap();
    wait_for_clients(&hub, 0).await;
    assert_eq!(hub.tenant_count(), 0);
}

#[tokio::test]
async fn oversized_frame_gets_size_close() {
    let (addr, hub) = serve(quiet_settings()).await;
    let mut ws = dial(addr, "acme", ORIGIN).await.unwrap();
    next_json(&mut ws).await;

    ws.send(Message::text("x".repeat(1500))).await.unwrap();
    match next_message(&mut ws).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Size),
        other => panic!("expected close frame, got {other:?}"),
    }
    wait_for_clients(&hub, 0).await;
}

#[tokio::test]
async fn shutdown_closes_connections_with_going_away() {
    let (addr, hub) = serve(quiet_settings()).await;
    let mut a = dial(addr, "acme", ORIGIN).await.unwrap();
    let mut b = dial(addr, "globex", ORIGIN).await.unwrap();
    next_json(&mut a).await;
    next_json(&mut b).await;

    tokio::time::timeout(Duration::from_secs(5), hub.shutdown())
        .await
        .expect("shutdown did not finish");
    assert_eq!(hub.client_count(), 0);
    assert!(!hub.is_accepting());

    for ws in [&mut a, &mut b] {
        match next_message(ws).await {
            Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Away),
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    match dial(addr, "acme", ORIGIN).await {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), 503),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("upgraded after shutdown"),
    }
}
