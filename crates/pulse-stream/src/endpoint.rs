//! Streaming endpoint: GET /v1/stream
//!
//! The tenant is resolved by whatever auth layer wraps this router and handed
//! over as a `TenantId` request extension. This module never authenticates.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket, WebSocketUpgrade},
        FromRequestParts, State,
    },
    http::{request::Parts, HeaderMap},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::StreamExt;
use pulse_core::types::TenantId;
use tracing::{debug, warn};

use crate::error::StreamError;
use crate::gate::{self, OriginGate};
use crate::hub::Hub;

pub const STREAM_PATH: &str = "/v1/stream";

#[derive(Clone)]
pub struct StreamState {
    pub hub: Hub,
    pub gate: Arc<OriginGate>,
}

impl StreamState {
    pub fn new(hub: Hub, gate: OriginGate) -> Self {
        Self {
            hub,
            gate: Arc::new(gate),
        }
    }
}

/// Tenant placed in the request extensions by the auth layer, if any.
#[derive(Debug, Clone)]
pub struct ResolvedTenant(pub Option<TenantId>);

impl<S> FromRequestParts<S> for ResolvedTenant
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ResolvedTenant(parts.extensions.get::<TenantId>().cloned()))
    }
}

pub fn router(state: StreamState) -> Router {
    Router::new()
        .route(STREAM_PATH, get(stream_handler))
        .with_state(state)
}

async fn stream_handler(
    State(state): State<StreamState>,
    ResolvedTenant(tenant): ResolvedTenant,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let tenant = match gate::admit(tenant, &headers, &state.gate) {
        Ok(tenant) => tenant,
        Err(e) => {
            debug!(error = %e, "stream handshake rejected");
            return e.into_response();
        }
    };
    if !state.hub.is_accepting() {
        return StreamError::HubClosed.into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    // Hard cap at the transport; frames between the two limits are read and
    // then refused by the inbound pump with a SIZE close.
    let limit = state.hub.settings().max_message_bytes;
    let hub = state.hub.clone();
    ws.max_message_size(limit.saturating_mul(2))
        .on_failed_upgrade(|e| warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket: WebSocket| async move {
            let (writer, reader) = socket.split();
            if let Err(e) = hub.connect(tenant.clone(), writer, reader) {
                warn!(tenant = %tenant, error = %e, "dropping upgraded connection");
            }
        })
}
