use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// GET /health: liveness probe, returns server metadata.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let accepting = state.hub.is_accepting();
    Json(json!({
        "status": if accepting { "ok" } else { "draining" },
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": pulse_protocol::PROTOCOL_VERSION,
        "accepting": accepting,
        "tenants": state.hub.tenant_count(),
        "clients": state.hub.client_count(),
    }))
}
