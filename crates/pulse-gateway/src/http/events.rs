//! Event ingress: POST /v1/events
//!
//! Publishes one event to every stream client of the caller's tenant. The
//! tenant always comes from the caller's token, never from the body, so a
//! publisher cannot reach another tenant's clients.
//!
//! Request:  `{"event": "pageview", "payload": {...}}`
//! Response: `202 {"accepted": true, "seq": 42, "delivered": 3, "dropped": 0}`

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use pulse_protocol::frames::{ErrorBody, EventFrame, PublishReceipt, PublishRequest};
use pulse_stream::ResolvedTenant;
use tracing::info;

use crate::app::AppState;

type ApiError = (StatusCode, Json<ErrorBody>);

pub async fn publish_handler(
    State(state): State<AppState>,
    ResolvedTenant(tenant): ResolvedTenant,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PublishReceipt>), ApiError> {
    let tenant = tenant.ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody::unauthorized(
                "Set 'Authorization: Bearer <token>' to publish events.",
            )),
        )
    })?;

    let Json(req) = body.map_err(|e| {
        (
            e.status(),
            Json(ErrorBody::new("invalid_request", e.body_text())),
        )
    })?;

    let event = req.event.trim();
    if event.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new("invalid_request", "event cannot be empty")),
        ));
    }

    let frame = match req.payload {
        Some(payload) => EventFrame::new(event, payload),
        None => EventFrame::bare(event),
    };
    let report = state.hub.broadcast(&tenant, frame);
    info!(
        tenant = %tenant,
        event,
        seq = report.seq,
        delivered = report.delivered,
        dropped = report.dropped,
        "event published"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishReceipt {
            accepted: true,
            seq: report.seq,
            delivered: report.delivered,
            dropped: report.dropped,
        }),
    ))
}
