use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use pulse_core::config::{PulseConfig, StreamConfig};
use pulse_stream::{ClientSettings, Hub, OriginGate, StreamState};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::auth::TenantResolver;

/// Shared state for the REST handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PulseConfig>,
    pub hub: Hub,
    pub gate: Arc<OriginGate>,
    pub tenants: Arc<TenantResolver>,
}

impl AppState {
    pub fn new(config: PulseConfig) -> Self {
        let hub = Hub::new(ClientSettings::from(&config.stream));
        let gate = Arc::new(OriginGate::from_config(&config.stream));
        let tenants = Arc::new(TenantResolver::from_config(&config.auth));
        Self {
            config: Arc::new(config),
            hub,
            gate,
            tenants,
        }
    }
}

/// Assemble the full Axum router.
///
/// Tenant resolution wraps every route, the stream endpoint included.
pub fn build_router(state: AppState) -> Router {
    let stream = StreamState {
        hub: state.hub.clone(),
        gate: Arc::clone(&state.gate),
    };

    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/v1/events", post(crate::http::events::publish_handler))
        .route("/v1/dashboard/gaps", get(crate::http::gaps::gaps_handler))
        .layer(cors_layer(&state.config.stream))
        .with_state(state.clone())
        .merge(pulse_stream::router(stream))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.tenants),
            crate::auth::resolve_tenant,
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Browser access to the REST routes follows the same origin allowlist as
/// the stream endpoint.
fn cors_layer(cfg: &StreamConfig) -> CorsLayer {
    let origins = if cfg.allows_any_origin() {
        AllowOrigin::any()
    } else {
        let list: Vec<HeaderValue> = cfg
            .allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring unparsable entry in stream.allowed_origins");
                    None
                }
            })
            .collect();
        AllowOrigin::list(list)
    };
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
