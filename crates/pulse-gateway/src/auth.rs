//! Tenant resolution, run in front of every route.
//!
//! A caller presents a static token either as `Authorization: Bearer <token>`
//! or as the `access_token` query parameter (browsers cannot set headers on a
//! WebSocket upgrade). A known token places its `TenantId` in the request
//! extensions; anything else passes through with no tenant and each route
//! decides what that means.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, Uri},
    middleware::Next,
    response::Response,
};
use pulse_core::config::AuthConfig;
use pulse_core::types::TenantId;
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct TenantResolver {
    tokens: HashMap<String, TenantId>,
}

impl TenantResolver {
    pub fn from_config(cfg: &AuthConfig) -> Self {
        let mut tokens = HashMap::new();
        for entry in &cfg.tenants {
            let Some(tenant) = TenantId::new(entry.tenant.as_str()) else {
                warn!("auth.tenants entry with empty tenant ignored");
                continue;
            };
            if entry.token.is_empty() {
                warn!(tenant = %tenant, "auth.tenants entry with empty token ignored");
                continue;
            }
            if tokens.insert(entry.token.clone(), tenant.clone()).is_some() {
                warn!(tenant = %tenant, "duplicate token in auth.tenants, last entry wins");
            }
        }
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn resolve(&self, token: &str) -> Option<TenantId> {
        self.tokens.get(token).cloned()
    }

    /// Header token wins over the query parameter.
    pub fn resolve_request(&self, headers: &HeaderMap, uri: &Uri) -> Option<TenantId> {
        if let Some(token) = bearer_token(headers) {
            return self.resolve(token);
        }
        query_token(uri).and_then(|token| self.resolve(&token))
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[derive(Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

pub fn query_token(uri: &Uri) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(q)| q.access_token)
        .filter(|t| !t.is_empty())
}

/// Middleware: attach the caller's tenant, if any, to the request.
pub async fn resolve_tenant(
    State(resolver): State<Arc<TenantResolver>>,
    mut req: Request,
    next: Next,
) -> Response {
    match resolver.resolve_request(req.headers(), req.uri()) {
        Some(tenant) => {
            req.extensions_mut().insert(tenant);
        }
        None => debug!(path = %req.uri().path(), "request carries no known tenant token"),
    }
    next.run(req).await
}
