//! Handshake admission for the streaming endpoint.
//!
//! Deny-by-default: an empty allowlist admits nobody. Wildcard `"*"` admits
//! every origin, including requests that send none. Otherwise the `Origin`
//! header must equal one entry exactly (case-sensitive, no normalisation).

use std::collections::HashSet;

use axum::http::{header::ORIGIN, HeaderMap};
use pulse_core::config::{StreamConfig, WILDCARD_ORIGIN};
use pulse_core::types::TenantId;

use crate::error::{Result, StreamError};

#[derive(Debug, Clone, Default)]
pub struct OriginGate {
    allow_any: bool,
    allowed: HashSet<String>,
}

impl OriginGate {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut gate = Self::default();
        for origin in origins {
            let origin = origin.into();
            if origin == WILDCARD_ORIGIN {
                gate.allow_any = true;
            } else if !origin.is_empty() {
                gate.allowed.insert(origin);
            }
        }
        gate
    }

    pub fn from_config(cfg: &StreamConfig) -> Self {
        Self::new(cfg.allowed_origins.iter().cloned())
    }

    pub fn allows_any(&self) -> bool {
        self.allow_any
    }

    /// True when no origin at all can pass.
    pub fn is_closed(&self) -> bool {
        !self.allow_any && self.allowed.is_empty()
    }

    pub fn check(&self, origin: Option<&str>) -> Result<()> {
        if self.allow_any {
            return Ok(());
        }
        match origin {
            Some(o) if !o.is_empty() && self.allowed.contains(o) => Ok(()),
            Some(o) if !o.is_empty() => Err(StreamError::OriginRejected {
                origin: o.to_string(),
            }),
            _ => Err(StreamError::OriginRejected {
                origin: "<missing>".to_string(),
            }),
        }
    }
}

/// `Origin` header value, if present and valid UTF-8.
pub fn origin_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(ORIGIN).and_then(|v| v.to_str().ok())
}

/// Decide whether an upgrade request may proceed.
///
/// The tenant is checked first, so unauthenticated traffic never reaches the
/// origin check. No client exists yet on either rejection path.
pub fn admit(tenant: Option<TenantId>, headers: &HeaderMap, gate: &OriginGate) -> Result<TenantId> {
    let tenant = tenant.ok_or(StreamError::Unauthorized)?;
    gate.check(origin_header(headers))?;
    Ok(tenant)
}
