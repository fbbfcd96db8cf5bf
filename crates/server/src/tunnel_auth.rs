//! Proxy-node tunnel authentication (spec §6.1): a small extractor pulled
//! off the WS upgrade request's headers, in the same extension-carrying
//! style the teacher's `ClientIdentificationLayer` used to attach identity
//! onto the request before the handler ran — except here there's no
//! downstream layer to populate an extension, so the extractor reads the
//! headers directly at the upgrade handler.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};

/// Management token prefix required on the tunnel's `Authorization` header.
const TOKEN_PREFIX: &str = "ae_";

/// Node id attached to the request extensions once a tunnel-routed request
/// is dispatched, so [`crate::tracing`] can record it on the span.
#[derive(Clone, Debug)]
pub struct RoutedNodeId(pub String);

/// Validated registration fields from the tunnel's WS upgrade request.
pub struct TunnelAuth {
    pub token: String,
    pub node_id: String,
    pub node_name: String,
    pub max_streams: Option<u32>,
}

/// Close codes from spec §6.1/§4.6.
pub mod close_code {
    pub const UNAUTHORIZED: u16 = 4001;
    pub const AUTH_TIMEOUT: u16 = 4002;
    pub const TOO_MANY_OVERSIZED_FRAMES: u16 = 4003;
    pub const IDLE_TIMEOUT: u16 = 4004;
}

/// Validates a management token against the gateway's configured value.
/// Real token issuance/revocation is an external auth service this gateway
/// doesn't own; this trait is the seam a deployment wires in.
#[async_trait::async_trait]
pub trait NodeAuthValidator: Send + Sync {
    async fn validate(&self, token: &str, node_id: &str) -> bool;
}

/// Accepts any syntactically well-formed `ae_<token>`, for deployments that
/// don't inject a real validator.
pub struct PermissiveValidator;

#[async_trait::async_trait]
impl NodeAuthValidator for PermissiveValidator {
    async fn validate(&self, token: &str, _node_id: &str) -> bool {
        token.strip_prefix(TOKEN_PREFIX).is_some_and(|rest| !rest.is_empty())
    }
}

impl<S> FromRequestParts<S> for TunnelAuth
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .filter(|token| token.starts_with(TOKEN_PREFIX))
            .map(str::to_string)
            .ok_or((StatusCode::UNAUTHORIZED, "missing or malformed Authorization header"))?;

        let node_id = parts
            .headers
            .get("x-node-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or((StatusCode::BAD_REQUEST, "missing X-Node-Id header"))?;

        let node_name = parts
            .headers
            .get("x-node-name")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| node_id.clone());

        let max_streams = parts
            .headers
            .get("x-tunnel-max-streams")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok())
            .map(|v| v.clamp(tunnel::MIN_MAX_STREAMS, tunnel::MAX_MAX_STREAMS));

        Ok(Self {
            token,
            node_id,
            node_name,
            max_streams,
        })
    }
}
