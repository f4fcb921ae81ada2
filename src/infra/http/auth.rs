use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::{AdminState, error_response, no_store};

const SOURCE: &str = "http::auth";

pub const API_KEY_HEADER: &str = "x-api-key";

/// Guard the admin surface with an optional shared API key.
///
/// With no key configured the surface is public. With one configured, a
/// missing header and a wrong key are distinct outcomes (401 vs 403) so
/// operators can tell misconfigured clients from probing ones.
pub async fn admin_auth(
    State(state): State<AdminState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        debug!(
            target = SOURCE,
            path = %request.uri().path(),
            "no admin API key configured, allowing request"
        );
        return next.run(request).await;
    };

    let caller = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match presented {
        None => {
            warn!(
                target = SOURCE,
                caller = %caller,
                path = %request.uri().path(),
                "admin request without API key"
            );
            no_store(error_response(
                StatusCode::UNAUTHORIZED,
                "API key required. Provide X-API-Key header.",
            ))
        }
        Some(candidate) if bool::from(candidate.as_bytes().ct_eq(expected.as_bytes())) => {
            next.run(request).await
        }
        Some(_) => {
            warn!(
                target = SOURCE,
                caller = %caller,
                path = %request.uri().path(),
                "admin request with invalid API key"
            );
            no_store(error_response(StatusCode::FORBIDDEN, "Invalid API key"))
        }
    }
}
