mod admin;
mod auth;
mod middleware;
mod public;

pub use admin::AdminState;
pub use auth::API_KEY_HEADER;
pub use public::PublicState;

use axum::{
    Json, Router,
    extract::FromRef,
    http::{HeaderValue, StatusCode, header::CACHE_CONTROL},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::config::ServerSettings;

#[derive(Clone)]
pub struct RouterState {
    pub public: PublicState,
    pub admin: AdminState,
}

impl FromRef<RouterState> for PublicState {
    fn from_ref(state: &RouterState) -> Self {
        state.public.clone()
    }
}

impl FromRef<RouterState> for AdminState {
    fn from_ref(state: &RouterState) -> Self {
        state.admin.clone()
    }
}

/// Assemble the application router.
///
/// The admin surface is omitted entirely when `admin_api` is false, so the
/// routes answer 404 rather than 403 in that mode. A non-empty `base_path`
/// nests everything under that prefix.
pub fn build_router(state: RouterState, server: &ServerSettings, admin_api: bool) -> Router {
    let mut router = public::routes(server.disable_ui);

    if admin_api {
        router = router.merge(admin::routes(state.admin.clone()));
    }

    let router = router
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses));

    if server.base_path.is_empty() {
        router
    } else {
        Router::new().nest(&server.base_path, router)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

/// Uniform JSON error shape shared by the public and admin surfaces.
pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        status: "error",
        message: message.into(),
    };
    (status, Json(body)).into_response()
}

pub(crate) fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
