use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tracing::{error, info};

use crate::{cache::TileCache, catalog::Catalog};

use super::{RouterState, auth::admin_auth, error_response, no_store};

#[derive(Clone)]
pub struct AdminState {
    pub catalog: Arc<Catalog>,
    pub cache: Arc<TileCache>,
    pub api_key: Option<String>,
}

pub fn routes(state: AdminState) -> Router<RouterState> {
    Router::new()
        .route("/cache/stats", get(cache_stats))
        .route("/cache/clear", post(clear_cache))
        .route("/cache/clear/{layer}", post(clear_layer))
        .route("/catalog/refresh", post(refresh_catalog))
        .layer(axum_middleware::from_fn_with_state(state, admin_auth))
}

#[derive(Debug, Serialize)]
struct DisabledBody {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ClearBody {
    status: &'static str,
    message: &'static str,
    removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    layer: Option<String>,
}

#[derive(Debug, Serialize)]
struct RefreshBody {
    status: &'static str,
    message: &'static str,
    layers: usize,
}

async fn cache_stats(State(state): State<AdminState>) -> Response {
    if !state.cache.enabled() {
        return no_store(Json(DisabledBody { status: "disabled" }).into_response());
    }

    no_store(Json(state.cache.stats()).into_response())
}

async fn clear_cache(State(state): State<AdminState>) -> Response {
    const SOURCE: &str = "http::admin::clear_cache";

    if !state.cache.enabled() {
        return no_store(error_response(StatusCode::BAD_REQUEST, "Cache is disabled"));
    }

    let removed = state.cache.clear();
    info!(target = SOURCE, removed, "cache cleared");

    no_store(
        Json(ClearBody {
            status: "ok",
            message: "Cache cleared",
            removed,
            layer: None,
        })
        .into_response(),
    )
}

async fn clear_layer(State(state): State<AdminState>, Path(layer): Path<String>) -> Response {
    const SOURCE: &str = "http::admin::clear_layer";

    if !state.cache.enabled() {
        return no_store(error_response(StatusCode::BAD_REQUEST, "Cache is disabled"));
    }

    let removed = state.cache.clear_layer(&layer);
    info!(target = SOURCE, layer = %layer, removed, "cache cleared for layer");

    no_store(
        Json(ClearBody {
            status: "ok",
            message: "Cache cleared for layer",
            removed,
            layer: Some(layer),
        })
        .into_response(),
    )
}

/// Rebuild the catalog from the live database. The rebuild runs on the
/// blocking pool; the previous generation keeps serving until the swap.
async fn refresh_catalog(State(state): State<AdminState>) -> Response {
    const SOURCE: &str = "http::admin::refresh_catalog";

    let catalog = state.catalog.clone();

    match tokio::task::spawn_blocking(move || catalog.refresh()).await {
        Ok(Ok(layers)) => {
            info!(target = SOURCE, layers, "catalog refreshed");
            no_store(
                Json(RefreshBody {
                    status: "ok",
                    message: "Catalog refreshed",
                    layers,
                })
                .into_response(),
            )
        }
        Ok(Err(err)) => {
            error!(target = SOURCE, error = %err, "catalog refresh failed");
            no_store(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Catalog refresh failed: {err}"),
            ))
        }
        Err(err) => {
            error!(target = SOURCE, error = %err, "catalog refresh task failed");
            no_store(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Catalog refresh failed",
            ))
        }
    }
}
