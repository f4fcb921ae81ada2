use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header::CACHE_CONTROL},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tracing::error;

use crate::{
    catalog::{CatalogError, LayerCatalog},
    config::{MetadataSettings, WebsiteSettings},
    domain::Layer,
    presentation::views::{ViewerTemplate, render_template_response},
};

use super::{RouterState, error_response};

#[derive(Clone)]
pub struct PublicState {
    pub catalog: Arc<dyn LayerCatalog>,
    pub metadata: MetadataSettings,
    pub website: WebsiteSettings,
    pub base_path: String,
    pub browser_cache_max_age: Duration,
}

pub fn routes(disable_ui: bool) -> Router<RouterState> {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/layers", get(list_layers))
        .route("/layers/{name}", get(get_layer));

    if !disable_ui {
        router = router
            .route("/", get(viewer))
            .route("/index.html", get(viewer));
    }

    router
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[derive(Debug, Serialize)]
struct LayersBody {
    layers: Vec<Layer>,
}

async fn list_layers(State(state): State<PublicState>) -> Response {
    let layers = state.catalog.layers();
    let mut response = Json(LayersBody { layers }).into_response();
    apply_browser_cache(&mut response, state.browser_cache_max_age);
    response
}

/// Single-layer lookup resolves bounds on first access, which probes the
/// database, so the call runs on the blocking pool.
async fn get_layer(State(state): State<PublicState>, Path(name): Path<String>) -> Response {
    const SOURCE: &str = "http::public::get_layer";

    let catalog = state.catalog.clone();
    let lookup = name.clone();

    match tokio::task::spawn_blocking(move || catalog.layer(&lookup)).await {
        Ok(Ok(layer)) => {
            let mut response = Json(layer).into_response();
            apply_browser_cache(&mut response, state.browser_cache_max_age);
            response
        }
        Ok(Err(CatalogError::NotFound { .. })) => error_response(
            StatusCode::NOT_FOUND,
            format!("Layer not found: {name}"),
        ),
        Ok(Err(err)) => {
            error!(target = SOURCE, layer = %name, error = %err, "layer lookup failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to resolve layer",
            )
        }
        Err(err) => {
            error!(target = SOURCE, layer = %name, error = %err, "layer lookup task failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to resolve layer",
            )
        }
    }
}

async fn viewer(State(state): State<PublicState>) -> Response {
    let template = ViewerTemplate {
        title: state.metadata.title.clone(),
        description: state.metadata.description.clone(),
        basemap_url: state.website.basemap_url.to_string(),
        base_path: state.base_path.clone(),
    };
    let mut response = render_template_response(template, StatusCode::OK);
    apply_browser_cache(&mut response, state.browser_cache_max_age);
    response
}

fn apply_browser_cache(response: &mut Response, max_age: Duration) {
    if max_age.is_zero() {
        return;
    }
    let directive = format!("public, max-age={}", max_age.as_secs());
    if let Ok(value) = HeaderValue::from_str(&directive) {
        response.headers_mut().insert(CACHE_CONTROL, value);
    }
}
