use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::error;

/// The built-in MapLibre viewer page. Layer data is fetched client-side from
/// the public catalog routes, so the template only carries site chrome.
#[derive(Template)]
#[template(path = "viewer.html")]
pub struct ViewerTemplate {
    pub title: String,
    pub description: String,
    pub basemap_url: String,
    pub base_path: String,
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match template.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err) => {
            error!(
                target = "presentation::views",
                error = %err,
                "template rendering failed"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
