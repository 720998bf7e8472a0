//! Dashboard HTTP API
//!
//! Section index, section pages and a health check.

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use super::types::*;
use super::ServerState;
use crate::report::{html_escape, page};

/// Create the router; everything except `/health` requires a login
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(get_index))
        .route("/api/sections", get(get_sections))
        .route("/section/:key", get(get_section))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_login))
        .route("/health", get(get_health))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn require_login(State(state): State<Arc<ServerState>>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| state.authorize(v))
        .unwrap_or(false);

    if authorized {
        return next.run(request).await;
    }
    tracing::debug!(path = %request.uri().path(), "Login required");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"market-dashboard\"")],
        "Login required",
    )
        .into_response()
}

fn summaries(state: &ServerState) -> Vec<SectionSummary> {
    state
        .manifest()
        .sections
        .into_iter()
        .map(|(key, entry)| SectionSummary {
            url: format!("/section/{}", key),
            key,
            title: entry.title,
            updated_at: entry.updated_at,
        })
        .collect()
}

/// GET / - Section index page
async fn get_index(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let sections = summaries(&state);
    let mut body = String::from("<h1>Market Dashboard</h1>\n");
    if sections.is_empty() {
        body.push_str("<p>No reports generated yet.</p>");
    } else {
        body.push_str("<table>\n<thead><tr><th>Section</th><th>Updated (UTC)</th></tr></thead>\n<tbody>\n");
        for s in &sections {
            body.push_str(&format!(
                "<tr><td style=\"text-align:left;\"><a href=\"{}\">{}</a></td><td>{}</td></tr>\n",
                html_escape(&s.url),
                html_escape(&s.title),
                s.updated_at.format("%Y-%m-%d %H:%M")
            ));
        }
        body.push_str("</tbody></table>");
    }
    Html(page("Market Dashboard", "", &body))
}

/// GET /api/sections - Section index as JSON
async fn get_sections(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(ApiResponse::success(summaries(&state)))
}

/// GET /section/:key - Newest output of one section
async fn get_section(State(state): State<Arc<ServerState>>, Path(key): Path<String>) -> Response {
    let Some(path) = state.resolve_section(&key) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::error(format!("No output for section '{}'", key))),
        )
            .into_response();
    };
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed reading section");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error("Failed reading section output")),
            )
                .into_response()
        }
    }
}

/// GET /health - Liveness check, no login needed
async fn get_health(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "ok".to_string(),
        sections: state.manifest().sections.len(),
        output_dir: state.output_dir.display().to_string(),
        auth_configured: state.auth_configured(),
    }))
}
