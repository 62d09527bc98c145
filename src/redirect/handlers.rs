use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, header::HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

use super::middleware::RequestStart;
use crate::analytics::RequestContext;
use crate::config::RedirectMode;
use crate::links::{LinkError, LinkService};

pub const TIMING_HEADER: &str = "x-tally-timing-ms";

const UNAVAILABLE: &str = "This link is unavailable";

pub struct RedirectState {
    pub service: Arc<LinkService>,
    pub mode: RedirectMode,
}

/// Redirect to the destination of an eligible link, recording the click
pub async fn redirect_url(
    State(state): State<Arc<RedirectState>>,
    Path(code): Path<String>,
    Extension(started): Extension<RequestStart>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let ctx = RequestContext::new(headers, addr.ip(), chrono::Utc::now().timestamp());

    let destination = match state.service.redirect(&code, &ctx).await {
        Ok(destination) => destination,
        Err(LinkError::NotFound(_)) => {
            return (StatusCode::NOT_FOUND, UNAVAILABLE).into_response();
        }
        Err(e) => {
            tracing::error!(short_code = %code, error = %e, "redirect failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    };

    let location = match HeaderValue::from_str(&destination) {
        Ok(value) => value,
        Err(_) => {
            tracing::error!(short_code = %code, "stored destination is not a valid header value");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::LOCATION, location);
    response_headers.insert(TIMING_HEADER, HeaderValue::from(started.elapsed_ms()));

    (state.mode.status_code(), response_headers).into_response()
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}
