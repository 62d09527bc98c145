use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::Caller;
use crate::links::{LinkError, LinkService, Page};
use crate::models::{CreateLinkRequest, ShortLink};

pub struct AppState {
    pub service: Arc<LinkService>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Map a service error onto an HTTP status. Not-found never says why.
pub fn link_error(err: LinkError) -> ApiError {
    match err {
        LinkError::NotFound(_) => error_response(StatusCode::NOT_FOUND, "Link not found"),
        LinkError::DuplicateCode(code) => error_response(
            StatusCode::CONFLICT,
            format!("Short code '{}' already exists", code),
        ),
        LinkError::CodeSpaceExhausted { .. } => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Could not allocate a short code, try a custom code",
        ),
        LinkError::InvalidRequest(message) => error_response(StatusCode::BAD_REQUEST, message),
        LinkError::Storage(e) => {
            tracing::error!(error = %e, "storage failure");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Create a new short link
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<CreateLinkRequest>,
) -> Result<(StatusCode, Json<ShortLink>), ApiError> {
    let link = state
        .service
        .shorten(&caller, payload, unix_now())
        .await
        .map_err(link_error)?;
    Ok((StatusCode::CREATED, Json(link)))
}

/// List the caller's links, newest first
pub async fn list_links(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<ShortLink>>, ApiError> {
    state
        .service
        .list_links(&caller, query.page, query.size)
        .await
        .map(Json)
        .map_err(link_error)
}

pub async fn get_link(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(code): Path<String>,
) -> Result<Json<ShortLink>, ApiError> {
    state
        .service
        .get_link(&caller, &code)
        .await
        .map(Json)
        .map_err(link_error)
}

pub async fn delete_link(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(code): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .service
        .delete(&caller, &code)
        .await
        .map_err(link_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn deactivate_link(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(code): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .service
        .deactivate(&caller, &code)
        .await
        .map_err(link_error)?;
    Ok(Json(SuccessResponse {
        message: "Link deactivated successfully".to_string(),
    }))
}

pub async fn reactivate_link(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(code): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .service
        .reactivate(&caller, &code)
        .await
        .map_err(link_error)?;
    Ok(Json(SuccessResponse {
        message: "Link reactivated successfully".to_string(),
    }))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub geo_provider: &'static str,
    pub geo_degraded: u64,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let geo = state.service.geo();
    Json(HealthResponse {
        status: "OK",
        geo_provider: geo.provider_name(),
        geo_degraded: geo.degraded_count(),
    })
}
