//! Analytics and dashboard handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::handlers::{error_response, link_error, unix_now, ApiError, AppState, PageQuery};
use crate::analytics::models::{
    AggregationResult, DashboardStats, Dimension, DimensionCount, TimeRange,
};
use crate::auth::Caller;
use crate::links::{AnalyticsReport, DashboardLink, Page};

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    /// Start time (Unix timestamp, inclusive)
    pub start_time: Option<i64>,
    /// End time (Unix timestamp, inclusive)
    pub end_time: Option<i64>,
}

impl RangeQuery {
    fn range(&self) -> Result<Option<TimeRange>, ApiError> {
        match (self.start_time, self.end_time) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) => Ok(Some(TimeRange::new(start, end))),
            _ => Err(error_response(
                StatusCode::BAD_REQUEST,
                "start_time and end_time must be given together",
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BreakdownQuery {
    pub group_by: String,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct BreakdownResponse {
    pub group_by: Dimension,
    pub rows: Vec<DimensionCount>,
}

/// Full report for one link
pub async fn get_link_analytics(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(code): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<AnalyticsReport>, ApiError> {
    let range = query.range()?;
    state
        .service
        .analytics(&caller, &code, range, unix_now())
        .await
        .map(Json)
        .map_err(link_error)
}

/// Grouped counts for one dimension of a link's clicks
pub async fn get_link_breakdown(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(code): Path<String>,
    Query(query): Query<BreakdownQuery>,
) -> Result<Json<BreakdownResponse>, ApiError> {
    let dimension: Dimension = query
        .group_by
        .parse()
        .map_err(|e: String| error_response(StatusCode::BAD_REQUEST, e))?;
    let range = RangeQuery {
        start_time: query.start_time,
        end_time: query.end_time,
    }
    .range()?;

    let rows = state
        .service
        .breakdown(&caller, &code, dimension, range, query.limit)
        .await
        .map_err(link_error)?;

    Ok(Json(BreakdownResponse {
        group_by: dimension,
        rows,
    }))
}

/// One aggregate across every link the caller can see
pub async fn get_owner_analytics(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<RangeQuery>,
) -> Result<Json<AggregationResult>, ApiError> {
    let range = query.range()?;
    state
        .service
        .owner_analytics(&caller, range, unix_now())
        .await
        .map(Json)
        .map_err(link_error)
}

pub async fn get_dashboard_links(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<DashboardLink>>, ApiError> {
    state
        .service
        .dashboard(&caller, query.page, query.size, unix_now())
        .await
        .map(Json)
        .map_err(link_error)
}

pub async fn get_dashboard_stats(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<DashboardStats>, ApiError> {
    state
        .service
        .dashboard_stats(&caller)
        .await
        .map(Json)
        .map_err(link_error)
}
