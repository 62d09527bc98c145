use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::links::LinkService;

use super::analytics::{
    get_dashboard_links, get_dashboard_stats, get_link_analytics, get_link_breakdown,
    get_owner_analytics,
};
use super::handlers::{
    create_link, deactivate_link, delete_link, get_link, health_check, list_links,
    reactivate_link, AppState,
};

pub fn create_api_router(service: Arc<LinkService>) -> Router {
    let state = Arc::new(AppState { service });

    let api_routes = Router::new()
        .route("/links", post(create_link).get(list_links))
        .route("/links/{code}", get(get_link).delete(delete_link))
        .route("/links/{code}/deactivate", post(deactivate_link))
        .route("/links/{code}/reactivate", post(reactivate_link))
        .route("/links/{code}/analytics", get(get_link_analytics))
        .route("/links/{code}/analytics/breakdown", get(get_link_breakdown))
        .route("/analytics", get(get_owner_analytics))
        .route("/dashboard/links", get(get_dashboard_links))
        .route("/dashboard/stats", get(get_dashboard_stats));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
