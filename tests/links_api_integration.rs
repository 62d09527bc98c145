//! Link management API tests
//!
//! Ownership is carried by the gateway headers; every request here goes
//! through the full API router.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use std::sync::Arc;
use tally::analytics::geoip::GeoResolver;
use tally::analytics::{AnalyticsAggregator, ClickRecorder};
use tally::api::create_api_router;
use tally::auth::{USER_ID_HEADER, USER_ROLE_HEADER};
use tally::links::LinkService;
use tally::shortcode::{CodeGenerator, ALPHANUMERIC};
use tally::storage::{SqliteStorage, Storage};
use tower::ServiceExt;

async fn create_test_app() -> Router {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    let storage: Arc<dyn Storage> = Arc::new(storage);

    let generator =
        CodeGenerator::with_rng(ALPHANUMERIC, 7, 10, StdRng::seed_from_u64(3)).unwrap();
    let recorder = ClickRecorder::new(
        Arc::clone(&storage),
        Arc::new(GeoResolver::disabled()),
        false,
    );
    let service = LinkService::new(storage, generator, recorder, AnalyticsAggregator::utc());
    create_api_router(Arc::new(service))
}

enum As<'a> {
    User(&'a str),
    Admin,
    Anonymous,
}

fn request(method: Method, uri: &str, who: As<'_>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    match who {
        As::User(id) => builder = builder.header(USER_ID_HEADER, id),
        As::Admin => {
            builder = builder
                .header(USER_ID_HEADER, "root")
                .header(USER_ROLE_HEADER, "admin")
        }
        As::Anonymous => {}
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn shorten(app: &Router, who: As<'_>, body: Value) -> (StatusCode, Value) {
    send(app, request(Method::POST, "/api/links", who, Some(body))).await
}

#[tokio::test]
async fn test_health_reports_geo_state() {
    let app = create_test_app().await;
    let (status, body) = send(&app, request(Method::GET, "/health", As::Anonymous, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["geo_provider"], "none");
    assert_eq!(body["geo_degraded"], 0);
}

#[tokio::test]
async fn test_create_generated_link() {
    let app = create_test_app().await;
    let (status, body) = shorten(
        &app,
        As::User("alice"),
        json!({"url": "https://example.com/a"}),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let code = body["short_code"].as_str().unwrap();
    assert_eq!(code.len(), 7);
    assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    assert_eq!(body["original_url"], "https://example.com/a");
    assert_eq!(body["created_by"], "alice");
    assert_eq!(body["clicks"], 0);
    assert_eq!(body["is_active"], true);
    assert_eq!(body["code_origin"], "generated");
    assert!(body["expires_at"].is_null());
}

#[tokio::test]
async fn test_create_custom_link_with_expiry() {
    let app = create_test_app().await;
    let (status, body) = shorten(
        &app,
        As::User("alice"),
        json!({"url": "https://example.com/sale", "custom_code": "sale-2024", "expires_in_days": 2}),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["short_code"], "sale-2024");
    assert_eq!(body["code_origin"], "custom");
    let created = body["created_at"].as_i64().unwrap();
    assert_eq!(body["expires_at"].as_i64().unwrap(), created + 2 * 86_400);
}

#[tokio::test]
async fn test_title_is_stored_and_returned() {
    let app = create_test_app().await;
    let (status, body) = shorten(
        &app,
        As::User("alice"),
        json!({"url": "https://example.com/docs", "custom_code": "docs", "title": "Team handbook"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["title"], "Team handbook");

    let (status, body) = send(
        &app,
        request(Method::GET, "/api/links/docs", As::User("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Team handbook");

    let (status, body) = shorten(
        &app,
        As::User("alice"),
        json!({"url": "https://example.com", "title": "   "}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_create_rejects_bad_input() {
    let app = create_test_app().await;

    for url in ["", "not a url", "ftp://example.com/file", "javascript:alert(1)"] {
        let (status, body) = shorten(&app, As::User("alice"), json!({ "url": url })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "accepted {url:?}");
        assert!(body["error"].is_string());
    }

    let (status, _) = shorten(
        &app,
        As::User("alice"),
        json!({"url": "https://example.com", "custom_code": "has space"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let long_code = "x".repeat(33);
    let (status, _) = shorten(
        &app,
        As::User("alice"),
        json!({"url": "https://example.com", "custom_code": long_code}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_custom_code_conflicts() {
    let app = create_test_app().await;
    let body = json!({"url": "https://example.com", "custom_code": "taken"});

    let (status, _) = shorten(&app, As::User("alice"), body.clone()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, response) = shorten(&app, As::User("bob"), body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(response["error"].as_str().unwrap().contains("taken"));
}

#[tokio::test]
async fn test_links_are_private_to_owner() {
    let app = create_test_app().await;
    shorten(
        &app,
        As::User("alice"),
        json!({"url": "https://example.com", "custom_code": "alices"}),
    )
    .await;

    let (status, _) = send(&app, request(Method::GET, "/api/links/alices", As::User("alice"), None)).await;
    assert_eq!(status, StatusCode::OK);

    // someone else's link looks exactly like a missing one
    let (status, body) = send(&app, request(Method::GET, "/api/links/alices", As::User("bob"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Link not found");

    let (status, _) = send(&app, request(Method::GET, "/api/links/alices", As::Anonymous, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, request(Method::GET, "/api/links/alices", As::Admin, None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        request(Method::DELETE, "/api/links/alices", As::User("bob"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_links_pagination() {
    let app = create_test_app().await;
    for i in 0..5 {
        shorten(
            &app,
            As::User("alice"),
            json!({"url": format!("https://example.com/{i}"), "custom_code": format!("a{i}")}),
        )
        .await;
    }
    shorten(
        &app,
        As::User("bob"),
        json!({"url": "https://example.com/b", "custom_code": "b0"}),
    )
    .await;

    let (status, page) = send(
        &app,
        request(Method::GET, "/api/links?page=1&size=2", As::User("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 5);
    assert_eq!(page["page"], 1);
    assert_eq!(page["size"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);

    let (_, last) = send(
        &app,
        request(Method::GET, "/api/links?page=3&size=2", As::User("alice"), None),
    )
    .await;
    assert_eq!(last["items"].as_array().unwrap().len(), 1);

    let (_, all) = send(&app, request(Method::GET, "/api/links", As::Admin, None)).await;
    assert_eq!(all["total"], 6);

    let (_, nobody) = send(&app, request(Method::GET, "/api/links", As::Anonymous, None)).await;
    assert_eq!(nobody["total"], 0);
    assert!(nobody["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_deactivate_reactivate_delete() {
    let app = create_test_app().await;
    shorten(
        &app,
        As::User("alice"),
        json!({"url": "https://example.com", "custom_code": "toggle"}),
    )
    .await;

    let (status, body) = send(
        &app,
        request(Method::POST, "/api/links/toggle/deactivate", As::User("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());

    let (_, link) = send(&app, request(Method::GET, "/api/links/toggle", As::User("alice"), None)).await;
    assert_eq!(link["is_active"], false);

    let (status, _) = send(
        &app,
        request(Method::POST, "/api/links/toggle/reactivate", As::User("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, link) = send(&app, request(Method::GET, "/api/links/toggle", As::User("alice"), None)).await;
    assert_eq!(link["is_active"], true);

    let (status, _) = send(
        &app,
        request(Method::DELETE, "/api/links/toggle", As::User("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, request(Method::GET, "/api/links/toggle", As::User("alice"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
