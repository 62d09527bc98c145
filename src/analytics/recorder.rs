//! Per-redirect click capture
//!
//! Runs after a link has been found eligible: derives the client context,
//! resolves geography, classifies the user agent and writes one click event
//! together with the counter increment.

use axum::http::{header, HeaderMap};
use std::net::IpAddr;
use std::sync::Arc;

use crate::analytics::geoip::GeoResolver;
use crate::analytics::ip_extractor::{anonymize_ip_str, extract_client_ip};
use crate::analytics::user_agent;
use crate::models::{ClickEvent, NewClickEvent, ShortLink};
use crate::storage::{Storage, StorageResult};

/// What the recorder needs to know about one incoming redirect request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub headers: HeaderMap,
    pub remote_addr: IpAddr,
    /// Unix seconds at which the request arrived; becomes the event time
    pub received_at: i64,
}

impl RequestContext {
    pub fn new(headers: HeaderMap, remote_addr: IpAddr, received_at: i64) -> Self {
        Self {
            headers,
            remote_addr,
            received_at,
        }
    }

    fn header(&self, name: header::HeaderName) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}

pub struct ClickRecorder {
    storage: Arc<dyn Storage>,
    geo: Arc<GeoResolver>,
    anonymize_ip: bool,
}

impl ClickRecorder {
    pub fn new(storage: Arc<dyn Storage>, geo: Arc<GeoResolver>, anonymize_ip: bool) -> Self {
        Self {
            storage,
            geo,
            anonymize_ip,
        }
    }

    pub fn geo(&self) -> &GeoResolver {
        &self.geo
    }

    /// Build the event for `link` without persisting it
    pub async fn build_event(&self, link: &ShortLink, ctx: &RequestContext) -> NewClickEvent {
        let mut ip = extract_client_ip(&ctx.headers, ctx.remote_addr);
        if self.anonymize_ip {
            ip = anonymize_ip_str(&ip);
        }

        let location = self.geo.resolve(&ip).await;

        let user_agent = ctx.header(header::USER_AGENT);
        let classification = user_agent::classify(user_agent.as_deref());

        NewClickEvent {
            link_id: link.id,
            clicked_at: ctx.received_at,
            ip_address: Some(ip),
            country: Some(location.country),
            city: Some(location.city),
            user_agent,
            device_type: classification.device_type,
            browser: classification.browser.to_string(),
            operating_system: classification.operating_system.to_string(),
            referrer: ctx.header(header::REFERER),
        }
    }

    /// Persist one click for `link`: event write and counter increment together.
    /// The store has the final say on eligibility, so a link deactivated since
    /// it was looked up is refused with `StorageError::Unavailable`.
    pub async fn record(&self, link: &ShortLink, ctx: &RequestContext) -> StorageResult<ClickEvent> {
        let event = self.build_event(link, ctx).await;
        let stored = self.storage.record_click(&event).await?;

        tracing::debug!(
            short_code = %link.short_code,
            click_id = stored.id,
            device = %event.device_type,
            country = stored.country.as_deref().unwrap_or_default(),
            "click recorded"
        );

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::user_agent::DeviceType;
    use crate::models::{CodeOrigin, NewLink};
    use crate::storage::MemoryStorage;
    use axum::http::HeaderValue;

    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";

    async fn setup(anonymize: bool) -> (Arc<MemoryStorage>, ClickRecorder, ShortLink) {
        let storage = Arc::new(MemoryStorage::new());
        let link = storage
            .create_link(NewLink {
                short_code: "promo".to_string(),
                original_url: "https://example.com/promo".to_string(),
                title: None,
                created_at: 1_700_000_000,
                created_by: Some("alice".to_string()),
                expires_at: None,
                code_origin: CodeOrigin::Custom,
            })
            .await
            .unwrap();
        let recorder =
            ClickRecorder::new(storage.clone(), Arc::new(GeoResolver::disabled()), anonymize);
        (storage, recorder, link)
    }

    fn context() -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.77, 10.0.0.1"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static(IPHONE));
        headers.insert(header::REFERER, HeaderValue::from_static("https://news.example/post"));
        RequestContext::new(headers, "10.0.0.2".parse().unwrap(), 1_700_000_500)
    }

    #[tokio::test]
    async fn test_record_builds_full_event() {
        let (storage, recorder, link) = setup(false).await;

        let event = recorder.record(&link, &context()).await.unwrap();

        assert_eq!(event.link_id, link.id);
        assert_eq!(event.clicked_at, 1_700_000_500);
        assert_eq!(event.ip_address.as_deref(), Some("203.0.113.77"));
        assert_eq!(event.country.as_deref(), Some("Unknown"));
        assert_eq!(event.city.as_deref(), Some("Unknown"));
        assert_eq!(event.device(), DeviceType::Mobile);
        assert_eq!(event.browser, "Safari");
        assert_eq!(event.operating_system, "iOS");
        assert_eq!(event.referrer.as_deref(), Some("https://news.example/post"));
        assert_eq!(event.user_agent.as_deref(), Some(IPHONE));

        let stored = storage.get("promo").await.unwrap().unwrap();
        assert_eq!(stored.clicks, 1);
        assert_eq!(storage.clicks_for_link(link.id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_headers_degrade() {
        let (_, recorder, link) = setup(false).await;
        let ctx = RequestContext::new(HeaderMap::new(), "198.51.100.3".parse().unwrap(), 5);

        let event = recorder.build_event(&link, &ctx).await;

        assert_eq!(event.ip_address.as_deref(), Some("198.51.100.3"));
        assert_eq!(event.device_type, DeviceType::Unknown);
        assert_eq!(event.browser, "Other");
        assert_eq!(event.operating_system, "Other");
        assert_eq!(event.referrer, None);
        assert_eq!(event.user_agent, None);
    }

    #[tokio::test]
    async fn test_anonymized_ip() {
        let (_, recorder, link) = setup(true).await;
        let event = recorder.build_event(&link, &context()).await;
        assert_eq!(event.ip_address.as_deref(), Some("203.0.113.0"));
    }
}
