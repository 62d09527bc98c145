//! HTTP geolocation in the ip-api.com response format

use async_trait::async_trait;
use moka::future::Cache;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

use super::{GeoError, GeoProvider};
use crate::analytics::models::{GeoLocation, UNKNOWN_LOCATION};

pub const DEFAULT_URL: &str = "http://ip-api.com/json/{ip}?fields=status,message,country,city";

const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

/// Looks addresses up against an ip-api style endpoint.
///
/// The URL template must contain `{ip}`; successful answers are cached so
/// repeat visitors do not cost another request.
pub struct IpApiProvider {
    client: reqwest::Client,
    url_template: String,
    cache: Option<Cache<IpAddr, GeoLocation>>,
}

impl IpApiProvider {
    pub fn new(
        url_template: impl Into<String>,
        timeout: Duration,
        cache_entries: u64,
    ) -> Result<Self, GeoError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        let cache = (cache_entries > 0).then(|| {
            Cache::builder()
                .max_capacity(cache_entries)
                .time_to_live(CACHE_TTL)
                .build()
        });

        Ok(Self {
            client,
            url_template: url_template.into(),
            cache,
        })
    }

    fn url_for(&self, ip: IpAddr) -> String {
        if self.url_template.contains("{ip}") {
            self.url_template.replace("{ip}", &ip.to_string())
        } else {
            format!("{}/{}", self.url_template.trim_end_matches('/'), ip)
        }
    }
}

fn field(value: Option<String>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_LOCATION.to_string())
}

#[async_trait]
impl GeoProvider for IpApiProvider {
    fn name(&self) -> &'static str {
        "ip-api"
    }

    async fn lookup(&self, ip: IpAddr) -> Result<Option<GeoLocation>, GeoError> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&ip).await {
                return Ok(Some(hit));
            }
        }

        let response: IpApiResponse = self
            .client
            .get(self.url_for(ip))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.status != "success" {
            return Err(GeoError::Rejected(
                response.message.unwrap_or(response.status),
            ));
        }

        let location = GeoLocation::new(field(response.country), field(response.city));
        if let Some(cache) = &self.cache {
            cache.insert(ip, location.clone()).await;
        }
        Ok(Some(location))
    }
}
