//! IP geolocation
//!
//! A [`GeoProvider`] answers lookups for one backend (an HTTP service or a
//! local MaxMind database). [`GeoResolver`] wraps a provider with the policy
//! the click path relies on: it never fails, never blocks past its timeout,
//! and reports `Unknown`/`Unknown` whenever a real answer is not available.

mod ip_api;
mod maxmind;

pub use ip_api::{IpApiProvider, DEFAULT_URL as IP_API_URL};
pub use maxmind::MaxMindProvider;

use async_trait::async_trait;
use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;

use crate::analytics::models::{GeoLocation, UNKNOWN_LOCATION};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1500);

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geo lookup request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geo provider rejected lookup: {0}")]
    Rejected(String),
    #[error("geo database lookup failed: {0}")]
    Database(String),
}

/// One geolocation backend.
///
/// `Ok(None)` means the backend has no data for the address, which is not a
/// failure and does not count as degraded resolution.
#[async_trait]
pub trait GeoProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn lookup(&self, ip: IpAddr) -> Result<Option<GeoLocation>, GeoError>;
}

/// Ranges that never resolve to a public location
static NON_ROUTABLE: LazyLock<Vec<IpNet>> = LazyLock::new(|| {
    [
        "0.0.0.0/8",
        "10.0.0.0/8",
        "100.64.0.0/10",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "::/128",
        "::1/128",
        "fc00::/7",
        "fe80::/10",
    ]
    .iter()
    .filter_map(|net| net.parse().ok())
    .collect()
});

/// Whether a lookup for `ip` could return anything meaningful
pub fn is_routable(ip: IpAddr) -> bool {
    let ip = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    };
    !NON_ROUTABLE.iter().any(|net| net.contains(&ip))
}

/// Failure-absorbing front for a [`GeoProvider`]
pub struct GeoResolver {
    provider: Option<Arc<dyn GeoProvider>>,
    timeout: Duration,
    degraded: AtomicU64,
}

impl GeoResolver {
    pub fn new(provider: Arc<dyn GeoProvider>, timeout: Duration) -> Self {
        Self {
            provider: Some(provider),
            timeout,
            degraded: AtomicU64::new(0),
        }
    }

    /// A resolver that answers `Unknown` for every address
    pub fn disabled() -> Self {
        Self {
            provider: None,
            timeout: DEFAULT_TIMEOUT,
            degraded: AtomicU64::new(0),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.as_ref().map_or("none", |p| p.name())
    }

    /// Number of lookups that failed or timed out since startup
    pub fn degraded_count(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Resolve a textual address. Never fails.
    pub async fn resolve(&self, ip: &str) -> GeoLocation {
        let Some(provider) = &self.provider else {
            return GeoLocation::unknown();
        };

        let addr = match ip.trim().parse::<IpAddr>() {
            Ok(addr) => addr,
            Err(_) => {
                tracing::debug!(ip, "client address is not an IP, skipping geo lookup");
                return GeoLocation::unknown();
            }
        };

        if !is_routable(addr) {
            return GeoLocation::unknown();
        }

        match tokio::time::timeout(self.timeout, provider.lookup(addr)).await {
            Ok(Ok(Some(location))) => fill_missing(location),
            Ok(Ok(None)) => GeoLocation::unknown(),
            Ok(Err(e)) => {
                self.degraded.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(provider = provider.name(), %addr, error = %e, "geo lookup failed");
                GeoLocation::unknown()
            }
            Err(_) => {
                self.degraded.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    provider = provider.name(),
                    %addr,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "geo lookup timed out"
                );
                GeoLocation::unknown()
            }
        }
    }
}

impl Default for GeoResolver {
    fn default() -> Self {
        Self::disabled()
    }
}

fn fill_missing(location: GeoLocation) -> GeoLocation {
    let fill = |value: String| {
        if value.trim().is_empty() {
            UNKNOWN_LOCATION.to_string()
        } else {
            value
        }
    };
    GeoLocation {
        country: fill(location.country),
        city: fill(location.city),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Fixed {
        location: Option<GeoLocation>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GeoProvider for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn lookup(&self, _ip: IpAddr) -> Result<Option<GeoLocation>, GeoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.location.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl GeoProvider for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn lookup(&self, _ip: IpAddr) -> Result<Option<GeoLocation>, GeoError> {
            Err(GeoError::Rejected("quota exceeded".to_string()))
        }
    }

    struct Slow;

    #[async_trait]
    impl GeoProvider for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn lookup(&self, _ip: IpAddr) -> Result<Option<GeoLocation>, GeoError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Some(GeoLocation::new("Late", "Late")))
        }
    }

    fn fixed(location: Option<GeoLocation>) -> Arc<Fixed> {
        Arc::new(Fixed {
            location,
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_is_routable() {
        for ip in ["127.0.0.1", "10.1.2.3", "192.168.0.10", "172.20.0.1", "::1", "fe80::1", "fd00::5", "::ffff:192.168.1.1"] {
            assert!(!is_routable(ip.parse().unwrap()), "{ip} should be skipped");
        }
        for ip in ["8.8.8.8", "203.0.113.9", "2001:4860:4860::8888", "172.32.0.1"] {
            assert!(is_routable(ip.parse().unwrap()), "{ip} should be looked up");
        }
    }

    #[tokio::test]
    async fn test_successful_lookup() {
        let provider = fixed(Some(GeoLocation::new("Thailand", "Bangkok")));
        let resolver = GeoResolver::new(provider.clone(), DEFAULT_TIMEOUT);

        let location = resolver.resolve("8.8.8.8").await;
        assert_eq!(location, GeoLocation::new("Thailand", "Bangkok"));
        assert_eq!(resolver.degraded_count(), 0);
    }

    #[tokio::test]
    async fn test_private_addresses_skip_provider() {
        let provider = fixed(Some(GeoLocation::new("Thailand", "Bangkok")));
        let resolver = GeoResolver::new(provider.clone(), DEFAULT_TIMEOUT);

        for ip in ["127.0.0.1", "::1", "192.168.1.20", "10.0.0.1", "not-an-ip", ""] {
            assert!(resolver.resolve(ip).await.is_unknown());
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_partial_answer_is_filled() {
        let provider = fixed(Some(GeoLocation::new("Iceland", "")));
        let resolver = GeoResolver::new(provider, DEFAULT_TIMEOUT);

        assert_eq!(
            resolver.resolve("8.8.4.4").await,
            GeoLocation::new("Iceland", UNKNOWN_LOCATION)
        );
    }

    #[tokio::test]
    async fn test_no_data_is_not_degraded() {
        let resolver = GeoResolver::new(fixed(None), DEFAULT_TIMEOUT);
        assert!(resolver.resolve("8.8.8.8").await.is_unknown());
        assert_eq!(resolver.degraded_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_degrades_to_unknown() {
        let resolver = GeoResolver::new(Arc::new(Failing), DEFAULT_TIMEOUT);
        assert!(resolver.resolve("8.8.8.8").await.is_unknown());
        assert_eq!(resolver.degraded_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_unknown() {
        let resolver = GeoResolver::new(Arc::new(Slow), Duration::from_millis(20));

        let started = std::time::Instant::now();
        assert!(resolver.resolve("8.8.8.8").await.is_unknown());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(resolver.degraded_count(), 1);
    }

    #[tokio::test]
    async fn test_disabled_resolver() {
        let resolver = GeoResolver::disabled();
        assert_eq!(resolver.provider_name(), "none");
        assert!(resolver.resolve("8.8.8.8").await.is_unknown());
    }
}
