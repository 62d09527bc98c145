//! Wiring shared by the server and the admin CLI

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::analytics::geoip::{GeoProvider, GeoResolver, IpApiProvider, MaxMindProvider};
use crate::analytics::{AnalyticsAggregator, ClickRecorder};
use crate::config::{Config, DatabaseBackend, GeoProviderKind};
use crate::links::LinkService;
use crate::shortcode::CodeGenerator;
use crate::storage::{CachedStorage, MemoryStorage, PostgresStorage, SqliteStorage, Storage};

/// Open the configured backend, create its schema and put the link cache in
/// front of it when enabled.
pub async fn build_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    let db = &config.database;
    let storage: Arc<dyn Storage> = match db.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", db.url);
            Arc::new(SqliteStorage::new(&db.url, db.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", db.url);
            Arc::new(PostgresStorage::new(&db.url, db.max_connections).await?)
        }
        DatabaseBackend::Memory => {
            info!("Using in-memory storage; data is lost on exit");
            Arc::new(MemoryStorage::new())
        }
    };

    storage.init().await.context("failed to initialize storage")?;

    if config.cache.max_entries == 0 {
        return Ok(storage);
    }

    info!(
        max_entries = config.cache.max_entries,
        ttl_secs = config.cache.ttl_secs,
        "Link cache enabled"
    );
    Ok(Arc::new(CachedStorage::new(
        storage,
        config.cache.max_entries,
        config.cache.ttl(),
    )))
}

pub fn build_geo_resolver(config: &Config) -> Result<GeoResolver> {
    let analytics = &config.analytics;
    let provider: Arc<dyn GeoProvider> = match analytics.geoip_provider {
        GeoProviderKind::None => return Ok(GeoResolver::disabled()),
        GeoProviderKind::IpApi => Arc::new(IpApiProvider::new(
            analytics.geoip_api_url.clone(),
            analytics.geoip_timeout(),
            analytics.geoip_cache_entries,
        )?),
        GeoProviderKind::MaxMind => {
            let path = analytics
                .geoip_city_db_path
                .as_deref()
                .context("GEOIP_CITY_DB_PATH is not set")?;
            Arc::new(MaxMindProvider::open(path)?)
        }
    };

    info!(provider = provider.name(), "Geo resolution enabled");
    Ok(GeoResolver::new(provider, analytics.geoip_timeout()))
}

pub fn build_service(config: &Config, storage: Arc<dyn Storage>) -> Result<LinkService> {
    let generator = CodeGenerator::new(config.short_code.length, config.short_code.max_attempts)
        .context("invalid short code settings")?;

    let geo = Arc::new(build_geo_resolver(config)?);
    let recorder = ClickRecorder::new(
        Arc::clone(&storage),
        geo,
        config.analytics.ip_anonymization,
    );

    let aggregator = AnalyticsAggregator::with_utc_offset_minutes(config.analytics.utc_offset_minutes)
        .context("ANALYTICS_UTC_OFFSET_MINUTES is out of range")?;

    Ok(LinkService::new(storage, generator, recorder, aggregator))
}
