use crate::analytics::models::{Dimension, DimensionCount, TimeRange};
use crate::models::{ClickEvent, NewClickEvent, NewLink, ShortLink};
use crate::storage::{OwnerScope, Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Read-through cache in front of another storage.
///
/// Only link lookups by code are cached (misses included). State changes
/// made through this wrapper invalidate the entry; the `clicks` counter on a
/// cached link may lag behind, so readers that report it should go through
/// `get_authoritative`.
pub struct CachedStorage {
    inner: Arc<dyn Storage>,
    read_cache: Cache<String, Option<ShortLink>>,
}

impl CachedStorage {
    pub fn new(inner: Arc<dyn Storage>, max_cache_entries: u64, ttl: Duration) -> Self {
        let read_cache = Cache::builder()
            .max_capacity(max_cache_entries)
            .time_to_live(ttl)
            .build();

        Self { inner, read_cache }
    }

    async fn invalidate_cache(&self, short_code: &str) {
        self.read_cache.invalidate(short_code).await;
    }
}

#[async_trait]
impl Storage for CachedStorage {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn create_link(&self, link: NewLink) -> StorageResult<ShortLink> {
        let created = self.inner.create_link(link).await?;

        // replaces a cached miss for the same code
        self.read_cache
            .insert(created.short_code.clone(), Some(created.clone()))
            .await;

        Ok(created)
    }

    async fn get(&self, short_code: &str) -> Result<Option<ShortLink>> {
        if let Some(cached) = self.read_cache.get(short_code).await {
            return Ok(cached);
        }

        let result = self.inner.get(short_code).await?;
        self.read_cache
            .insert(short_code.to_string(), result.clone())
            .await;

        Ok(result)
    }

    async fn get_authoritative(&self, short_code: &str) -> Result<Option<ShortLink>> {
        let result = self.inner.get_authoritative(short_code).await?;

        // keep the cache in sync with the latest read
        self.read_cache
            .insert(short_code.to_string(), result.clone())
            .await;

        Ok(result)
    }

    async fn exists(&self, short_code: &str) -> Result<bool> {
        self.inner.exists(short_code).await
    }

    async fn increment_clicks(&self, link_id: i64) -> Result<()> {
        self.inner.increment_clicks(link_id).await
    }

    async fn deactivate(&self, short_code: &str) -> Result<bool> {
        let result = self.inner.deactivate(short_code).await?;
        if result {
            self.invalidate_cache(short_code).await;
        }
        Ok(result)
    }

    async fn reactivate(&self, short_code: &str) -> Result<bool> {
        let result = self.inner.reactivate(short_code).await?;
        if result {
            self.invalidate_cache(short_code).await;
        }
        Ok(result)
    }

    async fn delete(&self, short_code: &str) -> Result<bool> {
        let result = self.inner.delete(short_code).await?;
        self.invalidate_cache(short_code).await;
        Ok(result)
    }

    async fn list_links(
        &self,
        scope: &OwnerScope,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ShortLink>> {
        self.inner.list_links(scope, limit, offset).await
    }

    async fn count_links(&self, scope: &OwnerScope) -> Result<i64> {
        self.inner.count_links(scope).await
    }

    async fn insert_click(&self, click: &NewClickEvent) -> Result<ClickEvent> {
        self.inner.insert_click(click).await
    }

    async fn record_click(&self, click: &NewClickEvent) -> StorageResult<ClickEvent> {
        self.inner.record_click(click).await
    }

    async fn clicks_for_link(
        &self,
        link_id: i64,
        range: Option<TimeRange>,
    ) -> Result<Vec<ClickEvent>> {
        self.inner.clicks_for_link(link_id, range).await
    }

    async fn clicks_for_owner(
        &self,
        scope: &OwnerScope,
        range: Option<TimeRange>,
    ) -> Result<Vec<ClickEvent>> {
        self.inner.clicks_for_owner(scope, range).await
    }

    async fn count_clicks_by(
        &self,
        link_id: i64,
        dimension: Dimension,
        range: Option<TimeRange>,
        limit: i64,
    ) -> Result<Vec<DimensionCount>> {
        self.inner
            .count_clicks_by(link_id, dimension, range, limit)
            .await
    }
}
