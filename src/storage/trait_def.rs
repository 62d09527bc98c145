use crate::analytics::models::{Dimension, DimensionCount, TimeRange};
use crate::models::{ClickEvent, NewClickEvent, NewLink, ShortLink};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("short code already exists")]
    Conflict,
    /// The link is missing, inactive or expired at the click's time
    #[error("link {0} is not accepting clicks")]
    Unavailable(i64),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Which links a query may see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerScope {
    /// Every link (admin view)
    All,
    /// Only links created by this user
    Owner(String),
}

impl OwnerScope {
    pub fn includes(&self, created_by: Option<&str>) -> bool {
        match self {
            OwnerScope::All => true,
            OwnerScope::Owner(owner) => created_by == Some(owner.as_str()),
        }
    }

    /// Owner filter for SQL backends; `None` matches every row
    pub(crate) fn owner_filter(&self) -> Option<&str> {
        match self {
            OwnerScope::All => None,
            OwnerScope::Owner(owner) => Some(owner.as_str()),
        }
    }
}

/// Inclusive bounds for SQL backends; no range means the whole timeline
pub(crate) fn range_bounds(range: Option<TimeRange>) -> (i64, i64) {
    range.map_or((i64::MIN, i64::MAX), |r| (r.start, r.end))
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables, indexes)
    async fn init(&self) -> Result<()>;

    /// Persist a new link. A taken short code is `StorageError::Conflict`.
    async fn create_link(&self, link: NewLink) -> StorageResult<ShortLink>;

    /// Get a link by short code. May be served from a cache.
    async fn get(&self, short_code: &str) -> Result<Option<ShortLink>>;

    /// Get a link bypassing any cache layer
    async fn get_authoritative(&self, short_code: &str) -> Result<Option<ShortLink>> {
        self.get(short_code).await
    }

    async fn exists(&self, short_code: &str) -> Result<bool> {
        Ok(self.get_authoritative(short_code).await?.is_some())
    }

    /// Atomically add one to the link's click counter
    async fn increment_clicks(&self, link_id: i64) -> Result<()>;

    /// Deactivate a link (soft delete)
    async fn deactivate(&self, short_code: &str) -> Result<bool>;

    async fn reactivate(&self, short_code: &str) -> Result<bool>;

    /// Remove a link together with its click events
    async fn delete(&self, short_code: &str) -> Result<bool>;

    /// Links in scope, newest first
    async fn list_links(&self, scope: &OwnerScope, limit: i64, offset: i64)
        -> Result<Vec<ShortLink>>;

    async fn count_links(&self, scope: &OwnerScope) -> Result<i64>;

    /// Append a click event without touching the counter
    async fn insert_click(&self, click: &NewClickEvent) -> Result<ClickEvent>;

    /// Append a click event and bump the link's counter as one unit.
    ///
    /// Eligibility is re-checked against the stored row as part of the write:
    /// a link that is missing, inactive or expired at `click.clicked_at`
    /// records nothing and yields `StorageError::Unavailable`.
    async fn record_click(&self, click: &NewClickEvent) -> StorageResult<ClickEvent>;

    /// Click events for one link, newest first
    async fn clicks_for_link(
        &self,
        link_id: i64,
        range: Option<TimeRange>,
    ) -> Result<Vec<ClickEvent>>;

    /// Click events across every link in scope, newest first
    async fn clicks_for_owner(
        &self,
        scope: &OwnerScope,
        range: Option<TimeRange>,
    ) -> Result<Vec<ClickEvent>>;

    /// Grouped click counts for one dimension, busiest first.
    /// Rows with no value for the dimension are left out.
    async fn count_clicks_by(
        &self,
        link_id: i64,
        dimension: Dimension,
        range: Option<TimeRange>,
        limit: i64,
    ) -> Result<Vec<DimensionCount>>;
}
