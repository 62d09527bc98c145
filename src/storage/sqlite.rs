use crate::analytics::models::{Dimension, DimensionCount, TimeRange};
use crate::models::{ClickEvent, NewClickEvent, NewLink, ShortLink};
use crate::storage::trait_def::range_bounds;
use crate::storage::{OwnerScope, Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                short_code TEXT NOT NULL UNIQUE,
                original_url TEXT NOT NULL,
                title TEXT,
                created_at INTEGER NOT NULL,
                created_by TEXT,
                clicks INTEGER NOT NULL DEFAULT 0,
                expires_at INTEGER,
                is_active INTEGER NOT NULL DEFAULT 1,
                code_origin TEXT NOT NULL DEFAULT 'generated'
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_created_by ON links(created_by)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS click_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                link_id INTEGER NOT NULL REFERENCES links(id) ON DELETE CASCADE,
                clicked_at INTEGER NOT NULL,
                ip_address TEXT,
                country TEXT,
                city TEXT,
                user_agent TEXT,
                device_type TEXT NOT NULL,
                browser TEXT NOT NULL,
                operating_system TEXT NOT NULL,
                referrer TEXT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_click_events_link_time ON click_events(link_id, clicked_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn create_link(&self, link: NewLink) -> StorageResult<ShortLink> {
        let result = sqlx::query(
            r#"
            INSERT INTO links (short_code, original_url, title, created_at, created_by, expires_at, is_active, code_origin)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?)
            ON CONFLICT(short_code) DO NOTHING
            "#,
        )
        .bind(&link.short_code)
        .bind(&link.original_url)
        .bind(&link.title)
        .bind(link.created_at)
        .bind(&link.created_by)
        .bind(link.expires_at)
        .bind(link.code_origin.as_str())
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        let created = sqlx::query_as::<_, ShortLink>(
            r#"
            SELECT id, short_code, original_url, title, created_at, created_by, clicks, expires_at, is_active, code_origin
            FROM links
            WHERE id = ?
            "#,
        )
        .bind(result.last_insert_rowid())
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        Ok(created)
    }

    async fn get(&self, short_code: &str) -> Result<Option<ShortLink>> {
        let link = sqlx::query_as::<_, ShortLink>(
            r#"
            SELECT id, short_code, original_url, title, created_at, created_by, clicks, expires_at, is_active, code_origin
            FROM links
            WHERE short_code = ?
            "#,
        )
        .bind(short_code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    async fn increment_clicks(&self, link_id: i64) -> Result<()> {
        sqlx::query("UPDATE links SET clicks = clicks + 1 WHERE id = ?")
            .bind(link_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn deactivate(&self, short_code: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE links SET is_active = 0 WHERE short_code = ?")
            .bind(short_code)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reactivate(&self, short_code: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE links SET is_active = 1 WHERE short_code = ?")
            .bind(short_code)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, short_code: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // foreign keys are off unless enabled per connection, so cascade by hand
        sqlx::query(
            "DELETE FROM click_events WHERE link_id IN (SELECT id FROM links WHERE short_code = ?)",
        )
        .bind(short_code)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM links WHERE short_code = ?")
            .bind(short_code)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_links(
        &self,
        scope: &OwnerScope,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ShortLink>> {
        let owner = scope.owner_filter();
        let links = sqlx::query_as::<_, ShortLink>(
            r#"
            SELECT id, short_code, original_url, title, created_at, created_by, clicks, expires_at, is_active, code_origin
            FROM links
            WHERE (? IS NULL OR created_by = ?)
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(owner)
        .bind(owner)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(links)
    }

    async fn count_links(&self, scope: &OwnerScope) -> Result<i64> {
        let owner = scope.owner_filter();
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM links WHERE (? IS NULL OR created_by = ?)",
        )
        .bind(owner)
        .bind(owner)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn insert_click(&self, click: &NewClickEvent) -> Result<ClickEvent> {
        let result = sqlx::query(
            r#"
            INSERT INTO click_events
                (link_id, clicked_at, ip_address, country, city, user_agent, device_type, browser, operating_system, referrer)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(click.link_id)
        .bind(click.clicked_at)
        .bind(&click.ip_address)
        .bind(&click.country)
        .bind(&click.city)
        .bind(&click.user_agent)
        .bind(click.device_type.as_str())
        .bind(&click.browser)
        .bind(&click.operating_system)
        .bind(&click.referrer)
        .execute(self.pool.as_ref())
        .await?;

        Ok(click.clone().into_event(result.last_insert_rowid()))
    }

    async fn record_click(&self, click: &NewClickEvent) -> StorageResult<ClickEvent> {
        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;

        let updated = sqlx::query(
            r#"
            UPDATE links SET clicks = clicks + 1
            WHERE id = ? AND is_active = 1 AND (expires_at IS NULL OR expires_at >= ?)
            "#,
        )
        .bind(click.link_id)
        .bind(click.clicked_at)
        .execute(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;

        // dropping the transaction rolls it back
        if updated.rows_affected() == 0 {
            return Err(StorageError::Unavailable(click.link_id));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO click_events
                (link_id, clicked_at, ip_address, country, city, user_agent, device_type, browser, operating_system, referrer)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(click.link_id)
        .bind(click.clicked_at)
        .bind(&click.ip_address)
        .bind(&click.country)
        .bind(&click.city)
        .bind(&click.user_agent)
        .bind(click.device_type.as_str())
        .bind(&click.browser)
        .bind(&click.operating_system)
        .bind(&click.referrer)
        .execute(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;

        tx.commit().await.map_err(anyhow::Error::from)?;
        Ok(click.clone().into_event(inserted.last_insert_rowid()))
    }

    async fn clicks_for_link(
        &self,
        link_id: i64,
        range: Option<TimeRange>,
    ) -> Result<Vec<ClickEvent>> {
        let (start, end) = range_bounds(range);
        let events = sqlx::query_as::<_, ClickEvent>(
            r#"
            SELECT id, link_id, clicked_at, ip_address, country, city, user_agent, device_type, browser, operating_system, referrer
            FROM click_events
            WHERE link_id = ? AND clicked_at BETWEEN ? AND ?
            ORDER BY clicked_at DESC, id DESC
            "#,
        )
        .bind(link_id)
        .bind(start)
        .bind(end)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(events)
    }

    async fn clicks_for_owner(
        &self,
        scope: &OwnerScope,
        range: Option<TimeRange>,
    ) -> Result<Vec<ClickEvent>> {
        let owner = scope.owner_filter();
        let (start, end) = range_bounds(range);
        let events = sqlx::query_as::<_, ClickEvent>(
            r#"
            SELECT c.id, c.link_id, c.clicked_at, c.ip_address, c.country, c.city, c.user_agent,
                   c.device_type, c.browser, c.operating_system, c.referrer
            FROM click_events c
            JOIN links l ON l.id = c.link_id
            WHERE (? IS NULL OR l.created_by = ?) AND c.clicked_at BETWEEN ? AND ?
            ORDER BY c.clicked_at DESC, c.id DESC
            "#,
        )
        .bind(owner)
        .bind(owner)
        .bind(start)
        .bind(end)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(events)
    }

    async fn count_clicks_by(
        &self,
        link_id: i64,
        dimension: Dimension,
        range: Option<TimeRange>,
        limit: i64,
    ) -> Result<Vec<DimensionCount>> {
        let (start, end) = range_bounds(range);
        // column names come from a fixed whitelist
        let column = dimension.column();
        let sql = format!(
            r#"
            SELECT {column} AS dimension, COUNT(*) AS clicks
            FROM click_events
            WHERE link_id = ? AND clicked_at BETWEEN ? AND ?
              AND {column} IS NOT NULL AND TRIM({column}) <> ''
            GROUP BY {column}
            ORDER BY clicks DESC, dimension ASC
            LIMIT ?
            "#
        );

        let counts = sqlx::query_as::<_, DimensionCount>(&sql)
            .bind(link_id)
            .bind(start)
            .bind(end)
            .bind(limit)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(counts)
    }
}
