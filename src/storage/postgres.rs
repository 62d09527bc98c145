use crate::analytics::models::{Dimension, DimensionCount, TimeRange};
use crate::models::{ClickEvent, NewClickEvent, NewLink, ShortLink};
use crate::storage::trait_def::range_bounds;
use crate::storage::{OwnerScope, Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id BIGSERIAL PRIMARY KEY,
                short_code TEXT NOT NULL UNIQUE,
                original_url TEXT NOT NULL,
                title TEXT,
                created_at BIGINT NOT NULL,
                created_by TEXT,
                clicks BIGINT NOT NULL DEFAULT 0,
                expires_at BIGINT,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
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
                id BIGSERIAL PRIMARY KEY,
                link_id BIGINT NOT NULL REFERENCES links(id) ON DELETE CASCADE,
                clicked_at BIGINT NOT NULL,
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
        let created = sqlx::query_as::<_, ShortLink>(
            r#"
            INSERT INTO links (short_code, original_url, title, created_at, created_by, expires_at, is_active, code_origin)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7)
            ON CONFLICT (short_code) DO NOTHING
            RETURNING id, short_code, original_url, title, created_at, created_by, clicks, expires_at, is_active, code_origin
            "#,
        )
        .bind(&link.short_code)
        .bind(&link.original_url)
        .bind(&link.title)
        .bind(link.created_at)
        .bind(&link.created_by)
        .bind(link.expires_at)
        .bind(link.code_origin.as_str())
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        created.ok_or(StorageError::Conflict)
    }

    async fn get(&self, short_code: &str) -> Result<Option<ShortLink>> {
        let link = sqlx::query_as::<_, ShortLink>(
            r#"
            SELECT id, short_code, original_url, title, created_at, created_by, clicks, expires_at, is_active, code_origin
            FROM links
            WHERE short_code = $1
            "#,
        )
        .bind(short_code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    async fn exists(&self, short_code: &str) -> Result<bool> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM links WHERE short_code = $1")
            .bind(short_code)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count.0 > 0)
    }

    async fn increment_clicks(&self, link_id: i64) -> Result<()> {
        sqlx::query("UPDATE links SET clicks = clicks + 1 WHERE id = $1")
            .bind(link_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn deactivate(&self, short_code: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE links SET is_active = FALSE WHERE short_code = $1")
            .bind(short_code)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reactivate(&self, short_code: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE links SET is_active = TRUE WHERE short_code = $1")
            .bind(short_code)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, short_code: &str) -> Result<bool> {
        // click_events rows go with the link through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM links WHERE short_code = $1")
            .bind(short_code)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_links(
        &self,
        scope: &OwnerScope,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ShortLink>> {
        let links = sqlx::query_as::<_, ShortLink>(
            r#"
            SELECT id, short_code, original_url, title, created_at, created_by, clicks, expires_at, is_active, code_origin
            FROM links
            WHERE ($1::TEXT IS NULL OR created_by = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(scope.owner_filter())
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(links)
    }

    async fn count_links(&self, scope: &OwnerScope) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM links WHERE ($1::TEXT IS NULL OR created_by = $1)",
        )
        .bind(scope.owner_filter())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn insert_click(&self, click: &NewClickEvent) -> Result<ClickEvent> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO click_events
                (link_id, clicked_at, ip_address, country, city, user_agent, device_type, browser, operating_system, referrer)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
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
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(click.clone().into_event(id))
    }

    async fn record_click(&self, click: &NewClickEvent) -> StorageResult<ClickEvent> {
        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;

        let updated = sqlx::query(
            r#"
            UPDATE links SET clicks = clicks + 1
            WHERE id = $1 AND is_active AND (expires_at IS NULL OR expires_at >= $2)
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

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO click_events
                (link_id, clicked_at, ip_address, country, city, user_agent, device_type, browser, operating_system, referrer)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
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
        .fetch_one(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;

        tx.commit().await.map_err(anyhow::Error::from)?;
        Ok(click.clone().into_event(id))
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
            WHERE link_id = $1 AND clicked_at BETWEEN $2 AND $3
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
        let (start, end) = range_bounds(range);
        let events = sqlx::query_as::<_, ClickEvent>(
            r#"
            SELECT c.id, c.link_id, c.clicked_at, c.ip_address, c.country, c.city, c.user_agent,
                   c.device_type, c.browser, c.operating_system, c.referrer
            FROM click_events c
            JOIN links l ON l.id = c.link_id
            WHERE ($1::TEXT IS NULL OR l.created_by = $1) AND c.clicked_at BETWEEN $2 AND $3
            ORDER BY c.clicked_at DESC, c.id DESC
            "#,
        )
        .bind(scope.owner_filter())
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
        let column = dimension.column();
        let sql = format!(
            r#"
            SELECT {column} AS dimension, COUNT(*) AS clicks
            FROM click_events
            WHERE link_id = $1 AND clicked_at BETWEEN $2 AND $3
              AND {column} IS NOT NULL AND TRIM({column}) <> ''
            GROUP BY {column}
            ORDER BY clicks DESC, dimension ASC
            LIMIT $4
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
