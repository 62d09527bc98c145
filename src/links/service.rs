use serde::Serialize;
use std::sync::Arc;

use crate::analytics::geoip::GeoResolver;
use crate::analytics::models::{
    AggregationResult, DashboardStats, Dimension, DimensionCount, LinkSummary, TimeRange,
};
use crate::analytics::{AnalyticsAggregator, ClickRecorder, RequestContext};
use crate::auth::Caller;
use crate::links::error::{LinkError, NotFoundReason};
use crate::models::{CodeOrigin, CreateLinkRequest, NewLink, ShortLink};
use crate::shortcode::CodeGenerator;
use crate::storage::{Storage, StorageError};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_BREAKDOWN_LIMIT: u32 = 10;
pub const MAX_BREAKDOWN_LIMIT: u32 = 100;
pub const MAX_CUSTOM_CODE_LEN: usize = 32;
pub const MAX_TITLE_LEN: usize = 200;

const SECONDS_PER_DAY: i64 = 86_400;
/// Generate-then-insert rounds before a write conflict is reported
const GENERATED_WRITE_ROUNDS: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total: u64,
}

/// One row of the dashboard list
#[derive(Debug, Clone, Serialize)]
pub struct DashboardLink {
    #[serde(flatten)]
    pub link: ShortLink,
    pub is_expired: bool,
    pub summary: LinkSummary,
}

/// Full analytics for one link
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub short_code: String,
    pub original_url: String,
    pub title: Option<String>,
    pub created_at: i64,
    /// The persistent counter, or the filtered event count for a range request
    pub total_clicks: u64,
    pub range: Option<TimeRange>,
    pub analytics: AggregationResult,
}

pub struct LinkService {
    storage: Arc<dyn Storage>,
    generator: CodeGenerator,
    recorder: ClickRecorder,
    aggregator: AnalyticsAggregator,
}

impl LinkService {
    pub fn new(
        storage: Arc<dyn Storage>,
        generator: CodeGenerator,
        recorder: ClickRecorder,
        aggregator: AnalyticsAggregator,
    ) -> Self {
        Self {
            storage,
            generator,
            recorder,
            aggregator,
        }
    }

    pub fn geo(&self) -> &GeoResolver {
        self.recorder.geo()
    }

    /// Create a link under a custom or generated code
    pub async fn shorten(
        &self,
        caller: &Caller,
        request: CreateLinkRequest,
        now: i64,
    ) -> Result<ShortLink, LinkError> {
        let original_url = validate_url(&request.url)?;
        let title = validate_title(request.title.as_deref())?;
        let expires_at = match request.expires_in_days {
            Some(days) if days > 0 => Some(now + i64::from(days) * SECONDS_PER_DAY),
            _ => None,
        };
        let new_link = |short_code: String, code_origin: CodeOrigin| NewLink {
            short_code,
            original_url: original_url.clone(),
            title: title.clone(),
            created_at: now,
            created_by: caller.user_id.clone(),
            expires_at,
            code_origin,
        };

        let custom = request
            .custom_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty());

        if let Some(code) = custom {
            validate_custom_code(code)?;
            return match self
                .storage
                .create_link(new_link(code.to_string(), CodeOrigin::Custom))
                .await
            {
                Ok(link) => {
                    tracing::info!(short_code = %link.short_code, "custom link created");
                    Ok(link)
                }
                Err(StorageError::Conflict) => Err(LinkError::DuplicateCode(code.to_string())),
                Err(other) => Err(LinkError::Storage(other.into())),
            };
        }

        let mut round = 0;
        loop {
            round += 1;
            let storage = Arc::clone(&self.storage);
            let code = self
                .generator
                .generate_unique(move |code| {
                    let storage = Arc::clone(&storage);
                    async move { storage.exists(&code).await }
                })
                .await?;

            match self
                .storage
                .create_link(new_link(code.clone(), CodeOrigin::Generated))
                .await
            {
                Ok(link) => {
                    tracing::info!(short_code = %link.short_code, "link created");
                    return Ok(link);
                }
                // taken between the existence check and the insert
                Err(StorageError::Conflict) if round < GENERATED_WRITE_ROUNDS => {
                    tracing::warn!(short_code = %code, "generated code lost an insert race, regenerating");
                }
                Err(StorageError::Conflict) => return Err(LinkError::DuplicateCode(code)),
                Err(other) => return Err(LinkError::Storage(other.into())),
            }
        }
    }

    /// Look a code up and apply the eligibility rules in order:
    /// missing, then inactive, then expired.
    pub async fn resolve_eligible(&self, short_code: &str, now: i64) -> Result<ShortLink, LinkError> {
        let link = self.storage.get(short_code).await?;
        match ineligibility(link.as_ref(), now) {
            None => link.ok_or(LinkError::NotFound(NotFoundReason::Missing)),
            Some(reason) => {
                tracing::debug!(short_code, reason = reason.as_str(), "redirect refused");
                Err(LinkError::NotFound(reason))
            }
        }
    }

    /// Serve one redirect: check eligibility, record the click, return the
    /// destination
    pub async fn redirect(&self, short_code: &str, ctx: &RequestContext) -> Result<String, LinkError> {
        let link = self.resolve_eligible(short_code, ctx.received_at).await?;

        match self.recorder.record(&link, ctx).await {
            Ok(_) => Ok(link.original_url),
            // the lookup was stale; the authoritative read also refreshes any cache
            Err(StorageError::Unavailable(_)) => {
                let current = self.storage.get_authoritative(short_code).await?;
                let reason = ineligibility(current.as_ref(), ctx.received_at)
                    .unwrap_or(NotFoundReason::Inactive);
                tracing::debug!(short_code, reason = reason.as_str(), "redirect refused at write");
                Err(LinkError::NotFound(reason))
            }
            Err(e) => {
                tracing::error!(short_code, error = %e, "failed to record click");
                Err(LinkError::Storage(e.into()))
            }
        }
    }

    /// A link the caller owns (or any link for admins). Links the caller may
    /// not see are reported as missing.
    async fn owned_link(&self, caller: &Caller, short_code: &str) -> Result<ShortLink, LinkError> {
        match self.storage.get_authoritative(short_code).await? {
            Some(link) if caller.can_access(&link) => Ok(link),
            Some(_) => {
                tracing::debug!(short_code, user_id = ?caller.user_id, "link belongs to another owner");
                Err(LinkError::NotFound(NotFoundReason::Missing))
            }
            None => Err(LinkError::NotFound(NotFoundReason::Missing)),
        }
    }

    pub async fn get_link(&self, caller: &Caller, short_code: &str) -> Result<ShortLink, LinkError> {
        self.owned_link(caller, short_code).await
    }

    pub async fn list_links(
        &self,
        caller: &Caller,
        page: Option<u32>,
        size: Option<u32>,
    ) -> Result<Page<ShortLink>, LinkError> {
        let (page, size, offset) = page_window(page, size);
        let Some(scope) = caller.scope() else {
            return Ok(Page {
                items: Vec::new(),
                page,
                size,
                total: 0,
            });
        };

        let total = self.storage.count_links(&scope).await?;
        let items = self
            .storage
            .list_links(&scope, i64::from(size), offset)
            .await?;

        Ok(Page {
            items,
            page,
            size,
            total: total.max(0) as u64,
        })
    }

    pub async fn deactivate(&self, caller: &Caller, short_code: &str) -> Result<(), LinkError> {
        self.owned_link(caller, short_code).await?;
        if !self.storage.deactivate(short_code).await? {
            return Err(LinkError::NotFound(NotFoundReason::Missing));
        }
        tracing::info!(short_code, "link deactivated");
        Ok(())
    }

    pub async fn reactivate(&self, caller: &Caller, short_code: &str) -> Result<(), LinkError> {
        self.owned_link(caller, short_code).await?;
        if !self.storage.reactivate(short_code).await? {
            return Err(LinkError::NotFound(NotFoundReason::Missing));
        }
        tracing::info!(short_code, "link reactivated");
        Ok(())
    }

    /// Delete a link and its click history
    pub async fn delete(&self, caller: &Caller, short_code: &str) -> Result<(), LinkError> {
        self.owned_link(caller, short_code).await?;
        if !self.storage.delete(short_code).await? {
            return Err(LinkError::NotFound(NotFoundReason::Missing));
        }
        tracing::info!(short_code, "link deleted");
        Ok(())
    }

    pub async fn analytics(
        &self,
        caller: &Caller,
        short_code: &str,
        range: Option<TimeRange>,
        now: i64,
    ) -> Result<AnalyticsReport, LinkError> {
        validate_range(range)?;
        let link = self.owned_link(caller, short_code).await?;
        let events = self.storage.clicks_for_link(link.id, range).await?;

        let (analytics, total_clicks) = match range {
            Some(r) => {
                let analytics = self.aggregator.aggregate_range(&events, r, now);
                let total = analytics.total_clicks;
                (analytics, total)
            }
            None => (
                self.aggregator.aggregate(&events, now),
                link.clicks.max(0) as u64,
            ),
        };

        Ok(AnalyticsReport {
            short_code: link.short_code,
            original_url: link.original_url,
            title: link.title,
            created_at: link.created_at,
            total_clicks,
            range,
            analytics,
        })
    }

    /// One aggregate over every link in the caller's scope
    pub async fn owner_analytics(
        &self,
        caller: &Caller,
        range: Option<TimeRange>,
        now: i64,
    ) -> Result<AggregationResult, LinkError> {
        validate_range(range)?;
        let Some(scope) = caller.scope() else {
            return Ok(self.aggregator.aggregate(&[], now));
        };

        let events = self.storage.clicks_for_owner(&scope, range).await?;
        Ok(self.aggregator.aggregate(&events, now))
    }

    pub async fn dashboard(
        &self,
        caller: &Caller,
        page: Option<u32>,
        size: Option<u32>,
        now: i64,
    ) -> Result<Page<DashboardLink>, LinkError> {
        let links = self.list_links(caller, page, size).await?;

        let mut items = Vec::with_capacity(links.items.len());
        for link in links.items {
            let events = self.storage.clicks_for_link(link.id, None).await?;
            items.push(DashboardLink {
                is_expired: link.is_expired_at(now),
                summary: self.aggregator.summarize(&events, now),
                link,
            });
        }

        Ok(Page {
            items,
            page: links.page,
            size: links.size,
            total: links.total,
        })
    }

    pub async fn dashboard_stats(&self, caller: &Caller) -> Result<DashboardStats, LinkError> {
        let Some(scope) = caller.scope() else {
            return Ok(DashboardStats::default());
        };

        let links = self.storage.list_links(&scope, i64::MAX, 0).await?;
        let events = self.storage.clicks_for_owner(&scope, None).await?;
        Ok(self.aggregator.dashboard_stats(&links, &events))
    }

    /// Grouped counts for one dimension, computed by the storage backend
    pub async fn breakdown(
        &self,
        caller: &Caller,
        short_code: &str,
        dimension: Dimension,
        range: Option<TimeRange>,
        limit: Option<u32>,
    ) -> Result<Vec<DimensionCount>, LinkError> {
        validate_range(range)?;
        let link = self.owned_link(caller, short_code).await?;
        let limit = limit
            .unwrap_or(DEFAULT_BREAKDOWN_LIMIT)
            .clamp(1, MAX_BREAKDOWN_LIMIT);

        Ok(self
            .storage
            .count_clicks_by(link.id, dimension, range, i64::from(limit))
            .await?)
    }
}

/// Why `link` cannot be served at `now`, checked in order: missing, inactive,
/// expired
fn ineligibility(link: Option<&ShortLink>, now: i64) -> Option<NotFoundReason> {
    match link {
        None => Some(NotFoundReason::Missing),
        Some(link) if !link.is_active => Some(NotFoundReason::Inactive),
        Some(link) if link.is_expired_at(now) => Some(NotFoundReason::Expired),
        Some(_) => None,
    }
}

/// (page, size, offset) with page 1-based and size clamped to the maximum
fn page_window(page: Option<u32>, size: Option<u32>) -> (u32, u32, i64) {
    let page = page.unwrap_or(1).max(1);
    let size = size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = (i64::from(page) - 1) * i64::from(size);
    (page, size, offset)
}

fn validate_url(raw: &str) -> Result<String, LinkError> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(LinkError::invalid("URL cannot be empty"));
    }

    let parsed = reqwest::Url::parse(url).map_err(|_| LinkError::invalid("URL is not valid"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(url.to_string()),
        _ => Err(LinkError::invalid("URL must use http or https")),
    }
}

fn validate_custom_code(code: &str) -> Result<(), LinkError> {
    if code.chars().count() > MAX_CUSTOM_CODE_LEN {
        return Err(LinkError::invalid(format!(
            "Custom code must be at most {MAX_CUSTOM_CODE_LEN} characters"
        )));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(LinkError::invalid(
            "Custom code may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(())
}

fn validate_title(title: Option<&str>) -> Result<Option<String>, LinkError> {
    let Some(title) = title.map(str::trim) else {
        return Ok(None);
    };
    if title.is_empty() {
        return Err(LinkError::invalid("Title must not be blank"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(LinkError::invalid(format!(
            "Title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(Some(title.to_string()))
}

fn validate_range(range: Option<TimeRange>) -> Result<(), LinkError> {
    match range {
        Some(r) if r.start > r.end => Err(LinkError::invalid("start_time must not be after end_time")),
        _ => Ok(()),
    }
}
