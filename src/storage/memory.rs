//! In-process storage backed by `DashMap`, for tests and ephemeral runs.
//! Nothing survives a restart.

use crate::analytics::models::{Dimension, DimensionCount, TimeRange};
use crate::models::{ClickEvent, NewClickEvent, NewLink, ShortLink};
use crate::storage::{OwnerScope, Storage, StorageError, StorageResult};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Default)]
pub struct MemoryStorage {
    links: DashMap<String, ShortLink>,
    codes_by_id: DashMap<i64, String>,
    clicks: DashMap<i64, Vec<ClickEvent>>,
    next_link_id: AtomicI64,
    next_click_id: AtomicI64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn code_for(&self, link_id: i64) -> Result<String> {
        self.codes_by_id
            .get(&link_id)
            .map(|code| code.value().clone())
            .ok_or_else(|| anyhow!("link {} no longer exists", link_id))
    }

    fn set_active(&self, short_code: &str, active: bool) -> bool {
        match self.links.get_mut(short_code) {
            Some(mut link) => {
                link.is_active = active;
                true
            }
            None => false,
        }
    }

    fn links_in_scope(&self, scope: &OwnerScope) -> Vec<ShortLink> {
        self.links
            .iter()
            .filter(|entry| scope.includes(entry.created_by.as_deref()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn events_for(&self, link_id: i64, range: Option<TimeRange>) -> Vec<ClickEvent> {
        self.clicks
            .get(&link_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| range.map_or(true, |r| r.contains(e.clicked_at)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn newest_first(events: &mut [ClickEvent]) {
    events.sort_by(|a, b| b.clicked_at.cmp(&a.clicked_at).then(b.id.cmp(&a.id)));
}

fn dimension_value(event: &ClickEvent, dimension: Dimension) -> Option<&str> {
    let value = match dimension {
        Dimension::Country => event.country.as_deref(),
        Dimension::City => event.city.as_deref(),
        Dimension::Device => Some(event.device_type.as_str()),
        Dimension::Browser => Some(event.browser.as_str()),
        Dimension::Os => Some(event.operating_system.as_str()),
        Dimension::Referrer => event.referrer.as_deref(),
    };
    value.filter(|v| !v.trim().is_empty())
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn create_link(&self, link: NewLink) -> StorageResult<ShortLink> {
        match self.links.entry(link.short_code.clone()) {
            Entry::Occupied(_) => Err(StorageError::Conflict),
            Entry::Vacant(slot) => {
                let id = self.next_link_id.fetch_add(1, Ordering::SeqCst) + 1;
                let created = ShortLink {
                    id,
                    short_code: link.short_code,
                    original_url: link.original_url,
                    title: link.title,
                    created_at: link.created_at,
                    created_by: link.created_by,
                    clicks: 0,
                    expires_at: link.expires_at,
                    is_active: true,
                    code_origin: link.code_origin,
                };
                self.codes_by_id.insert(id, created.short_code.clone());
                slot.insert(created.clone());
                Ok(created)
            }
        }
    }

    async fn get(&self, short_code: &str) -> Result<Option<ShortLink>> {
        Ok(self.links.get(short_code).map(|link| link.value().clone()))
    }

    async fn increment_clicks(&self, link_id: i64) -> Result<()> {
        let code = self.code_for(link_id)?;
        if let Some(mut link) = self.links.get_mut(&code) {
            link.clicks += 1;
        }
        Ok(())
    }

    async fn deactivate(&self, short_code: &str) -> Result<bool> {
        Ok(self.set_active(short_code, false))
    }

    async fn reactivate(&self, short_code: &str) -> Result<bool> {
        Ok(self.set_active(short_code, true))
    }

    async fn delete(&self, short_code: &str) -> Result<bool> {
        let Some((_, link)) = self.links.remove(short_code) else {
            return Ok(false);
        };
        self.codes_by_id.remove(&link.id);
        self.clicks.remove(&link.id);
        Ok(true)
    }

    async fn list_links(
        &self,
        scope: &OwnerScope,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ShortLink>> {
        let mut links = self.links_in_scope(scope);
        links.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(links
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_links(&self, scope: &OwnerScope) -> Result<i64> {
        Ok(self
            .links
            .iter()
            .filter(|entry| scope.includes(entry.created_by.as_deref()))
            .count() as i64)
    }

    async fn insert_click(&self, click: &NewClickEvent) -> Result<ClickEvent> {
        let id = self.next_click_id.fetch_add(1, Ordering::SeqCst) + 1;
        let event = click.clone().into_event(id);
        self.clicks
            .entry(click.link_id)
            .or_default()
            .push(event.clone());
        Ok(event)
    }

    async fn record_click(&self, click: &NewClickEvent) -> StorageResult<ClickEvent> {
        let code = self
            .code_for(click.link_id)
            .map_err(|_| StorageError::Unavailable(click.link_id))?;
        // hold the link entry so the check, the event and the counter change together
        let mut link = self
            .links
            .get_mut(&code)
            .ok_or(StorageError::Unavailable(click.link_id))?;
        if !link.is_active || link.is_expired_at(click.clicked_at) {
            return Err(StorageError::Unavailable(click.link_id));
        }

        let id = self.next_click_id.fetch_add(1, Ordering::SeqCst) + 1;
        let event = click.clone().into_event(id);
        self.clicks
            .entry(click.link_id)
            .or_default()
            .push(event.clone());
        link.clicks += 1;

        Ok(event)
    }

    async fn clicks_for_link(
        &self,
        link_id: i64,
        range: Option<TimeRange>,
    ) -> Result<Vec<ClickEvent>> {
        let mut events = self.events_for(link_id, range);
        newest_first(&mut events);
        Ok(events)
    }

    async fn clicks_for_owner(
        &self,
        scope: &OwnerScope,
        range: Option<TimeRange>,
    ) -> Result<Vec<ClickEvent>> {
        let mut events: Vec<ClickEvent> = self
            .links_in_scope(scope)
            .iter()
            .flat_map(|link| self.events_for(link.id, range))
            .collect();
        newest_first(&mut events);
        Ok(events)
    }

    async fn count_clicks_by(
        &self,
        link_id: i64,
        dimension: Dimension,
        range: Option<TimeRange>,
        limit: i64,
    ) -> Result<Vec<DimensionCount>> {
        let events = self.events_for(link_id, range);

        let mut counts: HashMap<&str, i64> = HashMap::new();
        for event in &events {
            if let Some(value) = dimension_value(event, dimension) {
                *counts.entry(value).or_insert(0) += 1;
            }
        }

        let mut rows: Vec<DimensionCount> = counts
            .into_iter()
            .map(|(value, clicks)| DimensionCount {
                dimension: value.to_string(),
                clicks,
            })
            .collect();
        rows.sort_by(|a, b| b.clicks.cmp(&a.clicks).then_with(|| a.dimension.cmp(&b.dimension)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}
