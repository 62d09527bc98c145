//! Click-event aggregation
//!
//! Turns a snapshot of click events into time buckets, ranked dimensions,
//! a device breakdown and a dashboard summary in one pass over the input.
//! Everything here is a pure computation: no I/O, and empty input simply
//! yields zeroes and empty collections.
//!
//! Ranked lists are sorted by click count descending, ties broken by the key
//! in ascending order, and truncated to [`TOP_N`] entries.

use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use std::collections::HashMap;

use crate::analytics::models::{
    percentage, AggregationResult, BrowserStats, CityStats, CountryStats, DashboardStats,
    DeviceStats, LinkSummary, ReferrerStats, TimeRange, UNKNOWN_LOCATION,
};
use crate::analytics::user_agent::DeviceType;
use crate::models::{ClickEvent, ShortLink};

/// Length of every ranked list
pub const TOP_N: usize = 10;

const SECONDS_PER_DAY: i64 = 86_400;
const TRAILING_WEEK_SECS: i64 = 7 * SECONDS_PER_DAY;

/// Stateless aggregator; the offset decides which calendar day and hour a
/// click belongs to.
#[derive(Debug, Clone, Copy)]
pub struct AnalyticsAggregator {
    offset: FixedOffset,
    top_n: usize,
}

impl AnalyticsAggregator {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            top_n: TOP_N,
        }
    }

    /// Aggregator for a fixed offset from UTC; `None` when the offset is out
    /// of range (more than a day either way)
    pub fn with_utc_offset_minutes(minutes: i32) -> Option<Self> {
        let seconds = minutes.checked_mul(60)?;
        FixedOffset::east_opt(seconds).map(Self::new)
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Aggregate every event in the snapshot
    pub fn aggregate(&self, events: &[ClickEvent], now: i64) -> AggregationResult {
        let refs: Vec<&ClickEvent> = events.iter().collect();
        self.aggregate_refs(&refs, now)
    }

    /// Aggregate only events whose timestamp falls inside `range` (inclusive)
    pub fn aggregate_range(
        &self,
        events: &[ClickEvent],
        range: TimeRange,
        now: i64,
    ) -> AggregationResult {
        let refs: Vec<&ClickEvent> = events
            .iter()
            .filter(|event| range.contains(event.clicked_at))
            .collect();
        self.aggregate_refs(&refs, now)
    }

    /// Dashboard summary for one link's events
    pub fn summarize(&self, events: &[ClickEvent], now: i64) -> LinkSummary {
        let refs: Vec<&ClickEvent> = events.iter().collect();
        self.summary(&refs, now)
    }

    /// Overview across a set of links and their combined click events
    pub fn dashboard_stats(&self, links: &[ShortLink], events: &[ClickEvent]) -> DashboardStats {
        let total_links = links.len() as u64;
        let active_links = links.iter().filter(|link| link.is_active).count() as u64;
        let total_clicks: u64 = links.iter().map(|link| link.clicks.max(0) as u64).sum();
        let avg_clicks_per_link = if total_links == 0 {
            0.0
        } else {
            total_clicks as f64 / total_links as f64
        };

        let refs: Vec<&ClickEvent> = events.iter().collect();
        let top_country = rank(count_countries(&refs), 1)
            .into_iter()
            .next()
            .map(|(country, _)| country.to_string());

        DashboardStats {
            total_links,
            active_links,
            total_clicks,
            avg_clicks_per_link,
            top_country,
        }
    }

    fn aggregate_refs(&self, events: &[&ClickEvent], now: i64) -> AggregationResult {
        let total = events.len() as u64;
        let mut result = AggregationResult {
            total_clicks: total,
            ..Default::default()
        };

        for event in events {
            if let Some(local) = self.local_time(event.clicked_at) {
                let date = local.date_naive().format("%Y-%m-%d").to_string();
                *result.clicks_by_date.entry(date).or_insert(0) += 1;
                *result.clicks_by_hour.entry(local.hour()).or_insert(0) += 1;
            }
        }

        result.top_countries = rank(count_countries(events), self.top_n)
            .into_iter()
            .map(|(country, clicks)| CountryStats {
                country: country.to_string(),
                clicks,
                percentage: percentage(clicks, total),
            })
            .collect();

        result.top_cities = rank(count_cities(events), self.top_n)
            .into_iter()
            .map(|((city, country), clicks)| CityStats {
                city: city.to_string(),
                country: country.to_string(),
                clicks,
                percentage: percentage(clicks, total),
            })
            .collect();

        result.top_browsers = rank(
            count_by(events, |event| present(Some(event.browser.as_str()))),
            self.top_n,
        )
        .into_iter()
        .map(|(browser, clicks)| BrowserStats {
            browser: browser.to_string(),
            clicks,
            percentage: percentage(clicks, total),
        })
        .collect();

        result.top_referrers = rank(
            count_by(events, |event| present(event.referrer.as_deref())),
            self.top_n,
        )
        .into_iter()
        .map(|(referrer, clicks)| ReferrerStats {
            referrer: referrer.to_string(),
            clicks,
            percentage: percentage(clicks, total),
        })
        .collect();

        result.device_stats = device_stats(events);
        result.summary = self.summary(events, now);
        result
    }

    fn summary(&self, events: &[&ClickEvent], now: i64) -> LinkSummary {
        if events.is_empty() {
            return LinkSummary::default();
        }

        let (top_country, top_country_clicks) = rank(count_countries(events), 1)
            .into_iter()
            .next()
            .map(|(country, clicks)| (Some(country.to_string()), clicks))
            .unwrap_or((None, 0));

        let (top_device_type, top_device_clicks) = rank(
            count_by(events, |event| Some(event.device().as_str())),
            1,
        )
        .into_iter()
        .next()
        .map(|(device, clicks)| (Some(device.to_string()), clicks))
        .unwrap_or((None, 0));

        let midnight = self.start_of_day(now);
        let week_start = now.saturating_sub(TRAILING_WEEK_SECS);

        LinkSummary {
            total_clicks: events.len() as u64,
            last_clicked_at: events.iter().map(|event| event.clicked_at).max(),
            top_country,
            top_country_clicks,
            top_device_type,
            top_device_clicks,
            clicks_today: events
                .iter()
                .filter(|event| event.clicked_at >= midnight)
                .count() as u64,
            clicks_this_week: events
                .iter()
                .filter(|event| event.clicked_at >= week_start)
                .count() as u64,
        }
    }

    fn local_time(&self, timestamp: i64) -> Option<DateTime<FixedOffset>> {
        DateTime::from_timestamp(timestamp, 0).map(|utc| utc.with_timezone(&self.offset))
    }

    /// Unix timestamp of the most recent local midnight at or before `now`
    fn start_of_day(&self, now: i64) -> i64 {
        match self.local_time(now) {
            Some(local) => now - i64::from(local.num_seconds_from_midnight()),
            None => now - now.rem_euclid(SECONDS_PER_DAY),
        }
    }
}

impl Default for AnalyticsAggregator {
    fn default() -> Self {
        Self::utc()
    }
}

/// Trimmed, non-empty value or nothing
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn count_by<'a, K, F>(events: &[&'a ClickEvent], key: F) -> HashMap<K, u64>
where
    K: std::hash::Hash + Eq,
    F: Fn(&'a ClickEvent) -> Option<K>,
{
    let mut counts = HashMap::new();
    for event in events {
        if let Some(k) = key(event) {
            *counts.entry(k).or_insert(0) += 1;
        }
    }
    counts
}

fn count_countries<'a>(events: &[&'a ClickEvent]) -> HashMap<&'a str, u64> {
    count_by(events, |event| present(event.country.as_deref()))
}

/// Cities are keyed by (city, country) so same-named cities stay apart
fn count_cities<'a>(events: &[&'a ClickEvent]) -> HashMap<(&'a str, &'a str), u64> {
    count_by(events, |event| {
        present(event.city.as_deref()).map(|city| {
            let country = present(event.country.as_deref()).unwrap_or(UNKNOWN_LOCATION);
            (city, country)
        })
    })
}

fn rank<K: Ord>(counts: HashMap<K, u64>, limit: usize) -> Vec<(K, u64)> {
    let mut entries: Vec<(K, u64)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(limit);
    entries
}

fn device_stats(events: &[&ClickEvent]) -> DeviceStats {
    let total = events.len() as u64;
    let mut stats = DeviceStats::default();

    for event in events {
        match event.device() {
            DeviceType::Mobile => stats.mobile += 1,
            DeviceType::Desktop => stats.desktop += 1,
            DeviceType::Tablet => stats.tablet += 1,
            DeviceType::Unknown => stats.unknown += 1,
        }
    }

    stats.mobile_percentage = percentage(stats.mobile, total);
    stats.desktop_percentage = percentage(stats.desktop, total);
    stats.tablet_percentage = percentage(stats.tablet, total);
    stats.unknown_percentage = percentage(stats.unknown, total);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CodeOrigin;
    use chrono::{TimeZone, Utc};

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap().timestamp()
    }

    fn click(id: i64, clicked_at: i64) -> ClickEvent {
        ClickEvent {
            id,
            link_id: 1,
            clicked_at,
            ip_address: Some("203.0.113.1".to_string()),
            country: Some("Thailand".to_string()),
            city: Some("Bangkok".to_string()),
            user_agent: None,
            device_type: "desktop".to_string(),
            browser: "Chrome".to_string(),
            operating_system: "Windows 10".to_string(),
            referrer: None,
        }
    }

    fn link(id: i64, clicks: i64, is_active: bool) -> ShortLink {
        ShortLink {
            id,
            short_code: format!("code{id}"),
            original_url: "https://example.com".to_string(),
            title: None,
            created_at: 0,
            created_by: Some("owner".to_string()),
            clicks,
            expires_at: None,
            is_active,
            code_origin: CodeOrigin::Generated,
        }
    }

    #[test]
    fn test_empty_input() {
        let result = AnalyticsAggregator::utc().aggregate(&[], ts(2024, 1, 1, 0, 0));
        assert_eq!(result.total_clicks, 0);
        assert!(result.clicks_by_date.is_empty());
        assert!(result.clicks_by_hour.is_empty());
        assert!(result.top_countries.is_empty());
        assert!(result.top_cities.is_empty());
        assert!(result.top_browsers.is_empty());
        assert!(result.top_referrers.is_empty());
        assert_eq!(result.device_stats, DeviceStats::default());
        assert_eq!(result.summary, LinkSummary::default());
    }

    #[test]
    fn test_time_buckets() {
        let events = vec![
            click(1, ts(2024, 3, 10, 14, 5)),
            click(2, ts(2024, 3, 10, 14, 55)),
            click(3, ts(2024, 3, 9, 14, 30)),
            click(4, ts(2024, 3, 11, 2, 0)),
        ];
        let result = AnalyticsAggregator::utc().aggregate(&events, ts(2024, 3, 12, 0, 0));

        let dates: Vec<(&str, u64)> = result
            .clicks_by_date
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        assert_eq!(
            dates,
            vec![("2024-03-09", 1), ("2024-03-10", 2), ("2024-03-11", 1)]
        );

        let hours: Vec<(u32, u64)> = result.clicks_by_hour.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(hours, vec![(2, 1), (14, 3)]);
    }

    #[test]
    fn test_time_buckets_follow_offset() {
        // 23:30 UTC is 06:30 the next day at UTC+7
        let events = vec![click(1, ts(2024, 3, 10, 23, 30))];
        let aggregator = AnalyticsAggregator::with_utc_offset_minutes(7 * 60).unwrap();
        let result = aggregator.aggregate(&events, ts(2024, 3, 12, 0, 0));

        assert_eq!(result.clicks_by_date.get("2024-03-11"), Some(&1));
        assert_eq!(result.clicks_by_hour.get(&6), Some(&1));
    }

    #[test]
    fn test_top_countries_truncated_to_ten() {
        let events: Vec<ClickEvent> = (0..15)
            .map(|i| {
                let mut event = click(i, ts(2024, 1, 1, 0, 0));
                event.country = Some(format!("Country{i:02}"));
                event
            })
            .collect();
        let result = AnalyticsAggregator::utc().aggregate(&events, ts(2024, 1, 2, 0, 0));

        assert_eq!(result.top_countries.len(), 10);
        assert!(result
            .top_countries
            .windows(2)
            .all(|pair| pair[0].clicks >= pair[1].clicks));
        // equal counts fall back to key order
        assert_eq!(result.top_countries[0].country, "Country00");
        assert_eq!(result.top_countries[9].country, "Country09");
    }

    #[test]
    fn test_ranking_by_count() {
        let mut events = Vec::new();
        for (i, country) in ["Japan", "Japan", "Japan", "Laos", "Laos", "Chile"]
            .into_iter()
            .enumerate()
        {
            let mut event = click(i as i64, ts(2024, 1, 1, 0, 0));
            event.country = Some(country.to_string());
            events.push(event);
        }
        let result = AnalyticsAggregator::utc().aggregate(&events, ts(2024, 1, 2, 0, 0));

        let ranked: Vec<(&str, u64)> = result
            .top_countries
            .iter()
            .map(|c| (c.country.as_str(), c.clicks))
            .collect();
        assert_eq!(ranked, vec![("Japan", 3), ("Laos", 2), ("Chile", 1)]);
        assert!((result.top_countries[0].percentage - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentages_sum_to_hundred() {
        let browsers = ["Chrome", "Firefox", "Safari", "Edge", "Chrome", "Chrome", "Opera"];
        let events: Vec<ClickEvent> = browsers
            .iter()
            .enumerate()
            .map(|(i, browser)| {
                let mut event = click(i as i64, ts(2024, 1, 1, 0, 0));
                event.browser = browser.to_string();
                event
            })
            .collect();
        let result = AnalyticsAggregator::utc().aggregate(&events, ts(2024, 1, 2, 0, 0));

        let sum: f64 = result.top_browsers.iter().map(|b| b.percentage).sum();
        assert!((sum - 100.0).abs() < 1e-9, "sum was {sum}");
    }

    #[test]
    fn test_cities_keyed_by_country() {
        let mut paris_fr = click(1, ts(2024, 1, 1, 0, 0));
        paris_fr.city = Some("Paris".to_string());
        paris_fr.country = Some("France".to_string());
        let mut paris_us = click(2, ts(2024, 1, 1, 0, 0));
        paris_us.city = Some("Paris".to_string());
        paris_us.country = Some("United States".to_string());
        let mut no_city = click(3, ts(2024, 1, 1, 0, 0));
        no_city.city = None;

        let result = AnalyticsAggregator::utc()
            .aggregate(&[paris_fr, paris_us, no_city], ts(2024, 1, 2, 0, 0));

        assert_eq!(result.top_cities.len(), 2);
        assert!(result
            .top_cities
            .iter()
            .all(|c| c.city == "Paris" && c.clicks == 1));
        let countries: Vec<&str> = result.top_cities.iter().map(|c| c.country.as_str()).collect();
        assert_eq!(countries, vec!["France", "United States"]);
    }

    #[test]
    fn test_referrers_skip_missing_values() {
        let mut a = click(1, ts(2024, 1, 1, 0, 0));
        a.referrer = Some("https://news.example".to_string());
        let mut b = click(2, ts(2024, 1, 1, 0, 0));
        b.referrer = Some("".to_string());
        let c = click(3, ts(2024, 1, 1, 0, 0));

        let result = AnalyticsAggregator::utc().aggregate(&[a, b, c], ts(2024, 1, 2, 0, 0));

        assert_eq!(result.top_referrers.len(), 1);
        assert_eq!(result.top_referrers[0].clicks, 1);
        // percentage is relative to every event, not just those with a referrer
        assert!((result.top_referrers[0].percentage - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_device_stats() {
        let labels = ["mobile", "mobile", "desktop", "tablet", "unknown", "smart-tv"];
        let events: Vec<ClickEvent> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let mut event = click(i as i64, ts(2024, 1, 1, 0, 0));
                event.device_type = label.to_string();
                event
            })
            .collect();
        let stats = AnalyticsAggregator::utc()
            .aggregate(&events, ts(2024, 1, 2, 0, 0))
            .device_stats;

        assert_eq!(
            (stats.mobile, stats.desktop, stats.tablet, stats.unknown),
            (2, 1, 1, 2)
        );
        let sum = stats.mobile_percentage
            + stats.desktop_percentage
            + stats.tablet_percentage
            + stats.unknown_percentage;
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary() {
        let now = ts(2024, 5, 20, 15, 0);
        let mut events = vec![
            click(1, ts(2024, 5, 20, 9, 0)),
            click(2, ts(2024, 5, 20, 0, 0)),
            click(3, ts(2024, 5, 19, 23, 59)),
            click(4, ts(2024, 5, 14, 16, 0)),
            click(5, ts(2024, 5, 1, 12, 0)),
        ];
        events[0].device_type = "mobile".to_string();
        events[1].device_type = "mobile".to_string();
        events[4].country = Some("Japan".to_string());

        let summary = AnalyticsAggregator::utc().summarize(&events, now);

        assert_eq!(summary.total_clicks, 5);
        assert_eq!(summary.last_clicked_at, Some(ts(2024, 5, 20, 9, 0)));
        assert_eq!(summary.top_country.as_deref(), Some("Thailand"));
        assert_eq!(summary.top_country_clicks, 4);
        assert_eq!(summary.top_device_type.as_deref(), Some("desktop"));
        assert_eq!(summary.top_device_clicks, 3);
        assert_eq!(summary.clicks_today, 2);
        assert_eq!(summary.clicks_this_week, 4);
    }

    #[test]
    fn test_summary_today_uses_local_midnight() {
        // 20:00 UTC on the 19th is already the 20th at UTC+7
        let now = ts(2024, 5, 20, 3, 0);
        let events = vec![click(1, ts(2024, 5, 19, 20, 0)), click(2, ts(2024, 5, 19, 16, 0))];

        let utc = AnalyticsAggregator::utc().summarize(&events, now);
        let bangkok = AnalyticsAggregator::with_utc_offset_minutes(420)
            .unwrap()
            .summarize(&events, now);

        assert_eq!(utc.clicks_today, 0);
        assert_eq!(bangkok.clicks_today, 1);
    }

    #[test]
    fn test_summary_device_tie_is_deterministic() {
        let mut events = vec![click(1, 100), click(2, 200)];
        events[0].device_type = "tablet".to_string();
        events[1].device_type = "mobile".to_string();

        for _ in 0..5 {
            let summary = AnalyticsAggregator::utc().summarize(&events, 300);
            assert_eq!(summary.top_device_type.as_deref(), Some("mobile"));
        }
    }

    #[test]
    fn test_range_filter() {
        let events = vec![
            click(1, ts(2024, 1, 1, 0, 0)),
            click(2, ts(2024, 1, 5, 0, 0)),
            click(3, ts(2024, 1, 9, 0, 0)),
        ];
        let aggregator = AnalyticsAggregator::utc();
        let now = ts(2024, 2, 1, 0, 0);

        let everything = TimeRange::new(ts(2024, 1, 1, 0, 0), ts(2024, 1, 9, 0, 0));
        assert_eq!(
            aggregator.aggregate_range(&events, everything, now),
            aggregator.aggregate(&events, now)
        );

        let middle = TimeRange::new(ts(2024, 1, 2, 0, 0), ts(2024, 1, 5, 0, 0));
        assert_eq!(aggregator.aggregate_range(&events, middle, now).total_clicks, 1);

        let nothing = TimeRange::new(ts(2023, 1, 1, 0, 0), ts(2023, 12, 31, 0, 0));
        let empty = aggregator.aggregate_range(&events, nothing, now);
        assert_eq!(empty.total_clicks, 0);
        assert!(empty.top_countries.is_empty());
        assert!(empty.clicks_by_date.is_empty());
    }

    #[test]
    fn test_dashboard_stats() {
        let links = vec![link(1, 10, true), link(2, 5, false), link(3, 0, true)];
        let mut events = vec![click(1, 0), click(2, 0), click(3, 0)];
        events[2].country = Some("Laos".to_string());

        let stats = AnalyticsAggregator::utc().dashboard_stats(&links, &events);

        assert_eq!(stats.total_links, 3);
        assert_eq!(stats.active_links, 2);
        assert_eq!(stats.total_clicks, 15);
        assert!((stats.avg_clicks_per_link - 5.0).abs() < 1e-9);
        assert_eq!(stats.top_country.as_deref(), Some("Thailand"));

        let empty = AnalyticsAggregator::utc().dashboard_stats(&[], &[]);
        assert_eq!(empty.avg_clicks_per_link, 0.0);
        assert_eq!(empty.top_country, None);
    }
}
