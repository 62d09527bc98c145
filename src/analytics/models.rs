//! Data models for analytics

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Placeholder used for both fields when a location cannot be resolved
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// Coarse geographic location derived from an IP address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: String,
    pub city: String,
}

impl GeoLocation {
    pub fn new(country: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            city: city.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN_LOCATION, UNKNOWN_LOCATION)
    }

    pub fn is_unknown(&self) -> bool {
        self.country == UNKNOWN_LOCATION && self.city == UNKNOWN_LOCATION
    }
}

impl Default for GeoLocation {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Inclusive time window in unix seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryStats {
    pub country: String,
    pub clicks: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityStats {
    pub city: String,
    pub country: String,
    pub clicks: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserStats {
    pub browser: String,
    pub clicks: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferrerStats {
    pub referrer: String,
    pub clicks: u64,
    pub percentage: f64,
}

/// Fixed-shape device breakdown; `unknown` also absorbs unrecognized labels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub mobile: u64,
    pub desktop: u64,
    pub tablet: u64,
    pub unknown: u64,
    pub mobile_percentage: f64,
    pub desktop_percentage: f64,
    pub tablet_percentage: f64,
    pub unknown_percentage: f64,
}

/// Compact per-link aggregate used by list views
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkSummary {
    pub total_clicks: u64,
    pub last_clicked_at: Option<i64>,
    pub top_country: Option<String>,
    pub top_country_clicks: u64,
    pub top_device_type: Option<String>,
    pub top_device_clicks: u64,
    pub clicks_today: u64,
    pub clicks_this_week: u64,
}

/// Every derived statistic for one snapshot of click events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub total_clicks: u64,
    /// ISO date (`YYYY-MM-DD`) -> clicks, ascending
    pub clicks_by_date: BTreeMap<String, u64>,
    /// Hour of day (0-23) -> clicks across all dates, ascending
    pub clicks_by_hour: BTreeMap<u32, u64>,
    pub top_countries: Vec<CountryStats>,
    pub top_cities: Vec<CityStats>,
    pub device_stats: DeviceStats,
    pub top_browsers: Vec<BrowserStats>,
    pub top_referrers: Vec<ReferrerStats>,
    pub summary: LinkSummary,
}

/// Overview numbers across every link in a caller's scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_links: u64,
    pub active_links: u64,
    pub total_clicks: u64,
    pub avg_clicks_per_link: f64,
    pub top_country: Option<String>,
}

/// Click-event column that storage backends can group by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Country,
    City,
    Device,
    Browser,
    Os,
    Referrer,
}

impl Dimension {
    pub fn column(&self) -> &'static str {
        match self {
            Dimension::Country => "country",
            Dimension::City => "city",
            Dimension::Device => "device_type",
            Dimension::Browser => "browser",
            Dimension::Os => "operating_system",
            Dimension::Referrer => "referrer",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Country => "country",
            Dimension::City => "city",
            Dimension::Device => "device",
            Dimension::Browser => "browser",
            Dimension::Os => "os",
            Dimension::Referrer => "referrer",
        };
        f.write_str(name)
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "country" => Ok(Dimension::Country),
            "city" => Ok(Dimension::City),
            "device" | "device_type" => Ok(Dimension::Device),
            "browser" => Ok(Dimension::Browser),
            "os" | "operating_system" => Ok(Dimension::Os),
            "referrer" => Ok(Dimension::Referrer),
            other => Err(format!("unsupported dimension '{other}'")),
        }
    }
}

/// Grouped count returned by the storage push-down
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DimensionCount {
    pub dimension: String,
    pub clicks: i64,
}

/// Percentage of `count` in `total`, 0 when there is nothing to divide by
pub fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}
