//! Click ingestion and analytics
//!
//! The write side (`recorder`) turns one redirect into a stored click event;
//! the read side (`aggregator`) turns a snapshot of click events into the
//! breakdowns shown on dashboards. Classification, IP extraction and geo
//! resolution are the building blocks both sides share.

pub mod aggregator;
pub mod geoip;
pub mod ip_extractor;
pub mod models;
pub mod recorder;
pub mod user_agent;

pub use aggregator::AnalyticsAggregator;
pub use geoip::{GeoProvider, GeoResolver};
pub use ip_extractor::extract_client_ip;
pub use models::{AggregationResult, GeoLocation, LinkSummary, TimeRange};
pub use recorder::{ClickRecorder, RequestContext};
