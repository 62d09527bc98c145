//! Link lifecycle: shortening, redirect eligibility, owner views and reports

pub mod error;
pub mod service;

pub use error::{LinkError, NotFoundReason};
pub use service::{AnalyticsReport, DashboardLink, LinkService, Page};
