use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::analytics::user_agent::DeviceType;

/// One persisted redirect. Never updated once written.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClickEvent {
    pub id: i64,
    pub link_id: i64,
    /// Event time (unix seconds) taken when the redirect request arrived
    pub clicked_at: i64,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub user_agent: Option<String>,
    pub device_type: String,
    pub browser: String,
    pub operating_system: String,
    pub referrer: Option<String>,
}

impl ClickEvent {
    pub fn device(&self) -> DeviceType {
        DeviceType::from_label(&self.device_type)
    }
}

/// A click event that has not been assigned an id yet
#[derive(Debug, Clone)]
pub struct NewClickEvent {
    pub link_id: i64,
    pub clicked_at: i64,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub user_agent: Option<String>,
    pub device_type: DeviceType,
    pub browser: String,
    pub operating_system: String,
    pub referrer: Option<String>,
}

impl NewClickEvent {
    pub fn into_event(self, id: i64) -> ClickEvent {
        ClickEvent {
            id,
            link_id: self.link_id,
            clicked_at: self.clicked_at,
            ip_address: self.ip_address,
            country: self.country,
            city: self.city,
            user_agent: self.user_agent,
            device_type: self.device_type.as_str().to_string(),
            browser: self.browser,
            operating_system: self.operating_system,
            referrer: self.referrer,
        }
    }
}
