use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use thiserror::Error;

/// How a short code came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeOrigin {
    Generated,
    Custom,
}

impl CodeOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeOrigin::Generated => "generated",
            CodeOrigin::Custom => "custom",
        }
    }
}

impl fmt::Display for CodeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown code origin '{0}'")]
pub struct InvalidCodeOrigin(pub String);

impl TryFrom<String> for CodeOrigin {
    type Error = InvalidCodeOrigin;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "generated" => Ok(CodeOrigin::Generated),
            "custom" => Ok(CodeOrigin::Custom),
            _ => Err(InvalidCodeOrigin(value)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShortLink {
    pub id: i64,
    pub short_code: String,
    pub original_url: String,
    pub title: Option<String>,
    pub created_at: i64,
    pub created_by: Option<String>,
    pub clicks: i64,
    pub expires_at: Option<i64>,
    pub is_active: bool,
    #[sqlx(try_from = "String")]
    pub code_origin: CodeOrigin,
}

impl ShortLink {
    /// Whether the link has an expiry that lies strictly before `now` (unix seconds)
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at < now)
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.created_by.as_deref() == Some(user_id)
    }
}

/// Everything the storage layer needs to persist a new link
#[derive(Debug, Clone)]
pub struct NewLink {
    pub short_code: String,
    pub original_url: String,
    pub title: Option<String>,
    pub created_at: i64,
    pub created_by: Option<String>,
    pub expires_at: Option<i64>,
    pub code_origin: CodeOrigin,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLinkRequest {
    pub url: String,
    pub title: Option<String>,
    pub custom_code: Option<String>,
    pub expires_in_days: Option<u32>,
}
