//! Caller identity
//!
//! Authentication happens upstream (gateway or reverse proxy), which forwards
//! the verified identity in trusted headers. The [`Caller`] extractor reads
//! them once per request and handlers pass the value down explicitly.

use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use std::convert::Infallible;

use crate::models::ShortLink;
use crate::storage::OwnerScope;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

const ADMIN_ROLE: &str = "admin";

/// Who is making a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<String>,
    pub is_admin: bool,
}

impl Caller {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            is_admin: false,
        }
    }

    pub fn admin() -> Self {
        Self {
            user_id: None,
            is_admin: true,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        Self {
            user_id: header(USER_ID_HEADER).map(str::to_string),
            is_admin: header(USER_ROLE_HEADER).is_some_and(|role| role.eq_ignore_ascii_case(ADMIN_ROLE)),
        }
    }

    /// Links this caller may see; anonymous callers see none
    pub fn scope(&self) -> Option<OwnerScope> {
        if self.is_admin {
            Some(OwnerScope::All)
        } else {
            self.user_id.clone().map(OwnerScope::Owner)
        }
    }

    pub fn can_access(&self, link: &ShortLink) -> bool {
        self.is_admin
            || self
                .user_id
                .as_deref()
                .is_some_and(|user_id| link.is_owned_by(user_id))
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Caller::from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CodeOrigin;
    use axum::http::HeaderValue;

    fn link(owner: Option<&str>) -> ShortLink {
        ShortLink {
            id: 1,
            short_code: "abc".to_string(),
            original_url: "https://example.com".to_string(),
            title: None,
            created_at: 0,
            created_by: owner.map(str::to_string),
            clicks: 0,
            expires_at: None,
            is_active: true,
            code_origin: CodeOrigin::Generated,
        }
    }

    #[test]
    fn test_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("alice"));
        headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("Admin"));

        let caller = Caller::from_headers(&headers);
        assert_eq!(caller.user_id.as_deref(), Some("alice"));
        assert!(caller.is_admin);

        assert_eq!(Caller::from_headers(&HeaderMap::new()), Caller::anonymous());
    }

    #[test]
    fn test_access_rules() {
        let owned = link(Some("alice"));
        assert!(Caller::user("alice").can_access(&owned));
        assert!(!Caller::user("bob").can_access(&owned));
        assert!(Caller::admin().can_access(&owned));
        assert!(!Caller::anonymous().can_access(&owned));
        assert!(!Caller::user("alice").can_access(&link(None)));
    }

    #[test]
    fn test_scope() {
        assert_eq!(Caller::admin().scope(), Some(OwnerScope::All));
        assert_eq!(
            Caller::user("bob").scope(),
            Some(OwnerScope::Owner("bob".to_string()))
        );
        assert_eq!(Caller::anonymous().scope(), None);
    }
}
