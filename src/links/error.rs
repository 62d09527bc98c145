use thiserror::Error;

use crate::shortcode::CodeGenError;

/// Why a link could not be served; only ever logged, never shown to visitors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    Missing,
    Inactive,
    Expired,
}

impl NotFoundReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotFoundReason::Missing => "short code not found",
            NotFoundReason::Inactive => "link has been deactivated",
            NotFoundReason::Expired => "link has expired",
        }
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link not found: {}", .0.as_str())]
    NotFound(NotFoundReason),
    #[error("short code '{0}' already exists")]
    DuplicateCode(String),
    #[error("no free short code found after {attempts} attempts")]
    CodeSpaceExhausted { attempts: usize },
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl LinkError {
    pub fn invalid(message: impl Into<String>) -> Self {
        LinkError::InvalidRequest(message.into())
    }
}

impl From<CodeGenError> for LinkError {
    fn from(err: CodeGenError) -> Self {
        match err {
            CodeGenError::Exhausted { attempts } => LinkError::CodeSpaceExhausted { attempts },
            CodeGenError::Check(e) => LinkError::Storage(e),
            other => LinkError::Storage(other.into()),
        }
    }
}
