pub mod client;
pub mod comment;
pub mod create;
pub mod fetch;
pub mod reference;
pub mod session;
pub mod types;
mod wire;

pub use client::AdoClient;
pub use reference::PrLocator;
pub use types::{FileChange, Identity, NewPullRequest, PrInfo, PrRef};

use thiserror::Error;

/// Failures surfaced to the caller. Every variant names the operation or
/// reference involved; nothing here is retried.
#[derive(Debug, Error)]
pub enum PrError {
    #[error("Not authenticated: {0}. Run `az login` or set AZURE_DEVOPS_EXT_PAT")]
    Unauthenticated(String),

    #[error("Invalid PR reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("{operation}: not found or not accessible: {what}")]
    NotFound { operation: &'static str, what: String },

    #[error("{operation}: invalid arguments: {reason}")]
    Validation {
        operation: &'static str,
        reason: String,
    },

    #[error("{operation} failed{}: {message}", http_status(.status))]
    Remote {
        operation: &'static str,
        status: Option<u16>,
        message: String,
    },
}

impl PrError {
    /// Stable category name reported to the assistant.
    pub fn kind(&self) -> &'static str {
        match self {
            PrError::Unauthenticated(_) => "Unauthenticated",
            PrError::InvalidReference { .. } => "InvalidReference",
            PrError::NotFound { .. } => "NotFound",
            PrError::Validation { .. } => "ValidationError",
            PrError::Remote { .. } => "RemoteError",
        }
    }

    pub(crate) fn validation(operation: &'static str, reason: impl Into<String>) -> Self {
        PrError::Validation {
            operation,
            reason: reason.into(),
        }
    }

    pub(crate) fn remote(operation: &'static str, message: impl Into<String>) -> Self {
        PrError::Remote {
            operation,
            status: None,
            message: message.into(),
        }
    }
}

fn http_status(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" (HTTP {})", code))
        .unwrap_or_default()
}

/// Strip the leading `/` Azure DevOps puts on repository paths.
pub(crate) fn normalize_path(path: &str) -> &str {
    path.trim().trim_start_matches('/')
}
