//! Error types for the overleaflib library.

use thiserror::Error;

/// Main error type for overleaflib operations.
#[derive(Error, Debug)]
pub enum OverleafError {
    /// HTTP request failed with status code.
    #[error("HTTP error: {0}")]
    HttpError(u16),

    /// Network request error.
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    /// WebSocket (socket.io) exchange failed.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The session cookies were rejected by the server.
    #[error("Not authenticated: {0}")]
    Unauthorized(String),

    /// The transport gave up waiting for a response.
    #[error("Request timed out")]
    Timeout,

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid or unexpected response from server.
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    /// Path or entity id does not exist.
    #[error("No such file or directory: {path}{}", id_suffix(.id))]
    NotFound { path: String, id: Option<String> },

    /// Name collision or kind mismatch.
    #[error("Conflict at {path}: {message}")]
    Conflict { path: String, message: String },

    /// Creation of something that already exists was not allowed.
    #[error("Already exists: {path}")]
    AlreadyExists { path: String },

    /// Content exceeds the upload limit.
    #[error("Payload too large for {path}: {size} bytes")]
    PayloadTooLarge { path: String, size: u64 },

    /// The cached tree violates its own invariants.
    #[error("Corrupt tree at {path}: {message}")]
    CorruptTree { path: String, message: String },

    /// Path syntax not supported (e.g. `..`).
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Local I/O error (cookie files, CLI output).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Custom error message.
    #[error("{0}")]
    Custom(String),
}

fn id_suffix(id: &Option<String>) -> String {
    id.as_deref()
        .map(|id| format!(" (id {id})"))
        .unwrap_or_default()
}

impl OverleafError {
    /// Stale-id variant raised by the remote layer for an id it was given.
    pub(crate) fn stale(id: &str) -> Self {
        OverleafError::NotFound {
            path: String::new(),
            id: Some(id.to_string()),
        }
    }

    /// Path-level "not found" that did not involve a remote id.
    pub(crate) fn missing(path: &str) -> Self {
        OverleafError::NotFound {
            path: path.to_string(),
            id: None,
        }
    }

    pub(crate) fn conflict(path: &str, message: impl Into<String>) -> Self {
        OverleafError::Conflict {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn corrupt(path: &str, message: impl Into<String>) -> Self {
        OverleafError::CorruptTree {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Network, authentication or timeout failure. Retrying is up to the caller.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            OverleafError::HttpError(_)
                | OverleafError::RequestError(_)
                | OverleafError::WebSocket(_)
                | OverleafError::Unauthorized(_)
                | OverleafError::Timeout
        )
    }

    /// A remote "not found" for an id the caller believed valid, i.e. the
    /// cached tree has drifted from the server.
    pub fn is_drift(&self) -> bool {
        matches!(self, OverleafError::NotFound { id: Some(_), .. })
    }

    /// The stale entity id carried by a `NotFound`, if any.
    pub fn stale_id(&self) -> Option<&str> {
        match self {
            OverleafError::NotFound { id, .. } => id.as_deref(),
            _ => None,
        }
    }

    /// The path this error refers to, when it carries one.
    pub fn path(&self) -> Option<&str> {
        match self {
            OverleafError::NotFound { path, .. }
            | OverleafError::Conflict { path, .. }
            | OverleafError::AlreadyExists { path }
            | OverleafError::PayloadTooLarge { path, .. }
            | OverleafError::CorruptTree { path, .. } => Some(path.as_str()),
            _ => None,
        }
    }

    /// Fill in the offending path on errors raised below the path layer.
    pub(crate) fn at_path(mut self, at: &str) -> Self {
        match &mut self {
            OverleafError::NotFound { path, .. }
            | OverleafError::Conflict { path, .. }
            | OverleafError::AlreadyExists { path }
            | OverleafError::PayloadTooLarge { path, .. }
            | OverleafError::CorruptTree { path, .. } => {
                if path.is_empty() {
                    *path = at.to_string();
                }
            }
            _ => {}
        }
        self
    }
}

/// Result type alias for overleaflib operations.
pub type Result<T> = std::result::Result<T, OverleafError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drift_classification() {
        let stale = OverleafError::stale("abc123");
        assert!(stale.is_drift());
        assert_eq!(stale.stale_id(), Some("abc123"));
        assert!(!stale.is_transport());

        let missing = OverleafError::missing("a/b");
        assert!(!missing.is_drift());
        assert_eq!(missing.path(), Some("a/b"));
    }

    #[test]
    fn test_at_path_only_fills_empty() {
        let err = OverleafError::stale("abc").at_path("a/b.tex");
        assert_eq!(err.path(), Some("a/b.tex"));
        assert_eq!(
            err.to_string(),
            "No such file or directory: a/b.tex (id abc)"
        );

        let err = OverleafError::missing("x").at_path("y");
        assert_eq!(err.path(), Some("x"));
    }

    #[test]
    fn test_transport_kinds() {
        assert!(OverleafError::HttpError(500).is_transport());
        assert!(OverleafError::Timeout.is_transport());
        assert!(OverleafError::Unauthorized("expired".into()).is_transport());
        assert!(!OverleafError::AlreadyExists { path: "a".into() }.is_transport());
    }
}
