//! Overleaf HTTP status classification.

use crate::error::OverleafError;

/// Classes of failure the Overleaf web endpoints report through HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStatus {
    /// Malformed request (bad name, bad parent)
    BadRequest,
    /// Session missing or expired
    Unauthorized,
    /// Session valid but not allowed on this project
    Forbidden,
    /// Project or entity does not exist
    NotFound,
    /// Name already taken in the target folder
    Conflict,
    /// Upload exceeds the size limit
    PayloadTooLarge,
    /// Validation failed (e.g. invalid file name)
    Unprocessable,
    /// Rate limit exceeded
    RateLimit,
    /// Server-side failure
    Server,
    /// Anything else
    Unknown,
}

impl From<u16> for ApiStatus {
    fn from(status: u16) -> Self {
        match status {
            400 => ApiStatus::BadRequest,
            401 => ApiStatus::Unauthorized,
            403 => ApiStatus::Forbidden,
            404 => ApiStatus::NotFound,
            409 => ApiStatus::Conflict,
            413 => ApiStatus::PayloadTooLarge,
            422 => ApiStatus::Unprocessable,
            429 => ApiStatus::RateLimit,
            500..=599 => ApiStatus::Server,
            _ => ApiStatus::Unknown,
        }
    }
}

impl ApiStatus {
    /// Get human-readable description of the status.
    pub fn description(&self) -> &'static str {
        match self {
            ApiStatus::BadRequest => "Bad request",
            ApiStatus::Unauthorized => "Not logged in",
            ApiStatus::Forbidden => "Access denied",
            ApiStatus::NotFound => "Resource does not exist",
            ApiStatus::Conflict => "Resource already exists",
            ApiStatus::PayloadTooLarge => "Payload too large",
            ApiStatus::Unprocessable => "Request rejected",
            ApiStatus::RateLimit => "Rate limit exceeded",
            ApiStatus::Server => "Server error",
            ApiStatus::Unknown => "Unknown error",
        }
    }
}

/// Body fragments Overleaf uses when a name is already taken.
const EXISTS_MARKERS: &[&str] = &["already exists", "file_already_exists", "duplicate"];

/// Body fragments Overleaf uses for oversized uploads.
const TOO_LARGE_MARKERS: &[&str] = &["file_too_large", "too large"];

/// Map a non-success response onto the crate error taxonomy.
///
/// Paths are filled in later by the layer that knows them.
pub(crate) fn status_error(status: u16, body: &[u8]) -> OverleafError {
    let text = String::from_utf8_lossy(body).to_lowercase();
    let kind = ApiStatus::from(status);

    if kind == ApiStatus::PayloadTooLarge || TOO_LARGE_MARKERS.iter().any(|m| text.contains(m)) {
        return OverleafError::PayloadTooLarge {
            path: String::new(),
            size: 0,
        };
    }

    match kind {
        ApiStatus::NotFound => OverleafError::NotFound {
            path: String::new(),
            id: None,
        },
        ApiStatus::Conflict => OverleafError::conflict("", kind.description()),
        ApiStatus::BadRequest | ApiStatus::Unprocessable
            if EXISTS_MARKERS.iter().any(|m| text.contains(m)) =>
        {
            OverleafError::conflict("", ApiStatus::Conflict.description())
        }
        ApiStatus::Unauthorized | ApiStatus::Forbidden => {
            OverleafError::Unauthorized(kind.description().to_string())
        }
        _ => OverleafError::HttpError(status),
    }
}
