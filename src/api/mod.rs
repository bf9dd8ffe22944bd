//! Overleaf API client and types.

pub mod client;
pub mod error;
pub(crate) mod socket;
pub mod types;

pub use client::{ApiClient, MAX_UPLOAD_SIZE};
pub use error::ApiStatus;
pub use types::{Project, Tag, UploadResponse, User};
