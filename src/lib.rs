//! # overleaflib
//!
//! Unofficial Rust client for Overleaf.
//!
//! ## Features
//!
//! - **Session**: Authenticate with the cookies of a logged-in browser
//!   (`Cookie:` header, Netscape `cookies.txt`, or a saved JSON file).
//! - **Projects**: List projects and download a project as a zip archive.
//! - **Filesystem Operations** on one project's tree:
//!   - Check existence, stat and list folders (`exists`, `stat`, `listdir`, `walk`).
//!   - Create folders (`mkdir`, with `parents`/`exist_ok`).
//!   - Read and write files and docs through scoped handles.
//!   - Delete files, docs and folders (recursively).
//!   - Download every file and doc (`read_all`).
//!
//! Path-based operations work on a cached copy of the project tree that is
//! fetched on first use and patched after every change. When another
//! collaborator invalidates an id the cache relies on, the operation
//! refetches the tree and is retried once.
//!
//! ## Example: Basic Usage
//!
//! ```no_run
//! use overleaflib::{ClientConfig, MkdirOptions, Session};
//! use std::io::Write;
//!
//! # async fn example() -> overleaflib::Result<()> {
//! let session = Session::load("cookies.txt", ClientConfig::from_env()?)?
//!     .expect("cookies.txt not found");
//!
//! let project = session.project_by_name("Thesis").await?;
//! let mut io = session.project_io(&project.id);
//!
//! io.mkdir("chapters/appendix", MkdirOptions::all()).await?;
//!
//! let mut handle = io.open_write("chapters/appendix/a.tex").await?;
//! writeln!(handle, "\\section{{Appendix}}")?;
//! handle.commit().await?;
//!
//! let text = io.read_to_string("chapters/appendix/a.tex").await?;
//! println!("{}", text);
//! # Ok(())
//! # }
//! ```
//!
//! ## Example: Custom Backend
//!
//! [`ProjectIo`] works over any [`RemoteTree`], which is how the path logic
//! is tested without a server.

pub mod api;
pub mod config;
pub mod error;
pub mod fs;
pub mod http;
pub mod session;

// Re-export commonly used types
pub use api::{ApiClient, Project, Tag, User};
pub use config::ClientConfig;
pub use error::{OverleafError, Result};
pub use fs::{
    DirListing, Entity, EntityId, EntityKind, MkdirOptions, ProjectIo, ReadHandle, RemoteTree,
    TreeNode, WriteHandle,
};
pub use session::{Cookies, ProjectClient, Session};
