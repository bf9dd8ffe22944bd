//! Path-based view of a project's file tree.

pub(crate) mod cache;
mod entity;
#[cfg(test)]
pub(crate) mod fake;
mod io;
mod operations;
mod remote;
pub(crate) mod resolver;

pub use cache::{CachedTree, TreeCache};
pub use entity::{Entity, EntityId, EntityKind, TreeNode};
pub use io::{DirListing, MkdirOptions, ProjectIo};
pub use operations::{ReadHandle, WriteHandle};
pub use remote::RemoteTree;
pub use resolver::{normalize_path, resolve, split_path, Resolution};
