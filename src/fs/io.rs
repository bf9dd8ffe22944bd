//! Path-based access to one project.
//!
//! [`ProjectIo`] owns the tree cache for its project and is the only place
//! where a stale cache is detected and recovered from. The individual
//! operations live in `fs::operations`.

use super::cache::{CachedTree, TreeCache};
use super::entity::Entity;
use super::remote::RemoteTree;
use super::resolver::{resolve, Resolution};
use crate::error::{OverleafError, Result};

/// Run a façade operation, and if it fails because a cached id went stale,
/// drop the cache and run it exactly once more.
///
/// `$op` is evaluated twice, so it must be the full operation (resolution
/// included), not a value computed from the first attempt.
macro_rules! retry_on_drift {
    ($io:expr, $op:expr) => {{
        match $op {
            Err(err) if err.is_drift() => {
                tracing::debug!(error = %err, "project tree drifted; refetching and retrying once");
                $io.cache.invalidate();
                $op
            }
            other => other,
        }
    }};
}
pub(crate) use retry_on_drift;

/// Options for [`ProjectIo::mkdir`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MkdirOptions {
    /// Create missing ancestors as well
    pub parents: bool,
    /// Succeed if the folder already exists
    pub exist_ok: bool,
}

impl MkdirOptions {
    /// `mkdir -p` semantics.
    pub fn all() -> Self {
        Self {
            parents: true,
            exist_ok: true,
        }
    }
}

/// Snapshot of a folder's children, taken when the listing was made.
///
/// Iterating does not consume the listing; every call to [`iter`](Self::iter)
/// starts again from the first child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirListing {
    entries: Vec<Entity>,
}

impl DirListing {
    pub(crate) fn new(entries: Vec<Entity>) -> Self {
        Self { entries }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(Entity::name).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.entries.iter().find(|e| e.name() == name)
    }
}

impl IntoIterator for DirListing {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a DirListing {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Filesystem-like view of one project.
///
/// Calls are awaited one at a time; methods take `&mut self`, so a single
/// caller drives each instance.
pub struct ProjectIo<R: RemoteTree> {
    pub(crate) remote: R,
    pub(crate) cache: TreeCache,
}

impl<R: RemoteTree> ProjectIo<R> {
    /// Create a façade over `remote`. Nothing is fetched until first use.
    pub fn new(remote: R) -> Self {
        Self {
            remote,
            cache: TreeCache::new(),
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn cache(&self) -> &TreeCache {
        &self.cache
    }

    /// Forget the cached tree. The next operation refetches it.
    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }

    pub(crate) async fn tree(&mut self) -> Result<&CachedTree> {
        self.cache.get(&self.remote).await
    }

    pub(crate) async fn resolve(&mut self, path: &str) -> Result<Resolution> {
        let tree = self.tree().await?;
        resolve(tree, path)
    }

    /// The entity at `path`; `NotFound` if any segment is missing.
    pub(crate) async fn lookup(&mut self, path: &str) -> Result<Entity> {
        let tree = self.tree().await?;
        match resolve(tree, path)? {
            Resolution::Found(id) => tree
                .entity(&id)
                .cloned()
                .ok_or_else(|| OverleafError::corrupt(path, format!("resolved id {} is not cached", id))),
            Resolution::Missing { .. } => Err(OverleafError::missing(path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::entity::EntityKind;

    #[test]
    fn test_listing_is_restartable() {
        let listing = DirListing::new(vec![
            Entity::new("1", "a.tex", EntityKind::Doc, None),
            Entity::new("2", "img", EntityKind::Folder, None),
        ]);
        let first: Vec<_> = listing.iter().map(|e| e.id()).collect();
        let second: Vec<_> = listing.iter().map(|e| e.id()).collect();
        assert_eq!(first, second);
        assert_eq!(listing.names(), vec!["a.tex", "img"]);
        assert!(listing.get("img").unwrap().is_folder());
        assert_eq!(listing.into_iter().count(), 2);
    }

    #[test]
    fn test_mkdir_options() {
        assert_eq!(
            MkdirOptions::default(),
            MkdirOptions {
                parents: false,
                exist_ok: false
            }
        );
        assert!(MkdirOptions::all().parents && MkdirOptions::all().exist_ok);
    }
}
