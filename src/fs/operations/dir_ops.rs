//! Folder creation and entity deletion.

use super::utils::{parent_path, prefix_path};
use crate::error::{OverleafError, Result};
use crate::fs::entity::Entity;
use crate::fs::io::{retry_on_drift, MkdirOptions, ProjectIo};
use crate::fs::remote::RemoteTree;
use crate::fs::resolver::{normalize_path, resolve, split_path, Resolution};

/// What `mkdir` found before touching the server.
enum MkdirPlan {
    Existing(Entity),
    Create {
        ancestor: String,
        remaining: Vec<String>,
    },
}

impl<R: RemoteTree> ProjectIo<R> {
    /// Create a folder.
    ///
    /// # Arguments
    /// * `path` - Folder to create (e.g. "chapters/figures")
    /// * `options` - `parents` creates missing ancestors; `exist_ok`
    ///   accepts an existing folder
    ///
    /// # Returns
    /// The created (or, with `exist_ok`, existing) folder
    pub async fn mkdir(&mut self, path: &str, options: MkdirOptions) -> Result<Entity> {
        let normalized = normalize_path(path)?;
        retry_on_drift!(self, self.try_mkdir(&normalized, options).await)
            .map_err(|e| e.at_path(&normalized))
    }

    async fn try_mkdir(&mut self, path: &str, options: MkdirOptions) -> Result<Entity> {
        let plan = {
            let tree = self.tree().await?;
            let segments = split_path(path)?;
            match resolve(tree, path)? {
                Resolution::Found(id) => MkdirPlan::Existing(
                    tree.entity(&id)
                        .cloned()
                        .ok_or_else(|| OverleafError::corrupt(path, "resolved id is not cached"))?,
                ),
                Resolution::Missing {
                    ancestor,
                    remaining,
                } => {
                    let depth = segments.len() - remaining.len();
                    if tree.child_by_name(&ancestor, &remaining[0])?.is_some() {
                        return Err(OverleafError::conflict(
                            &prefix_path(&segments, depth),
                            "not a folder",
                        ));
                    }
                    if remaining.len() > 1 && !options.parents {
                        return Err(OverleafError::missing(parent_path(path)));
                    }
                    MkdirPlan::Create {
                        ancestor,
                        remaining,
                    }
                }
            }
        };

        let (mut parent, remaining) = match plan {
            MkdirPlan::Existing(entity) if !entity.is_folder() => {
                return Err(OverleafError::conflict(path, "not a folder"));
            }
            MkdirPlan::Existing(entity) if options.exist_ok => return Ok(entity),
            MkdirPlan::Existing(_) => {
                return Err(OverleafError::AlreadyExists {
                    path: path.to_string(),
                })
            }
            MkdirPlan::Create {
                ancestor,
                remaining,
            } => (ancestor, remaining),
        };

        let mut created = None;
        for name in remaining {
            let folder = self.remote.create_folder(&parent, &name).await?;
            tracing::debug!(path, name = %name, id = folder.id(), "folder created");
            self.cache.apply_create(&parent, folder.clone())?;
            parent = folder.id().to_string();
            created = Some(folder);
        }
        created.ok_or_else(|| OverleafError::corrupt(path, "nothing to create"))
    }

    /// Delete the entity at `path`; folders are deleted with their contents.
    pub async fn delete(&mut self, path: &str) -> Result<()> {
        self.remove(path, false).await.map(|_| ())
    }

    /// Delete the entity at `path`.
    ///
    /// With `missing_ok`, a path that does not exist is not an error.
    ///
    /// # Returns
    /// `true` if something was deleted
    pub async fn remove(&mut self, path: &str, missing_ok: bool) -> Result<bool> {
        let normalized = normalize_path(path)?;
        retry_on_drift!(self, self.try_remove(&normalized, missing_ok).await)
            .map_err(|e| e.at_path(&normalized))
    }

    async fn try_remove(&mut self, path: &str, missing_ok: bool) -> Result<bool> {
        let entity = {
            let tree = self.tree().await?;
            match resolve(tree, path)? {
                Resolution::Found(id) if id == tree.root_id() => {
                    return Err(OverleafError::InvalidPath(
                        "cannot delete the project root".to_string(),
                    ))
                }
                Resolution::Found(id) => tree
                    .entity(&id)
                    .cloned()
                    .ok_or_else(|| OverleafError::corrupt(path, "resolved id is not cached"))?,
                Resolution::Missing { .. } if missing_ok => return Ok(false),
                Resolution::Missing { .. } => return Err(OverleafError::missing(path)),
            }
        };

        self.remote.delete(&entity).await?;
        tracing::debug!(path, id = entity.id(), kind = %entity.kind(), "entity deleted");
        self.cache.apply_delete(entity.id())?;
        Ok(true)
    }

    /// Delete an entity obtained from [`listdir`](Self::listdir) or
    /// [`stat`](Self::stat).
    ///
    /// Only that entity is ever deleted, never whatever now sits at its old
    /// path. If the server reports its id as stale, the tree is refetched
    /// once; an entity still present under that id is deleted, otherwise
    /// the stale id is returned as `NotFound`.
    pub async fn delete_entity(&mut self, entity: &Entity) -> Result<()> {
        let at = self
            .cache
            .loaded()
            .and_then(|tree| tree.path_of(entity.id()))
            .unwrap_or_else(|| entity.name().to_string());

        match self.remote.delete(entity).await {
            Ok(()) => {}
            Err(err) if err.is_drift() => {
                tracing::debug!(error = %err, "project tree drifted; refetching and retrying once");
                self.cache.invalidate();
                let current = self.tree().await?.entity(entity.id()).cloned();
                match current {
                    Some(current) => self
                        .remote
                        .delete(&current)
                        .await
                        .map_err(|e| e.at_path(&at))?,
                    None => return Err(err.at_path(&at)),
                }
            }
            Err(err) => return Err(err.at_path(&at)),
        }

        tracing::debug!(path = %at, id = entity.id(), kind = %entity.kind(), "entity deleted");
        let cached = self
            .cache
            .loaded()
            .is_some_and(|tree| tree.contains(entity.id()));
        if cached {
            self.cache.apply_delete(entity.id())
        } else {
            self.cache.invalidate();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::fs::fake::FakeRemote;
    use crate::fs::io::{MkdirOptions, ProjectIo};
    use crate::OverleafError;

    fn parents() -> MkdirOptions {
        MkdirOptions {
            parents: true,
            exist_ok: false,
        }
    }

    #[tokio::test]
    async fn test_mkdir_parents_then_listed_once() {
        let mut io = ProjectIo::new(FakeRemote::new());
        let folder = io.mkdir("a/b/c", parents()).await.unwrap();
        assert_eq!(folder.name(), "c");
        assert!(io.exists("a/b/c").await);
        let listing = io.listdir("a/b").await.unwrap();
        assert_eq!(listing.names().iter().filter(|n| **n == "c").count(), 1);
    }

    #[tokio::test]
    async fn test_mkdir_without_parents_needs_parent() {
        let mut io = ProjectIo::new(FakeRemote::new());
        let err = io.mkdir("a/b", MkdirOptions::default()).await.unwrap_err();
        assert!(matches!(err, OverleafError::NotFound { ref path, .. } if path == "a"));
        assert!(!io.exists("a").await);

        io.mkdir("a", MkdirOptions::default()).await.unwrap();
        io.mkdir("a/b", MkdirOptions::default()).await.unwrap();
        assert!(io.exists("a/b").await);
    }

    #[tokio::test]
    async fn test_mkdir_exist_ok() {
        let mut io = ProjectIo::new(FakeRemote::new());
        let first = io.mkdir("x/y", MkdirOptions::all()).await.unwrap();
        let second = io.mkdir("x/y", MkdirOptions::all()).await.unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(io.walk("").await.unwrap().len(), 2);

        let err = io.mkdir("x/y", parents()).await.unwrap_err();
        assert!(matches!(err, OverleafError::AlreadyExists { ref path } if path == "x/y"));

        // The root always exists.
        assert!(io.mkdir("/", MkdirOptions::all()).await.is_ok());
    }

    #[tokio::test]
    async fn test_mkdir_over_leaf_conflicts() {
        let remote = FakeRemote::new();
        remote.add_out_of_band("docs/main.tex", "x");
        let mut io = ProjectIo::new(remote);

        for options in [MkdirOptions::default(), MkdirOptions::all()] {
            let err = io.mkdir("docs/main.tex", options).await.unwrap_err();
            assert!(matches!(err, OverleafError::Conflict { ref path, .. } if path == "docs/main.tex"));
        }
        let err = io.mkdir("docs/main.tex/sub", MkdirOptions::all()).await.unwrap_err();
        assert!(matches!(err, OverleafError::Conflict { ref path, .. } if path == "docs/main.tex"));
    }

    #[tokio::test]
    async fn test_sibling_name_conflict_any_kind() {
        let remote = FakeRemote::new();
        remote.add_out_of_band("x", "leaf named x");
        let mut io = ProjectIo::new(remote);

        assert!(matches!(
            io.mkdir("x", MkdirOptions::default()).await,
            Err(OverleafError::Conflict { .. })
        ));

        io.mkdir("d/x", MkdirOptions::all()).await.unwrap();
        assert!(matches!(
            io.write("d/x", b"file named like the folder").await,
            Err(OverleafError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_remote_conflict_propagates_without_retry() {
        let mut io = ProjectIo::new(FakeRemote::new());
        io.mkdir("", MkdirOptions::all()).await.unwrap();
        // Another collaborator creates the folder after our fetch.
        io.remote().add_out_of_band("late/file.tex", "x");
        let err = io.mkdir("late", MkdirOptions::default()).await.unwrap_err();
        assert!(matches!(err, OverleafError::Conflict { ref path, .. } if path == "late"));
        assert_eq!(io.cache().invalidation_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_folder_removes_descendants() {
        let mut io = ProjectIo::new(FakeRemote::new());
        io.mkdir("a/b/c", MkdirOptions::all()).await.unwrap();
        io.write("a/b/f.tex", b"x").await.unwrap();
        io.write("a/b/c/g.png", &[0x89, 0x50]).await.unwrap();

        io.delete("a/b").await.unwrap();
        assert!(!io.exists("a/b").await);
        assert!(!io.exists("a/b/f.tex").await);
        assert!(!io.exists("a/b/c").await);
        assert!(!io.exists("a/b/c/g.png").await);
        assert!(io.exists("a").await);
        assert!(io.remote().content_of("a/b/f.tex").is_none());
    }

    #[tokio::test]
    async fn test_remove_missing_ok() {
        let mut io = ProjectIo::new(FakeRemote::new());
        assert!(!io.remove("ghost", true).await.unwrap());
        assert!(matches!(
            io.remove("ghost", false).await,
            Err(OverleafError::NotFound { .. })
        ));
        assert!(matches!(
            io.delete("/").await,
            Err(OverleafError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_entity_from_listing() {
        let mut io = ProjectIo::new(FakeRemote::new());
        io.mkdir("figs", MkdirOptions::default()).await.unwrap();
        io.write("figs/a.png", &[1, 2, 3]).await.unwrap();
        io.write("figs/b.png", &[4]).await.unwrap();

        for entity in &io.listdir("figs").await.unwrap() {
            io.delete_entity(entity).await.unwrap();
        }
        assert!(io.listdir("figs").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_entity_spares_same_named_replacement() {
        let remote = FakeRemote::new();
        remote.add_out_of_band("figs/a.txt", "first draft");
        let mut io = ProjectIo::new(remote);
        let old = io.listdir("figs").await.unwrap().get("a.txt").cloned().unwrap();

        // A collaborator deletes the file and creates a new one with the same name.
        io.remote().remove_out_of_band("figs/a.txt");
        io.remote().add_out_of_band("figs/a.txt", "collaborator's new work");

        let err = io.delete_entity(&old).await.unwrap_err();
        assert!(matches!(
            err,
            OverleafError::NotFound { ref path, ref id }
                if path == "figs/a.txt" && id.as_deref() == Some(old.id())
        ));
        assert_eq!(
            io.remote().content_of("figs/a.txt").unwrap(),
            b"collaborator's new work"
        );
        assert!(io.exists("figs/a.txt").await);
        assert_eq!(io.cache().invalidation_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_drift_retries_once() {
        let remote = FakeRemote::new();
        remote.add_out_of_band("a/b/f.tex", "x");
        let mut io = ProjectIo::new(remote);
        assert!(io.exists("a/b/f.tex").await);

        // Someone else deletes the folder: our cached id for "a/b" is stale.
        io.remote().remove_out_of_band("a/b");
        let err = io.delete("a/b").await.unwrap_err();

        // Refetch shows the folder gone; the retry reports a path-level miss.
        assert!(matches!(err, OverleafError::NotFound { ref path, id: None } if path == "a/b"));
        assert_eq!(io.cache().invalidation_count(), 1);
        assert_eq!(io.remote().fetch_count(), 2);
    }
}
