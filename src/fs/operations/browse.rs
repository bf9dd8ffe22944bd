//! Read-only tree browsing.

use super::utils::join_path;
use crate::error::{OverleafError, Result};
use crate::fs::entity::Entity;
use crate::fs::io::{DirListing, ProjectIo};
use crate::fs::remote::RemoteTree;
use crate::fs::resolver::normalize_path;

impl<R: RemoteTree> ProjectIo<R> {
    /// Check whether `path` names an existing entity.
    ///
    /// Never fails: unresolvable paths, invalid syntax and transport errors
    /// all report `false`.
    pub async fn exists(&mut self, path: &str) -> bool {
        match self.resolve(path).await {
            Ok(resolution) => resolution.is_found(),
            Err(e) => {
                tracing::debug!(path, error = %e, "exists check failed");
                false
            }
        }
    }

    /// Get the entity at `path`.
    pub async fn stat(&mut self, path: &str) -> Result<Entity> {
        let normalized = normalize_path(path)?;
        self.lookup(&normalized)
            .await
            .map_err(|e| e.at_path(&normalized))
    }

    /// List the children of the folder at `path`.
    ///
    /// The listing is a snapshot: later changes to the project do not show up
    /// in it.
    pub async fn listdir(&mut self, path: &str) -> Result<DirListing> {
        let normalized = normalize_path(path)?;
        let folder = self
            .lookup(&normalized)
            .await
            .map_err(|e| e.at_path(&normalized))?;
        if !folder.is_folder() {
            return Err(OverleafError::missing(&normalized));
        }

        let tree = self.tree().await?;
        let entries = tree.children(folder.id()).into_iter().cloned().collect();
        Ok(DirListing::new(entries))
    }

    /// Recursively list everything below the folder at `path`.
    ///
    /// Returns `(path, entity)` pairs, depth-first, with paths relative to
    /// the project root.
    pub async fn walk(&mut self, path: &str) -> Result<Vec<(String, Entity)>> {
        let normalized = normalize_path(path)?;
        let folder = self
            .lookup(&normalized)
            .await
            .map_err(|e| e.at_path(&normalized))?;
        if !folder.is_folder() {
            return Err(OverleafError::missing(&normalized));
        }

        let tree = self.tree().await?;
        Ok(tree
            .walk(folder.id())
            .into_iter()
            .map(|(relative, entity)| (join_path(&normalized, &relative), entity.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::fs::entity::EntityKind;
    use crate::fs::fake::FakeRemote;
    use crate::fs::io::{MkdirOptions, ProjectIo};
    use crate::OverleafError;

    fn project() -> ProjectIo<FakeRemote> {
        let remote = FakeRemote::new();
        remote.add_out_of_band("main.tex", "\\documentclass{article}");
        remote.add_out_of_band("chapters/intro.tex", "Hello");
        remote.add_out_of_band("chapters/data/table.csv", "a,b");
        ProjectIo::new(remote)
    }

    #[tokio::test]
    async fn test_exists() {
        let mut io = project();
        assert!(io.exists("").await);
        assert!(io.exists("main.tex").await);
        assert!(io.exists("/chapters/intro.tex").await);
        assert!(!io.exists("chapters/missing.tex").await);
        assert!(!io.exists("main.tex/child").await);
        assert!(!io.exists("../etc/passwd").await);
        assert_eq!(io.remote().fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_stat() {
        let mut io = project();
        let entity = io.stat("chapters").await.unwrap();
        assert_eq!(entity.kind(), EntityKind::Folder);

        let err = io.stat("chapters/nope.tex").await.unwrap_err();
        assert!(matches!(err, OverleafError::NotFound { ref path, id: None } if path == "chapters/nope.tex"));
    }

    #[tokio::test]
    async fn test_listdir_is_a_snapshot() {
        let mut io = project();
        let listing = io.listdir("chapters").await.unwrap();
        assert_eq!(listing.names(), vec!["intro.tex", "data"]);

        io.mkdir("chapters/new", MkdirOptions::default()).await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(io.listdir("chapters").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_listdir_requires_folder() {
        let mut io = project();
        assert!(matches!(
            io.listdir("main.tex").await,
            Err(OverleafError::NotFound { .. })
        ));
        assert!(matches!(
            io.listdir("nowhere").await,
            Err(OverleafError::NotFound { .. })
        ));
        assert_eq!(io.listdir("/").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_walk() {
        let mut io = project();
        let paths: Vec<String> = io
            .walk("")
            .await
            .unwrap()
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        assert_eq!(
            paths,
            vec![
                "main.tex",
                "chapters",
                "chapters/intro.tex",
                "chapters/data",
                "chapters/data/table.csv"
            ]
        );

        let below: Vec<String> = io
            .walk("chapters/data")
            .await
            .unwrap()
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        assert_eq!(below, vec!["chapters/data/table.csv"]);
    }
}
