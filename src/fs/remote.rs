//! Remote tree operations for one project.

use async_trait::async_trait;

use super::entity::{Entity, TreeNode};
use crate::error::Result;

/// Stateless create/read/update/delete calls against one project's tree.
///
/// Implementations report a stale id they were handed as
/// `OverleafError::NotFound { id: Some(..) }`; callers above this layer rely
/// on that to detect drift.
#[async_trait]
pub trait RemoteTree: Send + Sync {
    /// Fetch the whole tree, rooted at the project's root folder.
    async fn fetch_tree(&self) -> Result<TreeNode>;

    /// Create a folder. Fails with `Conflict` if the name is taken.
    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<Entity>;

    /// Create a binary file. Fails with `Conflict` if the name is taken.
    async fn create_file(&self, parent_id: &str, name: &str, content: &[u8]) -> Result<Entity>;

    /// Create a text doc. Fails with `Conflict` if the name is taken.
    async fn create_doc(&self, parent_id: &str, name: &str, content: &str) -> Result<Entity>;

    async fn read_file(&self, entity: &Entity) -> Result<Vec<u8>>;

    async fn read_doc(&self, entity: &Entity) -> Result<String>;

    /// Read several docs, in the order given.
    async fn read_docs(&self, entities: &[Entity]) -> Result<Vec<String>> {
        let mut contents = Vec::with_capacity(entities.len());
        for entity in entities {
            contents.push(self.read_doc(entity).await?);
        }
        Ok(contents)
    }

    /// Replace a file's content (last write wins).
    ///
    /// Returns the entity as stored; its id may differ from the input when
    /// the server re-creates the file.
    async fn write_file(&self, entity: &Entity, content: &[u8]) -> Result<Entity>;

    /// Replace a doc's content (last write wins).
    async fn write_doc(&self, entity: &Entity, content: &str) -> Result<Entity>;

    /// Delete an entity. Folders are deleted with everything below them.
    async fn delete(&self, entity: &Entity) -> Result<()>;

    /// Children of a folder, in insertion order, as the server has them now.
    ///
    /// `ProjectIo` does not call this: on drift it refetches the whole tree.
    /// It serves callers that hold a folder id outside the façade.
    async fn list_children(&self, folder_id: &str) -> Result<Vec<Entity>>;
}
