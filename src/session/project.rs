//! `RemoteTree` implementation backed by the Overleaf web API.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::api::ApiClient;
use crate::error::{OverleafError, Result};
use crate::fs::{Entity, EntityKind, RemoteTree, TreeNode};

/// Remote tree of one project, sharing the session's API client.
#[derive(Debug, Clone)]
pub struct ProjectClient {
    api: Arc<ApiClient>,
    project_id: String,
}

fn str_field<'a>(value: &'a Value, key: &str) -> Result<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| OverleafError::InvalidResponse(format!("tree entry without '{}'", key)))
}

fn entries<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn parse_folder(value: &Value, parent: Option<&str>) -> Result<TreeNode> {
    let id = str_field(value, "_id")?;
    let folder = Entity::new(
        id,
        str_field(value, "name")?,
        EntityKind::Folder,
        parent.map(str::to_string),
    );

    let mut children = Vec::new();
    for child in entries(value, "folders") {
        children.push(parse_folder(child, Some(id))?);
    }
    for file in entries(value, "fileRefs") {
        let created = file.get("created").and_then(Value::as_str).map(str::to_string);
        children.push(TreeNode::leaf(
            Entity::new(
                str_field(file, "_id")?,
                str_field(file, "name")?,
                EntityKind::File,
                Some(id.to_string()),
            )
            .with_created(created),
        ));
    }
    for doc in entries(value, "docs") {
        children.push(TreeNode::leaf(Entity::new(
            str_field(doc, "_id")?,
            str_field(doc, "name")?,
            EntityKind::Doc,
            Some(id.to_string()),
        )));
    }

    Ok(TreeNode {
        entity: folder,
        children,
    })
}

/// `Conflict` if a sibling called `name` is among `children`.
fn ensure_name_free(children: &[Entity], name: &str) -> Result<()> {
    match children.iter().find(|c| c.name() == name) {
        Some(existing) => Err(OverleafError::conflict(
            "",
            format!("a {} with this name already exists", existing.kind()),
        )),
        None => Ok(()),
    }
}

/// Build the tree from the `project` object of `joinProjectResponse`.
pub(crate) fn parse_project_tree(project: &Value) -> Result<TreeNode> {
    let root = project
        .get("rootFolder")
        .and_then(Value::as_array)
        .and_then(|folders| folders.first())
        .ok_or_else(|| OverleafError::InvalidResponse("project has no rootFolder".to_string()))?;
    parse_folder(root, None)
}

impl ProjectClient {
    pub fn new(api: Arc<ApiClient>, project_id: impl Into<String>) -> Self {
        Self {
            api,
            project_id: project_id.into(),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Upload `content` as `name` into `folder_id`, replacing any entity of
    /// that name.
    async fn upload(&self, folder_id: &str, name: &str, content: Vec<u8>) -> Result<Entity> {
        let response = self
            .api
            .upload_file(&self.project_id, folder_id, name, content)
            .await?;
        let kind = EntityKind::from_wire(&response.entity_type).ok_or_else(|| {
            OverleafError::InvalidResponse(format!("unknown entity type: {}", response.entity_type))
        })?;
        Ok(Entity::new(
            response.entity_id,
            name,
            kind,
            Some(folder_id.to_string()),
        ))
    }

    /// Upload a new entity. The upload endpoint silently replaces a
    /// same-named sibling, so the parent is listed first.
    async fn create(&self, parent_id: &str, name: &str, content: Vec<u8>) -> Result<Entity> {
        ensure_name_free(&self.list_children(parent_id).await?, name)?;
        self.upload(parent_id, name, content).await
    }

    /// Folder a leaf lives in, needed to re-upload it.
    fn parent_of<'a>(&self, entity: &'a Entity) -> Result<&'a str> {
        entity.parent().ok_or_else(|| {
            OverleafError::InvalidPath(format!("{} has no parent folder", entity.name()))
        })
    }

    fn find<'a>(tree: &'a TreeNode, id: &str) -> Option<&'a TreeNode> {
        if tree.entity.id() == id {
            return Some(tree);
        }
        tree.children.iter().find_map(|child| Self::find(child, id))
    }
}

#[async_trait]
impl RemoteTree for ProjectClient {
    async fn fetch_tree(&self) -> Result<TreeNode> {
        let project = self.api.join_project(&self.project_id).await?;
        let tree = parse_project_tree(&project)?;
        tracing::debug!(project_id = %self.project_id, entities = tree.count(), "project tree parsed");
        Ok(tree)
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<Entity> {
        let folder = self
            .api
            .create_folder(&self.project_id, parent_id, name)
            .await?;
        Ok(Entity::new(
            str_field(&folder, "_id")?,
            str_field(&folder, "name").unwrap_or(name),
            EntityKind::Folder,
            Some(parent_id.to_string()),
        ))
    }

    async fn create_file(&self, parent_id: &str, name: &str, content: &[u8]) -> Result<Entity> {
        self.create(parent_id, name, content.to_vec()).await
    }

    async fn create_doc(&self, parent_id: &str, name: &str, content: &str) -> Result<Entity> {
        self.create(parent_id, name, content.as_bytes().to_vec()).await
    }

    async fn read_file(&self, entity: &Entity) -> Result<Vec<u8>> {
        self.api.download_file(&self.project_id, entity.id()).await
    }

    async fn read_doc(&self, entity: &Entity) -> Result<String> {
        self.api.read_doc(&self.project_id, entity.id()).await
    }

    async fn read_docs(&self, entities: &[Entity]) -> Result<Vec<String>> {
        let ids: Vec<String> = entities.iter().map(|e| e.id().to_string()).collect();
        self.api.read_docs(&self.project_id, &ids).await
    }

    async fn write_file(&self, entity: &Entity, content: &[u8]) -> Result<Entity> {
        let parent = self.parent_of(entity)?;
        self.upload(parent, entity.name(), content.to_vec()).await
    }

    async fn write_doc(&self, entity: &Entity, content: &str) -> Result<Entity> {
        let parent = self.parent_of(entity)?;
        self.upload(parent, entity.name(), content.as_bytes().to_vec())
            .await
    }

    async fn delete(&self, entity: &Entity) -> Result<()> {
        self.api
            .delete_entity(&self.project_id, entity.kind(), entity.id())
            .await
    }

    async fn list_children(&self, folder_id: &str) -> Result<Vec<Entity>> {
        let tree = self.fetch_tree().await?;
        let folder = Self::find(&tree, folder_id)
            .filter(|node| node.entity.is_folder())
            .ok_or_else(|| OverleafError::stale(folder_id))?;
        Ok(folder
            .children
            .iter()
            .map(|child| child.entity.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project_json() -> Value {
        json!({
            "_id": "p1",
            "name": "Thesis",
            "rootFolder": [{
                "_id": "root",
                "name": "rootFolder",
                "folders": [{
                    "_id": "f1",
                    "name": "figures",
                    "folders": [],
                    "fileRefs": [{"_id": "img", "name": "plot.png", "created": "2024-03-01T12:00:00.000Z"}],
                    "docs": []
                }],
                "fileRefs": [],
                "docs": [{"_id": "main", "name": "main.tex"}, {"_id": "bib", "name": "refs.bib"}]
            }]
        })
    }

    #[test]
    fn test_parse_project_tree() {
        let tree = parse_project_tree(&project_json()).unwrap();
        assert_eq!(tree.entity.id(), "root");
        assert!(tree.entity.parent().is_none());
        assert_eq!(tree.count(), 5);

        let names: Vec<_> = tree.children.iter().map(|c| c.entity.name()).collect();
        assert_eq!(names, vec!["figures", "main.tex", "refs.bib"]);

        let figures = &tree.children[0];
        assert!(figures.entity.is_folder());
        let plot = &figures.children[0].entity;
        assert!(plot.is_file());
        assert_eq!(plot.parent(), Some("f1"));
        assert_eq!(plot.created(), Some("2024-03-01T12:00:00.000Z"));
        assert!(tree.children[1].entity.is_doc());
    }

    #[test]
    fn test_parse_tolerates_missing_lists() {
        let tree = parse_project_tree(&json!({
            "rootFolder": [{"_id": "root", "name": "rootFolder"}]
        }))
        .unwrap();
        assert!(tree.children.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_project_tree(&json!({})).is_err());
        assert!(parse_project_tree(&json!({"rootFolder": []})).is_err());
        assert!(parse_project_tree(&json!({
            "rootFolder": [{"_id": "root", "name": "rootFolder", "docs": [{"name": "x.tex"}]}]
        }))
        .is_err());
    }

    #[test]
    fn test_create_refuses_taken_name() {
        let tree = parse_project_tree(&project_json()).unwrap();
        let root_children: Vec<Entity> = tree.children.iter().map(|c| c.entity.clone()).collect();

        let err = ensure_name_free(&root_children, "main.tex").unwrap_err();
        assert!(matches!(err, OverleafError::Conflict { ref message, .. } if message.contains("doc")));
        assert!(matches!(
            ensure_name_free(&root_children, "figures"),
            Err(OverleafError::Conflict { .. })
        ));
        assert!(ensure_name_free(&root_children, "appendix.tex").is_ok());
        // Names are case-sensitive.
        assert!(ensure_name_free(&root_children, "Main.tex").is_ok());
    }

    #[test]
    fn test_find_folder() {
        let tree = parse_project_tree(&project_json()).unwrap();
        assert_eq!(ProjectClient::find(&tree, "f1").unwrap().children.len(), 1);
        assert!(ProjectClient::find(&tree, "zzz").is_none());
    }
}
