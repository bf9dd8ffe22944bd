//! In-memory `RemoteTree` used by the façade tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::entity::{Entity, EntityId, EntityKind, TreeNode};
use super::remote::RemoteTree;
use crate::error::{OverleafError, Result};

pub(crate) const ROOT_ID: &str = "root";

struct FakeNode {
    entity: Entity,
    children: Vec<EntityId>,
    content: Vec<u8>,
}

struct FakeState {
    nodes: HashMap<EntityId, FakeNode>,
    next_id: u64,
    fetches: usize,
    doc_batches: usize,
    rekey_writes: bool,
}

impl FakeState {
    fn allocate_id(&mut self) -> EntityId {
        self.next_id += 1;
        format!("id{}", self.next_id)
    }

    fn node(&self, id: &str) -> Result<&FakeNode> {
        self.nodes.get(id).ok_or_else(|| OverleafError::stale(id))
    }

    fn build(&self, id: &str) -> TreeNode {
        let node = &self.nodes[id];
        TreeNode {
            entity: node.entity.clone(),
            children: node.children.iter().map(|c| self.build(c)).collect(),
        }
    }

    fn create(&mut self, parent_id: &str, name: &str, kind: EntityKind, content: Vec<u8>) -> Result<Entity> {
        let parent = self.node(parent_id)?;
        if !parent.entity.is_folder() {
            return Err(OverleafError::conflict("", "parent is not a folder"));
        }
        if parent
            .children
            .iter()
            .any(|c| self.nodes[c].entity.name() == name)
        {
            return Err(OverleafError::conflict("", "name already exists"));
        }
        if content.len() as u64 > FakeRemote::UPLOAD_LIMIT {
            return Err(OverleafError::PayloadTooLarge {
                path: String::new(),
                size: content.len() as u64,
            });
        }

        let id = self.allocate_id();
        let entity = Entity::new(id.clone(), name, kind, Some(parent_id.to_string()));
        self.nodes.insert(
            id.clone(),
            FakeNode {
                entity: entity.clone(),
                children: Vec::new(),
                content,
            },
        );
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.children.push(id);
        }
        Ok(entity)
    }

    fn write(&mut self, entity: &Entity, kind: EntityKind, content: Vec<u8>) -> Result<Entity> {
        let old_id = entity.id().to_string();
        let node = self.node(&old_id)?;
        if node.entity.is_folder() {
            return Err(OverleafError::conflict("", "cannot write a folder"));
        }
        let parent = node.entity.parent().map(str::to_string);
        let name = node.entity.name().to_string();

        let new_id = if self.rekey_writes {
            self.allocate_id()
        } else {
            old_id.clone()
        };
        let stored = Entity::new(new_id.clone(), name, kind, parent.clone());
        self.nodes.remove(&old_id);
        self.nodes.insert(
            new_id.clone(),
            FakeNode {
                entity: stored.clone(),
                children: Vec::new(),
                content,
            },
        );
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            for child in parent.children.iter_mut() {
                if *child == old_id {
                    *child = new_id.clone();
                }
            }
        }
        Ok(stored)
    }

    fn remove(&mut self, id: &str) {
        if let Some(node) = self.nodes.remove(id) {
            if let Some(parent) = node.entity.parent().and_then(|p| self.nodes.get_mut(p)) {
                parent.children.retain(|c| c.as_str() != id);
            }
            for child in node.children {
                self.remove(&child);
            }
        }
    }
}

/// A project tree held in memory, with hooks to simulate other collaborators.
pub(crate) struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    pub(crate) const UPLOAD_LIMIT: u64 = 1024;

    pub(crate) fn new() -> Self {
        let root = Entity::new(ROOT_ID, "rootFolder", EntityKind::Folder, None);
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_ID.to_string(),
            FakeNode {
                entity: root,
                children: Vec::new(),
                content: Vec::new(),
            },
        );
        Self {
            state: Mutex::new(FakeState {
                nodes,
                next_id: 0,
                fetches: 0,
                doc_batches: 0,
                rekey_writes: false,
            }),
        }
    }

    /// Number of `fetch_tree` calls served.
    pub(crate) fn fetch_count(&self) -> usize {
        self.state.lock().unwrap().fetches
    }

    /// Number of `read_docs` calls served.
    pub(crate) fn doc_batch_count(&self) -> usize {
        self.state.lock().unwrap().doc_batches
    }

    /// Make every write come back under a fresh id.
    pub(crate) fn rekey_writes(&self, enabled: bool) {
        self.state.lock().unwrap().rekey_writes = enabled;
    }

    fn id_of(state: &FakeState, path: &str) -> Option<EntityId> {
        let mut current = ROOT_ID.to_string();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = state.nodes[&current]
                .children
                .iter()
                .find(|c| state.nodes[*c].entity.name() == segment)?
                .clone();
        }
        Some(current)
    }

    /// Delete `path` behind the client's back.
    pub(crate) fn remove_out_of_band(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        let id = Self::id_of(&state, path).expect("path to remove out of band");
        state.remove(&id);
    }

    /// Create a doc behind the client's back. Missing folders are created.
    pub(crate) fn add_out_of_band(&self, path: &str, content: &str) -> EntityId {
        let mut state = self.state.lock().unwrap();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (name, folders) = segments.split_last().expect("non-empty path");
        let mut parent = ROOT_ID.to_string();
        for (depth, folder) in folders.iter().enumerate() {
            let prefix = folders[..=depth].join("/");
            parent = match Self::id_of(&state, &prefix) {
                Some(id) => id,
                None => state
                    .create(&parent, folder, EntityKind::Folder, Vec::new())
                    .unwrap()
                    .id()
                    .to_string(),
            };
        }
        let kind = EntityKind::infer(name, content.as_bytes());
        state
            .create(&parent, name, kind, content.as_bytes().to_vec())
            .unwrap()
            .id()
            .to_string()
    }

    /// Current content of `path`, read without going through the client.
    pub(crate) fn content_of(&self, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let id = Self::id_of(&state, path)?;
        Some(state.nodes[&id].content.clone())
    }

    pub(crate) fn kind_of(&self, path: &str) -> Option<EntityKind> {
        let state = self.state.lock().unwrap();
        let id = Self::id_of(&state, path)?;
        Some(state.nodes[&id].entity.kind())
    }
}

#[async_trait]
impl RemoteTree for FakeRemote {
    async fn fetch_tree(&self) -> Result<TreeNode> {
        let mut state = self.state.lock().unwrap();
        state.fetches += 1;
        Ok(state.build(ROOT_ID))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<Entity> {
        let mut state = self.state.lock().unwrap();
        state.create(parent_id, name, EntityKind::Folder, Vec::new())
    }

    async fn create_file(&self, parent_id: &str, name: &str, content: &[u8]) -> Result<Entity> {
        let mut state = self.state.lock().unwrap();
        state.create(parent_id, name, EntityKind::File, content.to_vec())
    }

    async fn create_doc(&self, parent_id: &str, name: &str, content: &str) -> Result<Entity> {
        let mut state = self.state.lock().unwrap();
        state.create(parent_id, name, EntityKind::Doc, content.as_bytes().to_vec())
    }

    async fn read_file(&self, entity: &Entity) -> Result<Vec<u8>> {
        let state = self.state.lock().unwrap();
        Ok(state.node(entity.id())?.content.clone())
    }

    async fn read_doc(&self, entity: &Entity) -> Result<String> {
        let state = self.state.lock().unwrap();
        let content = state.node(entity.id())?.content.clone();
        String::from_utf8(content).map_err(|e| OverleafError::InvalidResponse(e.to_string()))
    }

    async fn read_docs(&self, entities: &[Entity]) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.doc_batches += 1;
        entities
            .iter()
            .map(|entity| {
                let content = state.node(entity.id())?.content.clone();
                String::from_utf8(content).map_err(|e| OverleafError::InvalidResponse(e.to_string()))
            })
            .collect()
    }

    async fn write_file(&self, entity: &Entity, content: &[u8]) -> Result<Entity> {
        let mut state = self.state.lock().unwrap();
        state.write(entity, EntityKind::File, content.to_vec())
    }

    async fn write_doc(&self, entity: &Entity, content: &str) -> Result<Entity> {
        let mut state = self.state.lock().unwrap();
        state.write(entity, EntityKind::Doc, content.as_bytes().to_vec())
    }

    async fn delete(&self, entity: &Entity) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.node(entity.id())?;
        state.remove(entity.id());
        Ok(())
    }

    async fn list_children(&self, folder_id: &str) -> Result<Vec<Entity>> {
        let state = self.state.lock().unwrap();
        let node = state.node(folder_id)?;
        Ok(node
            .children
            .iter()
            .map(|c| state.nodes[c].entity.clone())
            .collect())
    }
}
