//! In-memory mirror of a project tree.
//!
//! The cache is either absent or a complete copy of the tree as of the last
//! fetch, patched in place after each successful remote mutation. It never
//! talks to the server except through [`TreeCache::get`] on first access.

use std::collections::HashMap;

use super::entity::{Entity, EntityId, TreeNode};
use super::remote::RemoteTree;
use crate::error::{OverleafError, Result};

#[derive(Debug, Clone)]
struct CachedNode {
    entity: Entity,
    /// Child ids in insertion order (empty for leaves)
    children: Vec<EntityId>,
}

/// A fully loaded project tree, indexed by id.
#[derive(Debug, Clone)]
pub struct CachedTree {
    root: EntityId,
    nodes: HashMap<EntityId, CachedNode>,
}

impl CachedTree {
    /// Index a fetched tree. Fails on repeated ids or a non-folder root.
    pub fn from_tree(tree: TreeNode) -> Result<Self> {
        if !tree.entity.is_folder() {
            return Err(OverleafError::corrupt("", "root entity is not a folder"));
        }

        let root = tree.entity.id().to_string();
        let mut nodes = HashMap::new();
        let mut stack = vec![(tree, None::<EntityId>)];

        while let Some((node, parent)) = stack.pop() {
            let TreeNode {
                mut entity,
                children,
            } = node;
            entity.set_parent(parent);
            let id = entity.id().to_string();

            if !entity.is_folder() && !children.is_empty() {
                return Err(OverleafError::corrupt(
                    entity.name(),
                    format!("{} entity has children", entity.kind()),
                ));
            }

            let child_ids: Vec<EntityId> = children.iter().map(|c| c.entity.id().to_string()).collect();
            for child in children.into_iter().rev() {
                stack.push((child, Some(id.clone())));
            }

            let cached = CachedNode {
                entity,
                children: child_ids,
            };
            if nodes.insert(id.clone(), cached).is_some() {
                return Err(OverleafError::corrupt("", format!("id {} appears twice", id)));
            }
        }

        Ok(Self { root, nodes })
    }

    pub fn root(&self) -> &Entity {
        // Always present: `remove` refuses the root.
        &self.nodes[&self.root].entity
    }

    pub fn root_id(&self) -> &str {
        &self.root
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.nodes.get(id).map(|n| &n.entity)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of entities, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of a folder in insertion order. Empty for leaves and unknown ids.
    pub fn children(&self, id: &str) -> Vec<&Entity> {
        self.nodes
            .get(id)
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|child| self.entity(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The child of `folder_id` called `name`.
    ///
    /// Two children with the same name mean the tree is corrupt.
    pub fn child_by_name(&self, folder_id: &str, name: &str) -> Result<Option<&Entity>> {
        let mut found = None;
        for child in self.children(folder_id) {
            if child.name() == name {
                if found.is_some() {
                    let at = self
                        .path_of(folder_id)
                        .map(|p| join(&p, name))
                        .unwrap_or_else(|| name.to_string());
                    return Err(OverleafError::corrupt(&at, "duplicate sibling name"));
                }
                found = Some(child);
            }
        }
        Ok(found)
    }

    /// Slash-separated path from the root; `""` for the root itself.
    pub fn path_of(&self, id: &str) -> Option<String> {
        let mut segments = Vec::new();
        let mut current = self.nodes.get(id)?;
        // Bounded so a parent cycle cannot loop forever.
        for _ in 0..self.nodes.len() {
            match current.entity.parent() {
                None => {
                    segments.reverse();
                    return Some(segments.join("/"));
                }
                Some(parent) => {
                    segments.push(current.entity.name());
                    current = self.nodes.get(parent)?;
                }
            }
        }
        None
    }

    /// All descendants of `id`, depth-first, with paths relative to `id`.
    pub fn walk(&self, id: &str) -> Vec<(String, &Entity)> {
        let mut out = Vec::new();
        let mut stack: Vec<(String, &str)> = self
            .nodes
            .get(id)
            .map(|n| n.children.iter().rev().map(|c| (String::new(), c.as_str())).collect())
            .unwrap_or_default();

        while let Some((prefix, child)) = stack.pop() {
            let Some(node) = self.nodes.get(child) else {
                continue;
            };
            let path = join(&prefix, node.entity.name());
            for grandchild in node.children.iter().rev() {
                stack.push((path.clone(), grandchild.as_str()));
            }
            out.push((path, &node.entity));
        }
        out
    }

    fn insert(&mut self, parent_id: &str, mut entity: Entity) -> Result<()> {
        let id = entity.id().to_string();
        if self.nodes.contains_key(&id) {
            return Err(OverleafError::corrupt(
                entity.name(),
                format!("id {} already cached", id),
            ));
        }
        if self.child_by_name(parent_id, entity.name())?.is_some() {
            return Err(OverleafError::corrupt(
                entity.name(),
                "name already cached under parent",
            ));
        }
        let parent = self
            .nodes
            .get_mut(parent_id)
            .filter(|p| p.entity.is_folder())
            .ok_or_else(|| {
                OverleafError::corrupt(entity.name(), format!("parent {} is not a cached folder", parent_id))
            })?;
        parent.children.push(id.clone());
        entity.set_parent(Some(parent_id.to_string()));
        self.nodes.insert(
            id,
            CachedNode {
                entity,
                children: Vec::new(),
            },
        );
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<Entity> {
        if id == self.root {
            return Err(OverleafError::corrupt("", "cannot remove the root folder"));
        }
        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| OverleafError::corrupt("", format!("id {} is not cached", id)))?;
        if let Some(parent) = node.entity.parent().and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|c| c.as_str() != id);
        }

        let mut pending = node.children.clone();
        while let Some(child) = pending.pop() {
            if let Some(removed) = self.nodes.remove(&child) {
                pending.extend(removed.children);
            }
        }
        Ok(node.entity)
    }

    fn replace(&mut self, id: &str, mut entity: Entity) -> Result<()> {
        let old = self
            .nodes
            .get(id)
            .ok_or_else(|| OverleafError::corrupt(entity.name(), format!("id {} is not cached", id)))?;
        if old.entity.is_folder() != entity.is_folder() {
            return Err(OverleafError::corrupt(entity.name(), "write changed a folder into a leaf"));
        }
        entity.set_parent(old.entity.parent().map(str::to_string));

        let new_id = entity.id().to_string();
        if new_id == id {
            if let Some(node) = self.nodes.get_mut(id) {
                node.entity = entity;
            }
            return Ok(());
        }

        // Re-keyed by the server: keep the node's position under its parent.
        if self.nodes.contains_key(&new_id) {
            return Err(OverleafError::corrupt(
                entity.name(),
                format!("id {} already cached", new_id),
            ));
        }
        let mut node = self
            .nodes
            .remove(id)
            .ok_or_else(|| OverleafError::corrupt(entity.name(), format!("id {} is not cached", id)))?;
        if let Some(parent) = entity.parent().and_then(|p| self.nodes.get_mut(p)) {
            if let Some(slot) = parent.children.iter_mut().find(|c| c.as_str() == id) {
                *slot = new_id.clone();
            }
        }
        node.entity = entity;
        self.nodes.insert(new_id, node);
        Ok(())
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Lazily populated, invalidatable holder of a [`CachedTree`].
#[derive(Debug, Default)]
pub struct TreeCache {
    state: Option<CachedTree>,
    fetches: u64,
    invalidations: u64,
}

impl TreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached tree, fetching it from `remote` if absent.
    pub async fn get<R: RemoteTree + ?Sized>(&mut self, remote: &R) -> Result<&CachedTree> {
        if self.state.is_none() {
            let tree = CachedTree::from_tree(remote.fetch_tree().await?)?;
            self.fetches += 1;
            tracing::debug!(
                entities = tree.len(),
                fetches = self.fetches,
                "project tree fetched"
            );
            self.state = Some(tree);
        }
        self.state
            .as_ref()
            .ok_or_else(|| OverleafError::corrupt("", "tree cache not loaded"))
    }

    /// The cached tree, if loaded.
    pub fn loaded(&self) -> Option<&CachedTree> {
        self.state.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    /// Record a successful remote create under `parent_id`.
    pub fn apply_create(&mut self, parent_id: &str, entity: Entity) -> Result<()> {
        match self.state.as_mut() {
            Some(tree) => tree.insert(parent_id, entity),
            None => Ok(()),
        }
    }

    /// Record a successful remote delete of `id` and its descendants.
    pub fn apply_delete(&mut self, id: &str) -> Result<()> {
        match self.state.as_mut() {
            Some(tree) => tree.remove(id).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Record a successful remote write of `id`, re-keying if the server
    /// stored it under a new id.
    pub fn apply_write(&mut self, id: &str, entity: Entity) -> Result<()> {
        match self.state.as_mut() {
            Some(tree) => tree.replace(id, entity),
            None => Ok(()),
        }
    }

    /// Drop the cached tree; the next access refetches.
    pub fn invalidate(&mut self) {
        if self.state.take().is_some() {
            self.invalidations += 1;
            tracing::debug!(invalidations = self.invalidations, "project tree invalidated");
        }
    }

    /// Number of successful tree fetches so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches
    }

    /// Number of times a loaded tree was dropped.
    pub fn invalidation_count(&self) -> u64 {
        self.invalidations
    }
}
