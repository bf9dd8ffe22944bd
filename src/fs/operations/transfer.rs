//! Reading and writing file/doc content.

use std::io::{Cursor, Read, Write};

use super::utils::parent_path;
use crate::error::{OverleafError, Result};
use crate::fs::entity::{Entity, EntityKind};
use crate::fs::io::{retry_on_drift, ProjectIo};
use crate::fs::remote::RemoteTree;
use crate::fs::resolver::{normalize_path, resolve, Resolution};

/// Content of a file or doc, fetched when the handle was opened.
#[derive(Debug)]
pub struct ReadHandle {
    entity: Entity,
    content: Cursor<Vec<u8>>,
}

impl ReadHandle {
    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Total content length in bytes.
    pub fn len(&self) -> usize {
        self.content.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.get_ref().is_empty()
    }

    /// All content, regardless of how much was already read.
    pub fn into_bytes(self) -> Vec<u8> {
        self.content.into_inner()
    }

    /// All content as UTF-8 text.
    pub fn into_string(self) -> Result<String> {
        String::from_utf8(self.into_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e).into())
    }
}

impl Read for ReadHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.content.read(buf)
    }
}

/// Buffered write to one path, sent to the server on [`commit`](Self::commit).
///
/// The handle borrows its [`ProjectIo`] mutably until it is committed or
/// dropped. Dropping it without committing discards the buffer.
pub struct WriteHandle<'a, R: RemoteTree> {
    io: &'a mut ProjectIo<R>,
    path: String,
    buffer: Vec<u8>,
    finished: bool,
}

impl<R: RemoteTree> WriteHandle<'_, R> {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Bytes buffered so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Content buffered so far, including what an append handle started with.
    pub fn contents(&self) -> &[u8] {
        &self.buffer
    }

    /// Send the buffered content, creating the target if it does not exist.
    ///
    /// # Returns
    /// The stored entity (its id may differ from before the write)
    pub async fn commit(mut self) -> Result<Entity> {
        self.finished = true;
        let path = std::mem::take(&mut self.path);
        let content = std::mem::take(&mut self.buffer);
        self.io.commit_write(&path, content).await
    }

    /// Drop the buffered content without sending it.
    pub fn discard(mut self) {
        self.finished = true;
        tracing::debug!(path = %self.path, bytes = self.buffer.len(), "write discarded");
    }
}

impl<R: RemoteTree> Write for WriteHandle<'_, R> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<R: RemoteTree> Drop for WriteHandle<'_, R> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                path = %self.path,
                bytes = self.buffer.len(),
                "write handle dropped without commit; content discarded"
            );
        }
    }
}

/// Where a committed write goes.
enum WriteTarget {
    Existing(Entity),
    Create { parent: String, name: String },
}

impl<R: RemoteTree> ProjectIo<R> {
    async fn read_entity(&self, entity: &Entity) -> Result<Vec<u8>> {
        match entity.kind() {
            EntityKind::Doc => Ok(self.remote.read_doc(entity).await?.into_bytes()),
            EntityKind::File => self.remote.read_file(entity).await,
            EntityKind::Folder => Err(OverleafError::missing("")),
        }
    }

    async fn try_read(&mut self, path: &str) -> Result<(Entity, Vec<u8>)> {
        let entity = self.lookup(path).await?;
        if entity.is_folder() {
            return Err(OverleafError::missing(path));
        }
        let content = self.read_entity(&entity).await?;
        Ok((entity, content))
    }

    /// Open a file or doc for reading.
    ///
    /// The content is downloaded before this returns.
    pub async fn open_read(&mut self, path: &str) -> Result<ReadHandle> {
        let normalized = normalize_path(path)?;
        let (entity, content) = retry_on_drift!(self, self.try_read(&normalized).await)
            .map_err(|e| e.at_path(&normalized))?;
        Ok(ReadHandle {
            entity,
            content: Cursor::new(content),
        })
    }

    /// Read the whole content of a file or doc.
    pub async fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        Ok(self.open_read(path).await?.into_bytes())
    }

    /// Read a file or doc as UTF-8 text.
    pub async fn read_to_string(&mut self, path: &str) -> Result<String> {
        self.open_read(path).await?.into_string()
    }

    /// Open `path` for writing.
    ///
    /// The parent folder must exist and `path` must not be a folder. Nothing
    /// is sent until [`WriteHandle::commit`].
    pub async fn open_write(&mut self, path: &str) -> Result<WriteHandle<'_, R>> {
        let normalized = normalize_path(path)?;
        self.write_target(&normalized)
            .await
            .map_err(|e| e.at_path(&normalized))?;
        Ok(self.write_handle(normalized, Vec::new()))
    }

    /// Open `path` for appending.
    ///
    /// The handle starts out holding the current content, so everything
    /// written goes after it. A missing target starts empty and is created
    /// on [`WriteHandle::commit`].
    pub async fn open_append(&mut self, path: &str) -> Result<WriteHandle<'_, R>> {
        let normalized = normalize_path(path)?;
        let current = retry_on_drift!(self, self.try_current_content(&normalized).await)
            .map_err(|e| e.at_path(&normalized))?;
        Ok(self.write_handle(normalized, current))
    }

    async fn try_current_content(&mut self, path: &str) -> Result<Vec<u8>> {
        match self.write_target(path).await? {
            WriteTarget::Existing(entity) => self.read_entity(&entity).await,
            WriteTarget::Create { .. } => Ok(Vec::new()),
        }
    }

    fn write_handle(&mut self, path: String, buffer: Vec<u8>) -> WriteHandle<'_, R> {
        WriteHandle {
            io: self,
            path,
            buffer,
            finished: false,
        }
    }

    /// Write `content` to `path` in one call.
    pub async fn write(&mut self, path: &str, content: &[u8]) -> Result<Entity> {
        let mut handle = self.open_write(path).await?;
        handle.write_all(content)?;
        handle.commit().await
    }

    async fn write_target(&mut self, path: &str) -> Result<WriteTarget> {
        let tree = self.tree().await?;
        match resolve(tree, path)? {
            Resolution::Found(id) => {
                let entity = tree
                    .entity(&id)
                    .cloned()
                    .ok_or_else(|| OverleafError::corrupt(path, "resolved id is not cached"))?;
                if entity.is_folder() {
                    return Err(OverleafError::conflict(path, "is a folder"));
                }
                Ok(WriteTarget::Existing(entity))
            }
            Resolution::Missing {
                ancestor,
                mut remaining,
            } if remaining.len() == 1 => Ok(WriteTarget::Create {
                parent: ancestor,
                name: remaining.remove(0),
            }),
            Resolution::Missing { .. } => Err(OverleafError::missing(parent_path(path))),
        }
    }

    pub(crate) async fn commit_write(&mut self, path: &str, content: Vec<u8>) -> Result<Entity> {
        retry_on_drift!(self, self.try_write(path, &content).await)
            .map_err(|e| e.at_path(path))
    }

    async fn try_write(&mut self, path: &str, content: &[u8]) -> Result<Entity> {
        match self.write_target(path).await? {
            WriteTarget::Existing(entity) => {
                let stored = match (entity.kind(), std::str::from_utf8(content)) {
                    (EntityKind::Doc, Ok(text)) => self.remote.write_doc(&entity, text).await?,
                    _ => self.remote.write_file(&entity, content).await?,
                };
                tracing::debug!(path, id = stored.id(), bytes = content.len(), "content replaced");
                self.cache.apply_write(entity.id(), stored.clone())?;
                Ok(stored)
            }
            WriteTarget::Create { parent, name } => {
                let created = match EntityKind::infer(&name, content) {
                    EntityKind::Doc => {
                        let text = std::str::from_utf8(content).map_err(|e| {
                            OverleafError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
                        })?;
                        self.remote.create_doc(&parent, &name, text).await?
                    }
                    _ => self.remote.create_file(&parent, &name, content).await?,
                };
                tracing::debug!(path, id = created.id(), kind = %created.kind(), "entity created");
                self.cache.apply_create(&parent, created.clone())?;
                Ok(created)
            }
        }
    }

    /// Download every file and doc in the project.
    ///
    /// Refetches the tree first. Docs are read in one batch, files one by
    /// one; results come back in tree order.
    ///
    /// # Returns
    /// `(path, content)` pairs with paths relative to the project root
    pub async fn read_all(&mut self) -> Result<Vec<(String, Vec<u8>)>> {
        self.cache.invalidate();
        retry_on_drift!(self, self.try_read_all().await)
    }

    async fn try_read_all(&mut self) -> Result<Vec<(String, Vec<u8>)>> {
        let leaves: Vec<(String, Entity)> = {
            let tree = self.tree().await?;
            tree.walk(tree.root_id())
                .into_iter()
                .filter(|(_, entity)| !entity.is_folder())
                .map(|(path, entity)| (path, entity.clone()))
                .collect()
        };

        let docs: Vec<Entity> = leaves
            .iter()
            .filter(|(_, entity)| entity.is_doc())
            .map(|(_, entity)| entity.clone())
            .collect();
        let mut doc_contents = self.remote.read_docs(&docs).await?.into_iter();

        let mut contents = Vec::with_capacity(leaves.len());
        for (path, entity) in leaves {
            let content = if entity.is_doc() {
                doc_contents
                    .next()
                    .map(String::into_bytes)
                    .ok_or_else(|| OverleafError::InvalidResponse(format!("no content returned for {}", path)))?
            } else {
                self.read_entity(&entity)
                    .await
                    .map_err(|e| e.at_path(&path))?
            };
            contents.push((path, content));
        }
        Ok(contents)
    }
}
