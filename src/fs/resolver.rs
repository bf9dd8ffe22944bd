//! Path to entity resolution against a cached tree.

use super::cache::CachedTree;
use super::entity::EntityId;
use crate::error::{OverleafError, Result};

/// Outcome of resolving a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Every segment matched; the id of the final entity.
    Found(EntityId),
    /// Resolution stopped early.
    Missing {
        /// Deepest folder that exists on the path
        ancestor: EntityId,
        /// Segments below `ancestor` that did not resolve (never empty)
        remaining: Vec<String>,
    },
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }

    pub fn found(&self) -> Option<&str> {
        match self {
            Resolution::Found(id) => Some(id),
            Resolution::Missing { .. } => None,
        }
    }
}

/// Split a path into segments.
///
/// Empty and `.` segments are dropped, so `"/a//b/"` and `"a/./b"` both give
/// `["a", "b"]`. `..` is rejected.
pub fn split_path(path: &str) -> Result<Vec<&str>> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(OverleafError::InvalidPath(format!(
                    "'..' is not supported: {}",
                    path
                )))
            }
            s => segments.push(s),
        }
    }
    Ok(segments)
}

/// Normalized form of a path: segments joined by `/`, no leading slash.
pub fn normalize_path(path: &str) -> Result<String> {
    Ok(split_path(path)?.join("/"))
}

/// Resolve `path` from the root of `tree`.
///
/// Intermediate segments must name folders; the final segment may name any
/// kind. A file or doc in the middle of the path ends resolution there, with
/// that segment reported as the first unresolved one.
pub fn resolve(tree: &CachedTree, path: &str) -> Result<Resolution> {
    let segments = split_path(path)?;
    let mut current = tree.root_id().to_string();

    for (index, segment) in segments.iter().enumerate() {
        let is_last = index + 1 == segments.len();
        let child = tree
            .child_by_name(&current, segment)
            .map_err(|e| e.at_path(&segments[..=index].join("/")))?;

        match child {
            Some(entity) if is_last || entity.is_folder() => {
                current = entity.id().to_string();
            }
            _ => {
                return Ok(Resolution::Missing {
                    ancestor: current,
                    remaining: segments[index..].iter().map(|s| s.to_string()).collect(),
                })
            }
        }
    }

    Ok(Resolution::Found(current))
}
