//! Shared helpers for filesystem operations.

/// Parent of a normalized path (`"a/b/c"` -> `"a/b"`, `"a"` -> `""`).
pub(crate) fn parent_path(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

/// Join a normalized prefix and a relative path.
pub(crate) fn join_path(prefix: &str, rest: &str) -> String {
    match (prefix.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{}/{}", prefix, rest),
    }
}

/// Path made of the first `depth + 1` segments of `segments`.
pub(crate) fn prefix_path(segments: &[&str], depth: usize) -> String {
    let end = (depth + 1).min(segments.len());
    segments[..end].join("/")
}
