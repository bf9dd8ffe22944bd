//! Project tree entity types.

use serde::{Deserialize, Serialize};

/// Server-assigned entity id, unique within a project.
pub type EntityId = String;

/// Extensions Overleaf stores as editable docs rather than binary files.
const DOC_EXTENSIONS: &[&str] = &[
    "tex", "bib", "cls", "sty", "bst", "txt", "md", "bbx", "cbx", "lbx", "dtx", "ins", "ltx",
    "latex", "Rtex", "Rnw", "asy", "tikz", "csv", "tsv", "yml", "yaml", "json", "xml", "lua",
    "py", "R", "m", "gitignore", "latexmkrc",
];

/// Entity kind. Closed: Overleaf has exactly these three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Binary file (images, PDFs, ...)
    File,
    /// Text document editable in the web editor
    Doc,
    /// Folder
    Folder,
}

impl EntityKind {
    /// Check if this kind can have children.
    pub fn is_container(&self) -> bool {
        matches!(self, EntityKind::Folder)
    }

    /// Check if this kind holds content.
    pub fn is_leaf(&self) -> bool {
        !self.is_container()
    }

    /// Name used in URLs and upload responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::File => "file",
            EntityKind::Doc => "doc",
            EntityKind::Folder => "folder",
        }
    }

    /// Parse the wire name. Overleaf calls binary files `fileRef` in some places.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "file" | "fileRef" => Some(EntityKind::File),
            "doc" => Some(EntityKind::Doc),
            "folder" => Some(EntityKind::Folder),
            _ => None,
        }
    }

    /// Kind a new leaf named `name` with `content` is created as.
    ///
    /// Docs must be UTF-8 and carry a known text extension; anything else is
    /// uploaded as a binary file.
    pub fn infer(name: &str, content: &[u8]) -> Self {
        let extension = match name.rsplit_once('.') {
            Some((_, ext)) => ext,
            None => return EntityKind::File,
        };
        if DOC_EXTENSIONS.contains(&extension) && std::str::from_utf8(content).is_ok() {
            EntityKind::Doc
        } else {
            EntityKind::File
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A folder, file or doc in a project tree.
///
/// `id` and `kind` never change once the server assigned them; the name and
/// position only change through the tree cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    name: String,
    kind: EntityKind,
    parent: Option<EntityId>,
    created: Option<String>,
}

impl Entity {
    pub fn new(
        id: impl Into<EntityId>,
        name: impl Into<String>,
        kind: EntityKind,
        parent: Option<EntityId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            parent,
            created: None,
        }
    }

    /// Attach the server creation timestamp.
    pub fn with_created(mut self, created: Option<String>) -> Self {
        self.created = created;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Id of the owning folder; `None` for the root folder.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn created(&self) -> Option<&str> {
        self.created.as_deref()
    }

    pub fn is_folder(&self) -> bool {
        self.kind.is_container()
    }

    pub fn is_doc(&self) -> bool {
        self.kind == EntityKind::Doc
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntityKind::File
    }

    pub(crate) fn set_parent(&mut self, parent: Option<EntityId>) {
        self.parent = parent;
    }
}

/// Recursive snapshot of a folder and everything below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub entity: Entity,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn leaf(entity: Entity) -> Self {
        Self {
            entity,
            children: Vec::new(),
        }
    }

    /// Number of entities in this subtree, including this one.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        assert!(EntityKind::Folder.is_container());
        assert!(!EntityKind::Folder.is_leaf());
        assert!(EntityKind::File.is_leaf());
        assert!(EntityKind::Doc.is_leaf());
    }

    #[test]
    fn test_wire_names() {
        for kind in [EntityKind::File, EntityKind::Doc, EntityKind::Folder] {
            assert_eq!(EntityKind::from_wire(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::from_wire("fileRef"), Some(EntityKind::File));
        assert_eq!(EntityKind::from_wire("project"), None);
    }

    #[test]
    fn test_infer_kind() {
        assert_eq!(EntityKind::infer("main.tex", b"\\section{A}"), EntityKind::Doc);
        assert_eq!(EntityKind::infer("refs.bib", b""), EntityKind::Doc);
        assert_eq!(EntityKind::infer("analysis.R", b"x <- 1"), EntityKind::Doc);
        assert_eq!(EntityKind::infer("figure.png", b"\x89PNG"), EntityKind::File);
        assert_eq!(EntityKind::infer("notes.txt", &[0xff, 0xfe]), EntityKind::File);
        assert_eq!(EntityKind::infer("Makefile", b"all:"), EntityKind::File);
        assert_eq!(EntityKind::infer("MAIN.TEX", b"x"), EntityKind::File);
    }

    #[test]
    fn test_tree_len() {
        let root = Entity::new("r", "rootFolder", EntityKind::Folder, None);
        let doc = Entity::new("d", "main.tex", EntityKind::Doc, Some("r".into()));
        let tree = TreeNode {
            entity: root,
            children: vec![TreeNode::leaf(doc)],
        };
        assert_eq!(tree.count(), 2);
        assert_eq!(tree.children[0].entity.parent(), Some("r"));
    }
}
