//! In-memory project tree
//!
//! Nodes live in an arena ([`ProjectTree`]) and refer to each other by
//! [`NodeIndex`], so parent and child links never form ownership cycles. The
//! tree is built once by the walker and is read-only afterwards.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};

/// Identifier assigned by the remote system
///
/// Accepts a bare number, a string, or the `{"native": .., "partner": ..}`
/// object form when deserialized.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    /// Create an id from its textual form
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as sent on the wire
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemoteId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for RemoteId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for RemoteId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
            Object {
                #[serde(default)]
                native: Option<serde_json::Value>,
                #[serde(default)]
                partner: Option<serde_json::Value>,
            },
        }

        fn scalar(value: &serde_json::Value) -> Option<String> {
            match value {
                serde_json::Value::Number(n) => Some(n.to_string()),
                serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
                _ => None,
            }
        }

        match RawId::deserialize(deserializer)? {
            RawId::Number(n) => Ok(RemoteId(n.to_string())),
            RawId::Text(s) if !s.is_empty() => Ok(RemoteId(s)),
            RawId::Text(_) => Err(serde::de::Error::custom("empty id")),
            RawId::Object { native, partner } => native
                .as_ref()
                .and_then(scalar)
                .or_else(|| partner.as_ref().and_then(scalar))
                .map(RemoteId)
                .ok_or_else(|| serde::de::Error::custom("id object has neither native nor partner")),
        }
    }
}

/// Position of a node in the arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeIndex(pub usize);

/// Where a document's bytes come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentRef {
    /// Ask the locator endpoint for a pre-signed URL
    Locator(RemoteId),
    /// Fetch this URL (absolute, or relative to the API root) directly
    Direct(String),
}

/// Metadata carried by document nodes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentMeta {
    /// Size reported by the listing, if any
    pub size: Option<u64>,
    /// How to fetch the content
    pub content: ContentRef,
}

/// Folder or document payload of a node
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// A folder and its children in discovery order
    Folder {
        /// Child nodes, in the order the API returned them
        children: Vec<NodeIndex>,
    },
    /// A document
    Document(DocumentMeta),
}

/// A folder or document in the project tree
#[derive(Clone, Debug)]
pub struct TreeNode {
    /// Remote id
    pub id: RemoteId,
    /// Remote display name (unsanitized)
    pub name: String,
    /// Parent folder; `None` only for the project root
    pub parent: Option<NodeIndex>,
    /// Folder or document payload
    pub kind: NodeKind,
}

impl TreeNode {
    /// True for folder nodes
    pub fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder { .. })
    }

    /// Document metadata, for document nodes
    pub fn document(&self) -> Option<&DocumentMeta> {
        match &self.kind {
            NodeKind::Document(meta) => Some(meta),
            NodeKind::Folder { .. } => None,
        }
    }

    /// Children in discovery order (empty for documents)
    pub fn children(&self) -> &[NodeIndex] {
        match &self.kind {
            NodeKind::Folder { children } => children,
            NodeKind::Document(_) => &[],
        }
    }
}

/// A listing entry waiting to be attached to the tree
#[derive(Clone, Debug)]
pub struct NewNode {
    /// Remote id
    pub id: RemoteId,
    /// Remote display name
    pub name: String,
    /// Parent id the API reported for this entry, if any
    pub reported_parent: Option<RemoteId>,
    /// `None` for folders, document metadata for documents
    pub document: Option<DocumentMeta>,
}

/// A sub-tree abandoned while walking
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedFolder {
    /// The folder whose listing failed
    pub node: NodeIndex,
    /// Why it was skipped
    pub reason: String,
}

/// Arena of every node discovered in a project
#[derive(Clone, Debug)]
pub struct ProjectTree {
    project_id: String,
    nodes: Vec<TreeNode>,
    // Folder and document ids are separate sequences on the remote side
    folders: HashMap<RemoteId, NodeIndex>,
    documents: HashSet<RemoteId>,
    root_alias: Option<RemoteId>,
    skipped: Vec<SkippedFolder>,
}

impl ProjectTree {
    /// Create a tree holding only the project root folder
    pub fn new(project_id: impl Into<String>) -> Self {
        let project_id = project_id.into();
        let root_id = RemoteId::new("root");
        let mut folders = HashMap::new();
        folders.insert(root_id.clone(), NodeIndex(0));
        Self {
            nodes: vec![TreeNode {
                id: root_id,
                name: project_id.clone(),
                parent: None,
                kind: NodeKind::Folder {
                    children: Vec::new(),
                },
            }],
            project_id,
            folders,
            documents: HashSet::new(),
            root_alias: None,
            skipped: Vec::new(),
        }
    }

    /// The project this tree belongs to
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// The project root folder
    pub fn root(&self) -> NodeIndex {
        NodeIndex(0)
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root is present from construction
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node at `index`
    pub fn node(&self, index: NodeIndex) -> &TreeNode {
        &self.nodes[index.0]
    }

    /// Find a folder by its remote id
    pub fn find_folder(&self, id: &RemoteId) -> Option<NodeIndex> {
        self.folders.get(id).copied()
    }

    /// Iterator from `index`'s parent up to the root
    pub fn ancestors(&self, index: NodeIndex) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.node(index).parent,
        }
    }

    /// Nodes from the root down to `index`, inclusive
    pub fn chain(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut chain: Vec<_> = self.ancestors(index).collect();
        chain.reverse();
        chain.push(index);
        chain
    }

    /// True if `candidate` is `index` itself or one of its ancestors
    pub fn is_self_or_ancestor(&self, candidate: NodeIndex, index: NodeIndex) -> bool {
        candidate == index || self.ancestors(index).any(|a| a == candidate)
    }

    /// Every document, in depth-first pre-order
    pub fn documents(&self) -> Vec<NodeIndex> {
        self.preorder()
            .into_iter()
            .filter(|&i| !self.node(i).is_folder())
            .collect()
    }

    /// Every folder (root included), in depth-first pre-order
    pub fn folders(&self) -> Vec<NodeIndex> {
        self.preorder()
            .into_iter()
            .filter(|&i| self.node(i).is_folder())
            .collect()
    }

    fn preorder(&self) -> Vec<NodeIndex> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(index) = stack.pop() {
            order.push(index);
            stack.extend(self.node(index).children().iter().rev().copied());
        }
        order
    }

    /// Sub-trees abandoned during the walk, in the order they were skipped
    pub fn skipped_folders(&self) -> &[SkippedFolder] {
        &self.skipped
    }

    /// Record that `folder`'s contents could not be listed
    pub fn mark_skipped(&mut self, folder: NodeIndex, reason: impl Into<String>) {
        self.skipped.push(SkippedFolder {
            node: folder,
            reason: reason.into(),
        });
    }

    /// Attach one folder's complete listing
    ///
    /// The listing is validated as a whole before anything is inserted, so a
    /// structurally broken listing leaves the tree untouched.
    pub fn attach(&mut self, folder: NodeIndex, entries: Vec<NewNode>) -> Result<Vec<NodeIndex>> {
        if !self.node(folder).is_folder() {
            return Err(Error::Structural(format!(
                "{} is a document and cannot have children",
                self.node(folder).id
            )));
        }

        let root_alias = self.validate_listing(folder, &entries)?;
        if let Some(alias) = root_alias {
            self.folders.insert(alias.clone(), self.root());
            self.root_alias = Some(alias);
        }

        let mut attached = Vec::with_capacity(entries.len());
        for entry in entries {
            let index = NodeIndex(self.nodes.len());
            let kind = match entry.document {
                Some(meta) => {
                    self.documents.insert(entry.id.clone());
                    NodeKind::Document(meta)
                }
                None => {
                    self.folders.insert(entry.id.clone(), index);
                    NodeKind::Folder {
                        children: Vec::new(),
                    }
                }
            };
            self.nodes.push(TreeNode {
                id: entry.id,
                name: entry.name,
                parent: Some(folder),
                kind,
            });
            if let NodeKind::Folder { children } = &mut self.nodes[folder.0].kind {
                children.push(index);
            }
            attached.push(index);
        }
        Ok(attached)
    }

    /// Check a listing against the tree; returns the root's real id when the
    /// root listing reveals it.
    fn validate_listing(&self, folder: NodeIndex, entries: &[NewNode]) -> Result<Option<RemoteId>> {
        let folder_id = &self.node(folder).id;
        let mut listed_folders = HashSet::new();
        let mut listed_documents = HashSet::new();
        let mut root_alias: Option<RemoteId> = None;

        for entry in entries {
            if let Some(parent) = &entry.reported_parent {
                if parent == &entry.id && entry.document.is_none() {
                    return Err(Error::Structural(format!(
                        "folder {} reports itself as its own parent",
                        entry.id
                    )));
                }
                match self.find_folder(parent) {
                    Some(p) if p == folder => {}
                    Some(_) => {
                        return Err(Error::Structural(format!(
                            "{} reports parent {} but was listed under {}",
                            entry.id, parent, folder_id
                        )));
                    }
                    None if folder == self.root()
                        && self.root_alias.is_none()
                        && root_alias.as_ref().is_none_or(|a| a == parent) =>
                    {
                        root_alias = Some(parent.clone());
                    }
                    None => {
                        return Err(Error::Structural(format!(
                            "{} references unknown parent {}",
                            entry.id, parent
                        )));
                    }
                }
            }

            if entry.document.is_some() {
                if self.documents.contains(&entry.id) || !listed_documents.insert(&entry.id) {
                    return Err(Error::Structural(format!(
                        "document {} appears more than once",
                        entry.id
                    )));
                }
                continue;
            }

            let known = self.find_folder(&entry.id).or_else(|| {
                root_alias
                    .as_ref()
                    .filter(|a| *a == &entry.id)
                    .map(|_| self.root())
            });
            if let Some(existing) = known {
                if self.is_self_or_ancestor(existing, folder) {
                    return Err(Error::Structural(format!(
                        "folder {} lists its own ancestor {} as a child",
                        folder_id, entry.id
                    )));
                }
                return Err(Error::Structural(format!(
                    "folder {} appears more than once",
                    entry.id
                )));
            }
            if !listed_folders.insert(&entry.id) {
                return Err(Error::Structural(format!(
                    "folder {} appears more than once",
                    entry.id
                )));
            }
        }

        Ok(root_alias)
    }
}

impl std::ops::Index<NodeIndex> for ProjectTree {
    type Output = TreeNode;

    fn index(&self, index: NodeIndex) -> &TreeNode {
        self.node(index)
    }
}

/// Walks parent links up to the root
pub struct Ancestors<'a> {
    tree: &'a ProjectTree,
    next: Option<NodeIndex>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<NodeIndex> {
        let current = self.next?;
        self.next = self.tree.node(current).parent;
        Some(current)
    }
}
