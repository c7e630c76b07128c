//! Tree builders shared by unit tests

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::tree::{ContentRef, DocumentMeta, NewNode, NodeIndex, ProjectTree, RemoteId};

pub(crate) fn folder(id: &str, name: &str) -> NewNode {
    NewNode {
        id: RemoteId::new(id),
        name: name.to_string(),
        reported_parent: None,
        document: None,
    }
}

pub(crate) fn document(id: &str, name: &str) -> NewNode {
    NewNode {
        id: RemoteId::new(id),
        name: name.to_string(),
        reported_parent: None,
        document: Some(DocumentMeta {
            size: None,
            content: ContentRef::Locator(RemoteId::new(id)),
        }),
    }
}

/// Attach `entries` under `parent` and return the new indices
pub(crate) fn attach(
    tree: &mut ProjectTree,
    parent: NodeIndex,
    entries: Vec<NewNode>,
) -> Vec<NodeIndex> {
    tree.attach(parent, entries).unwrap()
}

/// A project with `count` documents spread over two nested folders
///
/// ```text
/// root/
///   doc-0 .. doc-(count/3)
///   Pleadings/
///     ...
///     Exhibits/
///       ...
/// ```
pub(crate) fn sample_tree(count: usize) -> ProjectTree {
    let mut tree = ProjectTree::new("42");
    let root = tree.root();
    let top = attach(&mut tree, root, vec![folder("f1", "Pleadings")]);
    let nested = attach(&mut tree, top[0], vec![folder("f2", "Exhibits")]);

    let targets = [root, top[0], nested[0]];
    for i in 0..count {
        let parent = targets[i % targets.len()];
        attach(
            &mut tree,
            parent,
            vec![document(&format!("d{i}"), &format!("doc-{i}.txt"))],
        );
    }
    tree
}
