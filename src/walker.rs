//! Breadth-first discovery of a project's folder tree
//!
//! Folders are listed one at a time. Every page of a folder is collected
//! before its listing is attached, so a sub-tree is either attached whole or
//! recorded as skipped. Failures below the root abandon only that sub-tree;
//! failures listing the root itself abort the walk.

use crate::api::{ListingItem, Page};
use crate::error::{Error, Result};
use crate::tree::{NewNode, NodeIndex, ProjectTree, RemoteId};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use tokio_util::sync::CancellationToken;

/// A folder to list
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FolderRef {
    /// The project's root folder
    Root,
    /// A folder by remote id
    Id(RemoteId),
}

impl std::fmt::Display for FolderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FolderRef::Root => write!(f, "root"),
            FolderRef::Id(id) => write!(f, "{id}"),
        }
    }
}

/// Source of paginated folder listings
#[async_trait]
pub trait FolderListing: Send + Sync {
    /// Fetch one page of `folder`'s direct children
    async fn list_page(
        &self,
        project_id: &str,
        folder: &FolderRef,
        cursor: Option<&str>,
    ) -> Result<Page<ListingItem>>;
}

/// Builds a [`ProjectTree`] by listing folders breadth-first
pub struct TreeWalker<'a> {
    listing: &'a dyn FolderListing,
    cancel: CancellationToken,
}

impl<'a> TreeWalker<'a> {
    /// Create a walker over `listing`; cancelling `cancel` stops the walk
    /// between pages.
    pub fn new(listing: &'a dyn FolderListing, cancel: CancellationToken) -> Self {
        Self { listing, cancel }
    }

    /// Discover every reachable folder and document of `project_id`
    ///
    /// Sub-folders that fail to list are recorded in
    /// [`ProjectTree::skipped_folders`] and the walk continues. A failure of
    /// the root listing, or any authentication failure, is returned as an error.
    pub async fn build_tree(&self, project_id: &str) -> Result<ProjectTree> {
        let mut tree = ProjectTree::new(project_id);
        let mut queue = VecDeque::from([tree.root()]);

        while let Some(folder) = queue.pop_front() {
            let is_root = folder == tree.root();

            let outcome = if self.cancel.is_cancelled() {
                Err(Error::Cancelled)
            } else {
                match self.list_folder(&tree, folder).await {
                    Ok(entries) => tree.attach(folder, entries),
                    Err(e) => Err(e),
                }
            };

            match outcome {
                Ok(attached) => {
                    queue.extend(attached.into_iter().filter(|&i| tree.node(i).is_folder()));
                }
                Err(e) if is_root => {
                    tracing::error!(project_id, error = %e, "Project root could not be listed");
                    return Err(e);
                }
                Err(Error::Cancelled) => {
                    tracing::warn!(
                        project_id,
                        unlisted = queue.len() + 1,
                        "Walk cancelled, remaining folders left unlisted"
                    );
                    tree.mark_skipped(folder, "cancelled");
                    for pending in queue.drain(..) {
                        tree.mark_skipped(pending, "cancelled");
                    }
                    break;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        folder_id = %tree.node(folder).id,
                        folder = %tree.node(folder).name,
                        error = %e,
                        "Skipping folder"
                    );
                    tree.mark_skipped(folder, e.to_string());
                }
            }
        }

        tracing::info!(
            project_id,
            nodes = tree.len(),
            documents = tree.documents().len(),
            skipped_folders = tree.skipped_folders().len(),
            "Project tree built"
        );
        Ok(tree)
    }

    /// Collect every page of one folder's listing
    async fn list_folder(&self, tree: &ProjectTree, folder: NodeIndex) -> Result<Vec<NewNode>> {
        let target = if folder == tree.root() {
            FolderRef::Root
        } else {
            FolderRef::Id(tree.node(folder).id.clone())
        };

        let mut entries = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();
        let mut pages = 0usize;

        loop {
            let page = tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                page = self.listing.list_page(
                    tree.project_id(),
                    &target,
                    cursor.as_deref(),
                ) => page?,
            };
            pages += 1;

            let next = page.next().map(str::to_owned);
            entries.extend(page.items.into_iter().map(ListingItem::into_new_node));

            match next {
                Some(next) if !seen_cursors.insert(next.clone()) => {
                    return Err(Error::Structural(format!(
                        "listing of folder {target} repeated page cursor {next:?}"
                    )));
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::debug!(folder = %target, pages, entries = entries.len(), "Folder listed");
        Ok(entries)
    }
}
