//! Wire formats of the listing, locator and session endpoints.

use crate::error::AuthError;
use crate::tree::{ContentRef, DocumentMeta, NewNode, RemoteId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One page of a paginated listing
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Entries on this page, in API order
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Cursor for the following page
    #[serde(default)]
    pub next_cursor: Option<String>,
    /// Explicit end-of-pages marker, when the API sends one
    #[serde(default)]
    pub has_more: Option<bool>,
}

impl<T> Page<T> {
    /// A final page holding `items`
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
            has_more: None,
        }
    }

    /// A page followed by another one at `cursor`
    pub fn with_next(items: Vec<T>, cursor: impl Into<String>) -> Self {
        Self {
            items,
            next_cursor: Some(cursor.into()),
            has_more: None,
        }
    }

    /// Cursor of the next page, or `None` at the end of the listing
    pub fn next(&self) -> Option<&str> {
        if self.has_more == Some(false) {
            return None;
        }
        self.next_cursor.as_deref().filter(|c| !c.is_empty())
    }
}

/// Kind of a listing entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A sub-folder
    Folder,
    /// A document
    #[serde(alias = "file")]
    Document,
}

/// One entry of a folder listing
///
/// Entries come in two shapes. The generic one carries `id` and `kind`. The
/// Filevine record shape carries `folderId` (folders) or `documentId` plus
/// the containing `folderId` (documents) and no `kind`.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "RawListingItem")]
pub struct ListingItem {
    /// Remote id
    pub id: RemoteId,
    /// Display name (`filename` for documents)
    pub name: String,
    /// Folder or document
    pub kind: ItemKind,
    /// Parent folder id as reported by the API
    pub parent_id: Option<RemoteId>,
    /// Document size in bytes
    pub size: Option<u64>,
    /// Direct content URL, when the listing provides one
    pub download_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawListingItem {
    #[serde(default)]
    id: Option<RemoteId>,
    #[serde(default)]
    folder_id: Option<RemoteId>,
    #[serde(default)]
    document_id: Option<RemoteId>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    kind: Option<ItemKind>,
    #[serde(default)]
    parent_id: Option<RemoteId>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    download_url: Option<String>,
}

impl TryFrom<RawListingItem> for ListingItem {
    type Error = String;

    fn try_from(raw: RawListingItem) -> Result<Self, Self::Error> {
        let kind = match (raw.kind, &raw.document_id, &raw.folder_id) {
            (Some(kind), _, _) => kind,
            (None, Some(_), _) => ItemKind::Document,
            (None, None, Some(_)) => ItemKind::Folder,
            (None, None, None) => {
                return Err("listing entry has neither kind, documentId nor folderId".into());
            }
        };

        // On a document record folderId names the containing folder
        let (own_id, containing_folder) = match kind {
            ItemKind::Document => (raw.document_id, raw.folder_id),
            ItemKind::Folder => (raw.folder_id, None),
        };
        let id = raw
            .id
            .or(own_id)
            .ok_or_else(|| format!("{kind:?} listing entry has no id"))?;
        let name = raw
            .name
            .or(raw.filename)
            .ok_or_else(|| format!("listing entry {id} has no name"))?;

        Ok(Self {
            id,
            name,
            kind,
            parent_id: raw.parent_id.or(containing_folder),
            size: raw.size,
            download_url: raw.download_url,
        })
    }
}

impl ListingItem {
    /// Convert into a node ready to attach to the tree
    pub fn into_new_node(self) -> NewNode {
        let document = match self.kind {
            ItemKind::Folder => None,
            ItemKind::Document => Some(DocumentMeta {
                size: self.size,
                content: match self.download_url {
                    Some(url) if !url.is_empty() => ContentRef::Direct(url),
                    _ => ContentRef::Locator(self.id.clone()),
                },
            }),
        };
        NewNode {
            id: self.id,
            name: self.name,
            reported_parent: self.parent_id,
            document,
        }
    }
}

/// Response of `Documents/{id}/locator`
#[derive(Clone, Debug, Deserialize)]
pub struct Locator {
    /// Pre-signed content URL
    pub url: String,
}

/// Organization and user the token acts for
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Sent as `x-fv-orgid`
    pub org_id: String,
    /// Sent as `x-fv-userid`
    pub user_id: String,
}

impl Session {
    /// Parse a `GetUserOrgsWithToken` response
    ///
    /// Ids are looked up in the nested form (`user.userId`, `orgs[0].orgId`)
    /// first and fall back to top-level keys; each id may be a scalar or a
    /// `{native, partner}` object.
    pub fn from_response(info: &Value) -> Result<Self, AuthError> {
        let user_id = info
            .get("user")
            .and_then(|user| pick_id(user, "userId"))
            .or_else(|| pick_id(info, "userId"))
            .ok_or_else(|| AuthError::new("unable to parse userId from GetUserOrgsWithToken"))?;

        let org_id = info
            .get("orgs")
            .and_then(Value::as_array)
            .and_then(|orgs| orgs.first())
            .and_then(|org| pick_id(org, "orgId"))
            .or_else(|| pick_id(info, "orgId"))
            .ok_or_else(|| AuthError::new("unable to parse orgId from GetUserOrgsWithToken"))?;

        Ok(Self { org_id, user_id })
    }
}

fn pick_id(data: &Value, key: &str) -> Option<String> {
    let upper = format!("{}ID", key.strip_suffix("Id").unwrap_or(key));
    let value = data
        .get(key)
        .or_else(|| data.get(key.to_lowercase()))
        .or_else(|| data.get(upper))?;

    match value {
        Value::Object(map) => map
            .get("native")
            .and_then(scalar)
            .or_else(|| map.get("partner").and_then(scalar)),
        other => scalar(other),
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
