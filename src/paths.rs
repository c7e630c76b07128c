//! Local path assignment for tree nodes
//!
//! [`PathMapper`] computes every node's destination once, up front, from the
//! complete tree: names are sanitized for the local filesystem and sibling
//! collisions are numbered in discovery order.

use crate::error::Result;
use crate::tree::{NodeIndex, ProjectTree};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Longest file name most filesystems accept, in bytes
const MAX_NAME_BYTES: usize = 255;

/// Device names Windows refuses as file stems
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// A node paired with its absolute local path
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedPath {
    /// The node
    pub node: NodeIndex,
    /// Where the node lives on disk
    pub path: PathBuf,
}

/// Precomputed local paths for every node of a [`ProjectTree`]
#[derive(Clone, Debug)]
pub struct PathMapper {
    root: PathBuf,
    paths: Vec<PathBuf>,
}

impl PathMapper {
    /// Assign paths under `dest_root` to every node of `tree`
    ///
    /// The project root maps to `dest_root` itself. With `case_insensitive`,
    /// names differing only in case count as collisions.
    pub fn new(dest_root: impl Into<PathBuf>, tree: &ProjectTree, case_insensitive: bool) -> Self {
        let root = dest_root.into();
        let mut paths = vec![PathBuf::new(); tree.len()];
        paths[tree.root().0] = root.clone();

        // Pre-order visits every parent before its children
        for folder in tree.folders() {
            let mut taken = HashSet::new();
            for &child in tree.node(folder).children() {
                let node = tree.node(child);
                let name = unique_name(&node.name, node.is_folder(), &mut taken, case_insensitive);
                paths[child.0] = paths[folder.0].join(name);
            }
        }

        Self { root, paths }
    }

    /// The destination root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path of `node`
    pub fn path(&self, node: NodeIndex) -> &Path {
        &self.paths[node.0]
    }

    /// Local path of `node`, paired with the node
    pub fn resolve(&self, node: NodeIndex) -> ResolvedPath {
        ResolvedPath {
            node,
            path: self.paths[node.0].clone(),
        }
    }

    /// `node`'s path relative to the destination root
    pub fn relative(&self, node: NodeIndex) -> &Path {
        let path = self.path(node);
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

/// Pick the first free variant of `name` among its siblings
///
/// A document also claims the name of its temp file, so no sibling can end
/// up at a path another download writes through.
fn unique_name(
    name: &str,
    is_folder: bool,
    taken: &mut HashSet<String>,
    case_insensitive: bool,
) -> String {
    let key = |name: &str| {
        if case_insensitive {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    };

    let base = sanitize_name(name);
    let mut n = 0u32;
    loop {
        let candidate = if n == 0 {
            base.clone()
        } else {
            numbered(&base, n, is_folder)
        };
        let temp = (!is_folder).then(|| key(&temp_name(&candidate)));
        let name_key = key(&candidate);

        let free = !taken.contains(&name_key)
            && temp.as_ref().is_none_or(|t| *t != name_key && !taken.contains(t));
        if free {
            taken.insert(name_key);
            taken.extend(temp);
            return candidate;
        }
        n += 1;
    }
}

/// `report.pdf` -> `report (n).pdf`; folders are numbered at the end
fn numbered(base: &str, n: u32, is_folder: bool) -> String {
    let (stem, ext) = if is_folder {
        (base, "")
    } else {
        split_extension(base)
    };
    let suffix = format!(" ({n}){ext}");
    let stem = floor_boundary(stem, MAX_NAME_BYTES.saturating_sub(suffix.len()));
    format!("{stem}{suffix}")
}

/// Make a remote name safe to use as one local path segment
///
/// Separators, characters Windows rejects and control characters become `_`.
/// Trailing dots and spaces are stripped, reserved device names get a `_`
/// prefix, and the result is cut to 255 bytes keeping the extension.
pub fn sanitize_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let mut name = replaced.trim_end_matches(['.', ' ']).to_string();
    if name.is_empty() {
        return "_".to_string();
    }

    let device = name.split('.').next().unwrap_or_default();
    if RESERVED_NAMES.iter().any(|r| device.eq_ignore_ascii_case(r)) {
        name.insert(0, '_');
    }

    truncate_name(&name)
}

fn truncate_name(name: &str) -> String {
    if name.len() <= MAX_NAME_BYTES {
        return name.to_string();
    }

    let (stem, ext) = split_extension(name);
    let cut = if ext.len() < MAX_NAME_BYTES / 2 {
        format!(
            "{}{ext}",
            floor_boundary(stem, MAX_NAME_BYTES - ext.len())
        )
    } else {
        floor_boundary(name, MAX_NAME_BYTES).to_string()
    };

    let trimmed = cut.trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Split at the last dot, treating a leading dot as part of the stem
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

/// Longest prefix of `s` no longer than `max` bytes that ends on a char boundary
fn floor_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Sibling temp file a download is written to before the final rename
pub fn temp_path(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    final_path.with_file_name(temp_name(&name))
}

/// `.name.part`, cut from the front when too long so numbered variants stay distinct
fn temp_name(name: &str) -> String {
    let budget = MAX_NAME_BYTES - ".".len() - ".part".len();
    let mut start = name.len().saturating_sub(budget);
    while !name.is_char_boundary(start) {
        start += 1;
    }
    format!(".{}.part", &name[start..])
}

/// Create `dir` and its parents
///
/// Succeeds when the directory already exists, including when another worker
/// created it concurrently.
pub async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}
