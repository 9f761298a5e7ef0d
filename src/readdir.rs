//! Directory Iteration Union (spec.md §4.7): merges RW and RO listings of a
//! directory into the single set callers observe through `readdir`.

use std::path::Path;

use crate::branch::{BranchIo, TokioBranch};
use crate::error::Result;
use crate::inode::inode_number;
use crate::path;

/// One entry in a union directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub inode: u64,
}

/// Materialises the union listing for `rel` (spec.md §4.7 steps 1-4).
///
/// The returned list is meant to be snapshotted once per directory handle
/// and served by position (spec.md §5: "readdir snapshots the union at
/// first invocation").
pub async fn union_listing(ro: &TokioBranch, rw: &TokioBranch, rel: &Path) -> Result<Vec<DirEntry>> {
    let mut entries: Vec<DirEntry> = Vec::new();
    let mut whiteouts: Vec<String> = Vec::new();

    if rw.exists(rel).await {
        for name in rw.read_dir_names(rel).await? {
            let name = name.to_string_lossy().into_owned();
            if name == "." || name == ".." {
                continue;
            }
            if path::is_sidecar_name(&name) {
                continue;
            }
            if let Some(hidden) = path::strip_whiteout_prefix(&name) {
                whiteouts.push(hidden.to_string());
                continue;
            }
            let child = rel.join(&name);
            entries.push(DirEntry { name, inode: inode_number(&child) });
        }
    }

    if ro.exists(rel).await {
        for name in ro.read_dir_names(rel).await? {
            let name = name.to_string_lossy().into_owned();
            if name == "." || name == ".." {
                continue;
            }
            if whiteouts.iter().any(|w| w == &name) {
                continue;
            }
            if entries.iter().any(|e| e.name == name) {
                continue;
            }
            let child = rel.join(&name);
            entries.push(DirEntry { name, inode: inode_number(&child) });
        }
    }

    Ok(entries)
}

/// A single directory handle's snapshot, served by position (spec.md §4.7
/// step 5, §5 "the list is held until the directory handle is released").
pub struct DirHandle {
    entries: Vec<DirEntry>,
}

impl DirHandle {
    pub async fn open(ro: &TokioBranch, rw: &TokioBranch, rel: &Path) -> Result<Self> {
        Ok(DirHandle { entries: union_listing(ro, rw, rel).await? })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entry at `pos` (the synthetic `f_pos`), or `None` past
    /// the end of the snapshot.
    pub fn at(&self, pos: usize) -> Option<&DirEntry> {
        self.entries.get(pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter()
    }
}
