//! Path materialisation (`find_path`, spec.md §4.5).
//!
//! Ensures the RW branch contains every directory component of a relative
//! union path, copying up each missing directory *shallowly* (own
//! attributes only, contents are not recursively copied) so a child
//! operation can create directly at `rel`.

use std::path::{Component, Path, PathBuf};

use crate::attr::Attr;
use crate::branch::{BranchIo, TokioBranch};
use crate::error::Result;
use crate::inode::inode_number;
use crate::posix;

/// Walks the prefixes of `rel` in increasing length, materialising any
/// directory present in `ro` but missing from `rw`.
pub async fn find_path(ro: &TokioBranch, rw: &TokioBranch, rel: &Path) -> Result<()> {
    let mut prefix = PathBuf::new();
    for component in rel.components() {
        if !matches!(component, Component::Normal(_)) {
            continue;
        }
        prefix.push(component);

        if rw.exists(&prefix).await {
            continue;
        }
        if !ro.exists(&prefix).await {
            // Nothing to materialise from — the caller is responsible for
            // the final, not-yet-existing component itself.
            break;
        }

        let ro_meta = ro.stat(&prefix).await?;
        let fileid = inode_number(&prefix);
        let ro_attr = Attr::from_metadata(&ro_meta, fileid);
        rw.mkdir(&prefix, ro_attr.mode & 0o7777).await?;
        apply_shell_attrs(rw, &prefix, &ro_attr).await?;
    }
    Ok(())
}

async fn apply_shell_attrs(rw: &TokioBranch, rel: &Path, attr: &Attr) -> Result<()> {
    let full = rw.resolve(rel);
    posix::chown(&full, attr.uid, attr.gid).await?;
    posix::set_times(&full, attr.atime, attr.mtime).await?;
    Ok(())
}
