//! Metadata sidecar subsystem (spec.md §4.4).
//!
//! Lets attribute-only changes on RO entries avoid a full copy-up: a
//! zero-length `.me.`-prefixed RW file whose own mode/uid/gid/times carry
//! the override for the RO entry at the same path.

use std::path::{Path, PathBuf};

use crate::attr::{Attr, SetAttr, SidecarAttr};
use crate::branch::{BranchIo, TokioBranch};
use crate::inode::inode_number;
use crate::materialize::find_path;
use crate::path;
use crate::posix;
use crate::error::Result;

fn sidecar_path(rel: &Path) -> Option<PathBuf> {
    let parent = path::parent_of(rel)?;
    let base = path::base_name(rel)?;
    Some(parent.join(path::sidecar_name(base)))
}

/// Looks up the sidecar for `rel`, returning its relative marker path and
/// the attributes it carries.
pub async fn find_sidecar(rw: &TokioBranch, rel: &Path) -> Result<Option<(PathBuf, SidecarAttr)>> {
    let Some(marker) = sidecar_path(rel) else { return Ok(None) };
    if !rw.exists(&marker).await {
        return Ok(None);
    }
    let meta = rw.stat(&marker).await?;
    Ok(Some((marker, SidecarAttr::from_marker_metadata(&meta))))
}

/// Computes the effective attributes for an RO-resolved path: stats the
/// resolved RO file for type/size/nlink/blocks, then overlays a sidecar's
/// permission/ownership/time fields if one exists (spec.md §4.4).
pub async fn get_effective_attrs(ro: &TokioBranch, rw: &TokioBranch, rel: &Path) -> Result<Attr> {
    let meta = ro.stat(rel).await?;
    let fileid = inode_number(rel);
    let mut attr = Attr::from_metadata(&meta, fileid);
    if let Some((_, sidecar)) = find_sidecar(rw, rel).await? {
        attr.overlay_sidecar(&sidecar);
    }
    Ok(attr)
}

/// Applies a `setattr` delta to an RO-resolved path, routing through the
/// sidecar subsystem (spec.md §4.4 `set_metadata`, RO branch of the rule).
pub async fn set_metadata_ro(
    ro: &TokioBranch,
    rw: &TokioBranch,
    rel: &Path,
    delta: &SetAttr,
) -> Result<()> {
    let parent = path::parent_of(rel).unwrap_or_default();
    find_path(ro, rw, &parent).await?;

    let existing = find_sidecar(rw, rel).await?;
    let mut sidecar = match existing {
        Some((_, attr)) => attr,
        None => {
            let ro_meta = ro.stat(rel).await?;
            let fileid = inode_number(rel);
            SidecarAttr::from_attr(&Attr::from_metadata(&ro_meta, fileid))
        }
    };
    sidecar.apply_delta(delta);
    write_sidecar(rw, rel, &sidecar).await
}

/// Bare construction of a sidecar from already-known attributes, used by
/// `unlink_copyup` when a copy-up is deleted while the RO original still
/// exists and had customised attributes (spec.md §4.4 `create_sidecar`).
pub async fn create_sidecar(rw: &TokioBranch, rel: &Path, attrs: &SidecarAttr) -> Result<()> {
    write_sidecar(rw, rel, attrs).await
}

async fn write_sidecar(rw: &TokioBranch, rel: &Path, attrs: &SidecarAttr) -> Result<()> {
    let marker = sidecar_path(rel).ok_or(crate::error::Error::InvalidArgument)?;
    path::check_length(&marker)?;
    if !rw.exists(&marker).await {
        rw.create_file(&marker, attrs.mode, false).await?;
    } else {
        rw.set_mode(&marker, attrs.mode).await?;
    }
    let full = rw.resolve(&marker);
    posix::chown(&full, attrs.uid, attrs.gid).await?;
    posix::set_times(&full, attrs.atime, attrs.mtime).await?;
    Ok(())
}

/// Removes the sidecar for `rel` if present, returning its attributes so a
/// caller (copy-up, or `unlink` rolling back a failed whiteout) can restore
/// it (spec.md §4.3 step 5, §4.9 `unlink` "restore it on whiteout failure").
pub async fn remove_sidecar(rw: &TokioBranch, rel: &Path) -> Result<Option<SidecarAttr>> {
    let Some((marker, attrs)) = find_sidecar(rw, rel).await? else { return Ok(None) };
    rw.unlink(&marker).await?;
    Ok(Some(attrs))
}
