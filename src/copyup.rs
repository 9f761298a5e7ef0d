//! The Copy-Up Engine (spec.md §4.3): promotes an RO entry into RW so it can
//! be mutated in place, preserving every attribute the union currently
//! presents for it (including any metadata sidecar override) and retiring
//! that sidecar once its attributes live directly on the RW copy.

use std::path::{Path, PathBuf};

use crate::attr::{Attr, SidecarAttr};
use crate::branch::{BranchIo, NodeKind, TokioBranch};
use crate::error::Result;
use crate::inode::inode_number;
use crate::materialize::find_path;
use crate::mount::MountState;
use crate::path;
use crate::posix;
use crate::sidecar;

/// Chunk size used when streaming a regular file's contents up into RW
/// (spec.md §4.3: "copies the file's bytes in bounded chunks").
pub const COPY_UP_BUFFER: usize = 4096;

/// `copy_up(P)` (spec.md §4.3).
///
/// Precondition: `P` resolves in RO, is not whited out in RW, and does not
/// already exist in RW (the resolver enforces all three before calling in).
pub async fn copy_up(state: &MountState, rel: &Path) -> Result<()> {
    let parent = path::parent_of(rel).unwrap_or_default();
    find_path(&state.ro, &state.rw, &parent).await?;

    let ro_meta = state.ro.stat(rel).await?;
    let fileid = inode_number(rel);
    let mut attr = Attr::from_metadata(&ro_meta, fileid);

    let existing_sidecar = sidecar::find_sidecar(&state.rw, rel).await?;
    if let Some((_, sc)) = &existing_sidecar {
        attr.overlay_sidecar(sc);
    }

    clone_entry(&state.ro, &state.rw, rel, &attr).await?;
    if let Err(e) = apply_final_attrs(&state.rw, rel, &attr).await {
        tracing::warn!(path = %rel.display(), "copy-up attribute reconciliation failed, unwinding");
        let _ = remove_rw_subtree(&state.rw, rel).await;
        return Err(e);
    }

    // The sidecar's job is now done by the RW copy's own attributes.
    if existing_sidecar.is_some() {
        sidecar::remove_sidecar(&state.rw, rel).await?;
    }

    Ok(())
}

/// Clones one entry's type and content from RO into RW, unwinding whatever
/// it created if any step after the initial create fails (spec.md §4.3 step
/// 3: "on any I/O error, delete the partial copy and propagate").
async fn clone_entry(ro: &TokioBranch, rw: &TokioBranch, rel: &Path, attr: &Attr) -> Result<()> {
    use crate::attr::FileType;
    match attr.file_type {
        FileType::Regular => {
            rw.create_file(rel, attr.mode & 0o7777, false).await?;
            if let Err(e) = copy_regular_contents(ro, rw, rel).await {
                tracing::warn!(path = %rel.display(), "copy-up of regular file failed mid-stream, deleting partial copy");
                let _ = rw.unlink(rel).await;
                return Err(e);
            }
        }
        FileType::Directory => {
            let shell_created = !rw.exists(rel).await;
            if shell_created {
                rw.mkdir(rel, attr.mode & 0o7777).await?;
            }
            if let Err(e) = copy_directory_children(ro, rw, rel).await {
                if shell_created {
                    tracing::warn!(path = %rel.display(), "directory copy-up failed, deleting partial RW subtree");
                    let _ = remove_rw_subtree(rw, rel).await;
                }
                return Err(e);
            }
        }
        FileType::Symlink => {
            let target = ro.read_link(rel).await?;
            rw.symlink(rel, &target).await?;
        }
        FileType::Fifo => {
            rw.mknod(rel, attr.mode & 0o7777, NodeKind::Fifo).await?;
        }
        FileType::Socket => {
            rw.mknod(rel, attr.mode & 0o7777, NodeKind::Socket).await?;
        }
        FileType::CharDevice => {
            let dev = attr.device.unwrap_or(crate::attr::Device { major: 0, minor: 0 });
            rw.mknod(rel, attr.mode & 0o7777, NodeKind::CharDevice(dev)).await?;
        }
        FileType::BlockDevice => {
            let dev = attr.device.unwrap_or(crate::attr::Device { major: 0, minor: 0 });
            rw.mknod(rel, attr.mode & 0o7777, NodeKind::BlockDevice(dev)).await?;
        }
    }
    Ok(())
}

/// Recursively deletes whatever a failed copy-up left behind at `rel`
/// (spec.md §7 propagation policy item 1: partial copy-up is rolled back
/// locally rather than left for the caller to clean up).
async fn remove_rw_subtree(rw: &TokioBranch, rel: &Path) -> Result<()> {
    let Ok(meta) = rw.stat(rel).await else {
        return Ok(());
    };
    if meta.is_dir() {
        for name in rw.read_dir_names(rel).await? {
            let name = name.to_string_lossy().into_owned();
            if name == "." || name == ".." {
                continue;
            }
            Box::pin(remove_rw_subtree(rw, &rel.join(&name))).await?;
        }
        rw.rmdir(rel).await?;
    } else {
        rw.unlink(rel).await?;
    }
    Ok(())
}

/// Streams a regular file's bytes from RO into the freshly created RW copy
/// in bounded chunks (spec.md §4.3 item 2), rather than reading the whole
/// file into memory at once.
async fn copy_regular_contents(ro: &TokioBranch, rw: &TokioBranch, rel: &Path) -> Result<()> {
    let dst_path = rw.resolve(rel);
    let mut dst = tokio::fs::OpenOptions::new().write(true).open(&dst_path).await?;
    ro.stream_to(rel, &mut dst, COPY_UP_BUFFER).await
}

/// Recursively shells in an RO directory's immediate and nested children
/// (spec.md §4.3 item 3: "directory copy-up creates the shell and
/// recursively copies its children").
async fn copy_directory_children(ro: &TokioBranch, rw: &TokioBranch, rel: &Path) -> Result<()> {
    let names = ro.read_dir_names(rel).await?;
    let mut created: Vec<PathBuf> = Vec::new();
    for name in names {
        let name = name.to_string_lossy().into_owned();
        if name == "." || name == ".." {
            continue;
        }
        if path::is_whiteout_name(&name) || path::is_sidecar_name(&name) {
            continue;
        }
        let child = rel.join(&name);
        if rw.exists(&child).await {
            continue;
        }
        let meta = ro.stat(&child).await?;
        let fileid = inode_number(&child);
        let child_attr = Attr::from_metadata(&meta, fileid);

        if let Err(e) = Box::pin(clone_entry(ro, rw, &child, &child_attr)).await {
            for sibling in created.iter().rev() {
                let _ = Box::pin(remove_rw_subtree(rw, sibling)).await;
            }
            return Err(e);
        }
        if let Err(e) = Box::pin(apply_final_attrs(rw, &child, &child_attr)).await {
            let _ = remove_rw_subtree(rw, &child).await;
            for sibling in created.iter().rev() {
                let _ = Box::pin(remove_rw_subtree(rw, sibling)).await;
            }
            return Err(e);
        }
        created.push(child);
    }
    Ok(())
}

/// Reconciles ownership and timestamps on the freshly copied-up entry with
/// the attributes it presented through the union just before the copy-up
/// (spec.md §4.3 item 4 "attribute reconciliation").
async fn apply_final_attrs(rw: &TokioBranch, rel: &Path, attr: &Attr) -> Result<()> {
    rw.set_mode(rel, attr.mode & 0o7777).await?;
    let full = rw.resolve(rel);
    posix::chown(&full, attr.uid, attr.gid).await?;
    posix::set_times(&full, attr.atime, attr.mtime).await?;
    Ok(())
}

/// Restores a sidecar for `rel` after a copy-up's RW content is removed
/// again (spec.md §4.3 step 5 "unlink rolling a copy-up back to RO+sidecar
/// when the delete target still exists in RO").
pub async fn retire_to_sidecar(rw: &TokioBranch, rel: &Path, attr: &Attr) -> Result<()> {
    sidecar::create_sidecar(rw, rel, &SidecarAttr::from_attr(attr)).await
}
