//! Whiteout subsystem (spec.md §4.2).
//!
//! A whiteout is a zero-length regular file at
//! `B_rw ++ parent(P) ++ ".wh." ++ base(P)`; its mere existence asserts
//! that `P` is deleted from the union even if RO still holds it.

use std::path::{Path, PathBuf};

use crate::branch::{BranchIo, TokioBranch};
use crate::error::{Error, Result};
use crate::materialize::find_path;
use crate::mount::{Credentials, Escalation};
use crate::path;

/// Owner/group for a whiteout marker (spec.md §3: "Owner/group are root").
const WHITEOUT_UID: u32 = 0;
const WHITEOUT_GID: u32 = 0;
/// Mode for a whiteout marker (spec.md §3: "mode is `0400`").
const WHITEOUT_MODE: u32 = 0o400;

/// Relative path of the whiteout marker for union path `rel`, or `None` if
/// `rel` has no parent component (spec.md §4.2: `EINVAL` "if P has no
/// parent component").
fn whiteout_path(rel: &Path) -> Option<PathBuf> {
    let parent = path::parent_of(rel)?;
    let base = path::base_name(rel)?;
    Some(parent.join(path::whiteout_name(base)))
}

/// Creates the `.wh.` marker for `rel` in `rw`, holding root identity for
/// the duration of the chown (spec.md §5: whiteout creation is one of the
/// mutations that "must execute with root identity").
///
/// Precondition: the parent directory of `rel` already exists in `rw` (the
/// caller is responsible for materialising it via `find_path`, spec.md
/// §4.2: "ensures the parent path of P is materialised in RW").
pub async fn create_whiteout(
    ro: &TokioBranch,
    rw: &TokioBranch,
    rel: &Path,
    escalation: &Escalation,
    caller: Credentials,
) -> Result<()> {
    let wh = whiteout_path(rel).ok_or(Error::InvalidArgument)?;
    path::check_length(&wh)?;
    let parent = path::parent_of(&wh).unwrap_or_default();
    find_path(ro, rw, &parent).await?;
    rw.create_file(&wh, WHITEOUT_MODE, false).await?;
    let _guard = escalation.push_root(caller);
    set_root_owner(rw, &wh).await
}

#[cfg(unix)]
async fn set_root_owner(rw: &TokioBranch, wh: &Path) -> Result<()> {
    rw.set_mode(wh, WHITEOUT_MODE & 0o7777).await?;
    let full = rw.resolve(wh);
    let ret = tokio::task::spawn_blocking(move || unsafe {
        let c = std::ffi::CString::new(full.as_os_str().as_encoded_bytes()).unwrap();
        libc::chown(c.as_ptr(), WHITEOUT_UID, WHITEOUT_GID)
    })
    .await
    .map_err(|_| Error::Io(std::io::ErrorKind::Other))?;

    if ret != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) {
            // Not running with real root privilege (e.g. non-root test/CI
            // runs): the marker keeps the caller's uid/gid. Logged rather
            // than silently swallowed, since it is a genuine deviation from
            // the on-disk contract of spec.md §3.
            tracing::warn!(path = %wh.display(), "whiteout chown to root denied, marker keeps caller's uid/gid");
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

/// `true` if a whiteout marker exists for `rel` in `rw`.
pub async fn find_whiteout(rw: &TokioBranch, rel: &Path) -> bool {
    match whiteout_path(rel) {
        Some(wh) => rw.exists(&wh).await,
        None => false,
    }
}

/// Removes the whiteout marker for `rel` if present; succeeds silently when
/// absent (spec.md §4.2).
pub async fn unlink_whiteout(rw: &TokioBranch, rel: &Path) -> Result<()> {
    let Some(wh) = whiteout_path(rel) else { return Ok(()) };
    if rw.exists(&wh).await {
        rw.unlink(&wh).await?;
    }
    Ok(())
}

/// For each entry `E` listed in the RO directory at `rel`, creates a
/// whiteout at `rel/E` — used when a new directory masks a pre-existing RO
/// directory (spec.md §4.2, invoked by `mkdir`).
pub async fn hide_directory_contents(
    ro: &TokioBranch,
    rw: &TokioBranch,
    rel: &Path,
    escalation: &Escalation,
    caller: Credentials,
) -> Result<()> {
    if !ro.exists(rel).await {
        return Ok(());
    }
    let names = ro.read_dir_names(rel).await?;
    for name in names {
        let name = name.to_string_lossy().into_owned();
        if name == "." || name == ".." {
            continue;
        }
        if path::is_whiteout_name(&name) || path::is_sidecar_name(&name) {
            continue;
        }
        let child = rel.join(&name);
        create_whiteout(ro, rw, &child, escalation, caller).await?;
    }
    Ok(())
}

/// `true` if the union directory at `rel` is empty (spec.md §4.2):
/// every RO entry is whited-out in RW, and RW contains only whiteouts.
///
/// Callers only need this once RW already holds an entry at `rel` — a
/// directory that exists solely in RO is removed by `rmdir` without
/// consulting this function at all (spec.md §4.2's "whiteout created
/// directly without RW content" transition), since no real content can
/// sit in RW for a path RW has never materialised.
///
/// When `delete_matching` is set, whiteouts consumed by the RO half of the
/// check are deleted in the same pass once *both* halves have passed
/// (spec.md §4.2: "matching whiteouts are deleted in the same pass once
/// both halves pass the check" — used by `rmdir`, which deletes the
/// directory's own whiteout bookkeeping, not the directory's whiteout
/// *of itself*).
pub async fn is_empty_dir(
    ro: &TokioBranch,
    rw: &TokioBranch,
    rel: &Path,
    delete_matching: bool,
) -> Result<bool> {
    let rw_names: Vec<String> = if rw.exists(rel).await {
        rw.read_dir_names(rel)
            .await?
            .into_iter()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| n != "." && n != "..")
            .collect()
    } else {
        Vec::new()
    };

    let mut rw_whiteouts = Vec::new();
    for name in &rw_names {
        if let Some(hidden) = path::strip_whiteout_prefix(name) {
            rw_whiteouts.push(hidden.to_string());
        } else if path::is_sidecar_name(name) {
            // sidecars never block emptiness; they are attribute-only.
            continue;
        } else {
            return Ok(false);
        }
    }

    let ro_names: Vec<String> = if ro.exists(rel).await {
        ro.read_dir_names(rel)
            .await?
            .into_iter()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| n != "." && n != "..")
            .collect()
    } else {
        Vec::new()
    };

    for name in &ro_names {
        if !rw_whiteouts.iter().any(|w| w == name) {
            return Ok(false);
        }
    }

    if delete_matching {
        for name in &ro_names {
            let child = rel.join(name);
            unlink_whiteout(rw, &child).await?;
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn branch() -> (TempDir, TokioBranch) {
        let dir = TempDir::new().unwrap();
        let branch = TokioBranch::new(dir.path().to_path_buf());
        (dir, branch)
    }

    fn root_creds() -> Credentials {
        Credentials::ROOT
    }

    #[tokio::test]
    async fn create_find_unlink_roundtrip() {
        let (_rw_dir, rw) = branch();
        let esc = Escalation::default();
        let rel = PathBuf::from("a");
        assert!(!find_whiteout(&rw, &rel).await);
        create_whiteout(&rw, &rw, &rel, &esc, root_creds()).await.unwrap();
        assert!(find_whiteout(&rw, &rel).await);
        unlink_whiteout(&rw, &rel).await.unwrap();
        assert!(!find_whiteout(&rw, &rel).await);
        // unlinking an absent whiteout silently succeeds.
        unlink_whiteout(&rw, &rel).await.unwrap();
    }

    #[tokio::test]
    async fn root_has_no_parent() {
        let (_rw_dir, rw) = branch();
        let esc = Escalation::default();
        let err = create_whiteout(&rw, &rw, Path::new(""), &esc, root_creds()).await.unwrap_err();
        assert_eq!(err, Error::InvalidArgument);
    }

    #[tokio::test]
    async fn empty_dir_true_when_ro_fully_whited_out() {
        let (_ro_dir, ro) = branch();
        let (_rw_dir, rw) = branch();
        let esc = Escalation::default();
        ro.mkdir(Path::new("d"), 0o755).await.unwrap();
        ro.create_file(Path::new("d/x"), 0o644, false).await.unwrap();
        rw.mkdir(Path::new("d"), 0o755).await.unwrap();
        create_whiteout(&ro, &rw, Path::new("d/x"), &esc, root_creds()).await.unwrap();

        assert!(is_empty_dir(&ro, &rw, Path::new("d"), false).await.unwrap());
    }

    #[tokio::test]
    async fn empty_dir_false_when_rw_has_real_entry() {
        let (_ro_dir, ro) = branch();
        let (_rw_dir, rw) = branch();
        rw.mkdir(Path::new("d"), 0o755).await.unwrap();
        rw.create_file(Path::new("d/real"), 0o644, false).await.unwrap();
        assert!(!is_empty_dir(&ro, &rw, Path::new("d"), false).await.unwrap());
    }
}
