//! Path & name utilities for the union namespace.
//!
//! A relative path `P` is always `/`-rooted *within* the union and never
//! carries a branch prefix (spec.md §3). This module owns every place that
//! turns a `P` into a branch path, or inspects a bare name for the
//! reserved `.wh.`/`.me.` prefixes.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Prefix marking a whiteout marker.
pub const WHITEOUT_PREFIX: &str = ".wh.";
/// Prefix marking a metadata sidecar.
pub const SIDECAR_PREFIX: &str = ".me.";

/// Maximum length of a single path component, mirrored from this lineage's
/// `vfs::MAX_NAME_LEN`.
pub const MAX_NAME_LEN: usize = 255;
/// Maximum length of a composed path, mirrored from `vfs::MAX_PATH_LEN`.
pub const MAX_PATH_LEN: usize = 1024;

/// Validate that `name` is a single, non-empty, non-reserved path component.
///
/// Rejects `.`, `..`, embedded separators, names over [`MAX_NAME_LEN`], and
/// (per spec.md §9) names beginning with [`WHITEOUT_PREFIX`] or
/// [`SIDECAR_PREFIX`] — those prefixes are reserved for the core itself and
/// must not be creatable through the union surface.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::NameTooLong);
    }
    if name == "." || name == ".." {
        return Err(Error::InvalidArgument);
    }
    if name.starts_with(WHITEOUT_PREFIX) || name.starts_with(SIDECAR_PREFIX) {
        return Err(Error::InvalidArgument);
    }
    let mut components = Path::new(name).components();
    match components.next() {
        Some(Component::Normal(_)) => {}
        _ => return Err(Error::InvalidArgument),
    }
    if components.next().is_some() {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}

/// `true` if `name` is the bare basename of a whiteout marker.
pub fn is_whiteout_name(name: &str) -> bool {
    name.starts_with(WHITEOUT_PREFIX)
}

/// `true` if `name` is the bare basename of a metadata sidecar.
pub fn is_sidecar_name(name: &str) -> bool {
    name.starts_with(SIDECAR_PREFIX)
}

/// Returns the whiteout basename (`.wh.<name>`) hiding `name`.
pub fn whiteout_name(name: &str) -> String {
    format!("{WHITEOUT_PREFIX}{name}")
}

/// Returns the sidecar basename (`.me.<name>`) overriding attributes of `name`.
pub fn sidecar_name(name: &str) -> String {
    format!("{SIDECAR_PREFIX}{name}")
}

/// Strips the whiteout prefix, returning the bare hidden name.
pub fn strip_whiteout_prefix(name: &str) -> Option<&str> {
    name.strip_prefix(WHITEOUT_PREFIX)
}

/// Strips the sidecar prefix, returning the bare overridden name.
pub fn strip_sidecar_prefix(name: &str) -> Option<&str> {
    name.strip_prefix(SIDECAR_PREFIX)
}

/// Join a validated child name onto a relative union path `P`.
pub fn join_child(base: &Path, name: &str) -> Result<PathBuf> {
    validate_name(name)?;
    let mut rel = base.to_path_buf();
    rel.push(name);
    check_length(&rel)?;
    Ok(rel)
}

/// Reject a composed relative path over [`MAX_PATH_LEN`] bytes.
pub fn check_length(rel: &Path) -> Result<()> {
    if rel.as_os_str().len() > MAX_PATH_LEN {
        return Err(Error::NameTooLong);
    }
    Ok(())
}

/// Returns the basename of a relative union path, if any.
pub fn base_name(rel: &Path) -> Option<&str> {
    rel.file_name().and_then(|n| n.to_str())
}

/// Returns the parent of a relative union path as an owned, possibly-empty
/// (root) path. `spec.md` §4.2: `create_whiteout` fails `EINVAL` if `P` has
/// no parent component — that check belongs to the caller, since the root
/// itself (`P == "/"`) is a legitimate, parent-less path for other purposes.
pub fn parent_of(rel: &Path) -> Option<PathBuf> {
    rel.parent().map(Path::to_path_buf)
}

/// Concatenate a branch root `B` (without trailing slash) with relative
/// path `P`, yielding the branch path `B ++ P` used with Branch I/O.
pub fn branch_path(branch_root: &Path, rel: &Path) -> PathBuf {
    if rel.as_os_str().is_empty() {
        branch_root.to_path_buf()
    } else {
        branch_root.join(rel)
    }
}

/// Rejects a branch root that is relative (spec.md §6: "Relative branch
/// paths are rejected") and strips any trailing slash.
pub fn normalize_branch_root(root: &Path) -> Result<PathBuf> {
    if !root.is_absolute() {
        return Err(Error::InvalidArgument);
    }
    let s = root.to_string_lossy();
    let trimmed = s.trim_end_matches('/');
    let trimmed = if trimmed.is_empty() { "/" } else { trimmed };
    Ok(PathBuf::from(trimmed))
}
