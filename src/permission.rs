//! Permission model (spec.md §4.6).
//!
//! Evaluated against the *effective* attributes (sidecar-merged where
//! applicable) and the caller's credentials.

use std::path::Path;

use crate::attr::Attr;
use crate::branch::{BranchIo, TokioBranch};
use crate::error::{Error, Result};
use crate::mount::Credentials;
use crate::sidecar;

bitflags_like::access_mask! {
    /// Requested access bits, POSIX `R_OK`/`W_OK`/`X_OK` style.
    pub struct AccessMask: u32 {
        const READ = 0o4;
        const WRITE = 0o2;
        const EXECUTE = 0o1;
    }
}

/// `can_access(P, mode_mask)` (spec.md §4.6).
pub fn can_access(attr: &Attr, creds: &Credentials, mask: AccessMask) -> bool {
    if creds.uid == 0 {
        // Root semantics: grant unless X was requested and no execute bit
        // is set anywhere (spec.md §4.6).
        if mask.contains(AccessMask::EXECUTE) && (attr.mode & 0o111) == 0 {
            return false;
        }
        return true;
    }

    let triad = if creds.uid == attr.uid {
        (attr.mode >> 6) & 0o7
    } else if creds.gid == attr.gid {
        (attr.mode >> 3) & 0o7
    } else {
        attr.mode & 0o7
    };

    let needed = mask.to_triad_bits();
    (triad & needed) == needed
}

/// `can_remove(P) == can_access(parent(P), W)`.
pub async fn can_remove(
    ro: &TokioBranch,
    rw: &TokioBranch,
    parent: &Path,
    creds: &Credentials,
) -> Result<bool> {
    let attr = parent_attr(ro, rw, parent).await?;
    Ok(can_access(&attr, creds, AccessMask::WRITE))
}

/// `can_create(P) == can_remove(P)`.
pub async fn can_create(
    ro: &TokioBranch,
    rw: &TokioBranch,
    parent: &Path,
    creds: &Credentials,
) -> Result<bool> {
    can_remove(ro, rw, parent, creds).await
}

/// `can_traverse(P)`: require `X` on every directory along the prefix chain
/// from root to `P`, exclusive of `P` itself.
pub async fn can_traverse(
    ro: &TokioBranch,
    rw: &TokioBranch,
    rel: &Path,
    creds: &Credentials,
) -> Result<bool> {
    if creds.uid == 0 {
        return Ok(true);
    }
    let mut prefix = std::path::PathBuf::new();
    let components: Vec<_> = rel.components().collect();
    // Exclusive of `P` itself: drop the last component.
    for component in components.iter().take(components.len().saturating_sub(1)) {
        prefix.push(component);
        let attr = parent_attr(ro, rw, &prefix).await?;
        if !can_access(&attr, creds, AccessMask::EXECUTE) {
            return Ok(false);
        }
    }
    Ok(true)
}

async fn parent_attr(ro: &TokioBranch, rw: &TokioBranch, rel: &Path) -> Result<Attr> {
    if rw.exists(rel).await {
        let meta = rw.stat(rel).await?;
        Ok(Attr::from_metadata(&meta, crate::inode::inode_number(rel)))
    } else if ro.exists(rel).await {
        sidecar::get_effective_attrs(ro, rw, rel).await
    } else {
        Err(Error::NoEntry)
    }
}

/// Minimal hand-rolled bitflags-style mask, matching the weight this
/// lineage gives `vfs::AccessMask` (a thin wrapper over a `u32`) without
/// pulling in the `bitflags` crate for three bits.
mod bitflags_like {
    macro_rules! access_mask {
        (
            $(#[$meta:meta])*
            pub struct $name:ident: $ty:ty {
                $(const $variant:ident = $value:expr;)*
            }
        ) => {
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub struct $name(pub $ty);

            impl $name {
                $(pub const $variant: $name = $name($value);)*

                pub fn contains(&self, other: $name) -> bool {
                    (self.0 & other.0) == other.0
                }

                pub fn to_triad_bits(&self) -> $ty {
                    self.0
                }
            }

            impl std::ops::BitOr for $name {
                type Output = $name;
                fn bitor(self, rhs: $name) -> $name {
                    $name(self.0 | rhs.0)
                }
            }
        };
    }
    pub(crate) use access_mask;
}
