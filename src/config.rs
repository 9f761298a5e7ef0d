//! Mount configuration (spec.md §6): the configuration record an external
//! mount adaptor hands the core. Kept out of the resolution/mutation
//! protocol entirely — this module only resolves `branch_spec` into a
//! concrete (RO, RW) pair and validates it.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::path::normalize_branch_root;

/// Which kind of branch a configured path was explicitly tagged as.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BranchKind {
    Ro,
    Rw,
}

/// One entry of `branch_spec`: a path, optionally tagged RO or RW.
#[derive(Debug, Clone, Deserialize)]
pub struct BranchEntry {
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub kind: Option<BranchKind>,
}

/// The mount configuration record (spec.md §6).
#[derive(Debug, Clone, Deserialize)]
pub struct MountConfig {
    pub branch_spec: (BranchEntry, BranchEntry),
}

/// The resolved, validated branch roots a mount actually uses.
#[derive(Debug, Clone)]
pub struct ResolvedBranches {
    pub ro: PathBuf,
    pub rw: PathBuf,
}

impl MountConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|_| Error::InvalidArgument)
    }

    /// Resolves `branch_spec` into an (RO, RW) pair (spec.md §6):
    /// - both tagged: tags must be distinct.
    /// - one tagged: the other defaults to the remaining kind.
    /// - neither tagged: the first entry is RO, the second is RW.
    ///
    /// Relative branch paths are rejected; trailing slashes are stripped
    /// (both enforced by [`normalize_branch_root`]).
    pub fn resolve(&self) -> Result<ResolvedBranches> {
        let (a, b) = &self.branch_spec;
        let (ro, rw) = match (a.kind, b.kind) {
            (Some(BranchKind::Ro), Some(BranchKind::Rw)) => (&a.path, &b.path),
            (Some(BranchKind::Rw), Some(BranchKind::Ro)) => (&b.path, &a.path),
            (Some(BranchKind::Ro), Some(BranchKind::Ro)) | (Some(BranchKind::Rw), Some(BranchKind::Rw)) => {
                return Err(Error::InvalidArgument);
            }
            (Some(BranchKind::Ro), None) => (&a.path, &b.path),
            (Some(BranchKind::Rw), None) => (&b.path, &a.path),
            (None, Some(BranchKind::Ro)) => (&b.path, &a.path),
            (None, Some(BranchKind::Rw)) => (&a.path, &b.path),
            (None, None) => (&a.path, &b.path),
        };

        Ok(ResolvedBranches {
            ro: normalize_branch_root(ro)?,
            rw: normalize_branch_root(rw)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_pair_defaults_first_to_ro() {
        let cfg = MountConfig::from_toml_str(
            r#"
            [[branch_spec]]
            path = "/ro"
            [[branch_spec]]
            path = "/rw"
            "#,
        )
        .unwrap();
        let resolved = cfg.resolve().unwrap();
        assert_eq!(resolved.ro, PathBuf::from("/ro"));
        assert_eq!(resolved.rw, PathBuf::from("/rw"));
    }

    #[test]
    fn single_tag_infers_the_other() {
        let cfg = MountConfig::from_toml_str(
            r#"
            [[branch_spec]]
            path = "/a"
            type = "rw"
            [[branch_spec]]
            path = "/b"
            "#,
        )
        .unwrap();
        let resolved = cfg.resolve().unwrap();
        assert_eq!(resolved.rw, PathBuf::from("/a"));
        assert_eq!(resolved.ro, PathBuf::from("/b"));
    }

    #[test]
    fn duplicate_tags_are_rejected() {
        let cfg = MountConfig::from_toml_str(
            r#"
            [[branch_spec]]
            path = "/a"
            type = "ro"
            [[branch_spec]]
            path = "/b"
            type = "ro"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.resolve().unwrap_err(), Error::InvalidArgument);
    }

    #[test]
    fn relative_branch_paths_are_rejected() {
        let cfg = MountConfig::from_toml_str(
            r#"
            [[branch_spec]]
            path = "ro"
            [[branch_spec]]
            path = "/rw"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.resolve().unwrap_err(), Error::InvalidArgument);
    }
}
