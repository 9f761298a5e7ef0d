//! The resolver (spec.md §4.1): the central `find` operation that, given a
//! relative union path and a flag set, locates the effective entry.

use std::path::Path;

use crate::copyup;
use crate::error::{Error, Result};
use crate::mount::{Credentials, MountState};
use crate::path;
use crate::permission;
use crate::whiteout;

/// Resolver flags (spec.md §4.1).
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveFlags {
    pub must_rw: bool,
    pub must_ro: bool,
    pub create_copyup: bool,
    pub ignore_whiteout: bool,
}

impl ResolveFlags {
    pub fn lookup() -> Self {
        ResolveFlags::default()
    }

    pub fn for_copyup() -> Self {
        ResolveFlags { create_copyup: true, ..Default::default() }
    }
}

/// Where a resolved path ended up living (spec.md §3 "Resolver outcome").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    FoundInRo,
    FoundInRw,
    CopiedUp,
}

/// `resolve(P, flags) -> outcome` (spec.md §4.1).
///
/// Ordering & tie-breaks: RW strictly masks RO at identical `P`. A whiteout
/// in RW beats an RO entry even when no RW content file exists for `P`.
/// The resolver never retries; it surfaces the error that most precisely
/// describes the outcome.
pub async fn resolve(
    state: &MountState,
    rel: &Path,
    flags: ResolveFlags,
    creds: Credentials,
) -> Result<Outcome> {
    path::check_length(rel)?;

    if !flags.must_ro {
        if state.rw.exists(rel).await {
            if !permission::can_traverse(&state.ro, &state.rw, rel, &creds).await? {
                return Err(Error::Access);
            }
            return Ok(Outcome::FoundInRw);
        }
        if flags.must_rw {
            return Err(Error::NoEntry);
        }
    }

    if flags.create_copyup {
        if !state.ro.exists(rel).await {
            return Err(Error::NoEntry);
        }
        if !flags.ignore_whiteout && whiteout::find_whiteout(&state.rw, rel).await {
            return Err(Error::NoEntry);
        }
        if !permission::can_traverse(&state.ro, &state.rw, rel, &creds).await? {
            return Err(Error::Access);
        }
        copyup::copy_up(state, rel).await?;
        return Ok(Outcome::CopiedUp);
    }

    if !state.ro.exists(rel).await {
        return Err(Error::NoEntry);
    }
    if !flags.ignore_whiteout && whiteout::find_whiteout(&state.rw, rel).await {
        return Err(Error::NoEntry);
    }
    if !permission::can_traverse(&state.ro, &state.rw, rel, &creds).await? {
        return Err(Error::Access);
    }
    Ok(Outcome::FoundInRo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::TokioBranch;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TempDir, MountState) {
        let ro_dir = TempDir::new().unwrap();
        let rw_dir = TempDir::new().unwrap();
        let state = MountState::new(
            TokioBranch::new(ro_dir.path().to_path_buf()),
            TokioBranch::new(rw_dir.path().to_path_buf()),
        );
        (ro_dir, rw_dir, state)
    }

    fn root_creds() -> Credentials {
        Credentials::ROOT
    }

    #[tokio::test]
    async fn rw_masks_ro() {
        let (_rod, _rwd, state) = setup();
        state.ro.create_file(Path::new("a"), 0o644, false).await.unwrap();
        state.rw.create_file(Path::new("a"), 0o600, false).await.unwrap();

        let outcome = resolve(&state, Path::new("a"), ResolveFlags::lookup(), root_creds())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::FoundInRw);
    }

    #[tokio::test]
    async fn whiteout_hides_ro_even_without_rw_content() {
        let (_rod, _rwd, state) = setup();
        state.ro.create_file(Path::new("a"), 0o644, false).await.unwrap();
        whiteout::create_whiteout(&state.ro, &state.rw, Path::new("a"), &state.escalation, root_creds())
            .await
            .unwrap();

        let err = resolve(&state, Path::new("a"), ResolveFlags::lookup(), root_creds())
            .await
            .unwrap_err();
        assert_eq!(err, Error::NoEntry);
    }

    #[tokio::test]
    async fn must_rw_fails_when_only_ro_has_entry() {
        let (_rod, _rwd, state) = setup();
        state.ro.create_file(Path::new("a"), 0o644, false).await.unwrap();
        let flags = ResolveFlags { must_rw: true, ..Default::default() };
        let err = resolve(&state, Path::new("a"), flags, root_creds()).await.unwrap_err();
        assert_eq!(err, Error::NoEntry);
    }

    #[tokio::test]
    async fn create_copyup_materialises_rw_and_returns_copied_up() {
        let (_rod, _rwd, state) = setup();
        state.ro.create_file(Path::new("a"), 0o644, false).await.unwrap();
        let outcome =
            resolve(&state, Path::new("a"), ResolveFlags::for_copyup(), root_creds())
                .await
                .unwrap();
        assert_eq!(outcome, Outcome::CopiedUp);
        assert!(state.rw.exists(Path::new("a")).await);
    }

    #[tokio::test]
    async fn missing_everywhere_is_no_entry() {
        let (_rod, _rwd, state) = setup();
        let err = resolve(&state, Path::new("missing"), ResolveFlags::lookup(), root_creds())
            .await
            .unwrap_err();
        assert_eq!(err, Error::NoEntry);
    }
}
