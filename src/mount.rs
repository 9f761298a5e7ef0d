//! Mount state & concurrency (spec.md §2.9, §5).
//!
//! Holds the per-mount shared state: branch roots, the inode cache binding
//! the synthetic view to stable inode numbers, and the reentrant
//! privilege-escalation primitive (`push_root`/`pop_root`).
//!
//! Scratch path buffers are deliberately **not** modeled here: spec.md §9
//! notes "there is no correctness requirement to keep buffers on the mount
//! state," and every operation in this crate allocates its working
//! `PathBuf`s per call instead (see `SPEC_FULL.md` §1). Likewise the
//! "lookup context list" of spec.md §4.8 is retired: `UnionFs::lookup`
//! takes `P` directly rather than recovering it from a populate callback
//! (`SPEC_FULL.md` §5), so there is nothing transient to track here.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use moka::sync::Cache;

use crate::branch::TokioBranch;

/// Caller identity used by the permission model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
}

impl Credentials {
    pub const ROOT: Credentials = Credentials { uid: 0, gid: 0 };
}

#[derive(Debug)]
struct RootState {
    depth: u32,
    saved: Option<Credentials>,
}

/// The reentrant privilege-escalation primitive (spec.md §5, §9):
/// `push_root`/`pop_root` save the caller's current effective identity onto
/// the mount state and replace it with root; nested entries merely
/// increment a depth counter, and only the final exit restores the saved
/// identity.
///
/// This crate has no mechanism to actually change the OS effective
/// uid/gid of an async task (that would require unsafe, process-wide
/// `setfsuid`/`setfsgid` calls unsound under a multi-threaded async
/// runtime), so `Escalation` tracks an in-process `Credentials` cell
/// instead — callers that need the *effect* of root (bypassing
/// `can_access`) ask `Escalation::current()` rather than the OS.
#[derive(Debug, Clone)]
pub struct Escalation(Arc<Mutex<RootState>>);

impl Default for Escalation {
    fn default() -> Self {
        Escalation(Arc::new(Mutex::new(RootState { depth: 0, saved: None })))
    }
}

impl Escalation {
    /// Enters the critical section, escalating to root. Returns a guard
    /// that restores the caller's identity when the *outermost* entry on
    /// this escalation cell is dropped.
    pub fn push_root(&self, caller: Credentials) -> RootGuard {
        let mut state = self.0.lock().expect("root escalation lock poisoned");
        if state.depth == 0 {
            state.saved = Some(caller);
        }
        state.depth += 1;
        RootGuard(self.clone())
    }

    /// The identity in effect right now: root while escalated, `caller`
    /// otherwise.
    pub fn current(&self, caller: Credentials) -> Credentials {
        let state = self.0.lock().expect("root escalation lock poisoned");
        if state.depth > 0 {
            Credentials::ROOT
        } else {
            caller
        }
    }
}

/// RAII guard returned by [`Escalation::push_root`]; dropping it is
/// `pop_root`.
pub struct RootGuard(Escalation);

impl Drop for RootGuard {
    fn drop(&mut self) {
        let mut state = self.0 .0.lock().expect("root escalation lock poisoned");
        debug_assert!(state.depth > 0, "pop_root without matching push_root");
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.saved = None;
        }
    }
}

/// Per-mount shared state (spec.md §3 "Mount state (S)").
pub struct MountState {
    pub ro: TokioBranch,
    pub rw: TokioBranch,
    pub escalation: Escalation,
    /// Inode/dentry cache (spec.md §2 component 9, §4.8): maps `H(P)` back
    /// to the relative path it was minted for, so `getattr`/`readdir`
    /// populate callbacks never need to re-walk the tree to recover `P`.
    inode_cache: Cache<u64, PathBuf>,
}

impl MountState {
    pub fn new(ro: TokioBranch, rw: TokioBranch) -> Self {
        MountState {
            ro,
            rw,
            escalation: Escalation::default(),
            inode_cache: Cache::builder().max_capacity(65_536).build(),
        }
    }

    /// Registers (or refreshes) the inode-number -> path binding for `rel`,
    /// mirroring `H(P) = MurmurHash2-64A(P)` (spec.md §4.8).
    pub fn remember(&self, rel: &std::path::Path) -> u64 {
        let id = crate::inode::inode_number(rel);
        self.inode_cache.insert(id, rel.to_path_buf());
        id
    }

    /// Recovers the path a previously minted inode number was bound to.
    pub fn path_for_inode(&self, id: u64) -> Option<PathBuf> {
        self.inode_cache.get(&id)
    }

    /// Drops a stale binding, e.g. after `unlink`/`rmdir`/`rename`.
    pub fn forget(&self, rel: &std::path::Path) {
        let id = crate::inode::inode_number(rel);
        self.inode_cache.invalidate(&id);
    }
}
