//! The synthetic VFS operation surface (spec.md §4.9, §6): the public
//! `UnionFs` type orchestrating the resolver, whiteout, sidecar, copy-up,
//! and directory-union components into the operations an external
//! kernel/FUSE adaptor dispatches into.

use std::path::{Path, PathBuf};

use crate::attr::{Attr, SetAttr, SetTime, Time};
use crate::branch::{BranchIo, NodeKind, TokioBranch};
use crate::error::{Error, Result};
use crate::inode::inode_number;
use crate::materialize::find_path;
use crate::mount::{Credentials, MountState};
use crate::path;
use crate::permission::{self, AccessMask};
use crate::posix;
use crate::readdir::DirHandle;
use crate::resolver::{self, Outcome, ResolveFlags};
use crate::sidecar;
use crate::whiteout;

/// Union's own `f_type` magic number (spec.md §6).
pub const STATFS_MAGIC: i64 = 0x9F510;

/// Flags accepted by [`UnionFs::open`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    pub write: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleBranch {
    Ro,
    Rw,
}

/// An open file handle (spec.md §4.8 "file handles hold a reference to the
/// underlying branch handle").
pub struct FileHandle {
    rel: PathBuf,
    branch: HandleBranch,
    pos: u64,
}

impl FileHandle {
    pub fn position(&self) -> u64 {
        self.pos
    }
}

/// Host `statfs` fields reported for the union (spec.md §6).
#[derive(Debug, Clone, Copy)]
pub struct StatFs {
    pub block_size: i64,
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
    pub name_max: i64,
    pub f_type: i64,
    pub fsid: [u32; 2],
}

/// The union filesystem core, mounted over one RO and one RW branch.
pub struct UnionFs {
    state: MountState,
}

impl UnionFs {
    pub fn new(ro_root: PathBuf, rw_root: PathBuf) -> Result<Self> {
        let ro_root = path::normalize_branch_root(&ro_root)?;
        let rw_root = path::normalize_branch_root(&rw_root)?;
        Ok(UnionFs {
            state: MountState::new(TokioBranch::new(ro_root), TokioBranch::new(rw_root)),
        })
    }

    pub fn state(&self) -> &MountState {
        &self.state
    }

    /// `lookup(P)` (spec.md §4.8): resolves `P` and returns its effective
    /// attributes, binding its inode number into the cache.
    pub async fn lookup(&self, rel: &Path, creds: Credentials) -> Result<Attr> {
        self.effective_attr(rel, creds).await
    }

    pub async fn getattr(&self, rel: &Path, creds: Credentials) -> Result<Attr> {
        self.effective_attr(rel, creds).await
    }

    /// `permission(P, mask)` (spec.md §4.6 `can_access`, applied at the VFS
    /// surface to the path's effective attributes).
    pub async fn permission(&self, rel: &Path, creds: Credentials, mask: AccessMask) -> Result<()> {
        let attr = self.effective_attr(rel, creds).await?;
        if permission::can_access(&attr, &creds, mask) {
            Ok(())
        } else {
            Err(Error::Access)
        }
    }

    /// `create(P, mode)` (spec.md §4.9).
    pub async fn create(&self, rel: &Path, mode: u32, creds: Credentials) -> Result<Attr> {
        let name = path::base_name(rel).ok_or(Error::InvalidArgument)?;
        path::validate_name(name)?;
        if self.exists_in_union(rel).await? {
            return Err(Error::Exist);
        }
        let parent = path::parent_of(rel).unwrap_or_default();
        self.require_create(&parent, &creds).await?;
        find_path(&self.state.ro, &self.state.rw, &parent).await?;
        self.state.rw.create_file(rel, mode & 0o7777, true).await?;
        whiteout::unlink_whiteout(&self.state.rw, rel).await?;
        self.effective_attr(rel, creds).await
    }

    /// `mkdir(P, mode)` (spec.md §4.9): also suppresses a pre-existing RO
    /// directory at `P` by whiting out its children.
    pub async fn mkdir(&self, rel: &Path, mode: u32, creds: Credentials) -> Result<Attr> {
        let name = path::base_name(rel).ok_or(Error::InvalidArgument)?;
        path::validate_name(name)?;
        if self.exists_in_union(rel).await? {
            return Err(Error::Exist);
        }
        let parent = path::parent_of(rel).unwrap_or_default();
        self.require_create(&parent, &creds).await?;
        find_path(&self.state.ro, &self.state.rw, &parent).await?;
        self.state.rw.mkdir(rel, mode & 0o7777).await?;
        whiteout::unlink_whiteout(&self.state.rw, rel).await?;
        whiteout::hide_directory_contents(
            &self.state.ro,
            &self.state.rw,
            rel,
            &self.state.escalation,
            creds,
        )
        .await?;
        self.effective_attr(rel, creds).await
    }

    /// `mknod(P, mode, kind)` / `mkfifo` (spec.md §4.9).
    pub async fn mknod(
        &self,
        rel: &Path,
        mode: u32,
        kind: NodeKind,
        creds: Credentials,
    ) -> Result<Attr> {
        let name = path::base_name(rel).ok_or(Error::InvalidArgument)?;
        path::validate_name(name)?;
        if self.exists_in_union(rel).await? {
            return Err(Error::Exist);
        }
        let parent = path::parent_of(rel).unwrap_or_default();
        self.require_create(&parent, &creds).await?;
        find_path(&self.state.ro, &self.state.rw, &parent).await?;
        self.state.rw.mknod(rel, mode & 0o7777, kind).await?;
        whiteout::unlink_whiteout(&self.state.rw, rel).await?;
        self.effective_attr(rel, creds).await
    }

    /// `symlink(P, target)` (spec.md §4.9).
    pub async fn symlink(&self, rel: &Path, target: &Path, creds: Credentials) -> Result<Attr> {
        let name = path::base_name(rel).ok_or(Error::InvalidArgument)?;
        path::validate_name(name)?;
        if self.exists_in_union(rel).await? {
            return Err(Error::Exist);
        }
        let parent = path::parent_of(rel).unwrap_or_default();
        self.require_create(&parent, &creds).await?;
        find_path(&self.state.ro, &self.state.rw, &parent).await?;
        self.state.rw.symlink(rel, target).await?;
        whiteout::unlink_whiteout(&self.state.rw, rel).await?;
        self.effective_attr(rel, creds).await
    }

    /// `link(src, dst)` (spec.md §4.9): hard-links when `src` is RW-resident,
    /// falls back to a symlink at `dst` pointing at the RO branch path of
    /// `src` otherwise.
    pub async fn link(&self, src: &Path, dst: &Path, creds: Credentials) -> Result<Attr> {
        let name = path::base_name(dst).ok_or(Error::InvalidArgument)?;
        path::validate_name(name)?;
        if self.exists_in_union(dst).await? {
            return Err(Error::Exist);
        }
        let parent = path::parent_of(dst).unwrap_or_default();
        self.require_create(&parent, &creds).await?;
        find_path(&self.state.ro, &self.state.rw, &parent).await?;

        let src_outcome = resolver::resolve(&self.state, src, ResolveFlags::lookup(), creds).await?;
        match src_outcome {
            Outcome::FoundInRw | Outcome::CopiedUp => {
                self.state.rw.hard_link(src, dst).await?;
            }
            Outcome::FoundInRo => {
                let target = self.state.ro.resolve(src);
                self.state.rw.symlink(dst, &target).await?;
            }
        }
        whiteout::unlink_whiteout(&self.state.rw, dst).await?;
        self.effective_attr(dst, creds).await
    }

    /// `unlink(P)` (spec.md §4.9): unlinks the RW copy (if any) and, when RO
    /// also held `P`, whites it out; a sidecar is removed first and restored
    /// if whiteout creation fails.
    pub async fn unlink(&self, rel: &Path, creds: Credentials) -> Result<()> {
        let parent = path::parent_of(rel).unwrap_or_default();
        if !permission::can_remove(&self.state.ro, &self.state.rw, &parent, &creds).await? {
            return Err(Error::Access);
        }

        let in_rw = self.state.rw.exists(rel).await;
        let in_ro = self.state.ro.exists(rel).await && !whiteout::find_whiteout(&self.state.rw, rel).await;
        if !in_rw && !in_ro {
            return Err(Error::NoEntry);
        }

        let saved_sidecar = sidecar::remove_sidecar(&self.state.rw, rel).await?;

        if in_rw {
            self.state.rw.unlink(rel).await?;
        }
        if in_ro {
            if let Err(e) = whiteout::create_whiteout(
                &self.state.ro,
                &self.state.rw,
                rel,
                &self.state.escalation,
                creds,
            )
            .await
            {
                if let Some(attrs) = saved_sidecar {
                    let _ = sidecar::create_sidecar(&self.state.rw, rel, &attrs).await;
                }
                return Err(e);
            }
        }
        self.state.forget(rel);
        Ok(())
    }

    /// `rmdir(P)` (spec.md §4.9): directory must be empty across the union
    /// (spec.md §4.2); RW side is removed after a whiteout is staged for any
    /// RO counterpart, rolled back if the RW removal fails.
    ///
    /// A directory never materialised in RW is emptied by the whiteout
    /// alone (spec.md §4.2's "whiteout created directly without RW content"
    /// transition) without walking its RO children one by one — that per-
    /// child accounting only applies once RW actually holds an entry at
    /// `P`, since only then can RW contain real, non-whiteout content.
    pub async fn rmdir(&self, rel: &Path, creds: Credentials) -> Result<()> {
        let parent = path::parent_of(rel).unwrap_or_default();
        if !permission::can_remove(&self.state.ro, &self.state.rw, &parent, &creds).await? {
            return Err(Error::Access);
        }

        let in_rw = self.state.rw.exists(rel).await;
        let in_ro = self.state.ro.exists(rel).await && !whiteout::find_whiteout(&self.state.rw, rel).await;
        if !in_rw && !in_ro {
            return Err(Error::NoEntry);
        }
        if in_rw && !whiteout::is_empty_dir(&self.state.ro, &self.state.rw, rel, true).await? {
            return Err(Error::NotEmpty);
        }

        if in_ro {
            whiteout::create_whiteout(&self.state.ro, &self.state.rw, rel, &self.state.escalation, creds)
                .await?;
        }
        if in_rw {
            if let Err(e) = self.state.rw.rmdir(rel).await {
                if in_ro {
                    let _ = whiteout::unlink_whiteout(&self.state.rw, rel).await;
                }
                return Err(e);
            }
        }
        self.state.forget(rel);
        Ok(())
    }

    /// `setattr(P, delta)` (spec.md §4.9): applied directly on RW, routed
    /// through the sidecar subsystem on RO.
    pub async fn setattr(&self, rel: &Path, delta: SetAttr, creds: Credentials) -> Result<Attr> {
        let outcome = resolver::resolve(&self.state, rel, ResolveFlags::lookup(), creds).await?;
        match outcome {
            Outcome::FoundInRw | Outcome::CopiedUp => {
                self.apply_delta_to_rw(rel, &delta).await?;
            }
            Outcome::FoundInRo => {
                sidecar::set_metadata_ro(&self.state.ro, &self.state.rw, rel, &delta).await?;
            }
        }
        self.effective_attr(rel, creds).await
    }

    async fn apply_delta_to_rw(&self, rel: &Path, delta: &SetAttr) -> Result<()> {
        if delta.is_empty() {
            return Ok(());
        }
        if let Some(mode) = delta.mode {
            self.state.rw.set_mode(rel, mode & 0o7777).await?;
        }
        let full = self.state.rw.resolve(rel);
        if delta.uid.is_some() || delta.gid.is_some() {
            use std::os::unix::fs::MetadataExt;
            let current = self.state.rw.stat(rel).await?;
            let uid = delta.uid.unwrap_or_else(|| current.uid());
            let gid = delta.gid.unwrap_or_else(|| current.gid());
            posix::chown(&full, uid, gid).await?;
        }
        if !matches!(delta.atime, SetTime::DontChange) || !matches!(delta.mtime, SetTime::DontChange) {
            let current = self.state.rw.stat(rel).await?;
            let cur_attr = Attr::from_metadata(&current, inode_number(rel));
            let atime = resolve_time(delta.atime, cur_attr.atime);
            let mtime = resolve_time(delta.mtime, cur_attr.mtime);
            posix::set_times(&full, atime, mtime).await?;
        }
        Ok(())
    }

    /// `open(P, flags)` (spec.md §4.9): write flags force `CREATE_COPYUP`.
    pub async fn open(&self, rel: &Path, flags: OpenFlags, creds: Credentials) -> Result<FileHandle> {
        let resolve_flags = ResolveFlags { create_copyup: flags.write, ..Default::default() };
        let outcome = resolver::resolve(&self.state, rel, resolve_flags, creds).await?;

        if flags.write {
            let parent = path::parent_of(rel).unwrap_or_default();
            if !permission::can_create(&self.state.ro, &self.state.rw, &parent, &creds).await? {
                return Err(Error::Access);
            }
        }

        self.state.remember(rel);
        let branch = match outcome {
            Outcome::FoundInRw | Outcome::CopiedUp => HandleBranch::Rw,
            Outcome::FoundInRo => HandleBranch::Ro,
        };
        Ok(FileHandle { rel: rel.to_path_buf(), branch, pos: 0 })
    }

    pub async fn read(&self, handle: &mut FileHandle, count: usize) -> Result<Vec<u8>> {
        let data = match handle.branch {
            HandleBranch::Ro => self.state.ro.read_at(&handle.rel, handle.pos, count).await?,
            HandleBranch::Rw => self.state.rw.read_at(&handle.rel, handle.pos, count).await?,
        };
        handle.pos += data.len() as u64;
        Ok(data)
    }

    pub async fn write(&self, handle: &mut FileHandle, data: &[u8]) -> Result<usize> {
        if handle.branch != HandleBranch::Rw {
            return Err(Error::Access);
        }
        self.state.rw.write_at(&handle.rel, handle.pos, data).await?;
        handle.pos += data.len() as u64;
        Ok(data.len())
    }

    /// `llseek(fh, pos)`: mirrors `f_pos` back onto the synthetic handle
    /// (spec.md §4.8).
    pub fn llseek(&self, handle: &mut FileHandle, pos: u64) -> u64 {
        handle.pos = pos;
        pos
    }

    /// `release(fh)`: dropping the handle is sufficient; no branch-level
    /// state outlives it.
    pub fn release(&self, _handle: FileHandle) {}

    pub async fn readdir(&self, rel: &Path) -> Result<DirHandle> {
        DirHandle::open(&self.state.ro, &self.state.rw, rel).await
    }

    /// `statfs()` (spec.md §6): RO branch's statfs with the union's own
    /// magic number and an `f_fsid` derived from the inode-hash seed.
    pub async fn statfs(&self) -> Result<StatFs> {
        let root = self.state.ro.root().to_path_buf();
        let raw = tokio::task::spawn_blocking(move || unsafe {
            let c = std::ffi::CString::new(root.as_os_str().as_encoded_bytes())
                .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
            let mut buf: libc::statfs = std::mem::zeroed();
            if libc::statfs(c.as_ptr(), &mut buf) != 0 {
                Err(std::io::Error::last_os_error())
            } else {
                Ok(buf)
            }
        })
        .await
        .map_err(|_| Error::Io(std::io::ErrorKind::Other))??;

        let seed = crate::inode::INODE_HASH_SEED;
        Ok(StatFs {
            block_size: raw.f_bsize as i64,
            blocks: raw.f_blocks as u64,
            blocks_free: raw.f_bfree as u64,
            blocks_available: raw.f_bavail as u64,
            files: raw.f_files as u64,
            files_free: raw.f_ffree as u64,
            name_max: raw.f_namelen as i64,
            f_type: STATFS_MAGIC,
            fsid: [(seed >> 32) as u32, seed as u32],
        })
    }

    async fn effective_attr(&self, rel: &Path, creds: Credentials) -> Result<Attr> {
        let outcome = resolver::resolve(&self.state, rel, ResolveFlags::lookup(), creds).await?;
        self.state.remember(rel);
        match outcome {
            Outcome::FoundInRw | Outcome::CopiedUp => {
                let meta = self.state.rw.stat(rel).await?;
                Ok(Attr::from_metadata(&meta, inode_number(rel)))
            }
            Outcome::FoundInRo => sidecar::get_effective_attrs(&self.state.ro, &self.state.rw, rel).await,
        }
    }

    async fn exists_in_union(&self, rel: &Path) -> Result<bool> {
        if self.state.rw.exists(rel).await {
            return Ok(true);
        }
        if self.state.ro.exists(rel).await && !whiteout::find_whiteout(&self.state.rw, rel).await {
            return Ok(true);
        }
        Ok(false)
    }

    async fn require_create(&self, parent: &Path, creds: &Credentials) -> Result<()> {
        if permission::can_create(&self.state.ro, &self.state.rw, parent, creds).await? {
            Ok(())
        } else {
            Err(Error::Access)
        }
    }
}

fn resolve_time(setting: SetTime, current: Time) -> Time {
    match setting {
        SetTime::DontChange => current,
        SetTime::ServerCurrent => {
            use std::time::{SystemTime, UNIX_EPOCH};
            let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
            Time { seconds: d.as_secs() as i64, nanos: d.subsec_nanos() }
        }
        SetTime::ClientProvided(t) => t,
    }
}
