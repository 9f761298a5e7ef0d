//! The Branch I/O capability (spec.md §2, component 2): the minimal
//! interface the core requires from an underlying directory tree.
//!
//! Spec.md treats this as "consumed, not implemented" by the core — the
//! core addresses lower files exclusively through this capability. This
//! module still supplies one concrete implementation, `TokioBranch`, backed
//! directly by `tokio::fs` against a real host directory, in the same role
//! this lineage's `ShadowFS` plays for its single-backend `Vfs` trait: a
//! reference implementation good enough to run the whole test suite against
//! real directories, without hard-wiring the rest of the crate to any one
//! branch backend.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::attr::Device;
use crate::error::{Error, Result};
use crate::path::branch_path;

/// A POSIX entry kind a branch may be asked to create.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Fifo,
    CharDevice(Device),
    BlockDevice(Device),
    Socket,
}

/// The capability the union core requires from one branch's backing store.
///
/// All paths passed to these methods are relative union paths `P`; the
/// implementation is responsible for mapping `P` onto its own root.
#[async_trait]
pub trait BranchIo: Send + Sync {
    /// Branch root, without trailing slash (spec.md §3 "Branch root (B)").
    fn root(&self) -> &Path;

    /// `B ++ P`.
    fn resolve(&self, rel: &Path) -> PathBuf {
        branch_path(self.root(), rel)
    }

    /// `true` if an entry exists at `P` (symlinks are not followed).
    async fn exists(&self, rel: &Path) -> bool {
        fs::symlink_metadata(self.resolve(rel)).await.is_ok()
    }

    async fn stat(&self, rel: &Path) -> Result<std::fs::Metadata> {
        Ok(fs::symlink_metadata(self.resolve(rel)).await?)
    }

    async fn read_file(&self, rel: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(self.resolve(rel)).await?)
    }

    /// Streams `rel`'s full contents into `sink` in bounded chunks of
    /// `buffer_size` bytes (spec.md §4.3 copy-up streaming).
    async fn stream_to(
        &self,
        rel: &Path,
        sink: &mut (dyn tokio::io::AsyncWrite + Send + Unpin),
        buffer_size: usize,
    ) -> Result<()> {
        let mut src = fs::File::open(self.resolve(rel)).await?;
        let mut buf = vec![0u8; buffer_size];
        loop {
            let n = src.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n]).await?;
        }
        Ok(())
    }

    async fn create_file(&self, rel: &Path, mode: u32, exclusive: bool) -> Result<()> {
        let path = self.resolve(rel);
        let mut opts = fs::OpenOptions::new();
        opts.write(true).create(true);
        if exclusive {
            opts.create_new(true);
        }
        let _file = opts.open(&path).await?;
        fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).await?;
        Ok(())
    }

    async fn write_at(&self, rel: &Path, offset: u64, data: &[u8]) -> Result<()> {
        let path = self.resolve(rel);
        let mut file = fs::OpenOptions::new().write(true).open(&path).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_at(&self, rel: &Path, offset: u64, count: usize) -> Result<Vec<u8>> {
        let path = self.resolve(rel);
        let meta = fs::metadata(&path).await?;
        let size = meta.len();
        let to_read = if offset >= size { 0 } else { (count as u64).min(size - offset) as usize };
        let mut data = vec![0u8; to_read];
        if to_read > 0 {
            let mut file = fs::File::open(&path).await?;
            file.seek(std::io::SeekFrom::Start(offset)).await?;
            file.read_exact(&mut data).await?;
        }
        Ok(data)
    }

    async fn truncate(&self, rel: &Path, len: u64) -> Result<()> {
        let path = self.resolve(rel);
        let file = fs::OpenOptions::new().write(true).open(&path).await?;
        file.set_len(len).await?;
        Ok(())
    }

    async fn set_mode(&self, rel: &Path, mode: u32) -> Result<()> {
        fs::set_permissions(self.resolve(rel), std::fs::Permissions::from_mode(mode)).await?;
        Ok(())
    }

    async fn mkdir(&self, rel: &Path, mode: u32) -> Result<()> {
        let path = self.resolve(rel);
        fs::create_dir(&path).await?;
        fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).await?;
        Ok(())
    }

    async fn rmdir(&self, rel: &Path) -> Result<()> {
        Ok(fs::remove_dir(self.resolve(rel)).await?)
    }

    async fn unlink(&self, rel: &Path) -> Result<()> {
        Ok(fs::remove_file(self.resolve(rel)).await?)
    }

    async fn symlink(&self, rel: &Path, target: &Path) -> Result<()> {
        let path = self.resolve(rel);
        tokio::fs::symlink(target, &path).await?;
        Ok(())
    }

    async fn read_link(&self, rel: &Path) -> Result<PathBuf> {
        Ok(fs::read_link(self.resolve(rel)).await?)
    }

    async fn hard_link(&self, existing: &Path, new: &Path) -> Result<()> {
        Ok(fs::hard_link(self.resolve(existing), self.resolve(new)).await?)
    }

    /// Creates a FIFO or char/block/socket node. Char/block nodes carry a
    /// device number; FIFOs and sockets do not (spec.md §4.3 item 3).
    async fn mknod(&self, rel: &Path, mode: u32, kind: NodeKind) -> Result<()> {
        let path = self.resolve(rel);
        let c_path = std::ffi::CString::new(path.as_os_str().as_encoded_bytes())
            .map_err(|_| Error::InvalidArgument)?;
        let (type_bits, dev) = match kind {
            NodeKind::Fifo => (libc::S_IFIFO, 0u64),
            NodeKind::Socket => (libc::S_IFSOCK, 0u64),
            NodeKind::CharDevice(d) => (libc::S_IFCHR, makedev(d.major, d.minor)),
            NodeKind::BlockDevice(d) => (libc::S_IFBLK, makedev(d.major, d.minor)),
        };
        let full_mode = (mode & 0o7777) | (type_bits as u32);
        let ret = tokio::task::spawn_blocking(move || unsafe {
            libc::mknod(c_path.as_ptr(), full_mode, dev as libc::dev_t)
        })
        .await
        .map_err(|_| Error::Io(std::io::ErrorKind::Other))?;
        if ret != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(())
    }

    async fn read_dir_names(&self, rel: &Path) -> Result<Vec<std::ffi::OsString>> {
        let path = self.resolve(rel);
        let mut rd = fs::read_dir(&path).await?;
        let mut names = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            names.push(entry.file_name());
        }
        Ok(names)
    }
}

/// Glibc's `dev_t` encoding for (major, minor), reimplemented locally so
/// `mknod` does not depend on a libc symbol the crate may not export.
fn makedev(major: u32, minor: u32) -> u64 {
    let major = major as u64;
    let minor = minor as u64;
    (minor & 0xff) | ((major & 0xfff) << 8) | ((minor & !0xff) << 12) | ((major & !0xfff) << 32)
}

/// A branch backed directly by a real host directory tree via `tokio::fs`.
#[derive(Debug, Clone)]
pub struct TokioBranch {
    root: PathBuf,
}

impl TokioBranch {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl BranchIo for TokioBranch {
    fn root(&self) -> &Path {
        &self.root
    }
}
