//! Small POSIX metadata helpers shared by materialisation, copy-up, and the
//! sidecar subsystem: `chown`/`utimes` on a branch path.
//!
//! Ownership has no portable crate-level API in this lineage's dependency
//! set, so `chown` stays a raw `libc` call on a blocking thread. Timestamps
//! are set with `filetime`, which this lineage already lists as a
//! dependency in its extended manifest for exactly this concern, rather
//! than a second hand-rolled `libc::utimensat` call.

use std::path::Path;

use filetime::FileTime;

use crate::attr::Time;
use crate::error::Result;

fn to_cstring(path: &Path) -> std::ffi::CString {
    std::ffi::CString::new(path.as_os_str().as_encoded_bytes())
        .expect("branch paths never contain NUL bytes")
}

/// `chown(path, uid, gid)`.
pub async fn chown(path: &Path, uid: u32, gid: u32) -> Result<()> {
    let c = to_cstring(path);
    let ret = tokio::task::spawn_blocking(move || unsafe { libc::chown(c.as_ptr(), uid, gid) })
        .await
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::Other))?;
    if ret != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

/// `utimes(path, atime, mtime)`, not following symlinks.
pub async fn set_times(path: &Path, atime: Time, mtime: Time) -> Result<()> {
    let path = path.to_path_buf();
    let at = FileTime::from_unix_time(atime.seconds, atime.nanos);
    let mt = FileTime::from_unix_time(mtime.seconds, mtime.nanos);
    tokio::task::spawn_blocking(move || filetime::set_symlink_file_times(&path, at, mt))
        .await
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::Other))??;
    Ok(())
}
