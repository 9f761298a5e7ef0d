//! Effective-attribute data model (spec.md §3, §4.4).
//!
//! Types here mirror the shape of this lineage's `vfs::file::Attr` /
//! `vfs::SetAttr`, trimmed to what the union core actually merges: the
//! permission-mask bits, ownership, and timestamps that a metadata sidecar
//! can override, plus the type/size/nlink fields that always come from the
//! resolved branch file.

use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};

/// Entry kind (spec.md §3 "Entry kinds").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    Fifo,
    CharDevice,
    BlockDevice,
    Socket,
}

/// Mask selecting the bits a sidecar is allowed to override: setuid, setgid,
/// sticky, and rwx for user/group/other (spec.md §4.4).
pub const PERMISSION_MASK: u32 = 0o7777;

/// POSIX time, seconds + nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
    pub seconds: i64,
    pub nanos: u32,
}

/// Major/minor device pair, for char/block nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Device {
    pub major: u32,
    pub minor: u32,
}

/// Effective attributes observed through the union (spec.md §3).
#[derive(Debug, Clone, Copy)]
pub struct Attr {
    pub file_type: FileType,
    /// Full mode, including the type bits the `libc::S_IF*` family uses.
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub blocks: u64,
    pub device: Option<Device>,
    pub fileid: u64,
    pub atime: Time,
    pub mtime: Time,
    pub ctime: Time,
}

impl Attr {
    /// Builds an `Attr` from host `std::fs::Metadata`, stamping in the
    /// union's own inode number (the metadata's own `st_ino` is branch-local
    /// and must never leak through the synthetic view).
    pub fn from_metadata(meta: &std::fs::Metadata, fileid: u64) -> Self {
        let ft = meta.file_type();
        let file_type = if ft.is_dir() {
            FileType::Directory
        } else if ft.is_symlink() {
            FileType::Symlink
        } else if ft.is_char_device() {
            FileType::CharDevice
        } else if ft.is_block_device() {
            FileType::BlockDevice
        } else if ft.is_fifo() {
            FileType::Fifo
        } else if ft.is_socket() {
            FileType::Socket
        } else {
            FileType::Regular
        };

        let device = if matches!(file_type, FileType::CharDevice | FileType::BlockDevice) {
            Some(device_from_rdev(meta.rdev()))
        } else {
            None
        };

        Attr {
            file_type,
            mode: meta.mode(),
            nlink: meta.nlink() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.size(),
            blocks: meta.blocks(),
            device,
            fileid,
            atime: Time { seconds: meta.atime(), nanos: meta.atime_nsec() as u32 },
            mtime: Time { seconds: meta.mtime(), nanos: meta.mtime_nsec() as u32 },
            ctime: Time { seconds: meta.ctime(), nanos: meta.ctime_nsec() as u32 },
        }
    }

    /// Overlay a sidecar's override fields onto `self` (spec.md §4.4): the
    /// permission bits, uid, gid, and all three timestamps come from the
    /// sidecar; type/size/nlink/blocks are untouched.
    pub fn overlay_sidecar(&mut self, sidecar: &SidecarAttr) {
        self.mode = (self.mode & !PERMISSION_MASK) | (sidecar.mode & PERMISSION_MASK);
        self.uid = sidecar.uid;
        self.gid = sidecar.gid;
        self.atime = sidecar.atime;
        self.mtime = sidecar.mtime;
        self.ctime = sidecar.ctime;
    }
}

/// Decodes glibc's `dev_t` bit layout into (major, minor), the inverse of
/// the `makedev` encoding `branch::mknod` uses to build one.
fn device_from_rdev(rdev: u64) -> Device {
    let major = ((rdev >> 8) & 0xfff) | ((rdev >> 32) & !0xfff);
    let minor = (rdev & 0xff) | ((rdev >> 12) & !0xff);
    Device { major: major as u32, minor: minor as u32 }
}

/// The subset of `Attr` a metadata sidecar carries as its own attributes
/// (spec.md §3 "M" invariants: "user/group/times/mode overrides").
#[derive(Debug, Clone, Copy)]
pub struct SidecarAttr {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: Time,
    pub mtime: Time,
    pub ctime: Time,
}

impl SidecarAttr {
    /// Captures the sidecar-relevant fields out of a fully resolved `Attr`,
    /// used when materialising a sidecar for the first time (spec.md §4.4:
    /// "stat the RO file, create the sidecar with the merged attributes").
    pub fn from_attr(attr: &Attr) -> Self {
        SidecarAttr {
            mode: attr.mode & PERMISSION_MASK,
            uid: attr.uid,
            gid: attr.gid,
            atime: attr.atime,
            mtime: attr.mtime,
            ctime: attr.ctime,
        }
    }

    /// Builds a sidecar from `std::fs::Metadata` of the (zero-length)
    /// sidecar marker file itself — its own mode/uid/gid/times *are* the
    /// override (spec.md §3: "a zero-length regular file ... carries the
    /// attributes").
    pub fn from_marker_metadata(meta: &std::fs::Metadata) -> Self {
        SidecarAttr {
            mode: meta.mode() & PERMISSION_MASK,
            uid: meta.uid(),
            gid: meta.gid(),
            atime: Time { seconds: meta.atime(), nanos: meta.atime_nsec() as u32 },
            mtime: Time { seconds: meta.mtime(), nanos: meta.mtime_nsec() as u32 },
            ctime: Time { seconds: meta.ctime(), nanos: meta.ctime_nsec() as u32 },
        }
    }

    pub fn apply_delta(&mut self, delta: &SetAttr) {
        if let Some(mode) = delta.mode {
            self.mode = mode & PERMISSION_MASK;
        }
        if let Some(uid) = delta.uid {
            self.uid = uid;
        }
        if let Some(gid) = delta.gid {
            self.gid = gid;
        }
        if let SetTime::ClientProvided(t) = delta.atime {
            self.atime = t;
        }
        if let SetTime::ServerCurrent = delta.atime {
            self.atime = now();
        }
        if let SetTime::ClientProvided(t) = delta.mtime {
            self.mtime = t;
        }
        if let SetTime::ServerCurrent = delta.mtime {
            self.mtime = now();
        }
    }

    pub fn as_permissions(&self) -> std::fs::Permissions {
        std::fs::Permissions::from_mode(self.mode)
    }
}

/// Strategy for updating a timestamp in a [`SetAttr`] delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetTime {
    DontChange,
    ServerCurrent,
    ClientProvided(Time),
}

/// Attribute-modification delta. Recognised fields per spec.md §4.4:
/// `{mode, uid, gid, atime, mtime}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetAttr {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub atime: SetTime,
    pub mtime: SetTime,
}

impl Default for SetTime {
    fn default() -> Self {
        SetTime::DontChange
    }
}

impl SetAttr {
    pub fn is_empty(&self) -> bool {
        self.mode.is_none()
            && self.uid.is_none()
            && self.gid.is_none()
            && matches!(self.atime, SetTime::DontChange)
            && matches!(self.mtime, SetTime::DontChange)
    }
}

fn now() -> Time {
    use std::time::{SystemTime, UNIX_EPOCH};
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    Time { seconds: d.as_secs() as i64, nanos: d.subsec_nanos() }
}
