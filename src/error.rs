//! POSIX-shaped error taxonomy for the union filesystem core.
//!
//! Mirrors the error vocabulary of this lineage's `vfs::Error`, extended
//! with exactly the codes the union resolution protocol needs.

use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the union filesystem core.
///
/// Variants map onto POSIX `errno` values at the external VFS/FUSE boundary;
/// the core itself never inspects `errno` directly.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// `EACCES` — permission check failure, including traversal into an
    /// unwritable RO root.
    Access,
    /// `ENOENT` — not found, including whiteout-hidden RO entries.
    NoEntry,
    /// `EEXIST` — already present at the top of the union.
    Exist,
    /// `EINVAL` — no parent component, relative branch spec, or a reserved
    /// (`.wh.`/`.me.`) name used through the union surface.
    InvalidArgument,
    /// `ENAMETOOLONG` — a composed path exceeded the system maximum.
    NameTooLong,
    /// `ENOTEMPTY` — `rmdir` on a directory that is not empty in the union.
    NotEmpty,
    /// `EXDEV` — hard link across branches when the RO side resolves.
    CrossDevice,
    /// `ENOTDIR` — a non-directory was used where a directory was required.
    NotDir,
    /// `EISDIR` — a directory was used where a non-directory was required.
    IsDir,
    /// `ENOSPC` — propagated from a branch.
    NoSpace,
    /// `ENOMEM` — scratch/heap allocation failure.
    NoMemory,
    /// Any other error surfaced by the Branch I/O capability, propagated
    /// verbatim (spec: "the core does not translate them").
    Io(io::ErrorKind),
}

impl Error {
    /// Best-effort POSIX errno-style name, for logging and tests.
    pub fn code_name(&self) -> &'static str {
        match self {
            Error::Access => "EACCES",
            Error::NoEntry => "ENOENT",
            Error::Exist => "EEXIST",
            Error::InvalidArgument => "EINVAL",
            Error::NameTooLong => "ENAMETOOLONG",
            Error::NotEmpty => "ENOTEMPTY",
            Error::CrossDevice => "EXDEV",
            Error::NotDir => "ENOTDIR",
            Error::IsDir => "EISDIR",
            Error::NoSpace => "ENOSPC",
            Error::NoMemory => "ENOMEM",
            Error::Io(_) => "EIO",
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code_name())
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    /// Maps a host `io::Error` to the closest union-fs error code, the same
    /// role `map_io_error` plays in this lineage's shadow-fs example.
    fn from(err: io::Error) -> Self {
        use io::ErrorKind::*;
        match err.kind() {
            NotFound => Error::NoEntry,
            PermissionDenied => Error::Access,
            AlreadyExists => Error::Exist,
            InvalidInput | InvalidData => Error::InvalidArgument,
            NotADirectory => Error::NotDir,
            IsADirectory => Error::IsDir,
            StorageFull | OutOfMemory => Error::NoSpace,
            other => Error::Io(other),
        }
    }
}
