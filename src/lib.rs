//! Core union (overlay) filesystem: resolves a merged view of a read-only
//! lower branch and a read-write upper branch, redirecting mutations to the
//! upper branch via copy-up and simulating deletion with whiteouts.
//!
//! This crate implements the resolution/mutation protocol only; dispatching
//! real kernel or FUSE callbacks into [`vfs::UnionFs`] is left to an external
//! adaptor.

pub mod attr;
pub mod branch;
pub mod config;
pub mod copyup;
pub mod error;
pub mod inode;
pub mod materialize;
pub mod mount;
pub mod path;
pub mod permission;
pub mod readdir;
pub mod resolver;
pub mod sidecar;
pub mod vfs;
pub mod whiteout;

pub use error::{Error, Result};
pub use mount::Credentials;
pub use vfs::UnionFs;
