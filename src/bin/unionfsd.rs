//! Demo mount front-end: loads a [`MountConfig`] from a TOML file, resolves
//! its branch spec, and exercises the union core against them.
//!
//! This binary is not an adaptor into any real kernel/FUSE layer (that's
//! explicitly out of scope for the core); it exists to give the crate a
//! runnable entry point for manual testing of a mount.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use unionfs_core::config::MountConfig;
use unionfs_core::mount::Credentials;
use unionfs_core::vfs::UnionFs;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the mount configuration file, in TOML format.
    #[arg(long, default_value = "unionfs.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.config)
        .with_context(|| format!("failed to read {}", args.config.display()))?;
    let config = MountConfig::from_toml_str(&raw).context("failed to parse mount configuration")?;
    let branches = config.resolve().context("invalid branch_spec")?;

    info!(ro = %branches.ro.display(), rw = %branches.rw.display(), "mounting union");

    let fs = UnionFs::new(branches.ro, branches.rw).context("failed to mount union")?;
    let root_attr = fs
        .lookup(std::path::Path::new(""), Credentials::ROOT)
        .await
        .context("failed to resolve union root")?;
    info!(inode = root_attr.fileid, "union root resolved");

    Ok(())
}
