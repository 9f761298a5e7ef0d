use std::path::Path;

use tempfile::TempDir;
use unionfs_core::mount::Credentials;
use unionfs_core::vfs::UnionFs;

/// Owns a throwaway RO/RW branch pair and the `UnionFs` mounted over them,
/// mirroring this lineage's shadow-fs test fixture.
pub struct Fixture {
    pub ro_dir: TempDir,
    pub rw_dir: TempDir,
    pub fs: UnionFs,
}

impl Fixture {
    pub fn new() -> Self {
        let ro_dir = TempDir::new().expect("create ro tempdir");
        let rw_dir = TempDir::new().expect("create rw tempdir");
        let fs = UnionFs::new(ro_dir.path().to_path_buf(), rw_dir.path().to_path_buf())
            .expect("mount union");
        Fixture { ro_dir, rw_dir, fs }
    }

    pub fn root(&self) -> Credentials {
        Credentials::ROOT
    }

    pub fn write_ro(&self, rel: &str, contents: &[u8]) {
        std::fs::write(self.ro_dir.path().join(rel), contents).expect("write ro fixture file");
    }

    pub fn write_rw(&self, rel: &str, contents: &[u8]) {
        std::fs::write(self.rw_dir.path().join(rel), contents).expect("write rw fixture file");
    }

    pub fn mkdir_ro(&self, rel: &str) {
        std::fs::create_dir_all(self.ro_dir.path().join(rel)).expect("mkdir ro fixture dir");
    }

    pub fn mkdir_rw(&self, rel: &str) {
        std::fs::create_dir_all(self.rw_dir.path().join(rel)).expect("mkdir rw fixture dir");
    }

    pub fn ro_path(&self, rel: &str) -> std::path::PathBuf {
        self.ro_dir.path().join(rel)
    }

    pub fn rw_path(&self, rel: &str) -> std::path::PathBuf {
        self.rw_dir.path().join(rel)
    }

    pub fn rel(rel: &str) -> &Path {
        Path::new(rel)
    }
}
