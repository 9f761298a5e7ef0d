use std::os::unix::fs::MetadataExt;

use unionfs_core::Error;

use crate::union_fs::common::Fixture;

#[tokio::test]
async fn hard_link_across_branches_becomes_a_symlink_to_the_ro_branch_path() {
    let f = Fixture::new();
    f.write_ro("e", b"");

    f.fs.link(Fixture::rel("e"), Fixture::rel("f"), f.root()).await.unwrap();

    let meta = std::fs::symlink_metadata(f.rw_path("f")).unwrap();
    assert!(meta.file_type().is_symlink());
    let target = std::fs::read_link(f.rw_path("f")).unwrap();
    assert_eq!(target, f.ro_path("e"));
}

#[tokio::test]
async fn hard_link_within_rw_is_a_real_hard_link() {
    let f = Fixture::new();
    f.fs.create(Fixture::rel("e"), 0o644, f.root()).await.unwrap();

    f.fs.link(Fixture::rel("e"), Fixture::rel("f"), f.root()).await.unwrap();

    let meta = std::fs::symlink_metadata(f.rw_path("f")).unwrap();
    assert!(meta.is_file());
    assert_eq!(meta.nlink(), 2);
}

#[tokio::test]
async fn link_onto_an_existing_destination_fails_with_eexist() {
    let f = Fixture::new();
    f.write_ro("e", b"");
    f.fs.create(Fixture::rel("f"), 0o644, f.root()).await.unwrap();

    let err = f.fs.link(Fixture::rel("e"), Fixture::rel("f"), f.root()).await.unwrap_err();
    assert_eq!(err, Error::Exist);
}
