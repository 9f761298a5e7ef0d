use unionfs_core::Error;

use crate::union_fs::common::Fixture;

#[tokio::test]
async fn mkdir_over_an_existing_ro_directory_masks_its_children() {
    let f = Fixture::new();
    f.mkdir_ro("d");
    f.write_ro("d/x", b"");

    f.fs.rmdir(Fixture::rel("d"), f.root()).await.unwrap();
    f.fs.mkdir(Fixture::rel("d"), 0o755, f.root()).await.unwrap();

    assert!(f.rw_path("d").is_dir());
    assert!(!f.rw_path(".wh.d").exists());
    let listing = f.fs.readdir(Fixture::rel("d")).await.unwrap();
    assert!(listing.is_empty(), "RO children must stay hidden behind per-child whiteouts");
}

#[tokio::test]
async fn rmdir_then_mkdir_round_trip_leaves_no_rw_only_artifacts() {
    let f = Fixture::new();
    f.fs.mkdir(Fixture::rel("d"), 0o755, f.root()).await.unwrap();
    f.fs.rmdir(Fixture::rel("d"), f.root()).await.unwrap();

    let err = f.fs.lookup(Fixture::rel("d"), f.root()).await.unwrap_err();
    assert_eq!(err, Error::NoEntry);
    assert!(!f.rw_path("d").exists());
}

#[tokio::test]
async fn mkdir_on_existing_union_path_fails_with_eexist() {
    let f = Fixture::new();
    f.mkdir_ro("d");

    let err = f.fs.mkdir(Fixture::rel("d"), 0o755, f.root()).await.unwrap_err();
    assert_eq!(err, Error::Exist);
}
