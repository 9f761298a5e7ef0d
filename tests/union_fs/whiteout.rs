use unionfs_core::Error;

use crate::union_fs::common::Fixture;

#[tokio::test]
async fn unlink_on_ro_entry_creates_whiteout_and_hides_it() {
    let f = Fixture::new();
    f.write_ro("a", b"hello");

    f.fs.unlink(Fixture::rel("a"), f.root()).await.unwrap();

    assert!(f.rw_path(".wh.a").exists());
    let err = f.fs.lookup(Fixture::rel("a"), f.root()).await.unwrap_err();
    assert_eq!(err, Error::NoEntry);
}

#[tokio::test]
async fn recreating_a_whited_out_path_removes_the_whiteout() {
    let f = Fixture::new();
    f.write_ro("a", b"hello");
    f.fs.unlink(Fixture::rel("a"), f.root()).await.unwrap();
    assert!(f.rw_path(".wh.a").exists());

    f.fs.create(Fixture::rel("a"), 0o644, f.root()).await.unwrap();

    assert!(!f.rw_path(".wh.a").exists());
    f.fs.lookup(Fixture::rel("a"), f.root()).await.unwrap();
}

#[tokio::test]
async fn unlink_on_rw_only_entry_does_not_whiteout() {
    let f = Fixture::new();
    f.fs.create(Fixture::rel("a"), 0o644, f.root()).await.unwrap();

    f.fs.unlink(Fixture::rel("a"), f.root()).await.unwrap();

    assert!(!f.rw_path(".wh.a").exists());
    let err = f.fs.lookup(Fixture::rel("a"), f.root()).await.unwrap_err();
    assert_eq!(err, Error::NoEntry);
}

#[tokio::test]
async fn rmdir_on_directory_with_real_rw_content_fails() {
    let f = Fixture::new();
    f.fs.mkdir(Fixture::rel("d"), 0o755, f.root()).await.unwrap();
    f.fs.create(Fixture::rel("d/x"), 0o644, f.root()).await.unwrap();

    let err = f.fs.rmdir(Fixture::rel("d"), f.root()).await.unwrap_err();
    assert_eq!(err, Error::NotEmpty);
}

#[tokio::test]
async fn rmdir_on_ro_only_directory_masks_it_without_walking_children() {
    let f = Fixture::new();
    f.mkdir_ro("d");
    f.write_ro("d/x", b"");

    f.fs.rmdir(Fixture::rel("d"), f.root()).await.unwrap();

    assert!(f.rw_path(".wh.d").exists());
    let err = f.fs.lookup(Fixture::rel("d"), f.root()).await.unwrap_err();
    assert_eq!(err, Error::NoEntry);
}
