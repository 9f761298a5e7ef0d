use unionfs_core::attr::SetAttr;

use crate::union_fs::common::Fixture;

#[tokio::test]
async fn setattr_on_ro_entry_avoids_copy_up() {
    let f = Fixture::new();
    f.write_ro("b", b"");

    let delta = SetAttr { mode: Some(0o600), ..Default::default() };
    f.fs.setattr(Fixture::rel("b"), delta, f.root()).await.unwrap();

    assert!(!f.rw_path("b").exists());
    assert!(f.rw_path(".me.b").exists());

    let attr = f.fs.getattr(Fixture::rel("b"), f.root()).await.unwrap();
    assert_eq!(attr.mode & 0o777, 0o600);
    // size/type still come from the RO file, not the zero-length marker.
    assert_eq!(attr.size, 0);
}

#[tokio::test]
async fn repeated_setattr_calls_accumulate_into_one_sidecar() {
    let f = Fixture::new();
    f.write_ro("b", b"");

    f.fs.setattr(Fixture::rel("b"), SetAttr { mode: Some(0o640), ..Default::default() }, f.root())
        .await
        .unwrap();
    f.fs.setattr(Fixture::rel("b"), SetAttr { uid: Some(1234), ..Default::default() }, f.root())
        .await
        .unwrap();

    let attr = f.fs.getattr(Fixture::rel("b"), f.root()).await.unwrap();
    assert_eq!(attr.mode & 0o777, 0o640);
    assert_eq!(attr.uid, 1234);
}

#[tokio::test]
async fn setattr_on_rw_resident_path_never_creates_a_sidecar() {
    let f = Fixture::new();
    f.fs.create(Fixture::rel("c"), 0o644, f.root()).await.unwrap();

    f.fs.setattr(Fixture::rel("c"), SetAttr { mode: Some(0o600), ..Default::default() }, f.root())
        .await
        .unwrap();

    assert!(!f.rw_path(".me.c").exists());
    let attr = f.fs.getattr(Fixture::rel("c"), f.root()).await.unwrap();
    assert_eq!(attr.mode & 0o777, 0o600);
}
