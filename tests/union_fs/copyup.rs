use unionfs_core::attr::SetAttr;
use unionfs_core::vfs::OpenFlags;

use crate::union_fs::common::Fixture;

#[tokio::test]
async fn write_through_open_copies_up_and_preserves_content() {
    let f = Fixture::new();
    f.write_ro("b", b"hello world");

    let mut handle = f.fs.open(Fixture::rel("b"), OpenFlags { write: true }, f.root()).await.unwrap();
    f.fs.write(&mut handle, b"HELLO").await.unwrap();

    assert!(f.rw_path("b").exists());
    let on_disk = std::fs::read(f.rw_path("b")).unwrap();
    assert_eq!(&on_disk[..5], b"HELLO");
    assert_eq!(&on_disk[5..], b" world");

    // the RO original is untouched.
    let ro_original = std::fs::read(f.ro_path("b")).unwrap();
    assert_eq!(ro_original, b"hello world");
}

#[tokio::test]
async fn copy_up_retires_a_pre_existing_sidecar() {
    let f = Fixture::new();
    f.write_ro("b", b"");
    f.fs.setattr(Fixture::rel("b"), SetAttr { mode: Some(0o600), ..Default::default() }, f.root())
        .await
        .unwrap();
    assert!(f.rw_path(".me.b").exists());

    let mut handle = f.fs.open(Fixture::rel("b"), OpenFlags { write: true }, f.root()).await.unwrap();
    f.fs.write(&mut handle, b"x").await.unwrap();

    assert!(!f.rw_path(".me.b").exists());
    let attr = f.fs.getattr(Fixture::rel("b"), f.root()).await.unwrap();
    assert_eq!(attr.mode & 0o777, 0o600);
}

#[tokio::test]
async fn directory_copy_up_brings_its_children_along() {
    let f = Fixture::new();
    f.mkdir_ro("d");
    f.write_ro("d/x", b"contents");

    let mut handle =
        f.fs.open(Fixture::rel("d/x"), OpenFlags { write: true }, f.root()).await.unwrap();
    f.fs.write(&mut handle, b"!").await.unwrap();

    assert!(f.rw_path("d").is_dir());
    assert!(f.rw_path("d/x").exists());
}

#[tokio::test]
async fn read_only_open_does_not_copy_up() {
    let f = Fixture::new();
    f.write_ro("b", b"hello");

    let mut handle = f.fs.open(Fixture::rel("b"), OpenFlags { write: false }, f.root()).await.unwrap();
    let data = f.fs.read(&mut handle, 5).await.unwrap();

    assert_eq!(data, b"hello");
    assert!(!f.rw_path("b").exists());
}
