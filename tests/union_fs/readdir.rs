use unionfs_core::attr::SetAttr;
use unionfs_core::inode;

use crate::union_fs::common::Fixture;

#[tokio::test]
async fn union_readdir_ordering_contract() {
    let f = Fixture::new();
    f.fs.create(Fixture::rel("a"), 0o644, f.root()).await.unwrap();
    f.write_ro("b", b"");
    f.write_ro("c", b"");
    f.fs.unlink(Fixture::rel("c"), f.root()).await.unwrap();
    f.fs.setattr(Fixture::rel("a"), SetAttr { mode: Some(0o600), ..Default::default() }, f.root())
        .await
        .ok();

    let listing = f.fs.readdir(Fixture::rel("")).await.unwrap();
    let mut names: Vec<&str> = listing.iter().map(|e| e.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["a", "b"]);

    let a = listing.iter().find(|e| e.name == "a").unwrap();
    assert_eq!(a.inode, inode::inode_number(Fixture::rel("a")));
}

#[tokio::test]
async fn readdir_hides_sidecars_and_whiteouts() {
    let f = Fixture::new();
    f.write_ro("b", b"");
    f.fs.setattr(Fixture::rel("b"), SetAttr { mode: Some(0o600), ..Default::default() }, f.root())
        .await
        .unwrap();

    let listing = f.fs.readdir(Fixture::rel("")).await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing.iter().next().unwrap().name, "b");
}
