use std::sync::Arc;

use crate::common::{build_tar, tfile, Fixture};
use evfs::tarfs::TarFs;
use evfs::vfs::InfoFields;
use evfs::{CtrlCmd, CtrlReply, Error, OpenFlags};

fn tar_backend(name: &str, file: &str, data: &[u8]) -> Arc<TarFs> {
    let archive = build_tar(&[tfile(file, data)]);
    Arc::new(TarFs::from_archive(name, archive).unwrap())
}

#[test]
fn dispatch_selects_named_or_default_backend() {
    let fx = Fixture::new();
    fx.registry.register(tar_backend("one", "only.txt", b"first"), false).unwrap();
    fx.registry.register(tar_backend("two", "only.txt", b"second"), false).unwrap();

    // "one" registered first and stays the default
    let mut f = fx.registry.open(None, "/only.txt", OpenFlags::READ).unwrap();
    let mut buf = [0u8; 16];
    let n = f.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"first");

    let mut f = fx.registry.open(Some("two"), "/only.txt", OpenFlags::READ).unwrap();
    let n = f.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"second");

    assert_eq!(
        fx.registry.open(Some("ghost"), "/only.txt", OpenFlags::READ).err(),
        Some(Error::NoVfs)
    );
}

#[test]
fn unregister_promotes_the_remaining_backend() {
    let fx = Fixture::new();
    fx.registry.register(tar_backend("one", "a", b"1"), false).unwrap();
    fx.registry.register(tar_backend("two", "b", b"2"), false).unwrap();
    assert_eq!(fx.registry.default_name().as_deref(), Some("one"));

    fx.registry.unregister("one").unwrap();
    assert_eq!(fx.registry.default_name().as_deref(), Some("two"));
    assert!(fx.registry.stat(None, "/b").is_ok());
}

#[test]
fn ctrl_flows_to_the_selected_backend() {
    let fx = Fixture::new();
    fx.registry.register(tar_backend("tar", "x", b"!"), true).unwrap();
    match fx.registry.ctrl(None, CtrlCmd::GetStatFields).unwrap() {
        CtrlReply::Fields(fields) => {
            assert!(fields.contains(InfoFields::SIZE | InfoFields::TYPE));
        }
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[test]
fn optional_operations_degrade_to_no_support() {
    let fx = Fixture::new();
    fx.registry.register(tar_backend("tar", "x", b"!"), true).unwrap();
    assert_eq!(fx.registry.rename(None, "/x", "/y").err(), Some(Error::NoSupport));
    assert_eq!(fx.registry.set_cwd(None, "/a").err(), Some(Error::NoSupport));
    assert_eq!(
        fx.registry.make_path(None, "/fresh/dir").err(),
        Some(Error::NoSupport)
    );
}
