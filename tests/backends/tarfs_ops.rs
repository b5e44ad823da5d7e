use crate::common::{build_tar, tdir, tfile, Fixture};
use evfs::vfs::InfoFields;
use evfs::{CtrlCmd, CtrlReply, Error, OpenFlags};

fn mounted() -> Fixture {
    let fx = Fixture::new();
    let archive = build_tar(&[
        tdir("a"),
        tfile("a/b.txt", b"xyz"),
        tfile("logs/boot.log", b"ok\nok\nfail\n"),
    ]);
    let path = fx.write("assets.tar", &archive);
    fx.apply(&format!(
        r#"
        [[mount]]
        name = "tar"
        kind = "tarfs"
        image = {path:?}
        default = true
        "#
    ));
    fx
}

#[test]
fn stat_reports_the_directory_flag() {
    let fx = mounted();
    let info = fx.registry.stat(None, "/a").unwrap();
    assert!(info.is_dir);

    let file = fx.registry.stat(None, "/a/b.txt").unwrap();
    assert!(!file.is_dir);
    assert_eq!(file.size, 3);
}

#[test]
fn reads_archive_members_end_to_end() {
    let fx = mounted();
    let mut f = fx.registry.open(None, "/a/b.txt", OpenFlags::READ).unwrap();
    let mut buf = [0u8; 8];
    let n = f.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"xyz");
    assert!(f.eof());

    let mut log = fx.registry.open(None, "/logs/boot.log", OpenFlags::READ).unwrap();
    assert_eq!(log.size().unwrap(), 11);
}

#[test]
fn directory_iteration_is_unsupported() {
    let fx = mounted();
    assert_eq!(fx.registry.open_dir(None, "/a").err(), Some(Error::NoSupport));
    match fx.registry.ctrl(None, CtrlCmd::GetDirFields).unwrap() {
        CtrlReply::Fields(fields) => assert_eq!(fields, InfoFields::empty()),
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[test]
fn write_intent_is_refused() {
    let fx = mounted();
    assert_eq!(
        fx.registry
            .open(None, "/a/b.txt", OpenFlags::READ | OpenFlags::OVERWRITE)
            .err(),
        Some(Error::NoSupport)
    );
}
