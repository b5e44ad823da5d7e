use crate::common::{build_romfs, rdir, rfile, Fixture};
use evfs::{CtrlCmd, CtrlReply, Error, OpenFlags, SeekFrom};

fn mounted() -> Fixture {
    let fx = Fixture::new();
    let image = build_romfs(
        "itest",
        &[
            rdir("dir", vec![rfile("file.txt", b"hello")]),
            rfile("version", b"v1.2.3\n"),
        ],
    );
    let path = fx.write("rom.img", &image);
    fx.apply(&format!(
        r#"
        [[mount]]
        name = "rom"
        kind = "romfs"
        image = {path:?}
        default = true
        "#
    ));
    fx
}

#[test]
fn reads_a_file_end_to_end() {
    let fx = mounted();
    let mut f = fx.registry.open(None, "/dir/file.txt", OpenFlags::READ).unwrap();
    assert_eq!(f.size().unwrap(), 5);

    let mut buf = [0u8; 16];
    let n = f.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello");
    assert!(f.eof());

    f.seek(SeekFrom::To(0)).unwrap();
    assert!(!f.eof());
    assert_eq!(f.tell(), 0);
}

#[test]
fn listings_and_stats_flow_through_the_registry() {
    let fx = mounted();
    let info = fx.registry.stat(Some("rom"), "/dir").unwrap();
    assert!(info.is_dir);

    let mut names = Vec::new();
    let mut dir = fx.registry.open_dir(None, "/").unwrap();
    while let Some(entry) = dir.read().unwrap() {
        names.push(entry.name.clone());
    }
    assert_eq!(names, ["dir", "version"]);
}

#[test]
fn index_builds_through_the_ctrl_surface() {
    let fx = mounted();
    match fx.registry.ctrl(Some("rom"), CtrlCmd::BuildIndex).unwrap() {
        CtrlReply::None => {}
        other => panic!("unexpected reply: {other:?}"),
    }
    let mut f = fx.registry.open(None, "/dir/file.txt", OpenFlags::READ).unwrap();
    let mut buf = [0u8; 8];
    let n = f.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello");
    assert_eq!(
        fx.registry.stat(None, "/dir/absent").err(),
        Some(Error::NoPath)
    );
}

#[test]
fn writes_are_refused_by_the_backend() {
    let fx = mounted();
    assert_eq!(
        fx.registry
            .open(None, "/version", OpenFlags::READ | OpenFlags::WRITE)
            .err(),
        Some(Error::NoSupport)
    );
    assert_eq!(fx.registry.delete(None, "/version").err(), Some(Error::NoSupport));
    assert_eq!(
        fx.registry.make_dir(None, "/newdir").err(),
        Some(Error::NoSupport)
    );
}
