use crate::common::{build_romfs, rdir, rfile, Fixture};
use evfs::{CtrlCmd, CtrlReply, Error, OpenFlags};

fn mounted() -> Fixture {
    let fx = Fixture::new();
    let image = build_romfs(
        "jailtest",
        &[
            rdir(
                "pub",
                vec![rfile("readme.txt", b"public"), rdir("docs", vec![rfile("a", b"A")])],
            ),
            rfile("secret.txt", b"hidden"),
        ],
    );
    let path = fx.write("rom.img", &image);
    fx.apply(&format!(
        r#"
        [[mount]]
        name = "rom"
        kind = "romfs"
        image = {path:?}

        [[mount]]
        name = "jail"
        kind = "jail"
        default = true
        options = {{ wraps = "rom", jail_root = "/pub" }}
        "#
    ));
    fx
}

fn read_to_string(fx: &Fixture, vfs: Option<&str>, path: &str) -> String {
    let mut f = fx.registry.open(vfs, path, OpenFlags::READ).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = f.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    String::from_utf8(out).unwrap()
}

#[test]
fn jailed_paths_resolve_inside_the_subtree() {
    let fx = mounted();
    assert_eq!(read_to_string(&fx, None, "/readme.txt"), "public");
    assert_eq!(read_to_string(&fx, None, "docs/a"), "A");
}

#[test]
fn escapes_cannot_reach_the_outer_tree() {
    let fx = mounted();
    // "/secret.txt" exists on the inner backend but not inside the jail
    for attempt in ["../secret.txt", "/../secret.txt", "docs/../../secret.txt"] {
        assert_eq!(
            fx.registry.open(None, attempt, OpenFlags::READ).err(),
            Some(Error::NoPath),
            "escape attempt {attempt:?} was not confined"
        );
    }
    // the same path resolves when addressed to the inner backend
    assert_eq!(read_to_string(&fx, Some("rom"), "/secret.txt"), "hidden");
}

#[test]
fn shim_cwd_is_virtual() {
    let fx = mounted();
    fx.registry.set_cwd(Some("jail"), "/docs").unwrap();
    assert_eq!(fx.registry.get_cwd(Some("jail")).unwrap(), "/docs");
    assert_eq!(read_to_string(&fx, None, "a"), "A");
    // the inner backend's own CWD is untouched
    assert_eq!(fx.registry.get_cwd(Some("rom")).unwrap(), "/");
}

#[test]
fn jail_root_is_reported_by_ctrl() {
    let fx = mounted();
    match fx.registry.ctrl(Some("jail"), CtrlCmd::JailGetRoot).unwrap() {
        CtrlReply::Path(root) => assert_eq!(root, "/pub"),
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[test]
fn unregistering_the_shim_leaves_the_inner_backend() {
    let fx = mounted();
    fx.registry.unregister("jail").unwrap();
    assert!(fx.registry.find("jail").is_none());
    // inner backend still serves reads
    assert_eq!(read_to_string(&fx, Some("rom"), "/pub/readme.txt"), "public");
}
