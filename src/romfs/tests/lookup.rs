use super::image::{build_image, dir, file, link};
use crate::error::Error;
use crate::romfs::{RomFs, RomOptions};
use crate::vfs::{OpenFlags, Vfs, VfsFile as _};

fn tree_image() -> Vec<u8> {
    build_image(
        "tree",
        &[
            dir(
                "etc",
                vec![
                    link(".", "etc"),
                    file("host.conf", b"order hosts\n"),
                    dir("net", vec![file("rc", b"#!/bin/sh\n")]),
                ],
            ),
            file("readme", b"root file"),
            link("alias", "etc/host.conf"),
            link("etc2", "etc"),
        ],
    )
}

fn mount(opts: RomOptions) -> RomFs {
    RomFs::from_image("rom", tree_image(), opts).unwrap()
}

fn read_all(fs: &RomFs, path: &str) -> Vec<u8> {
    let mut f = fs.open(path, OpenFlags::READ).unwrap();
    let mut out = vec![0u8; f.size().unwrap() as usize];
    let mut done = 0;
    while done < out.len() {
        let n = f.read(&mut out[done..]).unwrap();
        assert!(n > 0, "short read at {done}");
        done += n;
    }
    out
}

#[test]
fn walks_nested_directories() {
    let fs = mount(RomOptions::default());
    assert_eq!(read_all(&fs, "/etc/net/rc"), b"#!/bin/sh\n");
    assert_eq!(read_all(&fs, "/readme"), b"root file");
    // redundant separators and dot segments collapse before the walk
    assert_eq!(read_all(&fs, "//etc/./net//rc"), b"#!/bin/sh\n");
    assert_eq!(read_all(&fs, "/etc/net/../host.conf"), b"order hosts\n");
}

#[test]
fn missing_entries_report_no_path() {
    let fs = mount(RomOptions::default());
    assert_eq!(fs.stat("/nope").err(), Some(Error::NoPath));
    assert_eq!(fs.stat("/etc/nope").err(), Some(Error::NoPath));
    // a file used as an intermediate segment terminates the walk
    assert_eq!(fs.stat("/readme/deeper").err(), Some(Error::NoPath));
}

#[test]
fn root_resolves_to_a_directory() {
    let fs = mount(RomOptions::default());
    let info = fs.stat("/").unwrap();
    assert!(info.is_dir);
    assert!(matches!(fs.open("/", OpenFlags::READ), Err(Error::IsDir)));
}

#[test]
fn hard_links_resolve_to_their_targets() {
    let fs = mount(RomOptions::default());
    // link to a file reads the target bytes
    assert_eq!(read_all(&fs, "/alias"), b"order hosts\n");
    // link to a directory walks into the target's children
    assert_eq!(read_all(&fs, "/etc2/host.conf"), b"order hosts\n");
    assert_eq!(read_all(&fs, "/etc2/net/rc"), b"#!/bin/sh\n");
    let info = fs.stat("/etc2").unwrap();
    assert!(info.is_dir);
}

#[test]
fn open_on_directory_reports_is_dir() {
    let fs = mount(RomOptions::default());
    assert!(matches!(fs.open("/etc", OpenFlags::READ), Err(Error::IsDir)));
    assert!(matches!(fs.open("/etc/net", OpenFlags::READ), Err(Error::IsDir)));
}

#[test]
fn index_lookup_matches_tree_walk() {
    let walk = mount(RomOptions::default());
    let indexed = mount(RomOptions::default());
    indexed.build_index().unwrap();
    assert!(indexed.is_indexed());
    assert!(!walk.is_indexed());

    for path in [
        "/etc/host.conf",
        "/etc/net/rc",
        "/readme",
        "/alias",
        "/etc2",
        "/etc",
        "/",
    ] {
        let a = walk.stat(path).unwrap();
        let b = indexed.stat(path).unwrap();
        assert_eq!(a, b, "stat divergence for {path}");
    }
    assert_eq!(read_all(&indexed, "/etc/net/rc"), b"#!/bin/sh\n");
    assert_eq!(read_all(&indexed, "/alias"), b"order hosts\n");
    assert_eq!(indexed.stat("/missing").err(), Some(Error::NoPath));
}

#[test]
fn directory_iteration_walks_the_sibling_chain() {
    use crate::vfs::VfsDir as _;

    let fs = mount(RomOptions::default());
    let mut d = fs.open_dir("/etc").unwrap();
    let mut names = Vec::new();
    while let Some(entry) = d.read().unwrap() {
        names.push((entry.name.clone(), entry.info.is_dir));
    }
    assert_eq!(
        names,
        [
            (".".to_owned(), true),
            ("host.conf".to_owned(), false),
            ("net".to_owned(), true),
        ]
    );

    d.rewind().unwrap();
    let first = d.read().unwrap().unwrap();
    assert_eq!(first.name, ".");
}

#[test]
fn no_dir_dots_skips_link_entries() {
    use crate::vfs::VfsDir as _;

    let fs = mount(RomOptions { no_dir_dots: true });
    let mut d = fs.open_dir("/etc").unwrap();
    let first = d.read().unwrap().unwrap();
    assert_eq!(first.name, "host.conf");
}

#[test]
fn root_listing_starts_at_the_first_header() {
    use crate::vfs::VfsDir as _;

    let fs = mount(RomOptions::default());
    let mut d = fs.open_dir("/").unwrap();
    let mut names = Vec::new();
    while let Some(entry) = d.read().unwrap() {
        names.push(entry.name.clone());
    }
    assert_eq!(names, ["etc", "readme", "alias", "etc2"]);
}

#[test]
fn open_dir_on_file_is_an_error() {
    let fs = mount(RomOptions::default());
    assert!(matches!(fs.open_dir("/readme"), Err(Error::NoPath)));
}
