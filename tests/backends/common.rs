//! Shared fixture: on-disk image builders plus a tempdir-backed
//! registry.

use std::fs;
use std::path::PathBuf;

use byteorder::{BigEndian, ByteOrder};
use tempfile::TempDir;

use evfs::config::MountTable;
use evfs::registry::Registry;
use evfs::romfs::{align_up, words_sum, MAGIC};
use evfs::tarfs::{checksum_of, field, RECORD_LEN};

pub struct Fixture {
    pub tempdir: TempDir,
    pub registry: Registry,
}

impl Fixture {
    pub fn new() -> Self {
        let tempdir = TempDir::new().expect("create temp dir");
        Self { tempdir, registry: Registry::new() }
    }

    /// Writes an image file into the fixture directory.
    pub fn write(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.tempdir.path().join(name);
        fs::write(&path, bytes).expect("write fixture image");
        path
    }

    /// Parses and applies a mount table against the fixture registry.
    pub fn apply(&self, toml: &str) {
        MountTable::from_toml_str(toml)
            .expect("parse mount table")
            .apply(&self.registry)
            .expect("apply mount table");
    }
}

// ---- ROMFS image builder -------------------------------------------------

pub enum Node {
    File { name: String, data: Vec<u8> },
    Dir { name: String, children: Vec<Node> },
}

pub fn rfile(name: &str, data: &[u8]) -> Node {
    Node::File { name: name.to_owned(), data: data.to_vec() }
}

pub fn rdir(name: &str, children: Vec<Node>) -> Node {
    Node::Dir { name: name.to_owned(), children }
}

impl Node {
    fn name(&self) -> &str {
        match self {
            Node::File { name, .. } | Node::Dir { name, .. } => name,
        }
    }
}

struct Placed<'a> {
    offset: u32,
    node: &'a Node,
    children: Vec<Placed<'a>>,
}

fn place<'a>(nodes: &'a [Node], start: u64) -> (Vec<Placed<'a>>, u64) {
    let mut out = Vec::new();
    let mut off = start;
    for node in nodes {
        let offset = off as u32;
        off += 16 + align_up(node.name().len() as u64 + 1);
        let children = match node {
            Node::File { data, .. } => {
                off += align_up(data.len() as u64);
                Vec::new()
            }
            Node::Dir { children, .. } => {
                let (placed, next) = place(children, off);
                off = next;
                placed
            }
        };
        out.push(Placed { offset, node, children });
    }
    (out, off)
}

fn emit(placed: &[Placed], buf: &mut [u8]) {
    for (i, p) in placed.iter().enumerate() {
        let next = placed.get(i + 1).map_or(0, |n| n.offset);
        let (kind, spec, size, data): (u32, u32, u32, Option<&[u8]>) = match p.node {
            Node::File { data, .. } => (2, 0, data.len() as u32, Some(data)),
            Node::Dir { .. } => (1, p.children.first().map_or(0, |c| c.offset), 0, None),
        };
        let name = p.node.name();
        let off = p.offset as usize;
        BigEndian::write_u32(&mut buf[off..off + 4], next | kind);
        BigEndian::write_u32(&mut buf[off + 4..off + 8], spec);
        BigEndian::write_u32(&mut buf[off + 8..off + 12], size);
        buf[off + 16..off + 16 + name.len()].copy_from_slice(name.as_bytes());

        let span = (16 + align_up(name.len() as u64 + 1)) as usize;
        let sum = words_sum(&buf[off..off + span]);
        BigEndian::write_u32(&mut buf[off + 12..off + 16], 0u32.wrapping_sub(sum));

        if let Some(data) = data {
            buf[off + span..off + span + data.len()].copy_from_slice(data);
        }
        emit(&p.children, buf);
    }
}

pub fn build_romfs(volume: &str, nodes: &[Node]) -> Vec<u8> {
    let root_off = align_up(16 + volume.len() as u64 + 1);
    let (placed, total) = place(nodes, root_off);

    let mut buf = vec![0u8; total as usize];
    buf[..MAGIC.len()].copy_from_slice(MAGIC);
    BigEndian::write_u32(&mut buf[8..12], total as u32);
    buf[16..16 + volume.len()].copy_from_slice(volume.as_bytes());
    emit(&placed, &mut buf);

    let span = 512.min(buf.len());
    let sum = words_sum(&buf[..span]);
    BigEndian::write_u32(&mut buf[12..16], 0u32.wrapping_sub(sum));
    buf
}

// ---- TAR archive builder -------------------------------------------------

pub enum TarMember {
    File { path: String, data: Vec<u8> },
    Dir { path: String },
}

pub fn tfile(path: &str, data: &[u8]) -> TarMember {
    TarMember::File { path: path.to_owned(), data: data.to_vec() }
}

pub fn tdir(path: &str) -> TarMember {
    TarMember::Dir { path: path.to_owned() }
}

fn record(name: &str, type_flag: u8, size: usize) -> Vec<u8> {
    fn put(block: &mut [u8], f: (usize, usize), bytes: &[u8]) {
        block[f.0..f.0 + bytes.len()].copy_from_slice(bytes);
    }

    let mut block = vec![0u8; RECORD_LEN];
    put(&mut block, field::NAME, name.as_bytes());
    put(&mut block, field::MODE, b"0000644\0");
    put(&mut block, field::UID, b"0000000\0");
    put(&mut block, field::GID, b"0000000\0");
    put(&mut block, field::SIZE, format!("{size:011o}\0").as_bytes());
    put(&mut block, field::MTIME, b"00000000000\0");
    block[field::TYPE_FLAG] = type_flag;
    put(&mut block, field::MAGIC, b"ustar ");
    put(&mut block, field::VERSION, b"  ");

    let sum = checksum_of(&block);
    put(&mut block, field::CHECKSUM, format!("{sum:06o}\0 ").as_bytes());
    block
}

pub fn build_tar(members: &[TarMember]) -> Vec<u8> {
    let mut out = Vec::new();
    for member in members {
        match member {
            TarMember::File { path, data } => {
                out.extend_from_slice(&record(path, b'0', data.len()));
                out.extend_from_slice(data);
                while out.len() % RECORD_LEN != 0 {
                    out.push(0);
                }
            }
            TarMember::Dir { path } => {
                let with_slash = format!("{path}/");
                out.extend_from_slice(&record(&with_slash, b'5', 0));
            }
        }
    }
    out.extend_from_slice(&vec![0u8; RECORD_LEN * 2]);
    out
}
