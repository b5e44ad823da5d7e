//! TAR-archive backend: a read-only filesystem over a ustar stream.
//!
//! Mounting indexes the archive in two passes (count, then populate)
//! into a Robin-Hood map of full path to `(header_offset, size)`; reads
//! are then served by seeking into the archive. The flat index does not
//! retain directory composition, so directory iteration is unsupported.

mod header;
#[cfg(test)]
mod tests;

pub use header::{checksum_of, field, parse_octal, parse_str, TarHeader, TarKind, RECORD_LEN};

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, VfsResult};
use crate::index::RhMap;
use crate::path::{self, PathStyle};
use crate::source::{ByteSource, FileSource, MemSource};
use crate::vfs::{
    CtrlCmd, CtrlReply, FileInfo, InfoFields, OpenFlags, SeekFrom, Vfs, VfsFile,
};

/// Index entry of one archive member. Directories carry `-1` in both
/// fields.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TarEntry {
    /// Offset of the member's header record, or -1 for a directory.
    pub header_offset: i64,
    /// Data size in bytes, or -1 for a directory.
    pub size: i64,
}

impl TarEntry {
    const DIRECTORY: Self = Self { header_offset: -1, size: -1 };

    /// Whether the entry denotes a directory.
    pub fn is_dir(&self) -> bool {
        self.header_offset < 0
    }
}

struct TarInner {
    source: Box<dyn ByteSource>,
    index: RhMap<TarEntry>,
    style: PathStyle,
}

/// The TAR backend.
pub struct TarFs {
    name: String,
    inner: Arc<TarInner>,
}

impl TarFs {
    /// Indexes the archive served by `source` and mounts it under the
    /// backend name `name`. The first record must verify or the mount
    /// reports [`Error::Invalid`]; later unverifiable records stop the
    /// scan at the last good member.
    pub fn mount(name: impl Into<String>, source: Box<dyn ByteSource>) -> VfsResult<Self> {
        let name = name.into();

        let mut entries = 0usize;
        let mut key_bytes = 0usize;
        scan(&*source, |_, hdr| {
            entries += 1;
            key_bytes += hdr.path.len();
        })?;

        let mut index = RhMap::with_exact_keys(entries, key_bytes);
        let mut failed = None;
        scan(&*source, |offset, hdr| {
            let entry = match hdr.kind {
                TarKind::Directory => TarEntry::DIRECTORY,
                _ => TarEntry { header_offset: offset as i64, size: hdr.size as i64 },
            };
            if let Err(err) = index.insert(&hdr.path, entry) {
                failed.get_or_insert(err);
            }
        })?;
        if let Some(err) = failed {
            return Err(err);
        }

        debug!(name = %name, members = index.len(), key_bytes, "indexed tar archive");
        Ok(Self {
            name,
            inner: Arc::new(TarInner { source, index, style: PathStyle::posix() }),
        })
    }

    /// Mounts an archive file on the host.
    pub fn mount_file(name: impl Into<String>, archive: &Path) -> VfsResult<Self> {
        let source = FileSource::open(archive)?;
        Self::mount(name, Box::new(source))
    }

    /// Mounts an archive held in memory.
    pub fn from_archive(name: impl Into<String>, archive: Vec<u8>) -> VfsResult<Self> {
        Self::mount(name, Box::new(MemSource::new(archive)))
    }

    /// Number of indexed members.
    pub fn member_count(&self) -> usize {
        self.inner.index.len()
    }

    /// Looks up the index entry for a path.
    pub fn entry(&self, path: &str) -> VfsResult<TarEntry> {
        let key = self.inner.key_of(path)?;
        if key.is_empty() {
            return Ok(TarEntry::DIRECTORY);
        }
        self.inner.index.get(&key).copied().ok_or(Error::NoFile)
    }
}

impl TarInner {
    /// Normalizes a lookup path into index-key form (no root prefix).
    fn key_of(&self, path: &str) -> VfsResult<String> {
        let abs = self.style.absolute("/", path)?;
        Ok(abs.trim_start_matches(path::is_sep).to_owned())
    }
}

/// Iterates verified records, calling `visit` for file and directory
/// members. Returns [`Error::Invalid`] when the archive opens with an
/// unverifiable record.
fn scan(source: &dyn ByteSource, mut visit: impl FnMut(u64, &TarHeader)) -> VfsResult<()> {
    let mut offset = 0u64;
    let mut block = [0u8; RECORD_LEN];
    let mut first = true;
    loop {
        let got = source.read_at(offset, &mut block)?;
        if got < RECORD_LEN {
            if first {
                return Err(Error::Invalid);
            }
            break;
        }
        if block.iter().all(|&b| b == 0) {
            // end-of-archive marker
            break;
        }
        let hdr = match TarHeader::parse(&block) {
            Ok(hdr) => hdr,
            Err(_) if first => return Err(Error::Invalid),
            Err(_) => {
                debug!(offset, "stopping tar scan at unverifiable record");
                break;
            }
        };
        if matches!(hdr.kind, TarKind::File | TarKind::Directory) && !hdr.path.is_empty() {
            visit(offset, &hdr);
        }
        offset = hdr.next_offset(offset);
        first = false;
    }
    Ok(())
}

impl Vfs for TarFs {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: &str, flags: OpenFlags) -> VfsResult<Box<dyn VfsFile>> {
        if flags.wants_write() {
            return Err(Error::NoSupport);
        }
        let entry = self.entry(path)?;
        if entry.is_dir() {
            return Err(Error::IsDir);
        }
        Ok(Box::new(TarFile {
            inner: Arc::clone(&self.inner),
            data_off: entry.header_offset as u64 + RECORD_LEN as u64,
            size: entry.size as u64,
            pos: 0,
        }))
    }

    fn stat(&self, path: &str) -> VfsResult<FileInfo> {
        let entry = self.entry(path)?;
        Ok(FileInfo {
            size: entry.size.max(0) as u64,
            mtime: 0,
            is_dir: entry.is_dir(),
        })
    }

    fn get_cwd(&self) -> VfsResult<String> {
        Ok("/".to_owned())
    }

    fn ctrl(&self, cmd: CtrlCmd) -> VfsResult<CtrlReply> {
        match cmd {
            CtrlCmd::GetStatFields => {
                Ok(CtrlReply::Fields(InfoFields::SIZE | InfoFields::TYPE))
            }
            // the flat index keeps no directory composition
            CtrlCmd::GetDirFields => Ok(CtrlReply::Fields(InfoFields::empty())),
            CtrlCmd::Unregister => Ok(CtrlReply::None),
            _ => Err(Error::NoSupport),
        }
    }
}

/// Open-file state: the member's data extent plus the read position.
struct TarFile {
    inner: Arc<TarInner>,
    data_off: u64,
    size: u64,
    pos: u64,
}

impl VfsFile for TarFile {
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let want = buf.len().min(self.size.saturating_sub(self.pos) as usize);
        if want == 0 {
            return Ok(0);
        }
        let got = self.inner.source.read_at(self.data_off + self.pos, &mut buf[..want])?;
        self.pos += got as u64;
        Ok(got)
    }

    fn seek(&mut self, origin: SeekFrom) -> VfsResult<u64> {
        self.pos = origin.resolve(self.pos, self.size);
        Ok(self.pos)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn size(&self) -> VfsResult<u64> {
        Ok(self.size)
    }

    fn eof(&self) -> bool {
        self.pos >= self.size
    }
}
