//! Read-only ROMFS backend.
//!
//! A mounted image starts out resolving paths by walking the on-disk
//! directory tree. [`RomFs::build_index`] replaces the walk with a
//! Robin-Hood path index for O(1) lookups; the strategy switch is an
//! internal state change, transparent to callers.

mod header;
#[cfg(test)]
mod tests;

pub use header::{align_up, words_sum, FileHeader, FileKind, Superblock, MAGIC};

use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::{Error, VfsResult};
use crate::index::RhMap;
use crate::path::{self, PathStyle};
use crate::source::{ByteSource, FileSource, MemSource};
use crate::vfs::{
    CtrlCmd, CtrlReply, DirEntry, FileInfo, InfoFields, OpenFlags, Resource, SeekFrom, Vfs,
    VfsDir, VfsFile,
};

/// Mount-time options of the ROMFS backend.
#[derive(Debug, Default, Clone)]
pub struct RomOptions {
    /// Skip the `.`/`..` hard-link pair during directory iteration.
    pub no_dir_dots: bool,
}

/// Path lookup strategy; `Indexed` replaces `Walk` once the index is
/// built and is destroyed with the mount.
enum Lookup {
    Walk,
    Indexed(RhMap<u32>),
}

/// What a path resolved to: the filesystem root or a header.
enum Located {
    Root,
    Entry(FileHeader),
}

struct RomInner {
    source: Box<dyn ByteSource>,
    /// Present for in-memory mounts; backs the resource-address ctrl.
    image: Option<Arc<[u8]>>,
    volume: String,
    fs_size: u32,
    root_offset: u32,
    opts: RomOptions,
    style: PathStyle,
    lookup: RwLock<Lookup>,
}

/// The ROMFS backend.
pub struct RomFs {
    name: String,
    inner: Arc<RomInner>,
}

impl RomFs {
    /// Mounts an image served by `source` under the backend name `name`.
    pub fn mount(
        name: impl Into<String>,
        source: Box<dyn ByteSource>,
        opts: RomOptions,
    ) -> VfsResult<Self> {
        Self::mount_inner(name.into(), source, None, opts)
    }

    /// Mounts an image file on the host.
    pub fn mount_file(
        name: impl Into<String>,
        image: &Path,
        opts: RomOptions,
    ) -> VfsResult<Self> {
        let source = FileSource::open(image)?;
        Self::mount_inner(name.into(), Box::new(source), None, opts)
    }

    /// Mounts a complete image held in memory. Files opened from such a
    /// mount answer the resource-address ctrl with a borrowed view.
    pub fn from_image(
        name: impl Into<String>,
        image: Vec<u8>,
        opts: RomOptions,
    ) -> VfsResult<Self> {
        let source = MemSource::new(image);
        let shared = source.image();
        Self::mount_inner(name.into(), Box::new(source), Some(shared), opts)
    }

    fn mount_inner(
        name: String,
        source: Box<dyn ByteSource>,
        image: Option<Arc<[u8]>>,
        opts: RomOptions,
    ) -> VfsResult<Self> {
        let sb = Superblock::read(&*source)?;
        debug!(
            name = %name,
            volume = %sb.volume,
            size = sb.fs_size,
            root = sb.root_offset,
            "mounted romfs image"
        );
        Ok(Self {
            name,
            inner: Arc::new(RomInner {
                source,
                image,
                volume: sb.volume,
                fs_size: sb.fs_size,
                root_offset: sb.root_offset,
                opts,
                style: PathStyle::posix(),
                lookup: RwLock::new(Lookup::Walk),
            }),
        })
    }

    /// Volume label of the mounted image.
    pub fn volume(&self) -> &str {
        &self.inner.volume
    }

    /// Declared size of the mounted image in bytes.
    pub fn fs_size(&self) -> u32 {
        self.inner.fs_size
    }

    /// Builds the path index and switches lookups over to it. The scan
    /// first counts entries and key bytes so the index allocates its key
    /// arena exactly once.
    pub fn build_index(&self) -> VfsResult<()> {
        let inner = &self.inner;
        let mut entries = 0usize;
        let mut key_bytes = 0usize;
        inner.count_entries(inner.root_offset, 0, &mut entries, &mut key_bytes)?;

        let mut map = RhMap::with_exact_keys(entries, key_bytes);
        let mut prefix = String::new();
        inner.insert_entries(inner.root_offset, &mut prefix, &mut map)?;

        debug!(entries, key_bytes, "built romfs path index");
        let mut lookup = inner.lookup.write().map_err(|_| Error::Fail)?;
        *lookup = Lookup::Indexed(map);
        Ok(())
    }

    /// Whether lookups currently go through the index.
    pub fn is_indexed(&self) -> bool {
        match self.inner.lookup.read() {
            Ok(guard) => matches!(&*guard, Lookup::Indexed(_)),
            Err(_) => false,
        }
    }
}

impl RomInner {
    fn read_header(&self, offset: u32) -> VfsResult<FileHeader> {
        FileHeader::read(&*self.source, offset)
    }

    /// Scans one sibling chain for `token`, resolving a matching hard
    /// link to its target header.
    fn find_in_chain(&self, first: u32, token: &str) -> VfsResult<FileHeader> {
        let mut off = first;
        while off != 0 {
            let hdr = self.read_header(off)?;
            if hdr.name == token {
                if hdr.kind == FileKind::HardLink {
                    return self.read_header(hdr.spec_info);
                }
                return Ok(hdr);
            }
            off = hdr.next;
        }
        Err(Error::NoPath)
    }

    fn walk(&self, key: &str) -> VfsResult<Located> {
        let mut first = self.root_offset;
        let mut segs = path::segments(key).peekable();
        while let Some(token) = segs.next() {
            let hdr = self.find_in_chain(first, token)?;
            if segs.peek().is_none() {
                return Ok(Located::Entry(hdr));
            }
            if hdr.kind != FileKind::Directory {
                return Err(Error::NoPath);
            }
            first = hdr.spec_info;
        }
        Ok(Located::Root)
    }

    /// Normalizes `path` against the fixed root CWD and resolves it via
    /// the current lookup strategy.
    fn resolve(&self, path: &str) -> VfsResult<Located> {
        let abs = self.style.absolute("/", path)?;
        let key = abs.trim_start_matches(path::is_sep);
        if key.is_empty() {
            return Ok(Located::Root);
        }
        let lookup = self.lookup.read().map_err(|_| Error::Fail)?;
        match &*lookup {
            Lookup::Walk => self.walk(key),
            Lookup::Indexed(map) => {
                let offset = *map.get(key).ok_or(Error::NoPath)?;
                let hdr = self.read_header(offset)?;
                if hdr.kind == FileKind::HardLink {
                    return Ok(Located::Entry(self.read_header(hdr.spec_info)?));
                }
                Ok(Located::Entry(hdr))
            }
        }
    }

    fn count_entries(
        &self,
        first: u32,
        prefix_len: usize,
        entries: &mut usize,
        key_bytes: &mut usize,
    ) -> VfsResult<()> {
        let mut off = first;
        while off != 0 {
            let hdr = self.read_header(off)?;
            off = hdr.next;
            if hdr.name == "." || hdr.name == ".." {
                continue;
            }
            *entries += 1;
            *key_bytes += prefix_len + hdr.name.len();
            if hdr.kind == FileKind::Directory {
                self.count_entries(
                    hdr.spec_info,
                    prefix_len + hdr.name.len() + 1,
                    entries,
                    key_bytes,
                )?;
            }
        }
        Ok(())
    }

    fn insert_entries(
        &self,
        first: u32,
        prefix: &mut String,
        map: &mut RhMap<u32>,
    ) -> VfsResult<()> {
        let mut off = first;
        while off != 0 {
            let hdr = self.read_header(off)?;
            let base = prefix.len();
            if hdr.name != "." && hdr.name != ".." {
                prefix.push_str(&hdr.name);
                map.insert(prefix, hdr.offset)?;
                if hdr.kind == FileKind::Directory {
                    prefix.push(path::DIR_SEP);
                    self.insert_entries(hdr.spec_info, prefix, map)?;
                }
                prefix.truncate(base);
            }
            off = hdr.next;
        }
        Ok(())
    }
}

impl Vfs for RomFs {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: &str, flags: OpenFlags) -> VfsResult<Box<dyn VfsFile>> {
        if flags.wants_write() {
            return Err(Error::NoSupport);
        }
        match self.inner.resolve(path)? {
            Located::Root => Err(Error::IsDir),
            Located::Entry(hdr) => {
                if hdr.kind == FileKind::Directory {
                    return Err(Error::IsDir);
                }
                Ok(Box::new(RomFile {
                    inner: Arc::clone(&self.inner),
                    data_off: hdr.data_offset(),
                    size: u64::from(hdr.size),
                    pos: 0,
                }))
            }
        }
    }

    fn stat(&self, path: &str) -> VfsResult<FileInfo> {
        match self.inner.resolve(path)? {
            Located::Root => Ok(FileInfo { size: 0, mtime: 0, is_dir: true }),
            Located::Entry(hdr) => Ok(FileInfo {
                size: u64::from(hdr.size),
                mtime: 0,
                is_dir: hdr.kind == FileKind::Directory,
            }),
        }
    }

    fn open_dir(&self, path: &str) -> VfsResult<Box<dyn VfsDir>> {
        let first = match self.inner.resolve(path)? {
            Located::Root => self.inner.root_offset,
            Located::Entry(hdr) if hdr.kind == FileKind::Directory => hdr.spec_info,
            Located::Entry(_) => return Err(Error::NoPath),
        };
        Ok(Box::new(RomDir {
            inner: Arc::clone(&self.inner),
            first,
            next_off: first,
            entry: DirEntry::default(),
        }))
    }

    fn get_cwd(&self) -> VfsResult<String> {
        Ok("/".to_owned())
    }

    fn ctrl(&self, cmd: CtrlCmd) -> VfsResult<CtrlReply> {
        match cmd {
            CtrlCmd::GetStatFields => {
                Ok(CtrlReply::Fields(InfoFields::SIZE | InfoFields::TYPE))
            }
            CtrlCmd::GetDirFields => Ok(CtrlReply::Fields(
                InfoFields::NAME | InfoFields::SIZE | InfoFields::TYPE,
            )),
            CtrlCmd::BuildIndex => {
                self.build_index()?;
                Ok(CtrlReply::None)
            }
            CtrlCmd::Unregister => {
                let mut lookup = self.inner.lookup.write().map_err(|_| Error::Fail)?;
                *lookup = Lookup::Walk;
                Ok(CtrlReply::None)
            }
            _ => Err(Error::NoSupport),
        }
    }
}

/// Open-file state: a cached header extent plus the read position.
struct RomFile {
    inner: Arc<RomInner>,
    data_off: u64,
    size: u64,
    pos: u64,
}

impl VfsFile for RomFile {
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

    fn ctrl(&mut self, cmd: CtrlCmd) -> VfsResult<CtrlReply> {
        match cmd {
            CtrlCmd::GetResourceAddr => {
                let image = self.inner.image.as_ref().ok_or(Error::NoSupport)?;
                Ok(CtrlReply::Resource(Resource::new(
                    Arc::clone(image),
                    self.data_off as usize,
                    self.size as usize,
                )))
            }
            _ => Err(Error::NoSupport),
        }
    }
}

/// Open-directory state: one sibling-chain step per read.
struct RomDir {
    inner: Arc<RomInner>,
    first: u32,
    next_off: u32,
    entry: DirEntry,
}

impl VfsDir for RomDir {
    fn read(&mut self) -> VfsResult<Option<&DirEntry>> {
        while self.next_off != 0 {
            let hdr = self.inner.read_header(self.next_off)?;
            self.next_off = hdr.next;
            if self.inner.opts.no_dir_dots && (hdr.name == "." || hdr.name == "..") {
                continue;
            }
            let info = FileInfo {
                size: u64::from(hdr.size),
                mtime: 0,
                is_dir: hdr.dir_bit(),
            };
            self.entry = DirEntry { name: hdr.name, info };
            return Ok(Some(&self.entry));
        }
        Ok(None)
    }

    fn rewind(&mut self) -> VfsResult<()> {
        self.next_off = self.first;
        Ok(())
    }
}
