//! Backend interface of the virtual filesystem layer.
//!
//! A backend is a named implementation of the file/directory capability
//! set: two required operations ([`Vfs::open`] and [`Vfs::stat`]) plus a
//! set of optional operations that degrade to [`Error::NoSupport`] when a
//! backend leaves them at their default. Open files and directories are
//! represented by the [`VfsFile`] / [`VfsDir`] handle traits; a handle is
//! released exactly once when it is dropped.

use std::ops;
use std::sync::Arc;

use num_derive::{FromPrimitive, ToPrimitive};

use crate::error::{Error, VfsResult};
use crate::path;

/// Open-mode flags accepted by [`Vfs::open`].
///
/// The type is a plain bit set; combine flags with `|`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct OpenFlags(u32);

impl OpenFlags {
    /// Open for reading.
    pub const READ: Self = Self(0x01);
    /// Open for writing.
    pub const WRITE: Self = Self(0x02);
    /// Open for reading and writing.
    pub const RDWR: Self = Self(0x01 | 0x02);
    /// Create the file when it does not exist.
    pub const OPEN_OR_NEW: Self = Self(0x04);
    /// Fail with [`Error::Exists`] when the file already exists.
    pub const NO_EXIST: Self = Self(0x08);
    /// Truncate the file to zero length on open.
    pub const OVERWRITE: Self = Self(0x10);
    /// Position every write at the end of the file.
    pub const APPEND: Self = Self(0x20);

    /// The empty flag set.
    pub fn empty() -> Self {
        Self(0)
    }

    /// Whether every flag in `other` is present in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any flag in `other` is present in `self`.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether the flags imply mutating the file or the namespace
    /// (writing, creating, or truncating).
    pub fn wants_write(self) -> bool {
        self.intersects(
            Self::WRITE | Self::OPEN_OR_NEW | Self::NO_EXIST | Self::OVERWRITE | Self::APPEND,
        )
    }

    /// Raw bit representation.
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl ops::BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Origin of a [`VfsFile::seek`] operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SeekFrom {
    /// Absolute offset from the start of the file.
    To(u64),
    /// Signed offset from the current position.
    Rel(i64),
    /// Positive offset subtracted from the end of the file.
    Rev(u64),
}

impl SeekFrom {
    /// Resolves the origin against the current position and total size.
    /// The result is clamped to `[0, size]`.
    pub fn resolve(self, pos: u64, size: u64) -> u64 {
        let target = match self {
            Self::To(off) => off as i64,
            Self::Rel(off) => pos as i64 + off,
            Self::Rev(off) => size as i64 - off as i64,
        };
        target.clamp(0, size as i64) as u64
    }
}

/// Validity mask for the fields of [`FileInfo`] and directory entries.
///
/// Backends report which fields they fill via
/// [`CtrlCmd::GetStatFields`] / [`CtrlCmd::GetDirFields`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct InfoFields(u32);

impl InfoFields {
    /// The entry name is valid.
    pub const NAME: Self = Self(0x01);
    /// The size field is valid.
    pub const SIZE: Self = Self(0x02);
    /// The modification time field is valid.
    pub const MTIME: Self = Self(0x04);
    /// The type (directory) flag is valid.
    pub const TYPE: Self = Self(0x08);

    /// The empty field set.
    pub fn empty() -> Self {
        Self(0)
    }

    /// Whether every field in `other` is marked valid.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Marks the fields in `other` valid.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl ops::BitOr for InfoFields {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Metadata descriptor returned by [`Vfs::stat`] and directory reads.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FileInfo {
    /// Size in bytes.
    pub size: u64,
    /// Modification time in seconds since the epoch, when known.
    pub mtime: u64,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// One entry yielded by [`VfsDir::read`].
///
/// The reference returned by `read` stays valid until the next `read` or
/// until the handle is dropped; the borrow checker enforces the contract.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name without any path prefix.
    pub name: String,
    /// Entry metadata; consult the dir-fields mask for validity.
    pub info: FileInfo,
}

/// Control command identifiers.
///
/// The numeric space is partitioned: generic commands below 200,
/// shim-specific commands from 200, file-level commands from 300.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
pub enum CtrlCmd {
    /// Delivered by the registry when the backend is removed. The backend
    /// releases private state; shims must not forward it.
    Unregister = 0,
    /// Report the [`InfoFields`] filled by [`Vfs::stat`].
    GetStatFields = 1,
    /// Report the [`InfoFields`] filled by directory reads.
    GetDirFields = 2,
    /// Ask the backend to build its fast lookup index now.
    BuildIndex = 100,
    /// Report the jail root of a jail shim.
    JailGetRoot = 200,
    /// Report a borrowed view of the file's bytes inside an in-memory
    /// image.
    GetResourceAddr = 300,
}

/// Typed reply of a control command.
#[derive(Debug, Clone)]
pub enum CtrlReply {
    /// The command completed without producing a value.
    None,
    /// A field-validity mask.
    Fields(InfoFields),
    /// A path owned by the callee.
    Path(String),
    /// A view into an in-memory filesystem image.
    Resource(Resource),
}

/// Borrowed view of a file's data inside a shared in-memory image.
#[derive(Debug, Clone)]
pub struct Resource {
    image: Arc<[u8]>,
    offset: usize,
    len: usize,
}

impl Resource {
    pub(crate) fn new(image: Arc<[u8]>, offset: usize, len: usize) -> Self {
        Self { image, offset, len }
    }

    /// The file's bytes within the image.
    pub fn bytes(&self) -> &[u8] {
        &self.image[self.offset..self.offset + self.len]
    }

    /// Offset of the data within the image.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the data in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A named filesystem backend.
///
/// `open` and `stat` are required; everything else is optional and
/// reports [`Error::NoSupport`] unless the backend overrides it.
pub trait Vfs: Send + Sync {
    /// Unique name the backend was registered under.
    fn name(&self) -> &str;

    /// Opens a file.
    fn open(&self, path: &str, flags: OpenFlags) -> VfsResult<Box<dyn VfsFile>>;

    /// Reports metadata for a path.
    fn stat(&self, path: &str) -> VfsResult<FileInfo>;

    /// Removes a file.
    fn delete(&self, _path: &str) -> VfsResult<()> {
        Err(Error::NoSupport)
    }

    /// Renames a file or directory.
    fn rename(&self, _from: &str, _to: &str) -> VfsResult<()> {
        Err(Error::NoSupport)
    }

    /// Creates a single directory; the parent must exist.
    fn make_dir(&self, _path: &str) -> VfsResult<()> {
        Err(Error::NoSupport)
    }

    /// Opens a directory for iteration.
    fn open_dir(&self, _path: &str) -> VfsResult<Box<dyn VfsDir>> {
        Err(Error::NoSupport)
    }

    /// Reports the backend's current working directory.
    fn get_cwd(&self) -> VfsResult<String> {
        Err(Error::NoSupport)
    }

    /// Changes the backend's current working directory.
    fn set_cwd(&self, _path: &str) -> VfsResult<()> {
        Err(Error::NoSupport)
    }

    /// Backend-level control operation.
    fn ctrl(&self, _cmd: CtrlCmd) -> VfsResult<CtrlReply> {
        Err(Error::NoSupport)
    }

    /// Classifies the leading bytes of `path` as its root component,
    /// returning the root length and whether the path is absolute.
    fn root_component(&self, path: &str) -> (usize, bool) {
        path::posix_root(path)
    }
}

/// Stream operations of an open file. Closing is dropping the handle.
pub trait VfsFile: Send {
    /// Reads into `buf`, returning the byte count; 0 only at end of file
    /// or for an empty `buf`.
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize>;

    /// Writes from `buf`, returning the byte count.
    fn write(&mut self, _buf: &[u8]) -> VfsResult<usize> {
        Err(Error::NoSupport)
    }

    /// Moves the stream position, returning the new absolute position.
    fn seek(&mut self, origin: SeekFrom) -> VfsResult<u64>;

    /// Current stream position.
    fn tell(&self) -> u64;

    /// Total size of the file in bytes.
    fn size(&self) -> VfsResult<u64>;

    /// Flushes buffered writes to the underlying medium.
    fn sync(&mut self) -> VfsResult<()> {
        Err(Error::NoSupport)
    }

    /// Truncates or extends the file to `size` bytes.
    fn truncate(&mut self, _size: u64) -> VfsResult<()> {
        Err(Error::NoSupport)
    }

    /// Whether the position is at or past the end of the file.
    fn eof(&self) -> bool;

    /// File-level control operation.
    fn ctrl(&mut self, _cmd: CtrlCmd) -> VfsResult<CtrlReply> {
        Err(Error::NoSupport)
    }
}

/// Iteration over the entries of an open directory.
pub trait VfsDir: Send {
    /// Yields the next entry, or `None` when the listing is exhausted.
    fn read(&mut self) -> VfsResult<Option<&DirEntry>>;

    /// Restarts iteration from the first entry.
    fn rewind(&mut self) -> VfsResult<()>;
}
