//! Status codes shared by every backend and the dispatch layer.

use std::fmt;
use std::io;

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};

/// Result of VFS operations with error type [`Error`].
pub type VfsResult<T> = Result<T, Error>;

/// Positive status reported when directory iteration is exhausted. In Rust
/// this surfaces as `Ok(None)` from [`crate::vfs::VfsDir::read`]; the code
/// exists for embedders that keep the C-style sign convention.
pub const STATUS_DONE: i32 = 1;

/// Status of a successful operation.
pub const STATUS_OK: i32 = 0;

/// Error kinds surfaced by backends and by dispatch itself.
///
/// Each kind maps to a stable negative `i32` code so that size-returning
/// calls can be folded into a single signed integer by embedders. The
/// mapping is provided by [`Error::code`] and [`Error::from_code`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
pub enum Error {
    /// Unspecified failure.
    Fail = -1,
    /// The backend does not implement the requested operation.
    NoSupport = -2,
    /// No backend matched the requested name and no default is set.
    NoVfs = -3,
    /// A hard error occurred in the underlying byte source.
    Io = -4,
    /// On-media structures failed validation after mount.
    Corrupt = -5,
    /// The file named by the final path segment does not exist.
    NoFile = -6,
    /// The file exists and the open flags forbid that.
    Exists = -7,
    /// An intermediate path segment does not exist or is not a directory.
    NoPath = -8,
    /// The caller named a directory in a non-directory operation.
    IsDir = -9,
    /// An attempt was made to remove a directory that was not empty.
    NotEmpty = -10,
    /// The output range is too small for the constructed result.
    Overflow = -11,
    /// An argument failed validation before dispatch.
    BadArg = -12,
    /// No space left in the filesystem.
    FsFull = -13,
    /// A required allocation failed.
    Alloc = -14,
    /// A path exceeded the configured maximum length.
    TooLong = -15,
    /// The caller is not authorized for the operation.
    Auth = -16,
    /// A name contained bytes the backend rejects.
    BadName = -17,
    /// The component has not been initialized.
    Init = -18,
    /// The operation is administratively disabled (read-only mode).
    Disabled = -19,
    /// An image failed validation at mount time.
    Invalid = -20,
    /// The backend repaired an inconsistency while mounting.
    Repaired = -21,
}

impl Error {
    /// Stable negative integer code of this kind.
    pub fn code(self) -> i32 {
        self.to_i32().unwrap_or(Self::Fail as i32)
    }

    /// Maps a negative integer code back to its kind.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::from_i32(code)
    }

    fn message(self) -> &'static str {
        match self {
            Self::Fail => "operation failed",
            Self::NoSupport => "operation not supported",
            Self::NoVfs => "no matching VFS",
            Self::Io => "I/O error",
            Self::Corrupt => "corrupted filesystem structure",
            Self::NoFile => "no such file",
            Self::Exists => "file already exists",
            Self::NoPath => "no such path",
            Self::IsDir => "is a directory",
            Self::NotEmpty => "directory not empty",
            Self::Overflow => "output range too small",
            Self::BadArg => "bad argument",
            Self::FsFull => "filesystem full",
            Self::Alloc => "allocation failed",
            Self::TooLong => "path too long",
            Self::Auth => "not authorized",
            Self::BadName => "bad name",
            Self::Init => "not initialized",
            Self::Disabled => "operation disabled",
            Self::Invalid => "invalid filesystem image",
            Self::Repaired => "filesystem was repaired",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NoFile,
            io::ErrorKind::AlreadyExists => Self::Exists,
            io::ErrorKind::PermissionDenied => Self::Auth,
            io::ErrorKind::InvalidInput => Self::BadArg,
            io::ErrorKind::UnexpectedEof => Self::Corrupt,
            io::ErrorKind::OutOfMemory => Self::Alloc,
            _ => Self::Io,
        }
    }
}
