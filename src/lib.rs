//! EVFS --- an embedded virtual filesystem layer.
//!
//! A process registers named backends (ROMFS images, TAR archives,
//! host-backed trees, shims that wrap other backends) on a [`Registry`]
//! and dispatches every file and directory operation through the
//! [`vfs::Vfs`] capability set. Paths are handled by a backend-aware
//! algebra ([`path`]), and the image backends share a Robin-Hood path
//! index ([`index`]) and random-access byte sources ([`source`]).

pub mod config;
pub mod error;
pub mod index;
pub mod jail;
pub mod path;
pub mod registry;
pub mod romfs;
pub mod source;
pub mod tarfs;
pub mod trace;
pub mod vfs;

pub use error::{Error, VfsResult};
pub use registry::Registry;
pub use vfs::{CtrlCmd, CtrlReply, DirEntry, FileInfo, OpenFlags, SeekFrom, Vfs, VfsDir, VfsFile};
