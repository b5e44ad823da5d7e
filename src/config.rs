//! Declarative mount configuration.
//!
//! A [`MountTable`] describes the backends a process wants registered
//! and is usually deserialized from TOML:
//!
//! ```toml
//! [[mount]]
//! name = "rom"
//! kind = "romfs"
//! image = "firmware.img"
//! default = true
//!
//! [[mount]]
//! name = "jail"
//! kind = "jail"
//! options = { wraps = "rom", jail_root = "/etc" }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, VfsResult};
use crate::jail::JailFs;
use crate::registry::Registry;
use crate::romfs::{RomFs, RomOptions};
use crate::tarfs::TarFs;
use crate::trace::TraceFs;

/// Backend flavor of one mount entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Romfs,
    Tarfs,
    Jail,
    Trace,
}

/// Per-mount options; unknown concerns for a kind are ignored by it.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MountOptions {
    /// ROMFS: skip the `.`/`..` hard-link pair in directory listings.
    pub no_dir_dots: bool,
    /// ROMFS: build the fast path index right after the mount.
    pub build_index: bool,
    /// Jail: subtree of the wrapped backend to confine paths to.
    pub jail_root: Option<String>,
    /// Jail: name of the already-registered backend to wrap.
    pub wraps: Option<String>,
}

/// One backend to register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mount {
    /// Backend name to register under.
    pub name: String,
    pub kind: MountKind,
    /// Image file for the romfs/tarfs kinds.
    #[serde(default)]
    pub image: Option<PathBuf>,
    /// Register this mount as the default backend.
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub options: MountOptions,
}

/// The full mount configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MountTable {
    #[serde(default)]
    pub mount: Vec<Mount>,
}

impl MountTable {
    /// Parses a TOML mount table.
    pub fn from_toml_str(text: &str) -> VfsResult<Self> {
        toml::from_str(text).map_err(|_| Error::Invalid)
    }

    /// Registers every described backend on `registry`, in order. Jail
    /// entries may wrap any backend registered earlier in the table.
    pub fn apply(&self, registry: &Registry) -> VfsResult<()> {
        for mount in &self.mount {
            debug!(name = %mount.name, kind = ?mount.kind, "applying mount entry");
            match mount.kind {
                MountKind::Romfs => {
                    let image = mount.image.as_deref().ok_or(Error::BadArg)?;
                    let opts = RomOptions { no_dir_dots: mount.options.no_dir_dots };
                    let fs = RomFs::mount_file(mount.name.clone(), image, opts)?;
                    if mount.options.build_index {
                        fs.build_index()?;
                    }
                    registry.register(Arc::new(fs), mount.default)?;
                }
                MountKind::Tarfs => {
                    let image = mount.image.as_deref().ok_or(Error::BadArg)?;
                    let fs = TarFs::mount_file(mount.name.clone(), image)?;
                    registry.register(Arc::new(fs), mount.default)?;
                }
                MountKind::Jail => {
                    let wraps = mount.options.wraps.as_deref().ok_or(Error::BadArg)?;
                    let root = mount.options.jail_root.as_deref().ok_or(Error::BadArg)?;
                    let inner = registry.find(wraps).ok_or(Error::NoVfs)?;
                    let fs = JailFs::new(mount.name.clone(), inner, root)?;
                    registry.register(Arc::new(fs), mount.default)?;
                }
                MountKind::Trace => {
                    let wraps = mount.options.wraps.as_deref().ok_or(Error::BadArg)?;
                    let inner = registry.find(wraps).ok_or(Error::NoVfs)?;
                    let fs = TraceFs::new(mount.name.clone(), inner);
                    registry.register(Arc::new(fs), mount.default)?;
                }
            }
        }
        Ok(())
    }
}
