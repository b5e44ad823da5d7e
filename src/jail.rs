//! Jail shim: a backend that confines another backend to a subtree.
//!
//! Every path entering the shim is resolved against the shim's own CWD,
//! normalized inside the virtual root `/`, and re-rooted under the jail
//! prefix before the inner backend sees it. Because `..` collapses while
//! the path is still confined to the virtual root, no input can escape
//! the jail.

use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::error::{Error, VfsResult};
use crate::path::{self, PathStyle};
use crate::vfs::{CtrlCmd, CtrlReply, FileInfo, OpenFlags, Vfs, VfsDir, VfsFile};

/// The jail shim backend.
pub struct JailFs {
    name: String,
    inner: Arc<dyn Vfs>,
    jail_root: String,
    /// Shim-local CWD relative to the virtual root. Its lock also
    /// serialises the shared translation state.
    cwd: Mutex<String>,
    style: PathStyle,
}

impl JailFs {
    /// Wraps `inner`, confining all paths to `jail_root` (an absolute
    /// path on the inner backend).
    pub fn new(
        name: impl Into<String>,
        inner: Arc<dyn Vfs>,
        jail_root: &str,
    ) -> VfsResult<Self> {
        let style = PathStyle::posix();
        if !style.is_absolute(jail_root) {
            return Err(Error::BadArg);
        }
        let jail_root = style.normalize(jail_root)?;
        Ok(Self {
            name: name.into(),
            inner,
            jail_root,
            cwd: Mutex::new(String::from("/")),
            style,
        })
    }

    /// The subtree all translated paths are confined to.
    pub fn jail_root(&self) -> &str {
        &self.jail_root
    }

    /// Maps a virtual path into the jailed subtree of the inner backend.
    fn translate(&self, vpath: &str) -> VfsResult<String> {
        let cwd = self.cwd.lock().map_err(|_| Error::Fail)?;
        let virt = self.style.absolute(&cwd, vpath)?;
        drop(cwd);
        // strip the virtual root so the jail prefix and the confined
        // remainder concatenate; the inner root collapses into the jail
        let confined = virt.trim_start_matches(path::is_sep);
        let joined = self.style.join(&self.jail_root, confined)?;
        let real = self.style.normalize(&joined)?;
        trace!(virt = %virt, real = %real, "jail path translation");
        Ok(real)
    }
}

impl Vfs for JailFs {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: &str, flags: OpenFlags) -> VfsResult<Box<dyn VfsFile>> {
        self.inner.open(&self.translate(path)?, flags)
    }

    fn stat(&self, path: &str) -> VfsResult<FileInfo> {
        self.inner.stat(&self.translate(path)?)
    }

    fn delete(&self, path: &str) -> VfsResult<()> {
        self.inner.delete(&self.translate(path)?)
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        self.inner.rename(&self.translate(from)?, &self.translate(to)?)
    }

    fn make_dir(&self, path: &str) -> VfsResult<()> {
        self.inner.make_dir(&self.translate(path)?)
    }

    fn open_dir(&self, path: &str) -> VfsResult<Box<dyn VfsDir>> {
        self.inner.open_dir(&self.translate(path)?)
    }

    fn get_cwd(&self) -> VfsResult<String> {
        Ok(self.cwd.lock().map_err(|_| Error::Fail)?.clone())
    }

    fn set_cwd(&self, path: &str) -> VfsResult<()> {
        let mut cwd = self.cwd.lock().map_err(|_| Error::Fail)?;
        let next = self.style.absolute(&cwd, path)?;
        *cwd = next;
        Ok(())
    }

    fn ctrl(&self, cmd: CtrlCmd) -> VfsResult<CtrlReply> {
        match cmd {
            // release shim state only; the inner backend's lifecycle
            // stays under registry control
            CtrlCmd::Unregister => {
                let mut cwd = self.cwd.lock().map_err(|_| Error::Fail)?;
                cwd.clear();
                cwd.push('/');
                Ok(CtrlReply::None)
            }
            CtrlCmd::JailGetRoot => Ok(CtrlReply::Path(self.jail_root.clone())),
            other => self.inner.ctrl(other),
        }
    }
}
