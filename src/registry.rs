//! Named-backend registry and API forwarding.
//!
//! A [`Registry`] owns an ordered list of backends and the current
//! default. One process-wide instance is reachable through
//! [`Registry::global`]; embedders that prefer explicit state can own as
//! many registries as they like. Dropping an owned registry unregisters
//! every backend in list order, delivering the unregister notification
//! to each.

use std::sync::{Arc, Mutex, OnceLock};

use tracing::debug;

use crate::error::{Error, VfsResult};
use crate::vfs::{
    CtrlCmd, CtrlReply, FileInfo, OpenFlags, Vfs, VfsDir, VfsFile,
};

static GLOBAL: OnceLock<Registry> = OnceLock::new();

#[derive(Default)]
struct State {
    /// Most recently registered first.
    backends: Vec<Arc<dyn Vfs>>,
    default: Option<String>,
}

impl State {
    fn position(&self, name: &str) -> Option<usize> {
        self.backends.iter().position(|vfs| vfs.name() == name)
    }
}

/// Registry of named backends with a default selector.
#[derive(Default)]
pub struct Registry {
    state: Mutex<State>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Registry::new)
    }

    /// Registers a backend under its own name.
    ///
    /// A duplicate name never replaces the registered backend; only its
    /// default-ness is adjusted. The first registration always becomes
    /// the default; later ones only with `make_default`. Demoting the
    /// current default promotes any other backend, if one exists.
    pub fn register(&self, vfs: Arc<dyn Vfs>, make_default: bool) -> VfsResult<()> {
        let mut state = self.state.lock().map_err(|_| Error::Fail)?;
        let name = vfs.name().to_owned();
        if name.is_empty() {
            return Err(Error::BadName);
        }

        if let Some(existing) = state.position(&name) {
            if make_default {
                state.default = Some(name);
            } else if state.default.as_deref() == Some(name.as_str()) {
                let other = state
                    .backends
                    .iter()
                    .enumerate()
                    .find(|(ix, _)| *ix != existing)
                    .map(|(_, vfs)| vfs.name().to_owned());
                if let Some(other) = other {
                    state.default = Some(other);
                }
            }
            return Ok(());
        }

        state.backends.insert(0, vfs);
        if state.backends.len() == 1 || make_default {
            state.default = Some(name.clone());
        }
        debug!(name = %name, default = make_default, "registered backend");
        Ok(())
    }

    /// Removes the named backend, delivering the unregister
    /// notification so it can release its resources. Removing the
    /// default promotes the list head.
    pub fn unregister(&self, name: &str) -> VfsResult<()> {
        let removed = {
            let mut state = self.state.lock().map_err(|_| Error::Fail)?;
            let ix = state.position(name).ok_or(Error::NoVfs)?;
            let removed = state.backends.remove(ix);
            if state.default.as_deref() == Some(name) {
                state.default = state.backends.first().map(|vfs| vfs.name().to_owned());
            }
            removed
        };
        // notified outside the registry lock; a missing ctrl handler is
        // not an error
        match removed.ctrl(CtrlCmd::Unregister) {
            Ok(_) | Err(Error::NoSupport) => {}
            Err(err) => return Err(err),
        }
        debug!(name, "unregistered backend");
        Ok(())
    }

    /// Finds a backend by exact name.
    pub fn find(&self, name: &str) -> Option<Arc<dyn Vfs>> {
        let state = self.state.lock().ok()?;
        let ix = state.position(name)?;
        Some(Arc::clone(&state.backends[ix]))
    }

    /// Resolves the named backend, or the default when `name` is
    /// `None`.
    pub fn get(&self, name: Option<&str>) -> VfsResult<Arc<dyn Vfs>> {
        match name {
            Some(name) => self.find(name).ok_or(Error::NoVfs),
            None => {
                let state = self.state.lock().map_err(|_| Error::Fail)?;
                let name = state.default.as_deref().ok_or(Error::NoVfs)?;
                let ix = state.position(name).ok_or(Error::NoVfs)?;
                Ok(Arc::clone(&state.backends[ix]))
            }
        }
    }

    /// Name of the current default backend.
    pub fn default_name(&self) -> Option<String> {
        self.state.lock().ok()?.default.clone()
    }

    /// Opens a file on the named (or default) backend.
    pub fn open(
        &self,
        vfs: Option<&str>,
        path: &str,
        flags: OpenFlags,
    ) -> VfsResult<Box<dyn VfsFile>> {
        self.get(vfs)?.open(checked(path)?, flags)
    }

    /// Stats a path on the named (or default) backend.
    pub fn stat(&self, vfs: Option<&str>, path: &str) -> VfsResult<FileInfo> {
        self.get(vfs)?.stat(checked(path)?)
    }

    /// Deletes a file on the named (or default) backend.
    pub fn delete(&self, vfs: Option<&str>, path: &str) -> VfsResult<()> {
        self.get(vfs)?.delete(checked(path)?)
    }

    /// Renames on the named (or default) backend.
    pub fn rename(&self, vfs: Option<&str>, from: &str, to: &str) -> VfsResult<()> {
        self.get(vfs)?.rename(checked(from)?, checked(to)?)
    }

    /// Creates one directory on the named (or default) backend.
    pub fn make_dir(&self, vfs: Option<&str>, path: &str) -> VfsResult<()> {
        self.get(vfs)?.make_dir(checked(path)?)
    }

    /// Creates every missing directory along `path`. A segment that
    /// stats as missing is created in place; this is the only error the
    /// walk recovers from.
    pub fn make_path(&self, vfs: Option<&str>, path: &str) -> VfsResult<()> {
        let backend = self.get(vfs)?;
        let path = checked(path)?;
        let (root_len, _) = backend.root_component(path);
        let mut prefix = path[..root_len].to_owned();

        for segment in crate::path::segments(&path[root_len..]) {
            if !prefix.is_empty() && prefix.len() > root_len {
                prefix.push(crate::path::DIR_SEP);
            }
            prefix.push_str(segment);
            match backend.stat(&prefix) {
                Ok(info) if info.is_dir => {}
                Ok(_) => return Err(Error::NoPath),
                Err(Error::NoFile | Error::NoPath) => backend.make_dir(&prefix)?,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Opens a directory on the named (or default) backend.
    pub fn open_dir(&self, vfs: Option<&str>, path: &str) -> VfsResult<Box<dyn VfsDir>> {
        self.get(vfs)?.open_dir(checked(path)?)
    }

    /// Current working directory of the named (or default) backend.
    pub fn get_cwd(&self, vfs: Option<&str>) -> VfsResult<String> {
        self.get(vfs)?.get_cwd()
    }

    /// Changes the working directory of the named (or default) backend.
    pub fn set_cwd(&self, vfs: Option<&str>, path: &str) -> VfsResult<()> {
        self.get(vfs)?.set_cwd(checked(path)?)
    }

    /// Control operation on the named (or default) backend.
    pub fn ctrl(&self, vfs: Option<&str>, cmd: CtrlCmd) -> VfsResult<CtrlReply> {
        self.get(vfs)?.ctrl(cmd)
    }

    fn teardown(&self) {
        loop {
            let name = {
                let Ok(state) = self.state.lock() else { return };
                match state.backends.first() {
                    Some(vfs) => vfs.name().to_owned(),
                    None => return,
                }
            };
            if self.unregister(&name).is_err() {
                return;
            }
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn checked(path: &str) -> VfsResult<&str> {
    if path.is_empty() {
        return Err(Error::BadArg);
    }
    Ok(path)
}
