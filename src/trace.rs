//! Trace shim: a backend that wraps another backend and emits a
//! `tracing` event for every operation passing through it.
//!
//! Unlike the jail shim, handles are wrapped one deep so stream
//! operations trace too; dropping the wrapper releases the inner handle.

use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, VfsResult};
use crate::vfs::{
    CtrlCmd, CtrlReply, DirEntry, FileInfo, OpenFlags, SeekFrom, Vfs, VfsDir, VfsFile,
};

/// The trace shim backend.
pub struct TraceFs {
    name: String,
    inner: Arc<dyn Vfs>,
}

impl TraceFs {
    /// Wraps `inner`; every forwarded operation is logged under the
    /// shim's own name.
    pub fn new(name: impl Into<String>, inner: Arc<dyn Vfs>) -> Self {
        Self { name: name.into(), inner }
    }

    fn event(&self, op: &str, path: &str, result: &VfsResult<()>) {
        match result {
            Ok(()) => debug!(shim = %self.name, op, path, "vfs op"),
            Err(err) => debug!(shim = %self.name, op, path, error = %err, "vfs op failed"),
        }
    }

    fn trace<T>(&self, op: &str, path: &str, result: VfsResult<T>) -> VfsResult<T> {
        self.event(op, path, &result.as_ref().map(|_| ()).map_err(|&err| err));
        result
    }
}

impl Vfs for TraceFs {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: &str, flags: OpenFlags) -> VfsResult<Box<dyn VfsFile>> {
        let result = self.trace("open", path, self.inner.open(path, flags));
        result.map(|file| {
            Box::new(TraceFile { shim: self.name.clone(), path: path.to_owned(), file })
                as Box<dyn VfsFile>
        })
    }

    fn stat(&self, path: &str) -> VfsResult<FileInfo> {
        self.trace("stat", path, self.inner.stat(path))
    }

    fn delete(&self, path: &str) -> VfsResult<()> {
        self.trace("delete", path, self.inner.delete(path))
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        self.trace("rename", from, self.inner.rename(from, to))
    }

    fn make_dir(&self, path: &str) -> VfsResult<()> {
        self.trace("make_dir", path, self.inner.make_dir(path))
    }

    fn open_dir(&self, path: &str) -> VfsResult<Box<dyn VfsDir>> {
        let result = self.trace("open_dir", path, self.inner.open_dir(path));
        result.map(|dir| Box::new(TraceDir { dir }) as Box<dyn VfsDir>)
    }

    fn get_cwd(&self) -> VfsResult<String> {
        self.trace("get_cwd", "", self.inner.get_cwd())
    }

    fn set_cwd(&self, path: &str) -> VfsResult<()> {
        self.trace("set_cwd", path, self.inner.set_cwd(path))
    }

    fn ctrl(&self, cmd: CtrlCmd) -> VfsResult<CtrlReply> {
        // the shim owns no state worth releasing; the inner backend's
        // lifecycle stays under registry control
        if cmd == CtrlCmd::Unregister {
            return Ok(CtrlReply::None);
        }
        self.trace("ctrl", "", self.inner.ctrl(cmd))
    }

    fn root_component(&self, path: &str) -> (usize, bool) {
        self.inner.root_component(path)
    }
}

/// One-deep file wrapper; stream operations trace and forward.
struct TraceFile {
    shim: String,
    path: String,
    file: Box<dyn VfsFile>,
}

impl VfsFile for TraceFile {
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let result = self.file.read(buf);
        match &result {
            Ok(n) => debug!(shim = %self.shim, path = %self.path, bytes = *n, "read"),
            Err(err) => debug!(shim = %self.shim, path = %self.path, error = %err, "read failed"),
        }
        result
    }

    fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        let result = self.file.write(buf);
        match &result {
            Ok(n) => debug!(shim = %self.shim, path = %self.path, bytes = *n, "write"),
            Err(err) => debug!(shim = %self.shim, path = %self.path, error = %err, "write failed"),
        }
        result
    }

    fn seek(&mut self, origin: SeekFrom) -> VfsResult<u64> {
        let result = self.file.seek(origin);
        if let Ok(pos) = &result {
            debug!(shim = %self.shim, path = %self.path, pos = *pos, "seek");
        }
        result
    }

    fn tell(&self) -> u64 {
        self.file.tell()
    }

    fn size(&self) -> VfsResult<u64> {
        self.file.size()
    }

    fn sync(&mut self) -> VfsResult<()> {
        self.file.sync()
    }

    fn truncate(&mut self, size: u64) -> VfsResult<()> {
        let result = self.file.truncate(size);
        debug!(shim = %self.shim, path = %self.path, size, "truncate");
        result
    }

    fn eof(&self) -> bool {
        self.file.eof()
    }

    fn ctrl(&mut self, cmd: CtrlCmd) -> VfsResult<CtrlReply> {
        self.file.ctrl(cmd)
    }
}

/// One-deep directory wrapper.
struct TraceDir {
    dir: Box<dyn VfsDir>,
}

impl VfsDir for TraceDir {
    fn read(&mut self) -> VfsResult<Option<&DirEntry>> {
        self.dir.read()
    }

    fn rewind(&mut self) -> VfsResult<()> {
        self.dir.rewind()
    }
}
