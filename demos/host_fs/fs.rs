//! Host-backed backend mirroring a directory of the local filesystem.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom as IoSeekFrom, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

use evfs::path::{self, PathStyle};
use evfs::vfs::{
    CtrlCmd, CtrlReply, DirEntry, FileInfo, InfoFields, OpenFlags, SeekFrom, Vfs, VfsDir,
    VfsFile,
};
use evfs::{Error, VfsResult};

/// A read/write backend rooted at a host directory.
pub struct HostFs {
    name: String,
    root: PathBuf,
    cwd: Mutex<String>,
    read_only: bool,
    style: PathStyle,
}

impl HostFs {
    pub fn new(name: impl Into<String>, root: PathBuf) -> Self {
        Self {
            name: name.into(),
            root,
            cwd: Mutex::new(String::from("/")),
            read_only: false,
            style: PathStyle::posix(),
        }
    }

    /// Rejects every write-intent open with [`Error::Disabled`].
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn host_path(&self, vpath: &str) -> VfsResult<PathBuf> {
        let cwd = self.cwd.lock().map_err(|_| Error::Fail)?;
        let abs = self.style.absolute(&cwd, vpath)?;
        drop(cwd);
        let mut real = self.root.clone();
        for seg in path::segments(&abs) {
            real.push(seg);
        }
        Ok(real)
    }
}

fn info_of(meta: &fs::Metadata) -> FileInfo {
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs());
    FileInfo { size: meta.len(), mtime, is_dir: meta.is_dir() }
}

impl Vfs for HostFs {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, vpath: &str, flags: OpenFlags) -> VfsResult<Box<dyn VfsFile>> {
        if self.read_only && flags.wants_write() {
            return Err(Error::Disabled);
        }
        let real = self.host_path(vpath)?;
        if real.is_dir() {
            return Err(Error::IsDir);
        }

        let mut opts = OpenOptions::new();
        opts.read(flags.contains(OpenFlags::READ) || !flags.wants_write());
        if flags.intersects(OpenFlags::WRITE | OpenFlags::OVERWRITE) {
            opts.write(true);
        }
        if flags.contains(OpenFlags::APPEND) {
            opts.append(true);
        }
        if flags.contains(OpenFlags::OPEN_OR_NEW) {
            opts.write(true).create(true);
        }
        if flags.contains(OpenFlags::NO_EXIST) {
            opts.write(true).create_new(true);
        }
        if flags.contains(OpenFlags::OVERWRITE) {
            opts.truncate(true);
        }

        let file = opts.open(&real).map_err(Error::from)?;
        Ok(Box::new(HostFile { file, pos: 0 }))
    }

    fn stat(&self, vpath: &str) -> VfsResult<FileInfo> {
        let meta = fs::metadata(self.host_path(vpath)?)?;
        Ok(info_of(&meta))
    }

    fn delete(&self, vpath: &str) -> VfsResult<()> {
        if self.read_only {
            return Err(Error::Disabled);
        }
        let real = self.host_path(vpath)?;
        if real.is_dir() {
            return Err(Error::IsDir);
        }
        fs::remove_file(real).map_err(Error::from)
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        if self.read_only {
            return Err(Error::Disabled);
        }
        fs::rename(self.host_path(from)?, self.host_path(to)?).map_err(Error::from)
    }

    fn make_dir(&self, vpath: &str) -> VfsResult<()> {
        if self.read_only {
            return Err(Error::Disabled);
        }
        fs::create_dir(self.host_path(vpath)?).map_err(Error::from)
    }

    fn open_dir(&self, vpath: &str) -> VfsResult<Box<dyn VfsDir>> {
        let real = self.host_path(vpath)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(real)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                info: info_of(&meta),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Box::new(HostDir { entries, next: 0 }))
    }

    fn get_cwd(&self) -> VfsResult<String> {
        Ok(self.cwd.lock().map_err(|_| Error::Fail)?.clone())
    }

    fn set_cwd(&self, vpath: &str) -> VfsResult<()> {
        let mut cwd = self.cwd.lock().map_err(|_| Error::Fail)?;
        let next = self.style.absolute(&cwd, vpath)?;
        *cwd = next;
        Ok(())
    }

    fn ctrl(&self, cmd: CtrlCmd) -> VfsResult<CtrlReply> {
        match cmd {
            CtrlCmd::GetStatFields | CtrlCmd::GetDirFields => Ok(CtrlReply::Fields(
                InfoFields::NAME | InfoFields::SIZE | InfoFields::MTIME | InfoFields::TYPE,
            )),
            CtrlCmd::Unregister => Ok(CtrlReply::None),
            _ => Err(Error::NoSupport),
        }
    }
}

struct HostFile {
    file: File,
    pos: u64,
}

impl VfsFile for HostFile {
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let n = self.file.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        let n = self.file.write(buf)?;
        self.pos = self.file.stream_position()?;
        Ok(n)
    }

    fn seek(&mut self, origin: SeekFrom) -> VfsResult<u64> {
        let size = self.file.metadata()?.len();
        self.pos = origin.resolve(self.pos, size);
        self.file.seek(IoSeekFrom::Start(self.pos))?;
        Ok(self.pos)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn size(&self) -> VfsResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn sync(&mut self) -> VfsResult<()> {
        self.file.sync_all().map_err(Error::from)
    }

    fn truncate(&mut self, size: u64) -> VfsResult<()> {
        self.file.set_len(size).map_err(Error::from)
    }

    fn eof(&self) -> bool {
        self.file.metadata().map(|m| self.pos >= m.len()).unwrap_or(true)
    }
}

struct HostDir {
    entries: Vec<DirEntry>,
    next: usize,
}

impl VfsDir for HostDir {
    fn read(&mut self) -> VfsResult<Option<&DirEntry>> {
        if self.next >= self.entries.len() {
            return Ok(None);
        }
        self.next += 1;
        Ok(self.entries.get(self.next - 1))
    }

    fn rewind(&mut self) -> VfsResult<()> {
        self.next = 0;
        Ok(())
    }
}
