//! Random-access byte sources backing the image filesystems.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom as IoSeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{Error, VfsResult};

/// Offset-addressed read access with a known total size.
///
/// Reads past the end are clamped; a read at or past the end returns 0.
pub trait ByteSource: Send + Sync {
    /// Reads up to `buf.len()` bytes at `offset`, returning the count.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize>;

    /// Total size of the source in bytes.
    fn len(&self) -> u64;

    /// Whether the source is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fills `buf` completely or reports [`Error::Corrupt`].
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<()> {
        let mut done = 0;
        while done < buf.len() {
            let n = self.read_at(offset + done as u64, &mut buf[done..])?;
            if n == 0 {
                return Err(Error::Corrupt);
            }
            done += n;
        }
        Ok(())
    }
}

/// A complete filesystem image held in memory and shared by reference.
pub struct MemSource {
    data: Arc<[u8]>,
}

impl MemSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data: data.into() }
    }

    /// The shared image buffer.
    pub fn image(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }
}

impl From<Arc<[u8]>> for MemSource {
    fn from(data: Arc<[u8]>) -> Self {
        Self { data }
    }
}

impl ByteSource for MemSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let len = self.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min((len - offset) as usize);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

/// An image file on the host, read with seek+read under a lock.
pub struct FileSource {
    file: Mutex<File>,
    len: u64,
}

impl FileSource {
    /// Opens `path` read-only and records its current length.
    pub fn open(path: &Path) -> VfsResult<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file: Mutex::new(file), len })
    }
}

impl ByteSource for FileSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        let n = buf.len().min((self.len - offset) as usize);
        let mut file = self.file.lock().map_err(|_| Error::Fail)?;
        file.seek(IoSeekFrom::Start(offset))?;
        let mut done = 0;
        while done < n {
            let count = file.read(&mut buf[done..n])?;
            if count == 0 {
                break;
            }
            done += count;
        }
        Ok(done)
    }

    fn len(&self) -> u64 {
        self.len
    }
}
