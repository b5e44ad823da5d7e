//! ROMFS on-disk records: superblock and file headers.
//!
//! All multi-byte integers are big-endian and every record is aligned to
//! a 16-byte boundary. A record checksums to zero when its big-endian
//! 32-bit words are summed modulo 2^32.

use byteorder::{BigEndian, ByteOrder};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

use crate::error::{Error, VfsResult};
use crate::source::ByteSource;

/// Magic stamp opening every ROMFS image.
pub const MAGIC: &[u8; 8] = b"-rom1fs-";

/// Record alignment in bytes.
pub const ALIGNMENT: u64 = 16;

/// Maximum file/volume name length.
pub const MAX_NAME: usize = 128;

/// The superblock checksum covers at most this many leading bytes.
pub const CHECKSUM_SPAN: usize = 512;

/// Rounds `off` up to the next record boundary.
pub fn align_up(off: u64) -> u64 {
    (off + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Sum of the big-endian 32-bit words of `bytes` modulo 2^32; a trailing
/// partial word is zero-padded.
pub fn words_sum(bytes: &[u8]) -> u32 {
    let mut sum = 0u32;
    let mut chunks = bytes.chunks_exact(4);
    for chunk in &mut chunks {
        sum = sum.wrapping_add(BigEndian::read_u32(chunk));
    }
    let rem = chunks.remainder();
    if !rem.is_empty() {
        let mut word = [0u8; 4];
        word[..rem.len()].copy_from_slice(rem);
        sum = sum.wrapping_add(BigEndian::read_u32(&word));
    }
    sum
}

/// Entry type stored in the low nibble of the `next` field.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive)]
pub enum FileKind {
    /// Alias for another header; `spec_info` holds the target offset.
    HardLink = 0,
    /// Directory; `spec_info` holds the first child header offset.
    Directory = 1,
    /// Regular file.
    File = 2,
    /// Symbolic link; the data bytes hold the target path.
    Symlink = 3,
    BlockDev = 4,
    CharDev = 5,
    Socket = 6,
    Fifo = 7,
}

/// Validated superblock of a mounted image.
#[derive(Debug, Clone)]
pub struct Superblock {
    /// Declared filesystem size in bytes.
    pub fs_size: u32,
    /// NUL-padded volume label.
    pub volume: String,
    /// Offset of the root directory's first header.
    pub root_offset: u32,
}

impl Superblock {
    /// Reads and validates the superblock: magic, declared size against
    /// the source, and the zero word-sum over the checksum span.
    pub fn read(source: &dyn ByteSource) -> VfsResult<Self> {
        let available = source.len();
        if available < ALIGNMENT + 1 {
            return Err(Error::Invalid);
        }
        let span = CHECKSUM_SPAN.min(available as usize);
        let mut block = vec![0u8; span];
        source.read_exact_at(0, &mut block).map_err(|_| Error::Invalid)?;

        if &block[..MAGIC.len()] != MAGIC {
            return Err(Error::Invalid);
        }
        let fs_size = BigEndian::read_u32(&block[8..12]);
        if u64::from(fs_size) > available {
            return Err(Error::Invalid);
        }
        let sum_span = span.min(fs_size as usize);
        if words_sum(&block[..sum_span]) != 0 {
            return Err(Error::Invalid);
        }

        let name_area = &block[ALIGNMENT as usize..];
        let name_len = name_area
            .iter()
            .position(|&b| b == 0)
            .filter(|&n| n <= MAX_NAME)
            .ok_or(Error::Invalid)?;
        let volume = std::str::from_utf8(&name_area[..name_len])
            .map_err(|_| Error::Invalid)?
            .to_owned();
        let root_offset = align_up(ALIGNMENT + name_len as u64 + 1) as u32;

        Ok(Self { fs_size, volume, root_offset })
    }
}

/// One parsed file header.
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Offset of the header itself.
    pub offset: u32,
    /// Offset of the next sibling header; 0 terminates the chain.
    pub next: u32,
    pub kind: FileKind,
    /// Execute permission bit from the type nibble.
    pub executable: bool,
    /// Type-dependent: link target, first child, or device numbers.
    pub spec_info: u32,
    /// Payload size in bytes.
    pub size: u32,
    pub checksum: u32,
    /// NUL-terminated entry name.
    pub name: String,
}

impl FileHeader {
    /// Reads the header record at `offset`.
    pub fn read(source: &dyn ByteSource, offset: u32) -> VfsResult<Self> {
        let mut fixed = [0u8; 16];
        source.read_exact_at(u64::from(offset), &mut fixed)?;
        let next_raw = BigEndian::read_u32(&fixed[0..4]);
        let kind = FileKind::from_u32(next_raw & 0x7).ok_or(Error::Corrupt)?;

        let mut name_bytes = Vec::new();
        let mut chunk = [0u8; ALIGNMENT as usize];
        let mut pos = u64::from(offset) + 16;
        loop {
            source.read_exact_at(pos, &mut chunk)?;
            match chunk.iter().position(|&b| b == 0) {
                Some(end) => {
                    name_bytes.extend_from_slice(&chunk[..end]);
                    break;
                }
                None => name_bytes.extend_from_slice(&chunk),
            }
            if name_bytes.len() > MAX_NAME {
                return Err(Error::Corrupt);
            }
            pos += ALIGNMENT;
        }
        let name = String::from_utf8(name_bytes).map_err(|_| Error::Corrupt)?;

        Ok(Self {
            offset,
            next: next_raw & !0xF,
            kind,
            executable: next_raw & 0x8 != 0,
            spec_info: BigEndian::read_u32(&fixed[4..8]),
            size: BigEndian::read_u32(&fixed[8..12]),
            checksum: BigEndian::read_u32(&fixed[12..16]),
            name,
        })
    }

    /// Length of the header record including the padded name.
    pub fn header_len(&self) -> u64 {
        16 + align_up(self.name.len() as u64 + 1)
    }

    /// Offset of the payload following the header record.
    pub fn data_offset(&self) -> u64 {
        u64::from(self.offset) + self.header_len()
    }

    /// Whether the entry is a directory for listing purposes (hard links
    /// carry the directory bit so `.`/`..` list as directories).
    pub fn dir_bit(&self) -> bool {
        matches!(self.kind, FileKind::Directory | FileKind::HardLink)
    }

    /// Verifies the record checksum: the big-endian word sum over the
    /// header and its padded name must be zero.
    pub fn verify(&self, source: &dyn ByteSource) -> VfsResult<()> {
        let span = self.header_len() as usize;
        let mut record = vec![0u8; span];
        source.read_exact_at(u64::from(self.offset), &mut record)?;
        if words_sum(&record) != 0 {
            return Err(Error::Corrupt);
        }
        Ok(())
    }
}
