//! Streaming reader for the binary git index (versions 2, 3 and 4).

use crate::error::IndexError;
use crate::index::entry::{ParsedIndexEntry, PartMaterializer};
use crate::types::{FileTypeAndMode, MergeStage, ObjectHash, HASH_LEN};
use std::path::Path;
use tracing::debug;

pub const INDEX_SIGNATURE: &[u8; 4] = b"DIRC";
const HEADER_LEN: usize = 12;

/// Stat data (40 bytes) + hash (20 bytes) + flags (2 bytes).
const ENTRY_FIXED_LEN: usize = 40 + HASH_LEN + 2;
const MODE_OFFSET: usize = 24;
const HASH_OFFSET: usize = 40;
const FLAGS_OFFSET: usize = 60;

const FLAG_EXTENDED: u16 = 0x4000;
const FLAG_NAME_MASK: u16 = 0x0FFF;
const EXTENDED_SKIP_WORKTREE: u16 = 0x4000;

/// Read an index file into memory.
pub fn read_index_file(path: &Path) -> Result<Vec<u8>, IndexError> {
    Ok(std::fs::read(path)?)
}

/// Cursor over the records of an index buffer.
///
/// Records are delivered in on-disk order, which git keeps sorted by path.
pub struct IndexParser<'a> {
    data: &'a [u8],
    offset: usize,
    version: u32,
    entry_count: u32,
    entries_read: u32,
}

impl<'a> IndexParser<'a> {
    /// Validate the header and position the cursor at the first record.
    pub fn new(data: &'a [u8]) -> Result<Self, IndexError> {
        if data.len() < HEADER_LEN {
            return Err(IndexError::Truncated {
                offset: 0,
                needed: HEADER_LEN - data.len(),
            });
        }

        let mut signature = [0u8; 4];
        signature.copy_from_slice(&data[0..4]);
        if &signature != INDEX_SIGNATURE {
            return Err(IndexError::InvalidSignature(signature));
        }

        let version = read_u32(data, 4);
        if !(2..=4).contains(&version) {
            return Err(IndexError::UnsupportedVersion(version));
        }
        let entry_count = read_u32(data, 8);

        debug!(version, entry_count, "Opened index");

        Ok(Self {
            data,
            offset: HEADER_LEN,
            version,
            entry_count,
            entries_read: 0,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    pub fn entries_read(&self) -> u32 {
        self.entries_read
    }

    /// Parse the next record into `entry`. Returns `Ok(false)` once every
    /// declared entry has been read.
    pub fn read_next<M: PartMaterializer>(
        &mut self,
        entry: &mut ParsedIndexEntry<M>,
    ) -> Result<bool, IndexError> {
        if self.entries_read == self.entry_count {
            return Ok(false);
        }

        let start = self.offset;
        self.require(start, ENTRY_FIXED_LEN)?;
        let record = &self.data[start..];

        let raw_mode = read_u32(record, MODE_OFFSET);
        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(&record[HASH_OFFSET..HASH_OFFSET + HASH_LEN]);
        let flags = read_u16(record, FLAGS_OFFSET);

        let mut header_len = ENTRY_FIXED_LEN;
        let mut extended_flags = 0u16;
        if self.version >= 3 && flags & FLAG_EXTENDED != 0 {
            self.require(start, ENTRY_FIXED_LEN + 2)?;
            extended_flags = read_u16(record, ENTRY_FIXED_LEN);
            header_len += 2;
        }

        entry.hash = ObjectHash(hash);
        entry.type_and_mode = FileTypeAndMode::from_raw(raw_mode);
        entry.merge_stage = MergeStage::from_flags(flags);
        entry.skip_worktree = extended_flags & EXTENDED_SKIP_WORKTREE != 0;

        let path_start = start + header_len;
        if self.version == 4 {
            self.offset = self.read_compressed_path(path_start, entry)?;
        } else {
            self.offset = self.read_padded_path(start, header_len, flags, entry)?;
        }

        entry.parse_path();
        self.entries_read += 1;
        Ok(true)
    }

    /// Version 4: varint strip count, then a NUL-terminated suffix.
    fn read_compressed_path<M: PartMaterializer>(
        &self,
        path_start: usize,
        entry: &mut ParsedIndexEntry<M>,
    ) -> Result<usize, IndexError> {
        let (strip, suffix_start) = self.read_varint(path_start)?;
        let previous = entry.path_length();
        if strip > previous {
            return Err(IndexError::InvalidPrefixLength { strip, previous });
        }

        let nul = self.find_nul(suffix_start)?;
        entry.set_path(previous - strip, &self.data[suffix_start..nul])?;
        Ok(nul + 1)
    }

    /// Versions 2 and 3: the full path, NUL padded to a multiple of 8 bytes.
    fn read_padded_path<M: PartMaterializer>(
        &self,
        start: usize,
        header_len: usize,
        flags: u16,
        entry: &mut ParsedIndexEntry<M>,
    ) -> Result<usize, IndexError> {
        let path_start = start + header_len;
        let name_len = (flags & FLAG_NAME_MASK) as usize;
        let path_end = if name_len < FLAG_NAME_MASK as usize {
            self.require(path_start, name_len)?;
            path_start + name_len
        } else {
            self.find_nul(path_start)?
        };

        entry.set_full_path(&self.data[path_start..path_end])?;

        let path_len = path_end - path_start;
        let record_len = (header_len + path_len + 8) & !7;
        self.require(start, record_len)?;
        Ok(start + record_len)
    }

    /// Git's offset varint: each continuation adds one before shifting.
    fn read_varint(&self, mut at: usize) -> Result<(usize, usize), IndexError> {
        self.require(at, 1)?;
        let mut byte = self.data[at];
        at += 1;
        let mut value = (byte & 0x7F) as usize;
        while byte & 0x80 != 0 {
            self.require(at, 1)?;
            byte = self.data[at];
            at += 1;
            value = value
                .checked_add(1)
                .and_then(|v| v.checked_mul(1 << 7))
                .map(|v| v | (byte & 0x7F) as usize)
                .ok_or(IndexError::InvalidPrefixLength {
                    strip: usize::MAX,
                    previous: 0,
                })?;
        }
        Ok((value, at))
    }

    fn find_nul(&self, from: usize) -> Result<usize, IndexError> {
        self.data[from.min(self.data.len())..]
            .iter()
            .position(|b| *b == 0)
            .map(|pos| from + pos)
            .ok_or(IndexError::Truncated {
                offset: from,
                needed: 1,
            })
    }

    fn require(&self, at: usize, len: usize) -> Result<(), IndexError> {
        let available = self.data.len().saturating_sub(at);
        if available < len {
            return Err(IndexError::Truncated {
                offset: at,
                needed: len - available,
            });
        }
        Ok(())
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}
