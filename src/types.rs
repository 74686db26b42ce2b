//! Core value types shared by the index parser, the projection and the dispatcher.

use std::fmt;

/// Length in bytes of a git object hash.
pub const HASH_LEN: usize = 20;

/// Length of the hex representation of an object hash.
pub const HASH_HEX_LEN: usize = HASH_LEN * 2;

/// A 20-byte git object id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectHash(pub [u8; HASH_LEN]);

impl ObjectHash {
    pub const ZERO: ObjectHash = ObjectHash([0u8; HASH_LEN]);

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let array: [u8; HASH_LEN] = bytes.try_into().ok()?;
        Some(ObjectHash(array))
    }

    pub fn from_hex(text: &str) -> Option<Self> {
        let mut out = [0u8; HASH_LEN];
        hex::decode_to_slice(text, &mut out).ok()?;
        Some(ObjectHash(out))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

impl fmt::Debug for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHash({})", self.to_hex())
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Object type encoded in the top bits of an index entry's mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Regular,
    SymLink,
    GitLink,
    Invalid,
}

/// File type plus unix permission bits, decoded from the 32-bit index mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileTypeAndMode {
    pub file_type: FileType,
    pub mode: u16,
}

impl FileTypeAndMode {
    pub const REGULAR: FileTypeAndMode = FileTypeAndMode {
        file_type: FileType::Regular,
        mode: 0o644,
    };

    pub const EXECUTABLE: FileTypeAndMode = FileTypeAndMode {
        file_type: FileType::Regular,
        mode: 0o755,
    };

    pub const SYMLINK: FileTypeAndMode = FileTypeAndMode {
        file_type: FileType::SymLink,
        mode: 0,
    };

    pub fn from_raw(raw: u32) -> Self {
        let file_type = match (raw >> 12) & 0b1111 {
            0b1000 => FileType::Regular,
            0b1010 => FileType::SymLink,
            0b1110 => FileType::GitLink,
            _ => FileType::Invalid,
        };
        FileTypeAndMode {
            file_type,
            mode: (raw & 0o777) as u16,
        }
    }

    pub fn to_raw(self) -> u32 {
        let type_bits: u32 = match self.file_type {
            FileType::Regular => 0b1000,
            FileType::SymLink => 0b1010,
            FileType::GitLink => 0b1110,
            FileType::Invalid => 0,
        };
        (type_bits << 12) | u32::from(self.mode)
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type == FileType::SymLink
    }

    pub fn is_executable(&self) -> bool {
        self.file_type == FileType::Regular && self.mode & 0o111 != 0
    }
}

/// Index slot of an entry during an unresolved merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MergeStage {
    Normal = 0,
    Base = 1,
    Ours = 2,
    Theirs = 3,
}

impl MergeStage {
    pub fn from_flags(flags: u16) -> Self {
        match (flags >> 12) & 0b11 {
            1 => MergeStage::Base,
            2 => MergeStage::Ours,
            3 => MergeStage::Theirs,
            _ => MergeStage::Normal,
        }
    }

    /// Precedence used when several stages compete for the same projected path.
    /// A resolved entry always wins, then ours, theirs and finally the base.
    pub fn precedence(self) -> u8 {
        match self {
            MergeStage::Normal => 3,
            MergeStage::Ours => 2,
            MergeStage::Theirs => 1,
            MergeStage::Base => 0,
        }
    }

    pub fn is_conflict(self) -> bool {
        self != MergeStage::Normal
    }
}
