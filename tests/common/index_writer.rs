//! Writes git index files for tests and benchmarks.

use sparsevfs::types::{ObjectHash, HASH_LEN};

#[derive(Debug, Clone)]
pub struct TestEntry {
    pub path: String,
    pub hash: ObjectHash,
    pub mode: u32,
    pub stage: u16,
    pub skip_worktree: bool,
}

impl TestEntry {
    pub fn file(path: &str, seed: u8) -> Self {
        Self {
            path: path.to_string(),
            hash: hash_for(seed),
            mode: 0o100644,
            stage: 0,
            skip_worktree: false,
        }
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn stage(mut self, stage: u16) -> Self {
        self.stage = stage;
        self
    }

    pub fn skip_worktree(mut self) -> Self {
        self.skip_worktree = true;
        self
    }
}

pub fn hash_for(seed: u8) -> ObjectHash {
    ObjectHash([seed; HASH_LEN])
}

/// Encode `entries` as an index of the given version (2, 3 or 4).
/// Entries are sorted by path and stage first, as git writes them.
pub fn encode_index(entries: &[TestEntry], version: u32) -> Vec<u8> {
    let mut entries = entries.to_vec();
    entries.sort_by(|a, b| (a.path.as_bytes(), a.stage).cmp(&(b.path.as_bytes(), b.stage)));

    let mut out = Vec::new();
    out.extend_from_slice(b"DIRC");
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(&(entries.len() as u32).to_be_bytes());

    let mut previous: Vec<u8> = Vec::new();
    for entry in &entries {
        let start = out.len();
        let path = entry.path.as_bytes();
        let extended = version >= 3 && entry.skip_worktree;

        let mut stat = [0u8; 40];
        stat[24..28].copy_from_slice(&entry.mode.to_be_bytes());
        out.extend_from_slice(&stat);
        out.extend_from_slice(entry.hash.as_bytes());

        let mut flags = (entry.stage << 12) | (path.len().min(0xFFF) as u16);
        if extended {
            flags |= 0x4000;
        }
        out.extend_from_slice(&flags.to_be_bytes());
        if extended {
            out.extend_from_slice(&0x4000u16.to_be_bytes());
        }

        if version == 4 {
            let common = previous
                .iter()
                .zip(path)
                .take_while(|(a, b)| a == b)
                .count();
            encode_varint(previous.len() - common, &mut out);
            out.extend_from_slice(&path[common..]);
            out.push(0);
        } else {
            out.extend_from_slice(path);
            let header_len = if extended { 64 } else { 62 };
            out.resize(start + ((header_len + path.len() + 8) & !7), 0);
        }
        previous = path.to_vec();
    }

    out.extend_from_slice(&[0u8; HASH_LEN]);
    out
}

fn encode_varint(mut value: usize, out: &mut Vec<u8>) {
    let mut buf = [0u8; 16];
    let mut pos = buf.len() - 1;
    buf[pos] = (value & 0x7F) as u8;
    value >>= 7;
    while value != 0 {
        value -= 1;
        pos -= 1;
        buf[pos] = 0x80 | (value & 0x7F) as u8;
        value >>= 7;
    }
    out.extend_from_slice(&buf[pos..]);
}
