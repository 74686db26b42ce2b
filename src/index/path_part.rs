//! Path segment interning
//!
//! Index paths repeat the same folder names thousands of times. While a new
//! projection is being built every segment goes through a [`PathPartInterner`]
//! so identical byte strings share one [`PathPart`], and the UTF-8 decode and
//! case folding of each distinct segment happen at most once.

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// An immutable path segment whose text is decoded on first use.
pub struct PathPart {
    bytes: Box<[u8]>,
    text: OnceLock<Box<str>>,
    folded: OnceLock<Box<str>>,
}

impl PathPart {
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.into(),
            text: OnceLock::new(),
            folded: OnceLock::new(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decoded segment text. Invalid UTF-8 is replaced rather than rejected.
    pub fn as_str(&self) -> &str {
        self.text
            .get_or_init(|| String::from_utf8_lossy(&self.bytes).into())
    }

    /// Case-folded key used for case-insensitive child lookups.
    pub fn folded(&self) -> &str {
        self.folded.get_or_init(|| fold_case(self.as_str()).into())
    }

    pub fn is_ascii(&self) -> bool {
        self.bytes.is_ascii()
    }

    pub fn eq_ignore_case(&self, other: &PathPart) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.is_ascii() && other.is_ascii() {
            return self.bytes.eq_ignore_ascii_case(&other.bytes);
        }
        self.folded() == other.folded()
    }
}

impl fmt::Debug for PathPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathPart").field(&self.as_str()).finish()
    }
}

impl fmt::Display for PathPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq for PathPart {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for PathPart {}

/// Case folding shared by every case-insensitive comparison in the projection.
pub fn fold_case(name: &str) -> String {
    if name.is_ascii() {
        name.to_ascii_lowercase()
    } else {
        name.to_lowercase()
    }
}

/// Deduplicates segment byte strings for the lifetime of a parse session.
#[derive(Default)]
pub struct PathPartInterner {
    parts: FxHashMap<Box<[u8]>, Arc<PathPart>>,
}

impl PathPartInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a segment and return the shared part
    pub fn intern(&mut self, bytes: &[u8]) -> Arc<PathPart> {
        if let Some(part) = self.parts.get(bytes) {
            return Arc::clone(part);
        }
        let part = Arc::new(PathPart::new(bytes));
        self.parts.insert(bytes.into(), Arc::clone(&part));
        part
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}
