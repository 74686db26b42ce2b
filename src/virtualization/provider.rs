//! Capability interface over the native virtualization API.
//!
//! One implementation exists per target platform. The dispatcher logic is
//! written once against this trait.

use crate::types::{FileTypeAndMode, ObjectHash};
use bitflags::bitflags;
use thiserror::Error;

/// Result code returned by the native virtualization layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileSystemResult {
    Success,
    /// The request was accepted and will be completed later through
    /// [`VirtualizationInstance::complete_command`].
    Pending,
    EInvalidArgs,
    EInvalidOperation,
    ENotSupported,
    EFileNotFound,
    EPathNotFound,
    EAccessDenied,
    EIOError,
    EDirectoryNotEmpty,
    EVirtualizationInvalidOperation,
}

impl FileSystemResult {
    pub fn is_success(self) -> bool {
        self == FileSystemResult::Success
    }
}

/// Why a placeholder update or delete was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UpdateFailureCause {
    #[error("path is not a placeholder")]
    NotAPlaceholder,
    #[error("placeholder content does not match the index")]
    ContentMismatch,
    #[error("placeholder has dirty metadata")]
    DirtyMetadata,
    #[error("placeholder has dirty data")]
    DirtyData,
    #[error("file is fully hydrated")]
    FullFile,
    #[error("file is read-only")]
    ReadOnly,
    #[error("access denied")]
    AccessDenied,
    #[error("operation not supported for this path")]
    NotSupported,
    #[error("virtualization layer returned {0:?}")]
    Provider(FileSystemResult),
}

bitflags! {
    /// Which kinds of local state an update or delete may discard.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UpdateType: u32 {
        const ALLOW_DIRTY_METADATA = 0x0000_0001;
        const ALLOW_DIRTY_DATA = 0x0000_0002;
        const ALLOW_TOMBSTONE = 0x0000_0004;
        const ALLOW_READ_ONLY = 0x0000_0020;
    }
}

/// Everything a file placeholder carries besides its path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderFile {
    pub provider_id: Vec<u8>,
    pub content_id: Vec<u8>,
    pub file_size: u64,
    pub type_and_mode: FileTypeAndMode,
}

impl PlaceholderFile {
    pub fn new(hash: ObjectHash, file_size: u64, type_and_mode: FileTypeAndMode) -> Self {
        Self {
            provider_id: crate::virtualization::placeholder::placeholder_version_id().to_vec(),
            content_id: crate::virtualization::placeholder::content_id_from_hash(&hash),
            file_size,
            type_and_mode,
        }
    }
}

/// Provider adapter surface. All paths are relative to the virtualization
/// root and use `/` as separator.
pub trait VirtualizationInstance: Send + Sync {
    fn start(&self, pool_thread_count: usize) -> FileSystemResult;

    fn stop(&self) -> FileSystemResult;

    fn write_placeholder_directory(&self, relative_path: &str) -> FileSystemResult;

    fn write_placeholder_file(
        &self,
        relative_path: &str,
        placeholder: &PlaceholderFile,
    ) -> FileSystemResult;

    fn write_symlink(&self, relative_path: &str, target: &str) -> FileSystemResult;

    fn update_placeholder_if_needed(
        &self,
        relative_path: &str,
        placeholder: &PlaceholderFile,
        flags: UpdateType,
    ) -> Result<(), UpdateFailureCause>;

    fn delete_file(&self, relative_path: &str, flags: UpdateType)
        -> Result<(), UpdateFailureCause>;

    fn write_file_contents(&self, relative_path: &str, contents: &[u8]) -> FileSystemResult;

    fn complete_command(&self, command_id: u64, result: FileSystemResult) -> FileSystemResult;

    fn convert_directory_to_placeholder(&self, relative_path: &str) -> FileSystemResult;

    /// Returns the number of entries that were in the cache.
    fn clear_negative_path_cache(&self) -> Result<u32, FileSystemResult>;
}
