//! Collaborators the dispatcher notifies or pulls data from.

use crate::types::ObjectHash;

/// Reacts to filesystem and control-metadata changes. The dispatcher only
/// routes notifications here; it does not implement the reactions.
pub trait FileSystemCallbacks: Send + Sync {
    fn on_index_file_change(&self);
    fn on_logs_head_change(&self);
    fn on_head_or_ref_changed(&self);
    fn on_exclude_file_changed(&self);

    fn on_file_deleted(&self, relative_path: &str);
    fn on_folder_deleted(&self, relative_path: &str);
    fn on_file_renamed(&self, source: &str, destination: &str);
    fn on_folder_renamed(&self, source: &str, destination: &str);
    fn on_file_hard_link_created(&self, relative_new_link_path: &str);

    fn invalidate_git_status_cache(&self);

    fn blob_sizes(&self) -> std::sync::Arc<dyn BlobSizes>;
}

/// Factory for per-worker size lookup connections.
pub trait BlobSizes: Send + Sync {
    fn create_connection(&self) -> anyhow::Result<Box<dyn BlobSizesConnection>>;
}

/// A scoped size lookup connection. Held by one worker for its lifetime and
/// released when dropped.
pub trait BlobSizesConnection: Send + Sync {
    fn try_get_size(&self, hash: &ObjectHash) -> anyhow::Result<Option<u64>>;
}

/// Object content access used while hydrating and writing placeholders.
pub trait ContentStore: Send + Sync {
    fn blob_size(&self, hash: &ObjectHash) -> anyhow::Result<u64>;

    fn read_blob(&self, hash: &ObjectHash) -> anyhow::Result<Vec<u8>>;
}
