//! Virtualization dispatcher
//!
//! Receives callbacks from the native virtualization layer, answers metadata
//! questions from the projection, and runs file and network work on a fixed
//! worker pool.

pub mod callbacks;
pub mod dispatcher;
pub mod dot_git;
pub mod git_command;
pub mod placeholder;
pub mod pool;
pub mod provider;

pub use callbacks::{BlobSizes, BlobSizesConnection, ContentStore, FileSystemCallbacks};
pub use dispatcher::{FileSystemVirtualizer, VirtualizerContext};
pub use git_command::{GitCommandLineParser, GitLock, GitVerbs};
pub use placeholder::{
    content_id_from_hash, hash_from_content_id, placeholder_version_id, PLACEHOLDER_VERSION,
};
pub use pool::{
    FatalErrorHandler, PoolState, ProcessExit, QueueStats, WorkItem, WorkPhase, WorkerFailure,
    WorkerPool,
};
pub use provider::{
    FileSystemResult, PlaceholderFile, UpdateFailureCause, UpdateType, VirtualizationInstance,
};
