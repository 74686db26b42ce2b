//! Bridges virtualization callbacks to the projection and the worker pool.
//!
//! Metadata decisions are made synchronously on the callback thread against
//! the in-memory projection. Anything that touches files or the content store
//! is wrapped in a [`WorkItem`] and queued.

use crate::config::VirtualizationConfig;
use crate::error::{AdmissionError, ProjectionError};
use crate::platform::PlatformFileSystem;
use crate::projection::{IndexProjection, Lookup, ProjectedKind};
use crate::types::{FileTypeAndMode, ObjectHash};
use crate::virtualization::callbacks::{BlobSizesConnection, ContentStore, FileSystemCallbacks};
use crate::virtualization::dot_git::{
    classify_changed, classify_deleted, is_path_inside_dot_git, is_special_git_file, DotGitFile,
};
use crate::virtualization::git_command::{GitCommandLineParser, GitLock, GitVerbs};
use crate::virtualization::placeholder::{
    hash_from_content_id, placeholder_version_from_provider_id, PLACEHOLDER_VERSION,
};
use crate::virtualization::pool::{
    FatalErrorHandler, ProcessExit, QueueStats, WorkItem, WorkerPool,
};
use crate::virtualization::provider::{
    FileSystemResult, PlaceholderFile, UpdateFailureCause, UpdateType, VirtualizationInstance,
};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const AREA: &str = "FileSystemVirtualizer";

/// Collaborators shared by the dispatcher and the work it queues.
pub struct VirtualizerContext {
    pub projection: Arc<IndexProjection>,
    pub instance: Arc<dyn VirtualizationInstance>,
    pub git_lock: Arc<dyn GitLock>,
    pub content_store: Arc<dyn ContentStore>,
    pub platform: Arc<dyn PlatformFileSystem>,
    /// Root of the virtualized working directory.
    pub working_directory: PathBuf,
}

impl VirtualizerContext {
    /// Create the placeholder for one projected child. Content store
    /// failures are reported as an I/O result rather than an error.
    fn write_placeholder(
        &self,
        connection: &dyn BlobSizesConnection,
        relative_path: &str,
        kind: &ProjectedKind,
    ) -> FileSystemResult {
        match kind {
            ProjectedKind::Folder => self.instance.write_placeholder_directory(relative_path),
            ProjectedKind::File {
                hash,
                type_and_mode,
            } if type_and_mode.is_symlink() => match self.content_store.read_blob(hash) {
                Ok(target) => self
                    .instance
                    .write_symlink(relative_path, &String::from_utf8_lossy(&target)),
                Err(err) => {
                    warn!(relative_path, error = %err, "Failed to read symlink target");
                    FileSystemResult::EIOError
                }
            },
            ProjectedKind::File {
                hash,
                type_and_mode,
            } => {
                let size = match self.blob_size(connection, hash) {
                    Ok(size) => size,
                    Err(err) => {
                        warn!(relative_path, error = %err, "Failed to look up blob size");
                        return FileSystemResult::EIOError;
                    }
                };
                let placeholder = PlaceholderFile::new(*hash, size, *type_and_mode);
                let result = self.instance.write_placeholder_file(relative_path, &placeholder);
                if result.is_success() && is_special_git_file(file_name(relative_path)) {
                    return self.write_contents(relative_path, hash);
                }
                result
            }
        }
    }

    fn blob_size(
        &self,
        connection: &dyn BlobSizesConnection,
        hash: &ObjectHash,
    ) -> anyhow::Result<u64> {
        match connection.try_get_size(hash)? {
            Some(size) => Ok(size),
            None => self.content_store.blob_size(hash),
        }
    }

    fn write_contents(&self, relative_path: &str, hash: &ObjectHash) -> FileSystemResult {
        match self.content_store.read_blob(hash) {
            Ok(bytes) => self.instance.write_file_contents(relative_path, &bytes),
            Err(err) => {
                warn!(relative_path, %hash, error = %err, "Failed to read blob");
                FileSystemResult::EIOError
            }
        }
    }
}

/// Parked work plus whether parking is still allowed.
#[derive(Default)]
struct DeferredQueue {
    items: VecDeque<WorkItem>,
    closed: bool,
}

pub struct FileSystemVirtualizer {
    context: Arc<VirtualizerContext>,
    callbacks: RwLock<Option<Arc<dyn FileSystemCallbacks>>>,
    pool: WorkerPool,
    deferred: Mutex<DeferredQueue>,
}

impl FileSystemVirtualizer {
    pub fn new(
        context: VirtualizerContext,
        worker_threads: usize,
        fatal_handler: Arc<dyn FatalErrorHandler>,
    ) -> Result<Self, AdmissionError> {
        Ok(Self {
            context: Arc::new(context),
            callbacks: RwLock::new(None),
            pool: WorkerPool::new(AREA, worker_threads, fatal_handler)?,
            deferred: Mutex::new(DeferredQueue::default()),
        })
    }

    /// Worker count from configuration; fatal worker errors exit the process.
    pub fn from_config(
        config: &VirtualizationConfig,
        context: VirtualizerContext,
    ) -> Result<Self, AdmissionError> {
        Self::new(context, config.effective_worker_threads(), Arc::new(ProcessExit))
    }

    pub fn context(&self) -> &VirtualizerContext {
        &self.context
    }

    /// Build the projection if needed, start the workers and then the
    /// virtualization instance.
    ///
    /// If the instance refuses to start, the workers are stopped again and
    /// the virtualizer cannot be restarted.
    pub fn try_start(&self, callbacks: Arc<dyn FileSystemCallbacks>) -> Result<(), AdmissionError> {
        self.context
            .projection
            .rebuild_if_needed()
            .map_err(|e| AdmissionError::StartFailed(e.to_string()))?;
        self.pool.start(callbacks.blob_sizes())?;
        *self.callbacks.write() = Some(callbacks);

        match self.context.instance.start(self.pool.worker_count()) {
            FileSystemResult::Success => {
                info!(area = AREA, "Virtualization started");
                Ok(())
            }
            other => {
                warn!(area = AREA, result = ?other, "Virtualization instance failed to start");
                *self.callbacks.write() = None;
                self.prepare_to_stop();
                Err(AdmissionError::StartFailed(format!(
                    "virtualization instance returned {other:?}"
                )))
            }
        }
    }

    /// Release parked work, stop admissions and wait for the queue to drain.
    pub fn prepare_to_stop(&self) {
        let parked: Vec<WorkItem> = {
            let mut deferred = self.deferred.lock();
            deferred.closed = true;
            deferred.items.drain(..).collect()
        };
        if !parked.is_empty() {
            info!(count = parked.len(), "Releasing deferred requests for shutdown");
        }
        for item in parked {
            if let Err(err) = self.pool.enqueue(item) {
                warn!(error = %err, "Dropped deferred request during shutdown");
            }
        }
        self.pool.prepare_to_stop();
    }

    pub fn stop(&self) -> FileSystemResult {
        self.context.instance.stop()
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = self.pool.stats();
        stats.deferred = self.deferred.lock().items.len();
        stats
    }

    pub fn clear_negative_path_cache(&self) -> Result<u32, FileSystemResult> {
        self.context.instance.clear_negative_path_cache()
    }

    /// False while a recognized git command other than add/stage, mv or
    /// status holds the lock.
    pub fn can_create_placeholder(&self) -> bool {
        let command = self.context.git_lock.locked_git_command();
        let parser = GitCommandLineParser::new(command.as_deref());
        !parser.is_valid_git_command() || parser.is_verb(GitVerbs::CAN_CREATE_PLACEHOLDER)
    }

    /// Queue parked placeholder work if the lock holder now allows it.
    /// Returns the number of released requests.
    pub fn on_git_command_completed(&self) -> usize {
        // Checked under the lock admissions park under.
        let mut deferred = self.deferred.lock();
        if !self.can_create_placeholder() {
            return 0;
        }
        let released = deferred.items.len();
        for item in deferred.items.drain(..) {
            if let Err(err) = self.pool.enqueue(item) {
                warn!(error = %err, "Failed to release deferred request");
            }
        }
        if released > 0 {
            debug!(released, "Released deferred requests");
        }
        released
    }

    pub fn delete_file(
        &self,
        relative_path: &str,
        flags: UpdateType,
    ) -> Result<(), UpdateFailureCause> {
        if is_path_inside_dot_git(relative_path) {
            return Err(UpdateFailureCause::NotSupported);
        }
        self.context.instance.delete_file(relative_path, flags)?;

        if let Some(callbacks) = self.callbacks() {
            let item = WorkItem::new(Some(relative_path.to_string()), |_| Ok(()))
                .with_cleanup(move || {
                    callbacks.invalidate_git_status_cache();
                    Ok(())
                });
            if let Err(err) = self.pool.enqueue(item) {
                debug!(relative_path, error = %err, "Skipped cleanup after delete");
            }
        }
        Ok(())
    }

    /// Compare an on-disk placeholder with what the projection expects.
    ///
    /// Matching content id and mode is a no-op. A content id that differs is
    /// a conflict for the caller to resolve. A mode-only difference is
    /// delegated to the virtualization instance.
    pub fn update_placeholder_if_needed(
        &self,
        relative_path: &str,
        content_id: &[u8],
        type_and_mode: Option<FileTypeAndMode>,
        flags: UpdateType,
    ) -> Result<(), UpdateFailureCause> {
        if is_path_inside_dot_git(relative_path) {
            return Err(UpdateFailureCause::NotSupported);
        }
        let (expected_hash, expected_mode) = self
            .context
            .projection
            .placeholder_file_data(relative_path)
            .ok_or(UpdateFailureCause::NotAPlaceholder)?;

        if hash_from_content_id(content_id) != Some(expected_hash) {
            debug!(relative_path, %expected_hash, "Placeholder content mismatch");
            return Err(UpdateFailureCause::ContentMismatch);
        }

        match type_and_mode {
            Some(actual) if actual != expected_mode => {
                let size = self
                    .context
                    .content_store
                    .blob_size(&expected_hash)
                    .map_err(|err| {
                        warn!(relative_path, error = %err, "Failed to look up blob size");
                        UpdateFailureCause::Provider(FileSystemResult::EIOError)
                    })?;
                let placeholder = PlaceholderFile::new(expected_hash, size, expected_mode);
                self.context
                    .instance
                    .update_placeholder_if_needed(relative_path, &placeholder, flags)
            }
            _ => Ok(()),
        }
    }

    /// Queue placeholder creation for every child of a projected folder.
    pub fn on_enumerate_directory(
        &self,
        command_id: u64,
        relative_path: &str,
    ) -> Result<FileSystemResult, AdmissionError> {
        match self.context.projection.lookup(relative_path) {
            Lookup::NotFound => return Ok(FileSystemResult::EFileNotFound),
            Lookup::File { .. } => return Ok(FileSystemResult::EInvalidOperation),
            Lookup::Folder { .. } => {}
        }

        let context = Arc::clone(&self.context);
        let path = relative_path.to_string();
        let result = Arc::new(Mutex::new(FileSystemResult::Success));
        let work_result = Arc::clone(&result);
        let item = WorkItem::new(Some(path.clone()), move |connection| {
            *work_result.lock() = enumerate_folder(&context, connection, &path)?;
            Ok(())
        });
        let item = self.with_completion(item, command_id, result);
        self.admit_placeholder_work(item)
    }

    /// Queue placeholder creation for a single projected path.
    pub fn on_write_placeholder(
        &self,
        command_id: u64,
        relative_path: &str,
    ) -> Result<FileSystemResult, AdmissionError> {
        let kind = match self.context.projection.lookup(relative_path) {
            Lookup::NotFound => return Ok(FileSystemResult::EFileNotFound),
            Lookup::Folder { .. } => ProjectedKind::Folder,
            Lookup::File {
                hash,
                type_and_mode,
            } => ProjectedKind::File {
                hash,
                type_and_mode,
            },
        };

        let context = Arc::clone(&self.context);
        let path = relative_path.to_string();
        let result = Arc::new(Mutex::new(FileSystemResult::Success));
        let work_result = Arc::clone(&result);
        let item = WorkItem::new(Some(path.clone()), move |connection| {
            *work_result.lock() = context.write_placeholder(connection, &path, &kind);
            Ok(())
        });
        let item = self.with_completion(item, command_id, result);
        self.admit_placeholder_work(item)
    }

    /// Queue hydration of a placeholder's content. Not subject to git
    /// command admission since no placeholder is created.
    pub fn on_get_file_stream(
        &self,
        command_id: u64,
        relative_path: &str,
        provider_id: &[u8],
        content_id: &[u8],
    ) -> Result<FileSystemResult, AdmissionError> {
        let version = placeholder_version_from_provider_id(provider_id);
        if version != Some(PLACEHOLDER_VERSION) {
            warn!(relative_path, ?version, "Unexpected placeholder version");
            return Ok(FileSystemResult::EIOError);
        }
        let Some(hash) = hash_from_content_id(content_id) else {
            warn!(relative_path, "Invalid placeholder content id");
            return Ok(FileSystemResult::EIOError);
        };

        let context = Arc::clone(&self.context);
        let path = relative_path.to_string();
        let result = Arc::new(Mutex::new(FileSystemResult::Success));
        let work_result = Arc::clone(&result);
        let item = WorkItem::new(Some(path.clone()), move |_| {
            *work_result.lock() = context.write_contents(&path, &hash);
            Ok(())
        });
        self.pool
            .enqueue(self.with_completion(item, command_id, result))?;
        Ok(FileSystemResult::Pending)
    }

    /// A directory appeared on disk. If the projection expects a folder there
    /// it becomes a placeholder again.
    pub fn on_new_directory_created(&self, relative_path: &str) -> FileSystemResult {
        if is_path_inside_dot_git(relative_path) {
            return FileSystemResult::Success;
        }
        match self.context.projection.lookup(relative_path) {
            Lookup::Folder { .. } => self
                .context
                .instance
                .convert_directory_to_placeholder(relative_path),
            _ => FileSystemResult::Success,
        }
    }

    /// Read the first byte of an on-disk file in the background.
    pub fn request_hydration(&self, relative_path: &str) -> Result<(), AdmissionError> {
        let context = Arc::clone(&self.context);
        let path = relative_path.to_string();
        self.pool.enqueue(WorkItem::new(Some(path.clone()), move |_| {
            let full_path = context.working_directory.join(&path);
            match context.platform.hydrate_file(&full_path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    debug!(relative_path = %path, "Skipped hydration of missing file");
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        }))
    }

    pub fn on_file_renamed(&self, source: &str, destination: &str, is_directory: bool) {
        let source_in_dot_git = is_path_inside_dot_git(source);
        let destination_in_dot_git = is_path_inside_dot_git(destination);

        if destination_in_dot_git {
            self.on_dot_git_file_changed(destination);
        }
        if source_in_dot_git && destination_in_dot_git {
            return;
        }
        if let Some(callbacks) = self.callbacks() {
            if is_directory {
                callbacks.on_folder_renamed(source, destination);
            } else {
                callbacks.on_file_renamed(source, destination);
            }
        }
    }

    pub fn on_file_deleted(&self, relative_path: &str, is_directory: bool) {
        if is_path_inside_dot_git(relative_path) {
            self.on_dot_git_file_deleted(relative_path);
        } else {
            self.on_working_directory_deleted(relative_path, is_directory);
        }
    }

    pub fn on_hard_link_created(&self, relative_target_path: &str, relative_new_link_path: &str) {
        if is_path_inside_dot_git(relative_new_link_path) {
            self.on_dot_git_file_changed(relative_new_link_path);
        } else if let Some(callbacks) = self.callbacks() {
            debug!(relative_target_path, relative_new_link_path, "Hard link created");
            callbacks.on_file_hard_link_created(relative_new_link_path);
        }
    }

    /// Route a write to a control file. An index change also invalidates the
    /// projection and queues a rebuild.
    pub fn on_dot_git_file_changed(&self, relative_path: &str) {
        let Some(file) = classify_changed(relative_path) else {
            return;
        };
        let Some(callbacks) = self.callbacks() else {
            debug!(relative_path, "Control file changed before start");
            return;
        };
        match file {
            DotGitFile::Index => {
                callbacks.on_index_file_change();
                self.context.projection.invalidate();
                self.queue_projection_rebuild();
            }
            DotGitFile::LogsHead => callbacks.on_logs_head_change(),
            DotGitFile::HeadOrLocalBranch => callbacks.on_head_or_ref_changed(),
            DotGitFile::Exclude => callbacks.on_exclude_file_changed(),
        }
    }

    fn on_dot_git_file_deleted(&self, relative_path: &str) {
        let (Some(file), Some(callbacks)) = (classify_deleted(relative_path), self.callbacks())
        else {
            return;
        };
        match file {
            DotGitFile::HeadOrLocalBranch => callbacks.on_head_or_ref_changed(),
            DotGitFile::Exclude => callbacks.on_exclude_file_changed(),
            DotGitFile::Index | DotGitFile::LogsHead => {}
        }
    }

    fn on_working_directory_deleted(&self, relative_path: &str, is_directory: bool) {
        let Some(callbacks) = self.callbacks() else {
            return;
        };
        if is_directory {
            // Folders git deletes itself are not user modifications.
            let command = self.context.git_lock.locked_git_command();
            if !GitCommandLineParser::new(command.as_deref()).is_valid_git_command() {
                callbacks.on_folder_deleted(relative_path);
            }
        } else {
            callbacks.on_file_deleted(relative_path);
        }
        callbacks.invalidate_git_status_cache();
    }

    fn queue_projection_rebuild(&self) {
        let projection = Arc::clone(&self.context.projection);
        let item = WorkItem::new(None, move |_| {
            projection.rebuild_if_needed()?;
            Ok(())
        });
        if let Err(err) = self.pool.enqueue(item) {
            debug!(error = %err, "Projection rebuild not queued");
        }
    }

    fn callbacks(&self) -> Option<Arc<dyn FileSystemCallbacks>> {
        self.callbacks.read().clone()
    }

    fn with_completion(
        &self,
        item: WorkItem,
        command_id: u64,
        result: Arc<Mutex<FileSystemResult>>,
    ) -> WorkItem {
        let instance = Arc::clone(&self.context.instance);
        item.with_cleanup(move || {
            let result = *result.lock();
            let completion = instance.complete_command(command_id, result);
            if !completion.is_success() {
                warn!(command_id, ?completion, "Failed to complete command");
            }
            Ok(())
        })
    }

    /// Queue placeholder-creating work, or park it while the current git
    /// command does not allow placeholder creation.
    fn admit_placeholder_work(&self, item: WorkItem) -> Result<FileSystemResult, AdmissionError> {
        let mut deferred = self.deferred.lock();
        if deferred.closed {
            return Err(AdmissionError::ShuttingDown);
        }
        if !self.pool.is_accepting() || self.can_create_placeholder() {
            self.pool.enqueue(item)?;
            return Ok(FileSystemResult::Pending);
        }

        debug!(
            relative_path = item.relative_path().unwrap_or(""),
            "Deferred placeholder creation while git command holds the lock"
        );
        deferred.items.push_back(item);
        Ok(FileSystemResult::Pending)
    }
}

/// Work body for directory enumeration.
fn enumerate_folder(
    context: &VirtualizerContext,
    connection: &dyn BlobSizesConnection,
    relative_path: &str,
) -> anyhow::Result<FileSystemResult> {
    let children = match context
        .projection
        .expand_folder(relative_path)
        .and_then(|_| context.projection.enumerate_children(relative_path))
    {
        Ok(children) => children,
        Err(ProjectionError::NotAFolder(_)) => return Ok(FileSystemResult::EFileNotFound),
        Err(err) => return Err(err.into()),
    };

    for child in children {
        let child_path = join_path(relative_path, &child.name);
        let result = context.write_placeholder(connection, &child_path, &child.kind);
        if !result.is_success() {
            debug!(relative_path = %child_path, ?result, "Placeholder creation failed");
            return Ok(result);
        }
    }
    Ok(FileSystemResult::Success)
}

fn join_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn file_name(relative_path: &str) -> &str {
    relative_path.rsplit('/').next().unwrap_or(relative_path)
}
