use crate::error::{ErrorKind, Result};
use crate::models::{Artifact, BatchState, Download, Progress, Snapshot, SourceFile};
use crate::{FileKey, sanitize};
use exn::ResultExt;
use recast_codec::{DEFAULT_QUALITY, Format};
use recast_config::{Config, ResourcesConfig};
use recast_storage::backend::{LocalBackend, MemoryBackend};
use recast_storage::{BackendHandle, ResourceHandle};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::watch;

/// Tunables of a [`Session`], usually derived from a [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Initial target format.
    pub format: Format,
    pub quality: f32,
    /// Encodes in flight during a batch; `0` is treated as `1`.
    pub concurrency: usize,
    pub compression_level: u8,
    pub archive_name: String,
    /// Delay before a finished batch's progress drops back to zero.
    pub reset_delay: Duration,
}
impl Default for Options {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}
impl From<&Config> for Options {
    fn from(config: &Config) -> Self {
        Self {
            format: config.conversion.format,
            quality: config.conversion.quality,
            concurrency: config.conversion.concurrency,
            compression_level: config.archive.compression_level,
            archive_name: config.archive.file_name.clone(),
            reset_delay: config.progress.reset_delay(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) files: Vec<SourceFile>,
    pub(crate) names: HashMap<FileKey, String>,
    pub(crate) artifacts: Vec<Artifact>,
    pub(crate) format: Format,
    pub(crate) batch: BatchState,
    /// Bumped whenever the running batch (if any) is superseded.
    pub(crate) generation: u64,
}

impl State {
    pub(crate) fn contains(&self, key: &FileKey) -> bool {
        self.files.iter().any(|f| &f.key() == key)
    }

    /// The base name an artifact of `file` gets right now: its display name,
    /// or the original base name when that is blank, sanitized.
    pub(crate) fn display_name(&self, file: &SourceFile) -> String {
        let name = self.names.get(&file.key()).map(String::as_str).filter(|n| !n.trim().is_empty());
        sanitize(name.unwrap_or(file.base_name()), file.name())
    }

    /// Replace any artifact with the same key, returning the handle that must
    /// now be released.
    pub(crate) fn upsert(&mut self, artifact: Artifact) -> Option<ResourceHandle> {
        let superseded = self.take_artifact(&artifact.key).map(|old| old.handle);
        self.artifacts.push(artifact);
        superseded
    }

    pub(crate) fn take_artifact(&mut self, key: &FileKey) -> Option<Artifact> {
        let index = self.artifacts.iter().position(|a| &a.key == key)?;
        Some(self.artifacts.remove(index))
    }

    fn drain_handles(&mut self) -> Vec<ResourceHandle> {
        self.artifacts.drain(..).map(|a| a.handle).collect()
    }
}

pub(crate) struct Inner {
    pub(crate) state: RwLock<State>,
    pub(crate) backend: BackendHandle,
    pub(crate) options: Options,
    pub(crate) progress: watch::Sender<Progress>,
}

/// The authoritative state of one conversion session: source files, display
/// names, produced artifacts and batch progress.
///
/// Every operation takes the state lock once, computes the new values and
/// commits them before returning; the lock is never held across an `.await`.
/// Resource handles are released after the lock is dropped.
///
/// Cloning is cheap and yields another handle to the same session.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<Inner>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Arc::new(MemoryBackend::default()), Options::default())
    }
}

impl Session {
    pub fn new(backend: BackendHandle, options: Options) -> Self {
        let state = State { format: options.format, ..State::default() };
        let (progress, _) = watch::channel(Progress::default());
        Self { inner: Arc::new(Inner { state: RwLock::new(state), backend, options, progress }) }
    }

    /// Build a session with the resource backend named in the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend: BackendHandle = match &config.resources {
            ResourcesConfig::Memory => Arc::new(MemoryBackend::default()),
            ResourcesConfig::Local { path } => {
                Arc::new(LocalBackend::new("local", path).or_raise(|| ErrorKind::Config)?)
            },
        };
        Ok(Self::new(backend, Options::from(config)))
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.inner.backend
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, State> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push the batch progress to watchers. Called with the write lock held so
    /// that watchers observe updates in commit order.
    pub(crate) fn publish(&self, state: &State) {
        self.inner.progress.send_replace(state.batch.progress());
    }

    /// The one place handles are given back to the backend.
    pub(crate) fn release(&self, handles: impl IntoIterator<Item = ResourceHandle>) {
        for handle in handles {
            match self.inner.backend.release(&handle) {
                Ok(()) => tracing::debug!(handle = %handle, "Resource released"),
                Err(err) => {
                    let kind = &*err;
                    tracing::warn!(handle = %handle, error = %kind, "Resource could not be released");
                },
            }
        }
    }

    /// Merge files into the session by key. Files with a known key replace
    /// the existing entry in place; new keys are appended and get their
    /// original base name as display name.
    pub fn add_files(&self, files: impl IntoIterator<Item = SourceFile>) {
        let mut state = self.write();
        for file in files {
            let key = file.key();
            match state.files.iter().position(|f| f.key() == key) {
                Some(index) => state.files[index] = file,
                None => {
                    state.names.entry(key).or_insert_with(|| file.base_name().to_string());
                    state.files.push(file);
                },
            }
        }
        let State { files, names, .. } = &mut *state;
        names.retain(|key, _| files.iter().any(|f| &f.key() == key));
        tracing::debug!(files = state.files.len(), "Files added");
    }

    /// Remove a file along with its display name and artifact. No-op if the
    /// file is unknown.
    pub fn remove_file(&self, file: &SourceFile) {
        let key = file.key();
        let released = {
            let mut state = self.write();
            state.files.retain(|f| f.key() != key);
            state.names.remove(&key);
            state.take_artifact(&key).map(|a| a.handle)
        };
        self.release(released);
    }

    /// Drop everything, cancelling any running batch.
    pub fn clear_all(&self) {
        let released = {
            let mut state = self.write();
            state.generation += 1;
            state.files.clear();
            state.names.clear();
            state.batch = BatchState::default();
            self.publish(&state);
            state.drain_handles()
        };
        tracing::debug!(released = released.len(), "Session cleared");
        self.release(released);
    }

    /// Drop every artifact but keep files and names.
    pub fn clear_conversions(&self) {
        let released = self.write().drain_handles();
        self.release(released);
    }

    /// Applies to subsequent conversions only.
    pub fn set_target_format(&self, format: Format) {
        self.write().format = format;
    }

    pub fn target_format(&self) -> Format {
        self.read().format
    }

    /// Set a display name verbatim, as typed.
    pub fn set_custom_name(&self, file: &SourceFile, name: impl Into<String>) {
        self.write().names.insert(file.key(), name.into());
    }

    /// Sanitize and then set a display name, once editing is finished.
    pub fn commit_custom_name(&self, file: &SourceFile, name: &str) {
        self.write().names.insert(file.key(), sanitize(name, file.name()));
    }

    /// Acknowledge (`None`) or replace the last conversion error. Clearing
    /// also clears the failing key.
    pub fn set_conversion_error(&self, error: Option<String>) {
        let mut state = self.write();
        if error.is_none() {
            state.batch.failing_key = None;
        }
        state.batch.last_error = error;
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.read();
        Snapshot {
            files: state.files.clone(),
            names: state.names.clone(),
            artifacts: state.artifacts.clone(),
            target_format: state.format,
            batch: state.batch.clone(),
        }
    }

    /// Subscribe to batch progress updates.
    pub fn watch_progress(&self) -> watch::Receiver<Progress> {
        self.inner.progress.subscribe()
    }

    /// Bytes of the artifact produced for `key`.
    pub async fn download(&self, key: &FileKey) -> Result<Download> {
        let (filename, mime, handle) = {
            let state = self.read();
            let Some(artifact) = state.artifacts.iter().find(|a| &a.key == key) else {
                exn::bail!(ErrorKind::NotConverted(key.clone()));
            };
            (artifact.filename.clone(), artifact.mime(), artifact.handle.clone())
        };
        let bytes = self.inner.backend.fetch(&handle).await.or_raise(|| ErrorKind::Resource)?;
        Ok(Download { filename, mime, bytes })
    }

    pub(crate) fn quality(&self) -> f32 {
        let quality = self.inner.options.quality;
        if quality.is_nan() { DEFAULT_QUALITY } else { quality }
    }
}
