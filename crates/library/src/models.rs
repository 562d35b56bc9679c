use crate::FileKey;
use crate::error::{ErrorKind, Result};
use crate::sanitize::strip_extension;
use exn::ResultExt;
use recast_codec::Format;
use recast_storage::ResourceHandle;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

const UNKNOWN_MIME: &str = "application/octet-stream";

/// Raw bytes plus a declared media type and original name, as handed over by
/// whatever picked the file. Immutable once added; cloning shares the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    name: String,
    mime: String,
    data: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self { name: name.into(), mime: mime.into(), data: data.into() }
    }

    /// Read a file from disk, declaring its media type from the extension.
    ///
    /// Files with an unrecognised extension are still accepted (declared as
    /// `application/octet-stream`) and will fail conversion with
    /// [`UnsupportedFormat`](recast_codec::error::ErrorKind::UnsupportedFormat).
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.or_raise(|| ErrorKind::Source(path.to_path_buf()))?;
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let mime = Format::from_path(path).map_or(UNKNOWN_MIME, |format| format.mime());
        Ok(Self::new(name, mime, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn data(&self) -> &Arc<[u8]> {
        &self.data
    }

    pub fn size(&self) -> u64 {
        // Infallible: a usize (either 32- or 64-bit) will always fit in a u64.
        u64::try_from(self.data.len()).unwrap_or(u64::MAX)
    }

    pub fn key(&self) -> FileKey {
        FileKey::of(self)
    }

    /// The original name without its extension; the default display name.
    pub fn base_name(&self) -> &str {
        strip_extension(&self.name)
    }
}

/// One produced output for a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub key: FileKey,
    pub source: SourceFile,
    /// Final file name, base plus extension.
    pub filename: String,
    pub handle: ResourceHandle,
    pub format: Format,
    pub size: u64,
}
impl Artifact {
    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }
}

/// Progress of the current (or most recently finished) batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchState {
    pub is_running: bool,
    pub current: usize,
    pub total: usize,
    /// Kept after the batch stops until acknowledged with
    /// [`Session::set_conversion_error`](crate::Session::set_conversion_error).
    pub last_error: Option<String>,
    pub failing_key: Option<FileKey>,
}
impl BatchState {
    pub fn progress(&self) -> Progress {
        Progress { current: self.current, total: self.total }
    }
}

/// Read-only copy of a session's state.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub files: Vec<SourceFile>,
    pub names: HashMap<FileKey, String>,
    pub artifacts: Vec<Artifact>,
    pub target_format: Format,
    pub batch: BatchState,
}
impl Snapshot {
    pub fn artifact(&self, key: &FileKey) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| &a.key == key)
    }

    pub fn name(&self, key: &FileKey) -> Option<&str> {
        self.names.get(key).map(String::as_str)
    }
}

/// A single converted image, ready to be saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub filename: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}
