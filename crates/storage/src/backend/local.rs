//! Local filesystem resource backend.
//!
//! Spills every acquired resource into its own file under a configured
//! directory, keeping only the handle → path mapping in memory. Reads and
//! writes go through `tokio::fs`; releasing deletes the file synchronously.

use super::{read_lock, write_lock};
use crate::error::{ErrorKind, Result};
use crate::{ResourceBackend, ResourceHandle};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::{create_dir_all as sync_create_dir, remove_file as sync_remove_file};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

/// Local filesystem resource backend.
///
/// # Examples
///
/// ```no_run
/// use recast_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("spill", "/var/tmp/recast")?;
/// # Ok(())
/// # }
/// ```
pub struct LocalBackend {
    name: String,
    /// Directory holding one file per live resource
    root: PathBuf,
    next_id: AtomicU64,
    files: RwLock<HashMap<ResourceHandle, PathBuf>>,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Arguments
    /// * `root` - Absolute path to the spill directory, created if missing
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists but is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Only happens once on session construction; not worth an async constructor.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }

        Ok(Self {
            name: name.into(),
            root,
            next_id: AtomicU64::new(1),
            files: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the file behind a live handle.
    pub fn path_of(&self, handle: &ResourceHandle) -> Option<PathBuf> {
        read_lock(&self.files).get(handle).cloned()
    }

    fn file_name(id: u64, mime: &str) -> String {
        let extension = mime
            .split_once('/')
            .map(|(_, subtype)| subtype)
            .filter(|subtype| !subtype.is_empty() && subtype.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("bin");
        format!("{id}.{}", extension.to_ascii_lowercase())
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }
}

#[async_trait]
impl ResourceBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn acquire(&self, data: Vec<u8>, mime: &str) -> Result<ResourceHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = ResourceHandle::mint(&self.name, id);
        let path = self.root.join(Self::file_name(id, mime));
        fs::write(&path, &data).await.map_err(|e| Self::map_io_error(e, &path))?;
        tracing::trace!(handle = %handle, path = %path.display(), bytes = data.len(), "Resource spilled to disk");
        write_lock(&self.files).insert(handle.clone(), path);
        Ok(handle)
    }

    async fn fetch(&self, handle: &ResourceHandle) -> Result<Vec<u8>> {
        let Some(path) = self.path_of(handle) else {
            exn::bail!(ErrorKind::NotFound(handle.clone()));
        };
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => exn::bail!(ErrorKind::NotFound(handle.clone())),
            Err(e) => Err(Self::map_io_error(e, &path).into()),
        }
    }

    fn release(&self, handle: &ResourceHandle) -> Result<()> {
        let Some(path) = write_lock(&self.files).remove(handle) else {
            exn::bail!(ErrorKind::NotFound(handle.clone()));
        };
        match sync_remove_file(&path) {
            Ok(()) => Ok(()),
            // Already gone from disk; the handle is dead either way.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::map_io_error(e, &path).into()),
        }
    }

    fn contains(&self, handle: &ResourceHandle) -> bool {
        read_lock(&self.files).contains_key(handle)
    }

    fn live(&self) -> usize {
        read_lock(&self.files).len()
    }
}

impl Drop for LocalBackend {
    fn drop(&mut self) {
        let files = std::mem::take(self.files.get_mut().unwrap_or_else(std::sync::PoisonError::into_inner));
        if files.is_empty() {
            return;
        }
        tracing::warn!(backend = %self.name, count = files.len(), "Removing unreleased resources");
        for path in files.into_values() {
            let _ = sync_remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("spill", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("spill", "relative/path").is_err());
        assert!(LocalBackend::new("spill", "./relative").is_err());
    }

    #[test]
    fn test_new_creates_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("nested").join("spill");
        LocalBackend::new("spill", &root).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_new_rejects_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let err = LocalBackend::new("spill", &file).err().unwrap();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[rstest]
    #[case("image/webp", 3, "3.webp")]
    #[case("image/jpeg", 1, "1.jpeg")]
    #[case("IMAGE/PNG", 2, "2.png")]
    #[case("application/x.weird+zip", 4, "4.bin")]
    #[case("garbage", 5, "5.bin")]
    fn test_file_name(#[case] mime: &str, #[case] id: u64, #[case] expected: &str) {
        assert_eq!(LocalBackend::file_name(id, mime), expected);
    }

    #[tokio::test]
    async fn test_acquire_and_fetch() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("spill", temp_dir.path()).unwrap();
        let handle = backend.acquire(b"pixels".to_vec(), "image/png").await.unwrap();
        let path = backend.path_of(&handle).unwrap();
        assert!(path.starts_with(temp_dir.path()));
        assert_eq!(std::fs::read(&path).unwrap(), b"pixels");
        assert_eq!(backend.fetch(&handle).await.unwrap(), b"pixels");
        assert_eq!(backend.live(), 1);
    }

    #[tokio::test]
    async fn test_release_deletes_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("spill", temp_dir.path()).unwrap();
        let handle = backend.acquire(b"pixels".to_vec(), "image/png").await.unwrap();
        let path = backend.path_of(&handle).unwrap();
        backend.release(&handle).unwrap();
        assert!(!path.exists());
        assert!(!backend.contains(&handle));
        let err = backend.release(&handle).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_after_external_delete() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("spill", temp_dir.path()).unwrap();
        let handle = backend.acquire(b"pixels".to_vec(), "image/webp").await.unwrap();
        std::fs::remove_file(backend.path_of(&handle).unwrap()).unwrap();
        let err = backend.fetch(&handle).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        // Releasing a handle whose file vanished still succeeds.
        backend.release(&handle).unwrap();
    }

    #[tokio::test]
    async fn test_drop_removes_leftovers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = {
            let backend = LocalBackend::new("spill", temp_dir.path()).unwrap();
            let handle = backend.acquire(b"pixels".to_vec(), "image/jpeg").await.unwrap();
            backend.path_of(&handle).unwrap()
        };
        assert!(!path.exists());
    }
}
