//! Resource backend trait and implementations.
//!
//! This module defines the [`ResourceBackend`] trait, which provides a
//! unified acquire/fetch/release interface over wherever converted bytes are
//! kept (process memory, a spill directory on the local filesystem, ...).

mod local;
mod memory;

pub use self::local::LocalBackend;
pub use self::memory::MemoryBackend;
use crate::ResourceHandle;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Unified interface for resource backends.
///
/// Acquiring and fetching are asynchronous so that backends may perform I/O.
/// Releasing is synchronous: callers release handles from inside otherwise
/// synchronous state transitions and must not be forced to yield there.
///
/// # Lifetime
/// A backend never reclaims a resource on its own. Every handle returned by
/// [`acquire()`](Self::acquire) must eventually be passed to
/// [`release()`](Self::release), otherwise its bytes are held for the
/// lifetime of the backend.
///
/// # Examples
///
/// ```
/// use recast_storage::backend::{MemoryBackend, ResourceBackend};
/// # use recast_storage::error::Result;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<()> {
/// let backend = MemoryBackend::default();
/// let handle = backend.acquire(b"RIFF....WEBP".to_vec(), "image/webp").await?;
/// assert_eq!(backend.fetch(&handle).await?, b"RIFF....WEBP");
///
/// backend.release(&handle)?;
/// assert!(!backend.contains(&handle));
/// assert!(backend.fetch(&handle).await.is_err());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    /// Name of the configured backend, embedded in every handle it mints and
    /// used for logging.
    fn name(&self) -> &str;

    /// Take ownership of `data` and return a new handle referring to it.
    async fn acquire(&self, data: Vec<u8>, mime: &str) -> Result<ResourceHandle>;

    /// Read back the bytes behind a handle.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the handle
    /// was not minted by this backend or has already been released.
    async fn fetch(&self, handle: &ResourceHandle) -> Result<Vec<u8>>;

    /// Free the bytes behind a handle.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the handle is
    /// unknown; releasing twice is therefore detectable but harmless.
    fn release(&self, handle: &ResourceHandle) -> Result<()>;

    /// Whether the handle is currently live in this backend.
    fn contains(&self, handle: &ResourceHandle) -> bool;

    /// Number of live (acquired but not yet released) handles.
    fn live(&self) -> usize;
}

/// Lock helpers shared by the backends. A panic while holding one of these
/// locks cannot leave the map half-updated (every mutation is a single
/// insert or remove), so poisoning is ignored.
pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
