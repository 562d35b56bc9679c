//! In-memory resource backend.

use super::{read_lock, write_lock};
use crate::error::{ErrorKind, Result};
use crate::{ResourceBackend, ResourceHandle};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

struct Resource {
    mime: String,
    data: Vec<u8>,
}

/// In-memory resource backend.
///
/// Resources are stored in a `HashMap` behind a [`RwLock`], so all trait
/// methods can operate on `&self` without external synchronisation. This is
/// the default backend: artifacts only live as long as the session.
///
/// # Examples
///
/// ```
/// use recast_storage::backend::{MemoryBackend, ResourceBackend};
///
/// let backend = MemoryBackend::default().with_name("previews");
/// assert_eq!(backend.name(), "previews");
/// assert_eq!(backend.live(), 0);
/// ```
pub struct MemoryBackend {
    name: String,
    next_id: AtomicU64,
    storage: RwLock<HashMap<ResourceHandle, Resource>>,
}

impl MemoryBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_id: AtomicU64::new(1),
            storage: RwLock::new(HashMap::new()),
        }
    }

    /// Change the name of the memory backend. Only affects handles minted
    /// afterwards.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[cfg(test)]
    fn mime(&self, handle: &ResourceHandle) -> Option<String> {
        read_lock(&self.storage).get(handle).map(|r| r.mime.clone())
    }

    #[cfg(test)]
    fn held_bytes(&self) -> usize {
        read_lock(&self.storage).values().map(|r| r.data.len()).sum()
    }
}
impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl ResourceBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn acquire(&self, data: Vec<u8>, mime: &str) -> Result<ResourceHandle> {
        let handle = ResourceHandle::mint(&self.name, self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::trace!(handle = %handle, bytes = data.len(), mime, "Resource acquired");
        let resource = Resource { mime: mime.to_string(), data };
        write_lock(&self.storage).insert(handle.clone(), resource);
        Ok(handle)
    }

    async fn fetch(&self, handle: &ResourceHandle) -> Result<Vec<u8>> {
        read_lock(&self.storage)
            .get(handle)
            .map(|r| r.data.clone())
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(handle.clone())))
    }

    fn release(&self, handle: &ResourceHandle) -> Result<()> {
        match write_lock(&self.storage).remove(handle) {
            Some(resource) => {
                tracing::trace!(handle = %handle, mime = %resource.mime, bytes = resource.data.len(), "Resource released");
                Ok(())
            },
            None => exn::bail!(ErrorKind::NotFound(handle.clone())),
        }
    }

    fn contains(&self, handle: &ResourceHandle) -> bool {
        read_lock(&self.storage).contains_key(handle)
    }

    fn live(&self) -> usize {
        read_lock(&self.storage).len()
    }
}
