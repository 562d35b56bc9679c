//! Resource handle storage.
//!
//! Every converted image is exposed to callers through an opaque
//! [`ResourceHandle`], the in-process equivalent of a browser object URL. The
//! bytes behind a handle live in a [`ResourceBackend`] until the handle is
//! explicitly released; nothing is reclaimed implicitly.

pub mod backend;
pub mod error;
mod handle;

pub use crate::backend::ResourceBackend;
pub use crate::handle::ResourceHandle;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn ResourceBackend + Send + Sync>;
