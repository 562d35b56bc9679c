use std::fmt::{Display, Formatter, Result as FmtResult};

/// Opaque reference to bytes held by a [`ResourceBackend`](crate::ResourceBackend).
///
/// Rendered as `blob:<backend>/<id>`. Handles are unique per backend
/// instance and are never reused, so a released handle stays dead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    uri: String,
}
impl ResourceHandle {
    /// Build the handle for the `id`-th resource of the named backend.
    pub fn mint(backend: &str, id: u64) -> Self {
        Self { uri: format!("blob:{backend}/{id}") }
    }

    pub fn as_str(&self) -> &str {
        &self.uri
    }
}
impl Display for ResourceHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.uri)
    }
}
impl AsRef<str> for ResourceHandle {
    fn as_ref(&self) -> &str {
        &self.uri
    }
}
