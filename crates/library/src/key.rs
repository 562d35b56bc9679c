use crate::models::SourceFile;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Logical identity of a [`SourceFile`] for the lifetime of a session:
/// `name + "-" + size`.
///
/// Two different files that share both name and byte size map to the same
/// key and are treated as one entity (the later one wins on merge).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey(String);

impl FileKey {
    pub fn of(file: &SourceFile) -> Self {
        Self(format!("{}-{}", file.name(), file.size()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Display for FileKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}
impl AsRef<str> for FileKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Shorthand for [`FileKey::of`].
pub fn key_of(file: &SourceFile) -> FileKey {
    FileKey::of(file)
}
