use crate::models::SourceFile;
use crate::{FileKey, Session, sanitize};
use std::collections::HashMap;
use time::OffsetDateTime;

/// What makes each bulk-renamed file unique.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyType {
    /// 1-based position in the file list.
    #[default]
    Index,
    /// The file's original base name.
    Original,
    /// A millisecond timestamp taken once per rename, plus the position.
    Counter,
}

/// Parameters of [`Session::rename_all`]. Blank parts are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameParams {
    pub prefix: String,
    pub name: String,
    pub key_type: KeyType,
}

impl Session {
    /// Recompute every display name from `params` and rename existing
    /// artifacts to match, keeping their extension. Nothing is re-encoded.
    pub fn rename_all(&self, params: &RenameParams) {
        let base_timestamp = unix_millis(OffsetDateTime::now_utc());
        let mut state = self.write();
        state.names = compose_names(&state.files, params, base_timestamp);
        let crate::session::State { names, artifacts, .. } = &mut *state;
        for artifact in artifacts.iter_mut() {
            if let Some(name) = names.get(&artifact.key) {
                artifact.filename = format!("{name}.{}", artifact.format.extension());
            }
        }
        tracing::debug!(files = state.files.len(), key_type = ?params.key_type, "Files renamed");
    }
}

fn unix_millis(now: OffsetDateTime) -> i128 {
    now.unix_timestamp_nanos() / 1_000_000
}

pub(crate) fn compose_names(files: &[SourceFile], params: &RenameParams, base_timestamp: i128) -> HashMap<FileKey, String> {
    files
        .iter()
        .enumerate()
        .map(|(index, file)| {
            let suffix = match params.key_type {
                KeyType::Index => (index + 1).to_string(),
                KeyType::Original => file.base_name().to_string(),
                // Infallible: a usize (either 32- or 64-bit) will always fit in an i128.
                KeyType::Counter => (base_timestamp + i128::try_from(index).unwrap_or(0)).to_string(),
            };
            let joined = [params.prefix.as_str(), params.name.as_str(), suffix.as_str()]
                .iter()
                .map(|part| part.trim())
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join("-");
            (file.key(), sanitize(&joined, file.base_name()))
        })
        .collect()
}
