//! Packaging artifacts into a single ZIP archive.
//!
//! Packaging is best-effort: an artifact whose bytes cannot be fetched is
//! logged and skipped, and when two artifacts share a file name the later one
//! overwrites the earlier. Only a failure of the container itself fails the
//! whole archive.

pub mod error;

use crate::Session;
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::models::Artifact;
use error::{ErrorKind, Result};
use exn::ResultExt;
use recast_storage::BackendHandle;
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};
use tracing::{Span, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Suggested file name when none is configured.
pub const DEFAULT_ARCHIVE_NAME: &str = "converted-images.zip";
/// Deflate level used when none is configured.
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 6;
const MAX_COMPRESSION_LEVEL: u8 = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub filename: String,
    pub reason: String,
}

/// A finished ZIP archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedArchive {
    /// Suggested file name for saving the archive.
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Entry names, in archive order.
    pub entries: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
}

/// Fetch every artifact's bytes and write them into one ZIP archive, each
/// entry named exactly by the artifact's file name.
///
/// Entry names are unique. A name that repeats keeps the position of its first
/// occurrence but the bytes of its last; the overwritten artifact is reported
/// in [`PackedArchive::skipped`].
///
/// `level` is the deflate level; anything above 9 is treated as 9 and 0
/// stores entries uncompressed.
#[instrument(skip(backend, artifacts), fields(artifacts = artifacts.len(), bytes))]
pub async fn pack(backend: &BackendHandle, artifacts: &[Artifact], level: u8) -> Result<PackedArchive> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut files: Vec<(String, Vec<u8>)> = Vec::with_capacity(artifacts.len());
    let mut skipped = Vec::new();
    for artifact in artifacts {
        let filename = &artifact.filename;
        match backend.fetch(&artifact.handle).await {
            Ok(bytes) => match positions.get(filename) {
                Some(&position) => {
                    skipped.push(skip(filename, "overwritten by a later entry of the same name".to_string()));
                    files[position].1 = bytes;
                },
                None => {
                    positions.insert(filename.clone(), files.len());
                    files.push((filename.clone(), bytes));
                },
            },
            Err(err) => {
                let kind = &*err;
                skipped.push(skip(filename, kind.to_string()));
            },
        }
    }

    let entries: Vec<String> = files.iter().map(|(name, _)| name.clone()).collect();
    let bytes = tokio::task::spawn_blocking(move || write_zip(&files, level)).await.or_raise(|| ErrorKind::Task)??;
    Span::current().record("bytes", bytes.len());
    Ok(PackedArchive { file_name: DEFAULT_ARCHIVE_NAME.to_string(), bytes, entries, skipped })
}

fn skip(filename: &str, reason: String) -> SkippedEntry {
    let kind = ErrorKind::ArchiveItem(filename.to_string());
    tracing::warn!(error = %kind, reason = %reason, "Leaving artifact out of archive");
    SkippedEntry { filename: filename.to_string(), reason }
}

fn file_options(level: u8) -> SimpleFileOptions {
    match level.min(MAX_COMPRESSION_LEVEL) {
        0 => SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
        level => SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(i64::from(level))),
    }
}

fn write_zip(files: &[(String, Vec<u8>)], level: u8) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in files {
        zip.start_file(name.as_str(), file_options(level)).or_raise(|| ErrorKind::Write)?;
        zip.write_all(data).or_raise(|| ErrorKind::Write)?;
    }
    Ok(zip.finish().or_raise(|| ErrorKind::Write)?.into_inner())
}

impl Session {
    /// Package every current artifact using the configured level and name.
    ///
    /// With `release_after`, the packaged artifacts are dropped from the
    /// session and their handles released once the archive is built.
    pub async fn download_archive(&self, release_after: bool) -> LibraryResult<PackedArchive> {
        let artifacts = self.read().artifacts.clone();
        let options = self.options();
        let mut archive = pack(self.backend(), &artifacts, options.compression_level)
            .await
            .map_err(LibraryErrorKind::archive)?;
        archive.file_name = options.archive_name.clone();

        if release_after {
            let packaged: HashSet<_> = artifacts.into_iter().map(|a| a.handle).collect();
            let released: Vec<_> = {
                let mut state = self.write();
                let (released, kept) = std::mem::take(&mut state.artifacts)
                    .into_iter()
                    .partition(|a| packaged.contains(&a.handle));
                state.artifacts = kept;
                released
            };
            self.release(released.into_iter().map(|a: Artifact| a.handle));
        }
        Ok(archive)
    }
}
