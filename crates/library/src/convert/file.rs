use super::{Ticket, encode};
use crate::Session;
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::models::{Artifact, SourceFile};

impl Session {
    /// Convert one file to the current target format and store the artifact,
    /// replacing (and releasing) any earlier artifact for the same file.
    ///
    /// On failure the error is also recorded as the session's last error,
    /// unless the file was removed while it was being converted.
    ///
    /// # Errors
    /// Returns [`Exn<LibraryErrorKind::Convert>`](LibraryErrorKind::Convert)
    /// wrapping the converter's own kind.
    pub async fn convert_one(&self, file: &SourceFile) -> LibraryResult<Artifact> {
        let format = self.target_format();
        let result = match encode(file, format, self.quality()).await {
            Ok(encoded) => self.commit(file, encoded, Ticket::Single).await,
            Err(err) => Err(err),
        };
        result.map_err(|err| {
            self.record_failure(Ticket::Single, file, &err);
            LibraryErrorKind::convert(err)
        })
    }

    /// Like [`convert_one`](Self::convert_one), for callers that only care
    /// about the recorded state.
    pub async fn convert_file(&self, file: &SourceFile) {
        let _ = self.convert_one(file).await;
    }
}
