//! Converting source files into artifacts.
//!
//! Decoding and encoding run on Tokio's blocking pool. The encoded bytes are
//! only handed to the resource backend once encoding succeeded, and the
//! resulting artifact is committed to the session in a single state
//! transition that first checks the work has not been superseded.

mod batch;
pub mod error;
mod file;

pub use self::batch::BatchOutcome;
use crate::Session;
use crate::models::{Artifact, SourceFile};
use crate::session::State;
use error::{ErrorKind, Result};
use exn::ResultExt;
use recast_codec::{Encoded, Format, decode};
use std::sync::Arc;
use tracing::{Instrument, instrument};

/// Who a commit is on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ticket {
    /// A stand-alone conversion; only superseded by the source being removed.
    Single,
    /// A step of the batch started at the given generation.
    Batch(u64),
}
impl Ticket {
    fn is_current(&self, state: &State) -> bool {
        match self {
            Self::Single => true,
            Self::Batch(generation) => state.generation == *generation,
        }
    }
}

/// Decode and re-encode `file` on the blocking pool.
#[instrument(skip(file), fields(name = file.name(), mime = file.mime(), size = file.size()))]
pub(crate) async fn encode(file: &SourceFile, format: Format, quality: f32) -> Result<Encoded> {
    let data = Arc::clone(file.data());
    let mime = file.mime().to_string();
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        let surface = decode(&data, &mime)?;
        format.encode(&surface, quality)
    })
    .await
    .or_raise(|| ErrorKind::Task)?
    .map_err(ErrorKind::codec)
}

impl Session {
    /// Acquire a handle for `encoded` and insert the artifact for `file`,
    /// releasing whatever it supersedes.
    ///
    /// The artifact file name is resolved here, from the display names at
    /// commit time, so a rename that raced the encode is honoured.
    pub(crate) async fn commit(&self, file: &SourceFile, encoded: Encoded, ticket: Ticket) -> Result<Artifact> {
        if !ticket.is_current(&self.read()) {
            exn::bail!(ErrorKind::Aborted);
        }
        let key = file.key();
        let (format, size) = (encoded.format, encoded.size());
        let handle = self
            .inner
            .backend
            .acquire(encoded.bytes, format.mime())
            .instrument(tracing::trace_span!("acquire", key = %key))
            .await
            .or_raise(|| ErrorKind::Resource)?;

        let committed = {
            let mut state = self.write();
            if !ticket.is_current(&state) {
                Err(ErrorKind::Aborted)
            } else if !state.contains(&key) {
                Err(ErrorKind::SourceRemoved)
            } else {
                let filename = format!("{}.{}", state.display_name(file), format.extension());
                let artifact = Artifact { key, source: file.clone(), filename, handle: handle.clone(), format, size };
                let superseded = state.upsert(artifact.clone());
                if let Ticket::Batch(_) = ticket {
                    state.batch.current += 1;
                    self.publish(&state);
                }
                Ok((artifact, superseded))
            }
        };

        match committed {
            Ok((artifact, superseded)) => {
                tracing::debug!(key = %artifact.key, handle = %artifact.handle, filename = %artifact.filename, "Artifact committed");
                self.release(superseded);
                Ok(artifact)
            },
            Err(kind) => {
                tracing::debug!(key = %file.key(), reason = %kind, "Discarding conversion");
                self.release([handle]);
                exn::bail!(kind)
            },
        }
    }

    /// Record a failure as the session's last error. Returns `false` when the
    /// failure is not recordable or the ticket has been superseded.
    pub(crate) fn record_failure(&self, ticket: Ticket, file: &SourceFile, err: &ErrorKind) -> bool {
        if !err.is_recorded() {
            return false;
        }
        let mut state = self.write();
        if !ticket.is_current(&state) {
            return false;
        }
        tracing::warn!(key = %file.key(), error = %err, "Conversion failed");
        state.batch.last_error = Some(err.to_string());
        state.batch.failing_key = Some(file.key());
        if let Ticket::Batch(_) = ticket {
            state.batch.is_running = false;
        }
        true
    }
}
