use super::error::{ErrorKind, Result};
use super::{Ticket, encode};
use crate::models::{Artifact, BatchState, SourceFile};
use crate::{FileKey, Session};
use async_stream::stream;
use futures::{Stream, StreamExt};
use recast_codec::Format;

/// Progress events emitted while a batch works through its files.
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started): exactly once, with the total file count.
/// 2. [`Converted`](Self::Converted) or [`Skipped`](Self::Skipped): once per
///    file, in the order the files were added.
/// 3. [`Complete`](Self::Complete): exactly once.
///
/// The first error terminates the stream, in which case
/// [`Complete`](Self::Complete) is never emitted.
#[derive(Debug)]
pub(crate) enum BatchEvent {
    Started(usize),
    Converted(Artifact),
    /// The file was removed from the session while the batch was running.
    Skipped(FileKey),
    Complete,
}

/// How a call to [`Session::convert_all`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Completed { converted: usize },
    /// Stopped at the first failure; see the session's `last_error` and
    /// `failing_key`. Artifacts committed before the failure are kept.
    Failed(ErrorKind),
    /// A newer batch, [`Session::cancel_batch`] or [`Session::clear_all`]
    /// took over. Nothing is reported as an error.
    Superseded,
}

/// Stops the batch it was created for when dropped without [`finish`].
///
/// [`finish`]: RunningBatch::finish
struct RunningBatch<'a> {
    session: &'a Session,
    generation: u64,
    finished: bool,
}
impl RunningBatch<'_> {
    fn finish(mut self) -> bool {
        self.finished = true;
        self.session.finish_batch(self.generation)
    }
}
impl Drop for RunningBatch<'_> {
    fn drop(&mut self) {
        if !self.finished && self.session.finish_batch(self.generation) {
            tracing::debug!(generation = self.generation, "Batch abandoned before completion");
        }
    }
}

impl Session {
    /// Convert every file in the session to the current target format.
    ///
    /// Files are taken as they are at call time and processed in order, with
    /// at most `concurrency` encodes in flight; artifacts are committed in
    /// file order regardless. The first failure stops the batch.
    ///
    /// Once finished, progress stays at its final value for the configured
    /// delay and then drops back to zero.
    ///
    /// Dropping the returned future before it resolves stops the batch as if
    /// it had finished: committed artifacts stay and progress is reset.
    pub async fn convert_all(&self) -> BatchOutcome {
        let (generation, files, format) = self.begin_batch();
        let running = RunningBatch { session: self, generation, finished: false };
        let mut converted = 0;
        let mut failure = None;
        {
            let events = self.batch_events(generation, files, format);
            futures::pin_mut!(events);
            while let Some(event) = events.next().await {
                match event {
                    Ok(BatchEvent::Started(total)) => tracing::debug!(generation, total, "Batch started"),
                    Ok(BatchEvent::Converted(artifact)) => {
                        converted += 1;
                        tracing::trace!(filename = %artifact.filename, converted, "Batch step committed");
                    },
                    Ok(BatchEvent::Skipped(key)) => tracing::debug!(key = %key, "Source removed mid-batch; skipped"),
                    Ok(BatchEvent::Complete) => break,
                    Err(err) => failure = Some((*err).clone()),
                }
            }
        }

        if !running.finish() {
            tracing::debug!(generation, "Batch superseded");
            return BatchOutcome::Superseded;
        }
        match failure {
            Some(ErrorKind::Aborted) => BatchOutcome::Superseded,
            Some(kind) => BatchOutcome::Failed(kind),
            None => {
                tracing::info!(generation, converted, "Batch complete");
                BatchOutcome::Completed { converted }
            },
        }
    }

    /// Supersede the running batch, if any. Artifacts it already committed
    /// are kept.
    pub fn cancel_batch(&self) {
        let mut state = self.write();
        state.generation += 1;
        let BatchState { last_error, failing_key, .. } = std::mem::take(&mut state.batch);
        state.batch = BatchState { last_error, failing_key, ..BatchState::default() };
        self.publish(&state);
    }

    fn begin_batch(&self) -> (u64, Vec<SourceFile>, Format) {
        let mut state = self.write();
        if state.batch.is_running {
            tracing::debug!(generation = state.generation, "Superseding running batch");
        }
        state.generation += 1;
        state.batch = BatchState { is_running: true, total: state.files.len(), ..BatchState::default() };
        self.publish(&state);
        (state.generation, state.files.clone(), state.format)
    }

    /// Mark the batch as stopped and schedule the progress reset. Returns
    /// `false` if the batch had already been superseded.
    fn finish_batch(&self, generation: u64) -> bool {
        {
            let mut state = self.write();
            if state.generation != generation {
                return false;
            }
            state.batch.is_running = false;
        }
        // Outside a runtime there is nothing to wait on; reset right away.
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let session = self.clone();
                let delay = self.inner.options.reset_delay;
                runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    session.reset_progress(generation);
                });
            },
            Err(_) => self.reset_progress(generation),
        }
        true
    }

    fn reset_progress(&self, generation: u64) {
        let mut state = self.write();
        if state.generation == generation && !state.batch.is_running {
            state.batch.current = 0;
            state.batch.total = 0;
            self.publish(&state);
        }
    }

    fn skip_step(&self, generation: u64) {
        let mut state = self.write();
        if state.generation == generation {
            state.batch.current += 1;
            self.publish(&state);
        }
    }

    fn batch_events(
        &self,
        generation: u64,
        files: Vec<SourceFile>,
        format: Format,
    ) -> impl Stream<Item = Result<BatchEvent>> + '_ {
        let quality = self.quality();
        let concurrency = self.inner.options.concurrency.max(1);
        let ticket = Ticket::Batch(generation);
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            yield Ok(BatchEvent::Started(files.len()));

            // `buffered` keeps up to `concurrency` encodes running but hands
            // results back in input order.
            let mut encodes = futures::stream::iter(files)
                .map(|file| async move {
                    let encoded = encode(&file, format, quality).await;
                    (file, encoded)
                })
                .buffered(concurrency);
            while let Some((file, encoded)) = encodes.next().await {
                let committed = match encoded {
                    Ok(encoded) => self.commit(&file, encoded, ticket).await,
                    Err(err) => Err(err),
                };
                match committed {
                    Ok(artifact) => yield Ok(BatchEvent::Converted(artifact)),
                    Err(err) if *err == ErrorKind::SourceRemoved => {
                        self.skip_step(generation);
                        yield Ok(BatchEvent::Skipped(file.key()));
                    },
                    Err(err) => {
                        self.record_failure(ticket, &file, &err);
                        yield Err(err);
                        return;
                    },
                }
            }

            yield Ok(BatchEvent::Complete);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Progress;
    use crate::session::Options;
    use crate::session::tests::{broken, jpeg, png, session, session_with};
    use recast_codec::error::ErrorKind as CodecErrorKind;
    use recast_storage::ResourceBackend;
    use rstest::rstest;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_convert_all_end_to_end() {
        let (session, backend) = session();
        let (cat, dog) = (png("cat.png", 6, 4), jpeg("dog.jpg", 5, 5));
        session.add_files([cat.clone(), dog.clone()]);
        session.set_target_format(Format::Webp);
        let mut progress = session.watch_progress();

        assert_eq!(session.convert_all().await, BatchOutcome::Completed { converted: 2 });
        assert_eq!(*progress.borrow_and_update(), Progress { current: 2, total: 2 });

        let snapshot = session.snapshot();
        let names: Vec<_> = snapshot.artifacts.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, ["cat.webp", "dog.webp"]);
        assert!(!snapshot.batch.is_running);
        assert_eq!(snapshot.batch.last_error, None);
        assert_eq!(backend.live(), 2);

        timeout(Duration::from_secs(5), progress.changed()).await.unwrap().unwrap();
        assert_eq!(*progress.borrow(), Progress { current: 0, total: 0 });
        let batch = session.snapshot().batch;
        assert_eq!((batch.current, batch.total), (0, 0));
    }

    #[rstest]
    #[case::sequential(1)]
    #[case::parallel(3)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fail_fast(#[case] concurrency: usize) {
        let (session, backend) = session_with(Options { concurrency, ..Options::default() });
        let (a, b, c) = (png("a.png", 2, 2), broken("b.png"), png("c.png", 3, 3));
        session.add_files([a.clone(), b.clone(), c.clone()]);

        let outcome = session.convert_all().await;
        assert_eq!(outcome, BatchOutcome::Failed(ErrorKind::Codec(CodecErrorKind::Decode)));

        let snapshot = session.snapshot();
        assert!(snapshot.artifact(&a.key()).is_some());
        assert!(snapshot.artifact(&b.key()).is_none());
        assert!(snapshot.artifact(&c.key()).is_none());
        assert!(snapshot.batch.last_error.is_some());
        assert_eq!(snapshot.batch.failing_key, Some(b.key()));
        assert!(!snapshot.batch.is_running);
        assert_eq!(snapshot.batch.current, 1);
        assert_eq!(backend.live(), 1);
    }

    #[rstest]
    #[case(1)]
    #[case(4)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_commit_order(#[case] concurrency: usize) {
        let (session, _) = session_with(Options { concurrency, ..Options::default() });
        // Large first file so that later encodes finish first when parallel.
        let files = [png("big.png", 256, 256), png("s1.png", 1, 1), png("s2.png", 2, 1), png("s3.png", 1, 2)];
        session.add_files(files.clone());
        assert_eq!(session.convert_all().await, BatchOutcome::Completed { converted: 4 });
        let keys: Vec<_> = session.snapshot().artifacts.into_iter().map(|a| a.key).collect();
        let expected: Vec<_> = files.iter().map(SourceFile::key).collect();
        assert_eq!(keys, expected);
    }

    #[tokio::test]
    async fn test_new_run_clears_previous_error() {
        let (session, _) = session();
        let bad = broken("bad.png");
        session.add_files([bad.clone()]);
        assert!(matches!(session.convert_all().await, BatchOutcome::Failed(_)));
        session.remove_file(&bad);
        session.add_files([png("ok.png", 1, 1)]);
        assert_eq!(session.convert_all().await, BatchOutcome::Completed { converted: 1 });
        assert_eq!(session.snapshot().batch.last_error, None);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (session, _) = session();
        assert_eq!(session.convert_all().await, BatchOutcome::Completed { converted: 0 });
        assert!(!session.snapshot().batch.is_running);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_clear_all_supersedes_running_batch() {
        let (session, backend) = session();
        let files: Vec<_> = (0..6).map(|i| png(&format!("{i}.png"), 192, 192)).collect();
        session.add_files(files);

        let running = tokio::spawn({
            let session = session.clone();
            async move { session.convert_all().await }
        });
        // Wait for the batch to be visibly running before pulling the rug.
        let mut progress = session.watch_progress();
        timeout(Duration::from_secs(5), progress.wait_for(|p| p.total == 6)).await.unwrap().unwrap();
        session.clear_all();

        assert_eq!(running.await.unwrap(), BatchOutcome::Superseded);
        let snapshot = session.snapshot();
        assert!(snapshot.artifacts.is_empty());
        assert_eq!(snapshot.batch, BatchState::default());
        assert_eq!(backend.live(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_keeps_committed_artifacts() {
        let (session, backend) = session();
        let files: Vec<_> = (0..6).map(|i| png(&format!("{i}.png"), 160, 160)).collect();
        session.add_files(files);

        let running = tokio::spawn({
            let session = session.clone();
            async move { session.convert_all().await }
        });
        let mut progress = session.watch_progress();
        timeout(Duration::from_secs(5), progress.wait_for(|p| p.current >= 1)).await.unwrap().unwrap();
        session.cancel_batch();

        assert_eq!(running.await.unwrap(), BatchOutcome::Superseded);
        let snapshot = session.snapshot();
        assert!(!snapshot.batch.is_running);
        assert_eq!(snapshot.batch.last_error, None);
        assert!(!snapshot.artifacts.is_empty());
        // Nothing committed after the cancel leaked a handle.
        assert_eq!(backend.live(), snapshot.artifacts.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_batch_stops_running() {
        let (session, backend) = session();
        let files: Vec<_> = (0..4).map(|i| png(&format!("{i}.png"), 512, 512)).collect();
        session.add_files(files);
        let mut progress = session.watch_progress();

        let abandoned = timeout(Duration::from_millis(2), session.convert_all()).await;
        assert!(abandoned.is_err());
        let snapshot = session.snapshot();
        assert!(!snapshot.batch.is_running);
        assert_eq!(snapshot.batch.last_error, None);

        timeout(Duration::from_secs(5), progress.wait_for(|p| p.total == 0)).await.unwrap().unwrap();
        assert_eq!(session.snapshot().batch, BatchState::default());
        assert_eq!(backend.live(), session.snapshot().artifacts.len());
    }

    #[test]
    fn test_dropped_batch_outside_runtime_resets_immediately() {
        let (session, _) = session();
        session.add_files([png("a.png", 1, 1)]);
        let generation = session.begin_batch().0;
        drop(RunningBatch { session: &session, generation, finished: false });
        assert_eq!(session.snapshot().batch, BatchState::default());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_new_run_supersedes_running_batch() {
        let (session, backend) = session();
        let files: Vec<_> = (0..5).map(|i| png(&format!("{i}.png"), 192, 192)).collect();
        session.add_files(files);

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.convert_all().await }
        });
        let mut progress = session.watch_progress();
        timeout(Duration::from_secs(5), progress.wait_for(|p| p.total == 5)).await.unwrap().unwrap();
        let second = session.convert_all().await;

        assert_eq!(first.await.unwrap(), BatchOutcome::Superseded);
        assert_eq!(second, BatchOutcome::Completed { converted: 5 });
        let snapshot = session.snapshot();
        assert_eq!(snapshot.artifacts.len(), 5);
        assert!(!snapshot.batch.is_running);
        assert_eq!(backend.live(), snapshot.artifacts.len());
    }

    #[tokio::test]
    async fn test_superseded_failure_not_recorded() {
        let (session, _) = session();
        let bad = broken("bad.png");
        session.add_files([bad.clone()]);
        let generation = session.begin_batch().0;
        session.cancel_batch();
        assert!(!session.record_failure(Ticket::Batch(generation), &bad, &ErrorKind::Resource));
        assert_eq!(session.snapshot().batch.last_error, None);
    }
}
