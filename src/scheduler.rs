//! Download phase: a fixed pool of workers draining a shared queue
//!
//! Documents are queued in depth-first pre-order. Each worker pops the next
//! job, downloads it into a `.part` file beside its destination and renames it
//! into place once every byte is on disk. Failures stay with the document that
//! caused them; only an authentication failure stops dispatch for everyone.

use crate::api::ByteStream;
use crate::config::{DownloadConfig, ExistingFileAction};
use crate::error::{AuthError, Error, Result};
use crate::paths::{PathMapper, ensure_dir, temp_path};
use crate::report::{FolderSkip, RunReport};
use crate::tree::{ContentRef, NodeIndex, ProjectTree, RemoteId};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Source of document bytes
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Open a byte stream for `content`
    async fn fetch(&self, content: &ContentRef) -> Result<ByteStream>;
}

/// Per-run download settings
#[derive(Clone, Debug)]
pub struct DownloadOptions {
    /// Number of concurrent workers (at least 1)
    pub workers: usize,
    /// Resolve paths and report, but fetch and write nothing
    pub dry_run: bool,
    /// What to do when a destination file already exists
    pub existing_files: ExistingFileAction,
    /// Create every folder locally, including empty ones
    pub mirror_empty_folders: bool,
}

impl From<&DownloadConfig> for DownloadOptions {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            workers: config.workers,
            dry_run: config.dry_run,
            existing_files: config.existing_files,
            mirror_empty_folders: config.mirror_empty_folders,
        }
    }
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self::from(&DownloadConfig::default())
    }
}

/// Result of one document
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Written to its final path
    Succeeded,
    /// Attempted and failed
    Failed(String),
    /// Deliberately not downloaded
    Skipped(String),
}

/// What happened to one document node
#[derive(Clone, Debug, Serialize)]
pub struct DownloadOutcome {
    /// The document node
    pub node: NodeIndex,
    /// Remote id of the document
    pub document_id: RemoteId,
    /// Final local path
    pub path: PathBuf,
    /// Success, failure or skip
    pub status: OutcomeStatus,
    /// Bytes written to disk
    pub bytes_written: u64,
}

struct Job {
    seq: usize,
    node: NodeIndex,
}

/// State shared by all workers of one run
struct WorkerContext {
    source: Arc<dyn ContentSource>,
    tree: Arc<ProjectTree>,
    mapper: Arc<PathMapper>,
    options: DownloadOptions,
    queue: Mutex<VecDeque<Job>>,
    stop: CancellationToken,
    auth_failure: Mutex<Option<AuthError>>,
}

/// Runs the download phase over a finished tree
pub struct DownloadScheduler {
    source: Arc<dyn ContentSource>,
}

impl DownloadScheduler {
    /// Create a scheduler fetching content from `source`
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self { source }
    }

    /// Download every document of `tree` and report one outcome per document
    ///
    /// Cancelling `cancel` stops workers from taking new jobs; in-flight
    /// downloads run to completion and undispatched documents are reported
    /// as skipped. An authentication failure does the same and then fails the
    /// run with [`Error::Aborted`], which carries the report.
    pub async fn run(
        &self,
        tree: Arc<ProjectTree>,
        mapper: Arc<PathMapper>,
        options: &DownloadOptions,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        if options.workers == 0 {
            return Err(Error::config(
                "download.workers",
                "worker count must be at least 1",
            ));
        }

        if !options.dry_run && options.mirror_empty_folders && !cancel.is_cancelled() {
            for folder in tree.folders() {
                if let Err(e) = ensure_dir(mapper.path(folder)).await {
                    tracing::warn!(
                        path = %mapper.path(folder).display(),
                        error = %e,
                        "Cannot create folder"
                    );
                }
            }
        }

        let documents = tree.documents();
        let queue: VecDeque<_> = documents
            .iter()
            .enumerate()
            .map(|(seq, &node)| Job { seq, node })
            .collect();
        let worker_count = options.workers.min(documents.len());

        tracing::info!(
            documents = documents.len(),
            workers = worker_count,
            dry_run = options.dry_run,
            "Starting downloads"
        );

        let ctx = Arc::new(WorkerContext {
            source: Arc::clone(&self.source),
            tree: Arc::clone(&tree),
            mapper: Arc::clone(&mapper),
            options: options.clone(),
            queue: Mutex::new(queue),
            stop: cancel.child_token(),
            auth_failure: Mutex::new(None),
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            workers.spawn(drain(Arc::clone(&ctx), worker_id));
        }

        let mut slots: Vec<Option<DownloadOutcome>> = vec![None; documents.len()];
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcomes) => {
                    for (seq, outcome) in outcomes {
                        slots[seq] = Some(outcome);
                    }
                }
                Err(e) => tracing::error!(error = %e, "Download worker aborted"),
            }
        }

        for job in lock(&ctx.queue).drain(..) {
            let status = OutcomeStatus::Skipped("cancelled".into());
            slots[job.seq] = Some(ctx.outcome(job.node, status, 0));
        }

        let outcomes: Vec<_> = slots
            .into_iter()
            .zip(&documents)
            .map(|(slot, &node)| {
                slot.unwrap_or_else(|| {
                    ctx.outcome(
                        node,
                        OutcomeStatus::Failed("worker task aborted".into()),
                        0,
                    )
                })
            })
            .collect();

        let skipped_folders = tree
            .skipped_folders()
            .iter()
            .map(|skip| FolderSkip {
                folder_id: tree.node(skip.node).id.clone(),
                path: mapper.path(skip.node).to_path_buf(),
                reason: skip.reason.clone(),
            })
            .collect();

        let report = RunReport::summarize(outcomes, skipped_folders);

        if let Some(auth) = lock(&ctx.auth_failure).take() {
            tracing::error!(
                succeeded = report.succeeded,
                failed = report.failed,
                skipped = report.skipped,
                "Downloads stopped by authentication failure"
            );
            return Err(Error::Aborted {
                report: Box::new(report),
                cause: auth,
            });
        }

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            total_bytes = report.total_bytes,
            "Downloads finished"
        );
        Ok(report)
    }
}

/// Worker loop: take jobs until the queue is empty or dispatch is stopped
async fn drain(ctx: Arc<WorkerContext>, worker_id: usize) -> Vec<(usize, DownloadOutcome)> {
    let mut outcomes = Vec::new();

    while !ctx.stop.is_cancelled() {
        let Some(job) = lock(&ctx.queue).pop_front() else {
            break;
        };

        let outcome = match ctx.download(job.node).await {
            Ok((status, bytes)) => ctx.outcome(job.node, status, bytes),
            Err(Error::Auth(auth)) => {
                tracing::error!(
                    worker_id,
                    error = %auth,
                    "Authentication failed, stopping dispatch"
                );
                let reason = auth.to_string();
                lock(&ctx.auth_failure).get_or_insert(auth);
                ctx.stop.cancel();
                ctx.outcome(job.node, OutcomeStatus::Failed(reason), 0)
            }
            Err(e) => {
                tracing::warn!(
                    worker_id,
                    document_id = %ctx.tree.node(job.node).id,
                    path = %ctx.mapper.path(job.node).display(),
                    error = %e,
                    "Download failed"
                );
                ctx.outcome(job.node, OutcomeStatus::Failed(e.to_string()), 0)
            }
        };
        outcomes.push((job.seq, outcome));
    }

    outcomes
}

impl WorkerContext {
    fn outcome(
        &self,
        node: NodeIndex,
        status: OutcomeStatus,
        bytes_written: u64,
    ) -> DownloadOutcome {
        DownloadOutcome {
            node,
            document_id: self.tree.node(node).id.clone(),
            path: self.mapper.path(node).to_path_buf(),
            status,
            bytes_written,
        }
    }

    async fn download(&self, node: NodeIndex) -> Result<(OutcomeStatus, u64)> {
        let document = self.tree.node(node);
        let meta = document.document().ok_or_else(|| {
            Error::Structural(format!("{} is not a document", document.id))
        })?;
        let path = self.mapper.path(node);

        if self.options.dry_run {
            tracing::info!(
                document_id = %document.id,
                path = %path.display(),
                "Dry run: would download"
            );
            return Ok((OutcomeStatus::Skipped("dry-run".into()), 0));
        }

        let policy = self.options.existing_files;
        if policy != ExistingFileAction::Overwrite && tokio::fs::try_exists(path).await? {
            if policy == ExistingFileAction::Skip {
                tracing::debug!(path = %path.display(), "Already exists, skipping");
                return Ok((OutcomeStatus::Skipped("already exists".into()), 0));
            }
            return Ok((
                OutcomeStatus::Failed("destination already exists".into()),
                0,
            ));
        }

        if let Some(parent) = path.parent() {
            ensure_dir(parent).await?;
        }

        let stream = self.source.fetch(&meta.content).await?;
        let written = write_atomically(path, stream).await?;

        tracing::info!(
            document_id = %document.id,
            path = %path.display(),
            bytes = written,
            "Downloaded"
        );
        Ok((OutcomeStatus::Succeeded, written))
    }
}

/// Stream into the sibling temp file, then rename over `path`
///
/// The temp file is removed if any step fails, so `path` only ever holds a
/// complete download.
async fn write_atomically(path: &Path, mut stream: ByteStream) -> Result<u64> {
    let temp = temp_path(path);

    let result = async {
        let mut file = tokio::fs::File::create(&temp).await?;
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp, path).await?;
        Ok::<_, Error>(written)
    }
    .await;

    if result.is_err()
        && let Err(e) = tokio::fs::remove_file(&temp).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %temp.display(), error = %e, "Cannot remove partial download");
    }
    result
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{attach, document, folder, sample_tree};
    use bytes::Bytes;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    #[derive(Clone)]
    enum Reply {
        FailFetch,
        FailMidStream,
        Unauthorized,
    }

    /// Content source serving `content of <id>` unless told otherwise
    #[derive(Default)]
    struct FakeSource {
        replies: HashMap<String, Reply>,
        delay: Duration,
        fetches: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        cancel_on_fetch: Option<(usize, CancellationToken)>,
    }

    impl FakeSource {
        fn with(mut self, id: &str, reply: Reply) -> Self {
            self.replies.insert(id.to_string(), reply);
            self
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContentSource for FakeSource {
        async fn fetch(&self, content: &ContentRef) -> Result<ByteStream> {
            let id = match content {
                ContentRef::Locator(id) => id.to_string(),
                ContentRef::Direct(url) => url.clone(),
            };
            let nth = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((at, cancel)) = &self.cancel_on_fetch
                && *at == nth
            {
                cancel.cancel();
            }

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let body = Bytes::from(format!("content of {id}"));
            match self.replies.get(&id) {
                None => Ok(futures::stream::iter(vec![Ok(body)]).boxed()),
                Some(Reply::FailFetch) => Err(Error::Request {
                    status: 404,
                    path: format!("Documents/{id}/locator"),
                    message: "gone".into(),
                }),
                Some(Reply::FailMidStream) => Ok(futures::stream::iter(vec![
                    Ok(body),
                    Err(Error::Transient {
                        status: None,
                        message: "connection reset".into(),
                    }),
                ])
                .boxed()),
                Some(Reply::Unauthorized) => Err(AuthError::with_status(401, "revoked").into()),
            }
        }
    }

    fn options(workers: usize) -> DownloadOptions {
        DownloadOptions {
            workers,
            ..DownloadOptions::default()
        }
    }

    async fn run(
        source: Arc<FakeSource>,
        tree: &Arc<ProjectTree>,
        dest: &Path,
        options: &DownloadOptions,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let mapper = Arc::new(PathMapper::new(dest, tree, false));
        DownloadScheduler::new(source)
            .run(Arc::clone(tree), mapper, options, cancel)
            .await
    }

    /// Relative path -> contents of every file under `dir`
    fn file_set(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = e.path().strip_prefix(dir).unwrap().to_path_buf();
                (rel, std::fs::read(e.path()).unwrap())
            })
            .collect()
    }

    fn has_part_files(dir: &Path) -> bool {
        WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().ends_with(".part"))
    }

    #[tokio::test]
    async fn one_outcome_per_document_for_any_worker_count() {
        let tree = Arc::new(sample_tree(30));

        for workers in [1, 2, 8, 64] {
            let temp_dir = TempDir::new().unwrap();
            let source = Arc::new(FakeSource::default());

            let report = run(
                Arc::clone(&source),
                &tree,
                temp_dir.path(),
                &options(workers),
                CancellationToken::new(),
            )
            .await
            .unwrap();

            assert_eq!(report.outcomes.len(), 30, "workers = {workers}");
            assert_eq!(report.succeeded, 30, "workers = {workers}");
            assert_eq!(source.fetches(), 30);
            let order: Vec<_> = report.outcomes.iter().map(|o| o.node).collect();
            assert_eq!(order, tree.documents(), "outcomes follow pre-order");
            assert_eq!(file_set(temp_dir.path()).len(), 30);
        }
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_worker_count() {
        let tree = Arc::new(sample_tree(12));
        let temp_dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource {
            delay: Duration::from_millis(20),
            ..FakeSource::default()
        });

        run(
            Arc::clone(&source),
            &tree,
            temp_dir.path(),
            &options(3),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(source.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn files_land_at_mapped_paths() {
        let tree = Arc::new(sample_tree(3));
        let temp_dir = TempDir::new().unwrap();

        run(
            Arc::new(FakeSource::default()),
            &tree,
            temp_dir.path(),
            &options(2),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let files = file_set(temp_dir.path());
        assert_eq!(files[Path::new("doc-0.txt")], b"content of d0");
        assert_eq!(files[Path::new("Pleadings/doc-1.txt")], b"content of d1");
        assert_eq!(
            files[Path::new("Pleadings/Exhibits/doc-2.txt")],
            b"content of d2"
        );
    }

    #[tokio::test]
    async fn dry_run_fetches_and_writes_nothing() {
        let tree = Arc::new(sample_tree(9));
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("export");
        let source = Arc::new(FakeSource::default());

        let report = run(
            Arc::clone(&source),
            &tree,
            &dest,
            &DownloadOptions {
                dry_run: true,
                ..options(4)
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(source.fetches(), 0);
        assert!(!dest.exists());
        assert_eq!(report.skipped, 9);
        assert!(
            report
                .outcomes
                .iter()
                .all(|o| o.status == OutcomeStatus::Skipped("dry-run".into()))
        );
    }

    #[tokio::test]
    async fn failures_are_isolated_to_their_document() {
        let tree = Arc::new(sample_tree(6));
        let temp_dir = TempDir::new().unwrap();
        let source = Arc::new(
            FakeSource::default()
                .with("d1", Reply::FailFetch)
                .with("d4", Reply::FailMidStream),
        );

        let report = run(
            Arc::clone(&source),
            &tree,
            temp_dir.path(),
            &options(2),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.succeeded, 4);
        assert_eq!(report.failed, 2);
        let failed: Vec<_> = report
            .failures()
            .map(|o| o.document_id.to_string())
            .collect();
        assert_eq!(failed, vec!["d1", "d4"]);

        let files = file_set(temp_dir.path());
        assert_eq!(files.len(), 4);
        assert!(!temp_dir.path().join("Pleadings/doc-4.txt").exists());
        assert!(!has_part_files(temp_dir.path()));
    }

    #[tokio::test]
    async fn existing_files_follow_the_policy() {
        let tree = Arc::new(sample_tree(2));

        for (policy, expected, kept_old) in [
            (ExistingFileAction::Overwrite, OutcomeStatus::Succeeded, false),
            (
                ExistingFileAction::Skip,
                OutcomeStatus::Skipped("already exists".into()),
                true,
            ),
            (
                ExistingFileAction::Error,
                OutcomeStatus::Failed("destination already exists".into()),
                true,
            ),
        ] {
            let temp_dir = TempDir::new().unwrap();
            let existing = temp_dir.path().join("doc-0.txt");
            std::fs::write(&existing, b"old").unwrap();
            let source = Arc::new(FakeSource::default());

            let report = run(
                Arc::clone(&source),
                &tree,
                temp_dir.path(),
                &DownloadOptions {
                    existing_files: policy,
                    ..options(1)
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();

            let first = report
                .outcomes
                .iter()
                .find(|o| o.document_id.as_str() == "d0")
                .unwrap();
            assert_eq!(first.status, expected, "{policy:?}");
            assert_eq!(std::fs::read(&existing).unwrap() == b"old", kept_old, "{policy:?}");
            let expected_fetches = if kept_old { 1 } else { 2 };
            assert_eq!(source.fetches(), expected_fetches, "{policy:?}");
        }
    }

    #[tokio::test]
    async fn rerun_is_idempotent() {
        let tree = Arc::new(sample_tree(7));
        let temp_dir = TempDir::new().unwrap();

        let first = run(
            Arc::new(FakeSource::default()),
            &tree,
            temp_dir.path(),
            &options(3),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let files_after_first = file_set(temp_dir.path());

        let second = run(
            Arc::new(FakeSource::default()),
            &tree,
            temp_dir.path(),
            &options(3),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(file_set(temp_dir.path()), files_after_first);
        let statuses = |r: &RunReport| -> Vec<(PathBuf, OutcomeStatus)> {
            r.outcomes
                .iter()
                .map(|o| (o.path.clone(), o.status.clone()))
                .collect()
        };
        assert_eq!(statuses(&first), statuses(&second));
    }

    #[tokio::test]
    async fn auth_failure_stops_dispatch_and_keeps_the_report() {
        let tree = Arc::new(sample_tree(5));
        let temp_dir = TempDir::new().unwrap();
        // pre-order is d2, d1, d4, d0, d3
        let source = Arc::new(FakeSource::default().with("d1", Reply::Unauthorized));

        let err = run(
            Arc::clone(&source),
            &tree,
            temp_dir.path(),
            &options(1),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        let Error::Aborted { report, cause } = &err else {
            panic!("expected an aborted run, got {err}");
        };
        assert_eq!(cause.status, Some(401));
        assert_eq!(source.fetches(), 2, "no work dispatched after the failure");
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 3);
        assert_eq!(report.outcomes.len(), 5);
        assert_eq!(report.outcomes[0].document_id.as_str(), "d2");
        assert_eq!(report.outcomes[0].status, OutcomeStatus::Succeeded);
        assert!(
            report.outcomes[2..]
                .iter()
                .all(|o| o.status == OutcomeStatus::Skipped("cancelled".into()))
        );
        assert!(report.is_partial());
        assert!(err.is_fatal());
        assert_eq!(file_set(temp_dir.path()).len(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_skips_everything() {
        let tree = Arc::new(sample_tree(4));
        let temp_dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run(
            Arc::clone(&source),
            &tree,
            temp_dir.path(),
            &options(2),
            cancel,
        )
        .await
        .unwrap();

        assert_eq!(source.fetches(), 0);
        assert_eq!(report.outcomes.len(), 4);
        assert!(
            report
                .outcomes
                .iter()
                .all(|o| o.status == OutcomeStatus::Skipped("cancelled".into()))
        );
        assert!(report.is_partial());
        assert_eq!(
            std::fs::read_dir(temp_dir.path()).unwrap().count(),
            0,
            "no folders are mirrored for a cancelled run"
        );
    }

    #[tokio::test]
    async fn cancellation_lets_in_flight_downloads_finish() {
        let tree = Arc::new(sample_tree(6));
        let temp_dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let source = Arc::new(FakeSource {
            cancel_on_fetch: Some((2, cancel.clone())),
            ..FakeSource::default()
        });

        let report = run(
            Arc::clone(&source),
            &tree,
            temp_dir.path(),
            &options(1),
            cancel,
        )
        .await
        .unwrap();

        let statuses: Vec<_> = report.outcomes.iter().map(|o| o.status.clone()).collect();
        assert_eq!(statuses[0], OutcomeStatus::Succeeded);
        assert_eq!(statuses[1], OutcomeStatus::Succeeded, "in-flight download completes");
        assert!(
            statuses[2..]
                .iter()
                .all(|s| *s == OutcomeStatus::Skipped("cancelled".into()))
        );
        assert_eq!(file_set(temp_dir.path()).len(), 2);
        assert!(!has_part_files(temp_dir.path()));
    }

    #[tokio::test]
    async fn zero_workers_is_a_config_error() {
        let tree = Arc::new(sample_tree(1));
        let temp_dir = TempDir::new().unwrap();

        let err = run(
            Arc::new(FakeSource::default()),
            &tree,
            temp_dir.path(),
            &options(0),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn empty_folders_are_mirrored() {
        let mut tree = ProjectTree::new("42");
        let root = tree.root();
        let nodes = attach(
            &mut tree,
            root,
            vec![folder("f1", "Empty"), document("d1", "a.txt")],
        );
        attach(&mut tree, nodes[0], vec![folder("f2", "Deeper")]);
        let tree = Arc::new(tree);
        let temp_dir = TempDir::new().unwrap();

        run(
            Arc::new(FakeSource::default()),
            &tree,
            temp_dir.path(),
            &options(1),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(temp_dir.path().join("Empty/Deeper").is_dir());

        let unmirrored = TempDir::new().unwrap();
        run(
            Arc::new(FakeSource::default()),
            &tree,
            unmirrored.path(),
            &DownloadOptions {
                mirror_empty_folders: false,
                ..options(1)
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(!unmirrored.path().join("Empty").exists());
    }
}
