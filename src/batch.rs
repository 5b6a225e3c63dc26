//! The batch orchestrator: a queue of sources in, one archive out.
//!
//! ## State machine
//!
//! ```text
//! Idle ──▶ Scanning ──▶ Running ──┬──▶ Finalizing ──▶ Done
//!                                 └──▶ Partial   (store fault)
//! ```
//!
//! Tasks run strictly in order on one logical worker. Per task the source
//! is read, split into dump items, and each item is laid out, rendered,
//! given a unique archive path and persisted (Safe) or buffered (Fast). An
//! item failure is logged and the batch moves on; only a store fault stops
//! it early.
//!
//! A stop request is honoured at the next task boundary: the archive is
//! built from what exists, and in Safe mode the journal is kept so
//! [`BatchOrchestrator::resume_batch`] can finish the queue later.

use crate::archive::{ArchiveBuilder, TarGzArchive};
use crate::config::{BatchConfig, ResourceMode};
use crate::error::{ArchiveError, BatchError, ItemError, StoreError};
use crate::glyph::{
    codepoint_key, run_recovery_pass, GlyphRecognizer, GlyphRegistry, MissingCharacterLog,
    RecoveryReport, StaticGlyphTable,
};
use crate::journal::{ConversionSession, SessionJournal};
use crate::layout::{BuiltinFonts, FontContext, Tokenizer, UserFont, WordBoundaryTokenizer};
use crate::output::{ArchiveOutput, BatchOutcome, BatchReport, OutputArtifact};
use crate::pipeline::expand::{count_items, split_dump};
use crate::pipeline::input::load_text;
use crate::pipeline::paths::{desired_path, PathAllocator};
use crate::pipeline::render::{layout_item, render_document, LayoutContext};
use crate::progress::{LogEntry, ProgressCallback, ProgressSnapshot};
use crate::render::RenderBackend;
use crate::store::DurableStore;
use crate::task::SourceTask;
use chrono::Utc;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

/// Where the orchestrator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Scanning,
    Running,
    Partial,
    Finalizing,
    Done,
}

impl BatchState {
    fn is_busy(self) -> bool {
        matches!(self, Self::Scanning | Self::Running | Self::Finalizing)
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Running => "running",
            Self::Partial => "partial",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// Cloneable handle for requesting a cooperative stop from another task
/// (a Ctrl-C handler, a UI button).
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives batches against one durable store and one render backend.
///
/// The orchestrator owns the glyph registry and the session's missing
/// character log. Batches and recovery passes both take `&mut self`, so a
/// recovery pass can never run while a batch is reading the registry.
pub struct BatchOrchestrator {
    journal: SessionJournal,
    backend: Arc<dyn RenderBackend>,
    font: Arc<dyn FontContext>,
    tokenizer: Arc<dyn Tokenizer>,
    registry: GlyphRegistry,
    registry_loaded: bool,
    table: StaticGlyphTable,
    missing: MissingCharacterLog,
    state: BatchState,
    stop: StopHandle,
    log_subscribers: Vec<mpsc::UnboundedSender<LogEntry>>,
}

/// Mutable bookkeeping for one run.
struct Run {
    session: ConversionSession,
    paths: PathAllocator,
    archive: Option<Box<dyn ArchiveBuilder>>,
    snapshot: ProgressSnapshot,
    report: BatchReport,
    callback: Option<ProgressCallback>,
    user_font: Option<Arc<UserFont>>,
}

/// Why the task loop ended.
enum LoopEnd {
    Exhausted,
    Stopped,
    StoreFault(StoreError),
}

impl BatchOrchestrator {
    /// An orchestrator with the built-in font metrics and Unicode word
    /// segmentation.
    pub fn new(store: Arc<dyn DurableStore>, backend: Arc<dyn RenderBackend>) -> Self {
        Self {
            journal: SessionJournal::new(store),
            backend,
            font: Arc::new(BuiltinFonts),
            tokenizer: Arc::new(WordBoundaryTokenizer),
            registry: GlyphRegistry::new(),
            registry_loaded: false,
            table: StaticGlyphTable::new(),
            missing: MissingCharacterLog::new(),
            state: BatchState::Idle,
            stop: StopHandle::default(),
            log_subscribers: Vec::new(),
        }
    }

    pub fn with_font(mut self, font: Arc<dyn FontContext>) -> Self {
        self.font = font;
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn with_static_table(mut self, table: StaticGlyphTable) -> Self {
        self.table = table;
        self
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn registry(&self) -> &GlyphRegistry {
        &self.registry
    }

    /// Characters nothing could draw in the current or last batch.
    pub fn missing(&self) -> &MissingCharacterLog {
        &self.missing
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Ask the running batch to stop at the next task boundary.
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    /// A stream of every log entry appended from now on.
    pub fn subscribe_log(&mut self) -> UnboundedReceiverStream<LogEntry> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.log_subscribers.push(tx);
        UnboundedReceiverStream::new(rx)
    }

    /// Load learned glyphs from the store, replacing what is in memory.
    pub async fn load_registry(&mut self) -> Result<usize, BatchError> {
        self.registry = GlyphRegistry::load(self.journal.store().as_ref())
            .await
            .map_err(BatchError::Registry)?;
        self.registry_loaded = true;
        Ok(self.registry.len())
    }

    async fn ensure_registry(&mut self) -> Result<(), BatchError> {
        if !self.registry_loaded {
            self.load_registry().await?;
        }
        Ok(())
    }

    /// Forget a learned glyph and persist the registry.
    pub async fn forget_glyph(&mut self, ch: char) -> Result<bool, BatchError> {
        self.ensure_registry().await?;
        if self.registry.remove(ch).is_none() {
            return Ok(false);
        }
        self.registry
            .save(self.journal.store().as_ref())
            .await
            .map_err(BatchError::Registry)?;
        Ok(true)
    }

    // ── Recovery ─────────────────────────────────────────────────────────

    /// Ask `recognizer` for a bitmap of every missing character and persist
    /// what it learns.
    ///
    /// The pending set is the current missing log or, when that is empty,
    /// the snapshot journaled with the active session. Learned characters
    /// are removed from both so a resumed batch no longer reports them.
    pub async fn recover_missing(
        &mut self,
        recognizer: &dyn GlyphRecognizer,
    ) -> Result<RecoveryReport, BatchError> {
        if self.state.is_busy() {
            return Err(BatchError::AlreadyRunning {
                state: self.state.to_string(),
            });
        }
        self.ensure_registry().await?;

        let mut session = self.journal.load_active().await.unwrap_or_else(|e| {
            warn!("ignoring unreadable session during recovery: {e}");
            None
        });
        if self.missing.is_empty() {
            if let Some(s) = &session {
                self.missing = MissingCharacterLog::restore(&s.missing);
            }
        }

        let pending = self.missing.chars().to_vec();
        if pending.is_empty() {
            debug!("no missing glyphs to recover");
            return Ok(RecoveryReport::default());
        }
        info!(pending = pending.len(), "starting glyph recovery");

        let report = run_recovery_pass(&mut self.registry, &pending, recognizer).await;
        if report.learned.is_empty() {
            return Ok(report);
        }

        self.registry
            .save(self.journal.store().as_ref())
            .await
            .map_err(BatchError::Registry)?;

        let still_missing: Vec<String> = self
            .missing
            .chars()
            .iter()
            .filter(|c| !report.learned.contains(*c))
            .map(|&c| codepoint_key(c))
            .collect();
        self.missing = MissingCharacterLog::restore(&still_missing);

        if let Some(s) = session.as_mut() {
            s.missing.retain(|k| still_missing.contains(k));
            if let Err(e) = self.journal.save(s).await {
                warn!(session = %s.id, "could not update journaled missing glyphs: {e}");
            }
        }
        Ok(report)
    }

    // ── Entry points ─────────────────────────────────────────────────────

    /// Convert `queue` into one archive.
    ///
    /// # Errors
    /// Returns `Err` only when the batch cannot start (empty queue, journal
    /// or registry unavailable) or the archive cannot be assembled.
    /// Per-item failures are in the returned report.
    pub async fn start_batch(
        &mut self,
        queue: Vec<SourceTask>,
        config: BatchConfig,
    ) -> Result<BatchOutcome, BatchError> {
        if self.state.is_busy() {
            return Err(BatchError::AlreadyRunning {
                state: self.state.to_string(),
            });
        }
        if queue.is_empty() {
            return Err(BatchError::EmptyQueue);
        }
        self.ensure_registry().await?;
        let user_font = load_user_font(&config).await?;
        self.stop.reset();
        self.missing.clear();

        let base_name = config
            .archive_base_name
            .clone()
            .unwrap_or_else(|| format!("Convert_{}", Utc::now().timestamp_millis()));
        let callback = config.progress_callback.clone();
        let session = ConversionSession::new(base_name, queue, config);

        if session.mode == ResourceMode::Safe {
            self.discard_stale_session().await?;
            self.journal
                .create(&session)
                .await
                .map_err(BatchError::JournalInit)?;
        }

        info!(
            session = %session.id,
            tasks = session.original_queue.len(),
            mode = ?session.mode,
            "batch started"
        );
        self.run(session, callback, Vec::new(), user_font).await
    }

    /// Continue the journaled session from its first unfinished task.
    ///
    /// Artifacts stored before the interruption are reused as they are and
    /// their paths stay claimed. The progress callback is not journaled, so
    /// it is passed again here.
    pub async fn resume_batch(
        &mut self,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<BatchOutcome, BatchError> {
        if self.state.is_busy() {
            return Err(BatchError::AlreadyRunning {
                state: self.state.to_string(),
            });
        }
        let mut session = self
            .journal
            .load_active()
            .await?
            .ok_or(BatchError::NoActiveSession)?;
        self.ensure_registry().await?;
        let user_font = load_user_font(&session.config).await?;
        self.stop.reset();
        self.missing = MissingCharacterLog::restore(&session.missing);
        session.config.progress_callback = progress_callback.clone();

        let restored = session.output_paths.clone();
        info!(
            session = %session.id,
            at = session.current_index,
            of = session.original_queue.len(),
            artifacts = restored.len(),
            "resuming batch"
        );
        self.run(session, progress_callback, restored, user_font).await
    }

    /// Drop a journaled session that a new Safe batch is about to replace,
    /// so its artifacts do not linger in the store unreachable.
    async fn discard_stale_session(&mut self) -> Result<(), BatchError> {
        let stale = match self.journal.load_active().await {
            Ok(Some(session)) => {
                warn!(
                    session = %session.id,
                    at = session.current_index,
                    of = session.original_queue.len(),
                    "discarding unfinished session replaced by a new batch"
                );
                session.id
            }
            Ok(None) => return Ok(()),
            Err(BatchError::CorruptSession { id, detail }) => {
                warn!(session = %id, "discarding corrupt session: {detail}");
                id
            }
            Err(e) => return Err(e),
        };
        self.journal
            .clear(stale)
            .await
            .map_err(BatchError::JournalInit)
    }

    // ── Run loop ─────────────────────────────────────────────────────────

    async fn run(
        &mut self,
        session: ConversionSession,
        callback: Option<ProgressCallback>,
        restored: Vec<String>,
        user_font: Option<Arc<UserFont>>,
    ) -> Result<BatchOutcome, BatchError> {
        let started = Instant::now();
        let archive: Option<Box<dyn ArchiveBuilder>> = match session.mode {
            ResourceMode::Fast => Some(Box::new(
                TarGzArchive::new().with_budget(session.config.fast_memory_budget),
            )),
            ResourceMode::Safe => None,
        };
        let mut run = Run {
            paths: PathAllocator::with_used(session.output_paths.iter().cloned()),
            snapshot: session.progress,
            report: BatchReport {
                artifacts: restored,
                ..Default::default()
            },
            archive,
            callback,
            user_font,
            session,
        };

        // ── Scanning ─────────────────────────────────────────────────────
        self.state = BatchState::Scanning;
        self.scan(&mut run).await;
        if let Some(cb) = &run.callback {
            cb.on_batch_start(&run.snapshot);
        }
        let resumed = run.session.current_index > 0;
        let message = format!(
            "{} {} task(s), {} item(s)",
            if resumed { "resuming" } else { "starting" },
            run.session.remaining().len(),
            run.snapshot.total_file_count - run.snapshot.processed_file_count
        );
        self.log(&mut run, LogEntry::info(None, message));

        // ── Running ──────────────────────────────────────────────────────
        self.state = BatchState::Running;
        let end = self.run_tasks(&mut run).await;

        let completed = match end {
            LoopEnd::Exhausted => true,
            LoopEnd::Stopped => {
                let left = run.session.remaining().len();
                self.log(
                    &mut run,
                    LogEntry::warn(None, format!("stop requested; {left} task(s) not processed")),
                );
                false
            }
            LoopEnd::StoreFault(e) => return Ok(self.partial(run, e)),
        };

        // ── Finalizing ───────────────────────────────────────────────────
        self.state = BatchState::Finalizing;
        let bytes = match self.assemble(&mut run).await {
            Ok(bytes) => bytes,
            Err(source) => {
                let resumable = run.session.mode == ResourceMode::Safe;
                self.state = if resumable {
                    BatchState::Partial
                } else {
                    BatchState::Idle
                };
                warn!(session = %run.session.id, resumable, "archive assembly failed: {source}");
                if let Some(cb) = &run.callback {
                    cb.on_batch_complete(false, &run.snapshot);
                }
                return Err(BatchError::ArchiveFailed { source, resumable });
            }
        };

        if run.session.mode == ResourceMode::Safe && completed {
            if let Err(e) = self.journal.clear(run.session.id).await {
                warn!(session = %run.session.id, "could not clear finished session: {e}");
            }
        }

        self.state = BatchState::Done;
        run.report.snapshot = run.snapshot;
        run.report.missing = self.missing.snapshot();
        info!(
            session = %run.session.id,
            artifacts = run.report.artifacts.len(),
            errors = run.report.error_count(),
            missing = run.report.missing.len(),
            completed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch finished"
        );
        if let Some(cb) = &run.callback {
            cb.on_batch_complete(completed, &run.snapshot);
        }

        Ok(BatchOutcome::Done {
            archive: ArchiveOutput {
                file_name: format!("{}.tar.gz", run.session.base_name),
                bytes,
            },
            completed,
            report: run.report,
        })
    }

    /// Fix the totals before any task runs so progress never goes backwards.
    async fn scan(&self, run: &mut Run) {
        let queue = &run.session.original_queue;
        let mut items = 0usize;
        for task in run.session.remaining() {
            items += match load_text(task).await {
                Ok(text) => count_items(&text),
                Err(_) => 1,
            };
        }
        run.snapshot.total_bytes = queue.iter().map(|t| t.size).sum();
        run.snapshot.total_file_count = run.snapshot.processed_file_count + items;
        run.snapshot.current_page_percent = 0.0;
        debug!(
            items,
            bytes = run.snapshot.total_bytes,
            "pre-scan complete"
        );
    }

    async fn run_tasks(&mut self, run: &mut Run) -> LoopEnd {
        while !run.session.is_finished() {
            if self.stop.is_stop_requested() {
                info!(at = run.session.current_index, "stop honoured at task boundary");
                return LoopEnd::Stopped;
            }

            let index = run.session.current_index;
            let task = run.session.original_queue[index].clone();
            let bytes_before = run.snapshot.processed_bytes;

            if let Err(e) = self.run_task(run, index, &task).await {
                return LoopEnd::StoreFault(e);
            }

            run.session.current_index += 1;
            run.snapshot.processed_bytes = bytes_before + task.size;
            run.snapshot.current_page_percent = 0.0;
            run.session.progress = run.snapshot;
            run.session.missing = self.missing.snapshot();
            run.session.output_paths = run.report.artifacts.clone();

            if run.session.mode == ResourceMode::Safe {
                if let Err(e) = self.journal.save(&mut run.session).await {
                    return LoopEnd::StoreFault(e);
                }
            }
            if let Some(cb) = &run.callback {
                cb.on_task_complete(index, &run.snapshot);
            }
        }
        LoopEnd::Exhausted
    }

    /// Process every item of one task. Only a non-quota store fault is
    /// returned; everything else is logged.
    async fn run_task(
        &mut self,
        run: &mut Run,
        index: usize,
        task: &SourceTask,
    ) -> Result<(), StoreError> {
        let text = match load_text(task).await {
            Ok(text) => text,
            Err(e) => {
                run.snapshot.processed_file_count += 1;
                self.item_failed(run, index, e);
                return Ok(());
            }
        };

        let items = split_dump(&text, &task.display_name);
        let item_count = items.len();
        let ext = self.backend.extension().to_string();
        let bytes_before = run.snapshot.processed_bytes;

        for (k, item) in items.iter().enumerate() {
            if let Some(cb) = &run.callback {
                cb.on_item_start(index, &item.name);
            }

            let doc = {
                let ctx = LayoutContext {
                    font: self.font.as_ref(),
                    user_font: run.user_font.as_ref(),
                    tokenizer: self.tokenizer.as_ref(),
                    registry: &self.registry,
                    table: &self.table,
                };
                layout_item(&ctx, &run.session.config, item, &mut self.missing)
            };

            let on_page = page_reporter(run, task.size, bytes_before, k, item_count);
            let rendered = render_document(self.backend.clone(), doc, on_page).await;

            run.snapshot.processed_file_count += 1;
            run.snapshot.total_file_count = run
                .snapshot
                .total_file_count
                .max(run.snapshot.processed_file_count);
            run.snapshot.processed_bytes =
                bytes_before + item_share(task.size, k + 1, item_count);

            let bytes = match rendered {
                Ok(bytes) => bytes,
                Err(e) => {
                    let error = ItemError::RenderFailed {
                        name: item.name.clone(),
                        detail: e.to_string(),
                    };
                    self.item_failed(run, index, error);
                    continue;
                }
            };

            let desired = desired_path(run.session.config.layout, task, item, &ext);
            let path = run.paths.allocate(&desired);

            if let Some(archive) = run.archive.as_mut() {
                archive.add(OutputArtifact {
                    path: path.clone(),
                    bytes,
                });
            } else {
                match self.journal.put_artifact(run.session.id, &path, bytes).await {
                    Ok(()) => {}
                    Err(e) if e.is_quota() => {
                        run.paths.release(&path);
                        warn!(path = %path, "{e}");
                        self.item_failed(run, index, ItemError::QuotaExceeded { path });
                        continue;
                    }
                    Err(e) => {
                        run.paths.release(&path);
                        return Err(e);
                    }
                }
            }

            run.report.artifacts.push(path.clone());
            if let Some(cb) = &run.callback {
                cb.on_item_complete(&path, &run.snapshot);
            }
            self.log(
                run,
                LogEntry::info(Some(index), format!("{} → {path}", item.name)),
            );
        }
        Ok(())
    }

    fn item_failed(&mut self, run: &mut Run, index: usize, error: ItemError) {
        warn!(task = index, "{error}");
        if let Some(cb) = &run.callback {
            cb.on_item_error(&error, &run.snapshot);
        }
        self.log(run, LogEntry::item_error(index, error));
    }

    async fn assemble(&mut self, run: &mut Run) -> Result<Vec<u8>, ArchiveError> {
        let builder: Box<dyn ArchiveBuilder> = match run.archive.take() {
            Some(archive) => archive,
            None => Box::new(self.collect_stored(run).await?),
        };

        tokio::task::spawn_blocking(move || builder.build())
            .await
            .map_err(|e| ArchiveError::Io(std::io::Error::other(format!("archive task panicked: {e}"))))?
    }

    /// Enumerate the session's stored artifacts and read them back in the
    /// order their paths were claimed.
    ///
    /// A claimed path with nothing behind it is logged as an item error and
    /// left out; stored keys nobody claimed are leftovers of a task that
    /// was re-rendered after a resume and are skipped.
    async fn collect_stored(&mut self, run: &mut Run) -> Result<TarGzArchive, ArchiveError> {
        let id = run.session.id;
        let read_err = |path: &str| {
            let key = SessionJournal::artifact_key(id, path);
            move |source| ArchiveError::Store { key, source }
        };

        let stored: HashSet<String> = self
            .journal
            .list_artifacts(id)
            .await
            .map_err(read_err(""))?
            .into_iter()
            .collect();

        let mut archive = TarGzArchive::new();
        let mut lost = Vec::new();
        for path in &run.report.artifacts {
            let bytes = if stored.contains(path) {
                self.journal.get_artifact(id, path).await.map_err(read_err(path))?
            } else {
                None
            };
            match bytes {
                Some(bytes) => archive.add(OutputArtifact {
                    path: path.clone(),
                    bytes,
                }),
                None => lost.push(path.clone()),
            }
        }

        let unclaimed = stored.len().saturating_sub(archive.len());
        if unclaimed > 0 {
            debug!(session = %id, unclaimed, "skipping stored artifacts with no claimed path");
        }
        for path in lost {
            warn!(session = %id, path = %path, "claimed artifact missing from the store");
            run.report.artifacts.retain(|p| p != &path);
            let error = ItemError::ArtifactLost { path };
            if let Some(cb) = &run.callback {
                cb.on_item_error(&error, &run.snapshot);
            }
            self.log(run, LogEntry::item_error(None, error));
        }
        Ok(archive)
    }

    fn partial(&mut self, mut run: Run, fault: StoreError) -> BatchOutcome {
        self.state = BatchState::Partial;
        warn!(session = %run.session.id, at = run.session.current_index, "store fault, batch stopped: {fault}");
        let at = run.session.current_index;
        self.log(
            &mut run,
            LogEntry::warn(Some(at), format!("store fault, batch stopped: {fault}")),
        );
        run.report.snapshot = run.snapshot;
        run.report.missing = self.missing.snapshot();
        if let Some(cb) = &run.callback {
            cb.on_batch_complete(false, &run.snapshot);
        }
        BatchOutcome::Partial {
            session_id: run.session.id,
            remaining: run.session.remaining().to_vec(),
            config: run.session.config.clone(),
            report: run.report,
        }
    }

    /// Append to the batch log and fan the entry out.
    fn log(&mut self, run: &mut Run, entry: LogEntry) {
        if let Some(cb) = &run.callback {
            cb.on_log(&entry);
        }
        self.log_subscribers
            .retain(|tx| tx.send(entry.clone()).is_ok());
        run.report.log.push(entry);
    }
}

/// Load the configured user font off the async runtime.
async fn load_user_font(config: &BatchConfig) -> Result<Option<Arc<UserFont>>, BatchError> {
    let Some(path) = config.custom_font.clone() else {
        return Ok(None);
    };
    let font = tokio::task::spawn_blocking(move || UserFont::open(&path))
        .await
        .map_err(|e| BatchError::Internal(format!("font loading panicked: {e}")))??;
    info!(font = font.name(), coverage = font.coverage(), "custom font loaded");
    Ok(Some(Arc::new(font)))
}

/// Byte share of the first `done` of `count` items of a task of `size` bytes.
fn item_share(size: u64, done: usize, count: usize) -> u64 {
    if count == 0 {
        return size;
    }
    size * done as u64 / count as u64
}

/// Page-progress closure for the render thread.
fn page_reporter(
    run: &Run,
    size: u64,
    bytes_before: u64,
    item: usize,
    item_count: usize,
) -> impl Fn(usize, usize) + Send + 'static {
    let callback = run.callback.clone();
    let base = run.snapshot;
    move |done, total| {
        let Some(cb) = &callback else { return };
        let fraction = if total == 0 {
            1.0
        } else {
            done as f32 / total as f32
        };
        let item_bytes = item_share(size, item + 1, item_count) - item_share(size, item, item_count);
        let snapshot = ProgressSnapshot {
            current_page_percent: fraction * 100.0,
            processed_bytes: bytes_before
                + item_share(size, item, item_count)
                + (item_bytes as f32 * fraction) as u64,
            ..base
        };
        cb.on_page_progress(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::LayoutJsonBackend;
    use crate::store::MemoryStore;

    fn orchestrator(store: Arc<MemoryStore>) -> BatchOrchestrator {
        BatchOrchestrator::new(store, Arc::new(LayoutJsonBackend::new()))
    }

    fn config(mode: ResourceMode) -> BatchConfig {
        BatchConfig::builder()
            .mode(mode)
            .archive_base_name("test")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn empty_queue_is_rejected() {
        let mut orch = orchestrator(Arc::new(MemoryStore::new()));
        let err = orch
            .start_batch(Vec::new(), config(ResourceMode::Fast))
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::EmptyQueue));
        assert_eq!(orch.state(), BatchState::Idle);
    }

    #[tokio::test]
    async fn resume_without_session_is_an_error() {
        let mut orch = orchestrator(Arc::new(MemoryStore::new()));
        let err = orch.resume_batch(None).await.unwrap_err();
        assert!(matches!(err, BatchError::NoActiveSession));
    }

    #[tokio::test]
    async fn fast_batch_builds_named_archive() {
        let mut orch = orchestrator(Arc::new(MemoryStore::new()));
        let queue = vec![
            SourceTask::inline("a.txt", "alpha"),
            SourceTask::inline("b.rs", "fn b() {}"),
        ];
        let outcome = orch.start_batch(queue, config(ResourceMode::Fast)).await.unwrap();
        match outcome {
            BatchOutcome::Done {
                archive,
                completed,
                report,
            } => {
                assert!(completed);
                assert_eq!(archive.file_name, "test.tar.gz");
                assert_eq!(report.artifacts, vec!["a.pdf", "b.pdf"]);
                assert_eq!(report.snapshot.processed_file_count, 2);
                assert_eq!(report.snapshot.processed_bytes, report.snapshot.total_bytes);
            }
            other => panic!("expected Done, got {other:?}"),
        }
        assert_eq!(orch.state(), BatchState::Done);
    }

    #[tokio::test]
    async fn safe_batch_clears_its_session() {
        let store = Arc::new(MemoryStore::new());
        let mut orch = orchestrator(store.clone());
        let queue = vec![SourceTask::inline("a.txt", "alpha")];
        let outcome = orch.start_batch(queue, config(ResourceMode::Safe)).await.unwrap();
        assert!(outcome.is_done());
        assert!(store.list_keys("sessions/").await.unwrap().is_empty());
    }

    /// Emits a fixed number of bytes per item, more for titles containing "big".
    struct SizedBackend;

    impl RenderBackend for SizedBackend {
        fn render(
            &self,
            doc: &crate::render::RenderDocument,
            _progress: &dyn Fn(usize, usize),
        ) -> Result<Vec<u8>, crate::error::RenderError> {
            let size = if doc.title.contains("big") { 200_000 } else { 100 };
            Ok(vec![b'x'; size])
        }
    }

    #[tokio::test]
    async fn safe_quota_failure_drops_the_artifact_and_continues() {
        let store = Arc::new(MemoryStore::new().with_quota(100_000));
        let mut orch = BatchOrchestrator::new(store, Arc::new(SizedBackend));
        let queue = vec![
            SourceTask::inline("small.txt", "x"),
            SourceTask::inline("big.txt", "y"),
            SourceTask::inline("tiny.txt", "z"),
        ];
        let outcome = orch.start_batch(queue, config(ResourceMode::Safe)).await.unwrap();
        let report = outcome.report();
        assert!(outcome.is_done());
        assert_eq!(report.artifacts, vec!["small.pdf", "tiny.pdf"]);
        assert_eq!(report.error_count(), 1);
        assert!(report
            .log
            .iter()
            .any(|e| matches!(e.error, Some(ItemError::QuotaExceeded { .. }))));
    }

    #[tokio::test]
    async fn fast_memory_budget_fails_at_assembly() {
        let mut orch = orchestrator(Arc::new(MemoryStore::new()));
        let config = BatchConfig::builder()
            .mode(ResourceMode::Fast)
            .fast_memory_budget(10)
            .build()
            .unwrap();
        let err = orch
            .start_batch(vec![SourceTask::inline("a.txt", "alpha")], config)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BatchError::ArchiveFailed {
                source: ArchiveError::MemoryBudgetExceeded { .. },
                resumable: false
            }
        ));
    }

    #[tokio::test]
    async fn log_subscription_sees_entries() {
        use tokio_stream::StreamExt;

        let mut orch = orchestrator(Arc::new(MemoryStore::new()));
        let log = orch.subscribe_log();
        orch.start_batch(
            vec![SourceTask::inline("a.txt", "alpha")],
            config(ResourceMode::Fast),
        )
        .await
        .unwrap();
        drop(orch);

        let entries: Vec<LogEntry> = log.collect().await;
        assert!(entries.len() >= 2);
        assert!(entries.iter().any(|e| e.message.contains("a.pdf")));
    }

    #[tokio::test]
    async fn new_safe_batch_discards_a_stopped_session() {
        let store = Arc::new(MemoryStore::new());
        let mut orch = orchestrator(store.clone());
        let queue: Vec<_> = (0..3)
            .map(|i| SourceTask::inline(format!("n{i}.txt"), "x"))
            .collect();

        let stop = orch.stop_handle();
        struct StopAfterFirst(StopHandle);
        impl crate::progress::BatchProgressCallback for StopAfterFirst {
            fn on_task_complete(&self, _index: usize, _snapshot: &ProgressSnapshot) {
                self.0.request_stop();
            }
        }
        let stopping = BatchConfig::builder()
            .progress_callback(Arc::new(StopAfterFirst(stop)))
            .build()
            .unwrap();
        let outcome = orch.start_batch(queue.clone(), stopping).await.unwrap();
        assert!(matches!(outcome, BatchOutcome::Done { completed: false, .. }));
        let stale = orch.journal.load_active().await.unwrap().unwrap().id;

        let outcome = orch.start_batch(queue, config(ResourceMode::Safe)).await.unwrap();
        assert!(matches!(outcome, BatchOutcome::Done { completed: true, .. }));
        let leftover = store.list_keys("sessions/").await.unwrap();
        assert!(leftover.is_empty(), "{stale} left {leftover:?}");
    }

    #[tokio::test]
    async fn fast_batch_leaves_a_stopped_session_resumable() {
        let store = Arc::new(MemoryStore::new());
        let mut orch = orchestrator(store.clone());
        let session = ConversionSession::new(
            "old".into(),
            vec![SourceTask::inline("a.txt", "x")],
            BatchConfig::default(),
        );
        orch.journal.create(&session).await.unwrap();

        orch.start_batch(vec![SourceTask::inline("b.txt", "y")], config(ResourceMode::Fast))
            .await
            .unwrap();
        let active = orch.journal.load_active().await.unwrap().unwrap();
        assert_eq!(active.id, session.id);
    }

    /// Accepts every write but silently keeps nothing for keys ending in
    /// `lost.pdf`.
    struct LossyStore(MemoryStore);

    impl DurableStore for LossyStore {
        fn put<'a>(
            &'a self,
            key: &'a str,
            bytes: Vec<u8>,
        ) -> futures::future::BoxFuture<'a, Result<(), StoreError>> {
            if key.ends_with("lost.pdf") {
                return Box::pin(async { Ok(()) });
            }
            self.0.put(key, bytes)
        }

        fn get<'a>(
            &'a self,
            key: &'a str,
        ) -> futures::future::BoxFuture<'a, Result<Option<Vec<u8>>, StoreError>> {
            self.0.get(key)
        }

        fn list_keys<'a>(
            &'a self,
            prefix: &'a str,
        ) -> futures::future::BoxFuture<'a, Result<Vec<String>, StoreError>> {
            self.0.list_keys(prefix)
        }

        fn delete_all<'a>(
            &'a self,
            prefix: &'a str,
        ) -> futures::future::BoxFuture<'a, Result<(), StoreError>> {
            self.0.delete_all(prefix)
        }
    }

    #[tokio::test]
    async fn artifact_missing_at_assembly_is_logged_not_archived() {
        let mut orch = BatchOrchestrator::new(
            Arc::new(LossyStore(MemoryStore::new())),
            Arc::new(LayoutJsonBackend::new()),
        );
        let queue = vec![
            SourceTask::inline("kept.txt", "a"),
            SourceTask::inline("lost.txt", "b"),
            SourceTask::inline("also.txt", "c"),
        ];
        let outcome = orch.start_batch(queue, config(ResourceMode::Safe)).await.unwrap();
        let BatchOutcome::Done { archive, report, .. } = outcome else {
            panic!("expected Done");
        };

        let entries = crate::archive::unpack(&archive.bytes).unwrap();
        let paths: Vec<_> = entries.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["kept.pdf", "also.pdf"]);
        assert_eq!(report.artifacts, vec!["kept.pdf", "also.pdf"]);
        let lost = report
            .log
            .iter()
            .find(|e| matches!(e.error, Some(ItemError::ArtifactLost { .. })))
            .unwrap();
        assert_eq!(lost.task_index, None);
        assert!(lost.message.contains("lost.pdf"));
    }

    #[tokio::test]
    async fn forgetting_a_glyph_persists() {
        let store = Arc::new(MemoryStore::new());
        let mut registry = GlyphRegistry::new();
        registry.insert('☃', "c25vdw==".to_string());
        registry.save(store.as_ref()).await.unwrap();

        let mut orch = orchestrator(store.clone());
        assert!(orch.forget_glyph('☃').await.unwrap());
        assert!(!orch.forget_glyph('☃').await.unwrap());
        assert!(orch.registry().get('☃').is_none());

        let reloaded = GlyphRegistry::load(store.as_ref()).await.unwrap();
        assert!(reloaded.get('☃').is_none());
    }

    #[tokio::test]
    async fn unreadable_custom_font_stops_the_batch_before_it_starts() {
        let store = Arc::new(MemoryStore::new());
        let mut orch = orchestrator(store.clone());
        let config = BatchConfig::builder()
            .custom_font("/nonexistent/Missing.ttf")
            .build()
            .unwrap();
        let err = orch
            .start_batch(vec![SourceTask::inline("a.txt", "x")], config)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::Font(_)));
        assert!(store.list_keys("sessions/").await.unwrap().is_empty());
        assert_eq!(orch.state(), BatchState::Idle);
    }

    #[tokio::test]
    async fn custom_font_draws_what_the_standard_faces_cannot() {
        let font = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/Tuffy.ttf");
        let text = "Ελληνικά και русский";

        let mut orch = orchestrator(Arc::new(MemoryStore::new()));
        orch.start_batch(vec![SourceTask::inline("a.txt", text)], config(ResourceMode::Fast))
            .await
            .unwrap();
        assert!(!orch.missing().is_empty());

        let with_font = BatchConfig::builder()
            .mode(ResourceMode::Fast)
            .custom_font(font)
            .build()
            .unwrap();
        let outcome = orch
            .start_batch(vec![SourceTask::inline("a.txt", text)], with_font)
            .await
            .unwrap();
        assert!(orch.missing().is_empty());
        assert!(outcome.report().missing.is_empty());
    }

    #[test]
    fn item_shares_add_up() {
        assert_eq!(item_share(10, 3, 3), 10);
        assert_eq!(item_share(10, 0, 3), 0);
        assert_eq!(item_share(7, 1, 0), 7);
    }
}
