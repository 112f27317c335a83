// transfer module: multipart upload / streamed download orchestration
mod enumeration;
mod helpers;
pub mod http;
pub mod plan;
pub mod progress;
pub mod transport;
mod workers;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};

pub use helpers::{join_remote, normalize_path, remote_basename, remote_parent};
pub use http::HttpTransport;
pub use plan::{Part, PartPlan, plan_parts};
pub use progress::{BatchProgress, ProgressCounter, ProgressSnapshot, TickInterval};
pub use transport::{PartResult, PartUrl, RemoteEntry, Scope, Transport, UploadSession};

use self::enumeration::{enumerate_local, resolve_remote};
use self::helpers::display_path;
use self::workers::SharedFile;
use self::workers::download::copy_stream;
use self::workers::upload::{PartPoolCtx, run_part_uploads};
use crate::TransferError;
use crate::cancel::CancelToken;
use crate::util::{RetryPolicy, retry_with_backoff};

pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;
pub const MAX_CONCURRENT_UPLOADS: usize = 10;
pub const MAX_RETRY_ATTEMPTS: usize = 3;
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(2);

// Progress events are dropped rather than queued once a consumer falls this far behind.
const PROGRESS_BACKLOG_LIMIT: usize = 64;

/// One logical file of a batch. Immutable once enumerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferItem {
    pub local_path: PathBuf,
    /// Forward-slash normalized, prefixed with the destination root.
    pub remote_path: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Upload => f.write_str("upload"),
            Direction::Download => f.write_str("download"),
        }
    }
}

impl TransferItem {
    /// Short name shown while the item is in flight.
    pub fn display_name(&self, direction: Direction) -> String {
        match direction {
            Direction::Upload => self
                .local_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| display_path(&self.local_path).to_string()),
            Direction::Download => remote_basename(&self.remote_path),
        }
    }
}

/// Tunables for one transfer invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOptions {
    pub part_size: u64,
    pub max_concurrent_uploads: usize,
    pub max_retry_attempts: usize,
    pub initial_retry_delay: Duration,
    pub tick: TickInterval,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            max_concurrent_uploads: MAX_CONCURRENT_UPLOADS,
            max_retry_attempts: MAX_RETRY_ATTEMPTS,
            initial_retry_delay: INITIAL_RETRY_DELAY,
            tick: TickInterval::Interactive,
        }
    }
}

impl TransferOptions {
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.part_size == 0 {
            return Err(TransferError::Validation("part size must be greater than zero".into()));
        }
        if self.max_concurrent_uploads == 0 {
            return Err(TransferError::Validation(
                "max concurrent uploads must be greater than zero".into(),
            ));
        }
        if self.max_retry_attempts == 0 {
            return Err(TransferError::Validation("retry attempts must be at least one".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            initial_delay: self.initial_retry_delay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub local_root: PathBuf,
    pub remote_root: String,
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub remote_root: String,
    pub local_root: PathBuf,
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    pub direction: Direction,
    pub files: usize,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Orchestrator state; `Success` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    PreparingFiles,
    Transferring,
    Success,
    Error,
}

/// Everything a running transfer reports to its caller.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Prepared { direction: Direction, total_files: usize, total_bytes: u64 },
    Progress(ProgressSnapshot),
    PartUploaded { file: String, part_number: u32, bytes: u64 },
    ItemCompleted { file: String, bytes: u64, files_completed: usize, total_files: usize },
    BatchCompleted(TransferSummary),
    BatchFailed(TransferError),
    BatchCancelled,
}

impl TransferEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferEvent::BatchCompleted(_)
                | TransferEvent::BatchFailed(_)
                | TransferEvent::BatchCancelled
        )
    }

    fn state_after(&self) -> Option<TransferState> {
        match self {
            TransferEvent::Prepared { .. } => Some(TransferState::Transferring),
            TransferEvent::BatchCompleted(_) => Some(TransferState::Success),
            TransferEvent::BatchFailed(_) | TransferEvent::BatchCancelled => {
                Some(TransferState::Error)
            }
            _ => None,
        }
    }
}

/// Where a run publishes its events. The default sink discards them.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<TransferEvent>>,
    state: Option<Arc<Mutex<TransferState>>>,
}

impl EventSink {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn channel() -> (Self, Receiver<TransferEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx: Some(tx), state: None }, rx)
    }

    fn with_state(mut self, state: Arc<Mutex<TransferState>>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn emit(&self, ev: TransferEvent) {
        if let (Some(state), Some(next)) = (&self.state, ev.state_after())
            && let Ok(mut s) = state.lock()
        {
            *s = next;
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(ev);
        }
    }

    fn emit_progress(&self, snapshot: ProgressSnapshot) {
        if let Some(tx) = &self.tx
            && tx.len() < PROGRESS_BACKLOG_LIMIT
        {
            let _ = tx.send(TransferEvent::Progress(snapshot));
        }
    }

    // Publish the terminal event matching `res` and hand `res` back.
    fn finish(
        &self,
        res: Result<TransferSummary, TransferError>,
    ) -> Result<TransferSummary, TransferError> {
        match &res {
            Ok(summary) => self.emit(TransferEvent::BatchCompleted(summary.clone())),
            Err(TransferError::UserCancelled) => self.emit(TransferEvent::BatchCancelled),
            Err(e) => self.emit(TransferEvent::BatchFailed(e.clone())),
        }
        res
    }
}

/// Borrowed collaborators of one run.
pub struct RunCtx<'a> {
    pub transport: &'a dyn Transport,
    pub options: &'a TransferOptions,
    pub cancel: &'a CancelToken,
    pub progress: &'a BatchProgress,
    pub events: &'a EventSink,
}

impl RunCtx<'_> {
    fn check_cancel(&self) -> Result<(), TransferError> {
        if self.cancel.is_cancelled() {
            Err(TransferError::UserCancelled)
        } else {
            Ok(())
        }
    }

    // A call that failed because the batch was cancelled reports as a cancel.
    fn classify(&self, e: TransferError) -> TransferError {
        if self.cancel.is_cancelled() {
            TransferError::UserCancelled
        } else {
            e
        }
    }
}

/// Upload a local file or directory tree, one file at a time, blocking until
/// the batch finishes. Emits a terminal event before returning.
pub fn run_upload(
    ctx: &RunCtx<'_>,
    request: &UploadRequest,
) -> Result<TransferSummary, TransferError> {
    let res = upload_batch(ctx, request).map_err(|e| ctx.classify(e));
    ctx.events.finish(res)
}

/// Download a remote file or directory tree, one file at a time.
pub fn run_download(
    ctx: &RunCtx<'_>,
    request: &DownloadRequest,
) -> Result<TransferSummary, TransferError> {
    let res = download_batch(ctx, request).map_err(|e| ctx.classify(e));
    ctx.events.finish(res)
}

fn upload_batch(
    ctx: &RunCtx<'_>,
    request: &UploadRequest,
) -> Result<TransferSummary, TransferError> {
    ctx.options.validate()?;
    if request.remote_root.trim().is_empty() {
        return Err(TransferError::Validation("destination path is empty".into()));
    }
    ctx.check_cancel()?;
    let (items, total_size) = enumerate_local(&request.local_root, &request.remote_root)?;
    if items.is_empty() {
        return Err(TransferError::Validation(format!(
            "no files found to upload in {}",
            display_path(&request.local_root)
        )));
    }
    tracing::info!("upload: {} files, {} bytes", items.len(), total_size);
    run_items(ctx, Direction::Upload, &items, total_size, |item, name| {
        upload_item(ctx, &request.scope, item, name)
            .map_err(|e| e.context(format!("failed to upload {}", display_path(&item.local_path))))
    })
}

fn download_batch(
    ctx: &RunCtx<'_>,
    request: &DownloadRequest,
) -> Result<TransferSummary, TransferError> {
    ctx.options.validate()?;
    if request.remote_root.trim().is_empty() {
        return Err(TransferError::Validation("source path is empty".into()));
    }
    if request.local_root.as_os_str().is_empty() {
        return Err(TransferError::Validation("destination path is empty".into()));
    }
    ctx.check_cancel()?;
    let (items, total_size) = resolve_remote(
        ctx.transport,
        ctx.cancel,
        &request.scope,
        &request.remote_root,
        &request.local_root,
    )?;
    if items.is_empty() {
        return Err(TransferError::Validation(format!(
            "no files found to download from {}",
            request.remote_root
        )));
    }
    tracing::info!("download: {} files, {} bytes", items.len(), total_size);
    run_items(ctx, Direction::Download, &items, total_size, |item, _name| {
        download_item(ctx, &request.scope, item)
            .map_err(|e| e.context(format!("failed to download {}", item.remote_path)))
    })
}

// Sequential per-item loop shared by both directions. The first failure stops
// the batch; nothing after it is attempted.
fn run_items<F>(
    ctx: &RunCtx<'_>,
    direction: Direction,
    items: &[TransferItem],
    total_size: u64,
    mut transfer_one: F,
) -> Result<TransferSummary, TransferError>
where
    F: FnMut(&TransferItem, &str) -> Result<(), TransferError>,
{
    let total_files = items.len();
    // Prepared goes out first; the ticker stays quiet until begin_batch
    ctx.events.emit(TransferEvent::Prepared { direction, total_files, total_bytes: total_size });
    ctx.progress.begin_batch(total_files, total_size);
    let start = Instant::now();
    let mut bytes = 0u64;
    for (idx, item) in items.iter().enumerate() {
        ctx.check_cancel()?;
        let name = item.display_name(direction);
        ctx.progress.begin_item(&name);
        tracing::info!(
            "{} {}/{}: {} ({} bytes)",
            direction,
            idx + 1,
            total_files,
            name,
            item.size_bytes
        );
        transfer_one(item, &name)?;
        let moved = ctx.progress.item_counter().load().max(item.size_bytes);
        ctx.progress.finish_item(item.size_bytes);
        bytes += moved;
        ctx.events.emit(TransferEvent::ItemCompleted {
            file: name,
            bytes: moved,
            files_completed: idx + 1,
            total_files,
        });
    }
    Ok(TransferSummary { direction, files: total_files, bytes, elapsed: start.elapsed() })
}

fn upload_item(
    ctx: &RunCtx<'_>,
    scope: &Scope,
    item: &TransferItem,
    name: &str,
) -> Result<(), TransferError> {
    let file = SharedFile::open(&item.local_path).map_err(|e| {
        TransferError::fs(format!("failed to open {}", display_path(&item.local_path)), e)
    })?;
    let plan = plan_parts(item.size_bytes, ctx.options.part_size);
    let session = ctx.transport.initiate_upload(ctx.cancel, scope, &item.remote_path, plan.len())?;
    tracing::debug!(
        "{}: upload session {} with {} parts",
        item.remote_path,
        session.upload_id,
        session.parts.len()
    );

    let pool_cancel = ctx.cancel.child();
    let parts = run_part_uploads(PartPoolCtx {
        transport: ctx.transport,
        file: &file,
        file_name: name,
        plan: &plan,
        urls: &session.parts,
        workers: ctx.options.max_concurrent_uploads,
        retry: ctx.options.retry_policy(),
        cancel: &pool_cancel,
        progress: ctx.progress.item_counter(),
        events: ctx.events,
    });
    let parts = match parts {
        Ok(p) => p,
        Err(e) => {
            abort_session(ctx.transport, scope, &item.remote_path, &session.upload_id);
            return Err(e);
        }
    };
    if let Err(e) = ctx.check_cancel() {
        abort_session(ctx.transport, scope, &item.remote_path, &session.upload_id);
        return Err(e);
    }
    ctx.transport.complete_upload(ctx.cancel, scope, &item.remote_path, &session.upload_id, &parts)
}

// Best effort: the session is already lost, so a failing abort is only logged.
fn abort_session(transport: &dyn Transport, scope: &Scope, remote_path: &str, upload_id: &str) {
    // fresh token: the batch token may already be cancelled
    if let Err(e) = transport.abort_upload(&CancelToken::new(), scope, remote_path, upload_id) {
        tracing::warn!("failed to abort upload {} for {}: {}", upload_id, remote_path, e);
    }
}

fn download_item(
    ctx: &RunCtx<'_>,
    scope: &Scope,
    item: &TransferItem,
) -> Result<(), TransferError> {
    let label = format!("download {}", item.remote_path);
    // only the setup is retried; once bytes flow a failure ends the item
    let mut body = retry_with_backoff(ctx.options.retry_policy(), ctx.cancel, &label, |_| {
        let url = ctx.transport.get_download_url(ctx.cancel, scope, &item.remote_path)?;
        ctx.transport.open_download(ctx.cancel, &url)
    })?;

    if let Some(parent) = item.local_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            TransferError::fs(format!("failed to create directory {}", display_path(parent)), e)
        })?;
    }
    let mut out = File::create(&item.local_path).map_err(|e| {
        TransferError::fs(format!("failed to create {}", display_path(&item.local_path)), e)
    })?;
    match copy_stream(&mut *body, &mut out, ctx.cancel, ctx.progress.item_counter()) {
        Ok(n) => {
            if item.size_bytes > 0 && n != item.size_bytes {
                tracing::warn!(
                    "{}: listed as {} bytes, received {}",
                    item.remote_path,
                    item.size_bytes,
                    n
                );
            }
            Ok(())
        }
        Err(e) => {
            drop(out);
            remove_partial(&item.local_path);
            Err(e)
        }
    }
}

fn remove_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::debug!("could not remove partial file {}: {}", display_path(path), e);
    }
}

/// A transfer running on its own thread.
pub struct TransferHandle {
    events: Receiver<TransferEvent>,
    cancel: CancelToken,
    state: Arc<Mutex<TransferState>>,
    join: JoinHandle<Result<TransferSummary, TransferError>>,
}

impl TransferHandle {
    /// Progress snapshots followed by exactly one terminal event.
    pub fn events(&self) -> &Receiver<TransferEvent> {
        &self.events
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> TransferState {
        self.state.lock().map(|s| *s).unwrap_or(TransferState::Error)
    }

    pub fn wait(self) -> Result<TransferSummary, TransferError> {
        self.join
            .join()
            .unwrap_or_else(|_| Err(TransferError::api("transfer thread panicked")))
    }
}

/// Start an upload in the background. Argument problems are reported here;
/// everything else arrives through the handle's event stream.
pub fn upload(
    transport: Arc<dyn Transport>,
    request: UploadRequest,
    options: TransferOptions,
    cancel: CancelToken,
) -> Result<TransferHandle, TransferError> {
    options.validate()?;
    if request.remote_root.trim().is_empty() {
        return Err(TransferError::Validation("destination path is empty".into()));
    }
    Ok(spawn_run(transport, options, cancel, move |ctx| upload_batch(ctx, &request)))
}

/// Start a download in the background.
pub fn download(
    transport: Arc<dyn Transport>,
    request: DownloadRequest,
    options: TransferOptions,
    cancel: CancelToken,
) -> Result<TransferHandle, TransferError> {
    options.validate()?;
    if request.remote_root.trim().is_empty() {
        return Err(TransferError::Validation("source path is empty".into()));
    }
    Ok(spawn_run(transport, options, cancel, move |ctx| download_batch(ctx, &request)))
}

fn spawn_run<F>(
    transport: Arc<dyn Transport>,
    options: TransferOptions,
    cancel: CancelToken,
    batch: F,
) -> TransferHandle
where
    F: FnOnce(&RunCtx<'_>) -> Result<TransferSummary, TransferError> + Send + 'static,
{
    let state = Arc::new(Mutex::new(TransferState::PreparingFiles));
    let (sink, events) = EventSink::channel();
    let sink = sink.with_state(state.clone());
    let run_cancel = cancel.clone();
    let join = std::thread::spawn(move || {
        let progress = BatchProgress::new();
        let done = AtomicBool::new(false);
        let ctx = RunCtx {
            transport: transport.as_ref(),
            options: &options,
            cancel: &run_cancel,
            progress: &progress,
            events: &sink,
        };
        let res = std::thread::scope(|s| {
            let ticker = s.spawn(|| {
                let tick = options.tick.duration();
                while !done.load(Ordering::SeqCst) {
                    std::thread::sleep(tick);
                    if progress.snapshot().total_files > 0 {
                        sink.emit_progress(progress.snapshot());
                    }
                }
            });
            let res = batch(&ctx).map_err(|e| ctx.classify(e));
            done.store(true, Ordering::SeqCst);
            let _ = ticker.join();
            res
        });
        if res.is_ok() {
            sink.emit(TransferEvent::Progress(progress.snapshot()));
        }
        sink.finish(res)
    });
    TransferHandle { events, cancel, state, join }
}
