// Progress aggregation: workers bump atomics, a ticker thread samples them.
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Sampling cadence of the progress ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickInterval {
    /// Terminal UI; redraws feel live.
    #[default]
    Interactive,
    /// Scripted / non-TTY output.
    Simple,
    Custom(Duration),
}

impl TickInterval {
    pub fn duration(self) -> Duration {
        match self {
            TickInterval::Interactive => Duration::from_millis(10),
            TickInterval::Simple => Duration::from_millis(100),
            TickInterval::Custom(d) => d,
        }
    }
}

/// Bytes moved for the item currently in flight.
#[derive(Debug, Clone, Default)]
pub struct ProgressCounter(Arc<AtomicU64>);

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::SeqCst);
    }

    pub fn load(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

/// Point-in-time view of a batch, safe to hand to a renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Batch-level: completed items plus the current item's bytes.
    pub bytes_so_far: u64,
    pub item_bytes: u64,
    pub total_bytes: u64,
    pub current_file: String,
    pub files_completed: usize,
    pub total_files: usize,
    pub elapsed: Duration,
    pub throughput_bps: f64,
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> u64 {
        if self.total_bytes == 0 {
            return if self.total_files > 0 && self.files_completed == self.total_files {
                100
            } else {
                0
            };
        }
        (self.bytes_so_far.saturating_mul(100) / self.total_bytes).min(100)
    }
}

/// `throughput = bytes / elapsed`, `eta = remaining / throughput`.
pub fn rates(bytes_so_far: u64, total: u64, elapsed: Duration) -> (f64, Option<Duration>) {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 || bytes_so_far == 0 {
        return (0.0, None);
    }
    let bps = bytes_so_far as f64 / secs;
    let remaining = total.saturating_sub(bytes_so_far) as f64;
    (bps, Some(Duration::from_secs_f64(remaining / bps)))
}

/// Shared batch state behind the progress snapshots.
#[derive(Debug)]
pub struct BatchProgress {
    item: ProgressCounter,
    completed_bytes: AtomicU64,
    files_completed: AtomicUsize,
    total_files: AtomicUsize,
    total_bytes: AtomicU64,
    current_file: Mutex<String>,
    started: Mutex<Option<Instant>>,
    // largest bytes_so_far handed out; snapshots never go backwards
    high_water: AtomicU64,
}

impl Default for BatchProgress {
    fn default() -> Self {
        Self {
            item: ProgressCounter::new(),
            completed_bytes: AtomicU64::new(0),
            files_completed: AtomicUsize::new(0),
            total_files: AtomicUsize::new(0),
            total_bytes: AtomicU64::new(0),
            current_file: Mutex::new(String::new()),
            started: Mutex::new(None),
            high_water: AtomicU64::new(0),
        }
    }
}

impl BatchProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter the workers of the current item write to.
    pub fn item_counter(&self) -> &ProgressCounter {
        &self.item
    }

    pub fn begin_batch(&self, total_files: usize, total_bytes: u64) {
        self.total_files.store(total_files, Ordering::SeqCst);
        self.total_bytes.store(total_bytes, Ordering::SeqCst);
        self.high_water.store(0, Ordering::SeqCst);
        if let Ok(mut s) = self.started.lock() {
            *s = Some(Instant::now());
        }
    }

    pub fn begin_item(&self, name: &str) {
        self.item.reset();
        if let Ok(mut cur) = self.current_file.lock() {
            *cur = name.to_string();
        }
    }

    /// Fold a finished item into the batch total. Sizes discovered late (a
    /// download of unknown length) grow the total so it never trails the bytes.
    pub fn finish_item(&self, size: u64) {
        // swap first so a concurrent snapshot under-reads rather than double counts
        let moved = self.item.0.swap(0, Ordering::SeqCst).max(size);
        let done = self.completed_bytes.fetch_add(moved, Ordering::SeqCst) + moved;
        self.total_bytes.fetch_max(done, Ordering::SeqCst);
        self.files_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        // completed before item: racing finish_item can only under-read here
        let completed = self.completed_bytes.load(Ordering::SeqCst);
        let item_bytes = self.item.load();
        let total_bytes = self.total_bytes.load(Ordering::SeqCst);
        let seen = completed + item_bytes;
        let bytes_so_far = self.high_water.fetch_max(seen, Ordering::SeqCst).max(seen);
        let elapsed = self
            .started
            .lock()
            .ok()
            .and_then(|s| s.map(|t| t.elapsed()))
            .unwrap_or_default();
        let (throughput_bps, eta) = rates(bytes_so_far, total_bytes.max(bytes_so_far), elapsed);
        ProgressSnapshot {
            bytes_so_far,
            item_bytes,
            total_bytes,
            current_file: self.current_file.lock().map(|s| s.clone()).unwrap_or_default(),
            files_completed: self.files_completed.load(Ordering::SeqCst),
            total_files: self.total_files.load(Ordering::SeqCst),
            elapsed,
            throughput_bps,
            eta,
        }
    }
}
