#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{self, Cursor, Read};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use volcp::transfer::{
    PartResult, PartUrl, RemoteEntry, Scope, TickInterval, TransferOptions, Transport,
    UploadSession,
};
use volcp::{CancelToken, TransferError};

pub const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Initiate { path: String, part_count: usize },
    UploadPart { upload_id: String, part_number: u32, len: usize },
    Complete { path: String, upload_id: String, parts: Vec<u32> },
    Abort { upload_id: String },
    DownloadUrl { path: String },
    OpenDownload { path: String },
    List { path: String },
}

/// In-memory stand-in for the storage service.
#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<Call>>,
    next_session: AtomicUsize,
    sessions: Mutex<HashMap<String, (String, BTreeMap<u32, Vec<u8>>)>>,
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    empty_dirs: Mutex<BTreeSet<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    successful_parts: AtomicUsize,
    part_delay: Duration,
    fail_part: Option<u32>,
    flaky_parts: Mutex<HashMap<u32, usize>>,
    cancel_after_parts: Option<(usize, CancelToken)>,
    break_download: Option<(String, usize)>,
    flaky_download_url: AtomicUsize,
    flaky_open: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, data: Vec<u8>) -> Self {
        self.files.lock().unwrap().insert(path.to_string(), data);
        self
    }

    pub fn with_empty_dir(self, path: &str) -> Self {
        self.empty_dirs.lock().unwrap().insert(path.to_string());
        self
    }

    pub fn part_delay(mut self, d: Duration) -> Self {
        self.part_delay = d;
        self
    }

    /// Every attempt of this part fails with a permanent 403.
    pub fn fail_part(mut self, part_number: u32) -> Self {
        self.fail_part = Some(part_number);
        self
    }

    /// The first `times` attempts of this part fail with a 503.
    pub fn flaky_part(self, part_number: u32, times: usize) -> Self {
        self.flaky_parts.lock().unwrap().insert(part_number, times);
        self
    }

    /// Cancel `token` once this many parts have been accepted.
    pub fn cancel_after_parts(mut self, parts: usize, token: CancelToken) -> Self {
        self.cancel_after_parts = Some((parts, token));
        self
    }

    /// Download streams of `path` break after `after` bytes.
    pub fn break_download(mut self, path: &str, after: usize) -> Self {
        self.break_download = Some((path.to_string(), after));
        self
    }

    /// The first `times` download URL requests fail with a 503.
    pub fn flaky_download_url(self, times: usize) -> Self {
        self.flaky_download_url.store(times, Ordering::SeqCst);
        self
    }

    /// The first `times` stream opens fail with a 503.
    pub fn flaky_open(self, times: usize) -> Self {
        self.flaky_open.store(times, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn upload_part_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::UploadPart { .. }))
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn stored(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn list(&self, dir: &str) -> Option<Vec<RemoteEntry>> {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };
        let mut files = Vec::new();
        let mut folders = BTreeSet::new();
        for (path, data) in self.files.lock().unwrap().iter() {
            let Some(rest) = path.strip_prefix(&prefix) else { continue };
            match rest.split_once('/') {
                Some((folder, _)) => {
                    folders.insert(folder.to_string());
                }
                None => files.push(RemoteEntry {
                    name: rest.to_string(),
                    is_folder: false,
                    size_bytes: data.len() as u64,
                    last_modified: "2024-05-01T10:00:00Z".into(),
                }),
            }
        }
        for d in self.empty_dirs.lock().unwrap().iter() {
            if let Some(rest) = d.strip_prefix(&prefix)
                && !rest.is_empty()
                && !rest.contains('/')
            {
                folders.insert(rest.to_string());
            }
        }
        let known_dir = dir == "/" || self.empty_dirs.lock().unwrap().contains(dir);
        if files.is_empty() && folders.is_empty() && !known_dir {
            return None;
        }
        let mut out: Vec<RemoteEntry> = folders
            .into_iter()
            .map(|name| RemoteEntry {
                name: format!("{}/", name),
                is_folder: true,
                size_bytes: 0,
                last_modified: String::new(),
            })
            .collect();
        out.extend(files);
        Some(out)
    }
}

struct BreakingReader {
    data: Cursor<Vec<u8>>,
    remaining: usize,
}

impl Read for BreakingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
        }
        let cap = buf.len().min(self.remaining);
        let n = self.data.read(&mut buf[..cap])?;
        self.remaining -= n;
        Ok(n)
    }
}

// Consume one injected failure, if any are left.
fn take_failure(left: &AtomicUsize) -> bool {
    left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
}

fn parse_part_url(url: &str) -> (String, u32) {
    let rest = url.trim_start_matches("mem://");
    let (id, part) = rest.rsplit_once('/').unwrap();
    (id.to_string(), part.parse().unwrap())
}

impl Transport for MockTransport {
    fn initiate_upload(
        &self,
        cancel: &CancelToken,
        _scope: &Scope,
        remote_path: &str,
        part_count: usize,
    ) -> Result<UploadSession, TransferError> {
        if cancel.is_cancelled() {
            return Err(TransferError::UserCancelled);
        }
        self.record(Call::Initiate { path: remote_path.to_string(), part_count });
        let upload_id = format!("up-{}", self.next_session.fetch_add(1, Ordering::SeqCst));
        self.sessions
            .lock()
            .unwrap()
            .insert(upload_id.clone(), (remote_path.to_string(), BTreeMap::new()));
        let parts = (1..=part_count as u32)
            .map(|n| PartUrl { part_number: n, url: format!("mem://{}/{}", upload_id, n) })
            .collect();
        Ok(UploadSession { upload_id, parts })
    }

    fn upload_part(
        &self,
        _cancel: &CancelToken,
        url: &str,
        data: &[u8],
    ) -> Result<String, TransferError> {
        let (upload_id, part_number) = parse_part_url(url);
        self.record(Call::UploadPart {
            upload_id: upload_id.clone(),
            part_number,
            len: data.len(),
        });
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.part_delay);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_part == Some(part_number) {
            return Err(TransferError::api_status(403, "part rejected"));
        }
        if let Some(left) = self.flaky_parts.lock().unwrap().get_mut(&part_number)
            && *left > 0
        {
            *left -= 1;
            return Err(TransferError::api_status(503, "service unavailable"));
        }
        if let Some((_, parts)) = self.sessions.lock().unwrap().get_mut(&upload_id) {
            parts.insert(part_number, data.to_vec());
        }
        let accepted = self.successful_parts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after_parts
            && accepted >= *limit
        {
            token.cancel();
        }
        Ok(format!("\"etag-{}-{}\"", upload_id, part_number))
    }

    fn complete_upload(
        &self,
        _cancel: &CancelToken,
        _scope: &Scope,
        remote_path: &str,
        upload_id: &str,
        parts: &[PartResult],
    ) -> Result<(), TransferError> {
        self.record(Call::Complete {
            path: remote_path.to_string(),
            upload_id: upload_id.to_string(),
            parts: parts.iter().map(|p| p.part_number).collect(),
        });
        let (path, stored) = self
            .sessions
            .lock()
            .unwrap()
            .remove(upload_id)
            .ok_or_else(|| TransferError::api_status(404, "no such upload"))?;
        let mut data = Vec::new();
        for p in parts {
            let bytes = stored
                .get(&p.part_number)
                .ok_or_else(|| TransferError::api_status(400, "missing part"))?;
            data.extend_from_slice(bytes);
        }
        self.files.lock().unwrap().insert(path, data);
        Ok(())
    }

    fn abort_upload(
        &self,
        _cancel: &CancelToken,
        _scope: &Scope,
        _remote_path: &str,
        upload_id: &str,
    ) -> Result<(), TransferError> {
        self.record(Call::Abort { upload_id: upload_id.to_string() });
        self.sessions.lock().unwrap().remove(upload_id);
        Ok(())
    }

    fn get_download_url(
        &self,
        cancel: &CancelToken,
        _scope: &Scope,
        remote_path: &str,
    ) -> Result<String, TransferError> {
        if cancel.is_cancelled() {
            return Err(TransferError::UserCancelled);
        }
        self.record(Call::DownloadUrl { path: remote_path.to_string() });
        if take_failure(&self.flaky_download_url) {
            return Err(TransferError::api_status(503, "service unavailable"));
        }
        if self.files.lock().unwrap().contains_key(remote_path) {
            Ok(format!("mem-dl://{}", remote_path))
        } else {
            Err(TransferError::api_status(404, "file not found"))
        }
    }

    fn open_download(
        &self,
        _cancel: &CancelToken,
        url: &str,
    ) -> Result<Box<dyn Read + Send>, TransferError> {
        let path = url.trim_start_matches("mem-dl://").to_string();
        self.record(Call::OpenDownload { path: path.clone() });
        if take_failure(&self.flaky_open) {
            return Err(TransferError::api_status(503, "service unavailable"));
        }
        let data = self
            .files
            .lock()
            .unwrap()
            .get(&path)
            .cloned()
            .ok_or_else(|| TransferError::api_status(404, "gone"))?;
        match &self.break_download {
            Some((p, after)) if *p == path => {
                Ok(Box::new(BreakingReader { data: Cursor::new(data), remaining: *after }))
            }
            _ => Ok(Box::new(Cursor::new(data))),
        }
    }

    fn list_directory(
        &self,
        cancel: &CancelToken,
        _scope: &Scope,
        path: &str,
    ) -> Result<Vec<RemoteEntry>, TransferError> {
        if cancel.is_cancelled() {
            return Err(TransferError::UserCancelled);
        }
        self.record(Call::List { path: path.to_string() });
        self.list(path).ok_or_else(|| TransferError::api_status(404, "directory not found"))
    }
}

pub fn scope() -> Scope {
    Scope::new("p-test", "cn-test")
}

/// Defaults with millisecond backoff so retries do not slow tests down.
pub fn fast_options() -> TransferOptions {
    TransferOptions {
        initial_retry_delay: Duration::from_millis(1),
        tick: TickInterval::Custom(Duration::from_millis(5)),
        ..TransferOptions::default()
    }
}

/// Deterministic, non-repeating-per-part content.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
