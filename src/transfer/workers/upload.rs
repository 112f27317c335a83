use std::sync::Mutex;

use crossbeam_channel::unbounded;

use super::SharedFile;
use crate::TransferError;
use crate::cancel::CancelToken;
use crate::transfer::plan::{Part, PartPlan};
use crate::transfer::progress::ProgressCounter;
use crate::transfer::transport::{PartResult, PartUrl, Transport};
use crate::transfer::{EventSink, TransferEvent};
use crate::util::{RetryPolicy, retry_with_backoff};

pub(crate) struct PartPoolCtx<'a> {
    pub(crate) transport: &'a dyn Transport,
    pub(crate) file: &'a SharedFile,
    pub(crate) file_name: &'a str,
    pub(crate) plan: &'a PartPlan,
    pub(crate) urls: &'a [PartUrl],
    pub(crate) workers: usize,
    pub(crate) retry: RetryPolicy,
    /// Pool-scoped token: a child of the batch token, cancelled on the first permanent failure.
    pub(crate) cancel: &'a CancelToken,
    pub(crate) progress: &'a ProgressCounter,
    pub(crate) events: &'a EventSink,
}

// Pair every session URL with its byte range; the service must hand back
// exactly one URL per planned part.
fn match_urls<'u>(
    plan: &PartPlan,
    urls: &'u [PartUrl],
) -> Result<Vec<(Part, &'u str)>, TransferError> {
    if urls.len() != plan.len() {
        return Err(TransferError::api(format!(
            "upload session returned {} part urls, expected {}",
            urls.len(),
            plan.len()
        )));
    }
    let mut seen = vec![false; plan.len()];
    let mut jobs = Vec::with_capacity(urls.len());
    for u in urls {
        let part = plan.part(u.part_number).ok_or_else(|| {
            TransferError::api(format!("upload session returned unknown part {}", u.part_number))
        })?;
        let slot = &mut seen[part.number as usize - 1];
        if *slot {
            return Err(TransferError::api(format!(
                "upload session returned part {} twice",
                u.part_number
            )));
        }
        *slot = true;
        jobs.push((*part, u.url.as_str()));
    }
    Ok(jobs)
}

/// Upload every part of one file with at most `workers` parts in flight.
///
/// Parts finish in any order; the returned results are ordered by part number
/// and only returned once every worker has joined. The first permanent failure
/// cancels the pool token so queued parts are never started.
pub(crate) fn run_part_uploads(ctx: PartPoolCtx<'_>) -> Result<Vec<PartResult>, TransferError> {
    let PartPoolCtx {
        transport,
        file,
        file_name,
        plan,
        urls,
        workers,
        retry,
        cancel,
        progress,
        events,
    } = ctx;
    let jobs = match_urls(plan, urls)?;
    let (job_tx, job_rx) = unbounded::<(Part, &str)>();
    for job in jobs {
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let (failure_tx, failure_rx) = unbounded::<TransferError>();
    let results: Mutex<Vec<Option<PartResult>>> = Mutex::new(vec![None; plan.len()]);
    let workers = workers.clamp(1, plan.len().max(1));
    tracing::debug!("{}: {} parts across {} workers", file_name, plan.len(), workers);

    std::thread::scope(|s| {
        for worker_id in 0..workers {
            let job_rx = job_rx.clone();
            let failure_tx = failure_tx.clone();
            let results = &results;
            s.spawn(move || {
                while !cancel.is_cancelled() {
                    let Ok((part, url)) = job_rx.try_recv() else { break };
                    match upload_one(transport, file, file_name, part, url, retry, cancel) {
                        Ok(etag) => {
                            if let Ok(mut r) = results.lock() {
                                r[part.number as usize - 1] =
                                    Some(PartResult { part_number: part.number, etag });
                            }
                            progress.add(part.len);
                            events.emit(TransferEvent::PartUploaded {
                                file: file_name.to_string(),
                                part_number: part.number,
                                bytes: part.len,
                            });
                            tracing::debug!(
                                "[upload] worker={} {} part {} done ({} bytes)",
                                worker_id,
                                file_name,
                                part.number,
                                part.len
                            );
                        }
                        Err(e) => {
                            cancel.cancel();
                            let _ = failure_tx.send(e.context(format!("part {}", part.number)));
                            break;
                        }
                    }
                }
            });
        }
    });
    drop(failure_tx);

    if cancel.is_cancelled_by_parent() {
        return Err(TransferError::UserCancelled);
    }
    let failures: Vec<TransferError> = failure_rx.try_iter().collect();
    // siblings that noticed the pool cancel report UserCancelled; the root cause is the other one
    if let Some(e) = failures.iter().find(|e| !e.is_user_cancelled()) {
        return Err(e.clone());
    }
    if !failures.is_empty() || cancel.is_cancelled() {
        return Err(TransferError::UserCancelled);
    }

    let results = results
        .into_inner()
        .map_err(|_| TransferError::api("part result table poisoned"))?;
    results
        .into_iter()
        .enumerate()
        .map(|(i, r)| r.ok_or_else(|| TransferError::api(format!("part {} has no result", i + 1))))
        .collect()
}

fn upload_one(
    transport: &dyn Transport,
    file: &SharedFile,
    file_name: &str,
    part: Part,
    url: &str,
    retry: RetryPolicy,
    cancel: &CancelToken,
) -> Result<String, TransferError> {
    // read once; only the network call is retried
    let data = file.read_part(part.offset, part.len).map_err(|e| {
        TransferError::fs(format!("failed to read {} part {}", file_name, part.number), e)
    })?;
    if data.len() as u64 != part.len {
        return Err(TransferError::FileSystem(format!(
            "{} changed during upload: part {} expected {} bytes, read {}",
            file_name,
            part.number,
            part.len,
            data.len()
        )));
    }
    let label = format!("{} part {}", file_name, part.number);
    retry_with_backoff(retry, cancel, &label, |_attempt| transport.upload_part(cancel, url, &data))
}
