use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

use crate::TransferError;
use crate::cancel::CancelToken;

/// Try to enable ANSI escape sequence support on Windows consoles.
/// Returns true if enabling succeeded (or platform likely already supports ANSI), false otherwise.
#[cfg(windows)]
pub fn try_enable_ansi_on_windows() -> bool {
    enable_ansi_support::enable_ansi_support().is_ok()
}

// Terminals elsewhere speak ANSI already.
#[cfg(not(windows))]
pub fn try_enable_ansi_on_windows() -> bool {
    true
}

/// Convert a byte count into a human readable string using IEC units.
pub fn human_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    const TB: f64 = GB * 1024.0;
    let b = bytes as f64;
    if b >= TB {
        format!("{:.2} TiB", b / TB)
    } else if b >= GB {
        format!("{:.2} GiB", b / GB)
    } else if b >= MB {
        format!("{:.2} MiB", b / MB)
    } else if b >= KB {
        format!("{:.2} KiB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

/// Backoff schedule for `retry_with_backoff`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    /// Delay slept after the `attempt`-th failure (1-based): initial, 2x, 4x...
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        self.initial_delay.saturating_mul(1u32 << shift)
    }
}

/// Run `op` until it succeeds, returns a non-retriable error, or attempts run out.
///
/// The token is checked before every attempt and during each backoff sleep; a
/// cancel observed there ends the loop with `UserCancelled` without another call.
/// `label` only feeds the log lines.
pub fn retry_with_backoff<T, F>(
    policy: RetryPolicy,
    cancel: &CancelToken,
    label: &str,
    mut op: F,
) -> Result<T, TransferError>
where
    F: FnMut(usize) -> Result<T, TransferError>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0usize;
    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::UserCancelled);
        }
        attempt += 1;
        match op(attempt) {
            Ok(v) => return Ok(v),
            Err(e) if !e.is_retriable() || attempt >= attempts => {
                if attempt > 1 {
                    tracing::debug!("{}: giving up after {} attempts: {}", label, attempt, e);
                }
                return Err(e);
            }
            Err(e) => {
                let wait = policy.delay_after(attempt);
                tracing::warn!(
                    "{}: attempt {}/{} failed ({}); retrying in {:?}",
                    label,
                    attempt,
                    attempts,
                    e,
                    wait
                );
                if !cancel.sleep(wait) {
                    return Err(TransferError::UserCancelled);
                }
            }
        }
    }
}

/// Build the byte progress bar used by the interactive renderer.
pub fn init_progress_bar(total: u64, hidden: bool) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    if hidden {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }
    let style = ProgressStyle::with_template(concat!(
        "{spinner:.green} {msg}\n",
        "  [{bar:50.magenta/blue}] {percent:>3}%  {bytes}/{total_bytes}",
        " • {binary_bytes_per_sec} • ETA {eta}",
    ))?
    .progress_chars("=> ");
    pb.set_style(style);
    Ok(pb)
}

/// Plain-text bar for non-interactive output, e.g. `[==========>         ] 50%`.
pub fn simple_bar(percent: u64, width: usize) -> String {
    let percent = percent.min(100) as usize;
    let filled = percent * width / 100;
    let mut out = String::with_capacity(width + 2);
    out.push('[');
    for i in 0..width {
        out.push(match i.cmp(&filled) {
            std::cmp::Ordering::Less => '=',
            std::cmp::Ordering::Equal => '>',
            std::cmp::Ordering::Greater => ' ',
        });
    }
    out.push(']');
    out
}
