// Terminal rendering of a running transfer's event stream.
use crossbeam_channel::Receiver;
use indicatif::ProgressBar;
use owo_colors::OwoColorize;

use crate::transfer::{Direction, ProgressSnapshot, TransferEvent, TransferSummary};
use crate::util::{human_bytes, init_progress_bar, simple_bar, try_enable_ansi_on_windows};

const SIMPLE_STEP_PERCENT: u64 = 10;
const SIMPLE_BAR_WIDTH: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Interactive,
    Simple,
}

/// Emits one line each time progress crosses the next 10% step.
#[derive(Debug, Default)]
pub struct SimpleProgress {
    next_step: u64,
}

impl SimpleProgress {
    pub fn update(&mut self, snap: &ProgressSnapshot) -> Option<String> {
        let pct = snap.percent();
        if pct < self.next_step {
            return None;
        }
        self.next_step = (pct / SIMPLE_STEP_PERCENT + 1) * SIMPLE_STEP_PERCENT;
        Some(format!(
            "{} {:>3}%  {}/{}  files {}/{}  {}/s",
            simple_bar(pct, SIMPLE_BAR_WIDTH),
            pct,
            human_bytes(snap.bytes_so_far),
            human_bytes(snap.total_bytes),
            snap.files_completed,
            snap.total_files,
            human_bytes(snap.throughput_bps as u64),
        ))
    }
}

pub fn summary_line(summary: &TransferSummary) -> String {
    let verb = match summary.direction {
        Direction::Upload => "Uploaded",
        Direction::Download => "Downloaded",
    };
    let secs = summary.elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        (summary.bytes as f64 / secs) as u64
    } else {
        0
    };
    format!(
        "{} {} file(s), {} in {:.2}s ({}/s)",
        verb,
        summary.files,
        human_bytes(summary.bytes),
        secs,
        human_bytes(rate)
    )
}

fn tint(text: String, colored: bool, paint: impl Fn(&str) -> String) -> String {
    if colored {
        paint(&text)
    } else {
        text
    }
}

/// Drain events until the terminal one. Errors are left to the caller, which
/// gets them from the handle.
pub fn render_events(events: &Receiver<TransferEvent>, mode: RenderMode) -> anyhow::Result<()> {
    let colored = try_enable_ansi_on_windows();
    let mut bar: Option<ProgressBar> = None;
    let mut simple = SimpleProgress::default();
    for ev in events.iter() {
        match ev {
            TransferEvent::Prepared { direction, total_files, total_bytes } => {
                let header = format!(
                    "{} {} file(s), {}",
                    direction,
                    total_files,
                    human_bytes(total_bytes)
                );
                if mode == RenderMode::Interactive {
                    let pb = init_progress_bar(total_bytes, false)?;
                    pb.println(tint(header, colored, |t| t.cyan().to_string()));
                    bar = Some(pb);
                } else {
                    println!("{}", header);
                }
            }
            TransferEvent::Progress(snap) => match &bar {
                Some(pb) => {
                    pb.set_length(snap.total_bytes);
                    pb.set_position(snap.bytes_so_far);
                    pb.set_message(format!(
                        "[{}/{}] {}",
                        snap.files_completed + 1,
                        snap.total_files,
                        snap.current_file
                    ));
                }
                None => {
                    if let Some(line) = simple.update(&snap) {
                        println!("{}", line);
                    }
                }
            },
            TransferEvent::PartUploaded { .. } => {}
            TransferEvent::ItemCompleted { file, files_completed, total_files, .. } => {
                let line = format!("  done [{}/{}] {}", files_completed, total_files, file);
                match &bar {
                    Some(pb) => pb.println(tint(line, colored, |t| t.green().to_string())),
                    None if mode == RenderMode::Simple => println!("{}", line),
                    None => {}
                }
            }
            TransferEvent::BatchCompleted(summary) => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
                let line = summary_line(&summary);
                println!("{}", tint(line, colored, |t| t.green().to_string()));
                break;
            }
            TransferEvent::BatchFailed(_) | TransferEvent::BatchCancelled => {
                if let Some(pb) = bar.take() {
                    pb.abandon();
                }
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn snap(bytes: u64, total: u64) -> ProgressSnapshot {
        ProgressSnapshot {
            bytes_so_far: bytes,
            item_bytes: bytes,
            total_bytes: total,
            current_file: "a.bin".into(),
            files_completed: 0,
            total_files: 1,
            elapsed: Duration::from_secs(1),
            throughput_bps: bytes as f64,
            eta: None,
        }
    }

    #[test]
    fn simple_mode_prints_once_per_step() {
        let mut sp = SimpleProgress::default();
        assert!(sp.update(&snap(0, 100)).is_some());
        assert!(sp.update(&snap(5, 100)).is_none());
        assert!(sp.update(&snap(10, 100)).is_some());
        assert!(sp.update(&snap(19, 100)).is_none());
        let line = sp.update(&snap(55, 100)).expect("crossed 50%");
        assert!(line.contains(" 55%"));
        assert!(sp.update(&snap(59, 100)).is_none());
        assert!(sp.update(&snap(100, 100)).is_some());
        assert!(sp.update(&snap(100, 100)).is_none());
    }

    #[test]
    fn summary_mentions_direction_and_size() {
        let s = TransferSummary {
            direction: Direction::Download,
            files: 2,
            bytes: 2 * 1024 * 1024,
            elapsed: Duration::from_secs(2),
        };
        let line = summary_line(&s);
        assert!(line.starts_with("Downloaded 2 file(s), 2.00 MiB"));
        assert!(line.contains("1.00 MiB/s"));
    }
}
