use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV: &str = "VOLCP_LOG";
const DEFAULT_FILTER: &str = "warn";
const VERBOSE_FILTER: &str = "warn,volcp=debug";

/// Install the global subscriber.
///
/// Console output goes to stderr and is filtered by `VOLCP_LOG` (default
/// `warn`). With `log_dir` set, a daily-rotated debug log is written there as
/// well; keep the returned guard alive until exit so it gets flushed.
pub fn init_logging(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let console_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(console_filter);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(console)
            .try_init()
            .context("failed to install logger")?;
        return Ok(None);
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let appender = tracing_appender::rolling::daily(dir, "volcp.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_names(true)
        .with_filter(EnvFilter::new(VERBOSE_FILTER));
    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("failed to install logger")?;
    Ok(Some(guard))
}
