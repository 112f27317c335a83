// Cooperative cancellation shared between the orchestrator, part workers and
// the signal handler. Blocking calls check the token before they start; nothing
// is interrupted mid-syscall.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

// Granularity of `CancelToken::sleep`; bounds how long a backoff keeps running
// after a cancel.
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// A clonable cancellation flag with an optional parent.
///
/// A child observes its own flag and every ancestor's; cancelling a child leaves
/// the parent untouched.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)), parent: Some(Box::new(self.clone())) }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.is_cancelled_by_parent()
    }

    /// True when an ancestor (typically the user-facing root) was cancelled,
    /// as opposed to this token alone.
    pub fn is_cancelled_by_parent(&self) -> bool {
        self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// Sleep for `dur` unless cancelled first. Returns false when woken by a cancel.
    pub fn sleep(&self, dur: Duration) -> bool {
        let deadline = Instant::now() + dur;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(std::cmp::min(SLEEP_SLICE, deadline - now));
        }
    }

    /// Route SIGINT/SIGTERM into this token. A second signal terminates the
    /// process immediately.
    pub fn install_signal_handlers(&self) -> std::io::Result<()> {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::flag;
        for sig in [SIGINT, SIGTERM] {
            // order matters: the shutdown check must see the flag before it is set
            flag::register_conditional_shutdown(sig, 130, Arc::clone(&self.flag))?;
            flag::register(sig, Arc::clone(&self.flag))?;
        }
        Ok(())
    }
}
