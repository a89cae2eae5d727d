//! Status Reporter (C9, §4.9): a background loop printing progress at a
//! TTY-aware interval, never on the hot scanning path. Grounded on the
//! teacher's `heartbeat/service.rs` spawn-a-loop-guarded-by-a-running-flag
//! shape; the interval split (fast on a terminal, slow piped to a log)
//! comes from `runner.go`'s `Status.Print`.

use std::io::IsTerminal;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::pool::Counters;

const TTY_INTERVAL: Duration = Duration::from_millis(250);
const NON_TTY_INTERVAL: Duration = Duration::from_secs(30);

pub struct StatusReporter {
    running: Arc<Mutex<bool>>,
}

impl StatusReporter {
    pub fn new() -> Self {
        Self {
            running: Arc::new(Mutex::new(false)),
        }
    }

    /// Starts the background loop. `quiet` matches `--quiet`/`-q`: the
    /// loop still runs (so counters keep being sampled) but prints
    /// nothing, same as `Silence` in the source's `Status`.
    pub async fn start(&self, counters: Arc<Counters>, quiet: bool) {
        *self.running.lock().await = true;
        let running = self.running.clone();
        let interval = if std::io::stderr().is_terminal() {
            TTY_INTERVAL
        } else {
            NON_TTY_INTERVAL
        };

        tokio::spawn(async move {
            loop {
                sleep(interval).await;
                if !*running.lock().await {
                    break;
                }
                if quiet {
                    continue;
                }
                let s = counters.snapshot();
                tracing::info!(
                    parsed = s.parsed,
                    skipped = s.skipped,
                    errored = s.errored,
                    credentials = s.credentials,
                    emails = s.emails,
                    urls = s.urls,
                    "STATUS"
                );
            }
        });
    }

    pub async fn stop(&self) {
        *self.running.lock().await = false;
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Final run summary printed once the pool has drained, grounded on
/// `cmd/parse_intelx.go`'s post-`Run()` summary block.
pub fn print_summary(counters: &Counters, elapsed: Duration) {
    let s = counters.snapshot();
    tracing::info!(
        elapsed_secs = elapsed.as_secs_f64(),
        parsed = s.parsed,
        skipped = s.skipped,
        errored = s.errored,
        credentials = s.credentials,
        emails = s.emails,
        urls = s.urls,
        "scan complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[tokio::test]
    async fn stop_flips_running_flag_off() {
        let reporter = StatusReporter::new();
        let counters = Arc::new(Counters::default());
        reporter.start(counters, true).await;
        assert!(*reporter.running.lock().await);
        reporter.stop().await;
        assert!(!*reporter.running.lock().await);
    }

    #[test]
    fn print_summary_does_not_panic_on_empty_counters() {
        let counters = Counters::default();
        counters.parsed.store(0, Ordering::Relaxed);
        let _ = AtomicU64::new(0);
        print_summary(&counters, Duration::from_secs(1));
    }
}
