//! Worker Pool (C7, §4.7): a fixed number of tasks draining the Walker's
//! channel, each running a payload through [`driver::parse_file`] and
//! fanning the result out to every configured sink. Grounded on
//! `runner.go`'s `Run`, which spawns `options.Parser.Threads` goroutines
//! over the same `Files` channel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use intelparser_detect::Detector;
use intelparser_store::{ControlSink, SinkFanout};
use tokio::sync::{mpsc, Mutex};

use crate::driver::{self, ContentPolicy, RunFilter};
use crate::walker::FileItem;

#[derive(Default)]
pub struct Counters {
    pub parsed: AtomicU64,
    pub skipped: AtomicU64,
    pub errored: AtomicU64,
    pub credentials: AtomicU64,
    pub emails: AtomicU64,
    pub urls: AtomicU64,
}

impl Counters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            parsed: self.parsed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            credentials: self.credentials.load(Ordering::Relaxed),
            emails: self.emails.load(Ordering::Relaxed),
            urls: self.urls.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CounterSnapshot {
    pub parsed: u64,
    pub skipped: u64,
    pub errored: u64,
    pub credentials: u64,
    pub emails: u64,
    pub urls: u64,
}

pub struct PoolSettings {
    /// At least 2, to avoid the single-worker deadlock the source guards
    /// against in `parse.go`'s `PersistentPreRunE`.
    pub threads: usize,
    pub max_target_megabytes: u64,
    pub save_bucket_words: Vec<String>,
    pub save_name_words: Vec<String>,
    pub filter: RunFilter,
}

/// Spawns `settings.threads` workers sharing one receiver and runs them
/// to completion. `counters` is owned by the caller so a [`StatusReporter`]
/// can sample it while the pool is still running; `cancel` lets a caller
/// (e.g. a Ctrl-C handler) stop every worker at the next channel poll
/// without waiting for the channel to drain naturally.
///
/// [`StatusReporter`]: crate::status::StatusReporter
pub async fn run(
    settings: PoolSettings,
    rx: mpsc::Receiver<FileItem>,
    detector: Arc<Detector>,
    control: Arc<ControlSink>,
    sinks: Arc<SinkFanout>,
    cancel: Arc<AtomicBool>,
    counters: Arc<Counters>,
) -> anyhow::Result<()> {
    let threads = settings.threads.max(2);
    let rx = Arc::new(Mutex::new(rx));
    let content_policy = Arc::new((settings.save_bucket_words, settings.save_name_words));
    let filter = Arc::new(settings.filter);
    let max_target_megabytes = settings.max_target_megabytes;

    let mut handles = Vec::with_capacity(threads);
    for _ in 0..threads {
        let rx = rx.clone();
        let detector = detector.clone();
        let control = control.clone();
        let sinks = sinks.clone();
        let cancel = cancel.clone();
        let counters = counters.clone();
        let content_policy = content_policy.clone();
        let filter = filter.clone();
        handles.push(tokio::spawn(async move {
            worker_loop(
                rx,
                detector,
                control,
                sinks,
                cancel,
                counters,
                content_policy,
                filter,
                max_target_megabytes,
            )
            .await
        }));
    }

    for handle in handles {
        handle.await??;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    rx: Arc<Mutex<mpsc::Receiver<FileItem>>>,
    detector: Arc<Detector>,
    control: Arc<ControlSink>,
    sinks: Arc<SinkFanout>,
    cancel: Arc<AtomicBool>,
    counters: Arc<Counters>,
    content_policy: Arc<(Vec<String>, Vec<String>)>,
    filter: Arc<RunFilter>,
    max_target_megabytes: u64,
) -> anyhow::Result<()> {
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Ok(());
        }

        let item = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(item) = item else {
            return Ok(());
        };

        let policy = ContentPolicy {
            save_bucket_words: &content_policy.0,
            save_name_words: &content_policy.1,
        };

        match driver::parse_file(&item, &control, &detector, max_target_megabytes, &policy, &filter) {
            Ok(None) => {
                counters.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Some(mut doc)) => {
                counters.credentials.fetch_add(doc.credentials.len() as u64, Ordering::Relaxed);
                counters.emails.fetch_add(doc.emails.len() as u64, Ordering::Relaxed);
                counters.urls.fetch_add(doc.urls.len() as u64, Ordering::Relaxed);
                if doc.failed {
                    counters.errored.fetch_add(1, Ordering::Relaxed);
                } else {
                    counters.parsed.fetch_add(1, Ordering::Relaxed);
                }
                // Emit the archive-relative path, not the temp-extraction
                // path, once scanning is done (§4.7 step g).
                doc.real_path = doc.virtual_path.clone();
                sinks.write(&doc).await;
            }
            Err(e) if e.is_skip_not_error() => {
                counters.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.is_fatal() => {
                cancel.store(true, Ordering::Relaxed);
                return Err(e.into());
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %item.real_path.display(), "scan failed");
                counters.errored.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
