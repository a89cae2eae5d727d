//! Sink Fan-out (C8): an ordered `Vec<Box<dyn Sink>>` written to
//! sequentially by the single worker handling a record. A sink failure is
//! logged as `SinkWriteFailed` and does not stop the remaining sinks —
//! per §5, "the fan-out itself is lock-free because each record is handed
//! to sinks sequentially by one worker."

use intelparser_core::model::Document;
use tracing::warn;

use crate::sink::Sink;

pub struct SinkFanout {
    sinks: Vec<Box<dyn Sink>>,
}

impl SinkFanout {
    pub fn new(sinks: Vec<Box<dyn Sink>>) -> Self {
        Self { sinks }
    }

    /// Writes `document` to every registered sink in order. Always
    /// returns `Ok` — per-sink failures are logged, not propagated,
    /// matching §7's "other sinks unaffected; record considered
    /// delivered best-effort."
    pub async fn write(&self, document: &Document) {
        for sink in &self.sinks {
            if let Err(err) = sink.write(document).await {
                warn!(
                    sink = sink.name(),
                    fingerprint = %document.fingerprint,
                    error = %err,
                    "sink write failed"
                );
            }
        }
    }

    pub async fn flush(&self) {
        for sink in &self.sinks {
            if let Err(err) = sink.flush().await {
                warn!(sink = sink.name(), error = %err, "sink flush failed");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Sink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        async fn write(&self, _document: &Document) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn writes_to_every_sink_in_order() {
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));
        let fanout = SinkFanout::new(vec![
            Box::new(CountingSink {
                calls: calls_a.clone(),
                fail: false,
            }),
            Box::new(CountingSink {
                calls: calls_b.clone(),
                fail: false,
            }),
        ]);
        fanout.write(&Document::new("IntelX", "/tmp/x")).await;
        assert_eq!(calls_a.load(Ordering::SeqCst), 1);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_failing_sink_does_not_stop_the_others() {
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));
        let fanout = SinkFanout::new(vec![
            Box::new(CountingSink {
                calls: calls_a.clone(),
                fail: true,
            }),
            Box::new(CountingSink {
                calls: calls_b.clone(),
                fail: false,
            }),
        ]);
        fanout.write(&Document::new("IntelX", "/tmp/x")).await;
        assert_eq!(calls_a.load(Ordering::SeqCst), 1);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
    }
}
