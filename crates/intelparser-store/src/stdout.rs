//! Stdout sink (§4.8): debug trace only. Grounded on the source's
//! `writers.StdoutWriter`, which only logs that a file finished — it does
//! not print document contents.

use async_trait::async_trait;
use intelparser_core::model::Document;
use tracing::debug;

use crate::sink::Sink;

#[derive(Default)]
pub struct StdoutSink;

#[async_trait]
impl Sink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn write(&self, document: &Document) -> anyhow::Result<()> {
        debug!(file = %document.file_name, fingerprint = %document.fingerprint, "finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_succeeds() {
        let sink = StdoutSink;
        assert!(sink.write(&Document::new("IntelX", "/tmp/x")).await.is_ok());
    }
}
