//! Control sink (§4.8, §6): the same schema as [`RelationalSink`], used
//! *only* for cross-run deduplication. Lives at a well-known path
//! (`<home>/.intelparser.db`) and is read-consulted by the worker pool
//! before a payload is scanned. `Content` is blanked before every write so
//! the control database never grows to hold full file bodies.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use intelparser_core::model::Document;

use crate::relational::RelationalSink;
use crate::sink::Sink;

pub struct ControlSink {
    inner: RelationalSink,
}

impl ControlSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            inner: RelationalSink::open(path)?,
        })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            inner: RelationalSink::in_memory()?,
        })
    }

    /// The `(file_name, fingerprint)` check the worker pool performs
    /// before scanning a payload (§4.7 step b).
    pub fn is_already_parsed(&self, file_name: &str, fingerprint: &str) -> Result<bool> {
        self.inner.is_already_parsed(file_name, fingerprint)
    }
}

#[async_trait]
impl Sink for ControlSink {
    fn name(&self) -> &str {
        "control"
    }

    async fn write(&self, document: &Document) -> Result<()> {
        let mut blanked = document.clone();
        blanked.content = None;
        self.inner.write(&blanked).await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn content_is_blanked_before_write() {
        let sink = ControlSink::in_memory().unwrap();
        let mut d = Document::new("IntelX", "/tmp/archive/brute.txt");
        d.fingerprint = "abc123".to_string();
        d.content = Some(b"super secret contents".to_vec());
        sink.write(&d).await.unwrap();

        let conn = sink.inner.conn_for_test();
        let content: Option<Vec<u8>> = conn
            .query_row("SELECT content FROM files", [], |r| r.get(0))
            .unwrap();
        assert!(content.is_none());
    }

    #[tokio::test]
    async fn dedup_check_delegates_to_relational_schema() {
        let sink = ControlSink::in_memory().unwrap();
        let mut d = Document::new("IntelX", "/tmp/archive/brute.txt");
        d.fingerprint = "abc123".to_string();
        sink.write(&d).await.unwrap();
        assert!(sink.is_already_parsed("brute.txt", "abc123").unwrap());
    }
}
