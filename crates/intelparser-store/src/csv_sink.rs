//! CSV sink (§4.8): a flat, limited-column projection of a document. No
//! child arrays — credentials/emails/urls are summarized as counts, since
//! CSV has no native way to nest the child collections the relational and
//! JSON-lines sinks carry in full.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use intelparser_core::model::Document;
use serde::Serialize;

use crate::sink::Sink;

#[derive(Serialize)]
struct CsvRow<'a> {
    provider: &'a str,
    file_path: &'a str,
    name: &'a str,
    leak_date: String,
    bucket: &'a str,
    media_type: &'a str,
    size: u64,
    fingerprint: &'a str,
    failed: bool,
    credential_count: usize,
    email_count: usize,
    url_count: usize,
}

fn row(document: &Document) -> CsvRow<'_> {
    CsvRow {
        provider: &document.provider,
        file_path: &document.virtual_path,
        name: &document.display_name,
        leak_date: document.leak_date.to_rfc3339(),
        bucket: &document.bucket,
        media_type: &document.media_type,
        size: document.size,
        fingerprint: &document.fingerprint,
        failed: document.failed,
        credential_count: document.credentials.len(),
        email_count: document.emails.len(),
        url_count: document.urls.len(),
    }
}

pub struct CsvSink {
    path: std::path::PathBuf,
    writer: Mutex<csv::Writer<std::fs::File>>,
    rows_written: Mutex<u64>,
}

impl CsvSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let file = std::fs::File::create(&path)
            .with_context(|| format!("creating CSV sink at {}", path.display()))?;
        let writer = csv::Writer::from_writer(file);
        Ok(Self {
            path,
            writer: Mutex::new(writer),
            rows_written: Mutex::new(0),
        })
    }

    pub fn is_empty(&self) -> bool {
        *self.rows_written.lock().unwrap() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Sink for CsvSink {
    fn name(&self) -> &str {
        "csv"
    }

    async fn write(&self, document: &Document) -> Result<()> {
        let mut writer = self.writer.lock().unwrap();
        writer.serialize(row(document))?;
        writer.flush()?;
        *self.rows_written.lock().unwrap() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_a_flat_row_per_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let sink = CsvSink::create(&path).unwrap();

        let mut doc = Document::new("IntelX", "/tmp/x/dump.txt");
        doc.fingerprint = "abc123".to_string();
        sink.write(&doc).await.unwrap();
        assert!(!sink.is_empty());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("abc123"));
        assert_eq!(content.lines().count(), 2); // header + one row
    }
}
