//! JSON-lines sink (§4.8): one document per line, UTF-8, `\n`-terminated.
//! `name`, `email`, and every `domain` field are lower-cased on output;
//! timestamps are RFC-3339 (the default for `chrono`'s `Serialize` impl,
//! used as-is here).

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use intelparser_core::model::Document;
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::sink::Sink;

/// On-the-wire projection of [`Document`] with the output-only
/// lower-casing rule applied; avoids mutating the caller's document.
#[derive(Serialize)]
struct JsonLine<'a> {
    provider: &'a str,
    file_path: &'a str,
    name: String,
    leak_date: chrono::DateTime<chrono::Utc>,
    bucket: &'a str,
    media_type: &'a str,
    indexed_at: chrono::DateTime<chrono::Utc>,
    size: u64,
    provider_id: &'a str,
    mime_type: &'a str,
    fingerprint: &'a str,
    failed: bool,
    failed_reason: &'a Option<String>,
    credentials: Vec<JsonCredential<'a>>,
    emails: Vec<JsonEmail<'a>>,
    urls: Vec<JsonUrl<'a>>,
}

#[derive(Serialize)]
struct JsonCredential<'a> {
    rule: &'a str,
    time: Option<chrono::DateTime<chrono::Utc>>,
    user_domain: String,
    username: &'a str,
    password: &'a str,
    cpf: &'a Option<String>,
    has_cpf: bool,
    url: &'a str,
    url_domain: String,
    severity: i32,
    entropy: f32,
    near_text: &'a str,
}

#[derive(Serialize)]
struct JsonEmail<'a> {
    time: Option<chrono::DateTime<chrono::Utc>>,
    domain: String,
    email: String,
    near_text: &'a str,
}

#[derive(Serialize)]
struct JsonUrl<'a> {
    time: Option<chrono::DateTime<chrono::Utc>>,
    domain: String,
    url: &'a str,
    near_text: &'a str,
}

fn project(document: &Document) -> JsonLine<'_> {
    JsonLine {
        provider: &document.provider,
        file_path: &document.virtual_path,
        name: document.display_name.to_lowercase(),
        leak_date: document.leak_date,
        bucket: &document.bucket,
        media_type: &document.media_type,
        indexed_at: document.indexed_at,
        size: document.size,
        provider_id: &document.provider_id,
        mime_type: &document.mime_type,
        fingerprint: &document.fingerprint,
        failed: document.failed,
        failed_reason: &document.failed_reason,
        credentials: document
            .credentials
            .iter()
            .map(|c| JsonCredential {
                rule: &c.rule,
                time: c.time,
                user_domain: c.user_domain.to_lowercase(),
                username: &c.username,
                password: &c.password,
                cpf: &c.cpf,
                has_cpf: c.has_cpf,
                url: &c.url,
                url_domain: c.url_domain.to_lowercase(),
                severity: c.severity,
                entropy: c.entropy,
                near_text: &c.near_text,
            })
            .collect(),
        emails: document
            .emails
            .iter()
            .map(|e| JsonEmail {
                time: e.time,
                domain: e.domain.to_lowercase(),
                email: e.email.to_lowercase(),
                near_text: &e.near_text,
            })
            .collect(),
        urls: document
            .urls
            .iter()
            .map(|u| JsonUrl {
                time: u.time,
                domain: u.host.to_lowercase(),
                url: &u.url,
                near_text: &u.near_text,
            })
            .collect(),
    }
}

/// Reads a JSON-lines file written by [`JsonLinesSink`] back into
/// [`Document`] values, for the `report convert`/`report elastic` replay
/// path. Field names mirror the sink's projection (`file_path` →
/// `virtual_path`, `name` → `display_name`, child `domain` → `host`).
pub fn read_documents(path: impl AsRef<Path>) -> Result<Vec<Document>> {
    use intelparser_core::model::{Credential, Email, Url};
    use serde_json::Value;

    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("reading JSON-lines source {}", path.as_ref().display()))?;

    let mut documents = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let v: Value = serde_json::from_str(line)?;
        let virtual_path = v["file_path"].as_str().unwrap_or_default().to_string();
        let mut document = Document::new(
            v["provider"].as_str().unwrap_or_default(),
            virtual_path.clone(),
        );
        document.virtual_path = virtual_path;
        document.display_name = v["name"].as_str().unwrap_or_default().to_string();
        document.bucket = v["bucket"].as_str().unwrap_or_default().to_string();
        document.media_type = v["media_type"].as_str().unwrap_or_default().to_string();
        document.provider_id = v["provider_id"].as_str().unwrap_or_default().to_string();
        document.mime_type = v["mime_type"].as_str().unwrap_or_default().to_string();
        document.fingerprint = v["fingerprint"].as_str().unwrap_or_default().to_string();
        document.failed = v["failed"].as_bool().unwrap_or(false);
        document.failed_reason = v["failed_reason"].as_str().map(str::to_string);
        document.size = v["size"].as_u64().unwrap_or(0);
        if let Some(date) = v["leak_date"].as_str() {
            document.leak_date = date
                .parse()
                .unwrap_or(document.leak_date);
        }
        if let Some(date) = v["indexed_at"].as_str() {
            document.indexed_at = date.parse().unwrap_or(document.indexed_at);
        }

        if let Some(arr) = v["credentials"].as_array() {
            for c in arr {
                document.credentials.push(Credential {
                    rule: c["rule"].as_str().unwrap_or_default().to_string(),
                    time: c["time"].as_str().and_then(|s| s.parse().ok()),
                    user_domain: c["user_domain"].as_str().unwrap_or_default().to_string(),
                    username: c["username"].as_str().unwrap_or_default().to_string(),
                    password: c["password"].as_str().unwrap_or_default().to_string(),
                    cpf: c["cpf"].as_str().map(str::to_string),
                    has_cpf: c["has_cpf"].as_bool().unwrap_or(false),
                    url: c["url"].as_str().unwrap_or_default().to_string(),
                    url_domain: c["url_domain"].as_str().unwrap_or_default().to_string(),
                    severity: c["severity"].as_i64().unwrap_or(0) as i32,
                    entropy: c["entropy"].as_f64().unwrap_or(0.0) as f32,
                    near_text: c["near_text"].as_str().unwrap_or_default().to_string(),
                });
            }
        }
        if let Some(arr) = v["emails"].as_array() {
            for e in arr {
                document.emails.push(Email {
                    time: e["time"].as_str().and_then(|s| s.parse().ok()),
                    domain: e["domain"].as_str().unwrap_or_default().to_string(),
                    email: e["email"].as_str().unwrap_or_default().to_string(),
                    near_text: e["near_text"].as_str().unwrap_or_default().to_string(),
                });
            }
        }
        if let Some(arr) = v["urls"].as_array() {
            for u in arr {
                document.urls.push(Url {
                    time: u["time"].as_str().and_then(|s| s.parse().ok()),
                    host: u["domain"].as_str().unwrap_or_default().to_string(),
                    url: u["url"].as_str().unwrap_or_default().to_string(),
                    near_text: u["near_text"].as_str().unwrap_or_default().to_string(),
                });
            }
        }

        documents.push(document);
    }
    Ok(documents)
}

pub struct JsonLinesSink {
    path: std::path::PathBuf,
    lines_written: Mutex<u64>,
}

impl JsonLinesSink {
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        // Truncate any previous contents up front, matching the source's
        // "create a fresh destination file" behavior for a new run.
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await
            .with_context(|| format!("creating JSON-lines sink at {}", path.display()))?;
        Ok(Self {
            path,
            lines_written: Mutex::new(0),
        })
    }

    /// Whether any document has ever been written. On zero output records,
    /// callers (the CLI's `report convert` path) delete the empty file
    /// (§7 "On no output records, the converter deletes its empty
    /// destination file.").
    pub fn is_empty(&self) -> bool {
        *self.lines_written.lock().unwrap() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Sink for JsonLinesSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn write(&self, document: &Document) -> Result<()> {
        let line = serde_json::to_string(&project(document))?;
        let mut file = OpenOptions::new().append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        *self.lines_written.lock().unwrap() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intelparser_core::model::{Credential, Email};

    #[tokio::test]
    async fn writes_one_line_per_document_lower_casing_output_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let sink = JsonLinesSink::create(&path).await.unwrap();

        let mut doc = Document::new("IntelX", "/tmp/x/DUMP.txt");
        doc.display_name = "DUMP.TXT".to_string();
        doc.fingerprint = "abc123".to_string();
        doc.emails.push(Email {
            domain: "ACME.IO".to_string(),
            email: "Alice@ACME.IO".to_string(),
            ..Default::default()
        });
        doc.credentials.push(Credential {
            user_domain: "ACME.IO".to_string(),
            username: "alice".to_string(),
            ..Default::default()
        });
        sink.write(&doc).await.unwrap();
        assert!(!sink.is_empty());

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("\"name\":\"dump.txt\""));
        assert!(content.contains("\"domain\":\"acme.io\""));
        assert!(content.contains("\"email\":\"alice@acme.io\""));
        assert!(content.ends_with('\n'));
    }

    #[tokio::test]
    async fn read_documents_round_trips_a_written_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let sink = JsonLinesSink::create(&path).await.unwrap();

        let mut doc = Document::new("IntelX", "/tmp/x/dump.txt");
        doc.fingerprint = "abc123".to_string();
        doc.virtual_path = "Archive.zip/dump.txt".to_string();
        doc.emails.push(Email {
            domain: "acme.io".to_string(),
            email: "alice@acme.io".to_string(),
            ..Default::default()
        });
        sink.write(&doc).await.unwrap();

        let documents = read_documents(&path).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].fingerprint, "abc123");
        assert_eq!(documents[0].emails[0].email, "alice@acme.io");
    }

    #[tokio::test]
    async fn create_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        tokio::fs::write(&path, b"stale\ndata\n").await.unwrap();

        let sink = JsonLinesSink::create(&path).await.unwrap();
        assert!(sink.is_empty());
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.is_empty());
    }
}
