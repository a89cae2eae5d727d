//! Search-index sink (§4.8): four indices (documents, `_creds`, `_urls`,
//! `_emails`) behind a bulk HTTP API, grounded on `elastic.go`'s
//! `ElasticWriter`. Bulk requests cap at 1000 docs or 5 MiB, whichever
//! comes first; failed requests retry with exponential backoff on
//! `429`/`502`/`503`/`504`, matching the source's `RetryOnStatus` +
//! `math.Exp2` backoff.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use intelparser_core::fingerprint::sha1_hex;
use intelparser_core::model::Document;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::sink::Sink;

const BULK_DOC_CAP: usize = 1000;
const BULK_BYTE_CAP: usize = 5 * 1024 * 1024;
const MAX_BULK_ATTEMPTS: u32 = 10;
const RETRYABLE_STATUS: &[u16] = &[429, 502, 503, 504];

pub struct SearchIndexSink {
    client: reqwest::Client,
    base_url: String,
    index: String,
    username: Option<String>,
    password: Option<String>,
}

impl SearchIndexSink {
    /// `uri` is of the form `http://[user:pass@]host:port/index_name`.
    pub async fn new(uri: &str) -> Result<Self> {
        let parsed = url::Url::parse(uri).with_context(|| format!("parsing search index uri {uri}"))?;
        let username = (!parsed.username().is_empty()).then(|| parsed.username().to_string());
        let password = parsed.password().map(|p| p.to_string());
        let port = parsed.port().unwrap_or(9200);
        let base_url = format!(
            "{}://{}:{}",
            parsed.scheme(),
            parsed.host_str().context("search index uri has no host")?,
            port
        );
        let mut index = parsed.path().trim_matches('/').to_string();
        if let Some((first, _)) = index.split_once('/') {
            index = first.to_string();
        }
        if index.is_empty() {
            index = "intelparser".to_string();
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("building search index HTTP client")?;

        let sink = Self {
            client,
            base_url,
            index,
            username,
            password,
        };

        sink.ensure_index(&sink.index.clone(), documents_mapping())
            .await?;
        sink.ensure_index(&format!("{}_creds", sink.index), creds_mapping())
            .await?;
        sink.ensure_index(&format!("{}_urls", sink.index), urls_mapping())
            .await?;
        sink.ensure_index(&format!("{}_emails", sink.index), emails_mapping())
            .await?;

        Ok(sink)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.username, &self.password) {
            (Some(u), p) => builder.basic_auth(u, p.clone()),
            _ => builder,
        }
    }

    async fn ensure_index(&self, index: &str, mapping: Value) -> Result<()> {
        let url = format!("{}/{}", self.base_url, index);
        let resp = self
            .authed(self.client.head(&url))
            .send()
            .await
            .with_context(|| format!("checking search index {index}"))?;
        if resp.status().is_success() {
            return Ok(());
        }

        info!(index, "creating search index");
        let create = self
            .authed(self.client.put(&url))
            .json(&mapping)
            .send()
            .await
            .with_context(|| format!("creating search index {index}"))?;
        if !create.status().is_success() {
            let status = create.status();
            let body = create.text().await.unwrap_or_default();
            bail!("cannot create/update search index [{status}] {index}: {body}");
        }
        Ok(())
    }

    async fn index_doc(&self, index: &str, id: &str, body: &Value) -> Result<()> {
        let url = format!("{}/{}/_doc/{}", self.base_url, index, id);
        let mut attempt = 0u32;
        loop {
            let resp = self.authed(self.client.put(&url)).json(body).send().await;
            match resp {
                Ok(r) if r.status().is_success() => return Ok(()),
                Ok(r) if RETRYABLE_STATUS.contains(&r.status().as_u16()) && attempt < MAX_BULK_ATTEMPTS => {
                    backoff(attempt).await;
                    attempt += 1;
                }
                Ok(r) => {
                    let status = r.status();
                    let body = r.text().await.unwrap_or_default();
                    bail!("cannot create/update document [{status}] {index}/{id}: {body}");
                }
                Err(e) if attempt < MAX_BULK_ATTEMPTS => {
                    warn!(error = %e, attempt, "search index request failed, retrying");
                    backoff(attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e).context("indexing document"),
            }
        }
    }

    /// Posts a set of child documents as NDJSON bulk batches, splitting
    /// whenever the running batch would exceed [`BULK_DOC_CAP`] docs or
    /// [`BULK_BYTE_CAP`] bytes.
    async fn bulk_index(&self, index: &str, docs: &[(String, Value)]) -> Result<()> {
        let mut batch: Vec<&(String, Value)> = Vec::new();
        let mut batch_bytes = 0usize;

        for entry in docs {
            let entry_bytes = serde_json::to_string(&entry.1)?.len();
            if !batch.is_empty()
                && (batch.len() >= BULK_DOC_CAP || batch_bytes + entry_bytes >= BULK_BYTE_CAP)
            {
                self.flush_bulk_batch(index, &batch).await?;
                batch.clear();
                batch_bytes = 0;
            }
            batch.push(entry);
            batch_bytes += entry_bytes;
        }
        if !batch.is_empty() {
            self.flush_bulk_batch(index, &batch).await?;
        }
        Ok(())
    }

    async fn flush_bulk_batch(&self, index: &str, batch: &[&(String, Value)]) -> Result<()> {
        let mut ndjson = String::new();
        for (id, doc) in batch {
            ndjson.push_str(&json!({"index": {"_id": id}}).to_string());
            ndjson.push('\n');
            ndjson.push_str(&serde_json::to_string(doc)?);
            ndjson.push('\n');
        }
        debug!(index, docs = batch.len(), bytes = ndjson.len(), "search index bulk request");

        let url = format!("{}/{}/_bulk", self.base_url, index);
        let mut attempt = 0u32;
        loop {
            let resp = self
                .authed(self.client.post(&url))
                .header("Content-Type", "application/x-ndjson")
                .body(ndjson.clone())
                .send()
                .await;
            match resp {
                Ok(r) if r.status().is_success() => return Ok(()),
                Ok(r) if RETRYABLE_STATUS.contains(&r.status().as_u16()) && attempt < MAX_BULK_ATTEMPTS => {
                    backoff(attempt).await;
                    attempt += 1;
                }
                Ok(r) => {
                    let status = r.status();
                    let body = r.text().await.unwrap_or_default();
                    bail!("bulk index request failed [{status}] {index}: {body}");
                }
                Err(e) if attempt < MAX_BULK_ATTEMPTS => {
                    warn!(error = %e, attempt, "search index bulk request failed, retrying");
                    backoff(attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e).context("bulk indexing documents"),
            }
        }
    }
}

/// `2^attempt` seconds, matching `elastic.go`'s `math.Exp2(float64(i))`.
async fn backoff(attempt: u32) {
    let secs = 2u64.saturating_pow(attempt).min(60);
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

fn document_body(document: &Document) -> Value {
    json!({
        "indexed_at": document.indexed_at,
        "leak_date": document.leak_date,
        "fingerprint": document.fingerprint,
        "name": document.display_name,
        "file_path": document.virtual_path,
        "file_name": document.file_name,
        "mime_type": document.mime_type,
        "size": document.size,
        "provider": document.provider,
        "provider_id": document.provider_id,
        "bucket": document.bucket,
        "media_type": document.media_type,
    })
}

/// Keyed by the SHA-1 of the child's own JSON body, with `file_id` set to
/// the parent document's fingerprint, matching `elastic.go`'s
/// `tools.GetHash(b_data)` + `MarshalAppend`.
fn child_doc(mut fields: Map<String, Value>, parent: &Document) -> (String, Value) {
    fields.insert("file_id".to_string(), json!(parent.fingerprint));
    fields.insert("bucket".to_string(), json!(parent.bucket));
    let body = Value::Object(fields);
    let id = sha1_hex(body.to_string().as_bytes());
    (id, body)
}

fn credential_docs(document: &Document) -> Vec<(String, Value)> {
    document
        .credentials
        .iter()
        .map(|c| {
            let mut fields = Map::new();
            fields.insert("time".into(), json!(c.time));
            fields.insert("rule".into(), json!(c.rule));
            fields.insert("user_domain".into(), json!(c.user_domain));
            fields.insert("username".into(), json!(c.username));
            fields.insert("password".into(), json!(c.password));
            fields.insert("url".into(), json!(c.url));
            fields.insert("url_domain".into(), json!(c.url_domain));
            fields.insert("severity".into(), json!(c.severity));
            fields.insert("entropy".into(), json!(c.entropy));
            fields.insert("near_text".into(), json!(c.near_text));
            child_doc(fields, document)
        })
        .collect()
}

fn url_docs(document: &Document) -> Vec<(String, Value)> {
    document
        .urls
        .iter()
        .map(|u| {
            let mut fields = Map::new();
            fields.insert("time".into(), json!(u.time));
            fields.insert("domain".into(), json!(u.host));
            fields.insert("url".into(), json!(u.url));
            fields.insert("near_text".into(), json!(u.near_text));
            child_doc(fields, document)
        })
        .collect()
}

fn email_docs(document: &Document) -> Vec<(String, Value)> {
    document
        .emails
        .iter()
        .map(|e| {
            let mut fields = Map::new();
            fields.insert("time".into(), json!(e.time));
            fields.insert("domain".into(), json!(e.domain));
            fields.insert("email".into(), json!(e.email));
            fields.insert("near_text".into(), json!(e.near_text));
            child_doc(fields, document)
        })
        .collect()
}

fn documents_mapping() -> Value {
    json!({
        "settings": {"number_of_replicas": 1},
        "mappings": {"properties": {
            "indexed_at": {"type": "date"},
            "leak_date": {"type": "date"},
            "fingerprint": {"type": "keyword"},
            "name": {"type": "keyword"},
            "file_path": {"type": "keyword"},
            "file_name": {"type": "text"},
            "mime_type": {"type": "keyword"},
            "size": {"type": "long"},
            "provider": {"type": "keyword"},
            "provider_id": {"type": "text"},
            "bucket": {"type": "text"},
            "media_type": {"type": "text"}
        }}
    })
}

fn creds_mapping() -> Value {
    json!({
        "settings": {"number_of_replicas": 1},
        "mappings": {"properties": {
            "time": {"type": "date"},
            "rule": {"type": "keyword"},
            "user_domain": {"type": "keyword"},
            "username": {"type": "keyword"},
            "password": {"type": "keyword"},
            "url": {"type": "keyword"},
            "url_domain": {"type": "keyword"},
            "severity": {"type": "long"},
            "entropy": {"type": "long"},
            "near_text": {"type": "text"},
            "bucket": {"type": "text"},
            "file_id": {"type": "keyword"}
        }}
    })
}

fn urls_mapping() -> Value {
    json!({
        "settings": {"number_of_replicas": 1},
        "mappings": {"properties": {
            "time": {"type": "date"},
            "domain": {"type": "keyword"},
            "url": {"type": "keyword"},
            "near_text": {"type": "text"},
            "bucket": {"type": "text"},
            "file_id": {"type": "keyword"}
        }}
    })
}

fn emails_mapping() -> Value {
    json!({
        "settings": {"number_of_replicas": 1},
        "mappings": {"properties": {
            "time": {"type": "date"},
            "domain": {"type": "keyword"},
            "email": {"type": "keyword"},
            "near_text": {"type": "text"},
            "bucket": {"type": "text"},
            "file_id": {"type": "keyword"}
        }}
    })
}

#[async_trait]
impl Sink for SearchIndexSink {
    fn name(&self) -> &str {
        "search-index"
    }

    async fn write(&self, document: &Document) -> Result<()> {
        self.index_doc(&self.index, &document.fingerprint, &document_body(document))
            .await?;
        self.bulk_index(&format!("{}_creds", self.index), &credential_docs(document))
            .await?;
        self.bulk_index(&format!("{}_urls", self.index), &url_docs(document))
            .await?;
        self.bulk_index(&format!("{}_emails", self.index), &email_docs(document))
            .await?;
        Ok(())
    }
}
