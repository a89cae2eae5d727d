//! `ParseFile` equivalent (§4.7 step c-f): fingerprints a payload, checks
//! it against the control sink, resolves its manifest entry, and runs it
//! through the [`Detector`]. Grounded on `parsers/intelx.go`'s `ParseFile`.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use intelparser_core::errors::{IntelparserError, IntelparserResult};
use intelparser_core::fingerprint::sha1_hex_file;
use intelparser_core::model::{Document, Fragment};
use intelparser_detect::{ChunkedReader, Detector};
use intelparser_store::ControlSink;

use crate::manifest::system_id_of;
use crate::walker::FileItem;

/// Settings that gate whether a document's raw bytes are retained
/// alongside its findings (§4.7 step f) — everything else about scanning
/// is governed by the detector itself.
pub struct ContentPolicy<'a> {
    pub save_bucket_words: &'a [String],
    pub save_name_words: &'a [String],
}

impl ContentPolicy<'_> {
    fn should_attach(&self, bucket: &str, file_name: &str) -> bool {
        let bucket_matches = self
            .save_bucket_words
            .iter()
            .any(|w| w.eq_ignore_ascii_case(bucket));
        let name_matches = self
            .save_name_words
            .iter()
            .any(|w| file_name.to_lowercase().contains(&w.to_lowercase()));
        bucket_matches && name_matches
    }
}

/// `--filter`/`--date-from` (not present in the original CLI, added per
/// the bucket/indexed-date filtering the runner's `Options.DateFilter`
/// already modeled internally): documents outside either are skipped
/// before the expensive scan, same cost class as a dedup hit.
#[derive(Default)]
pub struct RunFilter {
    pub buckets: Vec<String>,
    pub date_from: Option<DateTime<Utc>>,
}

impl RunFilter {
    fn admits(&self, bucket: &str, leak_date: DateTime<Utc>) -> bool {
        let bucket_ok = self.buckets.is_empty()
            || self.buckets.iter().any(|b| b.eq_ignore_ascii_case(bucket));
        let date_ok = self.date_from.is_none_or(|from| leak_date >= from);
        bucket_ok && date_ok
    }
}

/// `Ok(None)` means the file was already parsed in a previous run, or is
/// excluded by `filter`, and should be silently skipped (§4.7 step b),
/// matching the source's `ParseFile` returning `(nil, nil)` for a dedup
/// hit.
pub fn parse_file(
    item: &FileItem,
    control: &ControlSink,
    detector: &Detector,
    max_target_megabytes: u64,
    content_policy: &ContentPolicy,
    filter: &RunFilter,
) -> IntelparserResult<Option<Document>> {
    let file_name = item
        .real_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let fingerprint = sha1_hex_file(&item.real_path)
        .map_err(|e| IntelparserError::Internal(e.into()))?;

    if control
        .is_already_parsed(&file_name, &fingerprint)
        .map_err(IntelparserError::Internal)?
    {
        return Ok(None);
    }

    let system_id = system_id_of(&file_name);
    let Some(entry) = item.manifest.get(&system_id) else {
        tracing::warn!(file_name, system_id, "no manifest entry for payload, skipping");
        return Ok(None);
    };

    if !filter.admits(&entry.bucket, entry.date) {
        return Ok(None);
    }

    let mut doc = Document::new("IntelX", item.real_path.to_string_lossy().into_owned());
    doc.file_name = file_name.clone();
    doc.virtual_path = item.virtual_path.clone();
    doc.display_name = entry.name.clone();
    doc.leak_date = entry.date;
    doc.bucket = entry.bucket.clone();
    doc.media_type = entry.media.clone();
    doc.provider_id = entry.system_id.clone();
    doc.fingerprint = fingerprint;
    doc.indexed_at = Utc::now();

    let metadata = std::fs::metadata(&item.real_path)
        .with_context(|| format!("statting {}", item.real_path.display()))
        .map_err(IntelparserError::Internal)?;
    doc.size = metadata.len();

    doc.mime_type = infer::get_from_path(&item.real_path)
        .ok()
        .flatten()
        .map(|k| k.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    match scan(&item.real_path, doc.size, max_target_megabytes, detector) {
        Ok((credentials, emails, urls)) => {
            doc.credentials = credentials;
            doc.emails = emails;
            doc.urls = urls;
        }
        Err(e) if e.is_skip_not_error() => {
            doc.mark_failed(e.to_string());
        }
        Err(e) => return Err(e),
    }

    if content_policy.should_attach(&doc.bucket, &file_name) {
        doc.content = std::fs::read(&item.real_path).ok();
    }

    Ok(Some(doc))
}

type ScanOutput = (
    Vec<intelparser_core::model::Credential>,
    Vec<intelparser_core::model::Email>,
    Vec<intelparser_core::model::Url>,
);

/// Reads `path` in chunks and runs the detector over each, offsetting
/// every finding's line numbers by the chunk's running line count so
/// line/column coordinates are file-wide, not chunk-local (§4.5, §4.3).
fn scan(
    path: &Path,
    size: u64,
    max_target_megabytes: u64,
    detector: &Detector,
) -> IntelparserResult<ScanOutput> {
    let file = std::fs::File::open(path).map_err(|e| IntelparserError::Internal(e.into()))?;
    let mut reader = ChunkedReader::new(file, size, max_target_megabytes)?;

    let mut credentials = Vec::new();
    let mut emails = Vec::new();
    let mut urls = Vec::new();

    while let Some(chunk) = reader.next_chunk()? {
        let fragment =
            Fragment::new(chunk.text, path.to_string_lossy().into_owned()).with_bytes(chunk.bytes);
        for mut finding in detector.detect(&fragment) {
            finding.start_line += chunk.lines_before;
            finding.end_line += chunk.lines_before;
            if let Some(c) = finding.credential.take() {
                credentials.push(c);
            }
            if let Some(e) = finding.email.take() {
                emails.push(e);
            }
            if let Some(u) = finding.url.take() {
                urls.push(u);
            }
        }
    }

    Ok((credentials, emails, urls))
}

#[cfg(test)]
mod tests {
    use super::*;
    use intelparser_detect::rules::StopWordSets;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn item(dir: &Path, name: &str, manifest: HashMap<String, intelparser_core::model::ManifestEntry>) -> FileItem {
        FileItem {
            real_path: dir.join(name),
            virtual_path: format!("Archive.zip/{name}"),
            manifest: Arc::new(manifest),
        }
    }

    fn manifest_with(system_id: &str, bucket: &str) -> HashMap<String, intelparser_core::model::ManifestEntry> {
        let mut m = HashMap::new();
        m.insert(
            system_id.to_string(),
            intelparser_core::model::ManifestEntry {
                name: "display".to_string(),
                date: Utc::now(),
                bucket: bucket.to_string(),
                media: "text".to_string(),
                content: String::new(),
                type_: "file".to_string(),
                size: 10,
                system_id: system_id.to_string(),
            },
        );
        m
    }

    #[test]
    fn skips_when_already_parsed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("passwords.txt"), b"hello@example.com").unwrap();
        let control = ControlSink::in_memory().unwrap();
        let detector = Detector::new(3, 200, 50, StopWordSets::default());

        let fingerprint = sha1_hex_file(&dir.path().join("passwords.txt")).unwrap();
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let mut d = Document::new("IntelX", "passwords.txt");
            d.file_name = "passwords.txt".to_string();
            d.fingerprint = fingerprint;
            intelparser_store::Sink::write(&control, &d).await.unwrap();
        });

        let item = item(dir.path(), "passwords.txt", manifest_with("passwords", "leaks"));
        let policy = ContentPolicy {
            save_bucket_words: &[],
            save_name_words: &[],
        };
        let result = parse_file(&item, &control, &detector, 200, &policy, &RunFilter::default()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn skips_when_manifest_entry_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("orphan.txt"), b"hi").unwrap();
        let control = ControlSink::in_memory().unwrap();
        let detector = Detector::new(3, 200, 50, StopWordSets::default());
        let item = item(dir.path(), "orphan.txt", HashMap::new());
        let policy = ContentPolicy {
            save_bucket_words: &[],
            save_name_words: &[],
        };
        let result = parse_file(&item, &control, &detector, 200, &policy, &RunFilter::default()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn populates_document_from_manifest_and_detects_findings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("leak.txt"), b"contact me at person@company.com\n").unwrap();
        let control = ControlSink::in_memory().unwrap();
        let detector = Detector::new(3, 200, 50, StopWordSets::default());
        let item = item(dir.path(), "leak.txt", manifest_with("leak", "leaks"));
        let policy = ContentPolicy {
            save_bucket_words: &[],
            save_name_words: &[],
        };
        let doc = parse_file(&item, &control, &detector, 200, &policy, &RunFilter::default())
            .unwrap()
            .expect("not a dedup hit");
        assert_eq!(doc.bucket, "leaks");
        assert_eq!(doc.display_name, "display");
        assert!(!doc.failed);
        assert!(!doc.emails.is_empty());
    }

    #[test]
    fn attaches_content_only_when_bucket_and_name_policy_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("passwords.txt"), b"hi").unwrap();
        let control = ControlSink::in_memory().unwrap();
        let detector = Detector::new(3, 200, 50, StopWordSets::default());
        let item = item(dir.path(), "passwords.txt", manifest_with("passwords", "leaks"));
        let policy = ContentPolicy {
            save_bucket_words: &["leaks".to_string()],
            save_name_words: &["passwords.txt".to_string()],
        };
        let doc = parse_file(&item, &control, &detector, 200, &policy, &RunFilter::default())
            .unwrap()
            .expect("not a dedup hit");
        assert!(doc.content.is_some());
    }
}
