use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A logical unit of scanned content: one payload file inside an archive,
/// enriched from the archive's manifest.
///
/// `fingerprint` is the unique key in any persistent sink — re-ingesting a
/// file with the same `(file_name, fingerprint)` must be idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub provider: String,
    pub real_path: String,
    /// Basename of the on-disk payload at ingest time (before `real_path` is
    /// overwritten with `virtual_path` on emission). The other half of the
    /// `(file_name, fingerprint)` dedup key the control sink checks.
    pub file_name: String,
    pub virtual_path: String,
    pub display_name: String,
    pub leak_date: DateTime<Utc>,
    pub bucket: String,
    pub media_type: String,
    pub indexed_at: DateTime<Utc>,
    pub size: u64,
    pub provider_id: String,
    pub mime_type: String,
    pub fingerprint: String,
    pub content: Option<Vec<u8>>,
    pub failed: bool,
    pub failed_reason: Option<String>,
    pub credentials: Vec<Credential>,
    pub emails: Vec<Email>,
    pub urls: Vec<Url>,
}

impl Document {
    pub fn new(provider: impl Into<String>, real_path: impl Into<String>) -> Self {
        let now = Utc::now();
        let real_path = real_path.into();
        let file_name = std::path::Path::new(&real_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            provider: provider.into(),
            real_path,
            file_name,
            virtual_path: String::new(),
            display_name: String::new(),
            leak_date: now,
            bucket: String::new(),
            media_type: String::new(),
            indexed_at: now,
            size: 0,
            provider_id: String::new(),
            mime_type: String::new(),
            fingerprint: String::new(),
            content: None,
            failed: false,
            failed_reason: None,
            credentials: Vec::new(),
            emails: Vec::new(),
            urls: Vec::new(),
        }
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.failed = true;
        self.failed_reason = Some(reason.into());
    }
}

/// A leaked credential: `URL:User:Pass`, `Email:Pass`, or `URL:Email:Pass`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credential {
    pub rule: String,
    pub time: Option<DateTime<Utc>>,
    pub user_domain: String,
    pub username: String,
    pub password: String,
    pub cpf: Option<String>,
    pub has_cpf: bool,
    pub url: String,
    pub url_domain: String,
    pub severity: i32,
    pub entropy: f32,
    pub near_text: String,
}

/// An e-mail address finding. `email` must have passed RFC-5322 parsing
/// after canonicalization; `domain` is always lower-case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Email {
    pub time: Option<DateTime<Utc>>,
    pub domain: String,
    pub email: String,
    pub near_text: String,
}

/// A URL finding. `host` is always lower-case and non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Url {
    pub time: Option<DateTime<Utc>>,
    pub host: String,
    pub url: String,
    pub near_text: String,
}

/// Transient detector output for one regex match position. Carries
/// exactly zero-or-one of {credential, email, url}, populated by the
/// rule's post-processor.
#[derive(Debug, Clone, Default)]
pub struct Finding {
    pub rule_id: String,
    pub start_line: usize,
    pub end_line: usize,
    pub start_column: usize,
    pub end_column: usize,
    pub line: String,
    pub matched: String,
    pub secret: String,
    pub entropy: f32,
    pub credential: Option<Credential>,
    pub email: Option<Email>,
    pub url: Option<Url>,
}

impl Finding {
    /// At least one of credential/email/url must be populated for a
    /// finding to be emittable.
    pub fn has_payload(&self) -> bool {
        self.credential.is_some() || self.email.is_some() || self.url.is_some()
    }
}

/// A scan unit: raw text plus a precomputed vector of newline byte
/// offsets for O(log n) line/column resolution.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub raw: String,
    pub bytes: Option<Vec<u8>>,
    pub file_path: String,
    newline_offsets: Vec<usize>,
}

impl Fragment {
    pub fn new(raw: String, file_path: impl Into<String>) -> Self {
        let newline_offsets = raw
            .bytes()
            .enumerate()
            .filter_map(|(i, b)| (b == b'\n').then_some(i))
            .collect();
        Self {
            raw,
            bytes: None,
            file_path: file_path.into(),
            newline_offsets,
        }
    }

    pub fn with_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.bytes = Some(bytes);
        self
    }

    /// 1-indexed (line, column) of the byte offset `pos`.
    pub fn line_col(&self, pos: usize) -> (usize, usize) {
        let idx = self.newline_offsets.partition_point(|&nl| nl < pos);
        let line_start = if idx == 0 {
            0
        } else {
            self.newline_offsets[idx - 1] + 1
        };
        (idx + 1, pos - line_start + 1)
    }

    /// Byte range `[start, end)` of the full line(s) spanning
    /// `[start_pos, end_pos)`, used to populate `Finding.line`.
    pub fn line_bounds(&self, start_pos: usize, end_pos: usize) -> (usize, usize) {
        let start_idx = self.newline_offsets.partition_point(|&nl| nl < start_pos);
        let line_start = if start_idx == 0 {
            0
        } else {
            self.newline_offsets[start_idx - 1] + 1
        };
        let end_idx = self.newline_offsets.partition_point(|&nl| nl < end_pos);
        let line_end = if end_idx < self.newline_offsets.len() {
            self.newline_offsets[end_idx]
        } else {
            self.raw.len()
        };
        (line_start, line_end)
    }

    pub fn newline_count(&self) -> usize {
        self.newline_offsets.len()
    }
}

/// One row of the provider's `Info.csv` manifest.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub name: String,
    pub date: DateTime<Utc>,
    pub bucket: String,
    pub media: String,
    pub content: String,
    pub type_: String,
    pub size: u64,
    pub system_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_first_line() {
        let f = Fragment::new("hello\nworld\n".to_string(), "f.txt");
        assert_eq!(f.line_col(0), (1, 1));
        assert_eq!(f.line_col(4), (1, 5));
    }

    #[test]
    fn line_col_second_line() {
        let f = Fragment::new("hello\nworld\n".to_string(), "f.txt");
        // 'w' is at byte offset 6
        assert_eq!(f.line_col(6), (2, 1));
    }

    #[test]
    fn line_bounds_spans_full_line() {
        let f = Fragment::new("one\ntwo three\nfour\n".to_string(), "f.txt");
        let (start, end) = f.line_bounds(4, 13);
        assert_eq!(&f.raw[start..end], "two three");
    }

    #[test]
    fn finding_requires_payload() {
        let mut finding = Finding::default();
        assert!(!finding.has_payload());
        finding.url = Some(Url::default());
        assert!(finding.has_payload());
    }

    #[test]
    fn document_new_sets_provider_and_path() {
        let doc = Document::new("IntelX", "/tmp/archive/file.txt");
        assert_eq!(doc.provider, "IntelX");
        assert_eq!(doc.real_path, "/tmp/archive/file.txt");
        assert_eq!(doc.file_name, "file.txt");
        assert!(!doc.failed);
    }
}
