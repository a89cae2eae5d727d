//! Manifest parsing (§4.6 step 5, §6): reads `Info.csv`, resolving its
//! header case-insensitively, and returns a map keyed by lower-cased
//! system-id. Grounded on `parsers/intelx.go`'s `ParseInfo`, which resolves
//! each column index once from the header row rather than assuming a fixed
//! column order.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use intelparser_core::model::ManifestEntry;

const EXPECTED_COLUMNS: &[&str] = &[
    "name", "date", "bucket", "media", "content", "type", "size", "system id",
];

pub fn parse_manifest(path: &Path) -> Result<HashMap<String, ManifestEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading manifest at {}", path.display()))?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    let mut columns: HashMap<&str, usize> = HashMap::new();
    for (idx, header) in headers.iter().enumerate() {
        columns.insert(header.trim(), idx);
    }

    let mut index_of = |name: &str| -> Result<usize> {
        columns
            .iter()
            .find(|(h, _)| h.eq_ignore_ascii_case(name))
            .map(|(_, &i)| i)
            .with_context(|| format!("manifest missing column {name:?}"))
    };

    let name_idx = index_of("name")?;
    let date_idx = index_of("date")?;
    let bucket_idx = index_of("bucket")?;
    let media_idx = index_of("media")?;
    let content_idx = index_of("content")?;
    let type_idx = index_of("type")?;
    let size_idx = index_of("size")?;
    let system_id_idx = index_of("system id")?;

    let _ = EXPECTED_COLUMNS;

    let mut entries = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let get = |idx: usize| record.get(idx).unwrap_or_default();

        let system_id = get(system_id_idx).to_lowercase();
        if system_id.is_empty() {
            continue;
        }
        let entry = ManifestEntry {
            name: get(name_idx).to_string(),
            date: parse_manifest_date(get(date_idx)),
            bucket: get(bucket_idx).to_string(),
            media: get(media_idx).to_string(),
            content: get(content_idx).to_string(),
            type_: get(type_idx).to_string(),
            size: get(size_idx).parse().unwrap_or(0),
            system_id: system_id.clone(),
        };
        entries.insert(system_id, entry);
    }

    if entries.is_empty() {
        bail!("manifest at {} has no entries", path.display());
    }

    Ok(entries)
}

/// `YYYY-MM-DD HH:MM:SS`, then RFC-3339, else current time (§6).
fn parse_manifest_date(raw: &str) -> DateTime<Utc> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return naive.and_utc();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc);
    }
    Utc::now()
}

/// The system-id lookup key for a payload file: its basename minus
/// extension, lower-cased (§4.7 step c).
pub fn system_id_of(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(dir: &Path, content: &str) -> std::path::PathBuf {
        let path = dir.join("Info.csv");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn parses_header_case_insensitively_and_keys_by_lowercased_system_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            &dir,
            "Name,Date,Bucket,Media,Content,Type,Size,System ID\n\
             passwords.txt,2024-01-02 03:04:05,leaks,text,creds,file,128,ABC123\n",
        );
        let entries = parse_manifest(&path).unwrap();
        let entry = entries.get("abc123").expect("entry present");
        assert_eq!(entry.name, "passwords.txt");
        assert_eq!(entry.bucket, "leaks");
        assert_eq!(entry.size, 128);
    }

    #[test]
    fn tolerates_utf8_bom_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = String::from('\u{feff}');
        content.push_str("Name,Date,Bucket,Media,Content,Type,Size,System ID\n");
        content.push_str("a.txt,2024-01-02 03:04:05,leaks,text,creds,file,10,X1\n");
        let path = write_manifest(&dir, &content);
        let entries = parse_manifest(&path).unwrap();
        assert!(entries.contains_key("x1"));
    }

    #[test]
    fn unparseable_date_falls_back_to_now_instead_of_erroring() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            &dir,
            "Name,Date,Bucket,Media,Content,Type,Size,System ID\n\
             a.txt,not-a-date,leaks,text,creds,file,10,X1\n",
        );
        let entries = parse_manifest(&path).unwrap();
        assert!(entries.contains_key("x1"));
    }

    #[test]
    fn system_id_of_strips_extension_and_lowercases() {
        assert_eq!(system_id_of("ABC123.txt"), "abc123");
        assert_eq!(system_id_of("no_ext"), "no_ext");
    }
}
