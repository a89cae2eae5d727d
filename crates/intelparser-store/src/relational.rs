//! Relational sink (C8): upsert semantics keyed on `fingerprint`, with
//! child collections (`Credentials`/`Emails`/`URLs`) replaced wholesale on
//! every write — the SQLite analogue of the source's
//! `gorm.Clauses(clause.OnConflict{UpdateAll: true})` plus its
//! `constraint:OnDelete:CASCADE` child tables.
//!
//! `ON CONFLICT DO UPDATE` does not itself fire `ON DELETE CASCADE`
//! (no row is deleted), so child rows are deleted and reinserted by hand
//! on every write, inside one transaction.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use intelparser_core::model::{Credential, Document, Email, Url};
use rusqlite::{params, Connection, OptionalExtension};

use crate::sink::Sink;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    provider        TEXT NOT NULL,
    file_path       TEXT NOT NULL,
    file_name       TEXT NOT NULL,
    name            TEXT NOT NULL,
    date            TEXT NOT NULL,
    bucket          TEXT NOT NULL,
    media_type      TEXT NOT NULL,
    indexed_at      TEXT NOT NULL,
    size            INTEGER NOT NULL,
    provider_id     TEXT NOT NULL,
    mime_type       TEXT NOT NULL,
    fingerprint     TEXT NOT NULL UNIQUE,
    content         BLOB,
    failed          INTEGER NOT NULL DEFAULT 0,
    failed_reason   TEXT
);
CREATE TABLE IF NOT EXISTS credentials (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id     INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    rule        TEXT NOT NULL,
    time        TEXT,
    user_domain TEXT NOT NULL,
    username    TEXT NOT NULL,
    password    TEXT NOT NULL,
    cpf         TEXT,
    has_cpf     INTEGER NOT NULL DEFAULT 0,
    url         TEXT NOT NULL,
    url_domain  TEXT NOT NULL,
    severity    INTEGER NOT NULL,
    entropy     REAL NOT NULL,
    near_text   TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS emails (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id   INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    time      TEXT,
    domain    TEXT NOT NULL,
    email     TEXT NOT NULL,
    near_text TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS urls (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id   INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    time      TEXT,
    host      TEXT NOT NULL,
    url       TEXT NOT NULL,
    near_text TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_files_name_fingerprint ON files(file_name, fingerprint);
";

/// Relational sink backed by SQLite. Also the schema the control sink
/// reuses for cross-run dedup.
pub struct RelationalSink {
    conn: Mutex<Connection>,
    /// Batch this many documents per transaction before committing, per
    /// §4.8 "batch size 50–200 rows per transaction."
    batch_size: usize,
    pending: Mutex<usize>,
}

impl RelationalSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("opening relational sink at {}", path.as_ref().display()))?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            batch_size: 100,
            pending: Mutex::new(0),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            batch_size: 100,
            pending: Mutex::new(0),
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[cfg(test)]
    pub(crate) fn conn_for_test(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    /// Reads every document back out, children included. Used by the
    /// `report convert`/`report elastic` replay path, not by the live scan.
    pub fn read_all(&self) -> Result<Vec<Document>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, provider, file_path, file_name, name, date, bucket, media_type,
                    indexed_at, size, provider_id, mime_type, fingerprint, content,
                    failed, failed_reason
             FROM files",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let document = Document {
                provider: row.get(1)?,
                real_path: row.get(2)?,
                file_name: row.get(3)?,
                virtual_path: row.get(2)?,
                display_name: row.get(4)?,
                leak_date: parse_rfc3339(row.get::<_, String>(5)?),
                bucket: row.get(6)?,
                media_type: row.get(7)?,
                indexed_at: parse_rfc3339(row.get::<_, String>(8)?),
                size: row.get::<_, i64>(9)? as u64,
                provider_id: row.get(10)?,
                mime_type: row.get(11)?,
                fingerprint: row.get(12)?,
                content: row.get(13)?,
                failed: row.get::<_, i64>(14)? != 0,
                failed_reason: row.get(15)?,
                credentials: Vec::new(),
                emails: Vec::new(),
                urls: Vec::new(),
            };
            Ok((id, document))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, mut document) = row?;
            document.credentials = read_credentials(&conn, id)?;
            document.emails = read_emails(&conn, id)?;
            document.urls = read_urls(&conn, id)?;
            documents.push(document);
        }
        Ok(documents)
    }

    /// Dedup check per §4.7/§6: a prior *successful* (`failed = 0`) row
    /// with the same `(file_name, fingerprint)` means this payload has
    /// already been parsed.
    pub fn is_already_parsed(&self, file_name: &str, fingerprint: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT count(id) FROM files WHERE failed = 0 AND file_name = ?1 AND fingerprint = ?2",
            params![file_name, fingerprint],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn upsert(conn: &mut Connection, document: &Document) -> Result<()> {
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO files
                (provider, file_path, file_name, name, date, bucket, media_type, indexed_at,
                 size, provider_id, mime_type, fingerprint, content, failed, failed_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(fingerprint) DO UPDATE SET
                provider = excluded.provider,
                file_path = excluded.file_path,
                file_name = excluded.file_name,
                name = excluded.name,
                date = excluded.date,
                bucket = excluded.bucket,
                media_type = excluded.media_type,
                indexed_at = excluded.indexed_at,
                size = excluded.size,
                provider_id = excluded.provider_id,
                mime_type = excluded.mime_type,
                content = excluded.content,
                failed = excluded.failed,
                failed_reason = excluded.failed_reason",
            params![
                document.provider,
                document.virtual_path,
                document.file_name,
                document.display_name,
                document.leak_date.to_rfc3339(),
                document.bucket,
                document.media_type,
                document.indexed_at.to_rfc3339(),
                document.size as i64,
                document.provider_id,
                document.mime_type,
                document.content,
                document.failed as i64,
                document.failed_reason,
            ],
        )?;

        let file_id: i64 = tx
            .query_row(
                "SELECT id FROM files WHERE fingerprint = ?1",
                params![document.fingerprint],
                |row| row.get(0),
            )
            .optional()?
            .context("upserted file row vanished before id lookup")?;

        tx.execute("DELETE FROM credentials WHERE file_id = ?1", params![file_id])?;
        tx.execute("DELETE FROM emails WHERE file_id = ?1", params![file_id])?;
        tx.execute("DELETE FROM urls WHERE file_id = ?1", params![file_id])?;

        for c in &document.credentials {
            insert_credential(&tx, file_id, c)?;
        }
        for e in &document.emails {
            insert_email(&tx, file_id, e)?;
        }
        for u in &document.urls {
            insert_url(&tx, file_id, u)?;
        }

        tx.commit()?;
        Ok(())
    }
}

fn parse_rfc3339(raw: String) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

fn parse_rfc3339_opt(raw: Option<String>) -> Option<chrono::DateTime<chrono::Utc>> {
    raw.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

fn read_credentials(conn: &Connection, file_id: i64) -> Result<Vec<Credential>> {
    let mut stmt = conn.prepare(
        "SELECT rule, time, user_domain, username, password, cpf, has_cpf,
                url, url_domain, severity, entropy, near_text
         FROM credentials WHERE file_id = ?1",
    )?;
    let rows = stmt.query_map(params![file_id], |row| {
        Ok(Credential {
            rule: row.get(0)?,
            time: parse_rfc3339_opt(row.get(1)?),
            user_domain: row.get(2)?,
            username: row.get(3)?,
            password: row.get(4)?,
            cpf: row.get(5)?,
            has_cpf: row.get::<_, i64>(6)? != 0,
            url: row.get(7)?,
            url_domain: row.get(8)?,
            severity: row.get(9)?,
            entropy: row.get(10)?,
            near_text: row.get(11)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

fn read_emails(conn: &Connection, file_id: i64) -> Result<Vec<Email>> {
    let mut stmt =
        conn.prepare("SELECT time, domain, email, near_text FROM emails WHERE file_id = ?1")?;
    let rows = stmt.query_map(params![file_id], |row| {
        Ok(Email {
            time: parse_rfc3339_opt(row.get(0)?),
            domain: row.get(1)?,
            email: row.get(2)?,
            near_text: row.get(3)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

fn read_urls(conn: &Connection, file_id: i64) -> Result<Vec<Url>> {
    let mut stmt =
        conn.prepare("SELECT time, host, url, near_text FROM urls WHERE file_id = ?1")?;
    let rows = stmt.query_map(params![file_id], |row| {
        Ok(Url {
            time: parse_rfc3339_opt(row.get(0)?),
            host: row.get(1)?,
            url: row.get(2)?,
            near_text: row.get(3)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

fn insert_credential(tx: &rusqlite::Transaction, file_id: i64, c: &Credential) -> Result<()> {
    tx.execute(
        "INSERT INTO credentials
            (file_id, rule, time, user_domain, username, password, cpf, has_cpf,
             url, url_domain, severity, entropy, near_text)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            file_id,
            c.rule,
            c.time.map(|t| t.to_rfc3339()),
            c.user_domain,
            c.username,
            c.password,
            c.cpf,
            c.has_cpf as i64,
            c.url,
            c.url_domain,
            c.severity,
            c.entropy,
            c.near_text,
        ],
    )?;
    Ok(())
}

fn insert_email(tx: &rusqlite::Transaction, file_id: i64, e: &Email) -> Result<()> {
    tx.execute(
        "INSERT INTO emails (file_id, time, domain, email, near_text) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            file_id,
            e.time.map(|t| t.to_rfc3339()),
            e.domain,
            e.email,
            e.near_text,
        ],
    )?;
    Ok(())
}

fn insert_url(tx: &rusqlite::Transaction, file_id: i64, u: &Url) -> Result<()> {
    tx.execute(
        "INSERT INTO urls (file_id, time, host, url, near_text) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            file_id,
            u.time.map(|t| t.to_rfc3339()),
            u.host,
            u.url,
            u.near_text,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl Sink for RelationalSink {
    fn name(&self) -> &str {
        "relational"
    }

    async fn write(&self, document: &Document) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        Self::upsert(&mut conn, document)?;
        let mut pending = self.pending.lock().unwrap();
        *pending += 1;
        if *pending >= self.batch_size {
            conn.pragma_update(None, "wal_checkpoint", "PASSIVE").ok();
            *pending = 0;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.pragma_update(None, "wal_checkpoint", "FULL").ok();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(fingerprint: &str) -> Document {
        let mut d = Document::new("IntelX", "/tmp/archive/passwords.txt");
        d.fingerprint = fingerprint.to_string();
        d.virtual_path = "Archive.zip/passwords.txt".to_string();
        d
    }

    #[tokio::test]
    async fn write_then_read_back_is_idempotent_on_fingerprint() {
        let sink = RelationalSink::in_memory().unwrap();
        let d = doc("abc123");
        sink.write(&d).await.unwrap();
        sink.write(&d).await.unwrap();

        let conn = sink.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM files", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn dedup_check_matches_file_name_and_fingerprint() {
        let sink = RelationalSink::in_memory().unwrap();
        let d = doc("abc123");
        sink.write(&d).await.unwrap();
        assert!(sink.is_already_parsed("passwords.txt", "abc123").unwrap());
        assert!(!sink.is_already_parsed("passwords.txt", "other").unwrap());
        assert!(!sink.is_already_parsed("other.txt", "abc123").unwrap());
    }

    #[tokio::test]
    async fn failed_documents_do_not_count_as_already_parsed() {
        let sink = RelationalSink::in_memory().unwrap();
        let mut d = doc("abc123");
        d.mark_failed("boom");
        sink.write(&d).await.unwrap();
        assert!(!sink.is_already_parsed("passwords.txt", "abc123").unwrap());
    }

    #[tokio::test]
    async fn child_rows_are_replaced_on_reupsert() {
        let sink = RelationalSink::in_memory().unwrap();
        let mut d = doc("abc123");
        d.emails.push(Email {
            domain: "acme.io".into(),
            email: "a@acme.io".into(),
            ..Default::default()
        });
        sink.write(&d).await.unwrap();

        d.emails.clear();
        d.emails.push(Email {
            domain: "corp.io".into(),
            email: "b@corp.io".into(),
            ..Default::default()
        });
        sink.write(&d).await.unwrap();

        let conn = sink.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM emails", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let email: String = conn
            .query_row("SELECT email FROM emails", [], |r| r.get(0))
            .unwrap();
        assert_eq!(email, "b@corp.io");
    }

    #[tokio::test]
    async fn read_all_round_trips_document_and_children() {
        let sink = RelationalSink::in_memory().unwrap();
        let mut d = doc("abc123");
        d.emails.push(Email {
            domain: "acme.io".into(),
            email: "a@acme.io".into(),
            ..Default::default()
        });
        sink.write(&d).await.unwrap();

        let documents = sink.read_all().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].fingerprint, "abc123");
        assert_eq!(documents[0].emails.len(), 1);
        assert_eq!(documents[0].emails[0].email, "a@acme.io");
    }
}
