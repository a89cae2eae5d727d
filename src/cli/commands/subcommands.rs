//! Subcommand implementations, kept separate from the clap derive tree
//! per the teacher's `cli/commands/subcommands.rs` split.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use intelparser_core::model::Document;
use intelparser_detect::rules::StopWordSets;
use intelparser_detect::Detector;
use intelparser_store::{
    ControlSink, CsvSink, JsonLinesSink, NullSink, RelationalSink, SearchIndexSink, Sink,
    SinkFanout, StdoutSink,
};
use tokio::sync::mpsc;

use crate::config::load_config;
use crate::disk::StatvfsDiskProbe;
use crate::driver::RunFilter;
use crate::pool::{self, PoolSettings};
use crate::status::{print_summary, StatusReporter};
use crate::walker::Walker;

pub struct ParseIntelxArgs {
    pub path: PathBuf,
    pub threads: usize,
    pub quiet: bool,
    pub disable_control_db: bool,
    pub write_db: bool,
    pub write_db_uri: String,
    pub write_csv: bool,
    pub write_csv_file: String,
    pub write_jsonl: bool,
    pub write_jsonl_file: String,
    pub write_stdout: bool,
    pub write_none: bool,
    pub write_elastic: bool,
    pub write_elasticsearch_uri: String,
    pub filter: Vec<String>,
    pub date_from: Option<String>,
}

/// Delegates to a shared [`ControlSink`] so the same database instance
/// both answers dedup checks and receives every record as a sink,
/// matching the source's `GlobalDbURI` writer doing double duty.
struct ControlSinkHandle(Arc<ControlSink>);

#[async_trait]
impl Sink for ControlSinkHandle {
    fn name(&self) -> &str {
        "control"
    }

    async fn write(&self, document: &Document) -> Result<()> {
        self.0.write(document).await
    }

    async fn flush(&self) -> Result<()> {
        self.0.flush().await
    }
}

fn parse_date_from(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("--date-from {raw:?} is neither RFC-3339 nor YYYY-MM-DD"))?;
    Ok(date.and_hms_opt(0, 0, 0).unwrap().and_utc())
}

pub async fn parse_intelx(args: ParseIntelxArgs) -> Result<()> {
    let start = Instant::now();
    let config = load_config(None)?;

    let temp_dir = tempfile::Builder::new()
        .prefix("intelparser_")
        .tempdir()
        .context("creating scan workspace")?;

    let control_db_path = if args.disable_control_db {
        temp_dir.path().join("control.db")
    } else {
        crate::config::control_db_path()?
    };
    let control = Arc::new(ControlSink::open(&control_db_path)?);

    let mut sinks: Vec<Box<dyn Sink>> = vec![Box::new(ControlSinkHandle(control.clone()))];

    if !args.quiet && !args.write_none {
        sinks.push(Box::new(StdoutSink));
    }
    if args.write_stdout {
        sinks.push(Box::new(StdoutSink));
    }
    if args.write_db {
        let uri = args.write_db_uri.strip_prefix("sqlite:///").unwrap_or(&args.write_db_uri);
        sinks.push(Box::new(RelationalSink::open(uri)?));
    }
    if args.write_csv {
        sinks.push(Box::new(CsvSink::create(&args.write_csv_file)?));
    }
    if args.write_jsonl {
        sinks.push(Box::new(JsonLinesSink::create(&args.write_jsonl_file).await?));
    }
    if args.write_none {
        sinks.push(Box::new(NullSink));
    }
    if args.write_elastic {
        sinks.push(Box::new(SearchIndexSink::new(&args.write_elasticsearch_uri).await?));
    }
    if sinks.len() == 1 {
        tracing::warn!("no output sinks configured beyond the control database; results will only be used for deduplication");
    }
    let sinks = Arc::new(SinkFanout::new(sinks));

    let date_from = args.date_from.as_deref().map(parse_date_from).transpose()?;
    let filter = RunFilter {
        buckets: args.filter,
        date_from,
    };

    let stopwords = StopWordSets {
        global: config.global_stopwords.clone(),
        email_domain: config.email_domain_stopwords.clone(),
        url_domain: config.url_domain_stopwords.clone(),
    };
    let detector = Arc::new(Detector::new(
        config.max_decode_depth,
        config.max_target_megabytes,
        config.near_text_size,
        stopwords,
    ));

    let (tx, rx) = mpsc::channel(1);
    let probe = StatvfsDiskProbe;
    let walk_input = args.path.clone();
    let walk_temp_root = temp_dir.path().to_path_buf();
    let walker_handle = tokio::task::spawn_blocking(move || {
        let rt = tokio::runtime::Handle::current();
        rt.block_on(async move {
            let walker = Walker::new(&probe);
            walker.run(&walk_input, &walk_temp_root, tx).await
        })
    });

    let cancel = Arc::new(AtomicBool::new(false));
    let status = StatusReporter::new();

    let settings = PoolSettings {
        threads: args.threads,
        max_target_megabytes: config.max_target_megabytes,
        save_bucket_words: config.save_bucket_words,
        save_name_words: config.save_name_words,
        filter,
    };

    let counters = Arc::new(pool::Counters::default());
    status.start(counters.clone(), args.quiet).await;
    pool::run(settings, rx, detector, control.clone(), sinks.clone(), cancel, counters.clone()).await?;
    status.stop().await;

    sinks.flush().await;
    walker_handle.await.context("walker task panicked")??;

    print_summary(&counters, start.elapsed());
    Ok(())
}

const CONVERTIBLE_EXTENSIONS: &[&str] = &["sqlite3", "db", "jsonl"];

fn ext_of(path: &Path) -> Result<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| CONVERTIBLE_EXTENSIONS.contains(&e.as_str()))
        .with_context(|| {
            format!(
                "{} must end in one of {:?}",
                path.display(),
                CONVERTIBLE_EXTENSIONS
            )
        })
}

fn read_any(path: &Path) -> Result<Vec<Document>> {
    match ext_of(path)?.as_str() {
        "jsonl" => intelparser_store::read_documents(path),
        _ => RelationalSink::open(path)?.read_all(),
    }
}

/// `report convert` (§7, supplemented from `cmd/report_convert.go`):
/// replays every document from `from_file` into `to_file`, deleting the
/// destination if nothing was written.
pub async fn report_convert(from_file: &Path, to_file: &Path) -> Result<()> {
    if from_file == to_file {
        bail!("--from-file and --to-file must differ");
    }
    if !from_file.exists() {
        bail!("{} does not exist", from_file.display());
    }
    let to_ext = ext_of(to_file)?;

    let documents = read_any(from_file)?;
    let mut credentials = 0u64;
    let mut emails = 0u64;
    let mut urls = 0u64;

    match to_ext.as_str() {
        "jsonl" => {
            let sink = JsonLinesSink::create(to_file).await?;
            for doc in &documents {
                credentials += doc.credentials.len() as u64;
                emails += doc.emails.len() as u64;
                urls += doc.urls.len() as u64;
                sink.write(doc).await?;
            }
            if sink.is_empty() {
                tokio::fs::remove_file(to_file).await.ok();
            }
        }
        _ => {
            let sink = RelationalSink::open(to_file)?;
            for doc in &documents {
                credentials += doc.credentials.len() as u64;
                emails += doc.emails.len() as u64;
                urls += doc.urls.len() as u64;
                sink.write(doc).await?;
            }
            sink.flush().await?;
            if credentials + emails + urls == 0 {
                drop(sink);
                tokio::fs::remove_file(to_file).await.ok();
            }
        }
    }

    tracing::info!(
        converted = documents.len(),
        credentials,
        emails,
        urls,
        "conversion complete"
    );
    Ok(())
}

/// `report elastic` (§7, supplemented): replays every document from
/// `from_file` into an Elasticsearch index.
pub async fn report_elastic(from_file: &Path, elasticsearch_uri: &str) -> Result<()> {
    if !from_file.exists() {
        bail!("{} does not exist", from_file.display());
    }
    let documents = read_any(from_file)?;
    let sink = SearchIndexSink::new(elasticsearch_uri).await?;

    let mut credentials = 0u64;
    let mut emails = 0u64;
    let mut urls = 0u64;
    for doc in &documents {
        credentials += doc.credentials.len() as u64;
        emails += doc.emails.len() as u64;
        urls += doc.urls.len() as u64;
        sink.write(doc).await?;
    }
    sink.flush().await?;

    tracing::info!(
        converted = documents.len(),
        credentials,
        emails,
        urls,
        "elastic replay complete"
    );
    Ok(())
}
