mod subcommands;

#[cfg(test)]
mod tests;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::errors::AppError;

#[derive(Parser)]
#[command(name = "intelparser")]
#[command(about = "Concurrent scan pipeline for leaked-document intelligence archives")]
pub struct Cli {
    /// Enable verbose debug logging.
    #[arg(short = 'D', long = "debug-log", global = true)]
    pub debug_log: bool,
    /// Suppress status output (still writes results).
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse leaked intelligence archives
    Parse {
        #[command(subcommand)]
        cmd: ParseCommands,
    },
    /// Convert or replay previously parsed results
    Report {
        #[command(subcommand)]
        cmd: ReportCommands,
    },
}

#[derive(Subcommand)]
enum ParseCommands {
    /// Parse an IntelX export (a single .zip or a directory of them)
    Intelx {
        /// Path to a .zip archive or a directory of them
        #[arg(short = 'p', long)]
        path: PathBuf,
        /// Number of concurrent worker tasks to use
        #[arg(short = 't', long, default_value_t = 10)]
        threads: usize,
        /// Disable cross-run deduplication against ~/.intelparser.db
        #[arg(long)]
        disable_control_db: bool,

        #[arg(long)]
        write_db: bool,
        #[arg(long, default_value = "intelparser.sqlite3")]
        write_db_uri: String,
        #[arg(long)]
        write_csv: bool,
        #[arg(long, default_value = "intelparser.csv")]
        write_csv_file: String,
        #[arg(long)]
        write_jsonl: bool,
        #[arg(long, default_value = "intelparser.jsonl")]
        write_jsonl_file: String,
        #[arg(long)]
        write_stdout: bool,
        #[arg(long)]
        write_none: bool,
        #[arg(long)]
        write_elastic: bool,
        #[arg(long, default_value = "http://localhost:9200/intelparser")]
        write_elasticsearch_uri: String,

        /// Only keep documents whose manifest bucket matches one of these
        /// (comma-separated), case-insensitive
        #[arg(long, value_delimiter = ',')]
        filter: Vec<String>,
        /// Only keep documents whose manifest leak date is on or after
        /// this RFC-3339 or `YYYY-MM-DD` date
        #[arg(long)]
        date_from: Option<String>,
    },
}

#[derive(Subcommand)]
enum ReportCommands {
    /// Convert a control/relational sink database to JSON lines, or back
    Convert {
        #[arg(long)]
        from_file: PathBuf,
        #[arg(long)]
        to_file: PathBuf,
    },
    /// Replay a previously written sink database into an Elasticsearch index
    Elastic {
        #[arg(long)]
        from_file: PathBuf,
        #[arg(long)]
        elasticsearch_uri: String,
    },
}

/// Parses `std::env::args`. Split out from [`dispatch`] so `main` can
/// inspect `--debug-log` and set up tracing before any subcommand logs.
pub fn parse_args() -> Cli {
    Cli::parse()
}

pub async fn run() -> Result<(), AppError> {
    dispatch(parse_args()).await
}

pub async fn dispatch(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Commands::Parse {
            cmd:
                ParseCommands::Intelx {
                    path,
                    threads,
                    disable_control_db,
                    write_db,
                    write_db_uri,
                    write_csv,
                    write_csv_file,
                    write_jsonl,
                    write_jsonl_file,
                    write_stdout,
                    write_none,
                    write_elastic,
                    write_elasticsearch_uri,
                    filter,
                    date_from,
                },
        } => {
            subcommands::parse_intelx(subcommands::ParseIntelxArgs {
                path,
                threads,
                quiet: cli.quiet,
                disable_control_db,
                write_db,
                write_db_uri,
                write_csv,
                write_csv_file,
                write_jsonl,
                write_jsonl_file,
                write_stdout,
                write_none,
                write_elastic,
                write_elasticsearch_uri,
                filter,
                date_from,
            })
            .await?;
        }
        Commands::Report {
            cmd: ReportCommands::Convert { from_file, to_file },
        } => {
            subcommands::report_convert(&from_file, &to_file).await?;
        }
        Commands::Report {
            cmd: ReportCommands::Elastic { from_file, elasticsearch_uri },
        } => {
            subcommands::report_elastic(&from_file, &elasticsearch_uri).await?;
        }
    }

    Ok(())
}
