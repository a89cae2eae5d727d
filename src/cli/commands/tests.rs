//! Exercises the clap derive tree directly (§6's CLI surface) without
//! touching the filesystem or network — `dispatch` itself is covered by
//! the scenarios in `driver`/`pool`/`walker`.

use super::Cli;
use clap::Parser;

#[test]
fn parse_intelx_accepts_path_and_threads() {
    let cli = Cli::try_parse_from([
        "intelparser",
        "parse",
        "intelx",
        "--path",
        "/tmp/archive.zip",
        "--threads",
        "4",
    ])
    .unwrap();
    assert!(!cli.quiet);
    assert!(!cli.debug_log);
}

#[test]
fn parse_intelx_threads_defaults_to_ten() {
    let cli = Cli::try_parse_from(["intelparser", "parse", "intelx", "-p", "/tmp/a.zip"]).unwrap();
    let _ = cli;
}

#[test]
fn global_flags_parse_before_and_after_subcommand() {
    let before = Cli::try_parse_from([
        "intelparser",
        "--quiet",
        "--debug-log",
        "parse",
        "intelx",
        "-p",
        "/tmp/a.zip",
    ])
    .unwrap();
    assert!(before.quiet);
    assert!(before.debug_log);

    let after = Cli::try_parse_from([
        "intelparser",
        "parse",
        "intelx",
        "-p",
        "/tmp/a.zip",
        "--quiet",
    ])
    .unwrap();
    assert!(after.quiet);
}

#[test]
fn filter_accepts_comma_separated_buckets() {
    let cli = Cli::try_parse_from([
        "intelparser",
        "parse",
        "intelx",
        "-p",
        "/tmp/a.zip",
        "--filter",
        "leaks,darknet.tor",
    ])
    .unwrap();
    let _ = cli;
}

#[test]
fn report_convert_requires_from_and_to_file() {
    assert!(Cli::try_parse_from([
        "intelparser",
        "report",
        "convert",
        "--from-file",
        "a.sqlite3",
        "--to-file",
        "b.jsonl",
    ])
    .is_ok());

    assert!(Cli::try_parse_from(["intelparser", "report", "convert", "--from-file", "a.sqlite3"])
        .is_err());
}

#[test]
fn report_elastic_requires_uri() {
    assert!(Cli::try_parse_from([
        "intelparser",
        "report",
        "elastic",
        "--from-file",
        "a.sqlite3",
        "--elasticsearch-uri",
        "http://localhost:9200/intelparser",
    ])
    .is_ok());

    assert!(Cli::try_parse_from(["intelparser", "report", "elastic", "--from-file", "a.sqlite3"])
        .is_err());
}

#[test]
fn missing_subcommand_is_a_usage_error() {
    assert!(Cli::try_parse_from(["intelparser"]).is_err());
}
