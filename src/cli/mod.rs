//! CLI surface (§6): `parse intelx`, `report convert`, `report elastic`,
//! plus the two global flags the root command carries in the source
//! (`--debug-log`/`-D`, `--quiet`/`-q`). Grounded on the teacher's
//! `cli/commands/mod.rs` split between the clap derive tree and the
//! subcommand implementations.

pub mod commands;

pub use commands::{dispatch, parse_args, run, Cli};
