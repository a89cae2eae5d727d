//! Root crate: the CLI surface (§6), orchestration (archive walker,
//! worker pool, status reporter) and configuration loading that sit on
//! top of `intelparser-core`/`intelparser-detect`/`intelparser-store`.
//!
//! `intelparser-core` has no I/O, `intelparser-detect` is pure CPU-bound
//! scanning, and `intelparser-store` owns every sink's connection state;
//! this crate is the only one that touches the filesystem layout
//! (archives, temp dirs, config files) and wires them together.

pub mod cli;
pub mod config;
pub mod disk;
pub mod driver;
pub mod errors;
pub mod manifest;
pub mod pool;
pub mod status;
pub mod walker;
