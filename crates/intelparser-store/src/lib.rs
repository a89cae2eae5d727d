//! Pluggable output sinks (C8): relational, control (dedup-only), JSON-lines,
//! CSV, search index, stdout, and null. Every sink implements [`Sink`]; the
//! [`SinkFanout`] writes a record to each registered sink in turn.

pub mod control;
pub mod csv_sink;
pub mod fanout;
pub mod jsonl;
pub mod null;
pub mod relational;
pub mod search_index;
pub mod sink;
pub mod stdout;

pub use control::ControlSink;
pub use csv_sink::CsvSink;
pub use fanout::SinkFanout;
pub use jsonl::{read_documents, JsonLinesSink};
pub use null::NullSink;
pub use relational::RelationalSink;
pub use search_index::SearchIndexSink;
pub use sink::Sink;
pub use stdout::StdoutSink;
