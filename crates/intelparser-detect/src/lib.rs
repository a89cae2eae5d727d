//! Chunked, regex-and-keyword driven detection engine: C1 (rules) through
//! C5 (detector) of the scan pipeline.

pub mod decoder;
pub mod detector;
pub mod postprocess;
pub mod prefilter;
pub mod reader;
pub mod rules;

pub use decoder::{Decoder, DecodeKind, EncodedSegment};
pub use detector::Detector;
pub use prefilter::Prefilter;
pub use reader::{Chunk, ChunkedReader, CHUNK_SIZE, DEFAULT_MAX_TARGET_MEGABYTES, MAX_PEEK_SIZE};
pub use rules::{default_rules, PostProcessorKind, Rule, StopWordSets};
