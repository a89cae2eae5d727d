//! Recursive decode-pass engine (C4).
//!
//! The provider's own `decoder.go` was not present in the retrieved
//! sources, so this pass structure is authored from §4.4/§9 of the
//! specification: each pass produces a new buffer plus the list of
//! `EncodedSegment`s it introduced, rather than mutating a buffer in
//! place, so a match found inside a decoded segment can be mapped back to
//! the pre-decode byte range it came from.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeKind {
    PercentEncoding,
    HtmlBreak,
}

impl DecodeKind {
    pub fn provenance_tag(&self) -> &'static str {
        match self {
            DecodeKind::PercentEncoding => "decoded:percent",
            DecodeKind::HtmlBreak => "decoded:html-break",
        }
    }
}

/// One decoded run: its byte range in the buffer fed into this pass
/// (`original_*`) and the byte range it occupies in the pass's output
/// (`decoded_*`).
#[derive(Debug, Clone)]
pub struct EncodedSegment {
    pub original_start: usize,
    pub original_end: usize,
    pub decoded_start: usize,
    pub decoded_end: usize,
    pub kind: DecodeKind,
}

impl EncodedSegment {
    fn covers_decoded_range(&self, start: usize, end: usize) -> bool {
        start >= self.decoded_start && end <= self.decoded_end
    }
}

/// Finds the first segment whose decoded range fully contains
/// `[start, end)`. A match that straddles two segments, or falls outside
/// all of them, is considered already-consumed and should be skipped by
/// the caller — matching the source's "already been added to a finding"
/// comment.
pub fn segment_with_decoded_overlap(
    segments: &[EncodedSegment],
    start: usize,
    end: usize,
) -> Option<&EncodedSegment> {
    segments.iter().find(|s| s.covers_decoded_range(start, end))
}

fn percent_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:%[0-9A-Fa-f]{2}){3,}").unwrap())
}

fn html_break_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").unwrap())
}

pub struct Decoder;

impl Decoder {
    pub fn new() -> Self {
        Self
    }

    /// Runs one decode pass over `raw`. Returns `None` when no encoded
    /// segment was found, signalling the caller's loop should stop.
    pub fn decode(&self, raw: &str) -> Option<(String, Vec<EncodedSegment>)> {
        let mut matches: Vec<(usize, usize, DecodeKind)> = percent_run_regex()
            .find_iter(raw)
            .map(|m| (m.start(), m.end(), DecodeKind::PercentEncoding))
            .chain(
                html_break_regex()
                    .find_iter(raw)
                    .map(|m| (m.start(), m.end(), DecodeKind::HtmlBreak)),
            )
            .collect();
        if matches.is_empty() {
            return None;
        }
        matches.sort_by_key(|&(start, _, _)| start);

        let mut out = String::with_capacity(raw.len());
        let mut segments = Vec::with_capacity(matches.len());
        let mut cursor = 0usize;

        for (start, end, kind) in matches {
            if start < cursor {
                // Overlaps a previous match's span (e.g. an html-break
                // marker inside a percent-encoded run); keep the first.
                continue;
            }
            out.push_str(&raw[cursor..start]);
            let decoded_start = out.len();
            match kind {
                DecodeKind::PercentEncoding => match urlencoding::decode(&raw[start..end]) {
                    Ok(decoded) => out.push_str(&decoded),
                    Err(_) => out.push_str(&raw[start..end]),
                },
                DecodeKind::HtmlBreak => out.push('\n'),
            }
            let decoded_end = out.len();
            segments.push(EncodedSegment {
                original_start: start,
                original_end: end,
                decoded_start,
                decoded_end,
                kind,
            });
            cursor = end;
        }
        out.push_str(&raw[cursor..]);

        if segments.is_empty() {
            None
        } else {
            Some((out, segments))
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_percent_encoded_run() {
        let decoder = Decoder::new();
        let (decoded, segments) = decoder.decode("user=%6A%6F%65&x=1").unwrap();
        assert_eq!(decoded, "user=joe&x=1");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].kind, DecodeKind::PercentEncoding);
    }

    #[test]
    fn rewrites_html_break_markers_to_newline() {
        let decoder = Decoder::new();
        let (decoded, segments) = decoder.decode("line one<br/>line two<br />line three").unwrap();
        assert_eq!(decoded, "line one\nline two\nline three");
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn no_encoded_segments_yields_none() {
        let decoder = Decoder::new();
        assert!(decoder.decode("plain ascii text, nothing to decode").is_none());
    }

    #[test]
    fn segment_overlap_lookup_finds_containing_segment() {
        let decoder = Decoder::new();
        let (_decoded, segments) = decoder.decode("a<br/>b").unwrap();
        let seg = &segments[0];
        let found = segment_with_decoded_overlap(&segments, seg.decoded_start, seg.decoded_end);
        assert!(found.is_some());
        assert!(segment_with_decoded_overlap(&segments, 0, 1).is_none());
    }
}
