//! Detector (C5): applies every rule to a decode pass of a fragment,
//! honoring the prefilter, entropy floor, stop-word denylists, and
//! per-rule post-processor. Grounded directly on `runner.go`'s
//! `Detect`/`detectRule`.

use intelparser_core::entropy::shannon_entropy;
use intelparser_core::model::{Finding, Fragment};

use crate::decoder::{segment_with_decoded_overlap, Decoder, EncodedSegment};
use crate::postprocess;
use crate::prefilter::Prefilter;
use crate::rules::{contains_stopword, default_rules, unique_keywords, Rule, StopWordSets};

pub struct Detector {
    rules: Vec<Rule>,
    prefilter: Prefilter,
    max_decode_depth: u32,
    max_target_megabytes: u64,
    near_text_size: usize,
    stopwords: StopWordSets,
}

impl Detector {
    pub fn new(
        max_decode_depth: u32,
        max_target_megabytes: u64,
        near_text_size: usize,
        stopwords: StopWordSets,
    ) -> Self {
        let rules = default_rules();
        let keywords = unique_keywords(&rules);
        let prefilter = Prefilter::new(&keywords);
        Self {
            rules,
            prefilter,
            max_decode_depth,
            max_target_megabytes,
            near_text_size,
            stopwords,
        }
    }

    /// Scans one fragment across every decode pass, returning findings in
    /// left-to-right, pass-ordered sequence. No ordering guarantee holds
    /// *across* rules within the same pass.
    pub fn detect(&self, fragment: &Fragment) -> Vec<Finding> {
        let mut findings = Vec::new();
        let mut current_raw = fragment.raw.clone();
        let mut segments: Vec<EncodedSegment> = Vec::new();
        let decoder = Decoder::new();
        let mut depth: u32 = 0;

        loop {
            let normalized_lower = current_raw.to_lowercase();
            let present = self.prefilter.matching_keywords(&normalized_lower);

            for rule in &self.rules {
                if rule.keywords.is_empty() {
                    findings.extend(self.detect_rule(fragment, &current_raw, rule, &segments));
                    continue;
                }
                if rule
                    .keywords
                    .iter()
                    .any(|k| present.contains(&k.to_lowercase()))
                {
                    findings.extend(self.detect_rule(fragment, &current_raw, rule, &segments));
                }
            }

            depth += 1;
            if depth > self.max_decode_depth {
                break;
            }

            match decoder.decode(&current_raw) {
                Some((next_raw, next_segments)) => {
                    current_raw = next_raw;
                    segments = next_segments;
                }
                None => break,
            }
        }

        findings
    }

    fn detect_rule(
        &self,
        fragment: &Fragment,
        current_raw: &str,
        rule: &Rule,
        segments: &[EncodedSegment],
    ) -> Vec<Finding> {
        let mut findings = Vec::new();

        if let Some(path_re) = &rule.path_regex {
            if rule.regex.is_none() {
                if path_re.is_match(&fragment.file_path) {
                    findings.push(Finding {
                        rule_id: rule.id.to_string(),
                        matched: format!("file detected: {}", fragment.file_path),
                        ..Default::default()
                    });
                }
                return findings;
            }
            if !path_re.is_match(&fragment.file_path) {
                return findings;
            }
        }

        let Some(regex) = &rule.regex else {
            return findings;
        };

        if self.max_target_megabytes > 0 {
            let raw_mb = current_raw.len() as u64 / 1_000_000;
            if raw_mb > self.max_target_megabytes {
                return findings;
            }
        }

        let normalized = normalize_encodings(current_raw);

        for m in regex.find_iter(&normalized) {
            let mut match_start = m.start();
            let mut match_end = m.end();
            let secret_raw = normalized[match_start..match_end]
                .trim_matches(['\n', '\r', '\t'])
                .to_string();

            if !segments.is_empty() {
                match segment_with_decoded_overlap(segments, match_start, match_end) {
                    Some(segment) => {
                        match_start = segment.original_start;
                        match_end = segment.original_end;
                    }
                    None => continue,
                }
            } else {
                match_end = match_start + secret_raw.len();
            }

            let (start_line, start_column) = fragment.line_col(match_start);
            let (end_line, end_column) = fragment.line_col(match_end.max(match_start));
            let (line_start, line_end) = fragment.line_bounds(match_start, match_end.max(match_start));
            let line_text = fragment
                .raw
                .get(line_start..line_end)
                .unwrap_or_default()
                .to_string();

            let mut finding = Finding {
                rule_id: rule.id.to_string(),
                start_line,
                end_line,
                start_column,
                end_column,
                line: line_text,
                matched: secret_raw.clone(),
                secret: secret_raw,
                ..Default::default()
            };

            if let Some(caps) = regex.captures(&finding.secret) {
                if rule.secret_group > 0 {
                    match caps.get(rule.secret_group) {
                        Some(g) => finding.secret = g.as_str().to_string(),
                        None => continue,
                    }
                } else if let Some(g) = (1..caps.len())
                    .filter_map(|i| caps.get(i))
                    .find(|g| !g.as_str().is_empty())
                {
                    finding.secret = g.as_str().to_string();
                }
            }

            if !rule.keywords.is_empty()
                && !rule.keywords.iter().any(|k| finding.matched.contains(k))
            {
                continue;
            }

            let entropy = shannon_entropy(&finding.secret);
            finding.entropy = entropy as f32;
            if rule.entropy != 0.0 && entropy <= rule.entropy {
                continue;
            }

            if rule.check_global_stopwords
                && contains_stopword(&finding.secret, &self.stopwords.global)
            {
                continue;
            }

            if !postprocess::apply(rule.post_processor, &mut finding) {
                continue;
            }

            let near_start = line_start.saturating_sub(self.near_text_size);
            let mut near_end = line_end + self.near_text_size;
            if near_end <= near_start {
                near_end = near_start + 1;
            }
            let near_end = near_end.min(fragment.raw.len());
            let near_text = fragment
                .raw
                .get(near_start..near_end)
                .unwrap_or_default()
                .to_string();

            if let Some(cred) = finding.credential.as_mut() {
                cred.near_text = near_text.clone();
                if cred.url.is_empty()
                    && contains_stopword(&cred.user_domain, &self.stopwords.email_domain)
                {
                    cred.username.clear();
                }
            }
            if let Some(email) = finding.email.as_mut() {
                email.near_text = near_text.clone();
                if contains_stopword(&email.domain, &self.stopwords.email_domain) {
                    email.email.clear();
                }
            }
            if let Some(url) = finding.url.as_mut() {
                url.near_text = near_text;
                if contains_stopword(&url.host, &self.stopwords.url_domain) {
                    url.url.clear();
                }
            }

            let credential_empty = finding
                .credential
                .as_ref()
                .is_none_or(|c| c.username.is_empty());
            let email_empty = finding.email.as_ref().is_none_or(|e| e.email.is_empty());
            let url_empty = finding.url.as_ref().is_none_or(|u| u.url.is_empty());
            if credential_empty && email_empty && url_empty {
                continue;
            }

            findings.push(finding);
        }

        findings
    }
}

/// The normalization table from §4.5: percent-encoded punctuation and
/// HTML line-break markers are rewritten before regex evaluation.
fn normalize_encodings(raw: &str) -> String {
    raw.replace("%40", "@")
        .replace("%20", " ")
        .replace("%22", "\"")
        .replace("%27", "'")
        .replace("%7b", "{")
        .replace("%7d", "}")
        .replace("%5b", "[")
        .replace("%0a", "\n")
        .replace("%0d", "\r")
        .replace("%09", "\t")
        .replace("<br />", "\n")
        .replace("<br/>", "\n")
        .replace("<br>", "\n")
}
