//! Brazilian CPF (national ID) extraction and checksum validation.
//!
//! Mirrors `internal/tools/cpf.go` from the provider's original tool:
//! an 11-digit number (optionally punctuated `###.###.###-##`) with two
//! trailing check digits computed from weighted sums mod 11.

use std::sync::OnceLock;

use regex::Regex;

fn cpf_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{3}[.\-]?\d{3}[.\-]?\d{3}[.\-]?\d{2})\b").unwrap())
}

fn strip_punctuation(cpf: &str) -> String {
    cpf.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Validates an 11-digit CPF (punctuation already stripped).
pub fn validate_cpf(cpf: &str) -> bool {
    if cpf.len() != 11 || !cpf.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let digits: Vec<u32> = cpf.bytes().map(|b| (b - b'0') as u32).collect();

    // Reject all-equal-digit CPFs (e.g. "11111111111").
    if digits.iter().all(|&d| d == digits[0]) {
        return false;
    }

    let check_digit = |weights_start: u32, take: usize| -> u32 {
        let sum: u32 = digits[..take]
            .iter()
            .enumerate()
            .map(|(i, d)| d * (weights_start - i as u32))
            .sum();
        let rem = (sum * 10) % 11;
        if rem == 10 { 0 } else { rem }
    };

    let d1 = check_digit(10, 9);
    if d1 != digits[9] {
        return false;
    }

    let d2 = check_digit(11, 10);
    if d2 != digits[10] {
        return false;
    }

    true
}

/// Finds the first CPF-shaped substring of `text` that passes the
/// checksum and returns its cleaned (digits-only) form.
pub fn extract_cpf(text: &str) -> Option<String> {
    let m = cpf_regex().find(text)?;
    let cleaned = strip_punctuation(m.as_str());
    if validate_cpf(&cleaned) {
        Some(cleaned)
    } else {
        None
    }
}
