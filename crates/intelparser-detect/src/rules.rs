//! Declarative, immutable rule table. Rules are not subclasses: each is a
//! plain record with a `post_processor` selected by kind and dispatched in
//! `postprocess.rs` — Rust has closures too, but a tagged union keeps the
//! table `'static` and trivially `Send + Sync` across worker threads.

use std::sync::OnceLock;

use regex::Regex;

/// Which post-processing routine validates and enriches a rule's matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProcessorKind {
    Url,
    Email,
    EmailPass,
    /// Leak2: multiline, labeled `url|host` / `user|...` / `pass|...` blocks.
    UrlEmailPassLabeled,
    /// Leak3: single-line `url[: ]email:pass`.
    UrlEmailPassInline,
    /// Not present in the provider's own rule set; authored directly from
    /// the specification's URL:User:Pass scenario plus the CPF validator.
    UrlUserPass,
}

pub struct Rule {
    pub id: &'static str,
    pub description: &'static str,
    pub regex: Option<Regex>,
    pub path_regex: Option<Regex>,
    /// Minimum Shannon entropy for the captured secret; 0.0 disables the floor.
    pub entropy: f64,
    /// Which capture group is the "secret"; 0 means first non-empty group.
    pub secret_group: usize,
    pub keywords: Vec<&'static str>,
    pub check_global_stopwords: bool,
    pub post_processor: PostProcessorKind,
}

/// Case-insensitive global denylist: matches anywhere in a captured secret
/// discard the finding when a rule sets `check_global_stopwords`. Data, not
/// code — kept here as the built-in default, overridable by configuration.
pub const DEFAULT_GLOBAL_STOPWORDS: &[&str] = &["gitleaks:allow", "example.com", "lorem ipsum"];

/// Domains that never count as a real email finding, regardless of rule.
pub const DEFAULT_EMAIL_DOMAIN_STOPWORDS: &[&str] =
    &["noreply.github.com", "sentry.io", "localhost"];

/// Domains that never count as a real URL finding.
pub const DEFAULT_URL_DOMAIN_STOPWORDS: &[&str] =
    &["schema.org", "w3.org", "localhost", "127.0.0.1"];

/// Constructor-injected stop-word sets, so tests can run hermetically
/// against a known-small list instead of the process-wide defaults.
#[derive(Debug, Clone)]
pub struct StopWordSets {
    pub global: Vec<String>,
    pub email_domain: Vec<String>,
    pub url_domain: Vec<String>,
}

impl Default for StopWordSets {
    fn default() -> Self {
        Self {
            global: DEFAULT_GLOBAL_STOPWORDS.iter().map(|s| s.to_string()).collect(),
            email_domain: DEFAULT_EMAIL_DOMAIN_STOPWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            url_domain: DEFAULT_URL_DOMAIN_STOPWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

pub fn contains_stopword(haystack: &str, stopwords: &[String]) -> bool {
    let lower = haystack.to_lowercase();
    stopwords.iter().any(|w| lower.contains(&w.to_lowercase()))
}

fn compiled(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in rule pattern must compile")
}

/// The five built-in rules, loaded once at startup. The union of their
/// keywords seeds the Prefilter.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "Url",
            description: "Extract URLs.",
            regex: Some(compiled(
                r#"(?i)(https?:\/\/[a-zA-Z0-9.-]+(?:\.[^\x00-\x1F\s\\,"'<: ]{2,})(?:\/[^\x00-\x1F\s\\,"'<: ]*)?)"#,
            )),
            path_regex: None,
            entropy: 1.0,
            secret_group: 0,
            keywords: vec!["http://", "https://"],
            check_global_stopwords: false,
            post_processor: PostProcessorKind::Url,
        },
        Rule {
            id: "Email",
            description: "Extract Emails.",
            regex: Some(compiled(
                r"(?i)([a-zA-Z0-9_\-\.]+[@|%40][A-Z0-9](?:[A-Z0-9-]*[A-Z0-9])?\.(?:[A-Z0-9](?:[A-Z0-9-]*[A-Z0-9])?)+)",
            )),
            path_regex: None,
            entropy: 2.1,
            secret_group: 0,
            keywords: vec!["@", "%40"],
            check_global_stopwords: false,
            post_processor: PostProcessorKind::Email,
        },
        Rule {
            id: "Leak1 » Email:Pass",
            description: "Extract Email:Pass leaks",
            regex: Some(compiled(
                r"(?i)([a-z0-9._-]+(@|%40)[a-z0-9.-]+\.[a-z]{2,}):([^\s\\]{3,})",
            )),
            path_regex: None,
            entropy: 0.91,
            secret_group: 3,
            keywords: vec!["@", ":"],
            check_global_stopwords: false,
            post_processor: PostProcessorKind::EmailPass,
        },
        Rule {
            id: "Leak2 » URL:Email:Pass",
            description: "Extract Email:Pass leaks",
            regex: Some(compiled(
                r#"(?i)([a-zA-Z0-9_]+)[: ]{1,3}([a-zA-Z0-9_-]{2,30}:\/\/[^"'\n]{1,512})\n[ \t]{0,5}(user|username|login|email)[ :]{1,3}([^\n]{3,512})\n[ \t]{0,5}(pass|password|token|secret|senha|pwd)[ :]{1,3}([^\n\r\t]{3,512})"#,
            )),
            path_regex: None,
            entropy: 0.91,
            secret_group: 6,
            keywords: vec!["http://", "https://"],
            check_global_stopwords: false,
            post_processor: PostProcessorKind::UrlEmailPassLabeled,
        },
        Rule {
            id: "Leak3 » URL:Email:Pass",
            description: "Extract URL:Email:Pass leaks",
            regex: Some(compiled(
                r#"(?i)(https?:\/\/[a-zA-Z0-9.-]+(?:\.[^\x00-\x1F\s\\,"'<: ]{2,})(?:\/[^\x00-\x1F\s\\,"'<: ]*)?)[: ]{1,3}([a-z0-9._-]+(@|%40)[a-z0-9.-]+\.[a-z]{2,}):([^\s\\]{3,})"#,
            )),
            path_regex: None,
            entropy: 0.91,
            secret_group: 4,
            keywords: vec!["http://", "https://"],
            check_global_stopwords: false,
            post_processor: PostProcessorKind::UrlEmailPassInline,
        },
        Rule {
            id: "Leak4 » URL:User:Pass",
            description: "Extract URL:User:Pass leaks, optionally carrying a CPF in user or pass",
            regex: Some(compiled(
                r#"(?i)(https?:\/\/[a-zA-Z0-9.-]+(?:\.[^\x00-\x1F\s\\,"'<: ]{2,})(?:\/[^\x00-\x1F\s\\,"'<: ]*)?)[: ]{1,3}([a-zA-Z0-9._\-@]{3,64}):([^\s\\]{3,})"#,
            )),
            path_regex: None,
            entropy: 0.91,
            secret_group: 3,
            keywords: vec!["http://", "https://"],
            check_global_stopwords: false,
            post_processor: PostProcessorKind::UrlUserPass,
        },
    ]
}

/// Lower-cased, de-duplicated union of every rule's keywords.
pub fn unique_keywords(rules: &[Rule]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for rule in rules {
        for kw in &rule.keywords {
            let lower = kw.to_lowercase();
            if seen.insert(lower.clone()) {
                out.push(lower);
            }
        }
    }
    out
}

/// Protocol-token rejection list for `URL:User:Pass`: a submatch equal to,
/// or containing, one of these is structurally not a username.
pub fn protocol_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(https?|include|ftp)$|http").unwrap())
}

/// `Leak3`'s full pattern, re-exposed so the post-processor can re-extract
/// its four capture groups from `finding.line`, matching `leak3.go`'s own
/// `iRe.FindStringSubmatch(finding.Line)` call.
pub fn leak3_capture_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)(https?:\/\/[a-zA-Z0-9.-]+(?:\.[^\x00-\x1F\s\\,"'<: ]{2,})(?:\/[^\x00-\x1F\s\\,"'<: ]*)?)[: ]{1,3}([a-z0-9._-]+(@|%40)[a-z0-9.-]+\.[a-z]{2,}):([^\s\\]{3,})"#,
        )
        .unwrap()
    })
}

/// `Leak4`'s full pattern, re-exposed for the same reason as
/// [`leak3_capture_regex`].
pub fn leak4_capture_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)(https?:\/\/[a-zA-Z0-9.-]+(?:\.[^\x00-\x1F\s\\,"'<: ]{2,})(?:\/[^\x00-\x1F\s\\,"'<: ]*)?)[: ]{1,3}([a-zA-Z0-9._\-@]{3,64}):([^\s\\]{3,})"#,
        )
        .unwrap()
    })
}
