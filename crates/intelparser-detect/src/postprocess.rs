//! Post-processors (§4.5): one validator per [`PostProcessorKind`], each
//! grounded on the matching file under
//! `examples/original_source/pkg/runner/rules/*.go`. A post-processor
//! either populates `finding.{credential,email,url}` and returns `true`,
//! or returns `false` to have the caller drop the finding.

use chrono::Utc;
use intelparser_core::cpf::extract_cpf;
use intelparser_core::model::{Credential, Email, Finding, Url};

use crate::rules::{protocol_token_regex, PostProcessorKind};

/// Dispatches to the rule's post-processor. `false` means the finding
/// must be discarded by the caller.
pub fn apply(kind: PostProcessorKind, finding: &mut Finding) -> bool {
    match kind {
        PostProcessorKind::Url => url(finding),
        PostProcessorKind::Email => email(finding),
        PostProcessorKind::EmailPass => email_pass(finding),
        PostProcessorKind::UrlEmailPassLabeled => url_email_pass_labeled(finding),
        PostProcessorKind::UrlEmailPassInline => url_email_pass_inline(finding),
        PostProcessorKind::UrlUserPass => url_user_pass(finding),
    }
}

/// Canonicalizes a raw `%40`/whitespace-padded candidate into the form
/// `net/mail.ParseAddress` expects, mirroring `email.go`/`leak1.go`'s
/// `strings.Replace`/`strings.Trim` chain.
fn canonicalize_email(raw: &str) -> String {
    let replaced = raw.trim_matches(['.', ' ']).replace("%40", "@");
    let lower = replaced.to_lowercase();
    lower.replace(".@", "@").replace("@.", "@")
}

/// A minimal RFC-5322 `addr-spec` check: non-empty local part built from
/// unquoted atoms, an `@`, and a domain of dot-separated labels with a
/// top-level label of at least two letters. Stands in for Go's
/// `net/mail.ParseAddress` (no direct crate equivalent in the workspace's
/// dependency set).
fn parse_address(candidate: &str) -> Option<String> {
    let (local, domain) = candidate.split_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    let local_ok = local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`.{|}~".contains(c));
    if !local_ok || local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return None;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return None;
    }
    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    let tld = labels.last().unwrap();
    if !labels_ok || tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(format!("{local}@{domain}"))
}

/// URL normalization shared by every rule that emits a URL: collapses
/// doubled schemes the source sees in the wild (`http://http://…`, a
/// leak-parser tool mangling its own output).
fn normalize_url(raw: &str) -> String {
    raw.replace("http://http://", "http://")
        .replace("https://https://", "https://")
        .replace("http://https://", "https://")
        .replace("https://http://", "http://")
        .replace("http://http:", "http://")
        .replace("https://https", "https://")
}

fn parse_url_host(raw: &str) -> Option<(String, String)> {
    let normalized = normalize_url(raw);
    match url::Url::parse(&normalized) {
        Ok(u) => {
            let host = u.host_str()?.to_lowercase();
            Some((normalized, host))
        }
        Err(_) => {
            let decoded = urlencoding::decode(&normalized).ok()?.into_owned();
            let u = url::Url::parse(&decoded).ok()?;
            let host = u.host_str()?.to_lowercase();
            Some((decoded, host))
        }
    }
}

/// `Url` rule: §4.5 "normalize doubled schemes; attempt parse; on
/// failure, percent-decode once and retry." Grounded on `url.go`.
fn url(finding: &mut Finding) -> bool {
    let Some((normalized, host)) = parse_url_host(&finding.secret) else {
        return false;
    };
    finding.url = Some(Url {
        time: Some(Utc::now()),
        host,
        url: normalized,
        near_text: String::new(),
    });
    true
}

/// `Email` rule. Grounded on `email.go`.
fn email(finding: &mut Finding) -> bool {
    let candidate = canonicalize_email(&finding.secret);
    let Some(address) = parse_address(&candidate) else {
        return false;
    };
    let domain = address
        .split_once('@')
        .map(|(_, d)| d.to_string())
        .unwrap_or_default();
    finding.email = Some(Email {
        time: Some(Utc::now()),
        domain,
        email: address,
        near_text: String::new(),
    });
    true
}

/// `Email:Pass`: split on the first `:`; left side must contain `@` and
/// parse as an e-mail; right side is the password verbatim. Grounded on
/// `leak1.go`.
fn email_pass(finding: &mut Finding) -> bool {
    let Some((left, right)) = finding.matched.split_once(':') else {
        return false;
    };
    if !left.contains('@') {
        return false;
    }
    let candidate = canonicalize_email(left);
    let Some(address) = parse_address(&candidate) else {
        return false;
    };
    let domain = address
        .split_once('@')
        .map(|(_, d)| d.to_string())
        .unwrap_or_default();

    finding.email = Some(Email {
        time: Some(Utc::now()),
        domain: domain.clone(),
        email: address.clone(),
        near_text: String::new(),
    });
    finding.credential = Some(Credential {
        rule: finding.rule_id.clone(),
        time: Some(Utc::now()),
        user_domain: domain,
        username: address,
        password: right.to_string(),
        severity: 100,
        entropy: finding.entropy,
        ..Default::default()
    });
    true
}

/// Shared identity resolution for the two `URL:Email:Pass` variants
/// (Leak2 multiline-labeled, Leak3 single-line): an identifier containing
/// `@` is parsed as an e-mail and emits an `Email` child; one containing
/// `\` is split as a Windows `DOMAIN\user` pair and only contributes the
/// domain half. Returns `(identifier_for_credential, user_domain, email)`.
fn resolve_identity(identifier: &str) -> (String, String, Option<Email>) {
    if identifier.contains('@') {
        let candidate = canonicalize_email(identifier);
        if let Some(address) = parse_address(&candidate) {
            let domain = address
                .split_once('@')
                .map(|(_, d)| d.to_string())
                .unwrap_or_default();
            let email = Email {
                time: Some(Utc::now()),
                domain: domain.clone(),
                email: address.clone(),
                near_text: String::new(),
            };
            return (address, domain, Some(email));
        }
        (identifier.to_string(), String::new(), None)
    } else if let Some((domain, _user)) = identifier.split_once('\\') {
        if !domain.is_empty() {
            return (identifier.to_string(), domain.to_string(), None);
        }
        (identifier.to_string(), String::new(), None)
    } else {
        (identifier.to_string(), String::new(), None)
    }
}

/// `Leak2 » URL:Email:Pass`: multiline labeled blocks. Grounded on
/// `leak2.go`.
fn url_email_pass_labeled(finding: &mut Finding) -> bool {
    let mut url_raw = String::new();
    let mut identifier = String::new();
    let mut password = String::new();

    for line in finding.matched.split('\n') {
        let Some((key_raw, value_raw)) = line.split_once(':') else {
            continue;
        };
        let key = key_raw.trim().to_lowercase();
        let value = value_raw.trim().to_string();
        match key.as_str() {
            "url" | "host" => url_raw = value,
            "user" | "username" | "login" | "email" => identifier = value,
            "pass" | "password" | "token" | "secret" | "senha" | "pwd" => password = value,
            _ => {}
        }
    }

    if url_raw.is_empty() {
        return false;
    }
    let Some((normalized_url, host)) = parse_url_host(&url_raw) else {
        return false;
    };

    let (username, mut user_domain, email) = resolve_identity(&identifier);

    finding.url = Some(Url {
        time: Some(Utc::now()),
        host: host.clone(),
        url: normalized_url.clone(),
        near_text: String::new(),
    });
    if let Some(e) = email {
        if user_domain.is_empty() {
            user_domain = e.domain.clone();
        }
        finding.email = Some(e);
    }
    finding.credential = Some(Credential {
        rule: finding.rule_id.clone(),
        time: Some(Utc::now()),
        user_domain,
        username,
        password,
        url: normalized_url,
        url_domain: host,
        severity: 100,
        entropy: finding.entropy,
        near_text: finding.matched.clone(),
        ..Default::default()
    });
    true
}

/// `Leak3 » URL:Email:Pass`: single-line `url email:pass`. Grounded on
/// `leak3.go`, re-matching the rule's own regex against `finding.line`
/// the way the source does, since the capture groups aren't otherwise
/// threaded through the secret-group extraction.
fn url_email_pass_inline(finding: &mut Finding) -> bool {
    let re = crate::rules::leak3_capture_regex();
    let Some(caps) = re
        .captures(&finding.line)
        .or_else(|| re.captures(&finding.matched))
    else {
        return false;
    };
    let url_raw = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let identifier = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    let password = caps.get(4).map(|m| m.as_str()).unwrap_or_default();

    let Some((normalized_url, host)) = parse_url_host(url_raw) else {
        return false;
    };
    let (username, mut user_domain, email) = resolve_identity(identifier);

    finding.url = Some(Url {
        time: Some(Utc::now()),
        host: host.clone(),
        url: normalized_url.clone(),
        near_text: String::new(),
    });
    if let Some(e) = email {
        if user_domain.is_empty() {
            user_domain = e.domain.clone();
        }
        finding.email = Some(e);
    }
    finding.credential = Some(Credential {
        rule: finding.rule_id.clone(),
        time: Some(Utc::now()),
        user_domain,
        username,
        password: password.to_string(),
        url: normalized_url,
        url_domain: host,
        severity: 100,
        entropy: finding.entropy,
        near_text: finding.matched.clone(),
        ..Default::default()
    });
    true
}

/// `Leak4 » URL:User:Pass`: authored directly from the specification
/// (§4.1, §4.5, scenario S3); no `leak4.go` was present among the
/// retrieved sources. Rejects identifiers that are themselves protocol
/// tokens or contain `http` (structurally not a username), and runs the
/// CPF checksum against either identifier or password the way §4.5's CPF
/// validator describes.
fn url_user_pass(finding: &mut Finding) -> bool {
    let re = crate::rules::leak4_capture_regex();
    let Some(caps) = re
        .captures(&finding.line)
        .or_else(|| re.captures(&finding.matched))
    else {
        return false;
    };
    let url_raw = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let username = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    let password = caps.get(3).map(|m| m.as_str()).unwrap_or_default();

    if protocol_token_regex().is_match(username) {
        return false;
    }

    let Some((normalized_url, host)) = parse_url_host(url_raw) else {
        return false;
    };

    let cpf = extract_cpf(username).or_else(|| extract_cpf(password));
    let has_cpf = cpf.is_some();

    finding.url = Some(Url {
        time: Some(Utc::now()),
        host: host.clone(),
        url: normalized_url.clone(),
        near_text: String::new(),
    });
    finding.credential = Some(Credential {
        rule: finding.rule_id.clone(),
        time: Some(Utc::now()),
        username: username.to_string(),
        password: password.to_string(),
        cpf,
        has_cpf,
        url: normalized_url,
        url_domain: host,
        severity: 100,
        entropy: finding.entropy,
        near_text: finding.matched.clone(),
        ..Default::default()
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding_with(secret: &str, matched: &str, line: &str) -> Finding {
        Finding {
            rule_id: "test".into(),
            matched: matched.to_string(),
            secret: secret.to_string(),
            line: line.to_string(),
            entropy: 3.0,
            ..Default::default()
        }
    }

    #[test]
    fn url_normalizes_doubled_scheme() {
        let mut f = finding_with("http://http://example.com/x", "", "");
        assert!(url(&mut f));
        assert_eq!(f.url.unwrap().url, "http://example.com/x");
    }

    #[test]
    fn url_percent_decodes_on_parse_failure() {
        let mut f = finding_with("https://example.com/a%20b", "", "");
        assert!(url(&mut f));
        assert_eq!(f.url.as_ref().unwrap().host, "example.com");
    }

    #[test]
    fn email_rejects_malformed_address() {
        let mut f = finding_with("not-an-email", "", "");
        assert!(!email(&mut f));
    }

    #[test]
    fn email_pass_splits_on_first_colon() {
        let mut f = finding_with("", "alice@acme.io:S3cret!", "");
        assert!(email_pass(&mut f));
        let cred = f.credential.unwrap();
        assert_eq!(cred.username, "alice@acme.io");
        assert_eq!(cred.password, "S3cret!");
        assert_eq!(cred.user_domain, "acme.io");
    }

    #[test]
    fn email_pass_rejects_missing_at_sign() {
        let mut f = finding_with("", "notanemail:pass", "");
        assert!(!email_pass(&mut f));
    }

    #[test]
    fn url_user_pass_rejects_protocol_token_username() {
        let line = "https://x.example.com:https:hunter2";
        let mut f = finding_with("", line, line);
        assert!(!url_user_pass(&mut f));
    }

    #[test]
    fn url_user_pass_extracts_cpf_from_username() {
        let line = "https://portal.example.com/login:11144477735:hunter2";
        let mut f = finding_with("", line, line);
        assert!(url_user_pass(&mut f));
        let cred = f.credential.unwrap();
        assert_eq!(cred.cpf.as_deref(), Some("11144477735"));
        assert!(cred.has_cpf);
    }

    #[test]
    fn url_email_pass_inline_resolves_identity_and_domain() {
        let line = "https://portal.example.com: bob@corp.io:hunter2";
        let mut f = finding_with("", line, line);
        assert!(url_email_pass_inline(&mut f));
        let cred = f.credential.unwrap();
        assert_eq!(cred.username, "bob@corp.io");
        assert_eq!(cred.user_domain, "corp.io");
        assert_eq!(cred.password, "hunter2");
    }

    #[test]
    fn url_email_pass_labeled_parses_block() {
        let matched = "myapp: https://portal.example.com\nuser: bob@corp.io\npass: hunter2";
        let mut f = finding_with("", matched, matched);
        assert!(url_email_pass_labeled(&mut f));
        let cred = f.credential.unwrap();
        assert_eq!(cred.username, "bob@corp.io");
        assert_eq!(cred.password, "hunter2");
        assert_eq!(cred.url_domain, "portal.example.com");
    }
}
