//! Configuration (ambient stack): a `serde`-derived [`Config`] loaded from
//! `<home>/.config/intelparser/config.json`, grounded on the teacher's
//! `config/loader/mod.rs` `load_config`/`save_config` shape but without its
//! file-locking or key-migration machinery — this config has no JS-facing
//! camelCase bridge and no concurrent writers to guard against.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Defaults mirror the source tool's: thread count from available
/// parallelism, 50-byte near-text window, three decode passes, 200 MB
/// target cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub threads: usize,
    pub near_text_size: usize,
    pub max_decode_depth: u32,
    pub max_target_megabytes: u64,
    pub global_stopwords: Vec<String>,
    pub email_domain_stopwords: Vec<String>,
    pub url_domain_stopwords: Vec<String>,
    pub save_bucket_words: Vec<String>,
    pub save_name_words: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        use intelparser_detect::rules::{
            DEFAULT_EMAIL_DOMAIN_STOPWORDS, DEFAULT_GLOBAL_STOPWORDS, DEFAULT_URL_DOMAIN_STOPWORDS,
        };
        Self {
            threads: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2),
            near_text_size: 50,
            max_decode_depth: 3,
            max_target_megabytes: intelparser_detect::DEFAULT_MAX_TARGET_MEGABYTES,
            global_stopwords: DEFAULT_GLOBAL_STOPWORDS.iter().map(|s| s.to_string()).collect(),
            email_domain_stopwords: DEFAULT_EMAIL_DOMAIN_STOPWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            url_domain_stopwords: DEFAULT_URL_DOMAIN_STOPWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            save_bucket_words: vec!["leaks".to_string()],
            save_name_words: vec![
                "passwords.txt".to_string(),
                "history.txt".to_string(),
                "brute.txt".to_string(),
                "autofills".to_string(),
            ],
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("could not resolve home directory")?;
    Ok(home.join(".config").join("intelparser").join("config.json"))
}

pub fn control_db_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("could not resolve home directory")?;
    Ok(home.join(".intelparser.db"))
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let default_path = config_path()?;
    let path = path.unwrap_or(default_path.as_path());

    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing config at {}", path.display()))
}

pub fn save_config(config: &Config, path: Option<&Path>) -> Result<()> {
    let default_path = config_path()?;
    let path = path.unwrap_or(default_path.as_path());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content).with_context(|| format!("writing config to {}", path.display()))
}
