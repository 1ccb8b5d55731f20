//! Configuration file parser for `kih.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! which describes the one show this tool was written for. Unknown keys are
//! accepted by serde but logged as warnings, since they are usually typos.
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Placeholder substituted with the `YYYY-MM-DD` candidate date.
pub const DATE_PLACEHOLDER: &str = "{date}";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds the size limit
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Values parse but cannot work together
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// Every section uses `#[serde(default)]` so any subset of keys can be given.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the SQLite catalog file.
    pub database: String,
    pub show: ShowConfig,
    pub probe: ProbeConfig,
    pub upstream: UpstreamConfig,
    pub channel: ChannelConfig,
}

/// How the show's files are named remotely and which constant metadata
/// discovered episodes carry.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShowConfig {
    /// Candidate URL template; must contain `{date}`.
    pub url_template: String,
    /// First date walked when the catalog is empty.
    pub epoch: NaiveDate,
    /// Episode title; `{date}` becomes the broadcast date as `DD-MM-YYYY`.
    pub title_template: String,
    pub author: String,
    pub subtitle: String,
    pub summary: String,
    pub description: String,
    pub image: String,
    pub explicit: String,
}

/// Which HTTP statuses count as "the file exists".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExistencePolicy {
    /// Anything but 404 is treated as present (redirects and 5xx included).
    Not404,
    /// Only 2xx is present; every other status is treated as absent.
    Success,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_secs: u64,
    pub existence: ExistencePolicy,
}

/// The broadcaster's own aggregator feed, imported by `kih sync`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub url: String,
    /// Only items whose enclosure URL contains this substring are imported.
    pub match_marker: String,
    pub timeout_secs: u64,
}

/// Channel-level metadata of the rendered feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub title: String,
    pub link: String,
    pub language: String,
    pub copyright: String,
    /// Public location of the rendered feed (`atom:link rel="self"`).
    pub self_link: String,
    pub subtitle: String,
    pub author: String,
    pub summary: String,
    pub description: String,
    pub owner_name: String,
    pub owner_email: String,
    pub image: String,
    pub category: String,
    pub explicit: String,
}

const COVER_IMAGE: &str =
    "http://www.radiorecord.ru/upload/iblock/0dd/0ddd4f32b459515dde4ad7e7b5e5fd30.jpg";

impl Default for Config {
    fn default() -> Self {
        Self {
            database: "./episodes.db".to_string(),
            show: ShowConfig::default(),
            probe: ProbeConfig::default(),
            upstream: UpstreamConfig::default(),
            channel: ChannelConfig::default(),
        }
    }
}

impl Default for ShowConfig {
    fn default() -> Self {
        Self {
            url_template: "http://78.140.251.40/tmp_audio/itunes2/hik_-_rr_{date}.mp3".to_string(),
            epoch: NaiveDate::from_ymd_opt(2018, 1, 8).unwrap_or_default(),
            title_template: "Кремов и Хрусталев @ Radio Record ({date})".to_string(),
            author: "Radio Record".to_string(),
            subtitle: String::new(),
            summary: String::new(),
            description: String::new(),
            image: COVER_IMAGE.to_string(),
            explicit: "clean".to_string(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            existence: ExistencePolicy::Not404,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://www.radiorecord.ru/rss.xml".to_string(),
            match_marker: "itunes2/hik_-_rr".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            title: "Radio Record / Кремов и Хрусталев".to_string(),
            link: "http://www.radiorecord.ru".to_string(),
            language: "ru-ru".to_string(),
            copyright: "Radio Record Russia".to_string(),
            self_link: "http://www.radiorecord.ru/rss.xml".to_string(),
            subtitle: "Radio Record".to_string(),
            author: "www.radiorecord.ru".to_string(),
            summary: "Программы Радио Рекорд".to_string(),
            description: "Программы Радио Рекорд".to_string(),
            owner_name: "Marsel Markhabulin".to_string(),
            owner_email: "milar@marsell.ws".to_string(),
            image: COVER_IMAGE.to_string(),
            category: "Comedy".to_string(),
            explicit: "clean".to_string(),
        }
    }
}

impl ShowConfig {
    /// Epoch as midnight UTC of the configured date.
    pub fn epoch_start(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.epoch.and_time(chrono::NaiveTime::MIN))
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Unusable values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(path = %path.display(), database = %config.database, "Loaded configuration");
        Ok(config)
    }

    /// Reject settings that would make every pass fail or loop uselessly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.show.url_template.contains(DATE_PLACEHOLDER) {
            return Err(ConfigError::Invalid(format!(
                "show.url_template must contain {DATE_PLACEHOLDER}"
            )));
        }
        if self.probe.timeout_secs == 0 || self.upstream.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be at least one second".to_string(),
            ));
        }
        if self.database.trim().is_empty() {
            return Err(ConfigError::Invalid("database path is empty".to_string()));
        }
        Ok(())
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    const SECTIONS: [(&str, &[&str]); 4] = [
        (
            "show",
            &[
                "url_template",
                "epoch",
                "title_template",
                "author",
                "subtitle",
                "summary",
                "description",
                "image",
                "explicit",
            ],
        ),
        ("probe", &["timeout_secs", "existence"]),
        ("upstream", &["url", "match_marker", "timeout_secs"]),
        (
            "channel",
            &[
                "title",
                "link",
                "language",
                "copyright",
                "self_link",
                "subtitle",
                "author",
                "summary",
                "description",
                "owner_name",
                "owner_email",
                "image",
                "category",
                "explicit",
            ],
        ),
    ];

    for (key, value) in raw {
        if key == "database" {
            continue;
        }
        match SECTIONS.iter().find(|(name, _)| name == key) {
            None => tracing::warn!(key = %key, "Unknown key in config file, ignoring"),
            Some((section, known)) => {
                if let Some(table) = value.as_table() {
                    for sub in table.keys() {
                        if !known.contains(&sub.as_str()) {
                            tracing::warn!(section = %section, key = %sub, "Unknown key in config file, ignoring");
                        }
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
