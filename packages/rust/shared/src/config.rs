//! Application configuration for keywatch.
//!
//! User config lives at `~/.keywatch/keywatch.toml`.
//! Environment variables override config file values, CLI flags override both.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KeywatchError, Result};
use crate::types::{Subscriber, SubscriberId};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "keywatch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".keywatch";

/// Environment variable names recognised by [`AppConfig::apply_env_overrides`].
pub const ENV_SCAN_INTERVAL_SECS: &str = "KEYWATCH_SCAN_INTERVAL_SECS";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "KEYWATCH_FETCH_TIMEOUT_SECS";
pub const ENV_CONTEXT_BEFORE: &str = "KEYWATCH_CONTEXT_BEFORE";
pub const ENV_CONTEXT_AFTER: &str = "KEYWATCH_CONTEXT_AFTER";
pub const ENV_KEYWORD_MODE: &str = "KEYWATCH_KEYWORD_MODE";
pub const ENV_MAIL_RELAY_URL: &str = "KEYWATCH_MAIL_RELAY_URL";

// ---------------------------------------------------------------------------
// Config structs (matching keywatch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scan scheduling and matching.
    #[serde(default)]
    pub watch: WatchConfig,

    /// Notification delivery.
    #[serde(default)]
    pub mail: MailConfig,

    /// File-backed subscriber directory.
    #[serde(default)]
    pub subscribers: Vec<SubscriberEntry>,
}

/// How keyword strings are interpreted by the matcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordMode {
    /// Plain text, special characters have no meaning.
    #[default]
    Literal,
    /// Regular expression as entered by the subscriber.
    Pattern,
}

impl FromStr for KeywordMode {
    type Err = KeywatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "literal" => Ok(Self::Literal),
            "pattern" | "regex" => Ok(Self::Pattern),
            other => Err(KeywatchError::parse(format!(
                "unknown keyword mode '{other}' (expected 'literal' or 'pattern')"
            ))),
        }
    }
}

impl std::fmt::Display for KeywordMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal => f.write_str("literal"),
            Self::Pattern => f.write_str("pattern"),
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Seconds between scheduled scans.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// Per-fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Characters of context kept before a match.
    #[serde(default = "default_context_width")]
    pub context_before: usize,

    /// Characters of context kept after a match.
    #[serde(default = "default_context_width")]
    pub context_after: usize,

    /// Keyword interpretation.
    #[serde(default)]
    pub keyword_mode: KeywordMode,

    /// Allow fetching loopback/private network hosts.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            context_before: default_context_width(),
            context_after: default_context_width(),
            keyword_mode: KeywordMode::default(),
            allow_private_hosts: false,
        }
    }
}

fn default_scan_interval() -> u64 {
    900
}
fn default_fetch_timeout() -> u64 {
    30
}
fn default_context_width() -> usize {
    50
}

/// `[mail]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Sender address.
    #[serde(default = "default_from")]
    pub from: String,

    /// Subject line for change notifications.
    #[serde(default = "default_subject")]
    pub subject: String,

    /// HTTP mail relay endpoint. Without one, notifications are only logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_url: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: default_from(),
            subject: default_subject(),
            relay_url: None,
        }
    }
}

fn default_from() -> String {
    "keywatch@localhost".into()
}
fn default_subject() -> String {
    "New keyword appeared".into()
}

/// `[[subscribers]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberEntry {
    pub id: String,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub notify_by_email: bool,
    #[serde(default)]
    pub contact_address: String,
}

impl From<&SubscriberEntry> for Subscriber {
    fn from(entry: &SubscriberEntry) -> Self {
        Self {
            id: SubscriberId::new(entry.id.clone()),
            urls: entry.urls.clone(),
            keywords: entry.keywords.clone(),
            notify_by_email: entry.notify_by_email,
            contact_address: entry.contact_address.clone(),
        }
    }
}

impl AppConfig {
    /// Apply `KEYWATCH_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply `KEYWATCH_*` overrides using `lookup` to resolve variables.
    pub fn apply_env_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(v) = lookup(ENV_SCAN_INTERVAL_SECS) {
            self.watch.scan_interval_secs = parse_env(ENV_SCAN_INTERVAL_SECS, &v)?;
        }
        if let Some(v) = lookup(ENV_FETCH_TIMEOUT_SECS) {
            self.watch.fetch_timeout_secs = parse_env(ENV_FETCH_TIMEOUT_SECS, &v)?;
        }
        if let Some(v) = lookup(ENV_CONTEXT_BEFORE) {
            self.watch.context_before = parse_env(ENV_CONTEXT_BEFORE, &v)?;
        }
        if let Some(v) = lookup(ENV_CONTEXT_AFTER) {
            self.watch.context_after = parse_env(ENV_CONTEXT_AFTER, &v)?;
        }
        if let Some(v) = lookup(ENV_KEYWORD_MODE) {
            self.watch.keyword_mode = v.parse()?;
        }
        if let Some(v) = lookup(ENV_MAIL_RELAY_URL) {
            self.mail.relay_url = (!v.trim().is_empty()).then(|| v.trim().to_string());
        }
        Ok(())
    }

    /// Check values that the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.watch.scan_interval_secs == 0 {
            return Err(KeywatchError::config("scan_interval_secs must be positive"));
        }
        if self.watch.fetch_timeout_secs == 0 {
            return Err(KeywatchError::config("fetch_timeout_secs must be positive"));
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &self.subscribers {
            if entry.id.trim().is_empty() {
                return Err(KeywatchError::validation("subscriber id must not be empty"));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(KeywatchError::validation(format!(
                    "duplicate subscriber id '{}'",
                    entry.id
                )));
            }
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| KeywatchError::config(format!("invalid value for {name}: '{value}'")))
}

// ---------------------------------------------------------------------------
// Watch settings (runtime, merged from config + env + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime engine settings.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub scan_interval: Duration,
    pub fetch_timeout: Duration,
    pub context_before: usize,
    pub context_after: usize,
    pub keyword_mode: KeywordMode,
    pub allow_private_hosts: bool,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for WatchSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            scan_interval: Duration::from_secs(config.watch.scan_interval_secs),
            fetch_timeout: Duration::from_secs(config.watch.fetch_timeout_secs),
            context_before: config.watch.context_before,
            context_after: config.watch.context_after,
            keyword_mode: config.watch.keyword_mode,
            allow_private_hosts: config.watch.allow_private_hosts,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.keywatch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| KeywatchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.keywatch/keywatch.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| KeywatchError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| KeywatchError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| KeywatchError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| KeywatchError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| KeywatchError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
