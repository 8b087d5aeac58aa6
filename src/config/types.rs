use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure for Octagon-Harvest
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub http: HttpConfig,
    pub discovery: DiscoveryConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

/// Target site configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Scheme and host of the statistics site, without a trailing path
    #[serde(rename = "base-url")]
    pub base_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://ufcstats.com".to_string(),
        }
    }
}

/// HTTP client behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Whole-request timeout in seconds
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,

    /// Additional attempts after the first one
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubles on every further retry
    #[serde(rename = "backoff-base-ms")]
    pub backoff_base_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("octagon-harvest/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            max_retries: 3,
            backoff_base_ms: 1000,
        }
    }
}

/// Discovery crawl pacing and checkpointing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Fixed delay between successive page fetches (milliseconds)
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,

    /// Persist a checkpoint after this many parent pages
    #[serde(rename = "checkpoint-every")]
    pub checkpoint_every: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 1500,
            checkpoint_every: 100,
        }
    }
}

/// Storage locations
///
/// Relative paths are resolved against the config file's directory by
/// [`PathsConfig::resolve`], so every component receives absolute paths.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the discovered URL lists
    #[serde(rename = "url-dir")]
    pub url_dir: PathBuf,

    /// Directory holding discovery checkpoints
    #[serde(rename = "checkpoint-dir")]
    pub checkpoint_dir: PathBuf,

    /// Directory holding the raw tables written by the page scrapers
    #[serde(rename = "raw-dir")]
    pub raw_dir: PathBuf,

    /// Directory the normalized tables are written to
    #[serde(rename = "normalized-dir")]
    pub normalized_dir: PathBuf,

    /// Optional SQLite file remembering natural key -> surrogate key
    #[serde(rename = "key-registry")]
    pub key_registry: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            url_dir: PathBuf::from("urls"),
            checkpoint_dir: PathBuf::from("checkpoints"),
            raw_dir: PathBuf::from("scraped_files"),
            normalized_dir: PathBuf::from("scraped_files"),
            key_registry: None,
        }
    }
}

impl PathsConfig {
    /// Returns a copy with every relative path joined onto `base`
    pub fn resolve(&self, base: &Path) -> Self {
        let abs = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base.join(p)
            }
        };

        Self {
            url_dir: abs(&self.url_dir),
            checkpoint_dir: abs(&self.checkpoint_dir),
            raw_dir: abs(&self.raw_dir),
            normalized_dir: abs(&self.normalized_dir),
            key_registry: self.key_registry.as_deref().map(abs),
        }
    }

    /// Points every location at `dir` (used by tests and one-off runs)
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            url_dir: dir.join("urls"),
            checkpoint_dir: dir.join("checkpoints"),
            raw_dir: dir.join("scraped_files"),
            normalized_dir: dir.join("scraped_files"),
            key_registry: None,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write log lines to this file
    pub file: Option<PathBuf>,
}
