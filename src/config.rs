//! Configuration for swm-node.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Resolution to which ticket issuance dates are truncated.
///
/// Coarser resolutions make near-simultaneous requests produce identical
/// tickets, which then share one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateResolution {
    /// Truncate to the start of the hour.
    Hour,
    /// Truncate to the start of the minute.
    Minute,
    /// Truncate to the whole second.
    Second,
}

/// A configured price point on one payment network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOptionConfig {
    /// Payment network identifier (e.g. `Bitcoin`, `Ripple`).
    pub network: String,

    /// Payment destination. Derived from `key` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Network key the address is derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Price in the network's smallest unit.
    pub amount: u64,
}

/// Shape of the payment configuration.
///
/// A single table selects that option whenever the client has no
/// preference; an array makes the first entry the positional default.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaymentConfig {
    /// No payment configured; tickets are informational only.
    #[default]
    None,
    /// Exactly one option.
    Single(PaymentOptionConfig),
    /// Ordered list of options.
    List(Vec<PaymentOptionConfig>),
}

impl PaymentConfig {
    /// Iterate over the configured options in order.
    pub fn options(&self) -> impl Iterator<Item = &PaymentOptionConfig> {
        let slice: &[PaymentOptionConfig] = match self {
            Self::None => &[],
            Self::Single(option) => std::slice::from_ref(option),
            Self::List(options) => options,
        };
        slice.iter()
    }

    /// Returns true if no option is configured.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.options().next().is_none()
    }
}

/// Node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Read-only directory holding the payable resources.
    #[serde(default = "default_content_root")]
    pub content_root: PathBuf,

    /// Working area holding `tickets/` and `content/` staging.
    #[serde(default = "default_working_root")]
    pub working_root: PathBuf,

    /// Publicly served store, keyed by content digest.
    #[serde(default = "default_published_root")]
    pub published_root: PathBuf,

    /// Base URI under which published content is served.
    #[serde(default)]
    pub base_uri: String,

    /// Seconds a client should wait before retrying a paid fetch.
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    /// Seconds a ticket stays payable.
    #[serde(default = "default_validity")]
    pub validity_secs: u64,

    /// Optional truncation of ticket dates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_resolution: Option<DateResolution>,

    /// Payment options.
    #[serde(default, skip_serializing_if = "PaymentConfig::is_none")]
    pub payment: PaymentConfig,

    /// Upper bound on one network's payment check per poll cycle.
    #[serde(default = "default_check_timeout")]
    pub check_timeout_secs: u64,

    /// Upper bound on one signing call on the request path.
    #[serde(default = "default_sign_timeout")]
    pub sign_timeout_secs: u64,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            content_root: default_content_root(),
            working_root: default_working_root(),
            published_root: default_published_root(),
            base_uri: String::new(),
            ttl_secs: default_ttl(),
            validity_secs: default_validity(),
            date_resolution: None,
            payment: PaymentConfig::default(),
            check_timeout_secs: default_check_timeout(),
            sign_timeout_secs: default_sign_timeout(),
            log_level: default_log_level(),
        }
    }
}

fn default_content_root() -> PathBuf {
    PathBuf::from("content")
}

fn default_working_root() -> PathBuf {
    directories::ProjectDirs::from("", "", "swm")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".data"))
}

fn default_published_root() -> PathBuf {
    PathBuf::from("public").join("snapshot")
}

const fn default_ttl() -> u64 {
    10
}

const fn default_validity() -> u64 {
    3600
}

const fn default_check_timeout() -> u64 {
    30
}

const fn default_sign_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Lower bound on the interval between payment poll cycles.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(60);

impl NodeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error describing the first violation.
    pub fn validate(&self) -> crate::Result<()> {
        if self.ttl_secs == 0 {
            return Err(crate::Error::Config("ttl_secs must be positive".to_string()));
        }
        for option in self.payment.options() {
            if option.network.is_empty() {
                return Err(crate::Error::Config(
                    "payment option with empty network".to_string(),
                ));
            }
            if option.address.is_none() && option.key.is_none() {
                return Err(crate::Error::Config(format!(
                    "payment option for {} needs an address or a key",
                    option.network
                )));
            }
        }
        Ok(())
    }

    /// Interval between payment poll cycles: `max(60s, ttl)`.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        MIN_POLL_INTERVAL.max(Duration::from_secs(self.ttl_secs))
    }

    /// Per-network timeout for the pull path.
    #[must_use]
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    /// Timeout for one signing call.
    #[must_use]
    pub fn sign_timeout(&self) -> Duration {
        Duration::from_secs(self.sign_timeout_secs)
    }
}
