//! Command-line interface definition.

use clap::{Parser, Subcommand, ValueEnum};
use swm_node::config::{DateResolution, NodeConfig};
use std::path::PathBuf;

/// Pay-per-resource content node: issues 402 tickets and publishes paid
/// content.
#[derive(Parser, Debug)]
#[command(name = "swm-node")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the payable resources.
    #[arg(long, env = "SWM_CONTENT_ROOT")]
    pub content_root: Option<PathBuf>,

    /// Working directory for tickets and staging.
    #[arg(long, env = "SWM_WORKING_ROOT")]
    pub working_root: Option<PathBuf>,

    /// Directory paid content is published into.
    #[arg(long, env = "SWM_PUBLISHED_ROOT")]
    pub published_root: Option<PathBuf>,

    /// Base URI of the published store.
    #[arg(long, env = "SWM_BASE_URI")]
    pub base_uri: Option<String>,

    /// Retry delay advertised to clients, in seconds.
    #[arg(long, env = "SWM_TTL")]
    pub ttl: Option<u64>,

    /// Seconds a ticket stays payable.
    #[arg(long, env = "SWM_VALIDITY")]
    pub validity: Option<u64>,

    /// Truncate ticket dates to this resolution.
    #[arg(long, value_enum, env = "SWM_DATE_RESOLUTION")]
    pub date_resolution: Option<CliDateResolution>,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "SWM_JSON_LOGS")]
    pub json_logs: bool,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// What to do; defaults to `run`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Watch for payments and expire stale tickets until Ctrl-C.
    Run,
    /// Issue a ticket for a resource and print the 402 headers.
    Issue {
        /// Resource key relative to the content root.
        key: String,
        /// Networks the client can pay on, most preferred first.
        #[arg(long)]
        accept_network: Option<String>,
    },
    /// Expire every outstanding ticket past its validity.
    Sweep,
}

/// Date resolution CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliDateResolution {
    /// Whole hours.
    Hour,
    /// Whole minutes.
    Minute,
    /// Whole seconds.
    Second,
}

impl Cli {
    /// Convert CLI arguments into a NodeConfig.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn to_config(&self) -> color_eyre::Result<NodeConfig> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            NodeConfig::from_file(path)?
        } else {
            NodeConfig::default()
        };

        // Override with CLI arguments
        if let Some(ref root) = self.content_root {
            config.content_root.clone_from(root);
        }
        if let Some(ref root) = self.working_root {
            config.working_root.clone_from(root);
        }
        if let Some(ref root) = self.published_root {
            config.published_root.clone_from(root);
        }
        if let Some(ref base_uri) = self.base_uri {
            config.base_uri.clone_from(base_uri);
        }
        if let Some(ttl) = self.ttl {
            config.ttl_secs = ttl;
        }
        if let Some(validity) = self.validity {
            config.validity_secs = validity;
        }
        if let Some(resolution) = self.date_resolution {
            config.date_resolution = Some(resolution.into());
        }
        config.log_level.clone_from(&self.log_level);

        Ok(config)
    }
}

impl From<CliDateResolution> for DateResolution {
    fn from(r: CliDateResolution) -> Self {
        match r {
            CliDateResolution::Hour => DateResolution::Hour,
            CliDateResolution::Minute => DateResolution::Minute,
            CliDateResolution::Second => DateResolution::Second,
        }
    }
}
