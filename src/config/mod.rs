//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - Environment variables
//! - CLI arguments

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::protocol::FileContentsResponse;

pub mod types;

pub use types::{ClipboardConfig, FuseConfig, LoggingConfig, TransportConfig};

/// Smallest accepted response timeout
const MIN_RESPONSE_TIMEOUT_SECS: u64 = 1;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Clipboard configuration
    #[serde(default)]
    pub clipboard: ClipboardConfig,
    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,
    /// FUSE configuration
    #[serde(default)]
    pub fuse: FuseConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Result<Self> {
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.transport
            .listen_addr
            .parse::<SocketAddr>()
            .context("Invalid listen address")?;

        if let Some(peer) = &self.transport.connect_addr {
            if peer.is_empty() {
                anyhow::bail!("Empty connect address");
            }
        }

        if self.clipboard.response_wait_timeout_secs < MIN_RESPONSE_TIMEOUT_SECS {
            anyhow::bail!(
                "response_wait_timeout_secs must be at least {}",
                MIN_RESPONSE_TIMEOUT_SECS
            );
        }

        if self.clipboard.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }

        if self.clipboard.poll_interval_ms >= self.clipboard.response_wait_timeout_secs * 1000 {
            anyhow::bail!(
                "poll_interval_ms ({}) must be shorter than the response timeout ({}s)",
                self.clipboard.poll_interval_ms,
                self.clipboard.response_wait_timeout_secs
            );
        }

        // A FILECONTENTS response carries a stream id next to the data
        if self.clipboard.max_data_size
            > FileContentsResponse::max_data_len(self.transport.max_frame_size)
        {
            anyhow::bail!(
                "max_data_size ({}) plus the {} byte stream id cannot exceed max_frame_size ({})",
                self.clipboard.max_data_size,
                FileContentsResponse::STREAM_ID_LEN,
                self.transport.max_frame_size
            );
        }

        if self.clipboard.file_chunk_size == 0 {
            anyhow::bail!("file_chunk_size must be greater than zero");
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(
        mut self,
        listen: Option<String>,
        connect: Option<String>,
        mount: bool,
    ) -> Self {
        if let Some(listen_addr) = listen {
            self.transport.listen_addr = listen_addr;
        }
        if connect.is_some() {
            self.transport.connect_addr = connect;
        }
        if mount {
            self.fuse.enabled = true;
        }

        self
    }
}
