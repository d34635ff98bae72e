//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::protocol::codec::DEFAULT_MAX_PAYLOAD;
use crate::protocol::FileContentsResponse;

/// Clipboard redirection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipboardConfig {
    /// Announce and accept file lists
    #[serde(default = "default_true")]
    pub enable_files: bool,

    /// Announce and accept non-file formats (text, images, ...)
    #[serde(default = "default_true")]
    pub enable_others: bool,

    /// Seconds to wait for a peer response before giving up
    #[serde(default = "default_response_wait_timeout_secs")]
    pub response_wait_timeout_secs: u64,

    /// Milliseconds between checks of the abort flag while waiting
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Largest format data payload sent or accepted, in bytes
    #[serde(default = "default_max_data_size")]
    pub max_data_size: usize,

    /// Largest single FILECONTENTS range read through the FUSE mount
    #[serde(default = "default_file_chunk_size")]
    pub file_chunk_size: u32,
}

fn default_true() -> bool {
    true
}

fn default_response_wait_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_max_data_size() -> usize {
    FileContentsResponse::max_data_len(DEFAULT_MAX_PAYLOAD)
}

fn default_file_chunk_size() -> u32 {
    1024 * 1024
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            enable_files: true,
            enable_others: true,
            response_wait_timeout_secs: default_response_wait_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            max_data_size: default_max_data_size(),
            file_chunk_size: default_file_chunk_size(),
        }
    }
}

/// Channel transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Address to accept a peer on (e.g., "127.0.0.1:19595")
    pub listen_addr: String,

    /// Peer to dial instead of listening
    #[serde(default)]
    pub connect_addr: Option<String>,

    /// Channel connection id stamped on outbound frames
    #[serde(default = "default_conn_id")]
    pub conn_id: u32,

    /// Largest frame payload the codec accepts
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

fn default_conn_id() -> u32 {
    1
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_PAYLOAD
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:19595".to_string(),
            connect_addr: None,
            conn_id: default_conn_id(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

/// FUSE exposure of received files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FuseConfig {
    /// Mount the read-only view of remote files
    pub enabled: bool,

    /// Mount point (None = `$XDG_RUNTIME_DIR/cliprdr-bridge`)
    #[serde(default)]
    pub mount_point: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    pub level: String,

    /// Directory for daily-rotated log files (None = console only)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}
