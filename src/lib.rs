//! # cliprdr-bridge
//!
//! Clipboard redirection over the RDP clipboard virtual channel.
//!
//! Text, images and any other registered format are announced eagerly and
//! transferred on paste. File lists are announced as descriptors and their
//! contents are streamed range by range only when a local reader asks.
//!
//! # Architecture
//!
//! ```text
//! cliprdr-bridge
//!   ├─> Session runner (TCP stream ↔ framed channel)
//!   ├─> ClipboardBridge (protocol state, outstanding requests)
//!   │     ├─> Message loop thread (OS clipboard ownership, delayed render)
//!   │     └─> VirtualFileCollection (lazy remote files)
//!   ├─> OsClipboard (in-memory clipboard for headless use)
//!   └─> FUSE view (received files as a read-only tree)
//! ```
//!
//! # Data Flow
//!
//! **Copy:** OS clipboard → FORMAT_LIST → peer
//!
//! **Paste:** OS render request → FORMAT_DATA_REQUEST → peer → FORMAT_DATA_RESPONSE → OS clipboard
//!
//! **File read:** reader → FILECONTENTS_REQUEST → peer → FILECONTENTS_RESPONSE → reader

#![warn(clippy::all)]

/// Clipboard redirection core
pub mod clipboard;

/// Bridge configuration
pub mod config;

/// Wire format of the clipboard channel
pub mod protocol;

/// Channel session runner
pub mod session;

/// Utility functions
pub mod utils;
