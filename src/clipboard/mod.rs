//! Clipboard Redirection Module
//!
//! Synchronizes a local clipboard with a remote peer over the clipboard
//! virtual channel, including file lists that are streamed on demand.
//!
//! # Architecture
//!
//! - [`ClipboardBridge`] - Protocol state, outstanding requests, lifecycle
//! - [`FormatMap`] - Remote to local format id table
//! - [`VirtualFileSet`] - Files offered by this side
//! - [`VirtualFileCollection`] / [`VirtualFileObject`] - Files offered by the peer
//! - [`MessageLoop`] - Thread owning the OS clipboard relationship
//! - [`OsClipboard`] - Seam to the platform clipboard ([`MemoryClipboard`] in-process)
//!
//! # Data Flow
//!
//! ```text
//! Peer                          Bridge                          OS clipboard
//! ━━━━                          ━━━━━━                          ━━━━━━━━━━━━
//!
//! FORMAT_LIST ─────────────> rebuild FormatMap
//!   <── FORMAT_LIST_RESPONSE    ├─ files:  SetFiles ──> fetch descriptors ──> take ownership
//!                               └─ others: SetDelayed ─────────────────────> take ownership
//!
//!   <── FORMAT_DATA_REQUEST <── render on paste <──────────────────────────── app paste
//! FORMAT_DATA_RESPONSE ─────> WaitableSignal ──> bytes ──────────────────────> app
//!
//!   <── FILECONTENTS_REQUEST <── VirtualFileObject::read <─────────────────── app read
//! FILECONTENTS_RESPONSE ────> WaitableSignal ──> bytes ──────────────────────> app
//! ```

pub mod bridge;
pub mod error;
pub mod file_set;
pub mod formats;
pub mod fuse;
mod handler;
pub mod memory;
pub mod message_loop;
pub mod os;
pub mod signal;
pub mod stream;

pub use bridge::{
    BridgeOptions, BridgeState, ChannelSink, ClipboardBridge, Notification, NotificationKind,
    TIMEOUT_NOTIFICATION_TEXT,
};
pub use error::{ClipboardError, ErrorType, RecoveryAction, Result};
pub use file_set::{LocalFile, VirtualFileSet};
pub use formats::{
    format_id, format_name, FileAttribute, FileDescriptor, FormatEntry, FormatMap,
    FormatRegistry,
};
pub use fuse::{get_mount_point, FuseManager};
pub use memory::MemoryClipboard;
pub use message_loop::{LoopCommand, LoopHandle, MessageLoop};
pub use os::{ClipboardOffer, ClipboardOwner, OsClipboard};
pub use signal::{PendingRequest, StopToken, WaitOutcome, WaitableSignal};
pub use stream::{
    DataMedium, DataObject, FileStat, FileStream, VirtualFileCollection, VirtualFileObject,
    VirtualFileReader,
};
