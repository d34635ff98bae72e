//! Local OS clipboard seam
//!
//! The bridge never talks to a windowing system directly. It talks to an
//! [`OsClipboard`], which owns the platform clipboard and reports changes and
//! render requests back through the [`LoopHandle`] it was attached to.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;

use crate::clipboard::error::Result;
use crate::clipboard::formats::FormatRegistry;
use crate::clipboard::message_loop::LoopHandle;
use crate::clipboard::stream::VirtualFileCollection;

/// Who currently owns the OS clipboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardOwner {
    Empty,
    /// A local application
    Local,
    /// The bridge with this id
    Bridge(u64),
}

/// What a bridge puts on the clipboard when it takes ownership
#[derive(Default)]
pub struct ClipboardOffer {
    /// Formats whose bytes are already known
    pub render_now: Vec<(u32, Bytes)>,
    /// Formats rendered on first paste
    pub render_later: Vec<u32>,
    /// Remote files, superseding every other format
    pub files: Option<Arc<VirtualFileCollection>>,
}

impl ClipboardOffer {
    pub fn delayed(formats: Vec<u32>) -> Self {
        Self {
            render_later: formats,
            ..Default::default()
        }
    }

    pub fn files(collection: Arc<VirtualFileCollection>) -> Self {
        Self {
            files: Some(collection),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for ClipboardOffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipboardOffer")
            .field("render_now", &self.render_now.iter().map(|(id, _)| *id).collect::<Vec<_>>())
            .field("render_later", &self.render_later)
            .field("files", &self.files.as_ref().map(|c| c.len()))
            .finish()
    }
}

/// Platform clipboard as seen by a bridge
///
/// Implementations must only report changes and render requests through the
/// attached [`LoopHandle`]s; ownership changes are made from the bridge's
/// message loop thread.
pub trait OsClipboard: FormatRegistry + Send + Sync {
    /// Register a bridge's loop for change notifications and render requests
    fn attach(&self, bridge_id: u64, handle: LoopHandle);

    fn detach(&self, bridge_id: u64);

    fn owner(&self) -> ClipboardOwner;

    fn is_owned_by(&self, bridge_id: u64) -> bool {
        self.owner() == ClipboardOwner::Bridge(bridge_id)
    }

    /// Local format ids currently on the clipboard
    fn available_formats(&self) -> Result<Vec<u32>>;

    /// Raw bytes of one format
    ///
    /// Fails with `OsClipboardBusy` while another process holds the clipboard
    /// open and with `UnknownFormat` when the format is absent.
    fn read(&self, format_id: u32) -> Result<Bytes>;

    /// Paths of a local file drop, empty when there is none
    fn file_list(&self) -> Result<Vec<PathBuf>>;

    /// Replace the clipboard contents on behalf of `bridge_id`
    fn take_ownership(&self, bridge_id: u64, offer: ClipboardOffer) -> Result<()>;

    /// Advertise formats for delayed rendering
    fn announce(&self, bridge_id: u64, formats: &[u32]) -> Result<()> {
        self.take_ownership(bridge_id, ClipboardOffer::delayed(formats.to_vec()))
    }

    /// Store bytes produced for a delayed-render request
    fn push_rendered_data(&self, format_id: u32, data: Bytes) -> Result<()>;

    fn clear(&self) -> Result<()>;

    /// Virtual files currently on the clipboard, if any
    fn file_collection(&self) -> Option<Arc<VirtualFileCollection>>;
}
