//! In-memory OS clipboard
//!
//! Stands in for a desktop clipboard in the headless binary and in tests.
//! Applications use the `set_*`/`get*` methods; bridges use the
//! [`OsClipboard`] trait. Several bridges may attach to one clipboard, in
//! which case an offer taken by one bridge is announced by the others.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::clipboard::error::{ClipboardError, Result};
use crate::clipboard::formats::{format_id, FormatRegistry};
use crate::clipboard::message_loop::LoopHandle;
use crate::clipboard::os::{ClipboardOffer, ClipboardOwner, OsClipboard};
use crate::clipboard::stream::{DataObject, VirtualFileCollection};

/// How long an application paste waits for a delayed render
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(35);

#[derive(Debug)]
struct Contents {
    owner: ClipboardOwner,
    sequence: u64,
    data: HashMap<u32, Bytes>,
    delayed: Vec<u32>,
    files: Vec<PathBuf>,
    collection: Option<Arc<VirtualFileCollection>>,
}

impl Default for Contents {
    fn default() -> Self {
        Self {
            owner: ClipboardOwner::Empty,
            sequence: 0,
            data: HashMap::new(),
            delayed: Vec::new(),
            files: Vec::new(),
            collection: None,
        }
    }
}

impl Contents {
    fn reset(&mut self, owner: ClipboardOwner) {
        self.owner = owner;
        self.sequence += 1;
        self.data.clear();
        self.delayed.clear();
        self.files.clear();
        self.collection = None;
    }
}

#[derive(Debug, Default)]
struct Registry {
    by_name: HashMap<String, u32>,
    by_id: HashMap<u32, String>,
}

/// Process-local clipboard
pub struct MemoryClipboard {
    contents: Mutex<Contents>,
    registry: Mutex<Registry>,
    listeners: Mutex<Vec<LoopHandle>>,
    busy: AtomicBool,
    render_timeout: Duration,
}

impl Default for MemoryClipboard {
    fn default() -> Self {
        Self::new(DEFAULT_RENDER_TIMEOUT)
    }
}

impl MemoryClipboard {
    pub fn new(render_timeout: Duration) -> Self {
        Self {
            contents: Mutex::new(Contents::default()),
            registry: Mutex::new(Registry::default()),
            listeners: Mutex::new(Vec::new()),
            busy: AtomicBool::new(false),
            render_timeout,
        }
    }

    /// Simulate another process holding the clipboard open
    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    /// Monotonic counter bumped on every content change
    pub fn sequence(&self) -> u64 {
        self.contents.lock().sequence
    }

    /// Copy Unicode text as a local application would
    pub fn set_text(&self, text: &str) -> Result<()> {
        self.set_data(format_id::CF_UNICODETEXT, encode_unicode_text(text))
    }

    /// Copy raw bytes under one format
    pub fn set_data(&self, format_id: u32, data: Bytes) -> Result<()> {
        self.check_busy()?;
        {
            let mut contents = self.contents.lock();
            contents.reset(ClipboardOwner::Local);
            contents.data.insert(format_id, data);
        }
        self.notify_changed(None);
        Ok(())
    }

    /// Copy a file drop list
    pub fn set_files(&self, paths: Vec<PathBuf>) -> Result<()> {
        self.check_busy()?;
        {
            let mut contents = self.contents.lock();
            contents.reset(ClipboardOwner::Local);
            contents.files = paths;
        }
        self.notify_changed(None);
        Ok(())
    }

    /// Paste one format, rendering it through the owning bridge if needed
    pub fn get(&self, format_id: u32) -> Result<Bytes> {
        self.check_busy()?;
        let render_via = {
            let contents = self.contents.lock();
            if let Some(data) = contents.data.get(&format_id) {
                return Ok(data.clone());
            }
            if !contents.delayed.contains(&format_id) {
                return Err(ClipboardError::UnknownFormat(format_id));
            }
            match contents.owner {
                ClipboardOwner::Bridge(id) => id,
                _ => return Err(ClipboardError::UnknownFormat(format_id)),
            }
        };

        let handle = self
            .listeners
            .lock()
            .iter()
            .find(|h| h.bridge_id() == render_via)
            .cloned()
            .ok_or_else(|| {
                ClipboardError::StateInconsistent(format!("owning bridge {render_via} detached"))
            })?;

        // Blocks until the owning bridge has fetched the bytes from its peer
        debug!("Delayed render of format {} via bridge {}", format_id, render_via);
        handle.render(format_id, self.render_timeout)
    }

    /// Paste Unicode text
    pub fn get_text(&self) -> Result<String> {
        let data = self.get(format_id::CF_UNICODETEXT)?;
        decode_unicode_text(&data)
    }

    fn check_busy(&self) -> Result<()> {
        if self.busy.load(Ordering::SeqCst) {
            return Err(ClipboardError::OsClipboardBusy);
        }
        Ok(())
    }

    /// Tell every attached bridge except `except` that the contents changed
    fn notify_changed(&self, except: Option<u64>) {
        let listeners = self.listeners.lock().clone();
        for handle in listeners {
            if Some(handle.bridge_id()) == except {
                continue;
            }
            if let Err(e) = handle.clipboard_changed() {
                warn!("Bridge {} missed a clipboard change: {}", handle.bridge_id(), e);
            }
        }
    }
}

impl FormatRegistry for MemoryClipboard {
    fn register_format(&self, name: &str) -> u32 {
        let mut registry = self.registry.lock();
        if let Some(id) = registry.by_name.get(name) {
            return *id;
        }
        let id = format_id::CF_CUSTOM_START + registry.by_name.len() as u32;
        registry.by_name.insert(name.to_string(), id);
        registry.by_id.insert(id, name.to_string());
        trace!("Registered clipboard format '{}' as {}", name, id);
        id
    }

    fn format_name(&self, id: u32) -> Option<String> {
        self.registry.lock().by_id.get(&id).cloned()
    }
}

impl OsClipboard for MemoryClipboard {
    fn attach(&self, bridge_id: u64, handle: LoopHandle) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|h| h.bridge_id() != bridge_id);
        listeners.push(handle);
    }

    fn detach(&self, bridge_id: u64) {
        self.listeners.lock().retain(|h| h.bridge_id() != bridge_id);
    }

    fn owner(&self) -> ClipboardOwner {
        self.contents.lock().owner
    }

    fn available_formats(&self) -> Result<Vec<u32>> {
        self.check_busy()?;
        let contents = self.contents.lock();
        let mut formats: Vec<u32> = contents
            .data
            .keys()
            .copied()
            .chain(contents.delayed.iter().copied())
            .collect();
        if let Some(collection) = &contents.collection {
            formats.extend(collection.enum_formats());
        }
        if !contents.files.is_empty() {
            formats.push(format_id::CF_HDROP);
        }
        formats.sort_unstable();
        formats.dedup();
        Ok(formats)
    }

    fn read(&self, format_id: u32) -> Result<Bytes> {
        self.get(format_id)
    }

    fn file_list(&self) -> Result<Vec<PathBuf>> {
        self.check_busy()?;
        Ok(self.contents.lock().files.clone())
    }

    fn take_ownership(&self, bridge_id: u64, offer: ClipboardOffer) -> Result<()> {
        self.check_busy()?;
        debug!("Bridge {} takes clipboard ownership: {:?}", bridge_id, offer);
        {
            let mut contents = self.contents.lock();
            contents.reset(ClipboardOwner::Bridge(bridge_id));
            if offer.files.is_some() {
                contents.collection = offer.files;
            } else {
                contents.data.extend(offer.render_now);
                contents.delayed = offer.render_later;
            }
        }
        self.notify_changed(Some(bridge_id));
        Ok(())
    }

    fn push_rendered_data(&self, format_id: u32, data: Bytes) -> Result<()> {
        let mut contents = self.contents.lock();
        if !contents.delayed.contains(&format_id) {
            return Err(ClipboardError::UnknownFormat(format_id));
        }
        contents.data.insert(format_id, data);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.check_busy()?;
        // Only bridges clear through the trait; they do not announce emptiness
        self.contents.lock().reset(ClipboardOwner::Empty);
        Ok(())
    }

    fn file_collection(&self) -> Option<Arc<VirtualFileCollection>> {
        self.contents.lock().collection.clone()
    }
}

/// CF_UNICODETEXT bytes: UTF-16LE with a terminating NUL
pub fn encode_unicode_text(text: &str) -> Bytes {
    let mut out = Vec::with_capacity((text.len() + 1) * 2);
    for unit in text.encode_utf16().chain(std::iter::once(0)) {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    Bytes::from(out)
}

/// Decode CF_UNICODETEXT, stopping at the first NUL
pub fn decode_unicode_text(data: &[u8]) -> Result<String> {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|u| *u != 0)
        .collect();
    String::from_utf16(&units)
        .map_err(|_| ClipboardError::InvalidData("CF_UNICODETEXT is not valid UTF-16".to_string()))
}
