//! Clipboard Bridge
//!
//! Single point of truth for one clipboard channel: the format map, the
//! current virtual file collection, the outstanding requests, and the message
//! loop that owns the OS clipboard.
//!
//! # Lifecycle
//!
//! [`ClipboardBridge::init`] allocates the state, spawns the loop thread and
//! attaches it to the OS clipboard. Inbound frames are fed through
//! [`ClipboardBridge::handle_frame`] from the transport's receive thread.
//! [`ClipboardBridge::uninit`] (also run on drop) aborts in-flight waits,
//! empties the OS clipboard if the bridge owns it and joins the loop.
//!
//! # Threads
//!
//! ```text
//! receive thread ──handle_frame──> Shared (handlers)
//!                                    │  completes PendingRequest
//!                                    └─ posts LoopCommand
//! cliprdr-main   ──LoopDelegate──> Shared (ownership, requests, render)
//! app threads    ──VirtualFileObject::read──> Shared (file contents requests)
//! ```
//!
//! Only two operations block: the format data and file contents round
//! trips. Both are bounded by the response timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::clipboard::error::{recovery_action, ClipboardError, RecoveryAction, Result};
use crate::clipboard::file_set::VirtualFileSet;
use crate::clipboard::formats::{
    format_id, format_name, parse_file_group, FormatEntry, FormatMap,
};
use crate::clipboard::message_loop::{LoopCommand, LoopDelegate, LoopHandle, MessageLoop};
use crate::clipboard::os::{ClipboardOffer, ClipboardOwner, OsClipboard};
use crate::clipboard::signal::{PendingRequest, StopToken, WaitOutcome};
use crate::clipboard::stream::{
    CollectionFormats, FileContentsSource, VirtualFileCollection,
};
use crate::config::ClipboardConfig;
use crate::protocol::codec::DEFAULT_MAX_PAYLOAD;
use crate::protocol::{
    ClipboardCapabilities, ClipboardPdu, FileContentsRequest, FileContentsResponse,
    FormatDataResponse, FormatListEntry, Frame, NameEncoding,
};

/// Text of the notification raised when the peer does not answer in time
pub const TIMEOUT_NOTIFICATION_TEXT: &str = "clipboard_wait_response_timeout_tip";

static NEXT_BRIDGE_ID: AtomicU64 = AtomicU64::new(1);

/// Runtime knobs of one bridge
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Accept and offer files
    pub enable_files: bool,
    /// Accept and offer every other format
    pub enable_others: bool,
    /// Bound of every request/response round trip
    pub response_timeout: Duration,
    /// Polling step of bounded waits
    pub poll_interval: Duration,
    /// Largest payload accepted or served
    pub max_data_size: usize,
    /// Frame payload limit of the transport codec
    pub max_frame_size: usize,
}

impl BridgeOptions {
    /// Largest format data payload that fits one frame
    pub fn format_data_limit(&self) -> usize {
        self.max_data_size.min(self.max_frame_size)
    }

    /// Largest FILECONTENTS range whose response fits one frame
    pub fn file_contents_limit(&self) -> usize {
        self.max_data_size
            .min(FileContentsResponse::max_data_len(self.max_frame_size))
    }
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self::from(&ClipboardConfig::default())
    }
}

impl From<&ClipboardConfig> for BridgeOptions {
    fn from(config: &ClipboardConfig) -> Self {
        Self {
            enable_files: config.enable_files,
            enable_others: config.enable_others,
            response_timeout: Duration::from_secs(config.response_wait_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_data_size: config.max_data_size,
            max_frame_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Protocol state of the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Disconnected,
    CapabilitiesExchanged,
    Synced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Timeout,
}

/// Message for the user/UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub conn_id: u32,
    pub kind: NotificationKind,
    pub title: String,
    pub text: String,
}

/// Outbound half of the clipboard channel
#[cfg_attr(test, mockall::automock)]
pub trait ChannelSink: Send + Sync {
    fn send(&self, frame: Frame) -> Result<()>;
}

impl ChannelSink for tokio::sync::mpsc::UnboundedSender<Frame> {
    fn send(&self, frame: Frame) -> Result<()> {
        tokio::sync::mpsc::UnboundedSender::send(self, frame)
            .map_err(|_| ClipboardError::Channel("transport writer closed".to_string()))
    }
}

impl ChannelSink for Sender<Frame> {
    fn send(&self, frame: Frame) -> Result<()> {
        Sender::send(self, frame)
            .map_err(|_| ClipboardError::Channel("transport writer closed".to_string()))
    }
}

#[derive(Debug)]
pub(super) struct Session {
    pub(super) state: BridgeState,
    pub(super) conn_id: u32,
    pub(super) capabilities: Option<ClipboardCapabilities>,
    pub(super) names: NameEncoding,
    pub(super) temp_directory: Option<String>,
    /// This side sent MONITOR_READY
    pub(super) monitor: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: BridgeState::Disconnected,
            conn_id: 0,
            capabilities: None,
            names: NameEncoding::default(),
            temp_directory: None,
            monitor: false,
        }
    }
}

/// Files answering the peer's FILECONTENTS requests
#[derive(Clone, Default)]
pub(super) enum OfferedFiles {
    #[default]
    None,
    /// Local files from the last descriptor serialization
    Disk(VirtualFileSet),
    /// Virtual files received by another bridge
    Relay(Arc<VirtualFileCollection>),
}

/// State shared by the handlers, the loop thread and virtual file readers
pub(crate) struct Shared {
    pub(super) id: u64,
    pub(super) options: BridgeOptions,
    pub(super) os: Arc<dyn OsClipboard>,
    sink: Box<dyn ChannelSink>,
    notifications: Option<Sender<Notification>>,
    pub(super) format_map: RwLock<FormatMap>,
    pub(super) session: Mutex<Session>,
    pub(super) collection: Mutex<Option<Arc<VirtualFileCollection>>>,
    collection_generation: AtomicU64,
    pub(super) offered: Mutex<OfferedFiles>,
    /// Offered files pinned by the peer's LOCK_CLIPDATA, by clipDataId
    pub(super) locked: Mutex<HashMap<u32, OfferedFiles>>,
    pub(super) format_data: PendingRequest<FormatDataResponse>,
    pub(super) file_contents: PendingRequest<FileContentsResponse>,
    next_stream_id: AtomicU32,
    pub(super) expected_stream_id: AtomicU32,
    pub(super) stop: StopToken,
    loop_handle: OnceLock<LoopHandle>,
    self_ref: Weak<Shared>,
}

/// Clipboard redirection bridge for one channel
pub struct ClipboardBridge {
    shared: Arc<Shared>,
    message_loop: Option<MessageLoop>,
}

impl ClipboardBridge {
    /// Allocate state, spawn the message loop and attach to the OS clipboard
    pub fn init(
        os: Arc<dyn OsClipboard>,
        sink: Box<dyn ChannelSink>,
        options: BridgeOptions,
        notifications: Option<Sender<Notification>>,
    ) -> Result<Self> {
        let id = NEXT_BRIDGE_ID.fetch_add(1, Ordering::SeqCst);
        let poll = options.poll_interval;

        let shared = Arc::new_cyclic(|self_ref| Shared {
            id,
            options,
            os,
            sink,
            notifications,
            format_map: RwLock::new(FormatMap::new()),
            session: Mutex::new(Session::default()),
            collection: Mutex::new(None),
            collection_generation: AtomicU64::new(0),
            offered: Mutex::new(OfferedFiles::None),
            locked: Mutex::new(HashMap::new()),
            format_data: PendingRequest::new("format data", poll),
            file_contents: PendingRequest::new("file contents", poll),
            next_stream_id: AtomicU32::new(1),
            expected_stream_id: AtomicU32::new(0),
            stop: StopToken::new(),
            loop_handle: OnceLock::new(),
            self_ref: self_ref.clone(),
        });

        let message_loop = MessageLoop::spawn(id, Arc::clone(&shared))?;
        let handle = message_loop.handle();
        // Set exactly once, right here
        let _ = shared.loop_handle.set(handle.clone());
        shared.os.attach(id, handle);

        info!(
            "Clipboard bridge {} initialized (files: {}, others: {}, timeout: {:?})",
            id, shared.options.enable_files, shared.options.enable_others, shared.options.response_timeout
        );

        Ok(Self {
            shared,
            message_loop: Some(message_loop),
        })
    }

    /// Tear down: abort waits, release the clipboard, join the loop
    pub fn uninit(&mut self) -> Result<()> {
        let Some(mut message_loop) = self.message_loop.take() else {
            return Ok(());
        };
        let shared = &self.shared;
        info!("Shutting down clipboard bridge {}", shared.id);

        shared.stop.stop();
        shared.os.detach(shared.id);
        shared.release_collection(None);
        if shared.os.is_owned_by(shared.id) {
            if let Err(e) = shared.os.clear() {
                warn!("Failed to empty clipboard on shutdown: {}", e);
            }
        }
        shared.format_map.write().clear();
        *shared.offered.lock() = OfferedFiles::None;
        shared.locked.lock().clear();
        shared.session.lock().state = BridgeState::Disconnected;

        message_loop.shutdown()
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn is_running(&self) -> bool {
        self.message_loop.as_ref().is_some_and(MessageLoop::is_running)
    }

    /// Decode and dispatch one inbound frame
    ///
    /// Only transport failures are returned; everything else is answered or
    /// logged according to the recovery policy.
    pub fn handle_frame(&self, frame: &Frame) -> Result<()> {
        self.shared.handle_frame(frame)
    }

    /// Open the channel from this side: capabilities, then MONITOR_READY
    pub fn start_as_monitor(&self, conn_id: u32) -> Result<()> {
        {
            let mut session = self.shared.session.lock();
            session.conn_id = conn_id;
            session.monitor = true;
        }
        self.shared
            .send_to(conn_id, ClipboardPdu::Capabilities(ClipboardCapabilities::local()))?;
        self.shared.send_to(conn_id, ClipboardPdu::MonitorReady)
    }

    /// Announce the current local clipboard to the peer
    pub fn send_format_list(&self) -> Result<()> {
        let conn_id = self.shared.conn_id();
        self.shared.stop.reset();
        self.shared.send_format_list(conn_id)
    }

    /// Fetch one of the peer's formats by local id
    pub fn request_format_data(&self, local_format_id: u32) -> Result<Bytes> {
        let conn_id = self.shared.conn_id();
        let remote = self.shared.format_map.read().local_to_remote(local_format_id);
        self.shared.request_format_data(conn_id, remote)
    }

    /// Abort every in-flight wait
    pub fn stop(&self) {
        self.shared.stop.stop();
    }

    pub fn stop_token(&self) -> StopToken {
        self.shared.stop.clone()
    }

    pub fn state(&self) -> BridgeState {
        self.shared.session.lock().state
    }

    pub fn conn_id(&self) -> u32 {
        self.shared.conn_id()
    }

    /// Capabilities both sides agreed on
    pub fn capabilities(&self) -> Option<ClipboardCapabilities> {
        self.shared.session.lock().capabilities
    }

    pub fn name_encoding(&self) -> NameEncoding {
        self.shared.session.lock().names
    }

    pub fn temp_directory(&self) -> Option<String> {
        self.shared.session.lock().temp_directory.clone()
    }

    pub fn format_entries(&self) -> Vec<FormatEntry> {
        self.shared.format_map.read().entries().to_vec()
    }

    pub fn current_collection(&self) -> Option<Arc<VirtualFileCollection>> {
        self.shared.collection.lock().clone()
    }
}

impl Drop for ClipboardBridge {
    fn drop(&mut self) {
        if let Err(e) = self.uninit() {
            warn!("Clipboard bridge shutdown failed: {}", e);
        }
    }
}

impl Shared {
    pub(super) fn conn_id(&self) -> u32 {
        self.session.lock().conn_id
    }

    pub(super) fn post(&self, command: LoopCommand) -> Result<()> {
        self.loop_handle
            .get()
            .ok_or_else(|| ClipboardError::Channel("message loop not started".to_string()))?
            .post(command)
    }

    pub(super) fn send_to(&self, conn_id: u32, pdu: ClipboardPdu) -> Result<()> {
        let names = self.session.lock().names;
        debug!("-> conn {} {:?}", conn_id, pdu.msg_type());
        self.sink.send(pdu.to_frame(conn_id, names))
    }

    /// FORMAT_LIST entries describing the local clipboard
    pub(super) fn local_format_list(&self) -> Vec<FormatListEntry> {
        if self.os.is_owned_by(self.id) {
            return Vec::new();
        }
        let formats = match self.os.available_formats() {
            Ok(formats) => formats,
            Err(e) => {
                warn!("Cannot enumerate local clipboard: {}", e);
                return Vec::new();
            }
        };

        let descriptor_id = self.os.register_format(format_name::FILE_DESCRIPTOR_W);
        let contents_id = self.os.register_format(format_name::FILE_CONTENTS);
        let has_files = formats.contains(&format_id::CF_HDROP) || formats.contains(&descriptor_id);

        let mut entries = Vec::new();
        if self.options.enable_others {
            for id in formats {
                if id == format_id::CF_HDROP || id == descriptor_id || id == contents_id {
                    continue;
                }
                let name = if id >= format_id::CF_CUSTOM_START {
                    self.os.format_name(id)
                } else {
                    None
                };
                entries.push(FormatListEntry::new(id, name.as_deref()));
            }
        }
        if self.options.enable_files && has_files {
            entries.push(FormatListEntry::new(descriptor_id, Some(format_name::FILE_DESCRIPTOR_W)));
            entries.push(FormatListEntry::new(contents_id, Some(format_name::FILE_CONTENTS)));
        }
        entries
    }

    pub(super) fn send_format_list(&self, conn_id: u32) -> Result<()> {
        let entries = self.local_format_list();
        info!("Announcing {} local format(s) to conn {}", entries.len(), conn_id);
        self.send_to(conn_id, ClipboardPdu::FormatList(entries))
    }

    /// FORMAT_DATA_REQUEST round trip
    pub(super) fn request_format_data(&self, conn_id: u32, remote_format_id: u32) -> Result<Bytes> {
        let timeout = self.options.response_timeout;
        let in_flight = self.format_data.begin(timeout)?;
        self.send_to(
            conn_id,
            ClipboardPdu::FormatDataRequest {
                requested_format_id: remote_format_id,
            },
        )?;
        let outcome = in_flight.wait(timeout, &self.stop);
        drop(in_flight);

        let response = self.finish_wait(conn_id, outcome)?;
        if !response.status.is_ok() {
            return Err(ClipboardError::ProtocolFail(format!(
                "format {} refused",
                remote_format_id
            )));
        }
        if response.data.is_empty() {
            return Err(ClipboardError::ProtocolFail(format!(
                "format {} answered with no data",
                remote_format_id
            )));
        }
        if response.data.len() > self.options.format_data_limit() {
            return Err(ClipboardError::DataSizeExceeded(
                response.data.len(),
                self.options.format_data_limit(),
            ));
        }
        trace!("Format {} delivered {} bytes", remote_format_id, response.data.len());
        Ok(response.data)
    }

    /// FILECONTENTS_REQUEST round trip; the stream id is assigned here
    fn request_file_contents(
        &self,
        conn_id: u32,
        mut request: FileContentsRequest,
    ) -> Result<FileContentsResponse> {
        let timeout = self.options.response_timeout;
        let in_flight = self.file_contents.begin(timeout)?;
        request.stream_id = self.next_stream_id.fetch_add(1, Ordering::SeqCst);
        self.expected_stream_id.store(request.stream_id, Ordering::SeqCst);

        self.send_to(conn_id, ClipboardPdu::FileContentsRequest(request.clone()))?;
        let outcome = in_flight.wait(timeout, &self.stop);
        drop(in_flight);

        let response = self.finish_wait(conn_id, outcome)?;
        if !response.status.is_ok() {
            return Err(ClipboardError::ProtocolFail(format!(
                "file contents of index {} refused",
                request.list_index
            )));
        }
        Ok(response)
    }

    /// Apply the recovery policy to a finished wait
    fn finish_wait<T>(&self, conn_id: u32, outcome: WaitOutcome<T>) -> Result<T> {
        let result = outcome.into_result(self.options.response_timeout);
        if let Err(e) = &result {
            match recovery_action(e) {
                RecoveryAction::NotifyUser => {
                    warn!("Clipboard request on conn {} failed: {}", conn_id, e);
                    self.notify_timeout(conn_id);
                }
                RecoveryAction::EmptyClipboard => {
                    info!("Clipboard request on conn {} aborted", conn_id);
                    self.abort_exchange(conn_id);
                }
                _ => {}
            }
        }
        result
    }

    fn notify_timeout(&self, conn_id: u32) {
        let Some(notifications) = &self.notifications else {
            return;
        };
        let notification = Notification {
            conn_id,
            kind: NotificationKind::Timeout,
            title: "Clipboard".to_string(),
            text: TIMEOUT_NOTIFICATION_TEXT.to_string(),
        };
        if notifications.send(notification).is_err() {
            debug!("Notification receiver is gone");
        }
    }

    /// Drop the collection and empty the clipboard after an abort
    fn abort_exchange(&self, conn_id: u32) {
        self.release_collection(Some(conn_id));
        if let Err(e) = self.post(LoopCommand::Empty {
            conn_id: Some(conn_id),
        }) {
            debug!("Could not post empty after abort: {}", e);
        }
    }

    fn install_collection(&self, collection: Arc<VirtualFileCollection>) {
        let previous = self.collection.lock().replace(collection);
        if let Some(previous) = previous {
            previous.invalidate();
        }
    }

    /// Invalidate the current collection if it belongs to `conn_id`
    ///
    /// Returns `false` when a collection of another connection was kept.
    pub(super) fn release_collection(&self, conn_id: Option<u32>) -> bool {
        let mut current = self.collection.lock();
        if let (Some(collection), Some(conn_id)) = (current.as_ref(), conn_id) {
            if collection.conn_id() != conn_id {
                debug!(
                    "Keeping collection of conn {} while emptying conn {}",
                    collection.conn_id(),
                    conn_id
                );
                return false;
            }
        }
        if let Some(collection) = current.take() {
            collection.invalidate();
        }
        true
    }
}

impl FileContentsSource for Shared {
    fn request_size(&self, conn_id: u32, list_index: u32) -> Result<u64> {
        let request = FileContentsRequest::size(0, list_index);
        let response = self.request_file_contents(conn_id, request)?;
        if response.data.len() < 8 {
            return Err(ClipboardError::InvalidData(format!(
                "size response of {} bytes",
                response.data.len()
            )));
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&response.data[..8]);
        Ok(u64::from_le_bytes(raw))
    }

    fn request_range(&self, conn_id: u32, list_index: u32, position: u64, len: u32) -> Result<Bytes> {
        let len = (len as usize).min(self.options.file_contents_limit()) as u32;
        let request = FileContentsRequest::range(0, list_index, position, len);
        Ok(self.request_file_contents(conn_id, request)?.data)
    }
}

impl LoopDelegate for Shared {
    fn set_files(&self, conn_id: u32) {
        let (entry, generation) = {
            let map = self.format_map.read();
            (map.file_descriptor_entry().cloned(), map.generation())
        };
        let Some(entry) = entry else {
            debug!("File formats vanished before descriptors were fetched");
            return;
        };

        let blob = match self.request_format_data(conn_id, entry.remote_id) {
            Ok(blob) => blob,
            Err(e) => {
                warn!("Failed to fetch file descriptors from conn {}: {}", conn_id, e);
                return;
            }
        };
        let descriptors = match parse_file_group(&blob) {
            Ok(descriptors) => descriptors,
            Err(e) => {
                warn!("Discarding malformed file descriptors: {}", e);
                return;
            }
        };
        if self.format_map.read().generation() != generation {
            debug!("File list superseded while fetching descriptors");
            return;
        }

        let formats = CollectionFormats {
            file_descriptor: entry.local_id,
            file_contents: self.os.register_format(format_name::FILE_CONTENTS),
        };
        let source: Weak<dyn FileContentsSource> = self.self_ref.clone();
        let collection = VirtualFileCollection::new(
            conn_id,
            self.collection_generation.fetch_add(1, Ordering::SeqCst) + 1,
            formats,
            blob,
            descriptors,
            source,
        );
        let count = collection.len();

        self.install_collection(Arc::clone(&collection));
        match self.os.take_ownership(self.id, ClipboardOffer::files(collection)) {
            Ok(()) => info!("Offering {} remote file(s) from conn {}", count, conn_id),
            Err(e) => {
                warn!("Could not offer remote files: {}", e);
                self.release_collection(Some(conn_id));
            }
        }
    }

    fn set_delayed(&self, conn_id: u32, formats: Vec<u32>) {
        let count = formats.len();
        match self.os.take_ownership(self.id, ClipboardOffer::delayed(formats)) {
            Ok(()) => debug!("Delayed rendering armed for {} format(s) of conn {}", count, conn_id),
            Err(e) => warn!("Could not take clipboard ownership: {}", e),
        }
    }

    fn empty(&self, conn_id: Option<u32>) {
        if !self.release_collection(conn_id) {
            return;
        }
        if self.os.is_owned_by(self.id) {
            match self.os.clear() {
                Ok(()) => debug!("Emptied clipboard for conn {:?}", conn_id),
                Err(e) => warn!("Failed to empty clipboard: {}", e),
            }
        }
    }

    fn clipboard_changed(&self) {
        if self.os.is_owned_by(self.id) {
            trace!("Ignoring our own clipboard change");
            return;
        }
        let (state, conn_id) = {
            let session = self.session.lock();
            (session.state, session.conn_id)
        };
        // The peer's files are no longer on the clipboard
        self.release_collection(None);
        if state == BridgeState::Disconnected {
            debug!("Clipboard changed before the channel is ready");
            return;
        }
        if self.os.owner() == ClipboardOwner::Empty {
            return;
        }

        self.stop.reset();
        if let Err(e) = self.send_format_list(conn_id) {
            warn!("Failed to announce clipboard change: {}", e);
        }
    }

    fn render(&self, format_id: u32) -> Result<Bytes> {
        let conn_id = self.conn_id();
        let remote = self.format_map.read().local_to_remote(format_id);
        let data = self.request_format_data(conn_id, remote)?;
        if let Err(e) = self.os.push_rendered_data(format_id, data.clone()) {
            debug!("Rendered format {} not cached: {}", format_id, e);
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::memory::MemoryClipboard;
    use crate::protocol::MsgType;

    fn fast_options() -> BridgeOptions {
        BridgeOptions {
            response_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
            ..BridgeOptions::default()
        }
    }

    #[test]
    fn test_start_as_monitor_sends_caps_then_ready() {
        let mut sink = MockChannelSink::new();
        let mut seq = mockall::Sequence::new();
        sink.expect_send()
            .withf(|f| f.msg_type == MsgType::ClipCaps as u16 && f.conn_id == 5)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        sink.expect_send()
            .withf(|f| f.msg_type == MsgType::MonitorReady as u16)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let os: Arc<dyn OsClipboard> = Arc::new(MemoryClipboard::default());
        let bridge = ClipboardBridge::init(os, Box::new(sink), fast_options(), None).unwrap();
        bridge.start_as_monitor(5).unwrap();
        assert_eq!(bridge.conn_id(), 5);
        assert_eq!(bridge.state(), BridgeState::Disconnected);
    }

    #[test]
    fn test_unanswered_request_times_out_with_one_notification() {
        let mut sink = MockChannelSink::new();
        sink.expect_send().returning(|_| Ok(()));
        let (tx, rx) = crossbeam_channel::unbounded();

        let os: Arc<dyn OsClipboard> = Arc::new(MemoryClipboard::default());
        let bridge = ClipboardBridge::init(os, Box::new(sink), fast_options(), Some(tx)).unwrap();

        let started = std::time::Instant::now();
        let result = bridge.request_format_data(13);
        assert!(matches!(result, Err(ClipboardError::Timeout(200))));
        assert!(started.elapsed() < Duration::from_millis(200 + 10 + 150));

        let notification = rx.try_recv().unwrap();
        assert_eq!(notification.kind, NotificationKind::Timeout);
        assert_eq!(notification.text, TIMEOUT_NOTIFICATION_TEXT);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_sink_surfaces_channel_error() {
        let (tx, rx) = crossbeam_channel::unbounded::<Frame>();
        drop(rx);
        let os: Arc<dyn OsClipboard> = Arc::new(MemoryClipboard::default());
        let bridge = ClipboardBridge::init(os, Box::new(tx), fast_options(), None).unwrap();
        assert!(matches!(
            bridge.start_as_monitor(1),
            Err(ClipboardError::Channel(_))
        ));
    }

    #[test]
    fn test_uninit_stops_loop_and_releases_clipboard() {
        let (tx, _rx) = crossbeam_channel::unbounded::<Frame>();
        let clipboard = Arc::new(MemoryClipboard::default());
        let os: Arc<dyn OsClipboard> = clipboard.clone();
        let mut bridge = ClipboardBridge::init(os, Box::new(tx), fast_options(), None).unwrap();
        assert!(bridge.is_running());

        clipboard.announce(bridge.id(), &[13]).unwrap();
        bridge.uninit().unwrap();

        assert!(!bridge.is_running());
        assert_eq!(clipboard.owner(), ClipboardOwner::Empty);
        assert!(bridge.stop_token().is_stopped());
        assert_eq!(bridge.state(), BridgeState::Disconnected);
        // Second call is a no-op
        bridge.uninit().unwrap();
    }

    #[test]
    fn test_local_format_list_replaces_hdrop() {
        let (tx, _rx) = crossbeam_channel::unbounded::<Frame>();
        let clipboard = Arc::new(MemoryClipboard::default());
        let os: Arc<dyn OsClipboard> = clipboard.clone();
        let bridge = ClipboardBridge::init(os, Box::new(tx), fast_options(), None).unwrap();

        clipboard.set_files(vec!["/tmp/x".into()]).unwrap();
        let entries = bridge.shared.local_format_list();
        let names: Vec<Option<&str>> = entries.iter().map(|e| e.name.as_deref()).collect();
        assert_eq!(
            names,
            vec![Some(format_name::FILE_DESCRIPTOR_W), Some(format_name::FILE_CONTENTS)]
        );
        assert!(entries.iter().all(|e| e.id != format_id::CF_HDROP));
    }
}
