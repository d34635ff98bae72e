//! Scripted peer for driving a bridge end to end
#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver};
use parking_lot::Mutex;

use cliprdr_bridge::clipboard::formats::build_file_group;
use cliprdr_bridge::clipboard::{
    BridgeOptions, ClipboardBridge, FileDescriptor, MemoryClipboard, Notification, OsClipboard,
};
use cliprdr_bridge::protocol::{
    ClipboardCapabilities, ClipboardPdu, FileContentsResponse, FormatDataResponse,
    FormatListEntry, Frame, ResponseStatus,
};

pub const CONN_ID: u32 = 3;

/// Id the peer uses for FileGroupDescriptorW
pub const REMOTE_FILE_DESCRIPTOR: u32 = 49356;
pub const REMOTE_FILE_CONTENTS: u32 = 49357;

pub type Script = Box<dyn FnMut(&ClipboardPdu) -> Vec<ClipboardPdu> + Send>;

pub fn fast_options() -> BridgeOptions {
    BridgeOptions {
        response_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
        ..BridgeOptions::default()
    }
}

/// Poll `cond` for up to five seconds
pub fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(10));
    }
}

/// A bridge plus the remote end of its channel
pub struct FakePeer {
    pub clipboard: Arc<MemoryClipboard>,
    pub bridge: Arc<ClipboardBridge>,
    pub notifications: Receiver<Notification>,
    seen: Arc<Mutex<Vec<ClipboardPdu>>>,
}

impl FakePeer {
    pub fn start(options: BridgeOptions, script: Script) -> Self {
        Self::attach(Arc::new(MemoryClipboard::default()), options, script)
    }

    /// Attach another bridge to an existing clipboard
    pub fn attach(clipboard: Arc<MemoryClipboard>, options: BridgeOptions, mut script: Script) -> Self {
        let (frame_tx, frame_rx) = unbounded::<Frame>();
        let (notify_tx, notify_rx) = unbounded();
        let os: Arc<dyn OsClipboard> = clipboard.clone();
        let bridge =
            Arc::new(ClipboardBridge::init(os, Box::new(frame_tx), options, Some(notify_tx)).unwrap());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let weak = Arc::downgrade(&bridge);
        let log = Arc::clone(&seen);
        thread::spawn(move || {
            for frame in frame_rx.iter() {
                let Some(bridge) = weak.upgrade() else {
                    break;
                };
                let names = bridge.name_encoding();
                let pdu = ClipboardPdu::from_frame(&frame, names).expect("bridge sent garbage");
                log.lock().push(pdu.clone());
                for reply in script(&pdu) {
                    if let Err(e) = bridge.handle_frame(&reply.to_frame(CONN_ID, names)) {
                        eprintln!("peer reply failed: {e}");
                    }
                }
            }
        });

        Self {
            clipboard,
            bridge,
            notifications: notify_rx,
            seen,
        }
    }

    pub fn deliver(&self, pdu: ClipboardPdu) {
        let frame = pdu.to_frame(CONN_ID, self.bridge.name_encoding());
        self.bridge.handle_frame(&frame).unwrap();
    }

    /// Capabilities then MONITOR_READY, as the channel server would send
    pub fn handshake(&self) {
        self.deliver(ClipboardPdu::Capabilities(ClipboardCapabilities::local()));
        self.deliver(ClipboardPdu::MonitorReady);
        self.wait_for("initial format list", |pdu| {
            matches!(pdu, ClipboardPdu::FormatList(_)).then_some(())
        });
    }

    pub fn seen(&self) -> Vec<ClipboardPdu> {
        self.seen.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&ClipboardPdu) -> bool) -> usize {
        self.seen.lock().iter().filter(|pdu| pred(pdu)).count()
    }

    /// First message the bridge sent that `pick` accepts
    pub fn wait_for<T>(&self, what: &str, mut pick: impl FnMut(&ClipboardPdu) -> Option<T>) -> T {
        let mut found = None;
        wait_until(what, || {
            found = self.seen.lock().iter().find_map(&mut pick);
            found.is_some()
        });
        found.unwrap()
    }
}

pub fn no_replies() -> Script {
    Box::new(|_| Vec::new())
}

pub fn file_list() -> ClipboardPdu {
    ClipboardPdu::FormatList(vec![FormatListEntry::new(
        REMOTE_FILE_DESCRIPTOR,
        Some("FileGroupDescriptorW"),
    )])
}

pub fn data_response(status: ResponseStatus, data: Bytes) -> ClipboardPdu {
    ClipboardPdu::FormatDataResponse(FormatDataResponse { status, data })
}

/// Peer that offers `files` and answers every request for them
pub fn serve_files(files: Vec<(&'static str, Vec<u8>)>) -> Script {
    let descriptors: Vec<FileDescriptor> = files
        .iter()
        .map(|(name, data)| FileDescriptor::file(*name, data.len() as u64))
        .collect();
    let blob = build_file_group(&descriptors);

    Box::new(move |pdu| match pdu {
        ClipboardPdu::FormatDataRequest {
            requested_format_id,
        } if *requested_format_id == REMOTE_FILE_DESCRIPTOR => {
            vec![data_response(ResponseStatus::Ok, blob.clone())]
        }
        ClipboardPdu::FormatDataRequest { .. } => {
            vec![data_response(ResponseStatus::Fail, Bytes::new())]
        }
        ClipboardPdu::FileContentsRequest(request) => {
            let response = match files.get(request.list_index as usize) {
                Some((_, data)) if request.is_size_request() => FileContentsResponse {
                    status: ResponseStatus::Ok,
                    stream_id: request.stream_id,
                    data: Bytes::copy_from_slice(&(data.len() as u64).to_le_bytes()),
                },
                Some((_, data)) => {
                    let start = (request.position as usize).min(data.len());
                    let end = (start + request.cb_requested as usize).min(data.len());
                    FileContentsResponse {
                        status: ResponseStatus::Ok,
                        stream_id: request.stream_id,
                        data: Bytes::copy_from_slice(&data[start..end]),
                    }
                }
                None => FileContentsResponse {
                    status: ResponseStatus::Fail,
                    stream_id: request.stream_id,
                    data: Bytes::new(),
                },
            };
            vec![ClipboardPdu::FileContentsResponse(response)]
        }
        _ => Vec::new(),
    })
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
