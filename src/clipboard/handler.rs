//! Inbound message handlers
//!
//! Every message from the peer lands here, on the transport's receive
//! thread, in delivery order. Requests are always answered; responses
//! complete the matching [`PendingRequest`](crate::clipboard::signal::PendingRequest);
//! anything that needs the OS clipboard's owner thread is posted to the
//! message loop.

use std::sync::atomic::Ordering;

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use crate::clipboard::bridge::{BridgeState, OfferedFiles, Shared};
use crate::clipboard::error::{recovery_action, ClipboardError, RecoveryAction, Result};
use crate::clipboard::file_set::VirtualFileSet;
use crate::clipboard::formats::{format_id, format_name};
use crate::clipboard::message_loop::LoopCommand;
use crate::clipboard::stream::{DataMedium, DataObject};
use crate::protocol::pdu::CB_CAPS_VERSION_2;
use crate::protocol::{
    ClipboardCapabilities, ClipboardPdu, FileContentsRequest, FileContentsResponse,
    FormatDataResponse, FormatListEntry, Frame, MsgType, NameEncoding, ResponseStatus,
};

impl Shared {
    pub(super) fn handle_frame(&self, frame: &Frame) -> Result<()> {
        let names = self.session.lock().names;
        let result = match ClipboardPdu::from_frame(frame, names) {
            Ok(pdu) => {
                debug!("<- conn {} {:?}", frame.conn_id, pdu.msg_type());
                self.dispatch(frame.conn_id, pdu)
            }
            Err(e) => {
                warn!(
                    "Undecodable message type {:#06x} from conn {}: {}",
                    frame.msg_type, frame.conn_id, e
                );
                self.refuse_undecodable(frame)
                    .and(Err(ClipboardError::Protocol(e)))
            }
        };

        match result {
            Err(e) if recovery_action(&e) == RecoveryAction::Fail => Err(e),
            Err(e) => {
                debug!("Handled clipboard error: {}", e);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    fn dispatch(&self, conn_id: u32, pdu: ClipboardPdu) -> Result<()> {
        match pdu {
            ClipboardPdu::MonitorReady => self.on_monitor_ready(conn_id),
            ClipboardPdu::Capabilities(caps) => self.on_capabilities(conn_id, caps),
            ClipboardPdu::FormatList(entries) => self.on_format_list(conn_id, entries),
            ClipboardPdu::FormatListResponse(status) => {
                self.on_format_list_response(status);
                Ok(())
            }
            ClipboardPdu::FormatDataRequest {
                requested_format_id,
            } => self.on_format_data_request(conn_id, requested_format_id),
            ClipboardPdu::FormatDataResponse(response) => self.on_format_data_response(response),
            ClipboardPdu::TempDirectory(path) => {
                info!("Peer temp directory: {}", path);
                self.session.lock().temp_directory = Some(path);
                Ok(())
            }
            ClipboardPdu::FileContentsRequest(request) => {
                self.on_file_contents_request(conn_id, request)
            }
            ClipboardPdu::FileContentsResponse(response) => {
                self.on_file_contents_response(response)
            }
            ClipboardPdu::LockClipData { clip_data_id } => {
                debug!("Lock clip data {} (conn {})", clip_data_id, conn_id);
                let offered = self.offered.lock().clone();
                self.locked.lock().insert(clip_data_id, offered);
                Ok(())
            }
            ClipboardPdu::UnlockClipData { clip_data_id } => {
                debug!("Unlock clip data {} (conn {})", clip_data_id, conn_id);
                if self.locked.lock().remove(&clip_data_id).is_none() {
                    debug!("Clip data {} was not locked", clip_data_id);
                }
                Ok(())
            }
        }
    }

    /// Answer requests we could not decode so the peer is not left waiting
    fn refuse_undecodable(&self, frame: &Frame) -> Result<()> {
        let pdu = match MsgType::try_from(frame.msg_type) {
            Ok(MsgType::FormatList) => ClipboardPdu::FormatListResponse(ResponseStatus::Fail),
            Ok(MsgType::FormatDataRequest) => ClipboardPdu::FormatDataResponse(FormatDataResponse {
                status: ResponseStatus::Fail,
                data: Bytes::new(),
            }),
            Ok(MsgType::FileContentsRequest) => {
                let stream_id = frame
                    .payload
                    .get(..4)
                    .map_or(0, |b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
                ClipboardPdu::FileContentsResponse(FileContentsResponse {
                    status: ResponseStatus::Fail,
                    stream_id,
                    data: Bytes::new(),
                })
            }
            _ => return Ok(()),
        };
        self.send_to(frame.conn_id, pdu)
    }

    fn on_monitor_ready(&self, conn_id: u32) -> Result<()> {
        {
            let mut session = self.session.lock();
            session.conn_id = conn_id;
            session.state = BridgeState::CapabilitiesExchanged;
        }
        self.locked.lock().clear();
        self.stop.reset();
        self.send_to(conn_id, ClipboardPdu::Capabilities(ClipboardCapabilities::local()))?;
        self.send_format_list(conn_id)
    }

    fn on_capabilities(&self, conn_id: u32, caps: ClipboardCapabilities) -> Result<()> {
        let local = ClipboardCapabilities::local();
        let negotiated = ClipboardCapabilities {
            version: caps.version.min(CB_CAPS_VERSION_2),
            flags: caps.flags & local.flags,
        };
        let announce = {
            let mut session = self.session.lock();
            session.capabilities = Some(negotiated);
            session.names = NameEncoding::from_capabilities(negotiated.flags);
            let first = session.state == BridgeState::Disconnected;
            if first {
                session.conn_id = conn_id;
                session.state = BridgeState::CapabilitiesExchanged;
            }
            first && session.monitor
        };
        info!(
            "Peer capabilities v{} {:?}, negotiated {:?}",
            caps.version, caps.flags, negotiated.flags
        );

        // The monitor side announces its clipboard once the handshake is done
        if announce && !self.local_format_list().is_empty() {
            self.send_format_list(conn_id)?;
        }
        Ok(())
    }

    fn on_format_list(&self, conn_id: u32, entries: Vec<FormatListEntry>) -> Result<()> {
        info!("Peer announced {} format(s) on conn {}", entries.len(), conn_id);
        self.stop.reset();

        let (has_files, delayed) = {
            let mut map = self.format_map.write();
            map.rebuild(&entries, &*self.os);
            (map.contains_file_format(), map.delayed_render_ids())
        };
        // Streams of the previous list must not answer for the new one
        self.release_collection(None);
        {
            let mut session = self.session.lock();
            session.conn_id = conn_id;
            session.state = BridgeState::Synced;
        }

        self.send_to(conn_id, ClipboardPdu::FormatListResponse(ResponseStatus::Ok))?;

        if has_files && self.options.enable_files {
            self.post(LoopCommand::SetFiles { conn_id })
        } else if self.options.enable_others {
            self.post(LoopCommand::SetDelayed {
                conn_id,
                formats: delayed,
            })
        } else {
            debug!("Ignoring peer formats, nothing is enabled");
            Ok(())
        }
    }

    fn on_format_list_response(&self, status: ResponseStatus) {
        if status.is_ok() {
            trace!("Peer accepted our format list");
        } else {
            warn!("Peer rejected our format list");
        }
    }

    fn on_format_data_request(&self, conn_id: u32, format_id: u32) -> Result<()> {
        let response = match self.render_local(format_id) {
            Ok(data) if data.len() > self.options.format_data_limit() => {
                warn!(
                    "Format {} is {} bytes, over the {} byte limit",
                    format_id,
                    data.len(),
                    self.options.format_data_limit()
                );
                FormatDataResponse {
                    status: ResponseStatus::Fail,
                    data: Bytes::new(),
                }
            }
            Ok(data) => FormatDataResponse {
                status: ResponseStatus::Ok,
                data,
            },
            Err(e) => {
                warn!("Cannot serve format {} to conn {}: {}", format_id, conn_id, e);
                FormatDataResponse {
                    status: ResponseStatus::Fail,
                    data: Bytes::new(),
                }
            }
        };
        self.send_to(conn_id, ClipboardPdu::FormatDataResponse(response))
    }

    /// Bytes for one of the formats we announced
    fn render_local(&self, requested: u32) -> Result<Bytes> {
        let descriptor_id = self.os.register_format(format_name::FILE_DESCRIPTOR_W);
        if requested == descriptor_id {
            if !self.options.enable_files {
                return Err(ClipboardError::UnknownFormat(requested));
            }
            return self.serialize_local_files(descriptor_id);
        }
        if !self.options.enable_others || requested == format_id::CF_HDROP {
            return Err(ClipboardError::UnknownFormat(requested));
        }
        if self.os.is_owned_by(self.id) {
            return Err(ClipboardError::StateInconsistent(
                "peer requested data it announced itself".to_string(),
            ));
        }
        if !self.os.available_formats()?.contains(&requested) {
            return Err(ClipboardError::UnknownFormat(requested));
        }
        self.os.read(requested)
    }

    /// FILEGROUPDESCRIPTORW for the local files, remembering what was offered
    fn serialize_local_files(&self, descriptor_id: u32) -> Result<Bytes> {
        if let Some(collection) = self.os.file_collection() {
            let own = self
                .collection
                .lock()
                .as_ref()
                .is_some_and(|c| std::sync::Arc::ptr_eq(c, &collection));
            if own {
                return Err(ClipboardError::StateInconsistent(
                    "peer requested its own files".to_string(),
                ));
            }
            let DataMedium::Bytes(blob) =
                collection.get_data(collection.formats().file_descriptor, None)?
            else {
                return Err(ClipboardError::InvalidData(
                    "descriptor format rendered as a stream".to_string(),
                ));
            };
            info!("Relaying {} virtual file(s) to conn {}", collection.len(), self.conn_id());
            *self.offered.lock() = OfferedFiles::Relay(collection);
            return Ok(blob);
        }

        let paths = self.os.file_list()?;
        if paths.is_empty() {
            return Err(ClipboardError::UnknownFormat(descriptor_id));
        }
        let set = VirtualFileSet::from_paths(&paths)?;
        let blob = set.to_file_group();
        info!("Offering {} local file(s) to conn {}", set.len(), self.conn_id());
        *self.offered.lock() = OfferedFiles::Disk(set);
        Ok(blob)
    }

    fn on_format_data_response(&self, response: FormatDataResponse) -> Result<()> {
        trace!(
            "Format data response {:?}, {} bytes",
            response.status,
            response.data.len()
        );
        if let Err(e) = self.format_data.complete(response) {
            warn!("Discarding format data response: {}", e);
        }
        Ok(())
    }

    fn on_file_contents_request(&self, conn_id: u32, request: FileContentsRequest) -> Result<()> {
        let locked = request
            .clip_data_id
            .and_then(|id| self.locked.lock().get(&id).cloned());
        let offered = match locked {
            Some(offered) => offered,
            None => self.offered.lock().clone(),
        };
        let response = match self.serve_file_contents(&offered, &request) {
            Ok(data) => FileContentsResponse {
                status: ResponseStatus::Ok,
                stream_id: request.stream_id,
                data,
            },
            Err(e) => {
                warn!(
                    "Cannot serve file contents of index {} to conn {}: {}",
                    request.list_index, conn_id, e
                );
                FileContentsResponse {
                    status: ResponseStatus::Fail,
                    stream_id: request.stream_id,
                    data: Bytes::new(),
                }
            }
        };
        self.send_to(conn_id, ClipboardPdu::FileContentsResponse(response))
    }

    fn serve_file_contents(
        &self,
        offered: &OfferedFiles,
        request: &FileContentsRequest,
    ) -> Result<Bytes> {
        let index = request.list_index as usize;
        let len = (request.cb_requested as usize).min(self.options.file_contents_limit());

        match offered {
            OfferedFiles::None => Err(ClipboardError::StateInconsistent(
                "file contents requested before any file list was served".to_string(),
            )),
            OfferedFiles::Disk(set) => {
                if request.is_size_request() {
                    Ok(size_payload(set.size_of(index)?))
                } else {
                    Ok(Bytes::from(set.read_range(index, request.position, len)?))
                }
            }
            OfferedFiles::Relay(collection) => {
                let stream = collection.stream(index)?;
                if request.is_size_request() {
                    Ok(size_payload(stream.size()?))
                } else {
                    stream.read_at(request.position, len)
                }
            }
        }
    }

    fn on_file_contents_response(&self, response: FileContentsResponse) -> Result<()> {
        if !self.file_contents.is_pending() {
            warn!(
                "Discarding file contents response for stream {}: nothing pending",
                response.stream_id
            );
            return Ok(());
        }
        let expected = self.expected_stream_id.load(Ordering::SeqCst);
        // A failure may omit the stream id, which then decodes as 0
        let omitted = !response.status.is_ok() && response.stream_id == 0;
        if response.stream_id != expected && !omitted {
            warn!(
                "Discarding file contents response for stream {}, expected {}",
                response.stream_id, expected
            );
            return Ok(());
        }
        trace!(
            "File contents response {:?}, {} bytes",
            response.status,
            response.data.len()
        );
        if let Err(e) = self.file_contents.complete(response) {
            warn!("Discarding file contents response: {}", e);
        }
        Ok(())
    }
}

fn size_payload(size: u64) -> Bytes {
    Bytes::copy_from_slice(&size.to_le_bytes())
}
