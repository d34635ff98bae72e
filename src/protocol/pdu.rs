//! Clipboard channel PDUs
//!
//! Typed messages and their payload encodings.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use enumflags2::{bitflags, BitFlags};

use super::ProtocolError;

/// Size of the common message header
pub const HEADER_LEN: usize = 12;

/// Capability set type for the general set
pub const CB_CAPSTYPE_GENERAL: u16 = 1;

/// Length of the general capability set including its 4-byte header
pub const CB_CAPSTYPE_GENERAL_LEN: u16 = 12;

/// Capability version advertised by this side
pub const CB_CAPS_VERSION_2: u32 = 2;

/// Fixed size of a short format name field
const SHORT_FORMAT_NAME_LEN: usize = 32;

/// Fixed size of the TEMP_DIRECTORY path field
const TEMP_DIRECTORY_LEN: usize = 520;

type Result<T> = std::result::Result<T, ProtocolError>;

/// Message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MsgType {
    MonitorReady = 0x0001,
    FormatList = 0x0002,
    FormatListResponse = 0x0003,
    FormatDataRequest = 0x0004,
    FormatDataResponse = 0x0005,
    TempDirectory = 0x0006,
    ClipCaps = 0x0007,
    FileContentsRequest = 0x0008,
    FileContentsResponse = 0x0009,
    LockClipData = 0x000A,
    UnlockClipData = 0x000B,
}

impl TryFrom<u16> for MsgType {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self> {
        Ok(match value {
            0x0001 => MsgType::MonitorReady,
            0x0002 => MsgType::FormatList,
            0x0003 => MsgType::FormatListResponse,
            0x0004 => MsgType::FormatDataRequest,
            0x0005 => MsgType::FormatDataResponse,
            0x0006 => MsgType::TempDirectory,
            0x0007 => MsgType::ClipCaps,
            0x0008 => MsgType::FileContentsRequest,
            0x0009 => MsgType::FileContentsResponse,
            0x000A => MsgType::LockClipData,
            0x000B => MsgType::UnlockClipData,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        })
    }
}

/// Header flag bits
#[bitflags]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgFlag {
    ResponseOk = 0x0001,
    ResponseFail = 0x0002,
    AsciiNames = 0x0004,
}

pub type MsgFlags = BitFlags<MsgFlag>;

/// General capability flags
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneralCapability {
    UseLongFormatNames = 0x0000_0002,
    StreamFileClipEnabled = 0x0000_0004,
    FileClipNoFilePaths = 0x0000_0008,
    CanLockClipData = 0x0000_0010,
    HugeFileSupportEnabled = 0x0000_0020,
}

/// FILECONTENTS_REQUEST dwFlags
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileContentsFlag {
    Size = 0x0000_0001,
    Range = 0x0000_0002,
}

/// Outcome carried in the flags of response messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    Fail,
}

impl ResponseStatus {
    /// Anything other than a clean RESPONSE_OK counts as failure
    pub fn from_flags(flags: MsgFlags) -> Self {
        if flags.contains(MsgFlag::ResponseOk) && !flags.contains(MsgFlag::ResponseFail) {
            ResponseStatus::Ok
        } else {
            ResponseStatus::Fail
        }
    }

    pub fn from_ok(ok: bool) -> Self {
        if ok {
            ResponseStatus::Ok
        } else {
            ResponseStatus::Fail
        }
    }

    pub fn is_ok(self) -> bool {
        self == ResponseStatus::Ok
    }

    fn flags(self) -> MsgFlags {
        match self {
            ResponseStatus::Ok => MsgFlag::ResponseOk.into(),
            ResponseStatus::Fail => MsgFlag::ResponseFail.into(),
        }
    }
}

/// How format names are laid out in FORMAT_LIST
///
/// Long names are used only when both sides advertised
/// [`GeneralCapability::UseLongFormatNames`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameEncoding {
    Long,
    #[default]
    Short,
}

impl NameEncoding {
    pub fn from_capabilities(flags: BitFlags<GeneralCapability>) -> Self {
        if flags.contains(GeneralCapability::UseLongFormatNames) {
            NameEncoding::Long
        } else {
            NameEncoding::Short
        }
    }
}

/// One FORMAT_LIST entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatListEntry {
    pub id: u32,
    pub name: Option<String>,
}

impl FormatListEntry {
    pub fn new(id: u32, name: Option<&str>) -> Self {
        Self {
            id,
            name: name.filter(|n| !n.is_empty()).map(str::to_owned),
        }
    }
}

/// General capability set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipboardCapabilities {
    pub version: u32,
    pub flags: BitFlags<GeneralCapability>,
}

impl ClipboardCapabilities {
    /// What this side advertises
    pub fn local() -> Self {
        Self {
            version: CB_CAPS_VERSION_2,
            flags: GeneralCapability::UseLongFormatNames
                | GeneralCapability::StreamFileClipEnabled
                | GeneralCapability::FileClipNoFilePaths,
        }
    }
}

/// FORMAT_DATA_RESPONSE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDataResponse {
    pub status: ResponseStatus,
    pub data: Bytes,
}

/// FILECONTENTS_REQUEST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContentsRequest {
    pub stream_id: u32,
    pub list_index: u32,
    pub flags: BitFlags<FileContentsFlag>,
    pub position: u64,
    pub cb_requested: u32,
    pub clip_data_id: Option<u32>,
}

impl FileContentsRequest {
    pub fn size(stream_id: u32, list_index: u32) -> Self {
        Self {
            stream_id,
            list_index,
            flags: FileContentsFlag::Size.into(),
            position: 0,
            cb_requested: 8,
            clip_data_id: None,
        }
    }

    pub fn range(stream_id: u32, list_index: u32, position: u64, cb_requested: u32) -> Self {
        Self {
            stream_id,
            list_index,
            flags: FileContentsFlag::Range.into(),
            position,
            cb_requested,
            clip_data_id: None,
        }
    }

    pub fn is_size_request(&self) -> bool {
        self.flags.contains(FileContentsFlag::Size)
    }
}

/// FILECONTENTS_RESPONSE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContentsResponse {
    pub status: ResponseStatus,
    pub stream_id: u32,
    pub data: Bytes,
}

impl FileContentsResponse {
    /// Payload bytes taken by the stream id ahead of the data
    pub const STREAM_ID_LEN: usize = 4;

    /// Largest data chunk whose response fits a `max_payload` frame
    pub fn max_data_len(max_payload: usize) -> usize {
        max_payload.saturating_sub(Self::STREAM_ID_LEN)
    }
}

/// Raw message: header fields plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub conn_id: u32,
    pub msg_type: u16,
    pub msg_flags: u16,
    pub payload: Bytes,
}

impl Frame {
    pub fn flags(&self) -> MsgFlags {
        MsgFlags::from_bits_truncate(self.msg_flags)
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u32_le(self.conn_id);
        dst.put_u16_le(self.msg_type);
        dst.put_u16_le(self.msg_flags);
        dst.put_u32_le(self.payload.len() as u32);
        dst.put_slice(&self.payload);
    }

    /// Split one complete frame off the front of `src`
    ///
    /// Returns `Ok(None)` while the frame is still incomplete.
    pub fn decode(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let data_len = u32::from_le_bytes([src[8], src[9], src[10], src[11]]) as usize;
        if data_len > max_payload {
            return Err(ProtocolError::FrameTooLarge(data_len, max_payload));
        }
        if src.len() < HEADER_LEN + data_len {
            src.reserve(HEADER_LEN + data_len - src.len());
            return Ok(None);
        }

        let conn_id = src.get_u32_le();
        let msg_type = src.get_u16_le();
        let msg_flags = src.get_u16_le();
        let _ = src.get_u32_le();
        let payload = src.split_to(data_len).freeze();

        Ok(Some(Frame {
            conn_id,
            msg_type,
            msg_flags,
            payload,
        }))
    }
}

/// Typed clipboard channel message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardPdu {
    MonitorReady,
    FormatList(Vec<FormatListEntry>),
    FormatListResponse(ResponseStatus),
    FormatDataRequest { requested_format_id: u32 },
    FormatDataResponse(FormatDataResponse),
    TempDirectory(String),
    Capabilities(ClipboardCapabilities),
    FileContentsRequest(FileContentsRequest),
    FileContentsResponse(FileContentsResponse),
    LockClipData { clip_data_id: u32 },
    UnlockClipData { clip_data_id: u32 },
}

impl ClipboardPdu {
    pub fn msg_type(&self) -> MsgType {
        match self {
            ClipboardPdu::MonitorReady => MsgType::MonitorReady,
            ClipboardPdu::FormatList(_) => MsgType::FormatList,
            ClipboardPdu::FormatListResponse(_) => MsgType::FormatListResponse,
            ClipboardPdu::FormatDataRequest { .. } => MsgType::FormatDataRequest,
            ClipboardPdu::FormatDataResponse(_) => MsgType::FormatDataResponse,
            ClipboardPdu::TempDirectory(_) => MsgType::TempDirectory,
            ClipboardPdu::Capabilities(_) => MsgType::ClipCaps,
            ClipboardPdu::FileContentsRequest(_) => MsgType::FileContentsRequest,
            ClipboardPdu::FileContentsResponse(_) => MsgType::FileContentsResponse,
            ClipboardPdu::LockClipData { .. } => MsgType::LockClipData,
            ClipboardPdu::UnlockClipData { .. } => MsgType::UnlockClipData,
        }
    }

    /// Encode into a frame addressed to `conn_id`
    pub fn to_frame(&self, conn_id: u32, names: NameEncoding) -> Frame {
        let mut payload = BytesMut::new();
        let mut flags = MsgFlags::empty();

        match self {
            ClipboardPdu::MonitorReady => {}
            ClipboardPdu::FormatList(entries) => encode_format_list(entries, names, &mut payload),
            ClipboardPdu::FormatListResponse(status) => flags = status.flags(),
            ClipboardPdu::FormatDataRequest {
                requested_format_id,
            } => payload.put_u32_le(*requested_format_id),
            ClipboardPdu::FormatDataResponse(response) => {
                flags = response.status.flags();
                payload.put_slice(&response.data);
            }
            ClipboardPdu::TempDirectory(path) => {
                put_fixed_utf16(&mut payload, path, TEMP_DIRECTORY_LEN);
            }
            ClipboardPdu::Capabilities(caps) => {
                payload.put_u16_le(1);
                payload.put_u16_le(0);
                payload.put_u16_le(CB_CAPSTYPE_GENERAL);
                payload.put_u16_le(CB_CAPSTYPE_GENERAL_LEN);
                payload.put_u32_le(caps.version);
                payload.put_u32_le(caps.flags.bits());
            }
            ClipboardPdu::FileContentsRequest(request) => {
                payload.put_u32_le(request.stream_id);
                payload.put_u32_le(request.list_index);
                payload.put_u32_le(request.flags.bits());
                payload.put_u32_le(request.position as u32);
                payload.put_u32_le((request.position >> 32) as u32);
                payload.put_u32_le(request.cb_requested);
                if let Some(id) = request.clip_data_id {
                    payload.put_u32_le(id);
                }
            }
            ClipboardPdu::FileContentsResponse(response) => {
                flags = response.status.flags();
                payload.put_u32_le(response.stream_id);
                payload.put_slice(&response.data);
            }
            ClipboardPdu::LockClipData { clip_data_id }
            | ClipboardPdu::UnlockClipData { clip_data_id } => payload.put_u32_le(*clip_data_id),
        }

        Frame {
            conn_id,
            msg_type: self.msg_type() as u16,
            msg_flags: flags.bits(),
            payload: payload.freeze(),
        }
    }

    /// Decode a frame's payload according to its message type
    pub fn from_frame(frame: &Frame, names: NameEncoding) -> Result<Self> {
        let msg_type = MsgType::try_from(frame.msg_type)?;
        let flags = frame.flags();
        let mut src = &frame.payload[..];

        let pdu = match msg_type {
            MsgType::MonitorReady => ClipboardPdu::MonitorReady,
            MsgType::FormatList => ClipboardPdu::FormatList(decode_format_list(
                src,
                names,
                flags.contains(MsgFlag::AsciiNames),
            )?),
            MsgType::FormatListResponse => {
                ClipboardPdu::FormatListResponse(ResponseStatus::from_flags(flags))
            }
            MsgType::FormatDataRequest => {
                ensure(&src, 4, "format data request")?;
                ClipboardPdu::FormatDataRequest {
                    requested_format_id: src.get_u32_le(),
                }
            }
            MsgType::FormatDataResponse => ClipboardPdu::FormatDataResponse(FormatDataResponse {
                status: ResponseStatus::from_flags(flags),
                data: frame.payload.clone(),
            }),
            MsgType::TempDirectory => {
                ClipboardPdu::TempDirectory(decode_utf16_z(src, "temp directory")?)
            }
            MsgType::ClipCaps => ClipboardPdu::Capabilities(decode_capabilities(src)?),
            MsgType::FileContentsRequest => {
                ensure(&src, 24, "file contents request")?;
                let stream_id = src.get_u32_le();
                let list_index = src.get_u32_le();
                let flags = BitFlags::from_bits_truncate(src.get_u32_le());
                let low = src.get_u32_le() as u64;
                let high = src.get_u32_le() as u64;
                let cb_requested = src.get_u32_le();
                let clip_data_id = if src.remaining() >= 4 {
                    Some(src.get_u32_le())
                } else {
                    None
                };
                ClipboardPdu::FileContentsRequest(FileContentsRequest {
                    stream_id,
                    list_index,
                    flags,
                    position: (high << 32) | low,
                    cb_requested,
                    clip_data_id,
                })
            }
            MsgType::FileContentsResponse => {
                let status = ResponseStatus::from_flags(flags);
                // Failed responses may omit the stream id entirely
                let (stream_id, data) = if frame.payload.len() >= 4 {
                    (src.get_u32_le(), frame.payload.slice(4..))
                } else if status.is_ok() {
                    return Err(ProtocolError::Truncated {
                        what: "file contents response",
                        needed: 4,
                        available: frame.payload.len(),
                    });
                } else {
                    (0, Bytes::new())
                };
                ClipboardPdu::FileContentsResponse(FileContentsResponse {
                    status,
                    stream_id,
                    data,
                })
            }
            MsgType::LockClipData => {
                ensure(&src, 4, "lock clipdata")?;
                ClipboardPdu::LockClipData {
                    clip_data_id: src.get_u32_le(),
                }
            }
            MsgType::UnlockClipData => {
                ensure(&src, 4, "unlock clipdata")?;
                ClipboardPdu::UnlockClipData {
                    clip_data_id: src.get_u32_le(),
                }
            }
        };

        Ok(pdu)
    }
}

fn ensure(src: &impl Buf, needed: usize, what: &'static str) -> Result<()> {
    if src.remaining() < needed {
        return Err(ProtocolError::Truncated {
            what,
            needed,
            available: src.remaining(),
        });
    }
    Ok(())
}

fn encode_format_list(entries: &[FormatListEntry], names: NameEncoding, dst: &mut BytesMut) {
    for entry in entries {
        dst.put_u32_le(entry.id);
        let name = entry.name.as_deref().unwrap_or("");
        match names {
            NameEncoding::Long => {
                for unit in name.encode_utf16() {
                    dst.put_u16_le(unit);
                }
                dst.put_u16_le(0);
            }
            NameEncoding::Short => put_fixed_utf16(dst, name, SHORT_FORMAT_NAME_LEN),
        }
    }
}

fn decode_format_list(
    mut src: &[u8],
    names: NameEncoding,
    ascii: bool,
) -> Result<Vec<FormatListEntry>> {
    let mut entries = Vec::new();

    while src.has_remaining() {
        ensure(&src, 4, "format id")?;
        let id = src.get_u32_le();

        let name = match names {
            NameEncoding::Long => {
                let mut units = Vec::new();
                loop {
                    ensure(&src, 2, "long format name")?;
                    let unit = src.get_u16_le();
                    if unit == 0 {
                        break;
                    }
                    units.push(unit);
                }
                String::from_utf16(&units)
                    .map_err(|_| ProtocolError::InvalidString("format name"))?
            }
            NameEncoding::Short => {
                ensure(&src, SHORT_FORMAT_NAME_LEN, "short format name")?;
                let field = &src[..SHORT_FORMAT_NAME_LEN];
                let name = if ascii {
                    field
                        .iter()
                        .take_while(|&&b| b != 0)
                        .map(|&b| b as char)
                        .collect()
                } else {
                    decode_utf16_z(field, "format name")?
                };
                src.advance(SHORT_FORMAT_NAME_LEN);
                name
            }
        };

        entries.push(FormatListEntry::new(id, Some(name.as_str())));
    }

    Ok(entries)
}

fn decode_capabilities(mut src: &[u8]) -> Result<ClipboardCapabilities> {
    ensure(&src, 4, "capabilities header")?;
    let count = src.get_u16_le();
    let _pad = src.get_u16_le();

    let mut general = None;
    for _ in 0..count {
        ensure(&src, 4, "capability set header")?;
        let set_type = src.get_u16_le();
        let set_len = src.get_u16_le() as usize;
        if set_len < 4 {
            return Err(ProtocolError::InvalidCapabilities(format!(
                "capability set length {set_len}"
            )));
        }
        let body_len = set_len - 4;
        ensure(&src, body_len, "capability set body")?;

        if set_type == CB_CAPSTYPE_GENERAL && body_len >= 8 {
            let mut body = &src[..body_len];
            let version = body.get_u32_le();
            let flags = BitFlags::from_bits_truncate(body.get_u32_le());
            general = Some(ClipboardCapabilities { version, flags });
        }
        src.advance(body_len);
    }

    general.ok_or_else(|| {
        ProtocolError::InvalidCapabilities("missing general capability set".to_string())
    })
}

/// Write `text` as NUL-terminated UTF-16LE into a zero-padded field of `len` bytes
fn put_fixed_utf16(dst: &mut BytesMut, text: &str, len: usize) {
    let max_units = len / 2 - 1;
    let mut written = 0;
    for unit in text.encode_utf16().take(max_units) {
        dst.put_u16_le(unit);
        written += 2;
    }
    dst.put_bytes(0, len - written);
}

/// Read UTF-16LE up to the first NUL unit (or the end of `src`)
pub(crate) fn decode_utf16_z(src: &[u8], what: &'static str) -> Result<String> {
    let units: Vec<u16> = src
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16(&units).map_err(|_| ProtocolError::InvalidString(what))
}
