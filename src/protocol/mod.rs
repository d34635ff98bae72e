//! Clipboard Channel Wire Protocol
//!
//! Message definitions and framing for the clipboard virtual channel.
//!
//! # Overview
//!
//! Every message starts with a 12-byte little-endian header:
//!
//! ```text
//! Offset | Size | Field
//! -------|------|---------
//! 0      | 4    | connId   (correlates a message to a remote connection)
//! 4      | 2    | msgType  (MONITOR_READY .. UNLOCK_CLIPDATA)
//! 6      | 2    | msgFlags (RESPONSE_OK, RESPONSE_FAIL, ASCII_NAMES)
//! 8      | 4    | dataLen  (payload length)
//! ```
//!
//! The payload layouts follow MS-RDPECLIP. [`Frame`] is the raw header plus
//! payload as it travels on the wire, [`ClipboardPdu`] is the typed message.
//! [`CliprdrCodec`] frames a byte stream for `tokio_util::codec`.

pub mod codec;
pub mod pdu;

pub use codec::CliprdrCodec;
pub use pdu::{
    ClipboardCapabilities, ClipboardPdu, FileContentsFlag, FileContentsRequest,
    FileContentsResponse, FormatDataResponse, FormatListEntry, Frame, GeneralCapability,
    MsgFlag, MsgFlags, MsgType, NameEncoding, ResponseStatus, HEADER_LEN,
};

use thiserror::Error;

/// Wire-level encoding and decoding errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Not enough bytes for the field being decoded
    #[error("Truncated {what}: need {needed} bytes, have {available}")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    /// Header carries a message type outside 0x0001..=0x000B
    #[error("Unknown message type: {0:#06x}")]
    UnknownMessageType(u16),

    /// Frame payload larger than the configured maximum
    #[error("Frame payload of {0} bytes exceeds limit of {1}")]
    FrameTooLarge(usize, usize),

    /// String field is not valid UTF-16
    #[error("Invalid UTF-16 in {0}")]
    InvalidString(&'static str),

    /// Capability PDU without a usable general set
    #[error("Invalid capabilities: {0}")]
    InvalidCapabilities(String),

    /// Transport IO error (required by tokio-util codecs)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
