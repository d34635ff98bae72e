//! Stream framing for the clipboard channel
//!
//! Splits a byte stream into [`Frame`]s using the `dataLen` header field.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use super::{Frame, ProtocolError};

/// Default upper bound for a single frame payload (16 MiB)
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// `tokio_util` codec for clipboard channel frames
#[derive(Debug, Clone, Copy)]
pub struct CliprdrCodec {
    max_payload: usize,
}

impl CliprdrCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for CliprdrCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

impl Decoder for CliprdrCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        let frame = Frame::decode(src, self.max_payload)?;
        if let Some(frame) = &frame {
            trace!(
                "decoded frame: conn={} type={:#06x} flags={:#06x} len={}",
                frame.conn_id,
                frame.msg_type,
                frame.msg_flags,
                frame.payload.len()
            );
        }
        Ok(frame)
    }
}

impl Encoder<Frame> for CliprdrCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        if frame.payload.len() > self.max_payload {
            return Err(ProtocolError::FrameTooLarge(
                frame.payload.len(),
                self.max_payload,
            ));
        }
        frame.encode(dst);
        Ok(())
    }
}
