use bytes::{Buf, BytesMut};
use std::io::Cursor;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{self, Frame};

pub const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// Frames a byte stream into request frames and writes reply frames back.
///
/// Decoding returns `Ok(None)` both while a frame is still arriving and once the stream is cleanly
/// exhausted. Callers tell the two apart by whether the underlying stream has reached EOF, which
/// `FramedRead` does by calling `decode_eof`: an EOF with bytes of a partial frame still buffered
/// yields `frame::Error::Truncated`.
#[derive(Debug)]
pub struct FrameCodec {
    max_frame_size: usize,
    consumed: u64,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> FrameCodec {
        FrameCodec {
            max_frame_size,
            consumed: 0,
        }
    }

    /// Number of bytes consumed from the stream so far, up to the end of the last decoded frame.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    fn advance(&mut self, src: &mut BytesMut, cnt: usize) {
        src.advance(cnt);
        self.consumed += cnt as u64;
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = frame::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Separator noise between frames is dropped right away so that it is never mistaken for
        // the start of a frame at EOF.
        let noise = src
            .iter()
            .take_while(|&&b| b == b'\r' || b == b'\n')
            .count();
        self.advance(src, noise);

        let mut cursor = Cursor::new(&src[..]);
        let frame = match Frame::parse(&mut cursor) {
            Ok(frame) => frame,
            Err(frame::Error::Incomplete) => {
                // Check the frame size only while waiting for more data so that a client can't
                // make us buffer an unbounded amount of bytes.
                if src.len() > self.max_frame_size {
                    return Err(frame::Error::FrameTooLarge {
                        size: src.len(),
                        limit: self.max_frame_size,
                    });
                }
                src.reserve(4096);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let position = cursor.position() as usize;

        // Remove the parsed frame from the buffer.
        self.advance(src, position);

        Ok(Some(frame))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(frame::Error::Truncated),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = frame::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item.serialize());
        Ok(())
    }
}
