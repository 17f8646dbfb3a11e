//! The newer, id-keyed frame format: a fixed 4-byte header
//! (`channel_id | type | len_be16`) followed by up to 65535 bytes of body.

use crate::{constants::V2_MAX_BODY, error::CodecError};
use byteorder::{BigEndian, ByteOrder};
use std::collections::VecDeque;

/// Largest body a single v2 frame may carry.
const MAX_CHUNK: usize = V2_MAX_BODY;

/// Splits `body` into one or more v2 frames addressed to `channel_id`.
/// An empty body produces no frames, matching [`v1::encode`][crate::codec::v1::encode].
pub fn encode(channel_id: u8, frame_type: u8, body: &[u8]) -> Vec<Vec<u8>> {
    if body.is_empty() {
        return Vec::new();
    }

    body.chunks(MAX_CHUNK)
        .map(|chunk| frame(channel_id, frame_type, chunk))
        .collect()
}

fn frame(channel_id: u8, frame_type: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.push(channel_id);
    out.push(frame_type);
    let mut len_buf = [0u8; 2];
    BigEndian::write_u16(&mut len_buf, body.len() as u16);
    out.extend_from_slice(&len_buf);
    out.extend_from_slice(body);
    out
}

#[derive(Debug)]
enum Phase {
    Header,
    Body { channel_id: u8, frame_type: u8, len: usize },
}

/// Re-entrant decoder for the v2 wire format.
#[derive(Debug)]
pub struct Decoder {
    buf: VecDeque<u8>,
    phase: Phase,
}

impl Decoder {
    /// Creates a decoder expecting a fresh stream (header phase).
    pub fn new() -> Self {
        Decoder {
            buf: VecDeque::new(),
            phase: Phase::Header,
        }
    }

    /// Buffers `bytes` for subsequent decoding.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes.iter().copied());
    }

    /// Attempts to complete one frame from buffered bytes.
    pub fn get_frame(&mut self) -> Result<Option<(u8, u8, Vec<u8>)>, CodecError> {
        loop {
            match self.phase {
                Phase::Header => {
                    if self.buf.len() < 4 {
                        return Ok(None);
                    }
                    let channel_id = self.buf.pop_front().unwrap();
                    let frame_type = self.buf.pop_front().unwrap();
                    let len_bytes = [self.buf.pop_front().unwrap(), self.buf.pop_front().unwrap()];
                    let len = BigEndian::read_u16(&len_bytes) as usize;
                    self.phase = Phase::Body { channel_id, frame_type, len };
                },
                Phase::Body { channel_id, frame_type, len } => {
                    if self.buf.len() < len {
                        return Ok(None);
                    }
                    let body: Vec<u8> = self.buf.drain(..len).collect();
                    self.phase = Phase::Header;
                    return Ok(Some((channel_id, frame_type, body)));
                },
            }
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
