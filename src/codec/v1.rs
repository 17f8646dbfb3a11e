//! The original, name-keyed frame format: `len_name | name | type | len_body | body`,
//! with both length prefixes capped at a single byte.

use crate::{
    constants::{V1_MAX_BODY, V1_MAX_NAME},
    error::CodecError,
};
use std::collections::VecDeque;

/// Largest chunk either field of a v1 frame may carry.
const MAX_CHUNK: usize = V1_MAX_BODY;

/// Splits `body` into one or more v1 frames addressed to `channel_name`,
/// each carrying the full channel name and at most 255 bytes of body.
///
/// Panics if `channel_name` is empty or longer than 255 bytes — both are
/// programmer errors, not something a caller recovers from.
pub fn encode(channel_name: &str, body: &[u8]) -> Vec<Vec<u8>> {
    let name_bytes = channel_name.as_bytes();
    assert!(!name_bytes.is_empty() && name_bytes.len() <= V1_MAX_NAME);

    if body.is_empty() {
        return Vec::new();
    }

    body.chunks(MAX_CHUNK)
        .map(|chunk| {
            let mut frame = Vec::with_capacity(3 + name_bytes.len() + chunk.len());
            frame.push(name_bytes.len() as u8);
            frame.extend_from_slice(name_bytes);
            frame.push(0);
            frame.push(chunk.len() as u8);
            frame.extend_from_slice(chunk);
            frame
        })
        .collect()
}

#[derive(Debug)]
enum Phase {
    NameLen,
    Name(usize),
    Type(String),
    BodyLen(String),
    Body(String, usize),
}

/// Re-entrant decoder for the v1 wire format.
///
/// `feed` may be called with arbitrarily small or large chunks of the
/// underlying byte stream; `get_frame` returns `Ok(None)` whenever a full
/// frame is not yet buffered, and must be polled again once more bytes
/// arrive.
#[derive(Debug)]
pub struct Decoder {
    buf: VecDeque<u8>,
    phase: Phase,
}

impl Decoder {
    /// Creates a decoder expecting a fresh stream (phase 1).
    pub fn new() -> Self {
        Decoder {
            buf: VecDeque::new(),
            phase: Phase::NameLen,
        }
    }

    /// Buffers `bytes` for subsequent decoding.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes.iter().copied());
    }

    /// Attempts to complete one frame from buffered bytes.
    pub fn get_frame(&mut self) -> Result<Option<(String, Vec<u8>)>, CodecError> {
        loop {
            match &self.phase {
                Phase::NameLen => {
                    let len = match self.buf.pop_front() {
                        Some(b) => b as usize,
                        None => return Ok(None),
                    };
                    if len == 0 {
                        return Err(CodecError::EmptyField);
                    }
                    self.phase = Phase::Name(len);
                },
                Phase::Name(len) => {
                    let len = *len;
                    if self.buf.len() < len {
                        return Ok(None);
                    }
                    let name_bytes: Vec<u8> = self.buf.drain(..len).collect();
                    let name = String::from_utf8(name_bytes).map_err(|_| CodecError::Malformed)?;
                    self.phase = Phase::Type(name);
                },
                Phase::Type(name) => {
                    if self.buf.pop_front().is_none() {
                        return Ok(None);
                    }
                    self.phase = Phase::BodyLen(name.clone());
                },
                Phase::BodyLen(name) => {
                    let len = match self.buf.pop_front() {
                        Some(b) => b as usize,
                        None => return Ok(None),
                    };
                    if len == 0 {
                        return Err(CodecError::EmptyField);
                    }
                    self.phase = Phase::Body(name.clone(), len);
                },
                Phase::Body(name, len) => {
                    let len = *len;
                    if self.buf.len() < len {
                        return Ok(None);
                    }
                    let body: Vec<u8> = self.buf.drain(..len).collect();
                    let name = name.clone();
                    self.phase = Phase::NameLen;
                    return Ok(Some((name, body)));
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

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_flat(channel_name: &str, body: &[u8]) -> Vec<u8> {
        encode(channel_name, body).into_iter().flatten().collect()
    }

    #[test]
    fn round_trips_single_frame() {
        let wire = encode_flat("audio", b"hello");
        let mut decoder = Decoder::new();
        decoder.feed(&wire);
        assert_eq!(
            decoder.get_frame().unwrap(),
            Some(("audio".to_string(), b"hello".to_vec()))
        );
        assert_eq!(decoder.get_frame().unwrap(), None);
    }

    #[test]
    fn round_trips_across_arbitrary_chunk_sizes() {
        let body = vec![7u8; 4 * MAX_CHUNK + 13];
        let wire = encode_flat("cmd", &body);

        for feed_size in [1, 2, 100, 255, 256, 512, 513, 1024, 4096] {
            let mut decoder = Decoder::new();
            let mut reassembled = Vec::new();

            for chunk in wire.chunks(feed_size) {
                decoder.feed(chunk);
                while let Some((name, piece)) = decoder.get_frame().unwrap() {
                    assert_eq!(name, "cmd");
                    reassembled.extend_from_slice(&piece);
                }
            }

            assert_eq!(reassembled, body, "feed_size={}", feed_size);
        }
    }

    #[test]
    fn empty_body_encodes_no_frames() {
        assert!(encode("audio", b"").is_empty());
    }

    #[test]
    fn zero_length_name_is_rejected() {
        let mut decoder = Decoder::new();
        decoder.feed(&[0]);
        assert!(matches!(decoder.get_frame(), Err(CodecError::EmptyField)));
    }
}
