//! Wire-level frame codecs for the two source protocol generations.
//!
//! [`v1`] is the original name-keyed, single-byte-length-prefixed format;
//! [`v2`] is the newer fixed-header, id-keyed format supporting bodies up
//! to 65535 bytes. Both expose an identical `feed`/`get_frame` re-entrant
//! interface via [`FrameDecoder`] — session layers depend only on that
//! abstraction, never on a specific wire version.

pub mod v1;
pub mod v2;

use crate::error::CodecError;

/// Either a name-keyed (v1) or id-keyed (v2) channel identifier.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Channel {
    /// v1 channel, addressed by its in-band name.
    Name(String),
    /// v2 channel, addressed by its single-byte id.
    Id(u8),
}

/// A decoded frame, abstracting over both wire versions. The frame `type`
/// byte is not surfaced here: v1 requires it to be zero, and nothing above
/// this layer currently branches on it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    /// Channel the frame was addressed to.
    pub channel: Channel,
    /// Frame payload.
    pub body: Vec<u8>,
}

/// The version-erased decoder session layers are written against.
pub enum FrameDecoder {
    /// Decodes the v1 wire format.
    V1(v1::Decoder),
    /// Decodes the v2 wire format.
    V2(v2::Decoder),
}

impl FrameDecoder {
    /// Builds a decoder for the v1 wire format.
    pub fn v1() -> Self {
        FrameDecoder::V1(v1::Decoder::new())
    }

    /// Builds a decoder for the v2 wire format.
    pub fn v2() -> Self {
        FrameDecoder::V2(v2::Decoder::new())
    }

    /// Buffers `bytes` for subsequent decoding.
    pub fn feed(&mut self, bytes: &[u8]) {
        match self {
            FrameDecoder::V1(d) => d.feed(bytes),
            FrameDecoder::V2(d) => d.feed(bytes),
        }
    }

    /// Attempts to complete one frame from buffered bytes.
    pub fn get_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        match self {
            FrameDecoder::V1(d) => Ok(d.get_frame()?.map(|(name, body)| Frame {
                channel: Channel::Name(name),
                body,
            })),
            FrameDecoder::V2(d) => Ok(d.get_frame()?.map(|(id, _ty, body)| Frame {
                channel: Channel::Id(id),
                body,
            })),
        }
    }
}
