//! Constants affecting ring, codec, and protocol handling.

/// Default number of bytes per block in a newly created [`AudioRing`].
///
/// [`AudioRing`]: crate::ring::AudioRing
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Default number of blocks held by a newly created [`AudioRing`].
///
/// [`AudioRing`]: crate::ring::AudioRing
pub const DEFAULT_BLOCK_COUNT: usize = 32;

/// Maximum size in bytes of a relay protocol JSON header, before the
/// connection is rejected as a bad request.
pub const HEADER_LIMIT: usize = 1024;

/// Four-byte sentinel terminating a relay protocol header.
pub const END_OF_HEADER: &[u8] = b"\r\n\r\n";

/// Line terminator used by the source protocol's handshake and command
/// channel.
pub const LINE_ENDING: &str = "\r\n";

/// Major version advertised by the original (name-keyed) source protocol.
pub const PROTOCOL_V1_MAJOR: u16 = 1;

/// Major version advertised by the newer (id-keyed) source protocol.
pub const PROTOCOL_V2_MAJOR: u16 = 2;

/// Channel name used for audio under source protocol v1.
pub const V1_AUDIO_CHANNEL: &str = "audio";

/// Channel name used for commands under source protocol v1.
pub const V1_CMD_CHANNEL: &str = "cmd";

/// Channel id used for audio under source protocol v2.
pub const V2_AUDIO_CHANNEL: u8 = 0;

/// Channel id used for commands under source protocol v2.
pub const V2_CMD_CHANNEL: u8 = 1;

/// Largest body a single v1 frame may carry.
pub const V1_MAX_BODY: usize = 255;

/// Largest channel name a v1 frame may carry.
pub const V1_MAX_NAME: usize = 255;

/// Largest body a single v2 frame may carry.
pub const V2_MAX_BODY: usize = 65535;
