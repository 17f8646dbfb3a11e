//! The tunable-knob struct every ring, relay, and source type is built from.

use crate::constants::{DEFAULT_BLOCK_COUNT, DEFAULT_BLOCK_SIZE, HEADER_LIMIT, PROTOCOL_V2_MAJOR};

/// Tunable knobs shared across the ring, relay, and source layers.
///
/// Construct with [`Config::default`] and adjust with the builder methods,
/// mirroring the driver configuration pattern used elsewhere in this
/// lineage.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Bytes per block in any [`AudioRing`][crate::ring::AudioRing] created
    /// under this config.
    pub block_size: usize,
    /// Blocks held by any ring created under this config.
    pub block_count: usize,
    /// Maximum size in bytes of a relay protocol JSON header.
    pub header_limit: usize,
    /// Major version this server/source advertises during the handshake.
    pub protocol_major: u16,
    /// Minor version this server/source advertises during the handshake.
    pub protocol_minor: u16,
}

impl Config {
    /// Creates a config with the documented defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-block byte size.
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the number of blocks held in the ring window.
    pub fn block_count(mut self, block_count: usize) -> Self {
        self.block_count = block_count;
        self
    }

    /// Sets the relay header size cap.
    pub fn header_limit(mut self, header_limit: usize) -> Self {
        self.header_limit = header_limit;
        self
    }

    /// Sets the advertised protocol version.
    pub fn protocol_version(mut self, major: u16, minor: u16) -> Self {
        self.protocol_major = major;
        self.protocol_minor = minor;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            block_size: DEFAULT_BLOCK_SIZE,
            block_count: DEFAULT_BLOCK_COUNT,
            header_limit: HEADER_LIMIT,
            protocol_major: PROTOCOL_V2_MAJOR,
            protocol_minor: 0,
        }
    }
}
