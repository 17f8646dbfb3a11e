#![deny(missing_docs)]
//! `radiant-relay-core` is the audio transport core behind a live internet
//! radio system: a block-granular ring buffer feeding a fan-out relay
//! network, fed in turn by a framed, versioned source handshake protocol.
//!
//! The library offers:
//!  * [`ring::AudioRing`], a fixed-capacity block ring holding a sliding
//!    window of recent audio with out-of-window reposition semantics.
//!  * [`codec`], two wire-level frame codecs (a legacy name-keyed variant
//!    and a newer id-keyed variant) sharing a common `feed`/`get_frame`
//!    interface.
//!  * [`source::SourceSession`] and [`ingest::IngestSession`], the client
//!    and server halves of the broadcaster handshake: version negotiation,
//!    SHA-1 challenge/response authentication, and a line-based command
//!    channel layered over the frame codec.
//!  * [`relay::RelayServer`] and [`relay::RelayClient`], the fan-out layer
//!    that serves a named audio resource to any number of pull-driven
//!    readers.
//!  * [`observer::Subject`], a small multicast notification primitive used
//!    throughout the session and relay types.
//!  * [`transport::CountingWriter`], a thin `AsyncWrite` wrapper callers use
//!    to tally bytes actually written, rather than monkey-patching the
//!    transport's write method.

pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod ingest;
pub mod observer;
pub mod relay;
pub mod ring;
pub mod source;
pub mod transport;

pub use config::Config;
pub use ring::AudioRing;
