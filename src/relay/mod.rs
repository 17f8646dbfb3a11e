//! The fan-out relay: a minimal JSON-header handshake over raw TCP, then
//! per-reader pull-producer streaming from a shared [`ResourceTable`].

mod client;
mod header;
mod keepalive;
mod server;
mod resource;

pub use client::{RelayClient, RelayClientEvents};
pub use header::{RelayRequest, RelayResponse};
pub use keepalive::KeepAlive;
pub use resource::{AudioResource, Reader, ResourceTable};
pub use server::RelayServer;
