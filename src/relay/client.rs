//! The pull side of the relay protocol: opens a session against a
//! `RelayServer`, then forwards every subsequent byte to the consumer.

use crate::{
    config::Config,
    error::{RelayError, RelayResult},
    observer::Subject,
    relay::{
        header::{read_header, write_header, RelayRequest, RelayResponse},
        keepalive::{self, KeepAlive},
    },
};
use tokio::{io::AsyncReadExt, net::TcpStream};
use tracing::instrument;

/// The multicast notification points a [`RelayClient`] exposes.
#[derive(Default)]
pub struct RelayClientEvents {
    /// Fired when the server reports the requested resource doesn't exist.
    pub conn_failed: Subject<()>,
    /// Fired once the server reports `found`, carrying `begin_offset`.
    pub found: Subject<u64>,
    /// Fired for every chunk of raw audio received once streaming.
    pub audio_received: Subject<Vec<u8>>,
    /// Fired when the connection ends, carrying a human-readable reason.
    pub connection_lost: Subject<String>,
}

/// Symmetric counterpart to [`crate::relay::RelayServer`] from the reader
/// side. Does not buffer beyond what the transport hands it in a single
/// read.
pub struct RelayClient {
    /// Subscribe before calling [`run`][RelayClient::run].
    pub events: RelayClientEvents,
}

impl RelayClient {
    /// Creates a client with no subscribers attached yet.
    pub fn new() -> Self {
        RelayClient {
            events: RelayClientEvents::default(),
        }
    }

    /// Runs the relay session to completion over `stream`: sends the
    /// request header, applies keep-alive, then streams received bytes to
    /// [`audio_received`][RelayClientEvents::audio_received] until the
    /// connection ends.
    #[instrument(skip(self, stream, config))]
    pub async fn run(
        &self,
        mut stream: TcpStream,
        name: &str,
        config: &Config,
        keep_alive: KeepAlive,
    ) -> RelayResult<()> {
        keepalive::apply(&stream, keep_alive);

        write_header(
            &mut stream,
            &RelayRequest {
                name: name.to_string(),
            },
        )
        .await?;

        let header = read_header(&mut stream, config.header_limit).await?;
        let response: RelayResponse = serde_json::from_slice(&header)?;

        if !response.is_found() {
            self.events.conn_failed.notify(&());
            return Err(RelayError::NotFound);
        }

        if let Some(begin_offset) = response.begin_offset {
            self.events.found.notify(&begin_offset);
        }

        let mut buf = vec![0u8; 8192];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => {
                    self.events.connection_lost.notify(&"connection closed".to_string());
                    return Ok(());
                },
                Ok(n) => {
                    self.events.audio_received.notify(&buf[..n].to_vec());
                },
                Err(e) => {
                    let reason = e.to_string();
                    self.events.connection_lost.notify(&reason);
                    return Err(RelayError::from(e));
                },
            }
        }
    }
}

impl Default for RelayClient {
    fn default() -> Self {
        Self::new()
    }
}
