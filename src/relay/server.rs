//! The fan-out relay server: admits a relay connection, attaches it as a
//! reader on the requested resource, and runs its pull-producer loop.

use crate::{
    config::Config,
    error::{RelayError, RelayResult},
    relay::{
        header::{read_header, write_bad_request, write_header, RelayRequest, RelayResponse},
        resource::{AudioResource, Reader, ResourceTable},
    },
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::{io::AsyncWriteExt, net::TcpStream};
use tracing::{info, instrument};

/// Fan-out server over a shared [`ResourceTable`].
///
/// The table is also the ingest side's write target: a `RelayServer` and
/// an `IngestSession` sharing a clone of [`resources`][RelayServer::resources]
/// are how a broadcast connects to its listeners.
pub struct RelayServer {
    config: Config,
    resources: Arc<ResourceTable>,
    next_session_no: AtomicU64,
}

impl RelayServer {
    /// Creates a server with its own empty resource table.
    pub fn new(config: Config) -> Self {
        RelayServer {
            resources: Arc::new(ResourceTable::new(config)),
            config,
            next_session_no: AtomicU64::new(0),
        }
    }

    /// The shared resource table.
    pub fn resources(&self) -> Arc<ResourceTable> {
        self.resources.clone()
    }

    fn next_session_no(&self) -> u64 {
        self.next_session_no.fetch_add(1, Ordering::SeqCst)
    }

    /// Serves one accepted relay connection to completion: header
    /// handshake, admission, then the produce loop until the reader falls
    /// out of window, the resource closes, or the connection drops.
    #[instrument(skip(self, stream))]
    pub async fn serve(&self, mut stream: TcpStream) -> RelayResult<()> {
        let session_no = self.next_session_no();

        let header = match read_header(&mut stream, self.config.header_limit).await {
            Ok(header) => header,
            // Only a genuine over-limit header is a "bad request" the peer
            // is still around to hear about; a disconnect or I/O failure
            // mid-handshake has no one left to write a reply to.
            Err(RelayError::HeaderTooLong) => {
                write_bad_request(&mut stream).await?;
                return Ok(());
            },
            Err(RelayError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };

        let request: RelayRequest = match serde_json::from_slice(&header) {
            Ok(r) => r,
            Err(_) => {
                write_bad_request(&mut stream).await?;
                return Ok(());
            },
        };

        let resource = match self.resources.get(&request.name) {
            Some(resource) => resource,
            None => {
                write_header(&mut stream, &RelayResponse::not_found(request.name)).await?;
                return Ok(());
            },
        };

        let (reader, begin_offset) = resource.attach(session_no);
        write_header(&mut stream, &RelayResponse::found(request.name.clone(), begin_offset)).await?;
        info!(session_no, resource = %request.name, begin_offset, "reader attached");

        let reason = produce_loop(&mut stream, &resource, &reader).await;
        resource.detach(session_no);
        info!(session_no, resource = %request.name, reason = %reason, "reader detached");

        Ok(())
    }

    /// Sum of reader-set sizes across every resource.
    pub fn get_count_of_streams(&self) -> usize {
        self.resources.get_count_of_streams()
    }
}

/// The pull-producer discipline: on each loop iteration either a ready
/// block is written immediately, or the loop waits to be woken by the
/// next write that completes a block.
async fn produce_loop(stream: &mut TcpStream, resource: &AudioResource, reader: &Reader) -> String {
    loop {
        if resource.is_closed() {
            return "Resource closed".to_string();
        }
        if reader.offset() < resource.base() {
            return "Out of buffer".to_string();
        }

        // Registering interest before re-checking for data avoids the
        // race where a write completes between the check and the wait.
        let notified = resource.notify_handle().notified();

        match resource.read_for(reader) {
            Some(block) => {
                if let Err(e) = stream.write_all(&block).await {
                    return e.to_string();
                }
                // `write_all` completing is this reader's "hungry" signal:
                // the transport is ready to accept the next block.
                reader.set_hungry(true);
            },
            None => notified.await,
        }
    }
}
