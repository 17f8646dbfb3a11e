//! The relay protocol's header framing: a UTF-8 JSON object terminated by
//! the four-byte sentinel `\r\n\r\n`, capped at a configurable size.

use crate::{constants::END_OF_HEADER, error::RelayError};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// `{"name": "<resource>"}`, sent by a relay client to open a session.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RelayRequest {
    /// Name of the resource being requested.
    pub name: String,
}

/// The server's reply to a [`RelayRequest`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RelayResponse {
    /// Echoes the requested name.
    pub name: String,
    /// `"found"` or `"not_found"`.
    pub result: String,
    /// Present only when `result == "found"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begin_offset: Option<u64>,
}

impl RelayResponse {
    /// Builds a `not_found` response.
    pub fn not_found(name: impl Into<String>) -> Self {
        RelayResponse {
            name: name.into(),
            result: "not_found".to_string(),
            begin_offset: None,
        }
    }

    /// Builds a `found` response carrying the reader's starting offset.
    pub fn found(name: impl Into<String>, begin_offset: u64) -> Self {
        RelayResponse {
            name: name.into(),
            result: "found".to_string(),
            begin_offset: Some(begin_offset),
        }
    }

    /// Whether this response reports the resource as found.
    pub fn is_found(&self) -> bool {
        self.result == "found"
    }
}

/// `{"error": "bad request"}`, sent when a header exceeds the size limit.
#[derive(Serialize)]
struct BadRequest<'a> {
    error: &'a str,
}

/// Reads bytes from `stream` until the `\r\n\r\n` sentinel appears,
/// returning everything before it. Fails with [`RelayError::HeaderTooLong`]
/// if more than `limit` bytes arrive first, or with
/// [`RelayError::ConnectionClosed`] if the peer disconnects before
/// completing the header — the two are not the same event, since only the
/// former has a peer still around to receive a bad-request reply.
pub async fn read_header<R>(stream: &mut R, limit: usize) -> Result<Vec<u8>, RelayError>
where
    R: AsyncReadExt + Unpin,
{
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        if buf.len() > limit {
            return Err(RelayError::HeaderTooLong);
        }

        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(RelayError::ConnectionClosed);
        }
        buf.push(byte[0]);

        if buf.ends_with(END_OF_HEADER) {
            buf.truncate(buf.len() - END_OF_HEADER.len());
            return Ok(buf);
        }
    }
}

/// Serializes `value` as the JSON header body, appending the sentinel,
/// and writes it to `stream`.
pub async fn write_header<W, T>(stream: &mut W, value: &T) -> Result<(), RelayError>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let mut bytes = serde_json::to_vec(value)?;
    bytes.extend_from_slice(END_OF_HEADER);
    stream.write_all(&bytes).await?;
    Ok(())
}

/// Writes the `{"error":"bad request"}` header used when a peer's header
/// exceeds the size limit.
pub async fn write_bad_request<W>(stream: &mut W) -> Result<(), RelayError>
where
    W: AsyncWriteExt + Unpin,
{
    write_header(stream, &BadRequest { error: "bad request" }).await
}
