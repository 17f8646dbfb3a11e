//! A counting transport wrapper.
//!
//! The original implementation monkey-patched the transport's `write`
//! method to count bytes sent; here a thin [`AsyncWrite`] wrapper does the
//! same job without touching the underlying stream's internals.

use std::{
    pin::Pin,
    task::{Context, Poll},
};
use tokio::io::{AsyncWrite, Result as IoResult};

/// Wraps an [`AsyncWrite`], tallying every byte actually accepted by the
/// inner writer.
pub struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W> CountingWriter<W> {
    /// Wraps `inner`, starting the count at zero.
    pub fn new(inner: W) -> Self {
        CountingWriter { inner, written: 0 }
    }

    /// Total bytes accepted by the inner writer so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Unwraps, discarding the count.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for CountingWriter<W> {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<IoResult<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            self.written += *n as u64;
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<IoResult<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<IoResult<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn tallies_bytes_written() {
        let mut writer = CountingWriter::new(Vec::new());
        writer.write_all(b"hello").await.unwrap();
        writer.write_all(b" world").await.unwrap();

        assert_eq!(writer.bytes_written(), 11);
        assert_eq!(writer.into_inner(), b"hello world".to_vec());
    }
}
