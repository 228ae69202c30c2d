//! Peeked connection
//!
//! A stream wrapper that owns the bytes already consumed for protocol
//! detection and hands them back, in order, before any further bytes are read
//! from the underlying stream. Writes and shutdown go straight through.

use bytes::{Buf, Bytes, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::common::{Result, SelectorError};

/// Stream that replays a sniffed prefix before reading from `inner`
#[derive(Debug)]
pub struct PeekedStream<S> {
    inner: S,
    /// Everything that was sniffed, kept for routing and diagnostics
    header: Bytes,
    /// Not yet replayed part of `header`; advancing it is the read cursor
    pending: Bytes,
}

impl<S> PeekedStream<S> {
    /// Wrap a stream whose first bytes were already consumed
    ///
    /// # Parameters
    ///
    /// * `inner` - Underlying stream, positioned right after `header`
    /// * `header` - Bytes consumed from `inner`
    pub fn new(inner: S, header: impl Into<Bytes>) -> Self {
        let header = header.into();
        Self {
            inner,
            pending: header.clone(),
            header,
        }
    }

    /// The sniffed prefix, regardless of how much of it was replayed
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Part of the prefix that reads have not returned yet
    pub fn buffered(&self) -> &[u8] {
        &self.pending
    }

    /// Reference to the underlying stream
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Mutable reference to the underlying stream
    ///
    /// Reading from it directly skips the buffered prefix.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Split into the underlying stream and the not yet replayed prefix
    pub fn into_parts(self) -> (S, Bytes) {
        (self.inner, self.pending)
    }
}

impl<S> PeekedStream<S>
where
    S: AsyncRead + Unpin,
{
    /// Read exactly `header_size` bytes from `stream` and wrap it
    ///
    /// Short reads are retried until the prefix is complete. The stream is
    /// dropped, and so closed, if the client disconnects first, the read fails
    /// or `limit` elapses.
    ///
    /// # Parameters
    ///
    /// * `stream` - Freshly accepted stream
    /// * `header_size` - Number of bytes to sniff
    /// * `limit` - Optional upper bound on how long the client may take
    pub async fn read_prefix(mut stream: S, header_size: usize, limit: Option<Duration>) -> Result<Self> {
        let mut header = BytesMut::zeroed(header_size);

        match limit {
            Some(limit) => {
                timeout(limit, stream.read_exact(&mut header))
                    .await
                    .map_err(|_| SelectorError::PeekTimeout(limit))??;
            }
            None => {
                stream.read_exact(&mut header).await?;
            }
        }

        Ok(Self::new(stream, header.freeze()))
    }
}

impl PeekedStream<TcpStream> {
    /// Remote address of the connection
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    /// Local address of the connection
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Set `TCP_NODELAY` on the connection
    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        self.inner.set_nodelay(nodelay)
    }
}

impl<S> AsyncRead for PeekedStream<S>
where
    S: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.pending.has_remaining() && buf.remaining() > 0 {
            let n = this.pending.len().min(buf.remaining());
            buf.put_slice(&this.pending[..n]);
            this.pending.advance(n);
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S> AsyncWrite for PeekedStream<S>
where
    S: AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}
