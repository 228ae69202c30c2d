//! Virtual listener
//!
//! A listener-shaped object that is not bound to a socket of its own. The
//! selector pushes routed connections into its queue; the protocol server
//! that owns it pulls them out with `accept`, exactly as it would from a
//! `TcpListener`.

use bytes::Bytes;
use futures::stream::{self, Stream};
use log::trace;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use super::peeked::PeekedStream;
use crate::common::{Result, SelectorError};

/// Connection handed out by a virtual listener
pub type Connection = PeekedStream<TcpStream>;

/// What a protocol server needs from a listener
///
/// Implemented by `VirtualListener` and by `tokio::net::TcpListener`, so an
/// accept loop written against this trait runs unchanged on a shared port or
/// on a dedicated one.
pub trait StreamListener: Send + Sync {
    /// Stream type produced by `accept`
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next connection
    fn accept(&self) -> impl Future<Output = Result<(Self::Stream, SocketAddr)>> + Send;

    /// Address the listener is reachable on
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Stop accepting connections
    ///
    /// Must not fail and must be safe to call more than once.
    fn close(&self);
}

/// Reason a connection could not be queued; the connection is handed back
pub(crate) enum PushError {
    /// Listener was closed
    Closed(Connection),
    /// Queue is at capacity
    Full(Connection),
}

struct QueueState {
    queue: VecDeque<(Connection, SocketAddr)>,
    closed: bool,
}

struct ListenerInner {
    /// `None` for the default listener; diagnostics only
    key: Option<Bytes>,
    local_addr: SocketAddr,
    capacity: Option<usize>,
    state: Mutex<QueueState>,
    notify: Notify,
}

/// Listener fed by a `Selector` instead of the operating system
///
/// Cloning is cheap; all clones share one queue.
#[derive(Clone)]
pub struct VirtualListener {
    inner: Arc<ListenerInner>,
}

impl VirtualListener {
    pub(crate) fn new(key: Option<Bytes>, local_addr: SocketAddr, capacity: Option<usize>) -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                key,
                local_addr,
                capacity,
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    closed: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        // Nothing panics while holding the lock, but never let poisoning wedge accept
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for the next routed connection
    ///
    /// Connections queued before `close` are still handed out. Once the queue
    /// is empty and the listener is closed, this returns
    /// `SelectorError::ListenerClosed`.
    ///
    /// # Returns
    ///
    /// Returns the connection, with its prefix replayed, and the peer address
    pub async fn accept(&self) -> Result<(Connection, SocketAddr)> {
        loop {
            // Register interest before looking at the queue so a push or close
            // that lands in between still wakes us.
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if let Some(entry) = state.queue.pop_front() {
                    return Ok(entry);
                }
                if state.closed {
                    return Err(SelectorError::ListenerClosed);
                }
            }

            notified.await;
        }
    }

    /// Stream of accepted connections, ending when the listener is closed
    pub fn incoming(&self) -> impl Stream<Item = Result<(Connection, SocketAddr)>> + Send + 'static {
        stream::unfold(self.clone(), |listener| async move {
            match listener.accept().await {
                Ok(conn) => Some((Ok(conn), listener)),
                Err(SelectorError::ListenerClosed) => None,
                Err(e) => Some((Err(e), listener)),
            }
        })
    }

    /// Close the listener
    ///
    /// Idempotent. Wakes every pending `accept`; no further connections are
    /// queued.
    ///
    /// # Returns
    ///
    /// Returns `true` if this call closed the listener
    pub fn close(&self) -> bool {
        let newly_closed = {
            let mut state = self.state();
            !std::mem::replace(&mut state.closed, true)
        };

        if newly_closed {
            trace!("Closed virtual listener {}", self);
            self.inner.notify.notify_waiters();
        }
        newly_closed
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Address of the selector's real listener
    ///
    /// Every virtual listener of one selector reports the same address.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Key this listener was registered with, `None` for the default listener
    pub fn key(&self) -> Option<&[u8]> {
        self.inner.key.as_deref()
    }

    /// Whether this is the catch-all listener
    pub fn is_default(&self) -> bool {
        self.inner.key.is_none()
    }

    /// Number of connections waiting to be accepted
    pub fn pending(&self) -> usize {
        self.state().queue.len()
    }

    /// Queue a routed connection
    pub(crate) fn push(&self, conn: Connection, peer: SocketAddr) -> std::result::Result<(), PushError> {
        {
            let mut state = self.state();
            if state.closed {
                return Err(PushError::Closed(conn));
            }
            if let Some(capacity) = self.inner.capacity {
                if state.queue.len() >= capacity {
                    return Err(PushError::Full(conn));
                }
            }
            state.queue.push_back((conn, peer));
        }

        self.inner.notify.notify_one();
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn same_as(&self, other: &VirtualListener) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Display for VirtualListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.key {
            Some(key) => write!(f, "{:?}@{}", String::from_utf8_lossy(key), self.inner.local_addr),
            None => write!(f, "default@{}", self.inner.local_addr),
        }
    }
}

impl fmt::Debug for VirtualListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualListener")
            .field("key", &self.inner.key)
            .field("local_addr", &self.inner.local_addr)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl StreamListener for VirtualListener {
    type Stream = Connection;

    async fn accept(&self) -> Result<(Connection, SocketAddr)> {
        VirtualListener::accept(self).await
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(VirtualListener::local_addr(self))
    }

    fn close(&self) {
        VirtualListener::close(self);
    }
}

impl StreamListener for TcpListener {
    type Stream = TcpStream;

    async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        Ok(TcpListener::accept(self).await?)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(TcpListener::local_addr(self)?)
    }

    /// No-op: the socket is released when the listener is dropped
    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn connection_with(payload: &'static [u8], header_size: usize) -> (Connection, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let mut client = TcpStream::connect(addr).await.unwrap();
            client.write_all(payload).await.unwrap();
        });

        let (server, peer) = listener.accept().await.unwrap();
        let conn = PeekedStream::read_prefix(server, header_size, None).await.unwrap();
        (conn, peer)
    }

    fn listener(key: Option<&'static [u8]>, capacity: Option<usize>) -> VirtualListener {
        VirtualListener::new(
            key.map(Bytes::from_static),
            "127.0.0.1:7000".parse().unwrap(),
            capacity,
        )
    }

    #[tokio::test]
    async fn test_accept_returns_pushed_connection() {
        let vl = listener(Some(b"PRPC"), None);
        let (conn, peer) = connection_with(b"PRPCdata", 4).await;
        assert!(vl.push(conn, peer).is_ok());
        assert_eq!(vl.pending(), 1);

        let (mut conn, got_peer) = vl.accept().await.unwrap();
        assert_eq!(got_peer, peer);
        let mut buf = [0u8; 8];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PRPCdata");
        assert_eq!(vl.pending(), 0);
    }

    #[tokio::test]
    async fn test_accept_blocks_until_push() {
        let vl = listener(Some(b"PRPC"), None);

        let waiter = {
            let vl = vl.clone();
            tokio::spawn(async move { vl.accept().await.map(|(conn, _)| conn.header().to_vec()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        let (conn, peer) = connection_with(b"PRPC", 4).await;
        assert!(vl.push(conn, peer).is_ok());

        let header = waiter.await.unwrap().unwrap();
        assert_eq!(header, b"PRPC");
    }

    #[tokio::test]
    async fn test_close_wakes_all_pending_accepts() {
        let vl = listener(None, None);

        let mut waiters = Vec::new();
        for _ in 0..4 {
            let vl = vl.clone();
            waiters.push(tokio::spawn(async move { vl.accept().await }));
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(vl.close());
        assert!(!vl.close(), "second close is a no-op");

        for waiter in waiters {
            let result = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("accept should wake up on close")
                .unwrap();
            assert!(matches!(result, Err(SelectorError::ListenerClosed)));
        }

        assert!(matches!(vl.accept().await, Err(SelectorError::ListenerClosed)));
    }

    #[tokio::test]
    async fn test_queued_connection_survives_close() {
        let vl = listener(Some(b"XML"), None);
        let (conn, peer) = connection_with(b"XMLhello", 3).await;
        assert!(vl.push(conn, peer).is_ok());

        vl.close();

        let (conn, _) = vl.accept().await.unwrap();
        assert_eq!(conn.header(), b"XML");
        assert!(matches!(vl.accept().await, Err(SelectorError::ListenerClosed)));
    }

    #[tokio::test]
    async fn test_push_after_close_is_refused() {
        let vl = listener(Some(b"XML"), None);
        vl.close();

        let (conn, peer) = connection_with(b"XMLhello", 3).await;
        assert!(matches!(vl.push(conn, peer), Err(PushError::Closed(_))));
        assert_eq!(vl.pending(), 0);
    }

    fn shut<L: StreamListener>(listener: &L) {
        listener.close();
        listener.close();
    }

    #[tokio::test]
    async fn test_close_through_trait() {
        let vl = listener(Some(b"PRPC"), None);
        let waiting = {
            let vl = vl.clone();
            tokio::spawn(async move { StreamListener::accept(&vl).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        shut(&vl);
        assert!(vl.is_closed());
        let err = tokio::time::timeout(Duration::from_secs(5), waiting)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(err.is_closed());

        let (conn, peer) = connection_with(b"PRPCdata", 4).await;
        assert!(matches!(vl.push(conn, peer), Err(PushError::Closed(_))));
        assert_eq!(vl.pending(), 0);
    }

    #[tokio::test]
    async fn test_bounded_queue() {
        let vl = listener(Some(b"XML"), Some(1));

        let (first, peer) = connection_with(b"XML1", 3).await;
        assert!(vl.push(first, peer).is_ok());

        let (second, peer) = connection_with(b"XML2", 3).await;
        assert!(matches!(vl.push(second, peer), Err(PushError::Full(_))));
    }

    #[tokio::test]
    async fn test_incoming_stream_ends_on_close() {
        let vl = listener(Some(b"XML"), None);
        let (conn, peer) = connection_with(b"XMLhello", 3).await;
        assert!(vl.push(conn, peer).is_ok());

        let mut incoming = Box::pin(vl.incoming());
        let first = incoming.next().await.unwrap().unwrap();
        assert_eq!(first.0.header(), b"XML");

        vl.close();
        assert!(incoming.next().await.is_none());
    }

    #[test]
    fn test_metadata() {
        let keyed = listener(Some(b"PRPC"), None);
        assert_eq!(keyed.key(), Some(&b"PRPC"[..]));
        assert!(!keyed.is_default());
        assert_eq!(keyed.to_string(), "\"PRPC\"@127.0.0.1:7000");

        let default = listener(None, None);
        assert!(default.is_default());
        assert_eq!(default.local_addr(), keyed.local_addr());
        assert!(!default.same_as(&keyed));
        assert!(default.same_as(&default.clone()));
    }
}
