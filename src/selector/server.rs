//! Selector server
//!
//! Owns the real listening socket, runs the accept loop and routes every
//! accepted connection to exactly one virtual listener, based on the first
//! `header_size` bytes the client sends.

use bytes::Bytes;
use log::{debug, error, info, trace, warn};
use metrics::counter;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::listener::{PushError, StreamListener, VirtualListener};
use super::peeked::PeekedStream;
use super::registry::Registry;
use crate::common::net::{bind_listener, resolve_listen_addr, split_host_port};
use crate::common::{Network, Result, SelectorError};
use crate::config::{defaults, SelectorConfig};
use crate::protocol::MatchRule;

/// Tunables that do not change what gets routed where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorOptions {
    /// Upper bound on how long a client may take to send its prefix
    pub peek_timeout: Option<Duration>,
    /// Maximum queued connections per virtual listener, `None` for unbounded
    pub queue_capacity: Option<usize>,
    /// Listen backlog of the real socket when the selector binds it
    pub listen_backlog: u32,
}

impl Default for SelectorOptions {
    fn default() -> Self {
        Self {
            peek_timeout: Some(Duration::from_millis(defaults::peek_timeout_ms())),
            queue_capacity: Some(defaults::queue_capacity()),
            listen_backlog: defaults::listen_backlog(),
        }
    }
}

impl From<&SelectorConfig> for SelectorOptions {
    fn from(config: &SelectorConfig) -> Self {
        Self {
            peek_timeout: config.peek_timeout(),
            queue_capacity: config.queue_capacity(),
            listen_backlog: config.listen_backlog,
        }
    }
}

/// Largest accepted `header_size`
///
/// The prefix buffer is allocated as soon as a connection is accepted, before
/// the client has sent anything.
pub const MAX_HEADER_SIZE: usize = 64 * 1024;

struct SelectorInner<L> {
    /// Taken by `serve`; dropping it closes the socket
    listener: Mutex<Option<L>>,
    local_addr: SocketAddr,
    header_size: usize,
    rule: Arc<dyn MatchRule>,
    registry: Mutex<Registry>,
    options: SelectorOptions,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

/// Protocol demultiplexer for one listening port
///
/// Cloning is cheap and every clone controls the same selector, so one task
/// can run `serve` while another registers listeners or calls `close`.
///
/// Connections come from a `TcpListener` unless another accept source is
/// handed to `from_listener`.
pub struct Selector<L = TcpListener> {
    inner: Arc<SelectorInner<L>>,
}

impl<L> Clone for Selector<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Accept errors that concern a single connection rather than the socket
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted
    )
}

impl Selector {
    /// Bind a new selector from a network kind, optional host and port
    ///
    /// # Parameters
    ///
    /// * `network` - `tcp`, `tcp4` or `tcp6`
    /// * `host` - Host name or address; `None` or empty binds all interfaces
    /// * `port` - Port to listen on, 0 for an ephemeral port
    /// * `header_size` - Number of prefix bytes inspected per connection
    /// * `rule` - Comparison between prefixes and registered keys
    pub async fn bind(
        network: &str,
        host: Option<&str>,
        port: u16,
        header_size: usize,
        rule: impl MatchRule + 'static,
    ) -> Result<Self> {
        Self::bind_with_options(network, host, port, header_size, rule, SelectorOptions::default()).await
    }

    /// Bind a new selector from a network kind and a `host:port` address
    ///
    /// `:port` and `[v6addr]:port` are accepted as well.
    pub async fn bind_address(
        network: &str,
        address: &str,
        header_size: usize,
        rule: impl MatchRule + 'static,
    ) -> Result<Self> {
        let (host, port) = split_host_port(address)?;
        Self::bind(network, host.as_deref(), port, header_size, rule).await
    }

    /// Same as `bind`, with explicit options
    pub async fn bind_with_options(
        network: &str,
        host: Option<&str>,
        port: u16,
        header_size: usize,
        rule: impl MatchRule + 'static,
        options: SelectorOptions,
    ) -> Result<Self> {
        Self::bind_network(network.parse()?, host, port, header_size, rule, options).await
    }

    async fn bind_network(
        network: Network,
        host: Option<&str>,
        port: u16,
        header_size: usize,
        rule: impl MatchRule + 'static,
        options: SelectorOptions,
    ) -> Result<Self> {
        check_header_size(header_size)?;
        let addr = resolve_listen_addr(network, host, port).await?;
        let listener = bind_listener(addr, network, options.listen_backlog)?;

        Self::from_listener_with_options(listener, header_size, rule, options)
    }

    /// Build a selector around an already bound standard library listener
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_std(
        listener: std::net::TcpListener,
        header_size: usize,
        rule: impl MatchRule + 'static,
    ) -> Result<Self> {
        listener.set_nonblocking(true)?;
        Self::from_listener(TcpListener::from_std(listener)?, header_size, rule)
    }

    /// Bind a selector as described by a configuration
    ///
    /// Routes in the configuration are not registered; that is up to the caller.
    pub async fn from_config(config: &SelectorConfig) -> Result<Self> {
        Self::bind_network(
            config.network,
            config.host.as_deref(),
            config.port,
            config.header_size,
            config.match_mode,
            SelectorOptions::from(config),
        )
        .await
    }

}

impl<L> Selector<L>
where
    L: StreamListener<Stream = TcpStream> + 'static,
{
    /// Build a selector around an already bound listener
    ///
    /// The selector takes ownership of the listener. Any `StreamListener`
    /// producing `TcpStream`s will do; `serve` stops on its first error that
    /// is not about a single connection.
    pub fn from_listener(listener: L, header_size: usize, rule: impl MatchRule + 'static) -> Result<Self> {
        Self::from_listener_with_options(listener, header_size, rule, SelectorOptions::default())
    }

    /// Same as `from_listener`, with explicit options
    pub fn from_listener_with_options(
        listener: L,
        header_size: usize,
        rule: impl MatchRule + 'static,
        options: SelectorOptions,
    ) -> Result<Self> {
        check_header_size(header_size)?;
        let local_addr = listener.local_addr()?;
        let (shutdown, _) = watch::channel(false);

        debug!(
            "Selector created on {} (header size {}, match mode {})",
            local_addr,
            header_size,
            rule.name()
        );

        Ok(Self {
            inner: Arc::new(SelectorInner {
                listener: Mutex::new(Some(listener)),
                local_addr,
                header_size,
                rule: Arc::new(rule),
                registry: Mutex::new(Registry::default()),
                options,
                closed: AtomicBool::new(false),
                shutdown,
            }),
        })
    }

    /// Register a virtual listener for a protocol key
    ///
    /// Registering after `serve` has started is allowed, but connections that
    /// arrive before the call returns may still go to the default listener.
    ///
    /// # Errors
    ///
    /// Fails if the key is empty, longer than the header size, rejected by the
    /// match rule, already registered, or the selector is closed.
    pub fn register_listener(&self, key: impl AsRef<[u8]>) -> Result<VirtualListener> {
        let key = key.as_ref();
        self.validate_key(key)?;

        let key = Bytes::copy_from_slice(key);
        let listener = VirtualListener::new(Some(key.clone()), self.inner.local_addr, self.inner.options.queue_capacity);

        {
            let mut registry = lock(&self.inner.registry);
            // Checked under the registry lock so close() cannot slip in between
            if self.is_closed() {
                return Err(SelectorError::SelectorClosed);
            }
            registry.insert(key, listener.clone())?;
        }

        info!("Registered listener {}", listener);
        Ok(listener)
    }

    /// Register the catch-all listener for prefixes that match no key
    ///
    /// # Errors
    ///
    /// Fails if a default listener already exists or the selector is closed.
    pub fn register_default_listener(&self) -> Result<VirtualListener> {
        let listener = VirtualListener::new(None, self.inner.local_addr, self.inner.options.queue_capacity);

        {
            let mut registry = lock(&self.inner.registry);
            if self.is_closed() {
                return Err(SelectorError::SelectorClosed);
            }
            registry.set_default(listener.clone())?;
        }

        info!("Registered listener {}", listener);
        Ok(listener)
    }

    /// Remove and close the listener registered for `key`
    pub fn unregister_listener(&self, key: impl AsRef<[u8]>) -> Result<()> {
        let listener = lock(&self.inner.registry).remove(key.as_ref())?;
        listener.close();
        info!("Unregistered listener {}", listener);
        Ok(())
    }

    /// Remove and close the default listener
    ///
    /// # Returns
    ///
    /// Returns `true` if a default listener was registered
    pub fn unregister_default_listener(&self) -> bool {
        match lock(&self.inner.registry).take_default() {
            Some(listener) => {
                listener.close();
                info!("Unregistered listener {}", listener);
                true
            }
            None => false,
        }
    }

    /// Keys currently registered, in registration order
    pub fn registered_keys(&self) -> Vec<Bytes> {
        lock(&self.inner.registry).keys()
    }

    /// Run the accept loop
    ///
    /// Returns `Ok(())` once `close` is called. Any other failure of the real
    /// listener closes the selector, unblocking every virtual listener, and is
    /// returned as `SelectorError::Accept`.
    pub async fn serve(&self) -> Result<()> {
        let listener = match lock(&self.inner.listener).take() {
            Some(listener) => listener,
            None if self.is_closed() => return Ok(()),
            None => return Err(SelectorError::AlreadyServing),
        };

        let mut shutdown = self.inner.shutdown.subscribe();
        if self.is_closed() {
            return Ok(());
        }

        info!("Selector serving on {}", self.inner.local_addr);

        let mut tasks = JoinSet::new();

        let result = loop {
            // Reap finished workers so the set does not grow without bound
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!("Routing task panicked: {}", e);
                    }
                }
            }

            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    debug!("Selector on {} received shutdown", self.inner.local_addr);
                    break Ok(());
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        counter!("selector.connections.accepted").increment(1);
                        trace!("Accepted connection from {}", peer);
                        tasks.spawn(route_connection(Arc::clone(&self.inner), stream, peer));
                    }
                    Err(SelectorError::Io(e)) if is_connection_error(&e) => {
                        warn!("Dropped connection during accept: {}", e);
                    }
                    Err(SelectorError::Io(e)) => {
                        error!("Error accepting connection on {}: {}", self.inner.local_addr, e);
                        break Err(SelectorError::Accept(e));
                    }
                    Err(e) => {
                        error!("Error accepting connection on {}: {}", self.inner.local_addr, e);
                        break Err(e);
                    }
                }
            }
        };

        listener.close();
        drop(listener);
        self.close();

        // Workers still peeking only hold raw connections; aborting drops them
        tasks.shutdown().await;

        info!("Selector on {} stopped", self.inner.local_addr);
        result
    }

    /// Close the selector
    ///
    /// Idempotent and safe to call from any task, including one handling a
    /// connection it got from this selector. Stops `serve`, closes the real
    /// listener and closes every registered virtual listener.
    ///
    /// Closing cannot fail, so there is no error to return. Socket errors
    /// from the real listener surface from `serve` instead.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.shutdown.send_replace(true);

        // Not serving yet: the socket is still parked here
        let parked = lock(&self.inner.listener).take();
        if let Some(listener) = parked {
            listener.close();
        }

        let listeners = lock(&self.inner.registry).drain();
        for listener in &listeners {
            listener.close();
        }

        info!(
            "Selector on {} closed ({} listeners)",
            self.inner.local_addr,
            listeners.len()
        );
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Address of the real listener
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Number of prefix bytes inspected per connection
    pub fn header_size(&self) -> usize {
        self.inner.header_size
    }

    /// Options this selector was built with
    pub fn options(&self) -> &SelectorOptions {
        &self.inner.options
    }

    fn validate_key(&self, key: &[u8]) -> Result<()> {
        let header_size = self.inner.header_size;
        let reason = if key.is_empty() {
            Some("keys must not be empty".to_string())
        } else if key.len() > header_size {
            Some(format!("longer than the header size of {}", header_size))
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(SelectorError::InvalidKeyLength {
                key: String::from_utf8_lossy(key).into_owned(),
                len: key.len(),
                reason,
            });
        }

        self.inner.rule.validate_key(key, header_size)
    }
}

impl<L> std::fmt::Debug for Selector<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("local_addr", &self.inner.local_addr)
            .field("header_size", &self.inner.header_size)
            .field("rule", &self.inner.rule)
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}

fn check_header_size(header_size: usize) -> Result<()> {
    if header_size == 0 || header_size > MAX_HEADER_SIZE {
        return Err(SelectorError::InvalidHeaderSize(header_size));
    }
    Ok(())
}

/// Per-connection worker: peek, pick a listener, hand the connection over
///
/// Every failure path drops the raw stream, which closes it.
async fn route_connection<L>(inner: Arc<SelectorInner<L>>, stream: TcpStream, peer: SocketAddr) {
    let conn = match PeekedStream::read_prefix(stream, inner.header_size, inner.options.peek_timeout).await {
        Ok(conn) => conn,
        Err(e) => {
            counter!("selector.connections.peek_failed").increment(1);
            debug!("Closing connection from {}: failed to read prefix: {}", peer, e);
            return;
        }
    };

    let target = lock(&inner.registry).route(conn.header(), inner.rule.as_ref(), inner.header_size);

    let Some(listener) = target else {
        counter!("selector.connections.unroutable").increment(1);
        debug!(
            "Closing connection from {}: prefix {:02X?} matches no listener",
            peer,
            conn.header()
        );
        return;
    };

    match listener.push(conn, peer) {
        Ok(()) => {
            counter!("selector.connections.routed").increment(1);
            debug!("Routed connection from {} to {}", peer, listener);
        }
        Err(PushError::Closed(conn)) => {
            counter!("selector.connections.rejected").increment(1);
            debug!("Closing connection from {}: listener {} is closed", peer, listener);
            drop(conn);
        }
        Err(PushError::Full(conn)) => {
            counter!("selector.connections.rejected").increment(1);
            warn!("Closing connection from {}: listener {} queue is full", peer, listener);
            drop(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MatchMode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn selector(header_size: usize, mode: MatchMode) -> Selector {
        Selector::bind("tcp4", Some("127.0.0.1"), 0, header_size, mode)
            .await
            .unwrap()
    }

    fn spawn_serve(selector: &Selector) -> tokio::task::JoinHandle<Result<()>> {
        let selector = selector.clone();
        tokio::spawn(async move { selector.serve().await })
    }

    #[tokio::test]
    async fn test_zero_header_size_rejected() {
        let err = Selector::bind("tcp", Some("127.0.0.1"), 0, 0, MatchMode::Equal)
            .await
            .unwrap_err();
        assert!(matches!(err, SelectorError::InvalidHeaderSize(0)));
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_oversized_header_rejected() {
        for header_size in [MAX_HEADER_SIZE + 1, usize::MAX / 2] {
            let err = Selector::bind("tcp4", Some("127.0.0.1"), 0, header_size, MatchMode::Prefix)
                .await
                .unwrap_err();
            assert!(matches!(err, SelectorError::InvalidHeaderSize(n) if n == header_size));
            assert!(err.is_config());
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let err = Selector::from_listener(listener, MAX_HEADER_SIZE + 1, MatchMode::Prefix).unwrap_err();
        assert!(matches!(err, SelectorError::InvalidHeaderSize(_)));

        let largest = selector(MAX_HEADER_SIZE, MatchMode::Prefix).await;
        assert_eq!(largest.header_size(), MAX_HEADER_SIZE);
    }

    #[tokio::test]
    async fn test_unknown_network_rejected() {
        let err = Selector::bind("udp", None, 0, 4, MatchMode::Equal).await.unwrap_err();
        assert!(matches!(err, SelectorError::UnsupportedNetwork(_)));
    }

    #[tokio::test]
    async fn test_bind_address() {
        let selector = Selector::bind_address("tcp", "127.0.0.1:0", 4, MatchMode::Equal)
            .await
            .unwrap();
        assert!(selector.local_addr().ip().is_loopback());
        assert_ne!(selector.local_addr().port(), 0);
        assert_eq!(selector.header_size(), 4);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let selector = selector(4, MatchMode::Equal).await;

        assert!(selector.register_listener("PRPC").is_ok());
        assert!(matches!(
            selector.register_listener("PRPC"),
            Err(SelectorError::DuplicateKey(_))
        ));
        assert!(matches!(
            selector.register_listener("TOOLONG"),
            Err(SelectorError::InvalidKeyLength { len: 7, .. })
        ));
        assert!(matches!(
            selector.register_listener(""),
            Err(SelectorError::InvalidKeyLength { len: 0, .. })
        ));
        // Equal mode also rejects short keys: they could never match
        assert!(matches!(
            selector.register_listener("GE"),
            Err(SelectorError::InvalidKeyLength { len: 2, .. })
        ));

        assert!(selector.register_default_listener().is_ok());
        assert!(matches!(
            selector.register_default_listener(),
            Err(SelectorError::DuplicateDefault)
        ));

        assert_eq!(selector.registered_keys(), vec![Bytes::from_static(b"PRPC")]);
    }

    #[tokio::test]
    async fn test_prefix_mode_allows_short_keys() {
        let selector = selector(4, MatchMode::Prefix).await;
        assert!(selector.register_listener("GE").is_ok());
    }

    #[tokio::test]
    async fn test_route_by_prefix() {
        let selector = selector(4, MatchMode::Equal).await;
        let prpc = selector.register_listener("PRPC").unwrap();
        let default = selector.register_default_listener().unwrap();
        let serve = spawn_serve(&selector);

        let addr = selector.local_addr();
        let mut rpc_client = TcpStream::connect(addr).await.unwrap();
        rpc_client.write_all(b"PRPC\x00\x01").await.unwrap();
        let mut http_client = TcpStream::connect(addr).await.unwrap();
        http_client.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();

        let (mut conn, _) = prpc.accept().await.unwrap();
        let mut buf = [0u8; 6];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PRPC\x00\x01");

        let (mut conn, _) = default.accept().await.unwrap();
        let mut buf = [0u8; 5];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"GET /");

        selector.close();
        assert!(serve.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_unregister_closes_listener() {
        let selector = selector(4, MatchMode::Equal).await;
        let prpc = selector.register_listener("PRPC").unwrap();

        selector.unregister_listener("PRPC").unwrap();
        assert!(prpc.is_closed());
        assert!(matches!(
            selector.unregister_listener("PRPC"),
            Err(SelectorError::UnknownKey(_))
        ));
        // The key is free again
        assert!(selector.register_listener("PRPC").is_ok());

        assert!(!selector.unregister_default_listener());
        let default = selector.register_default_listener().unwrap();
        assert!(selector.unregister_default_listener());
        assert!(default.is_closed());
    }

    #[tokio::test]
    async fn test_close_before_serve() {
        let selector = selector(4, MatchMode::Equal).await;
        let prpc = selector.register_listener("PRPC").unwrap();

        selector.close();
        selector.close();

        assert!(selector.is_closed());
        assert!(prpc.is_closed());
        assert!(selector.serve().await.is_ok());
        assert!(matches!(
            selector.register_listener("ABCD"),
            Err(SelectorError::SelectorClosed)
        ));
        assert!(matches!(
            selector.register_default_listener(),
            Err(SelectorError::SelectorClosed)
        ));
    }

    #[tokio::test]
    async fn test_serve_twice() {
        let selector = selector(4, MatchMode::Equal).await;
        let serve = spawn_serve(&selector);

        // Give the first serve a chance to take the listener
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(selector.serve().await, Err(SelectorError::AlreadyServing)));

        selector.close();
        assert!(serve.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_from_std_listener() {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        let selector = Selector::from_std(std_listener, 3, MatchMode::Equal).unwrap();
        assert_eq!(selector.local_addr(), addr);
        assert!(format!("{:?}", selector).contains("header_size: 3"));
    }

    /// Accept source that fails with a fixed sequence of errors
    struct FailingListener {
        errors: Mutex<std::collections::VecDeque<io::ErrorKind>>,
        closed: Arc<AtomicBool>,
    }

    impl FailingListener {
        fn new(errors: &[io::ErrorKind]) -> (Self, Arc<AtomicBool>) {
            let closed = Arc::new(AtomicBool::new(false));
            let listener = Self {
                errors: Mutex::new(errors.iter().copied().collect()),
                closed: Arc::clone(&closed),
            };
            (listener, closed)
        }
    }

    impl StreamListener for FailingListener {
        type Stream = TcpStream;

        async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
            let next = lock(&self.errors).pop_front();
            match next {
                Some(kind) => Err(io::Error::from(kind).into()),
                None => std::future::pending().await,
            }
        }

        fn local_addr(&self) -> Result<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 0)))
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_fatal_accept_error_stops_serve() {
        let (failing, closed) =
            FailingListener::new(&[io::ErrorKind::ConnectionReset, io::ErrorKind::PermissionDenied]);
        let selector = Selector::from_listener(failing, 4, MatchMode::Equal).unwrap();
        let prpc = selector.register_listener("PRPC").unwrap();

        let blocked = {
            let prpc = prpc.clone();
            tokio::spawn(async move { prpc.accept().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The reset is skipped; the permission error ends the loop
        let result = tokio::time::timeout(Duration::from_secs(5), selector.serve())
            .await
            .unwrap();
        match result {
            Err(SelectorError::Accept(e)) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("Expected an accept error, got {:?}", other),
        }

        let err = tokio::time::timeout(Duration::from_secs(5), blocked)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, SelectorError::ListenerClosed));
        assert!(selector.is_closed());
        assert!(closed.load(Ordering::SeqCst));
        assert!(prpc.is_closed());
        assert!(selector.register_listener("NEXT").is_err());
    }

    #[tokio::test]
    async fn test_close_releases_parked_listener() {
        let (idle, closed) = FailingListener::new(&[]);
        let selector = Selector::from_listener(idle, 4, MatchMode::Equal).unwrap();
        selector.close();
        assert!(closed.load(Ordering::SeqCst));
        assert!(selector.serve().await.is_ok());
    }

    #[test]
    fn test_connection_error_classification() {
        assert!(is_connection_error(&io::Error::from(io::ErrorKind::ConnectionAborted)));
        assert!(is_connection_error(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!is_connection_error(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
