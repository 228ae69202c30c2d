//! Gateway service implementation
//!
//! Binds a selector from configuration, registers one virtual listener per
//! route and forwards every routed connection to that route's backend.

use log::{debug, error, info, warn};
use metrics::counter;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::timeout;

use super::forwarder::proxy_data;
use crate::common::{Result, SelectorError};
use crate::config::SelectorConfig;
use crate::selector::{Selector, StreamListener, VirtualListener};

/// Settings shared by every forwarded connection
#[derive(Debug, Clone)]
pub struct ForwardOptions {
    /// Copy buffer size per direction
    pub buffer_size: usize,
    /// Backend connect timeout
    pub connect_timeout: Duration,
}

impl From<&SelectorConfig> for ForwardOptions {
    fn from(config: &SelectorConfig) -> Self {
        Self {
            buffer_size: config.buffer_size,
            connect_timeout: config.connection_timeout(),
        }
    }
}

struct GatewayRoute {
    listener: VirtualListener,
    target: String,
}

/// Protocol gateway
///
/// One port in front, one backend per protocol behind.
pub struct Gateway {
    selector: Selector,
    routes: Vec<GatewayRoute>,
    options: Arc<ForwardOptions>,
}

impl Gateway {
    /// Bind the selector and register every configured route
    ///
    /// The configuration should already be validated; registration repeats
    /// the key checks and fails on the first bad key.
    pub async fn new(config: &SelectorConfig) -> Result<Self> {
        let selector = Selector::from_config(config).await?;
        let mut routes = Vec::with_capacity(config.routes.len() + 1);

        for route in &config.routes {
            let listener = selector.register_listener(route.key.as_bytes())?;
            info!("Route {:?} -> {}", route.key, route.target);
            routes.push(GatewayRoute {
                listener,
                target: route.target.clone(),
            });
        }

        if let Some(target) = &config.default_target {
            let listener = selector.register_default_listener()?;
            info!("Default route -> {}", target);
            routes.push(GatewayRoute {
                listener,
                target: target.clone(),
            });
        }

        Ok(Self {
            selector,
            routes,
            options: Arc::new(ForwardOptions::from(config)),
        })
    }

    /// Selector in front of the gateway; closing it stops `run`
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Address the gateway is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.selector.local_addr()
    }

    /// Run until the selector is closed or its listener fails
    pub async fn run(self) -> Result<()> {
        info!(
            "Gateway listening on {} with {} route(s)",
            self.selector.local_addr(),
            self.routes.len()
        );

        let mut routes = JoinSet::new();
        for route in self.routes {
            routes.spawn(serve_route(route.listener, route.target, self.options.clone()));
        }

        let result = self.selector.serve().await;

        // serve() closes every virtual listener on the way out.
        while let Some(joined) = routes.join_next().await {
            if let Err(e) = joined {
                error!("Route task failed: {}", e);
            }
        }

        info!("Gateway stopped");
        result
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("selector", &self.selector)
            .field("routes", &self.routes.len())
            .field("options", &self.options)
            .finish()
    }
}

/// Accept loop forwarding one listener's connections to `target`
///
/// Written against `StreamListener`, so it serves a virtual listener or a
/// dedicated `TcpListener` alike. Returns once the listener is closed;
/// connections still being forwarded at that point are aborted.
pub async fn serve_route<L: StreamListener>(listener: L, target: String, options: Arc<ForwardOptions>) {
    let mut connections = JoinSet::new();

    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            Some(_) = connections.join_next(), if !connections.is_empty() => continue,
        };

        match accepted {
            Ok((stream, peer)) => {
                let target = target.clone();
                let options = options.clone();
                connections.spawn(async move {
                    if let Err(e) = forward_connection(stream, peer, &target, &options).await {
                        warn!("Connection from {} to {} failed: {}", peer, target, e);
                    }
                });
            }
            Err(e) if e.is_closed() => break,
            Err(e) => {
                warn!("Accept failed for route to {}: {}", target, e);
            }
        }
    }

    debug!(
        "Route to {} stopped, aborting {} active connection(s)",
        target,
        connections.len()
    );
    connections.shutdown().await;
}

async fn forward_connection<S>(stream: S, peer: SocketAddr, target: &str, options: &ForwardOptions) -> Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let backend = match timeout(options.connect_timeout, TcpStream::connect(target)).await {
        Ok(Ok(backend)) => backend,
        Ok(Err(e)) => {
            counter!("gateway.connections.failed").increment(1);
            return Err(SelectorError::Io(e));
        }
        Err(_) => {
            counter!("gateway.connections.failed").increment(1);
            return Err(SelectorError::Other(format!(
                "Timed out after {:?} connecting to {}",
                options.connect_timeout, target
            )));
        }
    };

    if let Err(e) = backend.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY towards {}: {}", target, e);
    }

    debug!("Forwarding {} to {}", peer, target);
    counter!("gateway.connections.forwarded").increment(1);
    proxy_data(stream, backend, options.buffer_size).await?;
    Ok(())
}
