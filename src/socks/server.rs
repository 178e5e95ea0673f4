//! SOCKS5 listener and accept loop

use crate::config::{SocksConfig, UdpGwConfig};
use crate::error::GatewayError;
use crate::socks::handler::handle_client;
use crate::stats::TrafficStats;
use crate::tunnel::Tunnel;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// How often the accept loop checks that the tunnel session is still alive
pub const TUNNEL_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Pause after a failed accept
const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(50);

/// Everything a relay needs, shared by all connections of one gateway
pub struct RelayContext<T> {
    /// Tunnel session channels are opened on
    pub tunnel: Arc<T>,
    /// SOCKS5 settings
    pub socks: SocksConfig,
    /// UDP gateway settings
    pub udpgw: UdpGwConfig,
    /// Aggregate traffic counters
    pub stats: Arc<TrafficStats>,
    /// Every task spawned for a client is tracked here
    pub tracker: TaskTracker,
    /// Cancelled when the gateway stops
    pub token: CancellationToken,
}

/// Local SOCKS5 server
pub struct SocksServer<T> {
    listener: TcpListener,
    local_addr: SocketAddr,
    ctx: Arc<RelayContext<T>>,
}

impl<T: Tunnel> SocksServer<T> {
    /// Bind the listening socket
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(ctx: Arc<RelayContext<T>>) -> Result<Self, GatewayError> {
        let addr = ctx.socks.bind_addr();

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| GatewayError::Network(format!("Failed to create socket: {}", e)))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| GatewayError::Network(format!("Failed to set SO_REUSEADDR: {}", e)))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| GatewayError::Network(format!("Failed to set non-blocking: {}", e)))?;
        socket.bind(&addr.into()).map_err(|e| {
            GatewayError::Network(format!("Failed to bind SOCKS5 listener to {}: {}", addr, e))
        })?;
        socket
            .listen(ctx.socks.backlog as i32)
            .map_err(|e| GatewayError::Network(format!("Failed to listen on {}: {}", addr, e)))?;

        let listener = TcpListener::from_std(socket.into())?;
        let local_addr = listener.local_addr()?;

        info!("SOCKS5 server listening on {}", local_addr);

        Ok(SocksServer {
            listener,
            local_addr,
            ctx,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept clients until cancelled
    ///
    /// Returns an error when the tunnel session dies underneath us.
    pub async fn run(self) -> Result<(), GatewayError> {
        let mut watchdog = tokio::time::interval(TUNNEL_CHECK_INTERVAL);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.ctx.token.cancelled() => {
                    info!("SOCKS5 server on {} shutting down", self.local_addr);
                    return Ok(());
                }
                _ = watchdog.tick() => {
                    if self.ctx.tunnel.is_closed() {
                        error!("Tunnel session closed, stopping SOCKS5 server");
                        return Err(GatewayError::Stream("tunnel session closed".to_string()));
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_client(stream, peer),
                    Err(e) => {
                        warn!("SOCKS5 accept error: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_DELAY).await;
                    }
                },
            }
        }
    }

    fn spawn_client(&self, stream: TcpStream, peer: SocketAddr) {
        debug!("Accepted SOCKS5 client {}", peer);

        if let Err(e) = stream.set_nodelay(self.ctx.socks.nodelay) {
            debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        let bind_ip = stream
            .local_addr()
            .map(|addr| addr.ip())
            .unwrap_or_else(|_| self.local_addr.ip());

        let ctx = self.ctx.clone();
        self.ctx.tracker.spawn(async move {
            tokio::select! {
                _ = ctx.token.cancelled() => {}
                result = handle_client(stream, bind_ip, &ctx) => {
                    if let Err(e) = result {
                        debug!("SOCKS5 connection from {} ended: {:#}", peer, e);
                    }
                }
            }
        });
    }
}
