//! Gateway lifecycle
//!
//! A [`Gateway`] ties one tunnel session to one SOCKS5 listener. Callers
//! observe it through [`GatewayEvent`]s and control it through the
//! [`GatewayHandle`] returned by [`Gateway::start`].
//!
//! ```rust,ignore
//! use sshgate::gateway::Gateway;
//!
//! let gateway = Gateway::new(config);
//! let mut events = gateway.subscribe();
//! let handle = gateway.start().await?;
//! // ...
//! handle.stop().await;
//! ```

use crate::config::Config;
use crate::error::GatewayError;
use crate::socks::{RelayContext, SocksServer};
use crate::stats::{TrafficSnapshot, TrafficStats};
use crate::tunnel::{SshTunnel, Tunnel};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

/// Capacity of the lifecycle event channel
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Lifecycle signal emitted to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// The SOCKS5 listener is accepting clients
    Started {
        /// Address the listener is bound to
        local_addr: SocketAddr,
    },
    /// The gateway is fully stopped; emitted exactly once per started gateway
    Stopped,
    /// Start failed, or a running gateway failed
    ConnectionFailed {
        /// Human readable cause
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum GatewayState {
    Running,
    Stopped { failure: Option<String> },
}

/// Gateway builder
pub struct Gateway {
    config: Config,
    events: broadcast::Sender<GatewayEvent>,
}

impl Gateway {
    /// Create a gateway for the given configuration
    pub fn new(config: Config) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Gateway { config, events }
    }

    /// Subscribe to lifecycle events, including those of the upcoming start
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    /// Connect the SSH tunnel session and start serving
    pub async fn start(self) -> Result<GatewayHandle<SshTunnel>, GatewayError> {
        if let Err(reason) = self.config.validate() {
            return Err(self.fail(GatewayError::Config(reason)));
        }

        info!("Connecting to {}", self.config.tunnel.server_addr());

        match SshTunnel::connect(&self.config.tunnel).await {
            Ok(tunnel) => self.with_tunnel(tunnel).await,
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Start serving over an already established tunnel session
    pub async fn with_tunnel<T: Tunnel>(self, tunnel: T) -> Result<GatewayHandle<T>, GatewayError> {
        let tunnel = Arc::new(tunnel);
        let ctx = Arc::new(RelayContext {
            tunnel: tunnel.clone(),
            socks: self.config.socks.clone(),
            udpgw: self.config.udpgw.clone(),
            stats: Arc::new(TrafficStats::new()),
            tracker: TaskTracker::new(),
            token: CancellationToken::new(),
        });

        let server = match SocksServer::bind(ctx.clone()) {
            Ok(server) => server,
            Err(e) => {
                tunnel.close().await;
                return Err(self.fail(e));
            }
        };
        let local_addr = server.local_addr();

        let (state, _) = watch::channel(GatewayState::Running);
        let inner = Arc::new(GatewayInner {
            ctx,
            events: self.events,
            local_addr,
            stopping: AtomicBool::new(false),
            state,
            server_task: Mutex::new(None),
        });

        info!("Gateway started on {}", local_addr);
        let _ = inner.events.send(GatewayEvent::Started { local_addr });

        let server_inner = inner.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Gateway failed: {}", e);
                server_inner.shutdown(Some(e.to_string())).await;
            }
        });
        *inner.server_task.lock().await = Some(task);

        Ok(GatewayHandle { inner })
    }

    fn fail(&self, error: GatewayError) -> GatewayError {
        error!("Failed to start gateway: {}", error);
        let _ = self.events.send(GatewayEvent::ConnectionFailed {
            reason: error.to_string(),
        });
        error
    }
}

struct GatewayInner<T> {
    ctx: Arc<RelayContext<T>>,
    events: broadcast::Sender<GatewayEvent>,
    local_addr: SocketAddr,
    stopping: AtomicBool,
    state: watch::Sender<GatewayState>,
    server_task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Tunnel> GatewayInner<T> {
    /// Full teardown; concurrent callers wait for the first one to finish
    async fn shutdown(&self, failure: Option<String>) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            self.stopped().await;
            return;
        }

        info!("Stopping gateway on {}", self.local_addr);

        self.ctx.token.cancel();
        self.ctx.tracker.close();
        self.ctx.tunnel.close().await;
        self.ctx.tracker.wait().await;

        if let Some(reason) = &failure {
            let _ = self.events.send(GatewayEvent::ConnectionFailed {
                reason: reason.clone(),
            });
        }
        let _ = self.events.send(GatewayEvent::Stopped);

        info!("Gateway stopped");
        self.state.send_replace(GatewayState::Stopped { failure });
    }

    /// Failure reason once stopped, `None` for a clean stop
    async fn stopped(&self) -> Option<String> {
        let mut state = self.state.subscribe();
        let stopped = state
            .wait_for(|state| matches!(state, GatewayState::Stopped { .. }))
            .await;

        match stopped.as_deref() {
            Ok(GatewayState::Stopped { failure }) => failure.clone(),
            _ => None,
        }
    }
}

/// Control handle of a running gateway
pub struct GatewayHandle<T> {
    inner: Arc<GatewayInner<T>>,
}

impl<T> Clone for GatewayHandle<T> {
    fn clone(&self) -> Self {
        GatewayHandle {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for GatewayHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayHandle")
            .field("local_addr", &self.inner.local_addr)
            .field("stopping", &self.inner.stopping.load(Ordering::Acquire))
            .finish()
    }
}

impl<T: Tunnel> GatewayHandle<T> {
    /// Subscribe to further lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.events.subscribe()
    }

    /// Current traffic counters
    pub fn stats(&self) -> TrafficSnapshot {
        self.inner.ctx.stats.snapshot()
    }

    /// Address of the SOCKS5 listener
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Number of live client, relay and pump tasks
    pub fn active_tasks(&self) -> usize {
        self.inner.ctx.tracker.len()
    }

    /// Whether the gateway has stopped or is stopping
    pub fn is_stopped(&self) -> bool {
        self.inner.stopping.load(Ordering::Acquire)
    }

    /// Stop the gateway and wait until every task has finished
    ///
    /// Safe to call any number of times, also after an internal failure.
    pub async fn stop(&self) {
        self.inner.shutdown(None).await;

        let task = self.inner.server_task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Wait until the gateway stops for any reason
    ///
    /// Returns the failure when it stopped because of an error.
    pub async fn wait(&self) -> Result<(), GatewayError> {
        match self.inner.stopped().await {
            Some(reason) => Err(GatewayError::Stream(reason)),
            None => Ok(()),
        }
    }
}

/// Run a gateway until the shutdown signal or a fatal failure
pub async fn run_gateway(
    config: Config,
    mut shutdown_rx: broadcast::Receiver<bool>,
) -> anyhow::Result<()> {
    let handle = Gateway::new(config).start().await?;

    tokio::select! {
        result = handle.wait() => {
            result?;
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received, stopping gateway");
            handle.stop().await;
        }
    }

    Ok(())
}
