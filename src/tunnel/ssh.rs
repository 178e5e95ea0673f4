//! russh-backed tunnel session

use super::handler::ClientHandler;
use super::{Tunnel, ORIGINATOR_ADDR};
use crate::config::TunnelConfig;
use crate::error::GatewayError;
use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::{ChannelStream, Disconnect};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One authenticated SSH session used to open `direct-tcpip` channels
pub struct SshTunnel {
    handle: Handle<ClientHandler>,
    server: String,
    closed: AtomicBool,
}

impl fmt::Debug for SshTunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshTunnel")
            .field("server", &self.server)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SshTunnel {
    /// Connect and authenticate with a password
    ///
    /// The whole exchange (TCP connect, key exchange, host key check and
    /// authentication) must finish within `config.connect_timeout`.
    pub async fn connect(config: &TunnelConfig) -> Result<Self, GatewayError> {
        let server = config.server_addr();
        let timeout = config.connect_timeout();

        info!("Connecting SSH tunnel to {}", server);

        tokio::time::timeout(timeout, Self::connect_inner(config, server.clone()))
            .await
            .map_err(|_| {
                GatewayError::Timeout(format!("SSH connect to {} after {:?}", server, timeout))
            })?
    }

    async fn connect_inner(config: &TunnelConfig, server: String) -> Result<Self, GatewayError> {
        let ssh_config = client::Config {
            keepalive_interval: config.keepalive_interval(),
            inactivity_timeout: None,
            ..Default::default()
        };

        let handler = ClientHandler::new(config.host_key.clone());

        let mut handle = client::connect(
            Arc::new(ssh_config),
            (config.host.as_str(), config.port),
            handler,
        )
        .await
        .map_err(|e| match e {
            russh::Error::UnknownKey => {
                GatewayError::Auth(format!("host key of {} rejected", server))
            }
            other => GatewayError::Network(format!("{}: {}", server, other)),
        })?;

        let auth = handle
            .authenticate_password(config.username.clone(), config.password.clone())
            .await
            .map_err(|e| GatewayError::Network(format!("authentication exchange: {}", e)))?;

        if !auth.success() {
            return Err(GatewayError::Auth(format!(
                "password rejected for user {}",
                config.username
            )));
        }

        info!("SSH tunnel established to {} as {}", server, config.username);

        Ok(Self {
            handle,
            server,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Tunnel for SshTunnel {
    type Channel = ChannelStream<Msg>;

    async fn open_channel(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Self::Channel, GatewayError> {
        if self.is_closed() {
            return Err(GatewayError::ChannelOpen("tunnel session is closed".to_string()));
        }

        let open = self.handle.channel_open_direct_tcpip(
            host.to_string(),
            u32::from(port),
            ORIGINATOR_ADDR,
            0,
        );

        let channel = match tokio::time::timeout(timeout, open).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(russh::Error::ChannelOpenFailure(reason))) => {
                return Err(GatewayError::ChannelRejected(format!(
                    "{}:{}: {:?}",
                    host, port, reason
                )));
            }
            Ok(Err(e)) => {
                return Err(GatewayError::ChannelOpen(format!("{}:{}: {}", host, port, e)));
            }
            Err(_) => {
                return Err(GatewayError::Timeout(format!(
                    "channel open to {}:{} after {:?}",
                    host, port, timeout
                )));
            }
        };

        debug!("Opened direct-tcpip channel to {}:{}", host, port);
        Ok(channel.into_stream())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "gateway stopped", "en")
            .await
        {
            warn!("SSH disconnect from {} failed: {}", self.server, e);
        }

        info!("SSH tunnel to {} closed", self.server);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.handle.is_closed()
    }
}
