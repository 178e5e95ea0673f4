//! Tunnel session module for Sshgate
//!
//! A tunnel session is one authenticated SSH connection. Every TCP relay and
//! every UDP gateway relay opens its own `direct-tcpip` channel on it; the
//! channels die with the session.

mod handler;
mod ssh;

pub use handler::{fingerprint_matches, ClientHandler};
pub use ssh::SshTunnel;

use crate::error::GatewayError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Originator address reported when opening `direct-tcpip` channels
pub const ORIGINATOR_ADDR: &str = "127.0.0.1";

/// Tunnel session trait
///
/// Implementations must allow concurrent [`open_channel`](Tunnel::open_channel)
/// calls from many relays. [`close`](Tunnel::close) must be idempotent and
/// safe to call at any point.
#[async_trait]
pub trait Tunnel: Send + Sync + 'static {
    /// The byte stream of one opened channel
    type Channel: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a channel bound to `host:port` on the remote side
    async fn open_channel(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Self::Channel, GatewayError>;

    /// Close the session and every channel opened on it
    async fn close(&self);

    /// Whether the session is closed or its transport has failed
    fn is_closed(&self) -> bool;
}
