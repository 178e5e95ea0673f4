//! TCP relay for SOCKS5 CONNECT command
//!
//! Handles TCP CONNECT requests by opening a tunnel channel to the target
//! and relaying data bidirectionally.

use crate::error::Socks5ReplyCode;
use crate::helper::pump;
use crate::socks::command::send_reply;
use crate::socks::server::RelayContext;
use crate::socks::types::TargetAddr;
use crate::stats::TrafficStats;
use crate::tunnel::Tunnel;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Handle TCP CONNECT command
///
/// This function:
/// 1. Opens a `direct-tcpip` channel to the target
/// 2. Sends the SOCKS5 reply
/// 3. Spawns the two relay pumps and returns
pub async fn handle_tcp_connect<S, T>(
    mut client: S,
    target: TargetAddr,
    ctx: &RelayContext<T>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: Tunnel,
{
    debug!("Opening channel to {}", target);

    let channel = match ctx
        .tunnel
        .open_channel(&target.host(), target.port(), ctx.socks.connect_timeout())
        .await
    {
        Ok(channel) => channel,
        Err(e) => {
            warn!("Failed to open channel to {}: {}", target, e);
            send_reply(&mut client, e.reply_code(), None).await?;
            return Err(e).with_context(|| format!("CONNECT to {} failed", target));
        }
    };

    send_reply(&mut client, Socks5ReplyCode::Succeeded, None).await?;

    info!("SOCKS5 tunnel established to {}", target);

    relay_tcp(
        client,
        channel,
        &ctx.tracker,
        ctx.token.child_token(),
        ctx.stats.clone(),
    );

    Ok(())
}

/// Decrements the active connection gauge once both pumps are gone
struct ConnectionGuard(Arc<TrafficStats>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.tcp_closed();
    }
}

/// Relay data bidirectionally between a client and a channel
///
/// Spawns one pump per direction on `tracker`. When either direction ends
/// the shared `token` is cancelled, which stops the other direction too;
/// both streams are closed once both pumps are done.
pub fn relay_tcp<A, B>(
    client: A,
    channel: B,
    tracker: &TaskTracker,
    token: CancellationToken,
    stats: Arc<TrafficStats>,
) where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (channel_read, channel_write) = tokio::io::split(channel);

    stats.tcp_opened();
    let guard = Arc::new(ConnectionGuard(stats.clone()));

    let up_stats = stats.clone();
    let up_token = token.clone();
    let up_guard = guard.clone();
    tracker.spawn(async move {
        let _guard = up_guard;
        match pump(client_read, channel_write, up_token, |n| up_stats.add_tcp_up(n)).await {
            Ok(bytes) => debug!("Client->channel finished: {} bytes", bytes),
            Err(e) => debug!("Client->channel error: {}", e),
        }
    });

    tracker.spawn(async move {
        let _guard = guard;
        match pump(channel_read, client_write, token, |n| stats.add_tcp_down(n)).await {
            Ok(bytes) => debug!("Channel->client finished: {} bytes", bytes),
            Err(e) => debug!("Channel->client error: {}", e),
        }
    });
}
