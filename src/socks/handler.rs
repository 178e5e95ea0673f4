//! Main SOCKS5 handler
//!
//! This module provides the entry point for one accepted SOCKS5 client.
//! It orchestrates negotiation, request parsing and dispatch to a relay.

use crate::error::Socks5ReplyCode;
use crate::socks::command::{parse_request, send_reply};
use crate::socks::negotiate::negotiate;
use crate::socks::server::RelayContext;
use crate::socks::tcp_relay::handle_tcp_connect;
use crate::socks::types::SocksCommand;
use crate::socks::udp::handle_udp_associate;
use crate::tunnel::Tunnel;
use anyhow::{Context, Result};
use std::net::IpAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// Handle SOCKS5 protocol on an accepted stream
///
/// # Protocol Flow
///
/// 1. Method negotiation (no authentication)
/// 2. Request parsing
/// 3. Command dispatch (CONNECT or UDP ASSOCIATE)
///
/// `bind_ip` is the local address the client reached us on; UDP relay
/// sockets are bound there.
pub async fn handle_client<S, T>(mut stream: S, bind_ip: IpAddr, ctx: &RelayContext<T>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: Tunnel,
{
    negotiate(&mut stream)
        .await
        .with_context(|| "Method negotiation failed")?;

    let request = parse_request(&mut stream)
        .await
        .with_context(|| "Failed to parse SOCKS5 request")?;

    info!("SOCKS5 {} request to {}", request.command, request.target);

    match request.command {
        SocksCommand::Connect => handle_tcp_connect(stream, request.target, ctx).await,
        SocksCommand::UdpAssociate => handle_udp_associate(stream, bind_ip, ctx).await,
        SocksCommand::Unsupported(command) => {
            warn!("SOCKS5 command 0x{:02x} not supported", command);
            send_reply(&mut stream, Socks5ReplyCode::CommandNotSupported, None).await?;
            debug!("Closing connection after unsupported command");
            Ok(())
        }
    }
}
