//! UDP gateway relay for SOCKS5 UDP ASSOCIATE
//!
//! One association owns a local relay socket and one gateway channel.
//! Datagrams from local clients are framed onto the channel with a
//! per-destination connection id; frames coming back are turned into SOCKS5
//! UDP datagrams for whichever client owns that id.

use super::flow::FlowTable;
use super::frame::{
    decode_packet, encode_packet, read_message, FrameFlags, GatewayFrame, GatewayPacket,
};
use super::packet::{encode_udp_packet, parse_udp_packet, UdpPacket};
use crate::error::Socks5ReplyCode;
use crate::helper::MAX_DATAGRAM_SIZE;
use crate::socks::command::send_reply;
use crate::socks::server::RelayContext;
use crate::socks::types::TargetAddr;
use crate::stats::TrafficStats;
use crate::tunnel::Tunnel;
use anyhow::{Context, Result};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

/// Lifecycle of one UDP association
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationState {
    /// Relay socket bound, pumps not running yet
    Setup,
    /// Pumps running
    Active,
    /// Torn down; never leaves this state
    Closed,
}

impl AssociationState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => AssociationState::Setup,
            1 => AssociationState::Active,
            _ => AssociationState::Closed,
        }
    }
}

type SharedWriter<C> = Arc<Mutex<WriteHalf<C>>>;

/// Upper bound for closing the gateway channel writer on teardown
const WRITER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Handle UDP ASSOCIATE command
///
/// Binds the relay socket next to the SOCKS5 listener, opens the gateway
/// channel, answers the client with the relay address and starts the pumps.
/// Setup failures are answered with a general failure reply.
pub async fn handle_udp_associate<S, T>(
    mut control: S,
    bind_ip: IpAddr,
    ctx: &RelayContext<T>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: Tunnel,
{
    if !ctx.udpgw.enabled {
        warn!("UDP ASSOCIATE requested but the UDP gateway is disabled");
        send_reply(&mut control, Socks5ReplyCode::CommandNotSupported, None).await?;
        return Ok(());
    }

    let socket = match UdpSocket::bind(SocketAddr::new(bind_ip, 0)).await {
        Ok(socket) => socket,
        Err(e) => {
            send_reply(&mut control, Socks5ReplyCode::GeneralFailure, None).await?;
            return Err(e).context("Failed to bind UDP relay socket");
        }
    };

    let channel = match ctx
        .tunnel
        .open_channel(
            &ctx.udpgw.remote_host,
            ctx.udpgw.remote_port,
            ctx.udpgw.open_timeout(),
        )
        .await
    {
        Ok(channel) => channel,
        Err(e) => {
            send_reply(&mut control, Socks5ReplyCode::GeneralFailure, None).await?;
            return Err(e).context("Failed to open UDP gateway channel");
        }
    };

    let relay = UdpGatewayRelay::new(socket, ctx.stats.clone(), ctx.token.child_token())?;

    send_reply(
        &mut control,
        Socks5ReplyCode::Succeeded,
        Some(relay.local_addr()),
    )
    .await?;

    info!(relay = %relay.local_addr(), "UDP association established");
    ctx.stats.udp_associated();

    relay.start(channel, &ctx.tracker, ctx.udpgw.keepalive_interval());

    if ctx.udpgw.close_with_control {
        let relay = relay.clone();
        ctx.tracker
            .spawn(async move { monitor_control_stream(control, relay).await });
    } else {
        drop(control);
    }

    Ok(())
}

/// Watch the SOCKS5 control connection; its close ends the association
async fn monitor_control_stream<S>(mut control: S, relay: Arc<UdpGatewayRelay>)
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; 64];

    loop {
        tokio::select! {
            _ = relay.token.cancelled() => break,
            read = control.read(&mut buf) => match read {
                Ok(0) | Err(_) => {
                    relay.stop("control connection closed");
                    break;
                }
                Ok(n) => trace!("Ignoring {} bytes on UDP control connection", n),
            },
        }
    }
}

/// One UDP association
#[derive(Debug)]
pub struct UdpGatewayRelay {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    flows: FlowTable,
    stats: Arc<TrafficStats>,
    token: CancellationToken,
    state: AtomicU8,
}

impl UdpGatewayRelay {
    /// Wrap a bound relay socket
    pub fn new(
        socket: UdpSocket,
        stats: Arc<TrafficStats>,
        token: CancellationToken,
    ) -> io::Result<Arc<Self>> {
        let local_addr = socket.local_addr()?;

        Ok(Arc::new(UdpGatewayRelay {
            socket: Arc::new(socket),
            local_addr,
            flows: FlowTable::new(),
            stats,
            token,
            state: AtomicU8::new(AssociationState::Setup as u8),
        }))
    }

    /// Address clients send their datagrams to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current association state
    pub fn state(&self) -> AssociationState {
        AssociationState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Flows seen so far
    pub fn flows(&self) -> &FlowTable {
        &self.flows
    }

    /// Resolves once the association is closed
    pub async fn closed(&self) {
        self.token.cancelled().await
    }

    /// Spawn both pumps, and the keepalive task when an interval is given
    pub fn start<C>(
        self: &Arc<Self>,
        channel: C,
        tracker: &TaskTracker,
        keepalive: Option<Duration>,
    ) where
        C: AsyncRead + AsyncWrite + Send + 'static,
    {
        if self
            .state
            .compare_exchange(
                AssociationState::Setup as u8,
                AssociationState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            debug!(relay = %self.local_addr, "UDP association already started or closed");
            return;
        }

        let (reader, writer) = tokio::io::split(channel);
        let writer: SharedWriter<C> = Arc::new(Mutex::new(writer));

        let relay = self.clone();
        let device_writer = writer.clone();
        tracker.spawn(async move { relay.device_to_gateway(device_writer).await });

        let relay = self.clone();
        tracker.spawn(async move { relay.gateway_to_device(reader).await });

        if let Some(interval) = keepalive {
            let relay = self.clone();
            tracker.spawn(async move { relay.keepalive(writer, interval).await });
        }
    }

    /// Tear the association down; only the first call has any effect
    pub fn stop(&self, reason: &str) {
        let previous = self
            .state
            .swap(AssociationState::Closed as u8, Ordering::AcqRel);

        if AssociationState::from_u8(previous) != AssociationState::Closed {
            info!(relay = %self.local_addr, "UDP association closed: {}", reason);
            self.token.cancel();
        }
    }

    /// Local clients to gateway channel
    async fn device_to_gateway<C>(self: Arc<Self>, writer: SharedWriter<C>)
    where
        C: AsyncWrite,
    {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let (n, client) = tokio::select! {
                _ = self.token.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        warn!(relay = %self.local_addr, "UDP relay socket error: {}", e);
                        self.stop("relay socket failed");
                        break;
                    }
                },
            };

            let Some(frame) = self.frame_datagram(&buf[..n], client).await else {
                self.stats.increment_udp_dropped();
                continue;
            };

            let payload_len = frame.payload.len() as u64;
            let encoded = match encode_packet(&GatewayPacket::Data(frame)) {
                Ok(encoded) => encoded,
                Err(e) => {
                    debug!("Dropping datagram from {}: {}", client, e);
                    self.stats.increment_udp_dropped();
                    continue;
                }
            };

            let written = tokio::select! {
                _ = self.token.cancelled() => break,
                written = write_locked(&writer, &encoded) => written,
            };

            if let Err(e) = written {
                warn!(relay = %self.local_addr, "UDP gateway write failed: {}", e);
                self.stop("gateway channel write failed");
                break;
            }

            self.stats.add_udp_up(payload_len);
        }

        // A stalled channel must not keep the association alive
        let shutdown = async { writer.lock().await.shutdown().await };
        if tokio::time::timeout(WRITER_SHUTDOWN_TIMEOUT, shutdown).await.is_err() {
            debug!(relay = %self.local_addr, "Gateway channel writer did not close in time");
        }
    }

    /// Parse a client datagram and map it onto a flow
    ///
    /// `None` means the datagram is dropped.
    async fn frame_datagram(&self, datagram: &[u8], client: SocketAddr) -> Option<GatewayFrame> {
        let packet = match parse_udp_packet(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Invalid SOCKS5 UDP datagram from {}: {}", client, e);
                return None;
            }
        };

        if packet.is_fragmented() {
            debug!(frag = packet.frag, "Dropping fragmented UDP datagram from {}", client);
            return None;
        }

        let entry = match self.flows.lookup(&packet.addr, client).await {
            Some(entry) => entry,
            None => {
                let destination = match packet.addr.resolve().await {
                    Ok(destination) => destination,
                    Err(e) => {
                        warn!(dest = %packet.addr, "Dropping UDP datagram: {:#}", e);
                        return None;
                    }
                };
                self.flows.insert(packet.addr, destination, client).await
            }
        };

        if entry.rebound {
            debug!(
                conn_id = entry.conn_id,
                %client,
                "UDP flow rebound to a new client endpoint"
            );
        }

        trace!(
            conn_id = entry.conn_id,
            destination = %entry.destination,
            bytes = packet.data.len(),
            "Device to gateway"
        );

        Some(GatewayFrame::new(
            FrameFlags::empty(),
            entry.conn_id,
            entry.destination,
            packet.data,
        ))
    }

    /// Gateway channel to local clients
    async fn gateway_to_device<C>(self: Arc<Self>, mut reader: ReadHalf<C>)
    where
        C: AsyncRead,
    {
        loop {
            let body = tokio::select! {
                _ = self.token.cancelled() => break,
                body = read_message(&mut reader) => match body {
                    Ok(body) => body,
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                        self.stop("gateway channel closed");
                        break;
                    }
                    Err(e) => {
                        warn!(relay = %self.local_addr, "UDP gateway read failed: {}", e);
                        self.stop("gateway channel read failed");
                        break;
                    }
                },
            };

            let frame = match decode_packet(&body) {
                Ok(GatewayPacket::Data(frame)) => frame,
                Ok(GatewayPacket::KeepAlive) => {
                    trace!("Gateway keepalive");
                    continue;
                }
                Err(e) => {
                    debug!("Skipping gateway frame: {}", e);
                    self.stats.increment_udp_dropped();
                    continue;
                }
            };

            let Some(client) = self.flows.client_for(frame.conn_id).await else {
                debug!(conn_id = frame.conn_id, "Dropping frame for unknown flow");
                self.stats.increment_udp_dropped();
                continue;
            };

            let payload_len = frame.payload.len() as u64;
            let datagram =
                encode_udp_packet(&UdpPacket::new(TargetAddr::Ip(frame.addr), frame.payload));

            match self.socket.send_to(&datagram, client).await {
                Ok(_) => self.stats.add_udp_down(payload_len),
                Err(e) => {
                    debug!("UDP send to {} failed: {}", client, e);
                    self.stats.increment_udp_dropped();
                }
            }
        }
    }

    /// Periodic keepalive frames
    async fn keepalive<C>(self: Arc<Self>, writer: SharedWriter<C>, interval: Duration)
    where
        C: AsyncWrite,
    {
        let keepalive = match encode_packet(&GatewayPacket::KeepAlive) {
            Ok(keepalive) => keepalive,
            Err(e) => {
                warn!("Failed to encode keepalive: {}", e);
                return;
            }
        };

        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let written = tokio::select! {
                _ = self.token.cancelled() => break,
                written = write_locked(&writer, &keepalive) => written,
            };

            if let Err(e) = written {
                warn!(relay = %self.local_addr, "UDP gateway keepalive failed: {}", e);
                self.stop("gateway channel write failed");
                break;
            }
        }
    }
}

/// Write one encoded message under the channel write lock
async fn write_locked<C: AsyncWrite>(writer: &SharedWriter<C>, buf: &[u8]) -> io::Result<()> {
    let mut writer = writer.lock().await;
    writer.write_all(buf).await?;
    writer.flush().await
}
