//! UDP gateway frame codec
//!
//! Every message on the shared gateway channel is a 2-byte little-endian
//! length followed by that many body bytes:
//!
//! ```text
//! +-------+-------+---------+--------------+------+---------+
//! |  LEN  | FLAGS | CONN_ID |     ADDR     | PORT | PAYLOAD |
//! +-------+-------+---------+--------------+------+---------+
//! | 2 LE  |   1   |  2 BE   | 4 or 16 (v6) | 2 BE |    N    |
//! +-------+-------+---------+--------------+------+---------+
//! ```
//!
//! A keepalive body is only `FLAGS CONN_ID` with the keepalive bit set.

use crate::error::GatewayError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::ops::BitOr;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest body a 16-bit length prefix can describe
pub const MAX_FRAME_BODY: usize = u16::MAX as usize;

/// Size of `FLAGS CONN_ID`
const FRAME_HEADER_LEN: usize = 3;

/// Flag byte of a gateway frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// Keepalive, no address or payload follows
    pub const KEEPALIVE: FrameFlags = FrameFlags(0x01);
    /// Flow was rebound on the client side
    pub const REBIND: FrameFlags = FrameFlags(0x02);
    /// Payload is a DNS query
    pub const DNS: FrameFlags = FrameFlags(0x04);
    /// Address is 16 bytes
    pub const IPV6: FrameFlags = FrameFlags(0x08);

    /// No flags set
    pub const fn empty() -> Self {
        FrameFlags(0)
    }

    /// Wrap a raw flag byte; unknown bits are kept
    pub const fn from_bits(bits: u8) -> Self {
        FrameFlags(bits)
    }

    /// Raw flag byte
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set
    pub const fn contains(self, other: FrameFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Copy with `other` set or cleared
    pub const fn with(self, other: FrameFlags, on: bool) -> Self {
        if on {
            FrameFlags(self.0 | other.0)
        } else {
            FrameFlags(self.0 & !other.0)
        }
    }
}

impl BitOr for FrameFlags {
    type Output = FrameFlags;

    fn bitor(self, rhs: FrameFlags) -> FrameFlags {
        FrameFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for FrameFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// One UDP datagram of one flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayFrame {
    /// Flag byte; the IPv6 bit always matches `addr`
    pub flags: FrameFlags,
    /// Flow identifier
    pub conn_id: u16,
    /// Destination (device to gateway) or source (gateway to device)
    pub addr: SocketAddr,
    /// Datagram payload
    pub payload: Bytes,
}

impl GatewayFrame {
    /// Build a data frame, setting the IPv6 bit from the address family
    pub fn new(flags: FrameFlags, conn_id: u16, addr: SocketAddr, payload: Bytes) -> Self {
        GatewayFrame {
            flags: flags
                .with(FrameFlags::KEEPALIVE, false)
                .with(FrameFlags::IPV6, addr.is_ipv6()),
            conn_id,
            addr,
            payload,
        }
    }

    fn body_len(&self) -> usize {
        let addr_len = if self.addr.is_ipv6() { 16 } else { 4 };
        FRAME_HEADER_LEN + addr_len + 2 + self.payload.len()
    }
}

/// A decoded gateway message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayPacket {
    /// Keepalive, carries no flow data
    KeepAlive,
    /// Datagram for one flow
    Data(GatewayFrame),
}

/// Encode a message including its length prefix
pub fn encode_packet(packet: &GatewayPacket) -> Result<Bytes, GatewayError> {
    match packet {
        GatewayPacket::KeepAlive => {
            let mut buf = BytesMut::with_capacity(2 + FRAME_HEADER_LEN);
            buf.put_u16_le(FRAME_HEADER_LEN as u16);
            buf.put_u8(FrameFlags::KEEPALIVE.bits());
            buf.put_u16(0);
            Ok(buf.freeze())
        }
        GatewayPacket::Data(frame) => {
            let body_len = frame.body_len();
            if body_len > MAX_FRAME_BODY {
                return Err(GatewayError::Protocol(format!(
                    "Frame body of {} bytes exceeds {}",
                    body_len, MAX_FRAME_BODY
                )));
            }

            let flags = frame
                .flags
                .with(FrameFlags::KEEPALIVE, false)
                .with(FrameFlags::IPV6, frame.addr.is_ipv6());

            let mut buf = BytesMut::with_capacity(2 + body_len);
            buf.put_u16_le(body_len as u16);
            buf.put_u8(flags.bits());
            buf.put_u16(frame.conn_id);
            match frame.addr.ip() {
                IpAddr::V4(ip) => buf.put_slice(&ip.octets()),
                IpAddr::V6(ip) => buf.put_slice(&ip.octets()),
            }
            buf.put_u16(frame.addr.port());
            buf.put_slice(&frame.payload);

            Ok(buf.freeze())
        }
    }
}

/// Decode one message body (the bytes after the length prefix)
pub fn decode_packet(body: &[u8]) -> Result<GatewayPacket, GatewayError> {
    if body.len() < FRAME_HEADER_LEN {
        return Err(GatewayError::Protocol(format!(
            "Frame too short: {} bytes",
            body.len()
        )));
    }

    let mut buf = body;
    let flags = FrameFlags::from_bits(buf.get_u8());
    let conn_id = buf.get_u16();

    if flags.contains(FrameFlags::KEEPALIVE) {
        return Ok(GatewayPacket::KeepAlive);
    }

    let ipv6 = flags.contains(FrameFlags::IPV6);
    let addr_len = if ipv6 { 16 } else { 4 };
    if buf.len() < addr_len + 2 {
        return Err(GatewayError::Protocol(format!(
            "Frame too short for its address: {} bytes",
            body.len()
        )));
    }

    let ip = if ipv6 {
        let mut octets = [0u8; 16];
        buf.copy_to_slice(&mut octets);
        IpAddr::V6(Ipv6Addr::from(octets))
    } else {
        let mut octets = [0u8; 4];
        buf.copy_to_slice(&mut octets);
        IpAddr::V4(Ipv4Addr::from(octets))
    };
    let port = buf.get_u16();

    Ok(GatewayPacket::Data(GatewayFrame {
        flags,
        conn_id,
        addr: SocketAddr::new(ip, port),
        payload: Bytes::copy_from_slice(buf),
    }))
}

/// Read one length-prefixed message body
///
/// Any error here means the channel itself is broken.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Bytes> {
    let len = reader.read_u16_le().await? as usize;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Bytes::from(body))
}
