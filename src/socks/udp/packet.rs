//! UDP packet encoding/decoding for SOCKS5
//!
//! Handles the encapsulation format for UDP packets in SOCKS5.

use crate::error::Socks5Error;
use crate::socks::consts::*;
use crate::socks::types::TargetAddr;
use anyhow::{bail, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::{Ipv4Addr, Ipv6Addr};

/// UDP packet structure for SOCKS5
///
/// # UDP Request/Response Format
///
/// ```text
/// +----+------+------+----------+----------+----------+
/// |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
/// +----+------+------+----------+----------+----------+
/// | 2  |  1   |  1   | Variable |    2     | Variable |
/// +----+------+------+----------+----------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpPacket {
    /// Fragment number (0 for standalone packets)
    pub frag: u8,
    /// Target/source address
    pub addr: TargetAddr,
    /// Packet data
    pub data: Bytes,
}

impl UdpPacket {
    /// Create a new unfragmented UDP packet
    pub fn new(addr: TargetAddr, data: Bytes) -> Self {
        UdpPacket {
            frag: 0,
            addr,
            data,
        }
    }

    /// Check if this is a fragmented packet
    pub fn is_fragmented(&self) -> bool {
        self.frag != 0
    }
}

/// Parse a UDP packet from bytes
///
/// The RSV field is not checked; some clients put garbage there.
pub fn parse_udp_packet(data: &[u8]) -> Result<UdpPacket> {
    if data.len() < 4 {
        bail!("UDP packet too short: {} bytes", data.len());
    }

    let mut buf = data;

    // RSV (2 bytes)
    buf.advance(2);

    // FRAG (1 byte)
    let frag = buf.get_u8();

    // ATYP (1 byte)
    let atyp = buf.get_u8();

    let (addr, remaining) = parse_address_from_buf(atyp, buf)?;

    Ok(UdpPacket {
        frag,
        addr,
        data: Bytes::copy_from_slice(remaining),
    })
}

/// Parse address from buffer
fn parse_address_from_buf(atyp: u8, mut buf: &[u8]) -> Result<(TargetAddr, &[u8])> {
    match atyp {
        SOCKS5_ADDR_TYPE_IPV4 => {
            if buf.len() < 6 {
                bail!("Buffer too short for IPv4 address");
            }
            let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
            buf.advance(4);
            let port = buf.get_u16();
            Ok((TargetAddr::ipv4(ip, port), buf))
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            if buf.is_empty() {
                bail!("Buffer too short for domain length");
            }
            let len = buf.get_u8() as usize;
            if len == 0 {
                bail!("Empty domain name");
            }
            if buf.len() < len + 2 {
                bail!("Buffer too short for domain name");
            }
            let domain = String::from_utf8(buf[..len].to_vec())
                .map_err(|e| Socks5Error::InvalidDomain(e.to_string()))?;
            buf.advance(len);
            let port = buf.get_u16();
            Ok((TargetAddr::domain(domain, port), buf))
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            if buf.len() < 18 {
                bail!("Buffer too short for IPv6 address");
            }
            let mut ip_bytes = [0u8; 16];
            ip_bytes.copy_from_slice(&buf[..16]);
            buf.advance(16);
            let port = buf.get_u16();
            Ok((TargetAddr::ipv6(Ipv6Addr::from(ip_bytes), port), buf))
        }

        other => Err(Socks5Error::AddressTypeNotSupported(other).into()),
    }
}

/// Encode a UDP packet to bytes
pub fn encode_udp_packet(packet: &UdpPacket) -> Bytes {
    let addr = packet.addr.to_bytes();
    let mut buf = BytesMut::with_capacity(3 + addr.len() + packet.data.len());

    // RSV (2 bytes)
    buf.put_u16(0);

    // FRAG (1 byte)
    buf.put_u8(packet.frag);

    buf.extend_from_slice(&addr);
    buf.extend_from_slice(&packet.data);

    buf.freeze()
}
