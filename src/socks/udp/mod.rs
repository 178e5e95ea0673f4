//! UDP ASSOCIATE module for SOCKS5
//!
//! Relays SOCKS5 UDP datagrams through a udpgw-style gateway reached over
//! one tunnel channel per association.

mod flow;
mod frame;
mod packet;
mod relay;

pub use flow::{FlowEntry, FlowRecord, FlowTable};
pub use frame::{
    decode_packet, encode_packet, read_message, FrameFlags, GatewayFrame, GatewayPacket,
    MAX_FRAME_BODY,
};
pub use packet::{encode_udp_packet, parse_udp_packet, UdpPacket};
pub use relay::{handle_udp_associate, AssociationState, UdpGatewayRelay};
