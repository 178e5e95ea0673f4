//! SOCKS5 server module for Sshgate
//!
//! Accepts local SOCKS5 clients and relays CONNECT streams and UDP
//! ASSOCIATE datagrams through the tunnel session.

pub mod command;
pub mod consts;
mod handler;
mod negotiate;
mod server;
mod tcp_relay;
pub mod types;
pub mod udp;

pub use handler::handle_client;
pub use negotiate::negotiate;
pub use server::{RelayContext, SocksServer, TUNNEL_CHECK_INTERVAL};
pub use tcp_relay::{handle_tcp_connect, relay_tcp};
pub use types::{SocksCommand, SocksRequest, TargetAddr};
