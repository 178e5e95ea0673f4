//! Local SOCKS5 endpoint configuration

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

fn default_listen_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_socks_port() -> u16 {
    20808
}

fn default_backlog() -> u32 {
    50
}

/// Default CONNECT channel open timeout in seconds
fn default_connect_timeout() -> u64 {
    10
}

fn default_nodelay() -> bool {
    true
}

/// SOCKS5 server configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SocksConfig {
    /// Address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: IpAddr,

    /// Port to listen on
    #[serde(default = "default_socks_port")]
    pub port: u16,

    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: u32,

    /// Timeout in seconds for opening the tunnel channel of a CONNECT
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Set TCP_NODELAY on accepted client sockets
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,
}

impl Default for SocksConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_socks_port(),
            backlog: default_backlog(),
            connect_timeout: default_connect_timeout(),
            nodelay: default_nodelay(),
        }
    }
}

impl SocksConfig {
    /// Socket address the listener binds to
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.port)
    }

    /// CONNECT channel open timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.backlog == 0 {
            return Err("SOCKS5 listen backlog must be positive".to_string());
        }
        Ok(())
    }
}
