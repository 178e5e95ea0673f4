//! Remote UDP gateway configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_enabled() -> bool {
    true
}

fn default_remote_host() -> String {
    "127.0.0.1".to_string()
}

fn default_remote_port() -> u16 {
    7300
}

fn default_open_timeout() -> u64 {
    10
}

fn default_close_with_control() -> bool {
    true
}

/// UDP gateway relay configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UdpGwConfig {
    /// Serve UDP ASSOCIATE requests
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Gateway host as seen from the SSH server
    #[serde(default = "default_remote_host")]
    pub remote_host: String,

    /// Gateway port as seen from the SSH server
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,

    /// Gateway channel open timeout in seconds
    #[serde(default = "default_open_timeout")]
    pub open_timeout: u64,

    /// Interval in seconds between keepalive frames (0 disables)
    #[serde(default)]
    pub keepalive_interval: u64,

    /// End the association when the SOCKS5 control connection closes
    #[serde(default = "default_close_with_control")]
    pub close_with_control: bool,
}

impl Default for UdpGwConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            remote_host: default_remote_host(),
            remote_port: default_remote_port(),
            open_timeout: default_open_timeout(),
            keepalive_interval: 0,
            close_with_control: default_close_with_control(),
        }
    }
}

impl UdpGwConfig {
    /// Gateway channel open timeout
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout)
    }

    /// Keepalive interval, `None` when disabled
    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_interval > 0).then(|| Duration::from_secs(self.keepalive_interval))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.remote_port == 0 {
            return Err("UDP gateway port must not be 0".to_string());
        }
        Ok(())
    }
}
