//! SSH tunnel session configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_keepalive_interval() -> u64 {
    15
}

/// How the SSH server's host key is trusted
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// Accept whatever key the server presents
    #[default]
    AcceptAny,
    /// Require the server key's SHA-256 fingerprint (`SHA256:...`)
    Fingerprint {
        /// Expected fingerprint in OpenSSH notation
        fingerprint: String,
    },
}

/// SSH tunnel session configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TunnelConfig {
    /// SSH server host name or address
    #[serde(default)]
    pub host: String,

    /// SSH server port
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Login user
    #[serde(default)]
    pub username: String,

    /// Login password
    #[serde(default)]
    pub password: String,

    /// Connect and authenticate timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// SSH keepalive interval in seconds (0 disables)
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,

    /// Host key trust policy
    #[serde(default)]
    pub host_key: HostKeyPolicy,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_ssh_port(),
            username: String::new(),
            password: String::new(),
            connect_timeout: default_connect_timeout(),
            keepalive_interval: default_keepalive_interval(),
            host_key: HostKeyPolicy::default(),
        }
    }
}

impl TunnelConfig {
    /// `host:port` of the SSH server
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connect timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// SSH keepalive interval, `None` when disabled
    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_interval > 0).then(|| Duration::from_secs(self.keepalive_interval))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("Tunnel host is not configured".to_string());
        }
        if self.port == 0 {
            return Err("Tunnel port must not be 0".to_string());
        }
        if self.username.is_empty() {
            return Err("Tunnel username is not configured".to_string());
        }
        if let HostKeyPolicy::Fingerprint { fingerprint } = &self.host_key {
            if !fingerprint.starts_with("SHA256:") {
                return Err(format!(
                    "Host key fingerprint must start with SHA256: (got {})",
                    fingerprint
                ));
            }
        }
        Ok(())
    }
}
