//! Configuration module for Sshgate
//!
//! This module provides configuration types and parsing for the gateway.

mod socks;
mod tunnel;
mod udpgw;

pub use socks::SocksConfig;
pub use tunnel::{HostKeyPolicy, TunnelConfig};
pub use udpgw::UdpGwConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// SSH tunnel session
    #[serde(default)]
    pub tunnel: TunnelConfig,

    /// Local SOCKS5 endpoint
    #[serde(default)]
    pub socks: SocksConfig,

    /// Remote UDP gateway
    #[serde(default)]
    pub udpgw: UdpGwConfig,
}

impl Config {
    /// Validate every section
    pub fn validate(&self) -> Result<(), String> {
        self.tunnel.validate()?;
        self.socks.validate()?;
        self.udpgw.validate()
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config() {
        let config_str = r#"
[tunnel]
host = "ssh.example.com"
username = "alice"
password = "secret"
"#;

        let config = parse_config(config_str).unwrap();
        assert_eq!(config.tunnel.host, "ssh.example.com");
        assert_eq!(config.tunnel.port, 22);
        assert_eq!(config.tunnel.username, "alice");
        assert_eq!(config.socks.port, 20808);
        assert_eq!(config.udpgw.remote_port, 7300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config_str = r#"
[tunnel]
host = "10.0.0.5"
port = 2222
username = "bob"
password = "pw"
connect_timeout = 5
keepalive_interval = 0

[tunnel.host_key]
mode = "fingerprint"
fingerprint = "SHA256:abcdef"

[socks]
listen_addr = "127.0.0.1"
port = 1080
backlog = 128
connect_timeout = 3
nodelay = false

[udpgw]
enabled = true
remote_host = "127.0.0.1"
remote_port = 7400
open_timeout = 4
keepalive_interval = 10
close_with_control = false
"#;

        let config = parse_config(config_str).unwrap();
        assert_eq!(config.tunnel.port, 2222);
        assert_eq!(
            config.tunnel.host_key,
            HostKeyPolicy::Fingerprint {
                fingerprint: "SHA256:abcdef".to_string()
            }
        );
        assert_eq!(config.socks.port, 1080);
        assert_eq!(config.socks.backlog, 128);
        assert!(!config.socks.nodelay);
        assert_eq!(config.udpgw.remote_port, 7400);
        assert_eq!(config.udpgw.keepalive_interval, 10);
        assert!(!config.udpgw.close_with_control);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_host() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[tunnel]\nhost = \"example.org\"\nusername = \"u\"\npassword = \"p\""
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.tunnel.host, "example.org");
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config("/nonexistent/sshgate.toml").is_err());
    }
}
