//! # Sshgate - SOCKS5 Gateway over SSH
//!
//! Sshgate exposes a local SOCKS5 endpoint and carries everything it
//! receives through a single authenticated SSH session.
//!
//! ## Features
//!
//! - **TCP CONNECT**: one `direct-tcpip` channel per client connection
//! - **UDP ASSOCIATE**: datagrams multiplexed onto one channel to a
//!   udpgw-style gateway, with a 16-bit connection id per destination
//! - **Lifecycle events**: started, stopped and connection-failed signals
//!   for the embedding application
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sshgate::config::load_config;
//! use sshgate::gateway::run_gateway;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_gateway(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! App -> SOCKS5 (local) -> SSH session -> direct-tcpip -> Target
//!                                      -> direct-tcpip -> udpgw -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod helper;
pub mod socks;
pub mod stats;
pub mod tunnel;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{GatewayError, Socks5Error};
pub use gateway::{run_gateway, Gateway, GatewayEvent, GatewayHandle};
pub use stats::{TrafficSnapshot, TrafficStats};
pub use tunnel::{SshTunnel, Tunnel};

/// Version of the Sshgate library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
