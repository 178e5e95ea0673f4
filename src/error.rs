//! Error types for Sshgate
//!
//! This module defines the error taxonomy shared by the tunnel session,
//! the SOCKS5 server and both relays.

use std::io;
use thiserror::Error;

/// Main error type for Sshgate operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// SSH authentication was rejected
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Could not reach or talk to the SSH server
    #[error("Network error: {0}")]
    Network(String),

    /// An operation did not finish before its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A direct-tcpip channel could not be opened
    #[error("Channel open error: {0}")]
    ChannelOpen(String),

    /// The SSH server refused to connect the channel to its destination
    #[error("Channel rejected: {0}")]
    ChannelRejected(String),

    /// Malformed SOCKS5 or gateway frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Fatal failure of a long-lived stream
    #[error("Stream error: {0}")]
    Stream(String),

    /// SOCKS5 protocol error
    #[error("SOCKS5 error: {0}")]
    Socks5(#[from] Socks5Error),
}

impl GatewayError {
    /// SOCKS5 reply code reported to a client whose request failed with this error
    pub fn reply_code(&self) -> Socks5ReplyCode {
        match self {
            GatewayError::Timeout(_) | GatewayError::ChannelRejected(_) => {
                Socks5ReplyCode::HostUnreachable
            }
            _ => Socks5ReplyCode::GeneralFailure,
        }
    }
}

/// SOCKS5 specific errors
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// Address type not supported
    #[error("Address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// Invalid domain name
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),
}

/// Reply codes sent to SOCKS5 clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Socks5ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Command not supported
    CommandNotSupported = 0x07,
}

impl From<Socks5ReplyCode> for u8 {
    fn from(code: Socks5ReplyCode) -> Self {
        code as u8
    }
}
