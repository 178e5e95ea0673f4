//! Test utilities and mocks for Sshgate
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use sshgate::config::Config;
use sshgate::error::GatewayError;
use sshgate::gateway::{Gateway, GatewayEvent, GatewayHandle};
use sshgate::tunnel::Tunnel;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};

/// Upper bound for any single wait in a test
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How the mock answers channel opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpenMode {
    /// Hand out a duplex channel
    Accept = 0,
    /// Server refused the destination
    Reject = 1,
    /// Open did not finish in time
    Timeout = 2,
    /// Any other channel failure
    Fail = 3,
}

/// Remote end of a channel opened through the mock tunnel
pub struct OpenedChannel {
    /// Host passed to `open_channel`
    pub host: String,
    /// Port passed to `open_channel`
    pub port: u16,
    /// The far side of the channel
    pub stream: DuplexStream,
}

/// In-memory tunnel session
pub struct MockTunnel {
    opened: mpsc::UnboundedSender<OpenedChannel>,
    mode: Arc<AtomicU8>,
    closed: Arc<AtomicBool>,
}

/// Test side of a [`MockTunnel`]
pub struct MockRemote {
    channels: mpsc::UnboundedReceiver<OpenedChannel>,
    mode: Arc<AtomicU8>,
    closed: Arc<AtomicBool>,
}

impl MockTunnel {
    /// Create a tunnel and the handle observing it
    pub fn new() -> (Self, MockRemote) {
        let (opened, channels) = mpsc::unbounded_channel();
        let mode = Arc::new(AtomicU8::new(OpenMode::Accept as u8));
        let closed = Arc::new(AtomicBool::new(false));

        (
            MockTunnel {
                opened,
                mode: mode.clone(),
                closed: closed.clone(),
            },
            MockRemote {
                channels,
                mode,
                closed,
            },
        )
    }
}

#[async_trait]
impl Tunnel for MockTunnel {
    type Channel = DuplexStream;

    async fn open_channel(
        &self,
        host: &str,
        port: u16,
        _timeout: Duration,
    ) -> Result<DuplexStream, GatewayError> {
        if self.is_closed() {
            return Err(GatewayError::ChannelOpen("tunnel closed".to_string()));
        }

        match self.mode.load(Ordering::SeqCst) {
            1 => Err(GatewayError::ChannelRejected(format!(
                "{}:{} refused",
                host, port
            ))),
            2 => Err(GatewayError::Timeout(format!("opening {}:{}", host, port))),
            3 => Err(GatewayError::ChannelOpen("channel failure".to_string())),
            _ => {
                let (local, remote) = duplex(65536);
                self.opened
                    .send(OpenedChannel {
                        host: host.to_string(),
                        port,
                        stream: remote,
                    })
                    .map_err(|_| GatewayError::ChannelOpen("remote gone".to_string()))?;
                Ok(local)
            }
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl MockRemote {
    /// Wait for the next channel the gateway opens
    pub async fn next_channel(&mut self) -> OpenedChannel {
        tokio::time::timeout(TEST_TIMEOUT, self.channels.recv())
            .await
            .expect("timed out waiting for a channel")
            .expect("tunnel dropped")
    }

    /// Change how later opens are answered
    pub fn set_mode(&self, mode: OpenMode) {
        self.mode.store(mode as u8, Ordering::SeqCst);
    }

    /// Simulate the SSH server dropping the session
    pub fn kill(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Whether the gateway closed the session
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Configuration with the listener on an ephemeral loopback port
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.tunnel.host = "ssh.test".to_string();
    config.tunnel.username = "tester".to_string();
    config.socks.listen_addr = "127.0.0.1".parse().unwrap();
    config.socks.port = 0;
    config
}

/// Running gateway over a mock tunnel
pub struct TestGateway {
    pub handle: GatewayHandle<MockTunnel>,
    pub remote: MockRemote,
    pub events: broadcast::Receiver<GatewayEvent>,
}

/// Start a gateway over a fresh mock tunnel
pub async fn start_gateway(config: Config) -> TestGateway {
    let (tunnel, remote) = MockTunnel::new();
    let gateway = Gateway::new(config);
    let events = gateway.subscribe();
    let handle = gateway.with_tunnel(tunnel).await.unwrap();

    TestGateway {
        handle,
        remote,
        events,
    }
}

/// Next lifecycle event
pub async fn next_event(events: &mut broadcast::Receiver<GatewayEvent>) -> GatewayEvent {
    tokio::time::timeout(TEST_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for an event")
        .unwrap()
}

/// Connect to the gateway and complete the no-auth negotiation
pub async fn socks_connect(addr: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&[0x05, 0x01, 0x00]).await.unwrap();

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00]);

    stream
}

/// SOCKS5 request for an IPv4 destination
pub fn ipv4_request(command: u8, ip: [u8; 4], port: u16) -> Vec<u8> {
    let mut request = vec![0x05, command, 0x00, 0x01];
    request.extend_from_slice(&ip);
    request.extend_from_slice(&port.to_be_bytes());
    request
}

/// SOCKS5 request for a domain destination
pub fn domain_request(command: u8, domain: &str, port: u16) -> Vec<u8> {
    let mut request = vec![0x05, command, 0x00, 0x03, domain.len() as u8];
    request.extend_from_slice(domain.as_bytes());
    request.extend_from_slice(&port.to_be_bytes());
    request
}

/// Read a 10-byte IPv4 reply
pub async fn read_reply(stream: &mut TcpStream) -> [u8; 10] {
    let mut reply = [0u8; 10];
    tokio::time::timeout(TEST_TIMEOUT, stream.read_exact(&mut reply))
        .await
        .expect("timed out waiting for a reply")
        .unwrap();
    reply
}

/// Error reply with the given code
pub fn error_reply(code: u8) -> [u8; 10] {
    [0x05, code, 0x00, 0x01, 0, 0, 0, 0, 0, 0]
}

/// Whether the peer closed the connection
pub async fn is_closed(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    matches!(
        tokio::time::timeout(TEST_TIMEOUT, stream.read(&mut buf)).await,
        Ok(Ok(0)) | Ok(Err(_))
    )
}

/// Run UDP ASSOCIATE and return the relay address from the reply
pub async fn udp_associate(addr: SocketAddr) -> (TcpStream, SocketAddr) {
    let mut control = socks_connect(addr).await;
    control
        .write_all(&ipv4_request(0x03, [0, 0, 0, 0], 0))
        .await
        .unwrap();

    let reply = read_reply(&mut control).await;
    assert_eq!(&reply[..4], &[0x05, 0x00, 0x00, 0x01]);

    let relay = SocketAddr::from((
        [reply[4], reply[5], reply[6], reply[7]],
        u16::from_be_bytes([reply[8], reply[9]]),
    ));
    (control, relay)
}
