//! SOCKS5 server and TCP relay tests over a mock tunnel

mod common;

use common::*;
use sshgate::error::GatewayError;
use sshgate::gateway::{Gateway, GatewayEvent};
use sshgate::socks::TUNNEL_CHECK_INTERVAL;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn test_started_event_carries_listener_addr() {
    let mut gw = start_gateway(test_config()).await;

    assert_eq!(
        next_event(&mut gw.events).await,
        GatewayEvent::Started {
            local_addr: gw.handle.local_addr()
        }
    );
    assert!(gw.handle.local_addr().ip().is_loopback());
    assert_ne!(gw.handle.local_addr().port(), 0);

    gw.handle.stop().await;
}

#[tokio::test]
async fn test_handle_debug_shows_listener_and_state() {
    let gw = start_gateway(test_config()).await;
    let addr = gw.handle.local_addr().to_string();

    let running = format!("{:?}", gw.handle);
    assert!(running.contains(&addr));
    assert!(running.contains("stopping: false"));

    gw.handle.stop().await;
    assert!(format!("{:?}", gw.handle).contains("stopping: true"));
}

#[tokio::test]
async fn test_bind_failure_closes_tunnel() {
    let mut config = test_config();
    // Documentation range, never assigned to a local interface
    config.socks.listen_addr = "192.0.2.1".parse().unwrap();

    let (tunnel, remote) = MockTunnel::new();
    let gateway = Gateway::new(config);
    let mut events = gateway.subscribe();

    let err = gateway.with_tunnel(tunnel).await.unwrap_err();
    assert!(matches!(err, GatewayError::Network(_)));
    assert!(remote.is_closed());
    assert!(matches!(
        next_event(&mut events).await,
        GatewayEvent::ConnectionFailed { .. }
    ));
}

#[tokio::test]
async fn test_socks4_rejected_without_reply() {
    let gw = start_gateway(test_config()).await;

    let mut stream = TcpStream::connect(gw.handle.local_addr()).await.unwrap();
    stream.write_all(&[0x04, 0x01, 0x00]).await.unwrap();

    let mut received = Vec::new();
    let _ = tokio::time::timeout(TEST_TIMEOUT, stream.read_to_end(&mut received))
        .await
        .unwrap();
    assert!(received.is_empty());

    // The listener keeps serving other clients
    let _ok = socks_connect(gw.handle.local_addr()).await;

    gw.handle.stop().await;
}

#[tokio::test]
async fn test_connect_relays_through_channel() {
    let mut gw = start_gateway(test_config()).await;

    let mut client = socks_connect(gw.handle.local_addr()).await;
    client
        .write_all(&ipv4_request(0x01, [93, 184, 216, 34], 80))
        .await
        .unwrap();

    let mut channel = gw.remote.next_channel().await;
    assert_eq!(channel.host, "93.184.216.34");
    assert_eq!(channel.port, 80);

    assert_eq!(read_reply(&mut client).await, error_reply(0x00));

    client.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
    let mut request = [0u8; 18];
    channel.stream.read_exact(&mut request).await.unwrap();
    assert_eq!(&request, b"GET / HTTP/1.0\r\n\r\n");

    channel.stream.write_all(b"HTTP/1.0 200 OK").await.unwrap();
    let mut response = [0u8; 15];
    client.read_exact(&mut response).await.unwrap();
    assert_eq!(&response, b"HTTP/1.0 200 OK");

    // Remote close closes the client
    drop(channel);
    assert!(is_closed(&mut client).await);

    gw.handle.stop().await;
    let stats = gw.handle.stats();
    assert_eq!(stats.tcp_bytes_up, 18);
    assert_eq!(stats.tcp_bytes_down, 15);
    assert_eq!(stats.tcp_connections_total, 1);
    assert_eq!(stats.tcp_connections_active, 0);
}

#[tokio::test]
async fn test_connect_domain_and_ipv6_targets() {
    let mut gw = start_gateway(test_config()).await;

    let mut client = socks_connect(gw.handle.local_addr()).await;
    client
        .write_all(&domain_request(0x01, "example.com", 443))
        .await
        .unwrap();
    let channel = gw.remote.next_channel().await;
    assert_eq!(channel.host, "example.com");
    assert_eq!(channel.port, 443);
    assert_eq!(read_reply(&mut client).await, error_reply(0x00));

    let mut client = socks_connect(gw.handle.local_addr()).await;
    let mut request = vec![0x05, 0x01, 0x00, 0x04];
    request.extend_from_slice(&[0xFF; 16]);
    request.extend_from_slice(&[0x00, 0x16]);
    client.write_all(&request).await.unwrap();
    let channel = gw.remote.next_channel().await;
    assert_eq!(channel.host, "ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff");
    assert_eq!(channel.port, 22);

    gw.handle.stop().await;
}

#[tokio::test]
async fn test_bind_command_not_supported() {
    let gw = start_gateway(test_config()).await;

    let mut client = socks_connect(gw.handle.local_addr()).await;
    client
        .write_all(&ipv4_request(0x02, [127, 0, 0, 1], 8080))
        .await
        .unwrap();

    assert_eq!(read_reply(&mut client).await, error_reply(0x07));
    assert!(is_closed(&mut client).await);

    gw.handle.stop().await;
}

#[tokio::test]
async fn test_channel_failures_map_to_reply_codes() {
    let gw = start_gateway(test_config()).await;

    for (mode, code) in [
        (OpenMode::Reject, 0x04),
        (OpenMode::Timeout, 0x04),
        (OpenMode::Fail, 0x01),
    ] {
        gw.remote.set_mode(mode);

        let mut client = socks_connect(gw.handle.local_addr()).await;
        client
            .write_all(&ipv4_request(0x01, [10, 0, 0, 1], 80))
            .await
            .unwrap();

        assert_eq!(read_reply(&mut client).await, error_reply(code));
        assert!(is_closed(&mut client).await);
    }

    assert_eq!(gw.handle.stats().tcp_connections_total, 0);
    gw.handle.stop().await;
}

#[tokio::test]
async fn test_stop_mid_transfer_leaves_no_tasks() {
    let mut gw = start_gateway(test_config()).await;

    let mut client = socks_connect(gw.handle.local_addr()).await;
    client
        .write_all(&ipv4_request(0x01, [10, 0, 0, 2], 9000))
        .await
        .unwrap();
    let mut channel = gw.remote.next_channel().await;
    assert_eq!(read_reply(&mut client).await, error_reply(0x00));

    client.write_all(&[0xAB; 4096]).await.unwrap();
    let mut chunk = [0u8; 1024];
    channel.stream.read_exact(&mut chunk).await.unwrap();
    assert!(gw.handle.active_tasks() >= 2);

    gw.handle.stop().await;

    assert_eq!(gw.handle.active_tasks(), 0);
    assert!(gw.remote.is_closed());
    assert!(is_closed(&mut client).await);

    let mut rest = Vec::new();
    let _ = tokio::time::timeout(TEST_TIMEOUT, channel.stream.read_to_end(&mut rest))
        .await
        .unwrap();
    assert!(rest.len() <= 4096 - 1024);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let mut gw = start_gateway(test_config()).await;

    gw.handle.stop().await;
    gw.handle.stop().await;
    gw.handle.wait().await.unwrap();
    assert!(gw.handle.is_stopped());

    assert!(matches!(
        next_event(&mut gw.events).await,
        GatewayEvent::Started { .. }
    ));
    assert_eq!(next_event(&mut gw.events).await, GatewayEvent::Stopped);
    assert!(gw.events.try_recv().is_err());

    // The listener is gone
    assert!(TcpStream::connect(gw.handle.local_addr()).await.is_err());
}

#[tokio::test]
async fn test_tunnel_death_stops_gateway() {
    let mut gw = start_gateway(test_config()).await;
    assert!(matches!(
        next_event(&mut gw.events).await,
        GatewayEvent::Started { .. }
    ));

    let mut client = socks_connect(gw.handle.local_addr()).await;
    client
        .write_all(&ipv4_request(0x01, [10, 0, 0, 3], 80))
        .await
        .unwrap();
    let _channel = gw.remote.next_channel().await;
    assert_eq!(read_reply(&mut client).await, error_reply(0x00));

    gw.remote.kill();

    let result = tokio::time::timeout(TUNNEL_CHECK_INTERVAL * 4 + TEST_TIMEOUT, gw.handle.wait())
        .await
        .unwrap();
    assert!(result.is_err());

    assert!(matches!(
        next_event(&mut gw.events).await,
        GatewayEvent::ConnectionFailed { .. }
    ));
    assert_eq!(next_event(&mut gw.events).await, GatewayEvent::Stopped);

    assert_eq!(gw.handle.active_tasks(), 0);
    assert!(is_closed(&mut client).await);

    // Stopping after an internal failure is harmless
    gw.handle.stop().await;
    assert!(gw.events.try_recv().is_err());
}
