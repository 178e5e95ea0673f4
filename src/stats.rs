//! Aggregate traffic counters
//!
//! Counters are process-wide aggregates; nothing here identifies a single
//! flow or destination.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Traffic counters shared by every relay of one gateway
#[derive(Debug, Default)]
pub struct TrafficStats {
    tcp_bytes_up: AtomicU64,
    tcp_bytes_down: AtomicU64,
    udp_bytes_up: AtomicU64,
    udp_bytes_down: AtomicU64,
    udp_dropped: AtomicU64,
    tcp_connections_total: AtomicU64,
    tcp_connections_active: AtomicU64,
    udp_associations_total: AtomicU64,
}

/// Point-in-time copy of [`TrafficStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrafficSnapshot {
    /// Bytes sent from local clients into TCP channels
    pub tcp_bytes_up: u64,
    /// Bytes received from TCP channels
    pub tcp_bytes_down: u64,
    /// UDP payload bytes sent to the gateway
    pub udp_bytes_up: u64,
    /// UDP payload bytes received from the gateway
    pub udp_bytes_down: u64,
    /// Datagrams or frames dropped in either direction
    pub udp_dropped: u64,
    /// CONNECT relays established
    pub tcp_connections_total: u64,
    /// CONNECT relays currently pumping
    pub tcp_connections_active: u64,
    /// UDP associations established
    pub udp_associations_total: u64,
}

impl TrafficStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Add client-to-channel TCP bytes
    pub fn add_tcp_up(&self, bytes: u64) {
        self.tcp_bytes_up.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Add channel-to-client TCP bytes
    pub fn add_tcp_down(&self, bytes: u64) {
        self.tcp_bytes_down.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Add device-to-gateway UDP payload bytes
    pub fn add_udp_up(&self, bytes: u64) {
        self.udp_bytes_up.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Add gateway-to-device UDP payload bytes
    pub fn add_udp_down(&self, bytes: u64) {
        self.udp_bytes_down.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Count one dropped datagram or frame
    pub fn increment_udp_dropped(&self) {
        self.udp_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a new CONNECT relay
    pub fn tcp_opened(&self) {
        self.tcp_connections_total.fetch_add(1, Ordering::Relaxed);
        self.tcp_connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a finished CONNECT relay
    pub fn tcp_closed(&self) {
        self.tcp_connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Count a new UDP association
    pub fn udp_associated(&self) {
        self.udp_associations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of every counter
    pub fn snapshot(&self) -> TrafficSnapshot {
        TrafficSnapshot {
            tcp_bytes_up: self.tcp_bytes_up.load(Ordering::Relaxed),
            tcp_bytes_down: self.tcp_bytes_down.load(Ordering::Relaxed),
            udp_bytes_up: self.udp_bytes_up.load(Ordering::Relaxed),
            udp_bytes_down: self.udp_bytes_down.load(Ordering::Relaxed),
            udp_dropped: self.udp_dropped.load(Ordering::Relaxed),
            tcp_connections_total: self.tcp_connections_total.load(Ordering::Relaxed),
            tcp_connections_active: self.tcp_connections_active.load(Ordering::Relaxed),
            udp_associations_total: self.udp_associations_total.load(Ordering::Relaxed),
        }
    }
}
