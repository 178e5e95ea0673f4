//! Flow table of one UDP association
//!
//! Maps each destination to the connection id multiplexing it on the
//! gateway channel, and each id back to the local client that should get
//! the replies. Records live until the association ends.

use crate::socks::types::TargetAddr;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// State of one logical UDP flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRecord {
    /// Identifier on the gateway channel
    pub conn_id: u16,
    /// SOCKS5 address type the client used for the destination
    pub addr_type: u8,
    /// Destination as requested by the client
    pub target: TargetAddr,
    /// Resolved destination written into gateway frames
    pub destination: SocketAddr,
    /// Local UDP endpoint replies are sent to
    pub client: SocketAddr,
}

/// Result of looking up a flow for an outgoing datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowEntry {
    /// Identifier on the gateway channel
    pub conn_id: u16,
    /// Resolved destination
    pub destination: SocketAddr,
    /// The client endpoint changed on this datagram
    pub rebound: bool,
}

#[derive(Debug)]
struct FlowTableInner {
    by_key: HashMap<TargetAddr, u16>,
    by_id: HashMap<u16, FlowRecord>,
    next_id: u16,
}

impl FlowTableInner {
    /// Next id in 1..=65535, skipping live ids while a free one exists
    fn allocate_id(&mut self) -> u16 {
        let mut candidate = self.next_id;
        for _ in 0..u16::MAX {
            if !self.by_id.contains_key(&candidate) {
                break;
            }
            candidate = next_conn_id(candidate);
        }
        self.next_id = next_conn_id(candidate);
        candidate
    }
}

/// Successor of a connection id; 0 is never produced
fn next_conn_id(id: u16) -> u16 {
    if id == u16::MAX {
        1
    } else {
        id + 1
    }
}

/// Concurrency-safe flow table
///
/// Written by the device-to-gateway pump, read by the gateway-to-device pump.
#[derive(Debug)]
pub struct FlowTable {
    inner: Mutex<FlowTableInner>,
}

impl Default for FlowTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowTable {
    /// Create an empty table whose first id is 1
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    fn starting_at(next_id: u16) -> Self {
        FlowTable {
            inner: Mutex::new(FlowTableInner {
                by_key: HashMap::new(),
                by_id: HashMap::new(),
                next_id: next_id.max(1),
            }),
        }
    }

    /// Look up an existing flow and record `client` as its current source
    ///
    /// Returns `None` when the destination has not been seen yet.
    pub async fn lookup(&self, target: &TargetAddr, client: SocketAddr) -> Option<FlowEntry> {
        let mut inner = self.inner.lock().await;
        let conn_id = *inner.by_key.get(target)?;
        let record = inner.by_id.get_mut(&conn_id)?;

        let rebound = record.client != client;
        record.client = client;

        Some(FlowEntry {
            conn_id,
            destination: record.destination,
            rebound,
        })
    }

    /// Create a flow for a destination seen for the first time
    ///
    /// An already known destination keeps its id and only gets its client
    /// endpoint updated.
    pub async fn insert(
        &self,
        target: TargetAddr,
        destination: SocketAddr,
        client: SocketAddr,
    ) -> FlowEntry {
        let mut inner = self.inner.lock().await;

        if let Some(conn_id) = inner.by_key.get(&target).copied() {
            if let Some(record) = inner.by_id.get_mut(&conn_id) {
                let rebound = record.client != client;
                record.client = client;
                return FlowEntry {
                    conn_id,
                    destination: record.destination,
                    rebound,
                };
            }
        }

        let conn_id = inner.allocate_id();
        if let Some(evicted) = inner.by_id.remove(&conn_id) {
            warn!(
                conn_id,
                evicted = %evicted.target,
                "Connection id space exhausted, reusing a live id"
            );
            inner.by_key.remove(&evicted.target);
        }

        debug!(conn_id, dest = %target, %destination, %client, "New UDP flow");

        inner.by_key.insert(target.clone(), conn_id);
        inner.by_id.insert(
            conn_id,
            FlowRecord {
                conn_id,
                addr_type: target.addr_type(),
                target,
                destination,
                client,
            },
        );

        FlowEntry {
            conn_id,
            destination,
            rebound: false,
        }
    }

    /// Client endpoint of a flow, for routing a gateway reply
    pub async fn client_for(&self, conn_id: u16) -> Option<SocketAddr> {
        self.inner
            .lock()
            .await
            .by_id
            .get(&conn_id)
            .map(|record| record.client)
    }

    /// Copy of a flow record
    pub async fn get(&self, conn_id: u16) -> Option<FlowRecord> {
        self.inner.lock().await.by_id.get(&conn_id).cloned()
    }

    /// Number of live flows
    pub async fn len(&self) -> usize {
        self.inner.lock().await.by_id.len()
    }

    /// Whether the table has no flows
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
