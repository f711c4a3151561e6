//! Connection tracking for the server.
//!
//! Every socket address that has sent traffic gets a record here: display
//! name, optional authenticated identity, where the client currently is
//! (idle, queued or in a match) and when we last heard from it. A periodic
//! sweep removes connections that have gone silent, which is the server's
//! only liveness signal over UDP.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Where a connection currently lives in the matchmaking flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientLocation {
    Idle,
    Queued,
    InMatch(u64),
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub addr: SocketAddr,
    pub display_name: String,
    pub username: Option<String>,
    pub location: ClientLocation,
    /// Last time any packet arrived from this address.
    pub last_seen: Instant,
}

impl Connection {
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All currently known connections, keyed by source address.
#[derive(Default)]
pub struct ConnectionTable {
    connections: HashMap<SocketAddr, Connection>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    /// Registers a connection or refreshes its identity, marking it seen.
    pub fn upsert(&mut self, addr: SocketAddr, display_name: String, username: Option<String>) {
        match self.connections.get_mut(&addr) {
            Some(conn) => {
                conn.display_name = display_name;
                conn.username = username;
                conn.last_seen = Instant::now();
            }
            None => {
                info!("New connection from {} ({})", addr, display_name);
                self.connections.insert(
                    addr,
                    Connection {
                        addr,
                        display_name,
                        username,
                        location: ClientLocation::Idle,
                        last_seen: Instant::now(),
                    },
                );
            }
        }
    }

    /// Marks a connection as seen. No-op for unknown addresses.
    pub fn touch(&mut self, addr: SocketAddr) {
        if let Some(conn) = self.connections.get_mut(&addr) {
            conn.last_seen = Instant::now();
        }
    }

    pub fn set_location(&mut self, addr: SocketAddr, location: ClientLocation) {
        if let Some(conn) = self.connections.get_mut(&addr) {
            conn.location = location;
        }
    }

    pub fn get(&self, addr: SocketAddr) -> Option<&Connection> {
        self.connections.get(&addr)
    }

    pub fn remove(&mut self, addr: SocketAddr) -> Option<Connection> {
        let removed = self.connections.remove(&addr);
        if let Some(conn) = &removed {
            info!("Connection from {} ({}) removed", addr, conn.display_name);
        }
        removed
    }

    /// Removes and returns every connection that has been silent longer
    /// than `timeout`, so the caller can release queue slots and sessions.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<Connection> {
        let timed_out: Vec<SocketAddr> = self
            .connections
            .values()
            .filter(|conn| conn.is_timed_out(timeout))
            .map(|conn| conn.addr)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|addr| {
                let conn = self.connections.remove(&addr)?;
                info!("Connection from {} timed out", addr);
                Some(conn)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
