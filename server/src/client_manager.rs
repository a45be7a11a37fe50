//! Connection tracking for the UDP transport
//!
//! This module maps network addresses to player identities:
//! - Connection lifecycle (join, leave, heartbeat timeout)
//! - Address lookup for routing inbound packets to a player
//! - Capacity enforcement for concurrent connections
//!
//! A connection is transport state only. The player record it points at lives
//! in the game's lobby and survives the connection, so a player that times out
//! can rejoin later with the same ID and keep their wallet.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Silence after which a connection is considered gone
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// A live transport binding between an address and a player
#[derive(Debug)]
pub struct Connection {
    /// Player this connection speaks for
    pub player_id: String,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this address
    pub last_seen: Instant,
}

impl Connection {
    pub fn new(player_id: String, addr: SocketAddr) -> Self {
        Self {
            player_id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Records activity on the connection
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if nothing has arrived within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Registry of live connections, indexed by address
///
/// A player can be bound to at most one address. Joining from a new address
/// moves the binding, which is how a client that changed ports reconnects.
pub struct ConnectionManager {
    connections: HashMap<SocketAddr, Connection>,
    /// Maximum number of concurrent connections allowed
    max_connections: usize,
}

impl ConnectionManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            max_connections,
        }
    }

    /// Binds `player_id` to `addr`
    ///
    /// Returns false if the server is full. Rebinding an address or a player
    /// that is already connected never counts against capacity.
    pub fn add(&mut self, player_id: &str, addr: SocketAddr) -> bool {
        if let Some(previous) = self.addr_of_player(player_id) {
            if previous != addr {
                self.connections.remove(&previous);
            }
        }

        if !self.connections.contains_key(&addr) && self.connections.len() >= self.max_connections
        {
            return false;
        }

        info!("Player {} connected from {}", player_id, addr);
        self.connections
            .insert(addr, Connection::new(player_id.to_string(), addr));
        true
    }

    /// Drops the connection at `addr`, returning the player it belonged to
    pub fn remove(&mut self, addr: SocketAddr) -> Option<String> {
        self.connections.remove(&addr).map(|connection| {
            info!("Player {} left from {}", connection.player_id, addr);
            connection.player_id
        })
    }

    /// Finds the player bound to `addr` and refreshes its activity timestamp
    pub fn touch(&mut self, addr: SocketAddr) -> Option<String> {
        self.connections.get_mut(&addr).map(|connection| {
            connection.touch();
            connection.player_id.clone()
        })
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<&str> {
        self.connections
            .get(&addr)
            .map(|connection| connection.player_id.as_str())
    }

    pub fn addr_of_player(&self, player_id: &str) -> Option<SocketAddr> {
        self.connections
            .values()
            .find(|connection| connection.player_id == player_id)
            .map(|connection| connection.addr)
    }

    /// Checks for and removes timed-out connections
    ///
    /// Returns the player IDs that were dropped so the game can mark them
    /// disconnected.
    pub fn check_timeouts(&mut self) -> Vec<String> {
        self.expire(CONNECTION_TIMEOUT)
    }

    fn expire(&mut self, timeout: Duration) -> Vec<String> {
        let timed_out: Vec<SocketAddr> = self
            .connections
            .values()
            .filter(|connection| connection.is_timed_out(timeout))
            .map(|connection| connection.addr)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|addr| {
                let player_id = self.connections.remove(&addr)?.player_id;
                info!("Player {} timed out", player_id);
                Some(player_id)
            })
            .collect()
    }

    /// All addresses for broadcasting
    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.connections.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_connection_timeout() {
        let mut connection = Connection::new("p1".to_string(), test_addr());
        assert!(!connection.is_timed_out(Duration::from_secs(1)));

        connection.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(connection.is_timed_out(Duration::from_secs(1)));

        connection.touch();
        assert!(!connection.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_add_and_lookup() {
        let mut manager = ConnectionManager::new(4);
        assert!(manager.is_empty());

        assert!(manager.add("p1", test_addr()));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.find_by_addr(test_addr()), Some("p1"));
        assert_eq!(manager.addr_of_player("p1"), Some(test_addr()));
        assert_eq!(manager.find_by_addr(test_addr2()), None);
    }

    #[test]
    fn test_capacity_enforced() {
        let mut manager = ConnectionManager::new(1);

        assert!(manager.add("p1", test_addr()));
        assert!(!manager.add("p2", test_addr2()));
        assert_eq!(manager.len(), 1);

        // Rejoining from the same address is not a new slot.
        assert!(manager.add("p1", test_addr()));
    }

    #[test]
    fn test_rejoin_from_new_address_moves_binding() {
        let mut manager = ConnectionManager::new(1);

        assert!(manager.add("p1", test_addr()));
        assert!(manager.add("p1", test_addr2()));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.addr_of_player("p1"), Some(test_addr2()));
        assert_eq!(manager.find_by_addr(test_addr()), None);
    }

    #[test]
    fn test_remove() {
        let mut manager = ConnectionManager::new(2);
        manager.add("p1", test_addr());

        assert_eq!(manager.remove(test_addr()), Some("p1".to_string()));
        assert_eq!(manager.remove(test_addr()), None);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_touch_returns_player() {
        let mut manager = ConnectionManager::new(2);
        manager.add("p1", test_addr());

        assert_eq!(manager.touch(test_addr()), Some("p1".to_string()));
        assert_eq!(manager.touch(test_addr2()), None);
    }

    #[test]
    fn test_expire_drops_silent_connections() {
        let mut manager = ConnectionManager::new(2);
        manager.add("p1", test_addr());
        manager.add("p2", test_addr2());

        if let Some(connection) = manager.connections.get_mut(&test_addr()) {
            connection.last_seen = Instant::now() - Duration::from_secs(10);
        }

        assert_eq!(manager.check_timeouts(), vec!["p1".to_string()]);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.addrs(), vec![test_addr2()]);
        assert!(manager.expire(Duration::from_secs(60)).is_empty());
    }
}
