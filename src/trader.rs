//! Logged-in sessions (traders) and the process-wide session registry.
//!
//! A [`Trader`] binds a connection's write half to an account. Shared
//! ownership is `Arc<Trader>`: the registry holds one strong reference,
//! every resting order holds one, and a broadcast holds one per recipient
//! for the duration of the delivery. The socket is closed exactly once,
//! when the last reference drops. Packet writes to one socket are
//! serialized by the per-trader lock so concurrent senders (session thread,
//! matcher, broadcasts) cannot interleave bytes.

use crate::error::{BourseError, Result};
use crate::ledger::{Account, AccountLedger};
use crate::protocol::{self, PacketHeader, PacketType, StatusInfo};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};

/// Cap on simultaneously logged-in traders.
pub const MAX_TRADERS: usize = 64;

/// A logged-in session: user name, account, and the connection write half.
#[derive(Debug)]
pub struct Trader {
    name: String,
    account: Arc<Account>,
    conn: Mutex<TcpStream>,
}

impl Trader {
    fn new(conn: TcpStream, name: String, account: Arc<Account>) -> Self {
        Self {
            name,
            account,
            conn: Mutex::new(conn),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn account(&self) -> &Arc<Account> {
        &self.account
    }

    /// Write one packet under the trader lock.
    pub fn send_packet(&self, header: &PacketHeader, payload: &[u8]) -> Result<()> {
        let mut conn = self.conn.lock().expect("trader lock");
        protocol::send_packet(&mut *conn, header, payload)
    }

    /// ACK with an optional STATUS_INFO payload (LOGIN acks carry none).
    pub fn send_ack(&self, info: Option<&StatusInfo>) -> Result<()> {
        match info {
            Some(info) => {
                let header = PacketHeader::now(PacketType::Ack, StatusInfo::SIZE as u16);
                self.send_packet(&header, &info.to_bytes())
            }
            None => {
                let header = PacketHeader::now(PacketType::Ack, 0);
                self.send_packet(&header, &[])
            }
        }
    }

    pub fn send_nack(&self) -> Result<()> {
        let header = PacketHeader::now(PacketType::Nack, 0);
        self.send_packet(&header, &[])
    }
}

/// Process-wide map from user name to live session.
#[derive(Debug)]
pub struct TraderRegistry {
    traders: Mutex<HashMap<String, Arc<Trader>>>,
    capacity: usize,
}

impl TraderRegistry {
    pub fn new() -> Self {
        Self::with_capacity(MAX_TRADERS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            traders: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Log `name` in over `conn`.
    ///
    /// Atomically checks the capacity and name availability, resolves the
    /// account through the ledger, and inserts the new session. A name that
    /// is already present is refused; residual orders of a previous session
    /// do not hold the name, only the registry entry does.
    pub fn login(
        &self,
        conn: TcpStream,
        name: &str,
        ledger: &AccountLedger,
    ) -> Result<Arc<Trader>> {
        let mut traders = self.traders.lock().expect("registry lock");
        if traders.contains_key(name) {
            return Err(BourseError::AlreadyLoggedIn(name.to_string()));
        }
        if traders.len() >= self.capacity {
            return Err(BourseError::RegistryFull);
        }
        let account = ledger.lookup(name)?;
        let trader = Arc::new(Trader::new(conn, name.to_string(), account));
        traders.insert(name.to_string(), Arc::clone(&trader));
        info!("trader '{}' logged in", name);
        Ok(trader)
    }

    /// Drop the registry's reference to `trader` and free its name.
    ///
    /// References held by resting orders keep the session (and its socket)
    /// alive until the matcher or a cancel releases them.
    pub fn logout(&self, trader: &Arc<Trader>) {
        let mut traders = self.traders.lock().expect("registry lock");
        if let Some(current) = traders.get(trader.name()) {
            if Arc::ptr_eq(current, trader) {
                traders.remove(trader.name());
                info!("trader '{}' logged out", trader.name());
            }
        }
    }

    /// Deliver a packet to every logged-in trader.
    ///
    /// Snapshot semantics: the recipient list is captured under the registry
    /// lock, then delivery happens without it. Per-recipient failures are
    /// logged and swallowed.
    pub fn broadcast(&self, header: &PacketHeader, payload: &[u8]) {
        let recipients: Vec<Arc<Trader>> = {
            let traders = self.traders.lock().expect("registry lock");
            traders.values().cloned().collect()
        };
        for trader in recipients {
            if let Err(e) = trader.send_packet(header, payload) {
                warn!("broadcast to '{}' failed: {}", trader.name(), e);
            }
        }
        debug!("broadcast packet type {}", header.packet_type);
    }

    pub fn len(&self) -> usize {
        self.traders.lock().expect("registry lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TraderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
