//! Live-connection registry: tracks open client sockets, half-closes them on
//! shutdown, and provides the drain barrier the main thread waits on.

use crate::error::{BourseError, Result};
use crate::types::ConnectionId;
use log::debug;
use std::collections::HashMap;
use std::net::{Shutdown, TcpStream};
use std::sync::{Condvar, Mutex};

/// Cap on simultaneously open client connections.
pub const MAX_CLIENTS: usize = 1024;

#[derive(Debug)]
struct RegistryState {
    conns: HashMap<u64, TcpStream>,
    next_id: u64,
}

/// Set of open connections with a wait-until-empty barrier.
#[derive(Debug)]
pub struct ClientRegistry {
    state: Mutex<RegistryState>,
    empty: Condvar,
    capacity: usize,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::with_capacity(MAX_CLIENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                conns: HashMap::new(),
                next_id: 1,
            }),
            empty: Condvar::new(),
            capacity,
        }
    }

    /// Add a connection (a clone of the session's stream) to the set.
    pub fn register(&self, conn: TcpStream) -> Result<ConnectionId> {
        let mut state = self.state.lock().expect("client registry lock");
        if state.conns.len() >= self.capacity {
            return Err(BourseError::TooManyConnections);
        }
        let id = state.next_id;
        state.next_id += 1;
        state.conns.insert(id, conn);
        debug!("registered connection {} (total {})", id, state.conns.len());
        Ok(ConnectionId(id))
    }

    /// Remove a connection. Unknown ids are ignored. The transition to an
    /// empty set wakes every [`ClientRegistry::wait_for_empty`] caller.
    pub fn unregister(&self, id: ConnectionId) {
        let mut state = self.state.lock().expect("client registry lock");
        if state.conns.remove(&id.0).is_none() {
            return;
        }
        debug!("unregistered connection {} (total {})", id.0, state.conns.len());
        if state.conns.is_empty() {
            self.empty.notify_all();
        }
    }

    /// Half-close every registered socket (no further reads), so any session
    /// thread blocked on input observes end-of-stream and unwinds.
    pub fn shutdown_all(&self) {
        let state = self.state.lock().expect("client registry lock");
        debug!("shutting down {} client connections", state.conns.len());
        for conn in state.conns.values() {
            let _ = conn.shutdown(Shutdown::Read);
        }
    }

    /// Block until the set of registered connections is empty. Returns
    /// immediately if it already is.
    pub fn wait_for_empty(&self) {
        let mut state = self.state.lock().expect("client registry lock");
        while !state.conns.is_empty() {
            state = self.empty.wait(state).expect("client registry lock");
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("client registry lock").conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::stream_pair;
    use std::io::Read;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn register_then_unregister_empties_the_set() {
        let registry = ClientRegistry::new();
        let (a, _peer) = stream_pair();
        let id = registry.register(a).unwrap();
        assert_eq!(registry.len(), 1);
        registry.unregister(id);
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_unknown_id_is_a_no_op() {
        let registry = ClientRegistry::new();
        registry.unregister(ConnectionId(42));
        assert!(registry.is_empty());
    }

    #[test]
    fn register_fails_at_capacity() {
        let registry = ClientRegistry::with_capacity(1);
        let (a, _pa) = stream_pair();
        let (b, _pb) = stream_pair();
        registry.register(a).unwrap();
        assert!(matches!(
            registry.register(b),
            Err(BourseError::TooManyConnections)
        ));
    }

    #[test]
    fn wait_for_empty_returns_immediately_when_empty() {
        let registry = ClientRegistry::new();
        registry.wait_for_empty();
    }

    #[test]
    fn wait_for_empty_blocks_until_last_unregister() {
        let registry = Arc::new(ClientRegistry::new());
        let (a, _peer) = stream_pair();
        let id = registry.register(a).unwrap();

        let waiter = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.wait_for_empty())
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        registry.unregister(id);
        waiter.join().unwrap();
    }

    #[test]
    fn shutdown_all_half_closes_sockets() {
        let registry = ClientRegistry::new();
        let (local, _peer) = stream_pair();
        let mut reader = local.try_clone().unwrap();
        registry.register(local).unwrap();

        registry.shutdown_all();

        // The read half is shut down: a blocked read observes EOF.
        let mut buf = [0u8; 1];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }
}
