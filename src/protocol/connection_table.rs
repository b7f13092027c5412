//! # Connection Table
//!
//! One address space for remote and local connections.
//!
//! ```text
//!   id:   ... -3  -2  -1 | 0   1   2 ...
//!         local[2] [1] [0] | remote[0] [1] [2]
//! ```
//!
//! Remote ids come from the transport and index a dense list with empty slots.
//! Local ids are handed out by [`ConnectionTable::add_local`] as `-(index + 1)`;
//! removal tombstones the slot and never compacts, so surviving local ids stay
//! valid and no local id is ever reissued.

use tracing::{debug, error};

use crate::error::{constants, NetError, Result};
use crate::protocol::connection::{Connection, NetworkInstanceId};

type Slot = Option<Box<dyn Connection>>;

#[derive(Default)]
pub struct ConnectionTable {
    remote: Vec<Slot>,
    local: Vec<Slot>,
}

#[inline]
fn local_index(id: i32) -> usize {
    debug_assert!(id < 0, "local ids are negative, got {id}");
    (-(id + 1)) as usize
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a remote connection at `id`. Negative or occupied ids are rejected.
    pub fn add(&mut self, id: i32, connection: Box<dyn Connection>) -> Result<()> {
        if id < 0 {
            error!(id, "{}", constants::ERR_NEGATIVE_CONNECTION_ID);
            return Err(NetError::InvalidConnectionId(id));
        }
        let index = id as usize;
        if matches!(self.remote.get(index), Some(Some(_))) {
            error!(id, "{}", constants::ERR_DUPLICATE_CONNECTION);
            return Err(NetError::DuplicateConnection(id));
        }
        if self.remote.len() <= index {
            self.remote.resize_with(index + 1, || None);
        }
        self.remote[index] = Some(connection);
        debug!(id, "Connection added");
        Ok(())
    }

    /// Append a local connection and return its new id.
    pub fn add_local(&mut self, mut connection: Box<dyn Connection>) -> i32 {
        let id = -(self.local.len() as i32) - 1;
        connection.info_mut().set_connection_id(id);
        self.local.push(Some(connection));
        debug!(id, "Local connection added");
        id
    }

    /// Lookup on the trusted path. A local id must already be known to be valid;
    /// an out-of-range remote id is logged.
    pub fn get(&self, id: i32) -> Option<&dyn Connection> {
        if id < 0 {
            return self.local[local_index(id)].as_deref();
        }
        match self.remote.get(id as usize) {
            Some(slot) => slot.as_deref(),
            None => {
                error!(id, "{}", constants::ERR_CONNECTION_OUT_OF_RANGE);
                None
            }
        }
    }

    pub fn get_mut(&mut self, id: i32) -> Option<&mut (dyn Connection + 'static)> {
        if id < 0 {
            return self.local[local_index(id)].as_deref_mut();
        }
        match self.remote.get_mut(id as usize) {
            Some(slot) => slot.as_deref_mut(),
            None => {
                error!(id, "{}", constants::ERR_CONNECTION_OUT_OF_RANGE);
                None
            }
        }
    }

    /// Lookup that treats any unknown id as an expected miss.
    pub fn get_unsafe(&self, id: i32) -> Option<&dyn Connection> {
        let slot = if id < 0 {
            self.local.get(local_index(id))
        } else {
            self.remote.get(id as usize)
        };
        slot.and_then(|s| s.as_deref())
    }

    pub fn get_unsafe_mut(&mut self, id: i32) -> Option<&mut (dyn Connection + 'static)> {
        let slot = if id < 0 {
            self.local.get_mut(local_index(id))
        } else {
            self.remote.get_mut(id as usize)
        };
        slot.and_then(|s| s.as_deref_mut())
    }

    /// Tombstone the slot and hand back what was in it.
    pub fn remove(&mut self, id: i32) -> Option<Box<dyn Connection>> {
        let slot = if id < 0 {
            self.local.get_mut(local_index(id))
        } else {
            self.remote.get_mut(id as usize)
        };
        let removed = slot.and_then(Option::take);
        if removed.is_some() {
            debug!(id, "Connection removed");
        }
        removed
    }

    /// Whether any connection, local first then remote, controls `net_id`.
    pub fn contains_player(&self, net_id: NetworkInstanceId) -> bool {
        let lowest = -(self.local.len() as i32);
        (lowest..self.remote.len() as i32)
            .filter_map(|id| self.get_unsafe(id))
            .any(|conn| conn.info().controls_object(net_id))
    }

    /// Ids of live connections, local ids first.
    pub fn ids(&self) -> Vec<i32> {
        let lowest = -(self.local.len() as i32);
        (lowest..self.remote.len() as i32)
            .filter(|&id| self.get_unsafe(id).is_some())
            .collect()
    }

    /// Number of remote slots, including empty ones.
    pub fn remote_slots(&self) -> usize {
        self.remote.len()
    }

    /// Number of local slots, including tombstones.
    pub fn local_slots(&self) -> usize {
        self.local.len()
    }

    /// Number of live remote connections.
    pub fn remote_len(&self) -> usize {
        self.remote.iter().flatten().count()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.remote.iter().chain(&self.local).flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ConnectionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionTable")
            .field("remote_slots", &self.remote.len())
            .field("local_slots", &self.local.len())
            .field("live", &self.len())
            .finish()
    }
}
