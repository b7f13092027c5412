//! # Connections
//!
//! A connection is an addressable endpoint: remote connections have ids `>= 0`,
//! loopback connections have negative ids assigned by the
//! [`ConnectionTable`](crate::protocol::connection_table::ConnectionTable).
//!
//! Every variant shares [`ConnectionInfo`] (id, address, last activity and the
//! player-controller slots) and implements [`Connection::send_bytes`] for its own
//! delivery path.

use std::time::Instant;

use crate::core::message::pack_message;
use crate::core::packet::SendStatus;
use crate::error::Result;

/// Identity of a networked object controlled by a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkInstanceId(pub u32);

/// A player object attached to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerController {
    pub player_controller_id: i16,
    pub net_id: NetworkInstanceId,
}

/// State shared by every connection variant.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    connection_id: i32,
    address: String,
    last_message_time: Instant,
    is_ready: bool,
    player_controllers: Vec<Option<PlayerController>>,
}

impl ConnectionInfo {
    pub fn new(connection_id: i32, address: impl Into<String>) -> Self {
        Self {
            connection_id,
            address: address.into(),
            last_message_time: Instant::now(),
            is_ready: false,
            player_controllers: Vec::new(),
        }
    }

    #[inline]
    pub fn connection_id(&self) -> i32 {
        self.connection_id
    }

    pub fn set_connection_id(&mut self, connection_id: i32) {
        self.connection_id = connection_id;
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn last_message_time(&self) -> Instant {
        self.last_message_time
    }

    /// Record inbound activity.
    pub fn touch(&mut self) {
        self.last_message_time = Instant::now();
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.is_ready = ready;
    }

    /// Store `player` in its slot, growing the slot list as needed.
    pub fn set_player_controller(&mut self, player: PlayerController) {
        let Ok(slot) = usize::try_from(player.player_controller_id) else {
            return;
        };
        if self.player_controllers.len() <= slot {
            self.player_controllers.resize(slot + 1, None);
        }
        self.player_controllers[slot] = Some(player);
    }

    pub fn player_controller(&self, player_controller_id: i16) -> Option<&PlayerController> {
        let slot = usize::try_from(player_controller_id).ok()?;
        self.player_controllers.get(slot)?.as_ref()
    }

    /// Empty the slot. Later slots keep their index.
    pub fn remove_player_controller(&mut self, player_controller_id: i16) -> bool {
        usize::try_from(player_controller_id)
            .ok()
            .and_then(|slot| self.player_controllers.get_mut(slot))
            .and_then(Option::take)
            .is_some()
    }

    pub fn player_controllers(&self) -> impl Iterator<Item = &PlayerController> {
        self.player_controllers.iter().flatten()
    }

    pub fn controls_object(&self, net_id: NetworkInstanceId) -> bool {
        self.player_controllers().any(|p| p.net_id == net_id)
    }
}

/// An endpoint messages can be sent to.
pub trait Connection {
    fn info(&self) -> &ConnectionInfo;

    fn info_mut(&mut self) -> &mut ConnectionInfo;

    /// Deliver one `[u16 tag][payload]` frame on `channel_id`.
    fn send_bytes(&mut self, frame: &[u8], channel_id: u8) -> Result<SendStatus>;

    /// Push any buffered bytes to the wire.
    fn flush(&mut self) -> Result<SendStatus> {
        Ok(SendStatus::Sent)
    }

    /// True for in-process connections.
    fn is_local(&self) -> bool {
        false
    }

    /// Called once, after the connection has left its table.
    fn close(&mut self) {}

    fn connection_id(&self) -> i32 {
        self.info().connection_id()
    }

    fn send(&mut self, msg_type: u16, payload: &[u8], channel_id: u8) -> Result<SendStatus> {
        let frame = pack_message(msg_type, payload);
        self.send_bytes(&frame, channel_id)
    }
}
