//! # Receive Inbox
//!
//! Hands completed receive events from a transport I/O thread to the game loop.
//!
//! The I/O side owns the single [`InboxSender`]; the game loop owns the [`Inbox`]
//! and drains it once per tick without blocking. Connection tables, packet
//! buffers and dispatch tables are only ever touched from the draining side.
//!
//! ## Usage
//! ```rust
//! use game_netcore::transport::inbox::inbox;
//! use game_netcore::transport::TransportEvent;
//!
//! let (tx, mut rx) = inbox();
//! std::thread::spawn(move || {
//!     tx.push(TransportEvent::Disconnected { conn_id: 3 }).ok();
//! })
//! .join()
//! .unwrap();
//!
//! let events = rx.drain(16);
//! assert_eq!(events.len(), 1);
//! ```

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{NetError, Result};
use crate::transport::TransportEvent;

/// Create a connected sender/receiver pair.
pub fn inbox() -> (InboxSender, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InboxSender { tx }, Inbox { rx })
}

/// Producer half, owned by the transport I/O thread.
#[derive(Debug)]
pub struct InboxSender {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl InboxSender {
    /// Queue an event. Fails only once the inbox has been dropped.
    pub fn push(&self, event: TransportEvent) -> Result<()> {
        trace!(conn_id = event.conn_id(), "Queued transport event");
        self.tx.send(event).map_err(|_| NetError::NotConnected)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by the game loop.
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Inbox {
    /// Next queued event, if any. Never blocks.
    pub fn try_next(&mut self) -> Option<TransportEvent> {
        self.rx.try_recv().ok()
    }

    /// Up to `max` queued events in arrival order.
    pub fn drain(&mut self, max: usize) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while events.len() < max {
            match self.try_next() {
                Some(event) => events.push(event),
                None => break,
            }
        }
        events
    }

    /// Wait for the next event from async code.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}
