//! # Transport Layer
//!
//! The boundary to the byte transport, plus the connection variants built on it.
//!
//! ## Components
//! - **Transport**: `send(conn, channel, bytes)` contract implemented by the socket layer
//! - **Inbox**: single-producer queue handing receive events to the game loop
//! - **Remote**: network connection with one packet buffer per channel
//! - **Local**: in-process loopback between a host's client and server
//!
//! The transport itself (sockets, NAT traversal, congestion control, encryption)
//! lives outside this crate.

use bytes::Bytes;

use crate::error::TransportError;

pub mod inbox;
pub mod local;
pub mod remote;

/// Synchronous, non-blocking byte transport.
pub trait Transport {
    /// Hand one packet to the transport. Must not block and must not call back
    /// into the endpoint that owns the connection.
    fn send(
        &self,
        conn_id: i32,
        channel_id: u8,
        bytes: &[u8],
    ) -> std::result::Result<(), TransportError>;

    /// Close the transport-level connection. Default does nothing.
    fn disconnect(&self, _conn_id: i32) {}
}

/// What the transport reports from its receive side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected {
        conn_id: i32,
        address: String,
    },
    Data {
        conn_id: i32,
        channel_id: u8,
        bytes: Bytes,
    },
    Disconnected {
        conn_id: i32,
    },
}

impl TransportEvent {
    pub fn conn_id(&self) -> i32 {
        match self {
            TransportEvent::Connected { conn_id, .. }
            | TransportEvent::Data { conn_id, .. }
            | TransportEvent::Disconnected { conn_id } => *conn_id,
        }
    }
}
