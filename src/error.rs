//! # Error Types
//!
//! Error handling for the message channel core.
//!
//! This module defines every error variant that can surface from the bit codec,
//! packet buffers, connection table, dispatch table and the loopback path.
//!
//! ## Error Categories
//! - **Codec Errors**: Reads past the end of a buffer, invalid UTF-8, malformed frames
//! - **Channel Errors**: Oversized messages, transport failures
//! - **Addressing Errors**: Invalid, duplicate or unknown connection ids
//! - **Registration Errors**: Attempts to claim a reserved message type
//!
//! Nothing in this crate treats an error as fatal to the process. The worst outcome
//! of any error is a dropped message or a stalled reliable channel.
//!
//! ## Example Usage
//! ```rust
//! use game_netcore::core::bits::{BitRead, BitReader};
//! use game_netcore::error::{NetError, Result};
//!
//! fn read_health(bytes: &[u8]) -> Result<u16> {
//!     let mut reader = BitReader::new(bytes);
//!     reader.read_u16()
//! }
//!
//! match read_health(&[0x01]) {
//!     Err(NetError::EndOfStream { needed, remaining }) => {
//!         assert_eq!((needed, remaining), (2, 1));
//!     }
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Static messages for the log-and-continue paths.
pub mod constants {
    pub const ERR_RESERVED_MSG_TYPE: &str = "Message type is in the reserved system range";
    pub const ERR_NEGATIVE_CONNECTION_ID: &str = "Connection id must not be negative";
    pub const ERR_DUPLICATE_CONNECTION: &str = "Connection id already in use";
    pub const ERR_CONNECTION_OUT_OF_RANGE: &str = "Connection id out of range";
    pub const ERR_EMPTY_LOCAL_PAYLOAD: &str = "Cannot send zero bytes to the local server";
    pub const ERR_MALFORMED_FRAME: &str = "Malformed message frame";
    pub const ERR_UNHANDLED_MSG_TYPE: &str = "No handler registered for message type";
}

/// Reasons the underlying transport refused a send.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Transient: the transport has no buffer space right now.
    #[error("transport out of resources")]
    NoResources,

    /// Permanent failure reported by the transport.
    #[error("transport error code {code}")]
    Hard { code: u8 },
}

/// Primary error type for the crate
#[derive(Error, Debug)]
pub enum NetError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("End of stream: needed {needed} bytes, {remaining} remaining")]
    EndOfStream { needed: usize, remaining: usize },

    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Message of {size} bytes does not fit a {capacity} byte packet")]
    MessageTooLarge { size: usize, capacity: usize },

    #[error("Value too long to encode: {0} bytes")]
    FieldTooLong(usize),

    #[error("Message type {0} is reserved for the system")]
    ReservedMessageType(u16),

    #[error("Invalid connection id {0}")]
    InvalidConnectionId(i32),

    #[error("Connection id {0} already in use")]
    DuplicateConnection(i32),

    #[error("Connection limit of {0} reached")]
    TooManyConnections(usize),

    #[error("Unknown connection {0}")]
    UnknownConnection(i32),

    #[error("Invalid channel {0}")]
    InvalidChannel(u8),

    #[error("Zero-length payload on local connection")]
    EmptyPayload,

    #[error("Not connected")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Type alias for Results using NetError
pub type Result<T> = std::result::Result<T, NetError>;
