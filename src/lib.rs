//! # Game Netcore
//!
//! Message channels for a client/server game networking layer.
//!
//! Turns a byte transport into addressable, multiplexed message channels with
//! bit-packed booleans, and gives a host process an in-process loopback path so it
//! can be client and server at once.
//!
//! ## Layers
//! - [`core`]: bit codec, message framing, packet buffers
//! - [`protocol`]: connections, connection table, dispatch table, server endpoint
//! - [`transport`]: transport contract, remote connections, receive inbox, loopback
//! - [`utils`]: logging setup, message pool, metrics
//!
//! ## Threading
//! Everything except [`transport::inbox::InboxSender`] and [`utils::Metrics`] is
//! single-threaded and driven by the game loop once per tick.
//!
//! ## Example
//! ```rust
//! use std::rc::Rc;
//! use game_netcore::config::NetworkConfig;
//! use game_netcore::core::message::msg_type;
//! use game_netcore::protocol::endpoint::ServerEndpoint;
//! use game_netcore::transport::local::LocalClient;
//!
//! let config = NetworkConfig::default();
//! let server = Rc::new(ServerEndpoint::new(&config));
//! server.register_handler(msg_type::HIGHEST + 1, |msg| {
//!     assert_eq!(msg.reader.read_to_end(), b"hello");
//! })?;
//!
//! let mut client = LocalClient::new(&config.loopback);
//! client.connect(&server, true);
//! client.send(msg_type::HIGHEST + 1, b"hello", 0)?;
//! client.update();
//! # Ok::<(), game_netcore::error::NetError>(())
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use config::NetworkConfig;
pub use error::{NetError, Result, TransportError};
pub use protocol::connection::Connection;
pub use protocol::endpoint::ServerEndpoint;
pub use transport::local::LocalClient;
