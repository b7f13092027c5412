//! # Protocol Layer
//!
//! Connection addressing and message routing.
//!
//! ## Components
//! - **Connection**: shared connection state and the `Connection` send contract
//! - **ConnectionTable**: one id space for remote (`>= 0`) and local (`< 0`) connections
//! - **Dispatcher**: message type to handler routing
//! - **Endpoint**: server-side owner of the tables, fed by local clients and the transport
//!
//! ## Reserved Tags
//! Message types `0..=31` belong to the system and cannot be claimed through
//! `Dispatcher::register`.

pub mod connection;
pub mod connection_table;
pub mod dispatcher;
pub mod endpoint;
