//! # Utility Modules
//!
//! Supporting utilities shared by the channel and loopback code.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup from [`LoggingConfig`](crate::config::LoggingConfig)
//! - **Message Pool**: recycled payload buffers for the loopback queue
//! - **Metrics**: atomic counters for message and packet flow

pub mod logging;
pub mod message_pool;
pub mod metrics;

pub use message_pool::MessagePool;
pub use metrics::{Metrics, MetricsSnapshot};
