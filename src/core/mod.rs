//! # Core Components
//!
//! Bit-level encoding, message framing and outgoing packet buffers.
//!
//! ## Components
//! - **Bits**: boolean bit packing over a byte stream, typed helpers
//! - **Message**: `[u16 tag][payload]` frames and message type tags
//! - **Packet**: fixed-capacity per-channel send buffer
//!
//! ## Wire Format
//! ```text
//! packet: [Len(2)] [Tag(2)] [Payload(N)] [Len(2)] [Tag(2)] ...
//! ```

pub mod bits;
pub mod message;
pub mod packet;
