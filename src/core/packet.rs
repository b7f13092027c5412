//! # Packet Buffer
//!
//! Fixed-capacity accumulation buffer for one outgoing packet on one channel of
//! one connection.
//!
//! Messages are appended as `[u16 length][frame]` records, where `frame` is the
//! `[u16 tag][payload]` message frame. The buffer is handed to the transport as a
//! single unit.
//!
//! ## Send Policy
//! - Success: cursor resets to zero.
//! - Reliable channel, transport out of resources: content is kept and the call
//!   reports [`SendStatus::Retry`]; the next send transmits the same bytes.
//! - Anything else: the content is dropped and the error is returned.
//!
//! Capacity is the caller's job: check [`PacketBuffer::has_space`] before
//! [`PacketBuffer::write`]. Writing past capacity is a programming error and panics.

use tracing::{debug, error, warn};

use crate::error::{NetError, Result, TransportError};
use crate::transport::Transport;

/// Size of the per-record length prefix inside a packet.
pub const RECORD_HEADER_SIZE: usize = 2;

/// Outcome of handing a buffer to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Bytes were accepted.
    Sent,
    /// Reliable channel is stalled; content retained for a later attempt.
    Retry,
}

/// One outgoing packet under construction.
#[derive(Debug)]
pub struct PacketBuffer {
    buffer: Box<[u8]>,
    position: usize,
    reliable: bool,
}

impl PacketBuffer {
    pub fn new(capacity: usize, reliable: bool) -> Self {
        Self {
            buffer: vec![0u8; capacity].into_boxed_slice(),
            position: 0,
            reliable,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.position == 0
    }

    #[inline]
    pub fn is_reliable(&self) -> bool {
        self.reliable
    }

    #[inline]
    pub fn has_space(&self, n: usize) -> bool {
        self.position + n <= self.buffer.len()
    }

    /// Valid prefix of the buffer.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer[..self.position]
    }

    /// Copy `bytes` at the cursor. Panics if the caller skipped the space check.
    pub fn write(&mut self, bytes: &[u8]) {
        debug_assert!(
            self.has_space(bytes.len()),
            "packet buffer overflow: {} + {} > {}",
            self.position,
            bytes.len(),
            self.buffer.len()
        );
        let end = self.position + bytes.len();
        self.buffer[self.position..end].copy_from_slice(bytes);
        self.position = end;
    }

    /// Room needed by [`PacketBuffer::write_record`] for a frame of `frame_len` bytes.
    #[inline]
    pub fn record_size(frame_len: usize) -> usize {
        RECORD_HEADER_SIZE + frame_len
    }

    /// Append a length-prefixed message frame. Same space contract as `write`.
    pub fn write_record(&mut self, frame: &[u8]) -> Result<()> {
        let len = u16::try_from(frame.len()).map_err(|_| NetError::FieldTooLong(frame.len()))?;
        self.write(&len.to_le_bytes());
        self.write(frame);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.position = 0;
    }

    /// Hand the valid prefix to the transport.
    pub fn send_to_transport(
        &mut self,
        transport: &dyn Transport,
        conn_id: i32,
        channel_id: u8,
    ) -> Result<SendStatus> {
        match transport.send(conn_id, channel_id, self.as_slice()) {
            Ok(()) => {
                debug!(conn_id, channel_id, bytes = self.position, "Packet sent");
                self.position = 0;
                Ok(SendStatus::Sent)
            }
            Err(TransportError::NoResources) if self.reliable => {
                warn!(
                    conn_id,
                    channel_id,
                    bytes = self.position,
                    "Transport out of resources, keeping reliable packet for retry"
                );
                Ok(SendStatus::Retry)
            }
            Err(e) => {
                error!(
                    conn_id,
                    channel_id,
                    bytes = self.position,
                    error = %e,
                    "Failed to send packet, dropping"
                );
                self.position = 0;
                Err(NetError::Transport(e))
            }
        }
    }
}

/// Iterator over the message frames batched in a received packet.
#[derive(Debug, Clone)]
pub struct PacketRecords<'a> {
    rest: &'a [u8],
}

/// Walk the `[u16 length][frame]` records of a packet in order.
pub fn split_packet(packet: &[u8]) -> PacketRecords<'_> {
    PacketRecords { rest: packet }
}

impl<'a> Iterator for PacketRecords<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        if self.rest.len() < RECORD_HEADER_SIZE {
            let err = NetError::MalformedFrame(format!(
                "{} trailing bytes cannot hold a record header",
                self.rest.len()
            ));
            self.rest = &[];
            return Some(Err(err));
        }
        let len = usize::from(u16::from_le_bytes([self.rest[0], self.rest[1]]));
        let body = &self.rest[RECORD_HEADER_SIZE..];
        if body.len() < len {
            let err = NetError::MalformedFrame(format!(
                "record claims {len} bytes, {} available",
                body.len()
            ));
            self.rest = &[];
            return Some(Err(err));
        }
        let (frame, rest) = body.split_at(len);
        self.rest = rest;
        Some(Ok(frame))
    }
}
