//! # Remote Connection
//!
//! A connection reached through the byte transport. Each configured channel gets
//! its own [`PacketBuffer`]; messages are batched into the buffer and flushed when
//! it fills or when [`Connection::flush`] is called.

use std::rc::Rc;
use std::sync::Arc;

use tracing::{error, warn};

use crate::config::NetworkConfig;
use crate::core::message::unpack_message;
use crate::core::packet::{split_packet, PacketBuffer, SendStatus};
use crate::error::{NetError, Result};
use crate::protocol::connection::{Connection, ConnectionInfo};
use crate::transport::Transport;
use crate::utils::metrics::Metrics;

pub struct RemoteConnection {
    info: ConnectionInfo,
    transport: Rc<dyn Transport>,
    channels: Vec<PacketBuffer>,
    metrics: Arc<Metrics>,
}

impl RemoteConnection {
    pub fn new(
        conn_id: i32,
        address: impl Into<String>,
        transport: Rc<dyn Transport>,
        config: &NetworkConfig,
    ) -> Self {
        let channels = config
            .channels
            .iter()
            .map(|c| PacketBuffer::new(config.connection.packet_size, c.qos.is_reliable()))
            .collect();
        Self {
            info: ConnectionInfo::new(conn_id, address),
            transport,
            channels,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn channel(&self, channel_id: u8) -> Option<&PacketBuffer> {
        self.channels.get(usize::from(channel_id))
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

fn transmit(
    packet: &mut PacketBuffer,
    transport: &dyn Transport,
    metrics: &Metrics,
    conn_id: i32,
    channel_id: u8,
) -> Result<SendStatus> {
    let bytes = packet.len() as u64;
    let result = packet.send_to_transport(transport, conn_id, channel_id);
    match &result {
        Ok(SendStatus::Sent) => metrics.packet_sent(bytes),
        Ok(SendStatus::Retry) => metrics.send_retry(),
        Err(_) => metrics.send_failure(),
    }
    result
}

/// Split a packet into `(tag, payload)` pairs.
pub fn decode_packet(packet: &[u8]) -> Result<Vec<(u16, &[u8])>> {
    split_packet(packet)
        .map(|record| record.and_then(unpack_message))
        .collect()
}

impl Connection for RemoteConnection {
    fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ConnectionInfo {
        &mut self.info
    }

    fn send_bytes(&mut self, frame: &[u8], channel_id: u8) -> Result<SendStatus> {
        let conn_id = self.info.connection_id();
        let Some(packet) = self.channels.get_mut(usize::from(channel_id)) else {
            error!(conn_id, channel_id, "Send on unknown channel");
            return Err(NetError::InvalidChannel(channel_id));
        };

        let needed = PacketBuffer::record_size(frame.len());
        if needed > packet.capacity() {
            error!(
                conn_id,
                channel_id,
                size = needed,
                capacity = packet.capacity(),
                "Message larger than packet"
            );
            return Err(NetError::MessageTooLarge {
                size: needed,
                capacity: packet.capacity(),
            });
        }

        if !packet.has_space(needed) {
            let status = transmit(
                packet,
                self.transport.as_ref(),
                &self.metrics,
                conn_id,
                channel_id,
            )?;
            if status == SendStatus::Retry {
                warn!(conn_id, channel_id, "Channel stalled, message not queued");
                return Ok(SendStatus::Retry);
            }
        }

        packet.write_record(frame)?;
        Ok(SendStatus::Sent)
    }

    fn flush(&mut self) -> Result<SendStatus> {
        let conn_id = self.info.connection_id();
        let mut status = SendStatus::Sent;
        let mut first_error = None;

        for (channel_id, packet) in self.channels.iter_mut().enumerate() {
            if packet.is_empty() {
                continue;
            }
            let sent = transmit(
                packet,
                self.transport.as_ref(),
                &self.metrics,
                conn_id,
                channel_id as u8,
            );
            match sent {
                Ok(SendStatus::Retry) => status = SendStatus::Retry,
                Ok(SendStatus::Sent) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(status),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::message::pack_message;
    use crate::error::TransportError;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct RecordingTransport {
        sent: RefCell<Vec<(u8, Vec<u8>)>>,
        out_of_resources: Cell<bool>,
    }

    impl Transport for RecordingTransport {
        fn send(
            &self,
            _conn_id: i32,
            channel_id: u8,
            bytes: &[u8],
        ) -> std::result::Result<(), TransportError> {
            if self.out_of_resources.get() {
                return Err(TransportError::NoResources);
            }
            self.sent.borrow_mut().push((channel_id, bytes.to_vec()));
            Ok(())
        }
    }

    fn small_config() -> NetworkConfig {
        NetworkConfig::default_with_overrides(|c| c.connection.packet_size = 16)
    }

    #[test]
    fn test_batches_until_full() {
        let transport = Rc::new(RecordingTransport::default());
        let mut conn = RemoteConnection::new(1, "peer", transport.clone(), &small_config());

        // 2 (record) + 2 (tag) + 4 (payload) = 8 bytes each
        conn.send(100, &[1, 2, 3, 4], 0).unwrap();
        conn.send(101, &[5, 6, 7, 8], 0).unwrap();
        assert!(transport.sent.borrow().is_empty());

        conn.send(102, &[9, 9, 9, 9], 0).unwrap();
        assert_eq!(transport.sent.borrow().len(), 1);
        assert_eq!(conn.channel(0).unwrap().len(), 8);

        conn.flush().unwrap();
        assert_eq!(transport.sent.borrow().len(), 2);
        assert!(conn.channel(0).unwrap().is_empty());
    }

    #[test]
    fn test_metrics_track_sends() {
        let transport = Rc::new(RecordingTransport::default());
        let metrics = Arc::new(Metrics::new());
        let mut conn = RemoteConnection::new(1, "peer", transport.clone(), &small_config())
            .with_metrics(metrics.clone());
        conn.send(100, &[1, 2, 3, 4], 1).unwrap();
        conn.flush().unwrap();
        transport.out_of_resources.set(true);
        conn.send(100, &[1, 2, 3, 4], 1).unwrap();
        assert!(conn.flush().is_err());

        let snap = metrics.snapshot();
        assert_eq!(snap.packets_sent, 1);
        assert_eq!(snap.bytes_sent, 8);
        assert_eq!(snap.send_failures, 1);
    }

    #[test]
    fn test_oversized_message_rejected() {
        let transport = Rc::new(RecordingTransport::default());
        let mut conn = RemoteConnection::new(1, "peer", transport, &small_config());
        assert!(matches!(
            conn.send(100, &[0u8; 20], 0),
            Err(NetError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_stalled_reliable_channel_reports_retry() {
        let transport = Rc::new(RecordingTransport::default());
        let mut conn = RemoteConnection::new(1, "peer", transport.clone(), &small_config());
        conn.send(100, &[1, 2, 3, 4], 0).unwrap();
        conn.send(100, &[1, 2, 3, 4], 0).unwrap();

        transport.out_of_resources.set(true);
        assert_eq!(conn.send(100, &[7; 4], 0).unwrap(), SendStatus::Retry);
        assert_eq!(conn.channel(0).unwrap().len(), 16);

        transport.out_of_resources.set(false);
        assert_eq!(conn.flush().unwrap(), SendStatus::Sent);
        assert_eq!(transport.sent.borrow()[0].1.len(), 16);
    }

    #[test]
    fn test_unknown_channel() {
        let transport = Rc::new(RecordingTransport::default());
        let mut conn = RemoteConnection::new(1, "peer", transport, &small_config());
        assert!(matches!(
            conn.send(100, &[], 9),
            Err(NetError::InvalidChannel(9))
        ));
    }

    #[test]
    fn test_decode_keeps_record_order() {
        let mut packet = PacketBuffer::new(64, false);
        packet.write_record(&pack_message(200, &[1])).unwrap();
        packet.write_record(&pack_message(201, &[2, 3])).unwrap();
        packet.write_record(&pack_message(999, &[])).unwrap();

        let frames = decode_packet(packet.as_slice()).unwrap();
        assert_eq!(
            frames,
            vec![(200, &[1u8][..]), (201, &[2, 3][..]), (999, &[][..])]
        );
    }

    #[test]
    fn test_decode_rejects_truncated_packet() {
        assert!(decode_packet(&[4, 0, 1]).is_err());
        assert!(decode_packet(&[1, 0, 1]).is_err());
    }
}
