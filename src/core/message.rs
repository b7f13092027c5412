//! # Messages
//!
//! Message type tags, the `[u16 tag][payload]` frame, and the value handed to
//! handlers.
//!
//! Tags `0..=INTERNAL_HIGHEST` belong to the system and cannot be claimed through
//! [`Dispatcher::register`](crate::protocol::dispatcher::Dispatcher::register).
//! Framework notifications (connect, disconnect, ...) sit just above that range and
//! user messages start after [`msg_type::HIGHEST`].

use crate::core::bits::{BitRead, BitReader, BitWrite, BitWriter};
use crate::error::{NetError, Result};

/// Size of the tag prefix of a frame.
pub const FRAME_HEADER_SIZE: usize = 2;

/// Well-known message type tags.
pub mod msg_type {
    pub const OBJECT_DESTROY: u16 = 1;
    pub const RPC: u16 = 2;
    pub const OBJECT_SPAWN: u16 = 3;
    pub const OWNER: u16 = 4;
    pub const COMMAND: u16 = 5;
    pub const LOCAL_PLAYER_TRANSFORM: u16 = 6;
    pub const SYNC_EVENT: u16 = 7;
    pub const UPDATE_VARS: u16 = 8;
    pub const SYNC_LIST: u16 = 9;
    pub const OBJECT_SPAWN_SCENE: u16 = 10;
    pub const NETWORK_INFO: u16 = 11;
    pub const SPAWN_FINISHED: u16 = 12;
    pub const OBJECT_HIDE: u16 = 13;
    pub const CRC: u16 = 14;
    pub const LOCAL_CLIENT_AUTHORITY: u16 = 15;
    pub const LOCAL_CHILD_TRANSFORM: u16 = 16;
    pub const FRAGMENT: u16 = 17;
    pub const PEER_CLIENT_AUTHORITY: u16 = 18;

    /// Last tag of the reserved system range.
    pub const INTERNAL_HIGHEST: u16 = 31;

    pub const CONNECT: u16 = 32;
    pub const DISCONNECT: u16 = 33;
    pub const ERROR: u16 = 34;
    pub const READY: u16 = 35;
    pub const NOT_READY: u16 = 36;
    pub const ADD_PLAYER: u16 = 37;
    pub const REMOVE_PLAYER: u16 = 38;
    pub const SCENE: u16 = 39;
    pub const RECONNECT_PLAYER: u16 = 47;

    /// Last framework tag; user messages use anything above.
    pub const HIGHEST: u16 = 47;

    #[inline]
    pub fn is_reserved(tag: u16) -> bool {
        tag <= INTERNAL_HIGHEST
    }

    /// Display name for logs.
    pub fn name(tag: u16) -> &'static str {
        match tag {
            OBJECT_DESTROY => "ObjectDestroy",
            RPC => "Rpc",
            OBJECT_SPAWN => "ObjectSpawn",
            OWNER => "Owner",
            COMMAND => "Command",
            LOCAL_PLAYER_TRANSFORM => "LocalPlayerTransform",
            SYNC_EVENT => "SyncEvent",
            UPDATE_VARS => "UpdateVars",
            SYNC_LIST => "SyncList",
            OBJECT_SPAWN_SCENE => "ObjectSpawnScene",
            NETWORK_INFO => "NetworkInfo",
            SPAWN_FINISHED => "SpawnFinished",
            OBJECT_HIDE => "ObjectHide",
            CRC => "CRC",
            LOCAL_CLIENT_AUTHORITY => "LocalClientAuthority",
            LOCAL_CHILD_TRANSFORM => "LocalChildTransform",
            FRAGMENT => "Fragment",
            PEER_CLIENT_AUTHORITY => "PeerClientAuthority",
            CONNECT => "Connect",
            DISCONNECT => "Disconnect",
            ERROR => "Error",
            READY => "Ready",
            NOT_READY => "NotReady",
            ADD_PLAYER => "AddPlayer",
            REMOVE_PLAYER => "RemovePlayer",
            SCENE => "Scene",
            RECONNECT_PLAYER => "ReconnectPlayer",
            t if t <= INTERNAL_HIGHEST => "Reserved",
            t if t <= HIGHEST => "Framework",
            _ => "User",
        }
    }
}

/// Frame a message as `[u16 tag][payload]`.
pub fn pack_message(msg_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut writer = BitWriter::with_capacity(FRAME_HEADER_SIZE + payload.len());
    writer.write_u16(msg_type);
    writer.write_bytes_full(payload);
    writer.into_vec()
}

/// Split a `[u16 tag][payload]` frame. The payload may be empty.
pub fn unpack_message(frame: &[u8]) -> Result<(u16, &[u8])> {
    if frame.len() < FRAME_HEADER_SIZE {
        return Err(NetError::MalformedFrame(format!(
            "frame of {} bytes is shorter than its header",
            frame.len()
        )));
    }
    let mut reader = BitReader::new(frame);
    let msg_type = reader.read_u16()?;
    Ok((msg_type, reader.read_to_end()))
}

/// A queued loopback message: tag plus owned payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalMessage {
    pub msg_type: u16,
    pub channel_id: u8,
    pub payload: Vec<u8>,
}

/// What a handler receives.
#[derive(Debug)]
pub struct NetworkMessage<'a> {
    pub msg_type: u16,
    pub conn_id: i32,
    pub channel_id: u8,
    pub reader: BitReader<'a>,
}

impl<'a> NetworkMessage<'a> {
    pub fn new(msg_type: u16, conn_id: i32, channel_id: u8, payload: &'a [u8]) -> Self {
        Self {
            msg_type,
            conn_id,
            channel_id,
            reader: BitReader::new(payload),
        }
    }

    /// Decode the payload as a typed message.
    pub fn read_message<M: NetMessage>(&mut self) -> Result<M> {
        M::deserialize(&mut self.reader)
    }
}

/// A message type with its own payload layout.
pub trait NetMessage: Sized {
    fn serialize(&self, writer: &mut BitWriter) -> Result<()>;

    fn deserialize(reader: &mut BitReader<'_>) -> Result<Self>;

    fn to_payload(&self) -> Result<Vec<u8>> {
        let mut writer = BitWriter::new();
        self.serialize(&mut writer)?;
        Ok(writer.into_vec())
    }
}

/// Zero-length payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmptyMessage;

impl NetMessage for EmptyMessage {
    fn serialize(&self, _writer: &mut BitWriter) -> Result<()> {
        Ok(())
    }

    fn deserialize(_reader: &mut BitReader<'_>) -> Result<Self> {
        Ok(EmptyMessage)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegerMessage {
    pub value: i32,
}

impl NetMessage for IntegerMessage {
    fn serialize(&self, writer: &mut BitWriter) -> Result<()> {
        writer.write_packed_u32(self.value as u32);
        Ok(())
    }

    fn deserialize(reader: &mut BitReader<'_>) -> Result<Self> {
        Ok(Self {
            value: reader.read_packed_u32()? as i32,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringMessage {
    pub value: String,
}

impl NetMessage for StringMessage {
    fn serialize(&self, writer: &mut BitWriter) -> Result<()> {
        writer.write_string(&self.value)
    }

    fn deserialize(reader: &mut BitReader<'_>) -> Result<Self> {
        Ok(Self {
            value: reader.read_string()?.to_owned(),
        })
    }
}

/// Payload of [`msg_type::ERROR`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorMessage {
    pub error_code: u16,
}

impl NetMessage for ErrorMessage {
    fn serialize(&self, writer: &mut BitWriter) -> Result<()> {
        writer.write_u16(self.error_code);
        Ok(())
    }

    fn deserialize(reader: &mut BitReader<'_>) -> Result<Self> {
        Ok(Self {
            error_code: reader.read_u16()?,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_frame_layout() {
        let frame = pack_message(0x0130, &[0xAA, 0xBB]);
        assert_eq!(frame, vec![0x30, 0x01, 0xAA, 0xBB]);
        let (tag, payload) = unpack_message(&frame).unwrap();
        assert_eq!(tag, 0x0130);
        assert_eq!(payload, &[0xAA, 0xBB]);
    }

    #[test]
    fn test_empty_payload_frame() {
        let frame = pack_message(msg_type::CONNECT, &[]);
        let (tag, payload) = unpack_message(&frame).unwrap();
        assert_eq!(tag, msg_type::CONNECT);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_short_frame_rejected() {
        assert!(matches!(
            unpack_message(&[0x01]),
            Err(NetError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_reserved_range() {
        assert!(msg_type::is_reserved(0));
        assert!(msg_type::is_reserved(msg_type::INTERNAL_HIGHEST));
        assert!(!msg_type::is_reserved(msg_type::CONNECT));
        assert_eq!(msg_type::name(msg_type::DISCONNECT), "Disconnect");
        assert_eq!(msg_type::name(20), "Reserved");
        assert_eq!(msg_type::name(1000), "User");
    }

    #[test]
    fn test_typed_message_through_network_message() {
        let payload = StringMessage {
            value: "ready".into(),
        }
        .to_payload()
        .unwrap();
        let mut msg = NetworkMessage::new(100, -1, 0, &payload);
        let decoded: StringMessage = msg.read_message().unwrap();
        assert_eq!(decoded.value, "ready");
    }

    #[test]
    fn test_negative_integer_message() {
        let payload = IntegerMessage { value: -5 }.to_payload().unwrap();
        let mut msg = NetworkMessage::new(100, 0, 0, &payload);
        assert_eq!(msg.read_message::<IntegerMessage>().unwrap().value, -5);
    }
}
