//! # Loopback Transport
//!
//! In-process delivery between a host's local client and its server. Messages are
//! handed over as `(tag, payload)` pairs instead of being serialized onto a socket.
//!
//! ## Pieces
//! - [`LocalClient`]: the client half, with its own dispatch table and queue
//! - [`LoopbackSender`]: cloneable handle that posts into a client's queue
//! - [`LocalConnectionToClient`]: the server's handle to the local client
//! - [`LocalConnectionToServer`]: the client's handle to the local server
//!
//! ## Delivery Order
//! Posted messages are delivered by [`LocalClient::update`], once per tick, in
//! post order. A message posted by a handler while a pass is running is held
//! back to the next pass:
//!
//! ```text
//! post A, post B          active=[A,B]  spare=[]
//! update: swap            in-flight=[A,B] active=[]
//!   deliver A -> posts C  active=[C]
//!   deliver B
//! restore + merge         active=[C]   (delivered next update)
//! ```

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::LoopbackConfig;
use crate::core::message::{msg_type, unpack_message, InternalMessage, NetMessage, NetworkMessage};
use crate::core::packet::SendStatus;
use crate::error::{constants, NetError, Result};
use crate::protocol::connection::{Connection, ConnectionInfo};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::endpoint::ServerEndpoint;
use crate::utils::message_pool::MessagePool;
use crate::utils::metrics::Metrics;

/// Connection id the local client uses for its handle to the server.
pub const LOCAL_SERVER_CONNECTION_ID: i32 = 0;

/// Address reported by [`LocalConnectionToServer`].
pub const LOCAL_SERVER_ADDRESS: &str = "localServer";

/// Address reported by [`LocalConnectionToClient`].
pub const LOCAL_CLIENT_ADDRESS: &str = "localClient";

#[derive(Debug)]
struct LoopbackQueues {
    active: Vec<InternalMessage>,
    spare: Vec<InternalMessage>,
    pool: MessagePool,
    attached: bool,
}

/// Posts messages into a local client's queue.
#[derive(Debug, Clone)]
pub struct LoopbackSender {
    queues: Rc<RefCell<LoopbackQueues>>,
    metrics: Arc<Metrics>,
}

impl LoopbackSender {
    fn new(config: &LoopbackConfig, metrics: Arc<Metrics>) -> Self {
        let queues = LoopbackQueues {
            active: Vec::with_capacity(config.queue_capacity),
            spare: Vec::with_capacity(config.queue_capacity),
            pool: MessagePool::new(config.message_pool_size),
            attached: false,
        };
        Self {
            queues: Rc::new(RefCell::new(queues)),
            metrics,
        }
    }

    /// Queue `payload` under `msg_type` on channel 0.
    pub fn post(&self, msg_type: u16, payload: &[u8]) {
        self.post_on_channel(msg_type, payload, 0);
    }

    /// Queue a notification with no payload.
    pub fn post_empty(&self, msg_type: u16) {
        self.post_on_channel(msg_type, &[], 0);
    }

    pub fn post_on_channel(&self, msg_type: u16, payload: &[u8], channel_id: u8) {
        let mut queues = self.queues.borrow_mut();
        let payload = queues.pool.acquire_with(payload);
        queues.active.push(InternalMessage {
            msg_type,
            channel_id,
            payload,
        });
        self.metrics.message_posted();
    }

    pub fn post_message<M: NetMessage>(&self, msg_type: u16, message: &M) -> Result<()> {
        let payload = message.to_payload()?;
        self.post(msg_type, &payload);
        Ok(())
    }

    /// Unpack a `[u16 tag][payload]` frame produced by the server's send path and
    /// queue it. A malformed frame is logged and reported.
    pub fn invoke_bytes_on_client(&self, frame: &[u8], channel_id: u8) -> Result<()> {
        let (msg_type, payload) = unpack_message(frame).map_err(|e| {
            error!(error = %e, len = frame.len(), "{}", constants::ERR_MALFORMED_FRAME);
            self.metrics.malformed_frame();
            e
        })?;
        self.post_on_channel(msg_type, payload, channel_id);
        Ok(())
    }

    /// Messages waiting for the next pass.
    pub fn pending(&self) -> usize {
        self.queues.borrow().active.len()
    }

    /// True while the client is attached to a server.
    pub fn is_attached(&self) -> bool {
        self.queues.borrow().attached
    }

    fn attach(&self) {
        self.queues.borrow_mut().attached = true;
    }

    /// Leave the attached state: pending messages are dropped and a disconnect
    /// notification is queued. Returns false if already detached.
    fn detach(&self) -> bool {
        {
            let mut queues = self.queues.borrow_mut();
            if !queues.attached {
                return false;
            }
            queues.attached = false;
        }
        let discarded = self.discard_pending();
        if discarded > 0 {
            debug!(discarded, "Dropped pending local messages on disconnect");
        }
        self.post_empty(msg_type::DISCONNECT);
        true
    }

    fn discard_pending(&self) -> usize {
        let mut queues = self.queues.borrow_mut();
        let LoopbackQueues { active, pool, .. } = &mut *queues;
        let discarded = active.len();
        for msg in active.drain(..) {
            pool.release(msg.payload);
        }
        discarded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connected,
}

/// Client half of the loopback pair.
///
/// The connected state lives in the shared queues, so the server can end it
/// through its [`LocalConnectionToClient`]. Dropping a connected client
/// detaches it from the server.
#[derive(Debug)]
pub struct LocalClient {
    sender: LoopbackSender,
    dispatcher: Dispatcher,
    connection: Option<LocalConnectionToServer>,
    metrics: Arc<Metrics>,
}

impl LocalClient {
    pub fn new(config: &LoopbackConfig) -> Self {
        Self::with_metrics(config, Arc::new(Metrics::new()))
    }

    pub fn with_metrics(config: &LoopbackConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            sender: LoopbackSender::new(config, metrics.clone()),
            dispatcher: Dispatcher::new(),
            connection: None,
            metrics,
        }
    }

    pub fn state(&self) -> ClientState {
        if self.sender.is_attached() {
            ClientState::Connected
        } else {
            ClientState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.sender.is_attached()
    }

    /// Handle for posting into this client's queue, e.g. from a handler.
    pub fn sender(&self) -> LoopbackSender {
        self.sender.clone()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn register_handler<F>(&mut self, msg_type: u16, handler: F) -> Result<()>
    where
        F: Fn(&mut NetworkMessage<'_>) + 'static,
    {
        self.dispatcher.register(msg_type, handler)
    }

    /// The client's handle to the server, while connected.
    pub fn connection(&self) -> Option<&LocalConnectionToServer> {
        self.connection.as_ref().filter(|_| self.is_connected())
    }

    pub fn post(&self, msg_type: u16, payload: &[u8]) {
        self.sender.post(msg_type, payload);
    }

    pub fn post_empty(&self, msg_type: u16) {
        self.sender.post_empty(msg_type);
    }

    /// Attach to `server` and enter `Connected`. The server runs its connect
    /// handler right away; the client's own connect notification is queued when
    /// `generate_connect_msg` is set.
    pub fn connect(&mut self, server: &Rc<ServerEndpoint>, generate_connect_msg: bool) -> i32 {
        if let Some(conn) = self.connection() {
            warn!("Local client already connected");
            return conn.server_connection_id();
        }
        // Left over from a close initiated by the server.
        self.connection = None;

        // Attached before the server's connect handler runs, so it can reply.
        self.sender.attach();
        let server_connection_id = server.add_local_client(self.sender());
        self.connection = Some(LocalConnectionToServer::new(
            server.clone(),
            server_connection_id,
        ));
        info!(server_connection_id, "Local client connected");

        if generate_connect_msg {
            self.sender.post_empty(msg_type::CONNECT);
        }
        server_connection_id
    }

    /// Leave `Connected`. Undelivered messages are dropped and a disconnect
    /// notification is queued for the next pass.
    pub fn disconnect(&mut self) {
        if !self.sender.detach() {
            self.connection = None;
            return;
        }
        if let Some(conn) = self.connection.take() {
            conn.server.remove_local_client(conn.server_connection_id());
        }
        info!("Local client disconnected");
    }

    /// Send to the local server through the direct-invoke path.
    pub fn send(&mut self, msg_type: u16, payload: &[u8], channel_id: u8) -> Result<SendStatus> {
        if !self.is_connected() {
            return Err(NetError::NotConnected);
        }
        match self.connection.as_mut() {
            Some(conn) => conn.send(msg_type, payload, channel_id),
            None => Err(NetError::NotConnected),
        }
    }

    pub fn send_message<M: NetMessage>(
        &mut self,
        msg_type: u16,
        message: &M,
        channel_id: u8,
    ) -> Result<SendStatus> {
        let payload = message.to_payload()?;
        self.send(msg_type, &payload, channel_id)
    }

    /// One dispatch pass. Returns the number of messages that reached a handler.
    pub fn update(&mut self) -> usize {
        let mut in_flight = {
            let mut queues = self.sender.queues.borrow_mut();
            if queues.active.is_empty() {
                return 0;
            }
            let spare = mem::take(&mut queues.spare);
            mem::replace(&mut queues.active, spare)
        };

        let conn_id = LOCAL_SERVER_CONNECTION_ID;
        let mut delivered = 0;
        for msg in in_flight.drain(..) {
            let mut net_msg =
                NetworkMessage::new(msg.msg_type, conn_id, msg.channel_id, &msg.payload);
            if self.dispatcher.dispatch(&mut net_msg) {
                delivered += 1;
                self.metrics.message_delivered();
            } else {
                self.metrics.message_unhandled();
            }
            self.sender.queues.borrow_mut().pool.release(msg.payload);
        }

        let mut queues = self.sender.queues.borrow_mut();
        let mut posted_during_pass = mem::replace(&mut queues.active, in_flight);
        queues.active.append(&mut posted_during_pass);
        queues.spare = posted_during_pass;
        delivered
    }
}

impl Drop for LocalClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// The server's handle to its local client.
#[derive(Debug)]
pub struct LocalConnectionToClient {
    info: ConnectionInfo,
    client: LoopbackSender,
}

impl LocalConnectionToClient {
    pub fn new(client: LoopbackSender) -> Self {
        Self {
            info: ConnectionInfo::new(0, LOCAL_CLIENT_ADDRESS),
            client,
        }
    }
}

impl Connection for LocalConnectionToClient {
    fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ConnectionInfo {
        &mut self.info
    }

    fn send_bytes(&mut self, frame: &[u8], channel_id: u8) -> Result<SendStatus> {
        if !self.client.is_attached() {
            return Err(NetError::NotConnected);
        }
        self.client.invoke_bytes_on_client(frame, channel_id)?;
        Ok(SendStatus::Sent)
    }

    fn is_local(&self) -> bool {
        true
    }

    fn close(&mut self) {
        if self.client.detach() {
            info!(conn_id = self.info.connection_id(), "Server closed local client");
        }
    }
}

/// The local client's handle to the server.
#[derive(Debug, Clone)]
pub struct LocalConnectionToServer {
    info: ConnectionInfo,
    server: Rc<ServerEndpoint>,
    server_connection_id: i32,
}

impl LocalConnectionToServer {
    pub fn new(server: Rc<ServerEndpoint>, server_connection_id: i32) -> Self {
        Self {
            info: ConnectionInfo::new(LOCAL_SERVER_CONNECTION_ID, LOCAL_SERVER_ADDRESS),
            server,
            server_connection_id,
        }
    }

    /// Id of this client in the server's connection table.
    pub fn server_connection_id(&self) -> i32 {
        self.server_connection_id
    }
}

impl Connection for LocalConnectionToServer {
    fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ConnectionInfo {
        &mut self.info
    }

    fn send_bytes(&mut self, frame: &[u8], channel_id: u8) -> Result<SendStatus> {
        if frame.is_empty() {
            error!("{}", constants::ERR_EMPTY_LOCAL_PAYLOAD);
            return Err(NetError::EmptyPayload);
        }
        self.server
            .invoke_bytes(self.server_connection_id, frame, channel_id)?;
        Ok(SendStatus::Sent)
    }

    fn is_local(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::config::NetworkConfig;

    const PING: u16 = msg_type::HIGHEST + 1;
    const PONG: u16 = msg_type::HIGHEST + 2;

    fn client() -> LocalClient {
        LocalClient::new(&LoopbackConfig::default())
    }

    fn log_handler(log: &Rc<RefCell<Vec<(u16, Vec<u8>)>>>) -> impl Fn(&mut NetworkMessage<'_>) {
        let log = log.clone();
        move |msg| {
            let payload = msg.reader.read_to_end().to_vec();
            log.borrow_mut().push((msg.msg_type, payload));
        }
    }

    #[test]
    fn test_update_on_empty_queue_is_noop() {
        let mut client = client();
        assert_eq!(client.update(), 0);
    }

    #[test]
    fn test_delivery_in_post_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut client = client();
        client.register_handler(PING, log_handler(&log)).unwrap();
        client.register_handler(PONG, log_handler(&log)).unwrap();

        client.post(PING, &[1]);
        client.post(PONG, &[2]);
        client.post(PING, &[3]);
        assert_eq!(client.update(), 3);
        assert_eq!(
            *log.borrow(),
            vec![(PING, vec![1]), (PONG, vec![2]), (PING, vec![3])]
        );
        assert_eq!(client.sender().pending(), 0);
    }

    #[test]
    fn test_invoke_bytes_on_client_rejects_short_frame() {
        let client = client();
        let sender = client.sender();
        assert!(sender.invoke_bytes_on_client(&[0x30], 0).is_err());
        assert_eq!(sender.pending(), 0);
        sender.invoke_bytes_on_client(&[0x30, 0x00, 0x09], 2).unwrap();
        assert_eq!(sender.pending(), 1);
    }

    #[test]
    fn test_empty_send_to_server_rejected() {
        let server = Rc::new(ServerEndpoint::new(&NetworkConfig::default()));
        let mut conn = LocalConnectionToServer::new(server, -1);
        assert!(matches!(
            conn.send_bytes(&[], 0),
            Err(NetError::EmptyPayload)
        ));
    }

    #[test]
    fn test_send_while_disconnected() {
        let mut client = client();
        assert!(matches!(
            client.send(PING, &[1], 0),
            Err(NetError::NotConnected)
        ));
    }

    #[test]
    fn test_disconnect_discards_pending_and_queues_notification() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let server = Rc::new(ServerEndpoint::new(&NetworkConfig::default()));
        let mut client = client();
        client.register_handler(PING, log_handler(&log)).unwrap();
        client
            .register_handler(msg_type::DISCONNECT, log_handler(&log))
            .unwrap();

        client.connect(&server, false);
        client.post(PING, &[1]);
        client.disconnect();
        assert_eq!(client.state(), ClientState::Disconnected);
        assert!(client.connection().is_none());

        client.update();
        assert_eq!(*log.borrow(), vec![(msg_type::DISCONNECT, vec![])]);
    }
}
