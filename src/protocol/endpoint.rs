//! # Server Endpoint
//!
//! Owns the server-side dispatch table and connection table, and routes every
//! inbound path into them:
//!
//! - local clients attached through [`ServerEndpoint::add_local_client`]
//! - direct invocation from a [`LocalConnectionToServer`](crate::transport::local::LocalConnectionToServer)
//! - transport events drained from an [`Inbox`]
//!
//! Tables sit behind `RefCell`s and are never borrowed while a handler runs, so a
//! handler may send, register handlers or look up connections on the endpoint that
//! invoked it.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::config::NetworkConfig;
use crate::core::message::{msg_type, unpack_message, NetMessage, NetworkMessage};
use crate::core::packet::SendStatus;
use crate::error::{constants, NetError, Result};
use crate::protocol::connection::NetworkInstanceId;
use crate::protocol::connection_table::ConnectionTable;
use crate::protocol::dispatcher::Dispatcher;
use crate::transport::inbox::Inbox;
use crate::transport::local::{LocalConnectionToClient, LoopbackSender};
use crate::transport::remote::{decode_packet, RemoteConnection};
use crate::transport::{Transport, TransportEvent};
use crate::utils::metrics::{Metrics, Timer};

pub struct ServerEndpoint {
    dispatcher: RefCell<Dispatcher>,
    connections: RefCell<ConnectionTable>,
    transport: Option<Rc<dyn Transport>>,
    config: NetworkConfig,
    metrics: Arc<Metrics>,
}

impl ServerEndpoint {
    /// An endpoint that only serves local clients until a transport is attached.
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            dispatcher: RefCell::new(Dispatcher::new()),
            connections: RefCell::new(ConnectionTable::new()),
            transport: None,
            config: config.clone(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_transport(mut self, transport: Rc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn register_handler<F>(&self, msg_type: u16, handler: F) -> Result<()>
    where
        F: Fn(&mut NetworkMessage<'_>) + 'static,
    {
        self.dispatcher.borrow_mut().register(msg_type, handler)
    }

    pub fn register_handler_if_absent<F>(&self, msg_type: u16, handler: F) -> bool
    where
        F: Fn(&mut NetworkMessage<'_>) + 'static,
    {
        self.dispatcher.borrow_mut().register_if_absent(msg_type, handler)
    }

    pub fn unregister_handler(&self, msg_type: u16) -> bool {
        self.dispatcher.borrow_mut().unregister(msg_type)
    }

    /// Install the framework handlers for `READY` and `NOT_READY` unless the
    /// application already registered its own.
    pub fn register_default_handlers(self: &Rc<Self>) {
        for (tag, ready) in [(msg_type::READY, true), (msg_type::NOT_READY, false)] {
            let server: Weak<Self> = Rc::downgrade(self);
            self.register_handler_if_absent(tag, move |msg| {
                if let Some(server) = server.upgrade() {
                    server.set_client_ready(msg.conn_id, ready);
                }
            });
        }
    }

    /// Run the handler for `msg_type` with `payload`. Returns false when none is
    /// registered.
    pub fn invoke_handler(&self, msg_type: u16, conn_id: i32, payload: &[u8], channel_id: u8) -> bool {
        let handler = self.dispatcher.borrow().lookup(msg_type);
        match handler {
            Some(handler) => {
                let mut msg = NetworkMessage::new(msg_type, conn_id, channel_id, payload);
                handler(&mut msg);
                self.metrics.message_delivered();
                true
            }
            None => {
                warn!(
                    msg_type,
                    name = msg_type::name(msg_type),
                    conn_id,
                    "{}",
                    constants::ERR_UNHANDLED_MSG_TYPE
                );
                self.metrics.message_unhandled();
                false
            }
        }
    }

    /// Attach a local client and fire the connect handler for it.
    pub fn add_local_client(&self, client: LoopbackSender) -> i32 {
        let connection = LocalConnectionToClient::new(client);
        let conn_id = self.connections.borrow_mut().add_local(Box::new(connection));
        self.metrics.connection_added();
        info!(conn_id, "Local client attached");

        self.invoke_handler(msg_type::CONNECT, conn_id, &[], 0);
        conn_id
    }

    /// Fire the disconnect handler for a local client and drop its slot.
    pub fn remove_local_client(&self, conn_id: i32) -> bool {
        if conn_id >= 0 || self.connections.borrow().get_unsafe(conn_id).is_none() {
            debug!(conn_id, "No local client to remove");
            return false;
        }
        self.invoke_handler(msg_type::DISCONNECT, conn_id, &[], 0);
        self.close_slot(conn_id);
        info!(conn_id, "Local client detached");
        true
    }

    /// Direct-invoke entry point for local clients: `frame` is a packed
    /// `[u16 tag][payload]` message from connection `conn_id`.
    pub fn invoke_bytes(&self, conn_id: i32, frame: &[u8], channel_id: u8) -> Result<()> {
        let (msg_type, payload) = unpack_message(frame).map_err(|e| {
            error!(conn_id, error = %e, "{}", constants::ERR_MALFORMED_FRAME);
            self.metrics.malformed_frame();
            e
        })?;

        match self.connections.borrow_mut().get_unsafe_mut(conn_id) {
            Some(conn) => conn.info_mut().touch(),
            None => {
                warn!(conn_id, msg_type, "Message from unknown connection");
                return Err(NetError::UnknownConnection(conn_id));
            }
        }

        self.invoke_handler(msg_type, conn_id, payload, channel_id);
        Ok(())
    }

    /// Apply one event reported by the transport.
    #[instrument(skip(self, event), fields(conn_id = event.conn_id()))]
    pub fn handle_event(&self, event: TransportEvent) -> Result<()> {
        match event {
            TransportEvent::Connected { conn_id, address } => self.accept(conn_id, address),
            TransportEvent::Data {
                conn_id,
                channel_id,
                bytes,
            } => self.receive(conn_id, channel_id, &bytes),
            TransportEvent::Disconnected { conn_id } => {
                self.drop_connection(conn_id);
                Ok(())
            }
        }
    }

    /// Handle up to `max` queued transport events. Returns how many were taken
    /// from the inbox; failures are logged and do not stop the pass.
    pub fn pump(&self, inbox: &mut Inbox, max: usize) -> usize {
        let _timer = Timer::start("endpoint_pump");
        let events = inbox.drain(max);
        let count = events.len();
        for event in events {
            if let Err(e) = self.handle_event(event) {
                debug!(error = %e, "Transport event rejected");
            }
        }
        count
    }

    fn accept(&self, conn_id: i32, address: String) -> Result<()> {
        let Some(transport) = self.transport.clone() else {
            error!(conn_id, "Remote connection without a transport");
            return Err(NetError::NotConnected);
        };

        let limit = self.config.connection.max_connections;
        if self.connections.borrow().remote_len() >= limit {
            warn!(conn_id, limit, "Connection limit reached, refusing");
            transport.disconnect(conn_id);
            return Err(NetError::TooManyConnections(limit));
        }

        let connection = RemoteConnection::new(conn_id, address, transport, &self.config)
            .with_metrics(self.metrics.clone());
        self.connections
            .borrow_mut()
            .add(conn_id, Box::new(connection))?;
        self.metrics.connection_added();
        info!(conn_id, "Remote connection accepted");

        self.invoke_handler(msg_type::CONNECT, conn_id, &[], 0);
        Ok(())
    }

    fn receive(&self, conn_id: i32, channel_id: u8, packet: &[u8]) -> Result<()> {
        match self.connections.borrow_mut().get_unsafe_mut(conn_id) {
            Some(conn) => conn.info_mut().touch(),
            None => {
                warn!(conn_id, "Data for unknown connection");
                return Err(NetError::UnknownConnection(conn_id));
            }
        }

        let frames = decode_packet(packet).map_err(|e| {
            warn!(conn_id, error = %e, "{}", constants::ERR_MALFORMED_FRAME);
            self.metrics.malformed_frame();
            e
        })?;

        for (msg_type, payload) in frames {
            self.invoke_handler(msg_type, conn_id, payload, channel_id);
        }
        Ok(())
    }

    fn drop_connection(&self, conn_id: i32) -> bool {
        // May already be gone when both sides close at once.
        if self.connections.borrow().get_unsafe(conn_id).is_none() {
            debug!(conn_id, "Disconnect for unknown connection");
            return false;
        }
        self.invoke_handler(msg_type::DISCONNECT, conn_id, &[], 0);
        self.close_slot(conn_id);
        info!(conn_id, "Connection closed");
        true
    }

    fn close_slot(&self, conn_id: i32) {
        let removed = self.connections.borrow_mut().remove(conn_id);
        if let Some(mut conn) = removed {
            conn.close();
            self.metrics.connection_removed();
        }
    }

    /// Server-initiated close. A local client is told to leave `Connected`; a
    /// remote connection has its buffered data flushed first, best effort.
    pub fn disconnect(&self, conn_id: i32) -> bool {
        if conn_id < 0 {
            return self.remove_local_client(conn_id);
        }
        if let Some(conn) = self.connections.borrow_mut().get_unsafe_mut(conn_id) {
            if let Err(e) = conn.flush() {
                debug!(conn_id, error = %e, "Flush before disconnect failed");
            }
        }
        let removed = self.drop_connection(conn_id);
        if removed {
            if let Some(transport) = &self.transport {
                transport.disconnect(conn_id);
            }
        }
        removed
    }

    /// Send `payload` under `msg_type` to one connection, local or remote.
    pub fn send_to(
        &self,
        conn_id: i32,
        msg_type: u16,
        payload: &[u8],
        channel_id: u8,
    ) -> Result<SendStatus> {
        let mut table = self.connections.borrow_mut();
        let conn = table
            .get_unsafe_mut(conn_id)
            .ok_or(NetError::UnknownConnection(conn_id))?;
        conn.send(msg_type, payload, channel_id)
    }

    pub fn send_message<M: NetMessage>(
        &self,
        conn_id: i32,
        msg_type: u16,
        message: &M,
        channel_id: u8,
    ) -> Result<SendStatus> {
        let payload = message.to_payload()?;
        self.send_to(conn_id, msg_type, &payload, channel_id)
    }

    /// Send to every live connection. Returns how many accepted the message.
    pub fn send_to_all(&self, msg_type: u16, payload: &[u8], channel_id: u8) -> usize {
        let ids = self.connections.borrow().ids();
        ids.into_iter()
            .filter(|&conn_id| match self.send_to(conn_id, msg_type, payload, channel_id) {
                Ok(SendStatus::Sent) => true,
                Ok(SendStatus::Retry) => false,
                Err(e) => {
                    warn!(conn_id, msg_type, error = %e, "Broadcast send failed");
                    false
                }
            })
            .count()
    }

    /// Flush every connection. Returns the first error, otherwise `Retry` if any
    /// reliable channel stalled.
    pub fn flush_all(&self) -> Result<SendStatus> {
        let mut table = self.connections.borrow_mut();
        let mut status = SendStatus::Sent;
        let mut first_error = None;
        for conn_id in table.ids() {
            let Some(conn) = table.get_unsafe_mut(conn_id) else {
                continue;
            };
            match conn.flush() {
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

    pub fn set_client_ready(&self, conn_id: i32, ready: bool) -> bool {
        match self.connections.borrow_mut().get_unsafe_mut(conn_id) {
            Some(conn) => {
                conn.info_mut().set_ready(ready);
                debug!(conn_id, ready, "Client ready state changed");
                true
            }
            None => false,
        }
    }

    pub fn is_client_ready(&self, conn_id: i32) -> bool {
        self.connections
            .borrow()
            .get_unsafe(conn_id)
            .is_some_and(|conn| conn.info().is_ready())
    }

    /// Read access to the connection table. Do not hold across a send or a
    /// handler invocation.
    pub fn connections(&self) -> Ref<'_, ConnectionTable> {
        self.connections.borrow()
    }

    pub fn connections_mut(&self) -> RefMut<'_, ConnectionTable> {
        self.connections.borrow_mut()
    }

    pub fn contains_player(&self, net_id: NetworkInstanceId) -> bool {
        self.connections.borrow().contains_player(net_id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.borrow().len()
    }
}

impl std::fmt::Debug for ServerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerEndpoint")
            .field("dispatcher", &self.dispatcher)
            .field("connections", &self.connections)
            .field("has_transport", &self.transport.is_some())
            .finish()
    }
}
