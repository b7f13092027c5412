use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, error, warn};

use crate::core::message::{msg_type, NetworkMessage};
use crate::error::{constants, NetError, Result};

/// Handler signature: the message carries tag, source connection and payload reader.
pub type HandlerFn = dyn Fn(&mut NetworkMessage<'_>);

/// Message type to handler routing table.
///
/// Handlers are reference counted so a lookup can release the table before the
/// handler runs; a handler is then free to touch the table that dispatched it.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<u16, Rc<HandlerFn>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `msg_type`, replacing any previous one.
    /// Reserved system tags are rejected and leave the table unchanged.
    pub fn register<F>(&mut self, msg_type: u16, handler: F) -> Result<()>
    where
        F: Fn(&mut NetworkMessage<'_>) + 'static,
    {
        if msg_type::is_reserved(msg_type) {
            error!(msg_type, "{}", constants::ERR_RESERVED_MSG_TYPE);
            return Err(NetError::ReservedMessageType(msg_type));
        }
        if self.handlers.insert(msg_type, Rc::new(handler)).is_some() {
            debug!(msg_type, "Replaced message handler");
        }
        Ok(())
    }

    /// Install `handler` only if nothing is registered for `msg_type`.
    /// Returns whether it was installed. This is the path system handlers use,
    /// so the reserved range is allowed here.
    pub fn register_if_absent<F>(&mut self, msg_type: u16, handler: F) -> bool
    where
        F: Fn(&mut NetworkMessage<'_>) + 'static,
    {
        if self.handlers.contains_key(&msg_type) {
            return false;
        }
        self.handlers.insert(msg_type, Rc::new(handler));
        true
    }

    pub fn unregister(&mut self, msg_type: u16) -> bool {
        self.handlers.remove(&msg_type).is_some()
    }

    pub fn lookup(&self, msg_type: u16) -> Option<Rc<HandlerFn>> {
        self.handlers.get(&msg_type).cloned()
    }

    pub fn contains(&self, msg_type: u16) -> bool {
        self.handlers.contains_key(&msg_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Run the handler for `msg.msg_type`. Returns false when none is registered.
    pub fn dispatch(&self, msg: &mut NetworkMessage<'_>) -> bool {
        match self.lookup(msg.msg_type) {
            Some(handler) => {
                handler(msg);
                true
            }
            None => {
                warn!(
                    msg_type = msg.msg_type,
                    name = msg_type::name(msg.msg_type),
                    conn_id = msg.conn_id,
                    "{}",
                    constants::ERR_UNHANDLED_MSG_TYPE
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<_> = self.handlers.keys().copied().collect();
        tags.sort_unstable();
        f.debug_struct("Dispatcher").field("msg_types", &tags).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const USER_MSG: u16 = msg_type::HIGHEST + 1;

    #[test]
    fn test_reserved_range_rejected() {
        let mut dispatcher = Dispatcher::new();
        for tag in [0, 5, msg_type::INTERNAL_HIGHEST] {
            assert!(matches!(
                dispatcher.register(tag, |_| {}),
                Err(NetError::ReservedMessageType(t)) if t == tag
            ));
        }
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_register_replaces() {
        let hits = Rc::new(Cell::new(0));
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(USER_MSG, |_| {}).ok();
        let h = hits.clone();
        dispatcher
            .register(USER_MSG, move |_| h.set(h.get() + 10))
            .ok();

        let mut msg = NetworkMessage::new(USER_MSG, 1, 0, &[]);
        assert!(dispatcher.dispatch(&mut msg));
        assert_eq!(hits.get(), 10);
        assert_eq!(dispatcher.len(), 1);
    }

    #[test]
    fn test_register_if_absent_keeps_existing() {
        let hits = Rc::new(Cell::new(0));
        let mut dispatcher = Dispatcher::new();
        let h = hits.clone();
        dispatcher
            .register(msg_type::CONNECT, move |_| h.set(1))
            .ok();
        let h = hits.clone();
        assert!(!dispatcher.register_if_absent(msg_type::CONNECT, move |_| h.set(2)));

        let mut msg = NetworkMessage::new(msg_type::CONNECT, 1, 0, &[]);
        dispatcher.dispatch(&mut msg);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_register_if_absent_allows_system_range() {
        let mut dispatcher = Dispatcher::new();
        assert!(dispatcher.register_if_absent(msg_type::CRC, |_| {}));
        assert!(dispatcher.contains(msg_type::CRC));
    }

    #[test]
    fn test_unregister_and_lookup() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(USER_MSG, |_| {}).ok();
        assert!(dispatcher.lookup(USER_MSG).is_some());
        assert!(dispatcher.unregister(USER_MSG));
        assert!(!dispatcher.unregister(USER_MSG));
        assert!(dispatcher.lookup(USER_MSG).is_none());

        let mut msg = NetworkMessage::new(USER_MSG, 1, 0, &[]);
        assert!(!dispatcher.dispatch(&mut msg));
    }
}
