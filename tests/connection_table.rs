//! Integration tests for connection addressing

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use game_netcore::core::packet::SendStatus;
use game_netcore::error::{NetError, Result};
use game_netcore::protocol::connection::{
    Connection, ConnectionInfo, NetworkInstanceId, PlayerController,
};
use game_netcore::protocol::connection_table::ConnectionTable;

struct StubConnection {
    info: ConnectionInfo,
    local: bool,
}

impl StubConnection {
    fn remote(id: i32) -> Box<dyn Connection> {
        Box::new(Self {
            info: ConnectionInfo::new(id, format!("192.168.1.{id}:7777")),
            local: false,
        })
    }

    fn local() -> Box<dyn Connection> {
        Box::new(Self {
            info: ConnectionInfo::new(0, "localClient"),
            local: true,
        })
    }
}

/// Counts every event emitted while it is the active subscriber.
struct EventCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for EventCounter {
    fn on_event(&self, _event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Run `f` and return how many log events it emitted.
fn events_logged(f: impl FnOnce()) -> usize {
    let count = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(EventCounter(count.clone()));
    tracing::subscriber::with_default(subscriber, f);
    count.load(Ordering::SeqCst)
}

impl Connection for StubConnection {
    fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ConnectionInfo {
        &mut self.info
    }

    fn send_bytes(&mut self, _frame: &[u8], _channel_id: u8) -> Result<SendStatus> {
        Ok(SendStatus::Sent)
    }

    fn is_local(&self) -> bool {
        self.local
    }
}

#[test]
fn test_add_local_ids_decrease_from_minus_one() {
    let mut table = ConnectionTable::new();
    assert_eq!(table.add_local(StubConnection::local()), -1);
    assert_eq!(table.add_local(StubConnection::local()), -2);
    assert_eq!(table.add_local(StubConnection::local()), -3);

    let conn = table.get(-2).unwrap();
    assert_eq!(conn.connection_id(), -2);
    assert!(conn.is_local());
}

#[test]
fn test_removed_local_id_not_reused() {
    let mut table = ConnectionTable::new();
    let first = table.add_local(StubConnection::local());
    assert_eq!(first, -1);
    assert!(table.get(-1).is_some());

    assert!(table.remove(-1).is_some());
    let logged = events_logged(|| assert!(table.get_unsafe(-1).is_none()));
    assert_eq!(logged, 0);

    let second = table.add_local(StubConnection::local());
    assert_eq!(second, -2);
    assert_eq!(table.local_slots(), 2);
    assert_eq!(table.len(), 1);
}

#[test]
fn test_removal_keeps_other_local_ids_stable() {
    let mut table = ConnectionTable::new();
    for _ in 0..3 {
        table.add_local(StubConnection::local());
    }
    table.remove(-2);
    assert_eq!(table.get(-1).unwrap().connection_id(), -1);
    assert_eq!(table.get(-3).unwrap().connection_id(), -3);
    assert!(table.get(-2).is_none());
}

#[test]
fn test_remote_add_grows_with_holes() {
    let mut table = ConnectionTable::new();
    table.add(4, StubConnection::remote(4)).unwrap();
    assert_eq!(table.remote_slots(), 5);
    assert_eq!(table.remote_len(), 1);
    assert!(table.get(2).is_none());
    assert_eq!(table.get(4).unwrap().info().address(), "192.168.1.4:7777");
}

#[test]
fn test_negative_and_duplicate_ids_rejected() {
    let mut table = ConnectionTable::new();
    assert!(matches!(
        table.add(-1, StubConnection::remote(1)),
        Err(NetError::InvalidConnectionId(-1))
    ));

    table.add(1, StubConnection::remote(1)).unwrap();
    assert!(matches!(
        table.add(1, StubConnection::remote(1)),
        Err(NetError::DuplicateConnection(1))
    ));
    assert_eq!(table.len(), 1);
}

#[test]
fn test_remote_slot_reusable_after_removal() {
    let mut table = ConnectionTable::new();
    table.add(0, StubConnection::remote(0)).unwrap();
    table.remove(0);
    assert!(table.add(0, StubConnection::remote(0)).is_ok());
}

#[test]
fn test_out_of_range_lookups() {
    let mut table = ConnectionTable::new();
    assert!(table.get(10).is_none());
    assert!(table.get_unsafe(10).is_none());
    assert!(table.get_unsafe(-10).is_none());
    assert!(table.get_unsafe_mut(-1).is_none());
    assert!(table.remove(3).is_none());
    assert!(table.is_empty());
}

#[test]
fn test_contains_player_scans_local_and_remote() {
    let mut table = ConnectionTable::new();
    let local = table.add_local(StubConnection::local());
    table.add(2, StubConnection::remote(2)).unwrap();

    table
        .get_mut(local)
        .unwrap()
        .info_mut()
        .set_player_controller(PlayerController {
            player_controller_id: 0,
            net_id: NetworkInstanceId(11),
        });
    table
        .get_mut(2)
        .unwrap()
        .info_mut()
        .set_player_controller(PlayerController {
            player_controller_id: 1,
            net_id: NetworkInstanceId(22),
        });

    assert!(table.contains_player(NetworkInstanceId(11)));
    assert!(table.contains_player(NetworkInstanceId(22)));
    assert!(!table.contains_player(NetworkInstanceId(33)));

    table.remove(2);
    assert!(!table.contains_player(NetworkInstanceId(22)));
}

#[test]
fn test_ids_lists_local_first() {
    let mut table = ConnectionTable::new();
    table.add(1, StubConnection::remote(1)).unwrap();
    table.add_local(StubConnection::local());
    table.add_local(StubConnection::local());
    table.add(0, StubConnection::remote(0)).unwrap();
    table.remove(-1);

    assert_eq!(table.ids(), vec![-2, 0, 1]);
}

#[test]
fn test_get_unsafe_is_silent_where_get_logs() {
    let mut table = ConnectionTable::new();
    table.add(0, StubConnection::remote(0)).unwrap();
    table.add_local(StubConnection::local());
    table.remove(0);
    table.remove(-1);

    let logged = events_logged(|| {
        assert!(table.get_unsafe(0).is_none());
        assert!(table.get_unsafe(-1).is_none());
        assert!(table.get_unsafe(40).is_none());
    });
    assert_eq!(logged, 0);

    let logged = events_logged(|| assert!(table.get(40).is_none()));
    assert_eq!(logged, 1);
}
