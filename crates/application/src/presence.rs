//! 在线列表广播
//!
//! 每次注册成功或注销确实移除了连接之后，在同一个写锁临界区内调用
//! [`PresenceBroadcaster::broadcast`]，因此每个通道看到的快照顺序与注册表变更顺序一致。

use std::sync::Arc;

use domain::ServerEvent;

use crate::registry::ConnectionRegistry;

/// 一次广播的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub recipients: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PresenceBroadcaster;

impl PresenceBroadcaster {
    pub fn new() -> Self {
        Self
    }

    /// 计算当前在线快照，推送给注册表里的每一条连接
    pub fn broadcast(&self, registry: &ConnectionRegistry) -> BroadcastReport {
        let online = registry.online_identities();
        let event = Arc::new(ServerEvent::presence(&online));

        let mut report = BroadcastReport::default();
        for connection in registry.all_connections() {
            match connection.deliver(event.clone()) {
                Ok(()) => report.recipients += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        connection_id = %connection.id(),
                        error = %err,
                        "presence delivery failed"
                    );
                }
            }
        }

        tracing::debug!(
            online = online.len(),
            recipients = report.recipients,
            failed = report.failed,
            "presence broadcast"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{event_channel, Connection, EventReceiver};
    use domain::{Identity, PresenceEntry, UserId};
    use uuid::Uuid;

    fn online_of(rx: &mut EventReceiver) -> Vec<PresenceEntry> {
        match rx.try_recv().unwrap().as_ref() {
            ServerEvent::Presence { online } => online.clone(),
            other => panic!("expected presence event, got {other:?}"),
        }
    }

    #[test]
    fn broadcast_reaches_every_registered_connection() {
        let mut registry = ConnectionRegistry::new();
        let alice = Identity::new(UserId(Uuid::new_v4()), "alice");
        let bob = Identity::new(UserId(Uuid::new_v4()), "bob");

        let (tx_a, mut rx_a) = event_channel(8);
        let (tx_b, mut rx_b) = event_channel(8);
        let (tx_anon, mut rx_anon) = event_channel(8);
        let mut conn_a = Connection::new(tx_a);
        let mut conn_b = Connection::new(tx_b);
        let _anonymous = Connection::new(tx_anon);
        registry.register(&mut conn_a, alice.clone());
        registry.register(&mut conn_b, bob.clone());

        let report = PresenceBroadcaster::new().broadcast(&registry);
        assert_eq!(report, BroadcastReport { recipients: 2, failed: 0 });

        let expected = vec![PresenceEntry::from(&alice), PresenceEntry::from(&bob)];
        assert_eq!(online_of(&mut rx_a), expected);
        assert_eq!(online_of(&mut rx_b), expected);
        assert!(rx_anon.try_recv().is_err());
    }

    #[test]
    fn leaver_is_excluded_from_the_following_broadcast() {
        let mut registry = ConnectionRegistry::new();
        let alice = Identity::new(UserId(Uuid::new_v4()), "alice");
        let bob = Identity::new(UserId(Uuid::new_v4()), "bob");
        let (tx_a, mut rx_a) = event_channel(8);
        let (tx_b, mut rx_b) = event_channel(8);
        let mut conn_a = Connection::new(tx_a);
        let mut conn_b = Connection::new(tx_b);
        registry.register(&mut conn_a, alice.clone());
        registry.register(&mut conn_b, bob);

        registry.deregister(conn_b.id());
        let report = PresenceBroadcaster::new().broadcast(&registry);

        assert_eq!(report.recipients, 1);
        assert_eq!(online_of(&mut rx_a), vec![PresenceEntry::from(&alice)]);
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn full_channel_is_counted_and_skipped() {
        let mut registry = ConnectionRegistry::new();
        let (tx_full, _rx_full) = event_channel(1);
        let (tx_ok, mut rx_ok) = event_channel(8);
        let mut full = Connection::new(tx_full);
        let mut ok = Connection::new(tx_ok);
        registry.register(&mut full, Identity::new(UserId(Uuid::new_v4()), "alice"));
        registry.register(&mut ok, Identity::new(UserId(Uuid::new_v4()), "bob"));

        let filler = Arc::new(ServerEvent::Presence { online: vec![] });
        full.deliver(filler).unwrap();

        let report = PresenceBroadcaster::new().broadcast(&registry);
        assert_eq!(report, BroadcastReport { recipients: 1, failed: 1 });
        assert_eq!(online_of(&mut rx_ok).len(), 2);
    }
}
