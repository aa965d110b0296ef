//! 连接注册表
//!
//! 维护“身份 → 在线连接集合”的映射。注册表本身不做同步，
//! 由 [`crate::ChatHub`] 通过唯一的读写锁串行化所有访问：
//! 注册/注销与在线广播在写锁内完成，路由查找与投递在读锁内完成。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use domain::{ConnectionId, Identity, ServerEvent, UserId};
use indexmap::IndexMap;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

/// 出站事件通道的发送端，每条连接一个
pub type EventSender = mpsc::Sender<Arc<ServerEvent>>;
pub type EventReceiver = mpsc::Receiver<Arc<ServerEvent>>;

/// 中枢共享的注册表句柄
pub type SharedRegistry = Arc<RwLock<ConnectionRegistry>>;

/// 创建一条连接的出站事件通道
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity.max(1))
}

/// 单条连接的投递失败
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
    #[error("connection {0} outbound buffer is full")]
    Backpressure(ConnectionId),
}

/// 一条在线的双向通道。
///
/// 克隆共享同一个出站通道和存活标记；注册表持有的副本与传输层持有的副本
/// 指向同一条物理连接。
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    identity: Option<Identity>,
    outbound: EventSender,
    alive: Arc<AtomicBool>,
}

impl Connection {
    pub fn new(outbound: EventSender) -> Self {
        Self {
            id: ConnectionId::generate(),
            identity: None,
            outbound,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// 非阻塞地推送一个事件。通道已满或已关闭都算投递失败，不重试。
    pub fn deliver(&self, event: Arc<ServerEvent>) -> Result<(), DeliveryError> {
        self.outbound.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Backpressure(self.id),
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed(self.id),
        })
    }

    /// 收到对端的任何活动（pong 或数据帧）时调用
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// 心跳检查：读取并清除存活标记。返回 `false` 表示上个周期内对端毫无响应。
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }
}

#[derive(Debug)]
struct OnlineEntry {
    identity: Identity,
    connections: IndexMap<ConnectionId, Connection>,
}

/// 身份到在线连接集合的映射。
///
/// 不变量：
/// - 注册表中的每条连接都带有已解析的身份；
/// - 一条连接至多属于一个身份的集合；
/// - 身份条目存在当且仅当它至少有一条连接。
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    // 按上线先后排序
    online: IndexMap<UserId, OnlineEntry>,
    index: HashMap<ConnectionId, UserId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// 为连接附加身份并加入该身份的集合。
    ///
    /// 每条连接一生只注册一次：已带身份或已在表中的连接再次注册是空操作，返回 `false`。
    pub fn register(&mut self, connection: &mut Connection, identity: Identity) -> bool {
        if connection.identity.is_some() || self.index.contains_key(&connection.id) {
            return false;
        }

        connection.identity = Some(identity.clone());
        let user_id = identity.id;
        self.online
            .entry(user_id)
            .or_insert_with(|| OnlineEntry {
                identity,
                connections: IndexMap::new(),
            })
            .connections
            .insert(connection.id, connection.clone());
        self.index.insert(connection.id, user_id);

        tracing::debug!(connection_id = %connection.id, user_id = %user_id, "connection registered");
        true
    }

    /// 把连接从其身份集合中移除；集合变空时身份条目一并删除。
    ///
    /// 对从未注册（或已注销）的连接调用是空操作，返回 `None`。
    pub fn deregister(&mut self, connection_id: ConnectionId) -> Option<Connection> {
        let user_id = self.index.remove(&connection_id)?;
        let entry = self.online.get_mut(&user_id)?;
        let removed = entry.connections.shift_remove(&connection_id);
        if entry.connections.is_empty() {
            self.online.shift_remove(&user_id);
        }

        tracing::debug!(connection_id = %connection_id, user_id = %user_id, "connection deregistered");
        removed
    }

    /// 某身份当前的全部在线连接；不在线时为空
    pub fn connections_for(&self, user_id: UserId) -> impl Iterator<Item = &Connection> + '_ {
        self.online
            .get(&user_id)
            .into_iter()
            .flat_map(|entry| entry.connections.values())
    }

    /// 当前在线身份快照，按上线先后排序
    pub fn online_identities(&self) -> Vec<Identity> {
        self.online
            .values()
            .map(|entry| entry.identity.clone())
            .collect()
    }

    pub fn all_connections(&self) -> impl Iterator<Item = &Connection> + '_ {
        self.online
            .values()
            .flat_map(|entry| entry.connections.values())
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.index.contains_key(&connection_id)
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.online.contains_key(&user_id)
    }

    pub fn connection_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn identity(name: &str) -> Identity {
        Identity::new(UserId(Uuid::new_v4()), name)
    }

    fn connection() -> (Connection, EventReceiver) {
        let (tx, rx) = event_channel(8);
        (Connection::new(tx), rx)
    }

    #[test]
    fn register_attaches_identity_and_indexes_connection() {
        let mut registry = ConnectionRegistry::new();
        let alice = identity("alice");
        let (mut conn, _rx) = connection();

        assert!(registry.register(&mut conn, alice.clone()));
        assert_eq!(conn.identity(), Some(&alice));
        assert!(registry.contains(conn.id()));
        assert_eq!(registry.connections_for(alice.id).count(), 1);
        assert_eq!(registry.online_identities(), vec![alice]);
    }

    #[test]
    fn register_is_idempotent_per_connection() {
        let mut registry = ConnectionRegistry::new();
        let alice = identity("alice");
        let bob = identity("bob");
        let (mut conn, _rx) = connection();

        assert!(registry.register(&mut conn, alice.clone()));
        assert!(!registry.register(&mut conn, alice.clone()));
        assert!(!registry.register(&mut conn, bob.clone()));

        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.connections_for(bob.id).count(), 0);
        assert_eq!(registry.online_identities(), vec![alice]);
    }

    #[test]
    fn second_connection_keeps_identity_online_after_first_leaves() {
        let mut registry = ConnectionRegistry::new();
        let alice = identity("alice");
        let (mut tab1, _rx1) = connection();
        let (mut tab2, _rx2) = connection();

        registry.register(&mut tab1, alice.clone());
        registry.register(&mut tab2, alice.clone());
        assert_eq!(registry.online_identities().len(), 1);
        assert_eq!(registry.connections_for(alice.id).count(), 2);

        assert!(registry.deregister(tab1.id()).is_some());
        assert!(registry.is_online(alice.id));
        assert_eq!(registry.connections_for(alice.id).count(), 1);

        assert!(registry.deregister(tab2.id()).is_some());
        assert!(!registry.is_online(alice.id));
        assert!(registry.online_identities().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn deregister_unknown_connection_is_noop() {
        let mut registry = ConnectionRegistry::new();
        let (conn, _rx) = connection();
        assert!(registry.deregister(conn.id()).is_none());

        let (mut other, _rx2) = connection();
        registry.register(&mut other, identity("alice"));
        assert!(registry.deregister(other.id()).is_some());
        assert!(registry.deregister(other.id()).is_none());
    }

    #[test]
    fn online_identities_follow_arrival_order() {
        let mut registry = ConnectionRegistry::new();
        let alice = identity("alice");
        let bob = identity("bob");
        let carol = identity("carol");
        let (mut a, _ra) = connection();
        let (mut b, _rb) = connection();
        let (mut c, _rc) = connection();

        registry.register(&mut a, alice.clone());
        registry.register(&mut b, bob.clone());
        registry.register(&mut c, carol.clone());
        registry.deregister(b.id());

        assert_eq!(registry.online_identities(), vec![alice, carol]);
    }

    #[test]
    fn deliver_reports_closed_and_full_channels() {
        let (tx, rx) = event_channel(1);
        let conn = Connection::new(tx);
        let event = Arc::new(ServerEvent::Presence { online: vec![] });

        assert!(conn.deliver(event.clone()).is_ok());
        assert_eq!(
            conn.deliver(event.clone()),
            Err(DeliveryError::Backpressure(conn.id()))
        );

        drop(rx);
        assert_eq!(conn.deliver(event), Err(DeliveryError::Closed(conn.id())));
    }

    #[test]
    fn alive_flag_is_cleared_by_heartbeat_and_restored_by_activity() {
        let (conn, _rx) = connection();
        assert!(conn.take_alive());
        assert!(!conn.take_alive());
        conn.clone().mark_alive();
        assert!(conn.take_alive());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Register { conn: usize, user: usize },
        Deregister { conn: usize },
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..8usize, 0..4usize).prop_map(|(conn, user)| Op::Register { conn, user }),
            (0..8usize).prop_map(|conn| Op::Deregister { conn }),
        ]
    }

    proptest! {
        #[test]
        fn online_set_matches_registered_connections(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let users: Vec<Identity> = (0..4).map(|i| identity(&format!("user-{i}"))).collect();
            let mut receivers = Vec::new();
            let mut conns: Vec<Connection> = (0..8)
                .map(|_| {
                    let (conn, rx) = connection();
                    receivers.push(rx);
                    conn
                })
                .collect();

            let mut registry = ConnectionRegistry::new();
            // 模型：连接下标 -> 用户下标
            let mut model: HashMap<usize, usize> = HashMap::new();
            let mut ever_registered: HashSet<usize> = HashSet::new();

            for op in ops {
                match op {
                    Op::Register { conn, user } => {
                        let registered = registry.register(&mut conns[conn], users[user].clone());
                        prop_assert_eq!(registered, !ever_registered.contains(&conn));
                        if registered {
                            ever_registered.insert(conn);
                            model.insert(conn, user);
                        }
                    }
                    Op::Deregister { conn } => {
                        let removed = registry.deregister(conns[conn].id());
                        prop_assert_eq!(removed.is_some(), model.remove(&conn).is_some());
                    }
                }

                let expected: HashSet<UserId> = model.values().map(|&u| users[u].id).collect();
                let actual: HashSet<UserId> =
                    registry.online_identities().into_iter().map(|i| i.id).collect();
                prop_assert_eq!(&actual, &expected);
                prop_assert_eq!(registry.connection_count(), model.len());
                prop_assert_eq!(registry.all_connections().count(), model.len());
            }
        }
    }
}
