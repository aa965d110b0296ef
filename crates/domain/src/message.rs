use crate::value_objects::{MessageId, MessageText, Timestamp, UserId};

/// 已持久化的点对点消息。
///
/// `id` 与 `created_at` 由消息存储在追加时分配；核心逻辑从不修改或删除消息。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: UserId,
    pub recipient: UserId,
    pub text: MessageText,
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(
        id: MessageId,
        sender: UserId,
        recipient: UserId,
        text: MessageText,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            sender,
            recipient,
            text,
            created_at,
        }
    }

    /// 消息是否属于 `a` 与 `b` 之间的会话（任一方向）。
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.sender == a && self.recipient == b) || (self.sender == b && self.recipient == a)
    }
}
