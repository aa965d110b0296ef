//! WebSocket 线协议
//!
//! 入站帧与出站事件都是单个 JSON 对象，每个 WebSocket 文本帧承载一个。
//! 入站：握手帧 `{"token": ...}`、发送帧 `{"recipient": ..., "text": ...}`。
//! 出站：在线列表 `{"online": [...]}`、消息投递 `{"id", "sender", "recipient", "text"}`。

use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::message::Message;
use crate::value_objects::{MessageId, UserId};

/// 客户端发往服务器的帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// 握手帧：携带凭证
    Authenticate { token: String },
    /// 发送帧：字段缺失在这里先保留为 `None`，由路由层统一校验
    Send {
        recipient: Option<String>,
        text: Option<String>,
    },
}

/// 握手帧只允许 `token` 一个字段，带其他字段的对象按发送帧处理
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct HandshakeFrame {
    token: String,
}

#[derive(Deserialize)]
struct SendFrame {
    recipient: Option<String>,
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFrame {
    Handshake(HandshakeFrame),
    Send(SendFrame),
}

impl ClientFrame {
    /// 解析一个入站文本帧。无法识别的帧返回 `None`，调用方直接忽略。
    ///
    /// 既没有 `recipient` 也没有 `text` 的对象不算发送帧。
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw).ok()? {
            RawFrame::Handshake(HandshakeFrame { token }) => Some(Self::Authenticate { token }),
            RawFrame::Send(SendFrame {
                recipient: None,
                text: None,
            }) => None,
            RawFrame::Send(SendFrame { recipient, text }) => Some(Self::Send { recipient, text }),
        }
    }
}

/// 在线列表中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub identity_id: UserId,
    pub display_name: String,
}

impl From<&Identity> for PresenceEntry {
    fn from(identity: &Identity) -> Self {
        Self {
            identity_id: identity.id,
            display_name: identity.display_name.clone(),
        }
    }
}

/// 投递给收件人连接的消息事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredMessage {
    pub id: MessageId,
    pub sender: UserId,
    pub recipient: UserId,
    pub text: String,
}

impl From<&Message> for DeliveredMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            sender: message.sender,
            recipient: message.recipient,
            text: message.text.as_str().to_owned(),
        }
    }
}

/// 服务器发往客户端的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerEvent {
    Presence { online: Vec<PresenceEntry> },
    Message(DeliveredMessage),
}

impl ServerEvent {
    pub fn presence<'a>(identities: impl IntoIterator<Item = &'a Identity>) -> Self {
        Self::Presence {
            online: identities.into_iter().map(PresenceEntry::from).collect(),
        }
    }

    pub fn message(message: &Message) -> Self {
        Self::Message(DeliveredMessage::from(message))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
