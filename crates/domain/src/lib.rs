//! 在线状态与点对点消息中枢的领域模型
//!
//! 包含身份、用户、消息等核心实体，值对象，以及 WebSocket 线协议帧定义。

pub mod errors;
pub mod identity;
pub mod message;
pub mod protocol;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use identity::Identity;
pub use message::Message;
pub use protocol::{ClientFrame, DeliveredMessage, PresenceEntry, ServerEvent};
pub use user::User;
pub use value_objects::*;
