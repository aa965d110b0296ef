//! 应用层实现。
//!
//! 连接注册表、消息路由、在线广播以及串联它们的连接生命周期协调器，
//! 外加对外部适配器（身份校验、消息存储、密码哈希）的抽象。

pub mod clock;
pub mod credentials;
pub mod error;
pub mod hub;
pub mod presence;
pub mod registry;
pub mod repository;
pub mod router;
pub mod services;

pub use clock::{Clock, SystemClock};
pub use credentials::{AuthError, IdentityVerifier, PasswordHasher, PasswordHasherError};
pub use error::ApplicationError;
pub use hub::{ChatHub, ChatHubDependencies, FrameOutcome};
pub use presence::{BroadcastReport, PresenceBroadcaster};
pub use registry::{
    event_channel, Connection, ConnectionRegistry, DeliveryError, EventReceiver, EventSender,
    SharedRegistry,
};
pub use repository::{MessageRepository, UserRepository};
pub use router::{MessageRouter, RouteReport, SendRequest};
pub use services::{
    AuthenticateUserRequest, HistoryService, RegisterUserRequest, UserService,
    UserServiceDependencies,
};

#[cfg(test)]
pub(crate) mod test_support;
