//! Web API 层。
//!
//! 提供 Axum 路由：REST 请求委托给应用层服务，WebSocket 连接交给连接中枢。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{credential_from_headers, Claims, JwtService, LoginResponse, TOKEN_COOKIE};
pub use config::JwtConfig;
pub use error::ApiError;
pub use routes::{http_router, router};
pub use state::{AppState, WsSettings};
