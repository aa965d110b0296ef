use std::sync::Arc;
use std::time::Duration;

use application::{ChatHub, HistoryService, UserService};

use crate::JwtService;

/// WebSocket 传输参数
#[derive(Debug, Clone, Copy)]
pub struct WsSettings {
    pub heartbeat_interval: Duration,
    pub anonymous_timeout: Duration,
    pub outbound_buffer: usize,
}

impl From<&config::HubConfig> for WsSettings {
    fn from(hub: &config::HubConfig) -> Self {
        Self {
            heartbeat_interval: hub.heartbeat_interval(),
            anonymous_timeout: hub.anonymous_timeout(),
            outbound_buffer: hub.outbound_buffer,
        }
    }
}

impl Default for WsSettings {
    fn default() -> Self {
        Self::from(&config::HubConfig::default())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<ChatHub>,
    pub user_service: Arc<UserService>,
    pub history_service: Arc<HistoryService>,
    pub jwt_service: Arc<JwtService>,
    pub ws_settings: WsSettings,
}

impl AppState {
    pub fn new(
        hub: Arc<ChatHub>,
        user_service: Arc<UserService>,
        history_service: Arc<HistoryService>,
        jwt_service: Arc<JwtService>,
        ws_settings: WsSettings,
    ) -> Self {
        Self {
            hub,
            user_service,
            history_service,
            jwt_service,
            ws_settings,
        }
    }
}
