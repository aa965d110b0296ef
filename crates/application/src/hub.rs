//! 连接生命周期协调器
//!
//! 传输层只调用三个入口：[`ChatHub::on_connect`]、[`ChatHub::on_frame`]、
//! [`ChatHub::on_close`]。同一条连接的三个入口由其所在任务串行调用，
//! 不同连接之间通过注册表的读写锁串行化。

use std::sync::Arc;

use domain::{ClientFrame, Identity};

use crate::{
    credentials::IdentityVerifier,
    error::ApplicationError,
    presence::PresenceBroadcaster,
    registry::{Connection, ConnectionRegistry, EventSender, SharedRegistry},
    repository::MessageRepository,
    router::{MessageRouter, RouteReport, SendRequest},
};

pub struct ChatHubDependencies {
    pub identity_verifier: Arc<dyn IdentityVerifier>,
    pub message_repository: Arc<dyn MessageRepository>,
}

/// 单个入站帧的处理结果
#[derive(Debug)]
pub enum FrameOutcome {
    /// 握手帧校验通过，连接已注册
    Authenticated(Identity),
    /// 发送帧已落库并投递
    Routed(RouteReport),
    /// 无法识别的帧，或已认证连接上的重复握手
    Ignored,
}

pub struct ChatHub {
    registry: SharedRegistry,
    verifier: Arc<dyn IdentityVerifier>,
    router: MessageRouter,
    presence: PresenceBroadcaster,
}

impl ChatHub {
    pub fn new(deps: ChatHubDependencies) -> Self {
        let registry = ConnectionRegistry::shared();
        Self {
            router: MessageRouter::new(deps.message_repository, registry.clone()),
            registry,
            verifier: deps.identity_verifier,
            presence: PresenceBroadcaster::new(),
        }
    }

    /// 新连接建立。凭证校验失败不是致命错误，连接保持匿名。
    pub async fn on_connect(&self, credential: Option<&str>, outbound: EventSender) -> Connection {
        let mut connection = Connection::new(outbound);
        tracing::debug!(connection_id = %connection.id(), "connection opened");

        if let Some(token) = credential {
            if let Err(err) = self.authenticate(&mut connection, token).await {
                tracing::info!(
                    connection_id = %connection.id(),
                    error = %err,
                    "credential rejected, connection stays anonymous"
                );
            }
        }
        connection
    }

    /// 处理一个入站文本帧
    pub async fn on_frame(
        &self,
        connection: &mut Connection,
        raw: &str,
    ) -> Result<FrameOutcome, ApplicationError> {
        connection.mark_alive();

        match ClientFrame::parse(raw) {
            None => {
                tracing::debug!(connection_id = %connection.id(), "unrecognised frame ignored");
                Ok(FrameOutcome::Ignored)
            }
            Some(ClientFrame::Authenticate { token }) => {
                if connection.is_authenticated() {
                    return Ok(FrameOutcome::Ignored);
                }
                let identity = self.authenticate(connection, &token).await?;
                Ok(FrameOutcome::Authenticated(identity))
            }
            Some(ClientFrame::Send { recipient, text }) => {
                let report = self
                    .router
                    .route(connection.identity(), SendRequest { recipient, text })
                    .await?;
                Ok(FrameOutcome::Routed(report))
            }
        }
    }

    /// 连接关闭（正常关闭、传输错误或心跳超时）
    pub async fn on_close(&self, connection: &Connection) {
        let mut registry = self.registry.write().await;
        if registry.deregister(connection.id()).is_some() {
            self.presence.broadcast(&registry);
        }
        tracing::debug!(connection_id = %connection.id(), "connection closed");
    }

    pub async fn online_identities(&self) -> Vec<Identity> {
        self.registry.read().await.online_identities()
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.connection_count()
    }

    async fn authenticate(
        &self,
        connection: &mut Connection,
        token: &str,
    ) -> Result<Identity, ApplicationError> {
        let identity = self.verifier.verify(token).await?;

        let mut registry = self.registry.write().await;
        if registry.register(connection, identity.clone()) {
            self.presence.broadcast(&registry);
            tracing::info!(
                connection_id = %connection.id(),
                user_id = %identity.id,
                "connection authenticated"
            );
        }
        Ok(identity)
    }
}
