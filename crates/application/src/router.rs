use std::sync::Arc;

use domain::{DomainError, Identity, Message, MessageText, ServerEvent, UserId};

use crate::{
    credentials::AuthError, error::ApplicationError, registry::SharedRegistry,
    repository::MessageRepository,
};

/// 一次发送请求，字段来自客户端发送帧，尚未校验
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendRequest {
    pub recipient: Option<String>,
    pub text: Option<String>,
}

impl SendRequest {
    pub fn new(recipient: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            recipient: Some(recipient.into()),
            text: Some(text.into()),
        }
    }

    fn validate(self) -> Result<(UserId, MessageText), DomainError> {
        let recipient = self
            .recipient
            .ok_or_else(|| DomainError::invalid_argument("recipient", "missing"))?
            .parse::<UserId>()?;
        let text = self
            .text
            .ok_or_else(|| DomainError::invalid_argument("text", "missing"))?;
        Ok((recipient, MessageText::new(text)?))
    }
}

/// 一次成功路由的结果
#[derive(Debug, Clone)]
pub struct RouteReport {
    pub message: Message,
    /// 成功推送的收件人连接数
    pub delivered: usize,
    /// 推送失败（已关闭或缓冲区满）的连接数
    pub failed: usize,
}

/// 消息路由：校验 → 持久化 → 投递到收件人的全部在线连接。
///
/// 不回显给发送者；收件人离线时消息只落库。
pub struct MessageRouter {
    messages: Arc<dyn MessageRepository>,
    registry: SharedRegistry,
}

impl MessageRouter {
    pub fn new(messages: Arc<dyn MessageRepository>, registry: SharedRegistry) -> Self {
        Self { messages, registry }
    }

    pub async fn route(
        &self,
        sender: Option<&Identity>,
        request: SendRequest,
    ) -> Result<RouteReport, ApplicationError> {
        let (recipient, text) = request.validate()?;
        let sender = sender.ok_or(AuthError::MissingCredential)?;

        // 存储 I/O 不持有注册表锁
        let message = self.messages.append(sender.id, recipient, text).await?;

        let event = Arc::new(ServerEvent::message(&message));
        let mut delivered = 0;
        let mut failed = 0;
        {
            let registry = self.registry.read().await;
            for connection in registry.connections_for(recipient) {
                match connection.deliver(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(err) => {
                        failed += 1;
                        tracing::warn!(
                            message_id = %message.id,
                            connection_id = %connection.id(),
                            error = %err,
                            "message delivery failed"
                        );
                    }
                }
            }
        }

        tracing::debug!(
            message_id = %message.id,
            sender = %message.sender,
            recipient = %message.recipient,
            delivered,
            failed,
            "message routed"
        );

        Ok(RouteReport {
            message,
            delivered,
            failed,
        })
    }
}
