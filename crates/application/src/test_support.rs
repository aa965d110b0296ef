//! 单元测试用的端口替身

use std::collections::HashMap;

use async_trait::async_trait;
use domain::{Identity, Message, MessageId, MessageText, RepositoryError, UserId};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::credentials::{AuthError, IdentityVerifier};
use crate::repository::MessageRepository;

#[derive(Default)]
pub struct InMemoryMessages {
    messages: Mutex<Vec<Message>>,
}

impl InMemoryMessages {
    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessages {
    async fn append(
        &self,
        sender: UserId,
        recipient: UserId,
        text: MessageText,
    ) -> Result<Message, RepositoryError> {
        let message = Message::new(
            MessageId(Uuid::new_v4()),
            sender,
            recipient,
            text,
            chrono::Utc::now(),
        );
        self.messages.lock().await.push(message.clone());
        Ok(message)
    }

    async fn history(&self, a: UserId, b: UserId) -> Result<Vec<Message>, RepositoryError> {
        Ok(self
            .messages
            .lock()
            .await
            .iter()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect())
    }
}

/// 按登记表查令牌的校验器，未登记的令牌一律拒绝
#[derive(Default)]
pub struct StaticVerifier {
    tokens: HashMap<String, Identity>,
}

impl StaticVerifier {
    pub fn with(mut self, token: &str, identity: Identity) -> Self {
        self.tokens.insert(token.to_owned(), identity);
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::InvalidCredential(format!("unknown token {token}")))
    }
}
