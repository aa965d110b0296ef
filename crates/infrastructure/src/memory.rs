//! 进程内仓储实现
//!
//! 未配置数据库时使用，同时供集成测试装配服务。重启即丢失数据。

use std::collections::HashMap;
use std::sync::Arc;

use application::{Clock, MessageRepository, SystemClock, UserRepository};
use async_trait::async_trait;
use domain::{Message, MessageId, MessageText, RepositoryError, User, UserId, Username};
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct InMemoryMessageRepository {
    // 追加顺序即创建顺序
    messages: RwLock<Vec<Message>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryMessageRepository {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }
}

impl Default for InMemoryMessageRepository {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(
        &self,
        sender: UserId,
        recipient: UserId,
        text: MessageText,
    ) -> Result<Message, RepositoryError> {
        let mut messages = self.messages.write().await;
        let message = Message::new(
            MessageId::from(Uuid::new_v4()),
            sender,
            recipient,
            text,
            self.clock.now(),
        );
        messages.push(message.clone());
        Ok(message)
    }

    async fn history(&self, a: UserId, b: UserId) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|message| message.is_between(a, b))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) || users.values().any(|u| u.username == user.username) {
            return Err(RepositoryError::Conflict);
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| &user.username == username)
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<User>, RepositoryError> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.username.as_str().cmp(b.username.as_str()));
        Ok(users)
    }
}
