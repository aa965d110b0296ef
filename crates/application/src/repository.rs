use async_trait::async_trait;
use domain::{Message, MessageText, RepositoryError, User, UserId, Username};

/// 消息存储：只追加，不修改、不删除
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 追加一条消息，由存储分配 `id` 与 `created_at`
    async fn append(
        &self,
        sender: UserId,
        recipient: UserId,
        text: MessageText,
    ) -> Result<Message, RepositoryError>;

    /// `a` 与 `b` 之间（任一方向）的全部消息，按创建时间升序
    async fn history(&self, a: UserId, b: UserId) -> Result<Vec<Message>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, RepositoryError>;
    /// 全部已知用户，按用户名排序
    async fn list_all(&self) -> Result<Vec<User>, RepositoryError>;
}
