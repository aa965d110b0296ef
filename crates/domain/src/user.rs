use crate::identity::Identity;
use crate::value_objects::{PasswordHash, Timestamp, UserId, Username};

/// 账号记录。在线身份 [`Identity`] 由它派生，显示名即用户名。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    #[serde(skip_serializing)] // 密码字段不暴露给客户端
    pub password: PasswordHash,
    pub created_at: Timestamp,
}

impl User {
    pub fn register(
        id: UserId,
        username: Username,
        password: PasswordHash,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            username,
            password,
            created_at: now,
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.id, self.username.as_str())
    }
}
