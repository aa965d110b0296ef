use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::credentials::{AuthError, PasswordHasherError};

/// 应用层错误。
///
/// 与协议边界的约定：`Domain`（帧校验失败）静默丢弃，`Repository`
/// 视为发送失败。单条连接的投递失败只计入 `RouteReport`，不在这里出现。
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
}

impl ApplicationError {
    /// 帧校验失败（缺少收件人、正文为空等）
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Domain(DomainError::InvalidArgument { .. }))
    }
}
