use std::sync::Arc;

use application::{MessageRepository, PasswordHasher, SystemClock, UserRepository};
use thiserror::Error;

use crate::{
    memory::{InMemoryMessageRepository, InMemoryUserRepository},
    migrations::MIGRATOR,
    password::BcryptPasswordHasher,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Clone, Default)]
pub struct InfrastructureConfig {
    /// 为空时使用进程内存储
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bcrypt_cost: Option<u32>,
}

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 装配好的适配器集合
#[derive(Clone)]
pub struct Infrastructure {
    pub user_repository: Arc<dyn UserRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub password_hasher: Arc<BcryptPasswordHasher>,
}

impl Infrastructure {
    /// 配置了数据库时连接 PostgreSQL 并执行迁移，否则退回进程内存储
    pub async fn connect(config: InfrastructureConfig) -> Result<Self, InfrastructureError> {
        let Some(database_url) = config.database_url.as_deref() else {
            tracing::warn!("database.url not configured, using in-memory stores");
            return Ok(Self::in_memory(config.bcrypt_cost));
        };

        let pool = create_pg_pool(database_url, config.max_connections.max(1)).await?;
        MIGRATOR.run(&pool).await?;
        tracing::info!("database connected and migrations applied");

        let storage = PgStorage::new(pool);
        Ok(Self {
            user_repository: Arc::new(storage.user_repository),
            message_repository: Arc::new(storage.message_repository),
            password_hasher: Arc::new(BcryptPasswordHasher::new(config.bcrypt_cost)),
        })
    }

    pub fn in_memory(bcrypt_cost: Option<u32>) -> Self {
        Self {
            user_repository: Arc::new(InMemoryUserRepository::new()),
            message_repository: Arc::new(InMemoryMessageRepository::new(Arc::new(SystemClock))),
            password_hasher: Arc::new(BcryptPasswordHasher::new(bcrypt_cost)),
        }
    }

    pub fn password_hasher_trait(&self) -> Arc<dyn PasswordHasher> {
        self.password_hasher.clone()
    }
}
