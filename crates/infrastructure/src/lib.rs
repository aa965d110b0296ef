//! 基础设施层实现。
//!
//! 提供 PostgreSQL 与进程内仓储、密码哈希等适配器，实现应用层定义的端口。

pub mod builder;
pub mod memory;
pub mod migrations;
pub mod password;
pub mod repository;

pub use builder::{Infrastructure, InfrastructureConfig, InfrastructureError};
pub use memory::{InMemoryMessageRepository, InMemoryUserRepository};
pub use migrations::MIGRATOR;
pub use password::BcryptPasswordHasher;
pub use repository::{create_pg_pool, PgMessageRepository, PgStorage, PgUserRepository};
