//! 主应用程序入口
//!
//! 加载配置，装配适配器与应用服务，启动 Axum Web API 与 WebSocket 中枢。

use std::sync::Arc;

use application::{
    ChatHub, ChatHubDependencies, Clock, HistoryService, IdentityVerifier, SystemClock,
    UserService, UserServiceDependencies,
};
use config::AppConfig;
use infrastructure::{Infrastructure, InfrastructureConfig};
use tracing_subscriber::EnvFilter;
use web_api::{http_router, AppState, JwtService, WsSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(config = %config.sanitized(), "配置已加载");

    let infra = Infrastructure::connect(InfrastructureConfig {
        database_url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        bcrypt_cost: Some(config.security.bcrypt_cost),
    })
    .await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    let user_service = UserService::new(UserServiceDependencies {
        user_repository: infra.user_repository.clone(),
        password_hasher: infra.password_hasher_trait(),
        clock,
    });
    let history_service = HistoryService::new(infra.message_repository.clone());
    let hub = ChatHub::new(ChatHubDependencies {
        identity_verifier: jwt_service.clone() as Arc<dyn IdentityVerifier>,
        message_repository: infra.message_repository.clone(),
    });

    let state = AppState::new(
        Arc::new(hub),
        Arc::new(user_service),
        Arc::new(history_service),
        jwt_service,
        WsSettings::from(&config.hub),
    );

    let app = http_router(state, &config.server.cors_origins);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("presence-hub 启动在 http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听关闭信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到关闭信号，正在停止");
}
