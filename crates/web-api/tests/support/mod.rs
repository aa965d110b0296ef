#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    ChatHub, ChatHubDependencies, HistoryService, IdentityVerifier, SystemClock, UserService,
    UserServiceDependencies,
};
use futures_util::StreamExt;
use infrastructure::Infrastructure;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use uuid::Uuid;
use web_api::{router, AppState, JwtConfig, JwtService, WsSettings};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const SECRET: &str = "integration-test-secret-with-32-plus-chars";

/// 一个监听随机端口、使用进程内存储的完整服务
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    shutdown: Option<oneshot::Sender<()>>,
}

pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub token: String,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(WsSettings {
            heartbeat_interval: Duration::from_secs(30),
            anonymous_timeout: Duration::from_secs(30),
            outbound_buffer: 32,
        })
        .await
    }

    pub async fn start_with(settings: WsSettings) -> Self {
        let infra = Infrastructure::in_memory(Some(4));
        let jwt_service = Arc::new(JwtService::new(JwtConfig {
            secret: SECRET.to_string(),
            expiration_hours: 1,
        }));

        let user_service = UserService::new(UserServiceDependencies {
            user_repository: infra.user_repository.clone(),
            password_hasher: infra.password_hasher_trait(),
            clock: Arc::new(SystemClock),
        });
        let hub = ChatHub::new(ChatHubDependencies {
            identity_verifier: jwt_service.clone() as Arc<dyn IdentityVerifier>,
            message_repository: infra.message_repository.clone(),
        });
        let state = AppState::new(
            Arc::new(hub),
            Arc::new(user_service),
            Arc::new(HistoryService::new(infra.message_repository.clone())),
            jwt_service,
            settings,
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(state);

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            client: Client::new(),
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/api/v1/ws", self.addr)
    }

    pub async fn register(&self, username: &str) -> Account {
        let response = self
            .client
            .post(self.url("/api/v1/auth/register"))
            .json(&json!({ "username": username, "password": "secret" }))
            .send()
            .await
            .expect("register request");
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);

        let body: Value = response.json().await.expect("register json");
        Account {
            id: body["id"].as_str().expect("id").parse().expect("uuid"),
            username: body["username"].as_str().expect("username").to_owned(),
            token: body["token"].as_str().expect("token").to_owned(),
        }
    }

    /// 以查询参数携带凭证建立 WebSocket 连接
    pub async fn connect(&self, token: &str) -> WsClient {
        let url = format!("{}?token={}", self.ws_url(), token);
        let (ws, _) = connect_async(url).await.expect("ws connect");
        ws
    }

    pub async fn connect_anonymous(&self) -> WsClient {
        let (ws, _) = connect_async(self.ws_url()).await.expect("ws connect");
        ws
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// 读取下一个 JSON 文本帧，跳过控制帧
pub async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("ws error");
        match frame {
            TungsteniteMessage::Text(payload) => {
                return serde_json::from_str(payload.as_str()).expect("json frame")
            }
            TungsteniteMessage::Ping(_) | TungsteniteMessage::Pong(_) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

/// 断言在 `wait` 内没有收到任何文本帧
pub async fn expect_silence(ws: &mut WsClient, wait: Duration) {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match timeout(remaining, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(TungsteniteMessage::Text(payload)))) => {
                panic!("unexpected text frame {payload:?}")
            }
            Ok(Some(Ok(_))) => continue,
            Ok(other) => panic!("connection ended early: {other:?}"),
        }
    }
}

/// 在线列表中的显示名，按服务端给出的顺序
pub fn online_names(event: &Value) -> Vec<String> {
    event["online"]
        .as_array()
        .expect("presence event")
        .iter()
        .map(|entry| entry["displayName"].as_str().expect("displayName").to_owned())
        .collect()
}
