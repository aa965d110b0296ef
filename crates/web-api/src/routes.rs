use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;
use validator::Validate;

use application::{AuthenticateUserRequest, RegisterUserRequest};
use domain::{Identity, Message, PresenceEntry, User, UserId};

use crate::{
    auth::{credential_from_headers, JwtService, LoginResponse},
    error::ApiError,
    state::AppState,
    ws_connection::WebSocketConnection,
};

#[derive(Debug, Deserialize, Validate)]
struct CredentialsPayload {
    #[validate(length(min = 1, max = 50))]
    username: String,
    #[validate(length(min = 1, max = 128))]
    password: String,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// 历史消息条目
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageView {
    id: Uuid,
    sender: UserId,
    recipient: UserId,
    text: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        Self {
            id: message.id.into(),
            sender: message.sender,
            recipient: message.recipient,
            text: message.text.into_inner(),
            created_at: message.created_at,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .with_state(state)
}

/// 生产环境路由：附加请求追踪与 CORS。`cors_origins` 为空时允许任意来源（不携带凭证）。
pub fn http_router(state: AppState, cors_origins: &[String]) -> Router {
    router(state)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return CorsLayer::permissive();
    }
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register_user))
        .route("/auth/login", post(login_user))
        .route("/auth/logout", post(logout_user))
        .route("/profile", get(profile))
        .route("/messages/{peer_id}", get(conversation))
        .route("/people", get(people))
        .route("/online", get(online))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

fn session_response(
    jwt: &JwtService,
    status: StatusCode,
    user: &User,
) -> Result<Response, ApiError> {
    let token = jwt.generate_token(user)?;
    let cookie = jwt.session_cookie(&token);
    let body = LoginResponse {
        id: user.id,
        username: user.username.as_str().to_owned(),
        token,
    };
    Ok((status, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<Response, ApiError> {
    payload.validate()?;
    let user = state
        .user_service
        .register(RegisterUserRequest {
            username: payload.username,
            password: payload.password,
        })
        .await?;

    session_response(&state.jwt_service, StatusCode::CREATED, &user)
}

async fn login_user(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<Response, ApiError> {
    payload.validate()?;
    let user = state
        .user_service
        .authenticate(AuthenticateUserRequest {
            username: payload.username,
            password: payload.password,
        })
        .await?;

    tracing::info!(user_id = %user.id, "user logged in");
    session_response(&state.jwt_service, StatusCode::OK, &user)
}

async fn logout_user() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, JwtService::clear_cookie())],
    )
}

async fn profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PresenceEntry>, ApiError> {
    let caller = state.jwt_service.identity_from_headers(&headers)?;
    let identity = state.user_service.find_identity(caller.id).await?;
    Ok(Json(PresenceEntry::from(&identity)))
}

async fn conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(peer_id): Path<Uuid>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let caller = state.jwt_service.identity_from_headers(&headers)?;
    let messages = state
        .history_service
        .conversation(caller.id, UserId::from(peer_id))
        .await?;

    Ok(Json(messages.into_iter().map(MessageView::from).collect()))
}

/// 离线联系人列表同样需要，不要求凭证
async fn people(State(state): State<AppState>) -> Result<Json<Vec<PresenceEntry>>, ApiError> {
    let people = state.user_service.list_people().await?;
    Ok(Json(entries(&people)))
}

async fn online(State(state): State<AppState>) -> Json<Vec<PresenceEntry>> {
    let online = state.hub.online_identities().await;
    Json(entries(&online))
}

fn entries(identities: &[Identity]) -> Vec<PresenceEntry> {
    identities.iter().map(PresenceEntry::from).collect()
}

/// 凭证缺失或无效也允许升级：连接先以匿名状态建立，可随后发送握手帧
async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let credential = query
        .token
        .filter(|token| !token.is_empty())
        .or_else(|| credential_from_headers(&headers));

    ws.on_upgrade(move |socket| WebSocketConnection::new(socket, state, credential).run())
}
