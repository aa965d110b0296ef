//! JWT 认证模块
//!
//! 提供 token 生成与验证，并作为中枢的生产环境 [`IdentityVerifier`]。
//! 凭证来源依次为：`token` 查询参数、`Authorization: Bearer` 头、`token` Cookie。

use application::{AuthError, IdentityVerifier};
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use config::JwtConfig;
use domain::{Identity, User, UserId};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

pub const TOKEN_COOKIE: &str = "token";

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// token 有效期（秒），同时用作 Cookie 的 Max-Age
    pub fn ttl_seconds(&self) -> i64 {
        self.config.expiration_hours * 3600
    }

    pub fn generate_token(&self, user: &User) -> Result<String, ApiError> {
        let exp = chrono::Utc::now() + chrono::Duration::hours(self.config.expiration_hours);
        let claims = Claims {
            sub: user.id.into(),
            username: user.username.as_str().to_owned(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|err| {
            ApiError::internal_server_error(format!("Token generation failed: {}", err))
        })
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| token_data.claims)
            .map_err(|err| AuthError::InvalidCredential(err.to_string()))
    }

    /// REST 请求的调用者身份：Bearer 头或 Cookie
    pub fn identity_from_headers(&self, headers: &HeaderMap) -> Result<Identity, ApiError> {
        let token = credential_from_headers(headers)
            .ok_or_else(|| ApiError::unauthorized("Missing credential"))?;
        let claims = self
            .verify_token(&token)
            .map_err(|err| ApiError::unauthorized(err.to_string()))?;
        Ok(claims.into())
    }

    /// 登录成功后下发的 Cookie
    pub fn session_cookie(&self, token: &str) -> String {
        format!(
            "{TOKEN_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.ttl_seconds()
        )
    }

    pub fn clear_cookie() -> String {
        format!("{TOKEN_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
    }
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity::new(UserId::from(claims.sub), claims.username)
    }
}

#[async_trait]
impl IdentityVerifier for JwtService {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::MissingCredential);
        }
        self.verify_token(token).map(Identity::from)
    }
}

/// 从 Bearer 头或 Cookie 中取出凭证
pub fn credential_from_headers(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| cookie_token(headers))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_owned())
        .filter(|token| !token.is_empty())
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, token)| token.to_owned())
        .filter(|token| !token.is_empty())
}

/// 登录/注册响应
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub id: UserId,
    pub username: String,
    pub token: String,
}
