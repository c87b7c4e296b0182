//! 用户身份
//!
//! 身份由外部身份提供方（Google 登录）给出，这里只解析 ID Token 的载荷，
//! 不做签名校验；签名校验由服务端负责。

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 本地保存当前用户的存储键
pub const USER_STORAGE_KEY: &str = "friends-radar-user";

/// 当前登录用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

/// 登录会话：用户身份 + 调用 API 用的 bearer token
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: UserIdentity,
    pub id_token: Option<String>,
}

impl AuthSession {
    pub fn new(user: UserIdentity, id_token: Option<String>) -> Self {
        Self { user, id_token }
    }

    /// 由 ID Token 直接构建会话
    pub fn from_id_token(id_token: &str) -> Result<Self> {
        let user = identity_from_id_token(id_token)?;
        Ok(Self::new(user, Some(id_token.to_string())))
    }

    /// 数据隔离使用的作用域
    pub fn scope(&self) -> &str {
        &self.user.id
    }
}

#[derive(Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    picture: Option<String>,
}

/// 解析 JWT 载荷中的用户信息（不校验签名）
pub fn identity_from_id_token(token: &str) -> Result<UserIdentity> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
        _ => return Err(anyhow!("ID Token 格式错误")),
    };

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .context("ID Token 载荷 base64 解码失败")?;
    let claims: IdTokenClaims =
        serde_json::from_slice(&bytes).context("ID Token 载荷解析失败")?;
    debug!("[Auth] 解析 ID Token 成功，用户: {}", claims.sub);

    Ok(UserIdentity {
        id: claims.sub,
        email: claims.email,
        name: claims.name,
        picture: claims.picture,
    })
}
