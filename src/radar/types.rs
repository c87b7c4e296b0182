//! 好友 API DTO 与通用响应处理

use crate::radar::error::{SyncError, SyncResult};
use crate::radar::friend::models::Friend;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, error};

/// 反序列化数组字段，处理 null 值
pub(crate) fn deserialize_vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// GET /api/friends 响应
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FriendsResp {
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub friends: Vec<Friend>,
}

/// PUT /api/friends/{id} 请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertFriendReq {
    pub name: String,
    #[serde(rename = "lastContact")]
    pub last_contact: i64,
}

impl From<&Friend> for UpsertFriendReq {
    fn from(f: &Friend) -> Self {
        Self {
            name: f.name.clone(),
            last_contact: f.last_contact,
        }
    }
}

/// PUT /api/friends/batch 请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUpsertReq {
    pub friends: Vec<Friend>,
}

/// 写操作的统一成功响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResp {
    #[serde(default)]
    pub success: bool,
}

/// 服务器错误响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResp {
    pub error: String,
}

/// 通用 HTTP 响应处理：检查状态码后反序列化 body
///
/// 非 2xx 返回 `SyncError::Http`，body 无法解析返回 `SyncError::MalformedData`。
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> SyncResult<T> {
    let status = response.status();
    let body_bytes = response.bytes().await?;
    let body_str = String::from_utf8_lossy(&body_bytes);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        let body = serde_json::from_slice::<ErrorResp>(&body_bytes)
            .map(|e| e.error)
            .unwrap_or_else(|_| body_str.to_string());
        return Err(SyncError::Http {
            status: status.as_u16(),
            body,
        });
    }
    debug!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);

    serde_json::from_slice::<T>(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        SyncError::MalformedData(format!("反序列化响应失败: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friends_resp_accepts_null_and_missing() {
        let resp: FriendsResp = serde_json::from_str(r#"{"friends":null}"#).unwrap();
        assert!(resp.friends.is_empty());
        let resp: FriendsResp = serde_json::from_str("{}").unwrap();
        assert!(resp.friends.is_empty());
    }

    #[test]
    fn upsert_body_has_only_name_and_last_contact() {
        let f = Friend {
            id: "x".into(),
            name: "Alice".into(),
            last_contact: 42,
        };
        let body = serde_json::to_value(UpsertFriendReq::from(&f)).unwrap();
        assert_eq!(body, serde_json::json!({"name": "Alice", "lastContact": 42}));
    }
}
