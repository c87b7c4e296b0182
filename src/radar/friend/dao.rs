//! 好友本地存储（DAO）
//!
//! 以键值形式保存好友列表：键由作用域派生，值为好友数组的 JSON。
//! `load` / `save` 从不向调用方返回错误，失败只记录日志。

use crate::radar::error::{SyncError, SyncResult};
use crate::radar::friend::models::{now_millis, Friend};
use anyhow::{Context, Result};
use sqlx::{Pool, Sqlite};
use tracing::{debug, warn};

/// 默认存储键前缀
pub const DEFAULT_BASE_KEY: &str = "friends-radar-data";

/// 根据作用域派生存储键：有作用域为 `base-scope`，否则为 `base`
pub fn storage_key(base_key: &str, scope: Option<&str>) -> String {
    match scope {
        Some(scope) if !scope.is_empty() => format!("{}-{}", base_key, scope),
        _ => base_key.to_string(),
    }
}

/// 解析持久化的好友 JSON，必须是数组
pub fn parse_friends(raw: &str) -> Result<Vec<Friend>, SyncError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| SyncError::MalformedData(e.to_string()))?;
    if !value.is_array() {
        return Err(SyncError::MalformedData("存储内容不是数组".to_string()));
    }
    serde_json::from_value(value).map_err(|e| SyncError::MalformedData(e.to_string()))
}

/// 好友 DAO（基于 sqlx 的键值表）
#[derive(Clone)]
pub struct FriendDao {
    db: Pool<Sqlite>,
    base_key: String,
}

impl FriendDao {
    /// 创建新的好友 DAO
    pub fn new(db: Pool<Sqlite>, base_key: impl Into<String>) -> Self {
        Self {
            db,
            base_key: base_key.into(),
        }
    }

    /// 作用域对应的存储键
    pub fn key_for(&self, scope: Option<&str>) -> String {
        storage_key(&self.base_key, scope)
    }

    /// 读取原始值
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT value FROM local_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await
            .context(format!("读取本地键失败: {}", key))
    }

    /// 写入原始值（存在则覆盖）
    pub async fn put_raw(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_kv (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now_millis())
        .execute(&self.db)
        .await
        .context(format!("写入本地键失败: {}", key))?;
        Ok(())
    }

    /// 删除键
    pub async fn remove_raw(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM local_kv WHERE key = ?")
            .bind(key)
            .execute(&self.db)
            .await
            .context(format!("删除本地键失败: {}", key))?;
        Ok(())
    }

    /// 读取作用域下的好友列表，区分数据库错误与数据损坏
    ///
    /// 键不存在时返回空列表。
    pub async fn try_load(&self, scope: Option<&str>) -> SyncResult<Vec<Friend>> {
        let key = self.key_for(scope);
        let raw = self
            .get_raw(&key)
            .await
            .map_err(|e| SyncError::Storage(format!("{:#}", e)))?;
        match raw {
            Some(raw) => parse_friends(&raw),
            None => {
                debug!("[FriendDAO] 本地无数据: {}", key);
                Ok(Vec::new())
            }
        }
    }

    /// 加载作用域下的好友列表
    ///
    /// 键不存在、JSON 损坏、不是数组或数据库出错时均返回空列表。
    pub async fn load(&self, scope: Option<&str>) -> Vec<Friend> {
        match self.try_load(scope).await {
            Ok(friends) => {
                debug!(
                    "[FriendDAO] 加载本地好友 {}，共 {} 个",
                    self.key_for(scope),
                    friends.len()
                );
                friends
            }
            Err(e) => {
                warn!(
                    "[FriendDAO] 加载本地好友失败 {}，按空列表处理: {}",
                    self.key_for(scope),
                    e
                );
                Vec::new()
            }
        }
    }

    /// 写入作用域下的好友列表
    pub async fn try_save(&self, scope: Option<&str>, friends: &[Friend]) -> SyncResult<()> {
        let key = self.key_for(scope);
        let json = serde_json::to_string(friends)
            .map_err(|e| SyncError::MalformedData(e.to_string()))?;
        self.put_raw(&key, &json)
            .await
            .map_err(|e| SyncError::Storage(format!("{:#}", e)))
    }

    /// 保存作用域下的好友列表（尽力而为，失败只记录日志）
    pub async fn save(&self, scope: Option<&str>, friends: &[Friend]) {
        match self.try_save(scope, friends).await {
            Ok(()) => debug!(
                "[FriendDAO] 已保存 {} 个好友到 {}",
                friends.len(),
                self.key_for(scope)
            ),
            Err(e) => warn!(
                "[FriendDAO] 保存好友列表失败 {}: {}",
                self.key_for(scope),
                e
            ),
        }
    }

    /// 关闭连接池，之后的读写按数据库错误处理
    pub async fn close(&self) {
        self.db.close().await;
    }
}
