//! 好友本地模型定义

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 好友记录（与服务端 JSON 字段一一对应）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    /// 全局唯一 ID，创建后不可变
    pub id: String,
    /// 好友名称，创建后非空
    pub name: String,
    /// 最近联系时间（毫秒时间戳）
    #[serde(rename = "lastContact")]
    pub last_contact: i64,
}

impl Friend {
    /// 用新的 UUID 和当前时间创建好友
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            last_contact: now_millis(),
        }
    }
}

/// 当前时间（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 规范化好友名称：去掉首尾空白，首字母大写，其余小写
///
/// 空白输入返回 `None`。
pub fn normalize_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    let first = chars.next()?;
    let mut name: String = first.to_uppercase().collect();
    name.push_str(&chars.as_str().to_lowercase());
    Some(name)
}

/// 规范化作用域：空字符串视为默认（仅本地）作用域
pub fn normalize_scope(scope: Option<&str>) -> Option<String> {
    scope
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// 同步编排器的运行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// 尚未加载任何数据
    Uninitialized,
    /// 已从本地存储加载，界面可以立即渲染
    LocalLoaded,
    /// 已与服务器完成一次对齐
    Reconciled,
}

/// 好友同步器配置
#[derive(Debug, Clone)]
pub struct FriendSyncerConfig {
    /// 轮询间隔
    pub poll_interval: Duration,
}

impl Default for FriendSyncerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5000),
        }
    }
}
