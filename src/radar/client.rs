//! Friends Radar 客户端
//!
//! 应用上下文：持有本地数据库、联网状态与好友同步器，负责登录/登出时切换作用域。

use crate::radar::auth::{AuthSession, UserIdentity, USER_STORAGE_KEY};
use crate::radar::connectivity::Connectivity;
use crate::radar::db::create_sqlite_pool_with_migration;
use crate::radar::friend::api::HttpConnector;
use crate::radar::friend::dao::{FriendDao, DEFAULT_BASE_KEY};
use crate::radar::friend::listener::{EmptyFriendListener, FriendListener};
use crate::radar::friend::models::{now_millis, Friend, FriendSyncerConfig};
use crate::radar::friend::service::FriendSyncer;
use crate::radar::overdue::OverduePolicy;
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// HTTP API 基础地址
    pub api_base_url: String,
    /// 本地 SQLite 数据库 URL
    ///
    /// 例如：`sqlite://friends-radar.db?mode=rwc`，测试使用 `sqlite::memory:`
    pub db_url: String,
    /// 本地存储键前缀
    pub storage_base_key: String,
    /// 轮询间隔
    pub poll_interval: Duration,
    /// 单次 HTTP 请求超时
    pub request_timeout: Duration,
    pub overdue: OverduePolicy,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self {
            api_base_url: "http://localhost:8787".to_string(),
            db_url: "sqlite://friends-radar.db?mode=rwc".to_string(),
            storage_base_key: DEFAULT_BASE_KEY.to_string(),
            poll_interval: Duration::from_millis(5000),
            request_timeout: Duration::from_secs(10),
            overdue: OverduePolicy::default(),
        }
    }

    /// 默认配置 + 环境变量覆盖
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Ok(url) = std::env::var("FRIENDS_RADAR_API_URL") {
            if !url.trim().is_empty() {
                config.api_base_url = url;
            }
        }
        if let Ok(url) = std::env::var("FRIENDS_RADAR_DB_URL") {
            if !url.trim().is_empty() {
                config.db_url = url;
            }
        }
        if let Ok(ms) = std::env::var("FRIENDS_RADAR_POLL_MS") {
            match ms.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.poll_interval = Duration::from_millis(ms),
                _ => warn!("[Client] 忽略无效的 FRIENDS_RADAR_POLL_MS: {}", ms),
            }
        }
        config
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Friends Radar 客户端
#[derive(Clone)]
pub struct RadarClient {
    config: ClientConfig,
    dao: FriendDao,
    connectivity: Connectivity,
    syncer: FriendSyncer,
    session: Arc<Mutex<Option<AuthSession>>>,
}

impl RadarClient {
    /// 创建客户端（使用默认空监听器）
    pub async fn new(config: ClientConfig) -> Result<Self> {
        Self::with_listener(config, Arc::new(EmptyFriendListener)).await
    }

    /// 创建客户端（带自定义好友监听器）
    pub async fn with_listener(
        config: ClientConfig,
        listener: Arc<dyn FriendListener>,
    ) -> Result<Self> {
        info!("[Client] 初始化，API: {}, DB: {}", config.api_base_url, config.db_url);

        let pool = create_sqlite_pool_with_migration(&config.db_url).await?;
        let dao = FriendDao::new(pool, config.storage_base_key.clone());

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("创建 HTTP 客户端失败")?;
        let connector = Arc::new(HttpConnector::new(http, config.api_base_url.clone()));

        let connectivity = Connectivity::default();
        let syncer = FriendSyncer::with_listener(
            FriendSyncerConfig {
                poll_interval: config.poll_interval,
            },
            dao.clone(),
            connector,
            connectivity.clone(),
            listener,
        );

        Ok(Self {
            config,
            dao,
            connectivity,
            syncer,
            session: Arc::new(Mutex::new(None)),
        })
    }

    /// 启动：恢复上次登录的用户，没有则进入本地默认作用域
    ///
    /// 本地只保存用户身份不保存 token，需要同步时由调用方重新提供 token。
    pub async fn start(&self, token: Option<&str>) -> Option<UserIdentity> {
        match self.load_user().await {
            Some(user) => {
                info!("[Client] 恢复用户: {}", user.id);
                let session = AuthSession::new(user.clone(), token.map(str::to_string));
                self.syncer
                    .activate(Some(session.scope()), session.id_token.as_deref())
                    .await;
                *self.session.lock().unwrap_or_else(|e| e.into_inner()) = Some(session);
                Some(user)
            }
            None => {
                self.syncer.activate(None, None).await;
                None
            }
        }
    }

    /// 登录：保存用户身份并切换到该用户的作用域
    pub async fn login(&self, session: AuthSession) {
        info!("[Client] 登录: {} ({})", session.user.id, session.user.email);
        self.save_user(Some(&session.user)).await;
        self.syncer
            .activate(Some(session.scope()), session.id_token.as_deref())
            .await;
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = Some(session);
    }

    /// 登出：清除保存的身份并回到本地默认作用域
    pub async fn logout(&self) {
        let previous = self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(session) = previous {
            info!("[Client] 登出: {}", session.user.id);
        }
        self.save_user(None).await;
        self.syncer.activate(None, None).await;
    }

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.user.clone())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn syncer(&self) -> &FriendSyncer {
        &self.syncer
    }

    /// 宿主通过该句柄上报联网状态
    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// 当前需要提醒的好友
    pub fn overdue_friends(&self) -> Vec<Friend> {
        let friends = self.syncer.friends();
        self.config
            .overdue
            .overdue_friends(&friends, now_millis())
            .into_iter()
            .cloned()
            .collect()
    }

    /// 等待后台同步完成后停止轮询并关闭数据库
    pub async fn shutdown(&self) {
        self.syncer.settle().await;
        self.syncer.shutdown();
        self.dao.close().await;
        info!("[Client] 已关闭");
    }

    async fn load_user(&self) -> Option<UserIdentity> {
        let raw = match self.dao.get_raw(USER_STORAGE_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("[Client] 读取已保存用户失败: {:#}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("[Client] 已保存用户数据损坏，忽略: {}", e);
                None
            }
        }
    }

    async fn save_user(&self, user: Option<&UserIdentity>) {
        let result = match user {
            Some(user) => match serde_json::to_string(user) {
                Ok(json) => self.dao.put_raw(USER_STORAGE_KEY, &json).await,
                Err(e) => Err(e.into()),
            },
            None => self.dao.remove_raw(USER_STORAGE_KEY).await,
        };
        if let Err(e) = result {
            warn!("[Client] 保存用户身份失败: {:#}", e);
        }
    }
}
