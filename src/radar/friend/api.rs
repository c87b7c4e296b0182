//! 好友 HTTP API 客户端
//!
//! 负责所有好友相关的 HTTP 请求。每个实例绑定一个作用域和认证 token，
//! 并维护本会话的同步状态（是否在请求中、最近一次错误、在线标志）。

use crate::radar::connectivity::Connectivity;
use crate::radar::error::{SyncError, SyncResult};
use crate::radar::friend::models::Friend;
use crate::radar::types::{
    handle_http_response, BatchUpsertReq, FriendsResp, SuccessResp, UpsertFriendReq,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// 会话级同步状态
#[derive(Debug)]
pub struct SyncStatus {
    connectivity: Connectivity,
    in_flight: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

impl SyncStatus {
    pub fn new(connectivity: Connectivity) -> Self {
        Self {
            connectivity,
            in_flight: AtomicUsize::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// 订阅在线状态变化
    pub fn watch_online(&self) -> tokio::sync::watch::Receiver<bool> {
        self.connectivity.subscribe()
    }

    /// 是否有请求正在进行
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn record_error(&self, err: &SyncError) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(err.to_string());
    }

    pub fn clear_error(&self) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// 标记一次请求开始，返回的守卫在 drop 时结束标记
    pub fn begin(&self) -> InFlight<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.clear_error();
        InFlight { status: self }
    }
}

/// 请求进行中守卫
pub struct InFlight<'a> {
    status: &'a SyncStatus,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.status.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 远端好友存储接口
#[async_trait]
pub trait RemoteFriends: Send + Sync {
    /// 会话同步状态
    fn status(&self) -> &SyncStatus;

    /// 拉取全部好友，任何失败都返回空列表（错误记录在 `status` 中）
    async fn fetch_all(&self) -> Vec<Friend>;

    /// 新增或更新单个好友
    async fn upsert(&self, friend: &Friend) -> SyncResult<()>;

    /// 删除单个好友
    async fn delete(&self, id: &str) -> SyncResult<()>;

    /// 批量新增或更新
    async fn batch_upsert(&self, friends: &[Friend]) -> SyncResult<()>;
}

/// 为作用域创建远端客户端
pub trait RemoteConnector: Send + Sync {
    fn connect(
        &self,
        scope: &str,
        token: Option<&str>,
        connectivity: Connectivity,
    ) -> Arc<dyn RemoteFriends>;
}

/// 好友相关的 HTTP API 客户端
pub struct FriendApi {
    client: reqwest::Client,
    api_base_url: String,
    scope: Option<String>,
    token: Option<String>,
    status: SyncStatus,
}

impl FriendApi {
    /// 创建新的好友 API 客户端
    ///
    /// `scope` 为空时所有操作都是空操作；`token` 为空时所有操作都以未认证失败。
    pub fn new(
        client: reqwest::Client,
        api_base_url: impl Into<String>,
        scope: Option<String>,
        token: Option<String>,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into(),
            scope,
            token: token.filter(|t| !t.is_empty()),
            status: SyncStatus::new(connectivity),
        }
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    fn token(&self) -> SyncResult<&str> {
        self.token.as_deref().ok_or(SyncError::Unauthenticated)
    }

    /// 拼接 `{base}/api/friends[/{segment}]`，路径段会被转义
    fn friends_url(&self, segment: Option<&str>) -> SyncResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.api_base_url)
            .map_err(|e| SyncError::Network(format!("无效的 API 地址 {}: {}", self.api_base_url, e)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| SyncError::Network(format!("无效的 API 地址: {}", self.api_base_url)))?;
            segments.pop_if_empty().extend(["api", "friends"]);
            if let Some(segment) = segment {
                segments.push(segment);
            }
        }
        Ok(url)
    }

    async fn try_fetch_all(&self, token: &str) -> SyncResult<Vec<Friend>> {
        let url = self.friends_url(None)?;
        debug!("[FriendAPI]   请求URL: {}", url);
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let resp: FriendsResp = handle_http_response(response, "拉取好友列表").await?;
        Ok(resp.friends)
    }

    async fn put_json<B: serde::Serialize + ?Sized>(
        &self,
        segment: &str,
        body: &B,
        operation_name: &str,
    ) -> SyncResult<()> {
        let token = self.token()?;
        let url = self.friends_url(Some(segment))?;
        debug!("[FriendAPI]   请求URL: {}", url);
        let response = self
            .client
            .put(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        let _: SuccessResp = handle_http_response(response, operation_name).await?;
        Ok(())
    }

    fn fail<T>(&self, operation_name: &str, err: SyncError) -> SyncResult<T> {
        warn!("[FriendAPI] {}失败: {}", operation_name, err);
        self.status.record_error(&err);
        Err(err)
    }
}

#[async_trait]
impl RemoteFriends for FriendApi {
    fn status(&self) -> &SyncStatus {
        &self.status
    }

    async fn fetch_all(&self) -> Vec<Friend> {
        if self.scope.is_none() {
            return Vec::new();
        }
        let token = match self.token() {
            Ok(token) => token,
            Err(e) => {
                let _: SyncResult<()> = self.fail("拉取好友列表", e);
                return Vec::new();
            }
        };

        info!("[FriendAPI] 📡 请求全量好友列表");
        let _guard = self.status.begin();
        match self.try_fetch_all(token).await {
            Ok(friends) => {
                info!("[FriendAPI] ✅ 全量好友列表响应，好友数: {}", friends.len());
                friends
            }
            Err(e) => {
                let _: SyncResult<()> = self.fail("拉取好友列表", e);
                Vec::new()
            }
        }
    }

    async fn upsert(&self, friend: &Friend) -> SyncResult<()> {
        if self.scope.is_none() {
            return Ok(());
        }
        if let Err(e) = self.token() {
            return self.fail("同步好友", e);
        }

        info!("[FriendAPI] 📡 同步好友: {}", friend.id);
        let _guard = self.status.begin();
        match self
            .put_json(&friend.id, &UpsertFriendReq::from(friend), "同步好友")
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => self.fail("同步好友", e),
        }
    }

    async fn delete(&self, id: &str) -> SyncResult<()> {
        if self.scope.is_none() {
            return Ok(());
        }
        let token = match self.token() {
            Ok(token) => token,
            Err(e) => return self.fail("删除好友", e),
        };

        info!("[FriendAPI] 📡 删除好友: {}", id);
        let _guard = self.status.begin();
        let result: SyncResult<()> = async {
            let url = self.friends_url(Some(id))?;
            debug!("[FriendAPI]   请求URL: {}", url);
            let response = self.client.delete(url).bearer_auth(token).send().await?;
            let _: SuccessResp = handle_http_response(response, "删除好友").await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) => self.fail("删除好友", e),
        }
    }

    async fn batch_upsert(&self, friends: &[Friend]) -> SyncResult<()> {
        if self.scope.is_none() {
            return Ok(());
        }
        if let Err(e) = self.token() {
            return self.fail("批量同步好友", e);
        }

        info!("[FriendAPI] 📡 批量同步好友，数量: {}", friends.len());
        let _guard = self.status.begin();
        let body = BatchUpsertReq {
            friends: friends.to_vec(),
        };
        match self.put_json("batch", &body, "批量同步好友").await {
            Ok(()) => Ok(()),
            Err(e) => self.fail("批量同步好友", e),
        }
    }
}

/// 基于 reqwest 的远端连接器
#[derive(Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
    api_base_url: String,
}

impl HttpConnector {
    pub fn new(client: reqwest::Client, api_base_url: impl Into<String>) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into(),
        }
    }
}

impl RemoteConnector for HttpConnector {
    fn connect(
        &self,
        scope: &str,
        token: Option<&str>,
        connectivity: Connectivity,
    ) -> Arc<dyn RemoteFriends> {
        Arc::new(FriendApi::new(
            self.client.clone(),
            self.api_base_url.clone(),
            Some(scope.to_string()),
            token.map(str::to_string),
            connectivity,
        ))
    }
}
