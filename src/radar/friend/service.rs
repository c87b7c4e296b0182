//! 好友同步服务层
//!
//! 本地优先：所有变更先作用于内存并写入本地存储，再尽力同步到服务器。
//! 服务器失败只记录日志和错误提示，不会回滚本地变更。
//!
//! 每个作用域经历 `Uninitialized -> LocalLoaded -> Reconciled`，
//! 切换作用域时先停止旧作用域的轮询，并通过代数（generation）丢弃旧作用域迟到的响应。

use crate::radar::connectivity::Connectivity;
use crate::radar::error::SyncError;
use crate::radar::friend::api::{RemoteConnector, RemoteFriends};
use crate::radar::friend::dao::FriendDao;
use crate::radar::friend::listener::{EmptyFriendListener, FriendListener};
use crate::radar::friend::merge::{merge_friends, same_records};
use crate::radar::friend::models::{
    normalize_name, normalize_scope, now_millis, Friend, FriendSyncerConfig, SyncPhase,
};
use crate::radar::friend::poller::PollSink;
use crate::radar::friend::session::{SessionRegistry, SyncSession};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 当前作用域的内存状态
struct SyncerState {
    scope: Option<String>,
    generation: u64,
    phase: SyncPhase,
    friends: Vec<Friend>,
    sessions: SessionRegistry,
}

impl SyncerState {
    fn active_session(&self) -> Option<Arc<SyncSession>> {
        self.scope.as_deref().and_then(|s| self.sessions.get(s))
    }
}

/// 一次本地变更的快照
struct Snapshot {
    generation: u64,
    scope: Option<String>,
    friends: Vec<Friend>,
    session: Option<Arc<SyncSession>>,
}

enum RemoteOp {
    Upsert(Friend),
    Delete(String),
}

impl RemoteOp {
    fn label(&self) -> &'static str {
        match self {
            RemoteOp::Upsert(_) => "同步好友",
            RemoteOp::Delete(_) => "删除好友",
        }
    }
}

struct SyncerInner {
    config: FriendSyncerConfig,
    dao: FriendDao,
    connector: Arc<dyn RemoteConnector>,
    connectivity: Connectivity,
    listener: Arc<dyn FriendListener>,
    state: Mutex<SyncerState>,
    /// 串行化本地写入，保证最后落盘的是最新内存状态
    write_gate: tokio::sync::Mutex<()>,
    /// 激活期间持有写锁；变更在读锁下修改并落盘，不会与加载交错
    load_gate: RwLock<()>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

/// 好友同步器
///
/// 每个应用实例构造一次，克隆后共享同一份状态。
#[derive(Clone)]
pub struct FriendSyncer {
    inner: Arc<SyncerInner>,
}

impl FriendSyncer {
    /// 创建新的好友同步器（使用默认空监听器）
    pub fn new(
        config: FriendSyncerConfig,
        dao: FriendDao,
        connector: Arc<dyn RemoteConnector>,
        connectivity: Connectivity,
    ) -> Self {
        Self::with_listener(
            config,
            dao,
            connector,
            connectivity,
            Arc::new(EmptyFriendListener),
        )
    }

    /// 创建新的好友同步器（带自定义监听器）
    pub fn with_listener(
        config: FriendSyncerConfig,
        dao: FriendDao,
        connector: Arc<dyn RemoteConnector>,
        connectivity: Connectivity,
        listener: Arc<dyn FriendListener>,
    ) -> Self {
        Self {
            inner: Arc::new(SyncerInner {
                config,
                dao,
                connector,
                connectivity,
                listener,
                state: Mutex::new(SyncerState {
                    scope: None,
                    generation: 0,
                    phase: SyncPhase::Uninitialized,
                    friends: Vec::new(),
                    sessions: SessionRegistry::new(),
                }),
                write_gate: tokio::sync::Mutex::new(()),
                load_gate: RwLock::new(()),
                background: Mutex::new(Vec::new()),
            }),
        }
    }

    /// 激活作用域（登录、切换用户或启动时调用）
    ///
    /// 返回时本地数据已加载；有作用域时在后台与服务器对齐并启动轮询。
    /// 正在进行的变更先完成落盘，加载期间到达的变更等待加载完成后再作用于新作用域。
    pub async fn activate(&self, scope: Option<&str>, token: Option<&str>) {
        let scope = normalize_scope(scope);
        info!("[FriendSync] 激活作用域: {:?}", scope);

        let loading = self.inner.load_gate.write().await;

        let (generation, stale) = {
            let mut st = self.inner.lock_state();
            st.generation += 1;
            st.scope = scope.clone();
            st.phase = SyncPhase::Uninitialized;
            st.friends.clear();
            (st.generation, st.sessions.drain())
        };
        for session in stale {
            session.stop();
        }

        let local = self.inner.dao.load(scope.as_deref()).await;

        let session = {
            let mut st = self.inner.lock_state();
            if st.generation != generation {
                debug!("[FriendSync] 作用域已再次切换，放弃本次激活");
                return;
            }
            st.friends = local;
            st.phase = SyncPhase::LocalLoaded;
            info!(
                "[FriendSync] 本地好友已加载，共 {} 个",
                st.friends.len()
            );

            scope.as_deref().map(|scope| {
                let remote = self
                    .inner
                    .connector
                    .connect(scope, token, self.inner.connectivity.clone());
                let session = Arc::new(SyncSession::new(scope, remote));
                st.sessions.insert(session.clone());
                session
            })
        };
        drop(loading);
        self.inner.notify_changed().await;

        let Some(session) = session else {
            return;
        };

        if self.inner.connectivity.is_online() {
            let inner = self.inner.clone();
            let first = session.clone();
            let handle = tokio::spawn(async move {
                let friends = first.remote().fetch_all().await;
                inner.handle_remote_snapshot(generation, &first, friends).await;
            });
            self.inner.track(handle);
        } else {
            info!("[FriendSync] 当前离线，等待轮询完成首次对齐");
        }

        let sink = Arc::new(ScopedPollSink {
            inner: Arc::downgrade(&self.inner),
            session: Arc::downgrade(&session),
            generation,
        });
        session.poller().start(
            session.remote().clone(),
            sink,
            self.inner.config.poll_interval,
        );
    }

    /// 新增好友，名称为空白或尚未激活任何作用域时返回 `None`
    pub async fn add_friend(&self, name: &str) -> Option<Friend> {
        let Some(name) = normalize_name(name) else {
            warn!("[FriendSync] 好友名称为空，忽略");
            return None;
        };
        let friend = Friend::new(name);

        let loaded = self.inner.loaded().await?;
        let snapshot = self.inner.mutate(|friends| {
            friends.push(friend.clone());
            true
        });
        if let Some(snapshot) = snapshot {
            info!("[FriendSync] 新增好友: {} ({})", friend.name, friend.id);
            self.inner
                .commit(loaded, snapshot, RemoteOp::Upsert(friend.clone()))
                .await;
        }
        Some(friend)
    }

    /// 删除好友
    ///
    /// 本地不存在时不写本地存储，但仍会尝试远端删除（远端删除是幂等的）。
    pub async fn remove_friend(&self, id: &str) {
        let Some(loaded) = self.inner.loaded().await else {
            return;
        };
        let snapshot = self.inner.mutate(|friends| {
            let before = friends.len();
            friends.retain(|f| f.id != id);
            friends.len() != before
        });

        match snapshot {
            Some(snapshot) => {
                info!("[FriendSync] 删除好友: {}", id);
                self.inner
                    .commit(loaded, snapshot, RemoteOp::Delete(id.to_string()))
                    .await;
            }
            None => {
                drop(loaded);
                debug!("[FriendSync] 本地不存在好友 {}，仅尝试远端删除", id);
                let session = self.inner.active_session();
                if let Some(session) = session {
                    self.inner.spawn_remote(session, RemoteOp::Delete(id.to_string()));
                }
            }
        }
    }

    /// 更新最近联系时间为当前时间，好友不存在时无操作
    pub async fn update_last_contact(&self, id: &str) -> Option<Friend> {
        let loaded = self.inner.loaded().await?;
        let now = now_millis();
        let mut updated = None;
        let snapshot = self.inner.mutate(|friends| {
            match friends.iter_mut().find(|f| f.id == id) {
                Some(f) => {
                    f.last_contact = f.last_contact.max(now);
                    updated = Some(f.clone());
                    true
                }
                None => false,
            }
        });

        let (Some(snapshot), Some(friend)) = (snapshot, updated) else {
            debug!("[FriendSync] 好友 {} 不存在，忽略更新", id);
            return None;
        };
        info!("[FriendSync] 更新联系时间: {} -> {}", friend.id, friend.last_contact);
        self.inner
            .commit(loaded, snapshot, RemoteOp::Upsert(friend.clone()))
            .await;
        Some(friend)
    }

    /// 等待所有已发起的后台远端任务结束
    pub async fn settle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = std::mem::take(
                &mut *self
                    .inner
                    .background
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()),
            );
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    error!("[FriendSync] 后台同步任务异常结束: {}", e);
                }
            }
        }
    }

    /// 停止轮询并释放会话，内存中的好友列表保持不变
    pub fn shutdown(&self) {
        let sessions = self.inner.lock_state().sessions.drain();
        for session in sessions {
            session.stop();
        }
        info!("[FriendSync] 同步器已停止");
    }

    /// 当前好友列表快照
    pub fn friends(&self) -> Vec<Friend> {
        self.inner.lock_state().friends.clone()
    }

    pub fn phase(&self) -> SyncPhase {
        self.inner.lock_state().phase
    }

    pub fn active_scope(&self) -> Option<String> {
        self.inner.lock_state().scope.clone()
    }

    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    pub fn is_syncing(&self) -> bool {
        self.inner
            .active_session()
            .is_some_and(|s| s.remote().status().is_syncing())
    }

    pub fn last_sync_error(&self) -> Option<String> {
        self.inner
            .active_session()
            .and_then(|s| s.remote().status().last_error())
    }

    /// 当前作用域最近一次从服务器拉取到的列表，尚未拉取过时为 `None`
    pub fn last_remote_fetch(&self) -> Option<Vec<Friend>> {
        self.inner.active_session().and_then(|s| s.last_fetch())
    }

    pub fn has_unsynced_changes(&self) -> bool {
        self.inner
            .active_session()
            .is_some_and(|s| s.is_unsynced())
    }

    /// 当前作用域是否正在轮询
    pub fn is_polling(&self) -> bool {
        self.inner
            .active_session()
            .is_some_and(|s| s.poller().is_polling())
    }
}

impl SyncerInner {
    fn lock_state(&self) -> MutexGuard<'_, SyncerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn active_session(&self) -> Option<Arc<SyncSession>> {
        self.lock_state().active_session()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_state().generation == generation
    }

    /// 在锁内修改好友列表，`f` 返回 `false` 表示没有变化
    fn mutate<F>(&self, f: F) -> Option<Snapshot>
    where
        F: FnOnce(&mut Vec<Friend>) -> bool,
    {
        let mut st = self.lock_state();
        if !f(&mut st.friends) {
            return None;
        }
        Some(Snapshot {
            generation: st.generation,
            scope: st.scope.clone(),
            friends: st.friends.clone(),
            session: st.active_session(),
        })
    }

    /// 等待当前激活完成本地加载，返回的读锁守卫需要一直持有到落盘结束
    ///
    /// 从未激活过时返回 `None`，此时变更没有可写入的作用域。
    async fn loaded(&self) -> Option<RwLockReadGuard<'_, ()>> {
        let guard = self.load_gate.read().await;
        if self.lock_state().phase == SyncPhase::Uninitialized {
            warn!("[FriendSync] 尚未激活任何作用域，忽略本次变更");
            return None;
        }
        Some(guard)
    }

    /// 变更后的统一钩子：落盘、通知监听器、发起远端同步
    async fn commit(
        self: &Arc<Self>,
        loaded: RwLockReadGuard<'_, ()>,
        snapshot: Snapshot,
        op: RemoteOp,
    ) {
        let Snapshot {
            generation,
            scope,
            friends,
            session,
        } = snapshot;
        self.persist(generation, scope, friends).await;
        drop(loaded);
        self.notify_changed().await;
        if let Some(session) = session {
            self.spawn_remote(session, op);
        }
    }

    /// 写入本地存储
    ///
    /// 作用域未变时写入最新内存状态，多次快速变更可能合并为一次有效写入；
    /// 作用域已切换时只写入该作用域自己的快照。
    async fn persist(&self, generation: u64, scope: Option<String>, snapshot: Vec<Friend>) {
        let _gate = self.write_gate.lock().await;
        let latest = {
            let st = self.lock_state();
            if st.generation == generation {
                Some(st.friends.clone())
            } else if st.scope == scope {
                None
            } else {
                Some(snapshot)
            }
        };
        match latest {
            Some(friends) => self.dao.save(scope.as_deref(), &friends).await,
            None => debug!("[FriendSync] 作用域已重新激活，跳过过期快照写入"),
        }
    }

    async fn notify_changed(&self) {
        let friends = self.lock_state().friends.clone();
        match serde_json::to_string(&friends) {
            Ok(json) => self.listener.on_friend_list_changed(json).await,
            Err(e) => warn!("[FriendSync] 序列化好友列表失败: {}", e),
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut background = self.background.lock().unwrap_or_else(|e| e.into_inner());
        background.retain(|h| !h.is_finished());
        background.push(handle);
    }

    /// 后台执行远端写操作，离线时只标记未同步
    fn spawn_remote(self: &Arc<Self>, session: Arc<SyncSession>, op: RemoteOp) {
        if !self.connectivity.is_online() {
            info!("[FriendSync] 离线，{}推迟到恢复在线后", op.label());
            session.mark_unsynced();
            return;
        }

        let inner = self.clone();
        let handle = tokio::spawn(async move {
            let result = match &op {
                RemoteOp::Upsert(friend) => session.remote().upsert(friend).await,
                RemoteOp::Delete(id) => session.remote().delete(id).await,
            };
            match result {
                Ok(()) => debug!("[FriendSync] {}成功", op.label()),
                Err(e) => inner.report_failure(&session, op.label(), e).await,
            }
        });
        self.track(handle);
    }

    async fn report_failure(&self, session: &SyncSession, label: &str, err: SyncError) {
        error!("[FriendSync] ❌ {}失败（本地数据保留）: {}", label, err);
        session.remote().status().record_error(&err);
        session.mark_unsynced();
        self.listener.on_sync_failed(err.to_string()).await;
    }

    /// 处理一次服务器拉取结果（首次对齐和轮询共用）
    ///
    /// 非空则合并并在有变化时落盘；服务器为空且本地非空时，
    /// 首次对齐或存在未同步变更会把本地列表整体推送到服务器。
    async fn handle_remote_snapshot(
        &self,
        generation: u64,
        session: &SyncSession,
        remote: Vec<Friend>,
    ) {
        let (changed, push, scope) = {
            let mut st = self.lock_state();
            if st.generation != generation {
                debug!(
                    "[FriendSync] 丢弃过期作用域 {} 的服务器响应",
                    session.scope()
                );
                return;
            }
            session.record_fetch(&remote);
            let first = st.phase != SyncPhase::Reconciled;
            st.phase = SyncPhase::Reconciled;

            let changed = if remote.is_empty() {
                None
            } else {
                let merged = merge_friends(&st.friends, &remote);
                if same_records(&st.friends, &merged) {
                    None
                } else {
                    st.friends = merged.clone();
                    Some(merged)
                }
            };

            let wants_push = if remote.is_empty() {
                first || session.is_unsynced()
            } else {
                session.is_unsynced()
            };
            let push = (wants_push && !st.friends.is_empty()).then(|| st.friends.clone());
            (changed, push, st.scope.clone())
        };

        if let Some(merged) = changed {
            info!("[FriendSync] 服务器数据已合并到作用域 {}", session.scope());
            self.persist(generation, scope, merged).await;
            self.notify_changed().await;
        } else {
            debug!("[FriendSync] 服务器数据无变化");
        }

        if let Some(friends) = push {
            info!(
                "[FriendSync] 推送本地好友到服务器，数量: {}",
                friends.len()
            );
            match session.remote().batch_upsert(&friends).await {
                Ok(()) => {
                    session.mark_synced();
                    info!("[FriendSync] ✅ 批量推送完成");
                }
                Err(e) => self.report_failure(session, "批量同步好友", e).await,
            }
        }
    }
}

/// 绑定作用域代数的轮询接收器
struct ScopedPollSink {
    inner: Weak<SyncerInner>,
    session: Weak<SyncSession>,
    generation: u64,
}

#[async_trait]
impl PollSink for ScopedPollSink {
    async fn on_poll_result(&self, friends: Vec<Friend>) {
        let (Some(inner), Some(session)) = (self.inner.upgrade(), self.session.upgrade()) else {
            return;
        };
        if !inner.is_current(self.generation) {
            debug!("[FriendSync] 丢弃过期轮询结果");
            return;
        }
        inner
            .handle_remote_snapshot(self.generation, &session, friends)
            .await;
    }
}
