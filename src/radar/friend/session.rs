//! 作用域同步会话与会话注册表
//!
//! 会话不持久化：切换作用域时旧会话被停止并丢弃，新作用域重新创建。

use crate::radar::friend::api::RemoteFriends;
use crate::radar::friend::models::Friend;
use crate::radar::friend::poller::Poller;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// 单个作用域的同步会话
pub struct SyncSession {
    scope: String,
    remote: Arc<dyn RemoteFriends>,
    poller: Poller,
    last_fetch: Mutex<Option<Vec<Friend>>>,
    unsynced: AtomicBool,
}

impl SyncSession {
    pub fn new(scope: impl Into<String>, remote: Arc<dyn RemoteFriends>) -> Self {
        Self {
            scope: scope.into(),
            remote,
            poller: Poller::new(),
            last_fetch: Mutex::new(None),
            unsynced: AtomicBool::new(false),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn remote(&self) -> &Arc<dyn RemoteFriends> {
        &self.remote
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    /// 最近一次从服务器拉取到的结果
    pub fn last_fetch(&self) -> Option<Vec<Friend>> {
        self.last_fetch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn record_fetch(&self, friends: &[Friend]) {
        *self.last_fetch.lock().unwrap_or_else(|e| e.into_inner()) = Some(friends.to_vec());
    }

    /// 是否存在未成功推送到服务器的本地变更
    pub fn is_unsynced(&self) -> bool {
        self.unsynced.load(Ordering::SeqCst)
    }

    pub fn mark_unsynced(&self) {
        self.unsynced.store(true, Ordering::SeqCst);
    }

    pub fn mark_synced(&self) {
        self.unsynced.store(false, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        debug!("[FriendSync] 停止会话: {}", self.scope);
        self.poller.stop();
    }
}

/// 作用域 -> 会话 的注册表
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Arc<SyncSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册会话，同作用域的旧会话会被替换并返回
    pub fn insert(&mut self, session: Arc<SyncSession>) -> Option<Arc<SyncSession>> {
        self.sessions.insert(session.scope.clone(), session)
    }

    pub fn get(&self, scope: &str) -> Option<Arc<SyncSession>> {
        self.sessions.get(scope).cloned()
    }

    /// 取出全部会话
    pub fn drain(&mut self) -> Vec<Arc<SyncSession>> {
        self.sessions.drain().map(|(_, s)| s).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
