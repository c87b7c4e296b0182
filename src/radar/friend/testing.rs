//! 单元测试用的远端替身

use crate::radar::connectivity::Connectivity;
use crate::radar::error::{SyncError, SyncResult};
use crate::radar::friend::api::{RemoteConnector, RemoteFriends, SyncStatus};
use crate::radar::friend::models::Friend;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// 记录下来的远端调用
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Upsert(Friend),
    Delete(String),
    BatchUpsert(Vec<Friend>),
}

/// 内存版远端：可预置服务器数据、注入失败，并记录所有写调用
pub struct MockRemote {
    status: SyncStatus,
    remote_friends: Mutex<Vec<Friend>>,
    calls: Mutex<Vec<RemoteCall>>,
    fetches: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MockRemote {
    pub fn new(connectivity: Connectivity) -> Self {
        Self {
            status: SyncStatus::new(connectivity),
            remote_friends: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_remote_friends(&self, friends: Vec<Friend>) {
        *self.remote_friends.lock().unwrap() = friends;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn write(&self, call: RemoteCall) -> SyncResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail_writes.load(Ordering::SeqCst) {
            let err = SyncError::Http {
                status: 500,
                body: "Internal server error".into(),
            };
            self.status.record_error(&err);
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteFriends for MockRemote {
    fn status(&self) -> &SyncStatus {
        &self.status
    }

    async fn fetch_all(&self) -> Vec<Friend> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let _guard = self.status.begin();
        tokio::task::yield_now().await;
        self.remote_friends.lock().unwrap().clone()
    }

    async fn upsert(&self, friend: &Friend) -> SyncResult<()> {
        self.write(RemoteCall::Upsert(friend.clone()))
    }

    async fn delete(&self, id: &str) -> SyncResult<()> {
        self.write(RemoteCall::Delete(id.to_string()))
    }

    async fn batch_upsert(&self, friends: &[Friend]) -> SyncResult<()> {
        self.write(RemoteCall::BatchUpsert(friends.to_vec()))
    }
}

/// 按作用域缓存 `MockRemote` 的连接器
pub struct MockConnector {
    connectivity: Connectivity,
    remotes: Mutex<HashMap<String, Arc<MockRemote>>>,
    tokens: Mutex<Vec<(String, Option<String>)>>,
}

impl MockConnector {
    pub fn new(connectivity: Connectivity) -> Self {
        Self {
            connectivity,
            remotes: Mutex::new(HashMap::new()),
            tokens: Mutex::new(Vec::new()),
        }
    }

    /// 获取（必要时创建）作用域对应的远端
    pub fn remote_for(&self, scope: &str) -> Arc<MockRemote> {
        self.remotes
            .lock()
            .unwrap()
            .entry(scope.to_string())
            .or_insert_with(|| Arc::new(MockRemote::new(self.connectivity.clone())))
            .clone()
    }

    /// 每次 `connect` 的 (作用域, token)
    pub fn connections(&self) -> Vec<(String, Option<String>)> {
        self.tokens.lock().unwrap().clone()
    }
}

impl RemoteConnector for MockConnector {
    fn connect(
        &self,
        scope: &str,
        token: Option<&str>,
        _connectivity: Connectivity,
    ) -> Arc<dyn RemoteFriends> {
        self.tokens
            .lock()
            .unwrap()
            .push((scope.to_string(), token.map(str::to_string)));
        self.remote_for(scope)
    }
}
