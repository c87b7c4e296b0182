//! 网络连通性信号
//!
//! 由宿主平台（CLI、桌面壳等）根据系统网络事件调用 `set_online`，
//! 同步层只读取该标志或订阅其变化。

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// 在线/离线标志，可克隆共享
#[derive(Clone, Debug)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// 更新在线状态，状态未变化时不通知订阅者
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(
                "[Connectivity] 网络状态变更: {}",
                if online { "在线" } else { "离线" }
            );
        }
    }

    /// 订阅在线状态变化
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}
