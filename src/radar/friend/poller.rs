//! 远端好友轮询
//!
//! 固定间隔拉取服务器好友列表，只在在线时拉取，结果交给调用方提供的接收器。
//! 网络从离线恢复为在线时立即补拉一次。

use crate::radar::friend::api::RemoteFriends;
use crate::radar::friend::models::Friend;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// 轮询结果接收器
#[async_trait]
pub trait PollSink: Send + Sync {
    async fn on_poll_result(&self, friends: Vec<Friend>);
}

/// 可取消的轮询器
#[derive(Default)]
pub struct Poller {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_polling(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// 启动轮询，已在轮询时忽略并返回 `false`
    ///
    /// 第一次拉取发生在一个间隔之后。
    pub fn start(
        &self,
        remote: Arc<dyn RemoteFriends>,
        sink: Arc<dyn PollSink>,
        every: Duration,
    ) -> bool {
        let mut slot = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("[Poller] 已在轮询中，忽略重复启动");
            return false;
        }

        info!("[Poller] 🔄 启动轮询，间隔 {:?}", every);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut online = remote.status().watch_online();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = online.changed() => {
                        // 发送端由 remote 持有，与本任务同生命周期
                        if changed.is_err() {
                            return;
                        }
                        if !*online.borrow_and_update() {
                            continue;
                        }
                        info!("[Poller] 🌐 网络恢复，立即拉取");
                        ticker.reset();
                    }
                }
                if !remote.status().is_online() {
                    debug!("[Poller] 离线，跳过本次拉取");
                    continue;
                }
                let friends = remote.fetch_all().await;
                sink.on_poll_result(friends).await;
            }
        }));
        true
    }

    /// 停止轮询，可重复调用
    pub fn stop(&self) {
        if let Some(handle) = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
            info!("[Poller] ⏹️ 轮询已停止");
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
