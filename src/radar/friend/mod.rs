//! 好友模块
//!
//! 本地优先的好友列表：本地存储、远端 API、合并与同步编排

pub mod api;
pub mod dao;
pub mod listener;
pub mod merge;
pub mod models;
pub mod poller;
pub mod service;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出主要类型和函数
pub use api::{FriendApi, HttpConnector, RemoteConnector, RemoteFriends};
pub use dao::FriendDao;
pub use listener::{EmptyFriendListener, FriendListener};
pub use merge::merge_friends;
pub use models::{Friend, FriendSyncerConfig, SyncPhase};
pub use service::FriendSyncer;
