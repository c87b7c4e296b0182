//! 好友监听器回调接口

use async_trait::async_trait;

/// 好友监听器回调接口
#[async_trait]
pub trait FriendListener: Send + Sync {
    /// 当前作用域的好友列表发生变更，参数为完整列表的 JSON 数组字符串
    async fn on_friend_list_changed(&self, friends_json: String);

    /// 远端同步失败（仅提示，本地数据不受影响）
    async fn on_sync_failed(&self, error: String);
}

/// 默认空实现（无操作）
pub struct EmptyFriendListener;

#[async_trait]
impl FriendListener for EmptyFriendListener {
    async fn on_friend_list_changed(&self, _friends_json: String) {}

    async fn on_sync_failed(&self, _error: String) {}
}
