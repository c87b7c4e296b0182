pub mod radar;

// 重新导出常用类型和函数，方便外部使用
pub use radar::{
    auth::{AuthSession, UserIdentity},
    client::{ClientConfig, RadarClient},
    connectivity::Connectivity,
    friend::{Friend, FriendListener, FriendSyncer, SyncPhase},
    overdue::OverduePolicy,
};
