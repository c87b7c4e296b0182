pub mod auth;
pub mod client;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod friend;
pub mod overdue;
pub mod types;

// 重新导出身份相关类型
pub use auth::{AuthSession, UserIdentity};

pub use connectivity::Connectivity;
pub use error::{SyncError, SyncResult};
pub use overdue::{ContactColor, OverduePolicy};
