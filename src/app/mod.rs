// ==========================================
// 美业沙龙客群营销引擎 - 应用层
// ==========================================
// 职责: 装配共享状态,连接宿主进程与引擎
// ==========================================

pub mod state;

// 重导出
pub use state::{AppState, get_default_db_path};
