// ==========================================
// 食品批次质控核心 - 应用层
// ==========================================
// 职责: 装配仓储、引擎与 API,供宿主程序持有
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
