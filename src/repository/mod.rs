// ==========================================
// 食品批次质控核心 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 定义存储端口,提供 SQLite 与内存两种实现
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod aggregate_repo;
pub mod error;
pub mod item_repo;
pub mod lot_repo;
pub mod memory;
pub mod traits;

// 重导出核心仓储
pub use aggregate_repo::SqliteAggregateStore;
pub use error::{RepositoryError, RepositoryResult};
pub use item_repo::SqliteItemRepository;
pub use lot_repo::SqliteLotRepository;
pub use memory::{InMemoryAggregateStore, InMemoryItemCatalog, InMemoryLotLedger};
pub use traits::{AggregateStore, ItemCatalog, LotLedger};
