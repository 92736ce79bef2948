// ==========================================
// 食品批次质控核心 - 仓储聚合
// ==========================================
// 职责: 聚合 API 服务所需的全部存储端口,简化依赖注入
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::domain::{DeliveryNote, PurchaseReceipt, QcInspection, QcTemplate, WorkOrder};
use crate::repository::{
    AggregateStore, InMemoryAggregateStore, InMemoryItemCatalog, InMemoryLotLedger, ItemCatalog,
    LotLedger, SqliteAggregateStore, SqliteItemRepository, SqliteLotRepository,
};

/// 质控仓储集合
///
/// # 包含的端口
/// - `lots`: 批次台账
/// - `items`: 物料主数据
/// - `templates` / `inspections`: 质检模板与质检单
/// - `work_orders` / `receipts` / `deliveries`: 生命周期聚合
#[derive(Clone)]
pub struct QualityRepositories {
    pub lots: Arc<dyn LotLedger>,
    pub items: Arc<dyn ItemCatalog>,
    pub templates: Arc<dyn AggregateStore<QcTemplate>>,
    pub inspections: Arc<dyn AggregateStore<QcInspection>>,
    pub work_orders: Arc<dyn AggregateStore<WorkOrder>>,
    pub receipts: Arc<dyn AggregateStore<PurchaseReceipt>>,
    pub deliveries: Arc<dyn AggregateStore<DeliveryNote>>,
}

impl QualityRepositories {
    /// 共享一个 SQLite 连接的仓储集合
    pub fn sqlite(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            lots: Arc::new(SqliteLotRepository::from_connection(conn.clone())),
            items: Arc::new(SqliteItemRepository::from_connection(conn.clone())),
            templates: Arc::new(SqliteAggregateStore::<QcTemplate>::from_connection(conn.clone())),
            inspections: Arc::new(SqliteAggregateStore::<QcInspection>::from_connection(conn.clone())),
            work_orders: Arc::new(SqliteAggregateStore::<WorkOrder>::from_connection(conn.clone())),
            receipts: Arc::new(SqliteAggregateStore::<PurchaseReceipt>::from_connection(conn.clone())),
            deliveries: Arc::new(SqliteAggregateStore::<DeliveryNote>::from_connection(conn)),
        }
    }

    /// 纯内存仓储集合 (嵌入式与测试)
    pub fn in_memory() -> Self {
        Self {
            lots: Arc::new(InMemoryLotLedger::new()),
            items: Arc::new(InMemoryItemCatalog::new()),
            templates: Arc::new(InMemoryAggregateStore::<QcTemplate>::new()),
            inspections: Arc::new(InMemoryAggregateStore::<QcInspection>::new()),
            work_orders: Arc::new(InMemoryAggregateStore::<WorkOrder>::new()),
            receipts: Arc::new(InMemoryAggregateStore::<PurchaseReceipt>::new()),
            deliveries: Arc::new(InMemoryAggregateStore::<DeliveryNote>::new()),
        }
    }
}
