// ==========================================
// 食品批次质控核心 - 仓储端口定义
// ==========================================
// 职责: 引擎/API 层只依赖这些 trait,存储实现可替换
// 实现者: Sqlite* (持久化) / InMemory* (嵌入与测试)
// ==========================================

use crate::domain::{Aggregate, CommitOutcome, Item, Lot, LotDraw, LotStatus};
use crate::repository::error::RepositoryResult;

// ==========================================
// LotLedger - 批次台账端口
// ==========================================
pub trait LotLedger: Send + Sync {
    /// 新建批次 (lot_id 重复时返回 AlreadyExists)
    fn insert_lot(&self, lot: &Lot) -> RepositoryResult<()>;

    fn find_lot(&self, lot_id: &str) -> RepositoryResult<Option<Lot>>;

    /// 指定 (物料, 仓库) 的全部批次,含非 AVAILABLE 与已耗尽批次
    fn list_lots(&self, item_id: &str, warehouse_id: &str) -> RepositoryResult<Vec<Lot>>;

    fn list_all_lots(&self) -> RepositoryResult<Vec<Lot>>;

    fn update_status(&self, lot_id: &str, status: LotStatus) -> RepositoryResult<()>;

    /// 条件状态变更: 当前状态属于 allowed_from 时才写入
    ///
    /// 返回 false 表示状态已不满足条件 (未写入);批次不存在返回 NotFound
    fn transition_status(&self, lot_id: &str, allowed_from: &[LotStatus], to: LotStatus) -> RepositoryResult<bool>;

    /// 原子提交一组扣减
    ///
    /// # 约束
    /// - 每个批次的"读取余量 → 扣减"为单一临界区
    /// - 任一批次余量不足或状态已非 AVAILABLE → 整组回滚,返回 Conflict
    /// - 不同批次之间不加全局锁
    fn commit_draws(&self, draws: &[LotDraw]) -> RepositoryResult<CommitOutcome>;
}

// ==========================================
// ItemCatalog - 物料主数据端口
// ==========================================
pub trait ItemCatalog: Send + Sync {
    fn upsert_item(&self, item: &Item) -> RepositoryResult<()>;

    fn find_item(&self, item_id: &str) -> RepositoryResult<Option<Item>>;

    fn list_items(&self) -> RepositoryResult<Vec<Item>>;
}

// ==========================================
// AggregateStore - 聚合根存储端口 (乐观并发)
// ==========================================
pub trait AggregateStore<T: Aggregate>: Send + Sync {
    /// 新建聚合 (revision 置为 1)
    fn insert(&self, aggregate: &T) -> RepositoryResult<T>;

    fn find(&self, id: &str) -> RepositoryResult<Option<T>>;

    fn list(&self) -> RepositoryResult<Vec<T>>;

    /// 比较交换保存
    ///
    /// 以 `aggregate.revision()` 为期望版本;不一致返回
    /// `OptimisticLockFailure`,一致则写入并返回 revision+1 的副本
    fn save(&self, aggregate: &T) -> RepositoryResult<T>;
}
