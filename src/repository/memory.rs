// ==========================================
// 食品批次质控核心 - 内存仓储实现
// ==========================================
// 用途: 嵌入式场景与单元测试 (无需数据库)
// 并发: 每个批次一把 Mutex;提交扣减时按 lot_id 升序加锁避免死锁,
//       批次映射表只在增删批次时写锁
// ==========================================

use crate::domain::{Aggregate, CommitOutcome, Item, Lot, LotDraw, LotStatus, QTY_EPSILON};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::traits::{AggregateStore, ItemCatalog, LotLedger};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

fn lock_err<E: std::fmt::Display>(e: E) -> RepositoryError {
    RepositoryError::LockError(e.to_string())
}

// ==========================================
// InMemoryLotLedger
// ==========================================
#[derive(Default)]
pub struct InMemoryLotLedger {
    lots: RwLock<HashMap<String, Arc<Mutex<Lot>>>>,
}

impl InMemoryLotLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以一组批次初始化 (测试夹具)
    pub fn with_lots(lots: Vec<Lot>) -> RepositoryResult<Self> {
        let ledger = Self::new();
        for lot in &lots {
            ledger.insert_lot(lot)?;
        }
        Ok(ledger)
    }

    fn cell(&self, lot_id: &str) -> RepositoryResult<Option<Arc<Mutex<Lot>>>> {
        let map = self.lots.read().map_err(lock_err)?;
        Ok(map.get(lot_id).cloned())
    }

    fn snapshot<F>(&self, filter: F) -> RepositoryResult<Vec<Lot>>
    where
        F: Fn(&Lot) -> bool,
    {
        let cells: Vec<Arc<Mutex<Lot>>> = {
            let map = self.lots.read().map_err(lock_err)?;
            map.values().cloned().collect()
        };

        let mut lots = Vec::new();
        for cell in cells {
            let lot = cell.lock().map_err(lock_err)?;
            if filter(&lot) {
                lots.push(lot.clone());
            }
        }
        lots.sort_by(|a, b| a.lot_id.cmp(&b.lot_id));
        Ok(lots)
    }
}

impl LotLedger for InMemoryLotLedger {
    fn insert_lot(&self, lot: &Lot) -> RepositoryResult<()> {
        if lot.qty < 0.0 || !lot.qty.is_finite() {
            return Err(RepositoryError::FieldValueError {
                field: "qty".to_string(),
                message: format!("批次数量必须为非负有限值: {}", lot.qty),
            });
        }
        let mut map = self.lots.write().map_err(lock_err)?;
        if map.contains_key(&lot.lot_id) {
            return Err(RepositoryError::AlreadyExists {
                entity: "Lot".to_string(),
                id: lot.lot_id.clone(),
            });
        }
        map.insert(lot.lot_id.clone(), Arc::new(Mutex::new(lot.clone())));
        Ok(())
    }

    fn find_lot(&self, lot_id: &str) -> RepositoryResult<Option<Lot>> {
        match self.cell(lot_id)? {
            Some(cell) => Ok(Some(cell.lock().map_err(lock_err)?.clone())),
            None => Ok(None),
        }
    }

    fn list_lots(&self, item_id: &str, warehouse_id: &str) -> RepositoryResult<Vec<Lot>> {
        self.snapshot(|lot| lot.item_id == item_id && lot.warehouse_id == warehouse_id)
    }

    fn list_all_lots(&self) -> RepositoryResult<Vec<Lot>> {
        self.snapshot(|_| true)
    }

    fn update_status(&self, lot_id: &str, status: LotStatus) -> RepositoryResult<()> {
        let cell = self.cell(lot_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "Lot".to_string(),
            id: lot_id.to_string(),
        })?;
        let mut lot = cell.lock().map_err(lock_err)?;
        lot.status = status;
        lot.updated_at = Utc::now();
        Ok(())
    }

    fn transition_status(&self, lot_id: &str, allowed_from: &[LotStatus], to: LotStatus) -> RepositoryResult<bool> {
        let cell = self.cell(lot_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "Lot".to_string(),
            id: lot_id.to_string(),
        })?;
        let mut lot = cell.lock().map_err(lock_err)?;
        if !allowed_from.contains(&lot.status) {
            return Ok(false);
        }
        lot.status = to;
        lot.updated_at = Utc::now();
        Ok(true)
    }

    fn commit_draws(&self, draws: &[LotDraw]) -> RepositoryResult<CommitOutcome> {
        // 同一批次多条扣减先合并;BTreeMap 保证加锁顺序
        let mut merged: BTreeMap<&str, f64> = BTreeMap::new();
        for draw in draws {
            *merged.entry(draw.lot_id.as_str()).or_insert(0.0) += draw.qty;
        }

        let mut cells = Vec::with_capacity(merged.len());
        for (lot_id, qty) in &merged {
            match self.cell(lot_id)? {
                Some(cell) => cells.push((cell, *qty)),
                None => {
                    return Ok(CommitOutcome::Conflict {
                        lot_id: lot_id.to_string(),
                    })
                }
            }
        }

        let mut guards: Vec<(MutexGuard<'_, Lot>, f64)> = Vec::with_capacity(cells.len());
        for (cell, qty) in &cells {
            guards.push((cell.lock().map_err(lock_err)?, *qty));
        }

        // 先全部校验,再全部扣减: 任一失败则无任何修改
        for (lot, qty) in &guards {
            if lot.status != LotStatus::Available || lot.qty + QTY_EPSILON < *qty {
                return Ok(CommitOutcome::Conflict {
                    lot_id: lot.lot_id.clone(),
                });
            }
        }

        let now = Utc::now();
        for (lot, qty) in guards.iter_mut() {
            lot.qty = (lot.qty - *qty).max(0.0);
            lot.updated_at = now;
        }
        Ok(CommitOutcome::Committed)
    }
}

// ==========================================
// InMemoryItemCatalog
// ==========================================
#[derive(Default)]
pub struct InMemoryItemCatalog {
    items: RwLock<HashMap<String, Item>>,
}

impl InMemoryItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<Item>) -> Self {
        let map = items.into_iter().map(|i| (i.item_id.clone(), i)).collect();
        Self {
            items: RwLock::new(map),
        }
    }
}

impl ItemCatalog for InMemoryItemCatalog {
    fn upsert_item(&self, item: &Item) -> RepositoryResult<()> {
        if let Some(days) = item.shelf_life_days.filter(|d| *d < 0) {
            return Err(RepositoryError::FieldValueError {
                field: "shelf_life_days".to_string(),
                message: format!("保质期天数不能为负: {}", days),
            });
        }
        let mut map = self.items.write().map_err(lock_err)?;
        map.insert(item.item_id.clone(), item.clone());
        Ok(())
    }

    fn find_item(&self, item_id: &str) -> RepositoryResult<Option<Item>> {
        let map = self.items.read().map_err(lock_err)?;
        Ok(map.get(item_id).cloned())
    }

    fn list_items(&self) -> RepositoryResult<Vec<Item>> {
        let map = self.items.read().map_err(lock_err)?;
        let mut items: Vec<Item> = map.values().cloned().collect();
        items.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        Ok(items)
    }
}

// ==========================================
// InMemoryAggregateStore
// ==========================================
pub struct InMemoryAggregateStore<T> {
    docs: Mutex<HashMap<String, T>>,
}

impl<T> Default for InMemoryAggregateStore<T> {
    fn default() -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Aggregate> InMemoryAggregateStore<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Aggregate> AggregateStore<T> for InMemoryAggregateStore<T> {
    fn insert(&self, aggregate: &T) -> RepositoryResult<T> {
        let mut docs = self.docs.lock().map_err(lock_err)?;
        if docs.contains_key(aggregate.aggregate_id()) {
            return Err(RepositoryError::AlreadyExists {
                entity: T::KIND.to_string(),
                id: aggregate.aggregate_id().to_string(),
            });
        }
        let mut stored = aggregate.clone();
        stored.set_revision(1);
        docs.insert(stored.aggregate_id().to_string(), stored.clone());
        Ok(stored)
    }

    fn find(&self, id: &str) -> RepositoryResult<Option<T>> {
        let docs = self.docs.lock().map_err(lock_err)?;
        Ok(docs.get(id).cloned())
    }

    fn list(&self) -> RepositoryResult<Vec<T>> {
        let docs = self.docs.lock().map_err(lock_err)?;
        let mut all: Vec<T> = docs.values().cloned().collect();
        all.sort_by(|a, b| a.aggregate_id().cmp(b.aggregate_id()));
        Ok(all)
    }

    fn save(&self, aggregate: &T) -> RepositoryResult<T> {
        let mut docs = self.docs.lock().map_err(lock_err)?;
        let current = docs
            .get(aggregate.aggregate_id())
            .ok_or_else(|| RepositoryError::NotFound {
                entity: T::KIND.to_string(),
                id: aggregate.aggregate_id().to_string(),
            })?;

        if current.revision() != aggregate.revision() {
            return Err(RepositoryError::OptimisticLockFailure {
                entity: T::KIND.to_string(),
                id: aggregate.aggregate_id().to_string(),
                expected: aggregate.revision(),
                actual: current.revision(),
            });
        }

        let mut stored = aggregate.clone();
        stored.set_revision(aggregate.revision() + 1);
        docs.insert(stored.aggregate_id().to_string(), stored.clone());
        Ok(stored)
    }
}
