// ==========================================
// 食品批次质控核心 - FEFO 批次分配引擎
// ==========================================
// 职责: 按先到期先出 (FEFO) 从可用批次中选批并原子扣减
// 红线: 分配全有或全无,调用方看不到部分满足的请求
// 红线: RESERVED/ON_HOLD/QUARANTINE 批次对本算法不可见
// ==========================================
// 排序: exp_date 升序 (无效期排最后) → 生产/收货日期升序 → lot_id
// 并发: 选批基于快照;提交时由台账按批次比较交换,
//       竞争失败则基于新快照重新选批
// ==========================================

use crate::domain::{Allocation, CommitOutcome, Lot, LotDraw, QTY_EPSILON};
use crate::repository::{LotLedger, RepositoryError};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// 默认竞争重试次数
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Error, Debug)]
pub enum AllocationError {
    #[error("库存不足: item={item_id}, warehouse={warehouse_id}, available={available}, requested={requested}")]
    InsufficientStock {
        item_id: String,
        warehouse_id: String,
        available: f64,
        requested: f64,
    },

    #[error("无效的分配数量: {0}")]
    InvalidQuantity(f64),

    #[error("并发竞争重试耗尽: attempts={attempts}")]
    ContentionExhausted { attempts: u32 },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

// ==========================================
// MaterialAvailability - 物料可用量端口
// ==========================================
// 工单下达→开工的物料齐套检查依赖此接口
pub trait MaterialAvailability: Send + Sync {
    fn available_qty(
        &self,
        item_id: &str,
        warehouse_id: &str,
        as_of: NaiveDate,
    ) -> Result<f64, RepositoryError>;
}

/// FEFO 排序比较器
pub fn fefo_order(a: &Lot, b: &Lot) -> Ordering {
    let by_expiry = match (a.exp_date, b.exp_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_expiry
        .then_with(|| a.age_key().cmp(&b.age_key()))
        .then_with(|| a.lot_id.cmp(&b.lot_id))
}

// ==========================================
// FefoAllocator
// ==========================================
pub struct FefoAllocator<L: ?Sized> {
    ledger: Arc<L>,
    max_retries: u32,
}

impl<L: LotLedger + ?Sized> FefoAllocator<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self {
            ledger,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// 纯选批: 过滤可用批次 → FEFO 排序 → 贪心取量
    ///
    /// # 返回
    /// - Ok(allocations): Σqty == requested
    /// - Err(InsufficientStock): 可用总量不足,不产生任何扣减
    pub fn plan(
        item_id: &str,
        warehouse_id: &str,
        lots: &[Lot],
        requested: f64,
        as_of: NaiveDate,
    ) -> Result<Vec<Allocation>, AllocationError> {
        let mut pool: Vec<&Lot> = lots
            .iter()
            .filter(|lot| lot.item_id == item_id && lot.warehouse_id == warehouse_id)
            .filter(|lot| lot.is_fefo_eligible(as_of))
            .collect();
        pool.sort_by(|a, b| fefo_order(a, b));

        let available: f64 = pool.iter().map(|lot| lot.qty).sum();
        if available + QTY_EPSILON < requested {
            return Err(AllocationError::InsufficientStock {
                item_id: item_id.to_string(),
                warehouse_id: warehouse_id.to_string(),
                available,
                requested,
            });
        }

        let mut remaining = requested;
        let mut allocations = Vec::new();
        for lot in pool {
            if remaining <= QTY_EPSILON {
                break;
            }
            let take = lot.qty.min(remaining);
            allocations.push(Allocation {
                lot_id: lot.lot_id.clone(),
                lot_number: lot.lot_number.clone(),
                qty: take,
                exp_date: lot.exp_date,
            });
            remaining -= take;
        }
        Ok(allocations)
    }

    /// 可用量 (AVAILABLE 且未过期)
    pub fn eligible_qty(&self, item_id: &str, warehouse_id: &str, as_of: NaiveDate) -> Result<f64, RepositoryError> {
        let lots = self.ledger.list_lots(item_id, warehouse_id)?;
        Ok(lots
            .iter()
            .filter(|lot| lot.is_fefo_eligible(as_of))
            .map(|lot| lot.qty)
            .sum())
    }

    /// 分配并原子扣减
    ///
    /// # 流程
    /// 1. 读取批次快照并选批
    /// 2. 台账原子提交;竞争失败 (Conflict) 则整组回滚并基于新快照重试
    /// 3. 超过 max_retries 仍冲突 → ContentionExhausted
    #[instrument(skip(self))]
    pub fn allocate(
        &self,
        item_id: &str,
        warehouse_id: &str,
        requested: f64,
        as_of: NaiveDate,
    ) -> Result<Vec<Allocation>, AllocationError> {
        if !(requested.is_finite() && requested > 0.0) {
            return Err(AllocationError::InvalidQuantity(requested));
        }

        let attempts = self.max_retries + 1;
        for attempt in 1..=attempts {
            let lots = self.ledger.list_lots(item_id, warehouse_id)?;
            let allocations = match Self::plan(item_id, warehouse_id, &lots, requested, as_of) {
                Ok(allocations) => allocations,
                Err(e) => {
                    tracing::warn!("分配失败: {}", e);
                    return Err(e);
                }
            };

            let draws: Vec<LotDraw> = allocations.iter().map(Allocation::to_draw).collect();
            match self.ledger.commit_draws(&draws)? {
                CommitOutcome::Committed => {
                    tracing::info!(
                        lots = allocations.len(),
                        attempt,
                        "FEFO 分配完成: item={}, warehouse={}, qty={}",
                        item_id,
                        warehouse_id,
                        requested
                    );
                    return Ok(allocations);
                }
                CommitOutcome::Conflict { lot_id } => {
                    tracing::warn!(attempt, "批次竞争失败,重新选批: lot_id={}", lot_id);
                }
            }
        }

        Err(AllocationError::ContentionExhausted { attempts })
    }
}

impl<L: LotLedger + ?Sized> MaterialAvailability for FefoAllocator<L> {
    fn available_qty(&self, item_id: &str, warehouse_id: &str, as_of: NaiveDate) -> Result<f64, RepositoryError> {
        self.eligible_qty(item_id, warehouse_id, as_of)
    }
}
