// ==========================================
// 食品批次质控核心 - 库存 API
// ==========================================
// 职责: 批次登记、FEFO 分配、批次状态处置、库存健康度
// 红线: 分配全有或全无;批次状态变更只走允许的路径
// ==========================================

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api::error::{ApiError, ApiResult};
use crate::config::CoreConfigReader;
use crate::domain::{Allocation, Lot, LotStatus};
use crate::engine::fefo_allocator::{FefoAllocator, DEFAULT_MAX_RETRIES};
use crate::engine::stock_health::{StockHealthEngine, StockHealthReport};
use crate::engine::QualityRepositories;
use crate::repository::LotLedger;

/// 批次登记请求 (期初/调拨等不经收货单的入账)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveLotRequest {
    pub item_id: String,
    pub warehouse_id: String,
    pub lot_number: String,
    pub qty: f64,
    pub mfg_date: Option<NaiveDate>,
    pub exp_date: Option<NaiveDate>,
    pub source_ref: Option<String>,
}

/// 分配重试次数: 配置读取失败时回退默认值
pub(crate) fn max_retries_from(config: &dyn CoreConfigReader) -> u32 {
    config.allocation_max_retries().unwrap_or_else(|e| {
        tracing::warn!("读取 allocation.max_retries 失败,使用默认值 {}: {}", DEFAULT_MAX_RETRIES, e);
        DEFAULT_MAX_RETRIES
    })
}

// ==========================================
// InventoryApi - 库存 API
// ==========================================
pub struct InventoryApi {
    repos: QualityRepositories,
    allocator: Arc<FefoAllocator<dyn LotLedger>>,
    config: Arc<dyn CoreConfigReader>,
}

impl InventoryApi {
    pub fn new(
        repos: QualityRepositories,
        allocator: Arc<FefoAllocator<dyn LotLedger>>,
        config: Arc<dyn CoreConfigReader>,
    ) -> Self {
        Self {
            repos,
            allocator,
            config,
        }
    }

    /// 登记新批次
    ///
    /// # 规则
    /// - 需检物料入账即隔离 (QUARANTINE),否则直接可用
    /// - 未给效期时按物料保质期从生产日期推算
    pub fn receive_lot(&self, request: ReceiveLotRequest) -> ApiResult<Lot> {
        if !(request.qty.is_finite() && request.qty > 0.0) {
            return Err(ApiError::ValidationError(format!("批次数量必须大于 0: {}", request.qty)));
        }
        if request.lot_number.trim().is_empty() {
            return Err(ApiError::ValidationError("批号不能为空".to_string()));
        }
        let item = self
            .repos
            .items
            .find_item(&request.item_id)?
            .ok_or_else(|| ApiError::NotFound(format!("物料(id={})不存在", request.item_id)))?;

        let exp_date = item
            .resolve_expiry(request.exp_date, request.mfg_date)
            .map_err(|e| ApiError::ValidationError(e.to_string()))?;

        let now = Utc::now();
        let lot = Lot {
            lot_id: uuid::Uuid::new_v4().to_string(),
            item_id: item.item_id.clone(),
            warehouse_id: request.warehouse_id,
            lot_number: request.lot_number,
            qty: request.qty,
            mfg_date: request.mfg_date,
            exp_date,
            status: if item.requires_qc {
                LotStatus::Quarantine
            } else {
                LotStatus::Available
            },
            source_ref: request.source_ref,
            received_at: now,
            updated_at: now,
        };
        self.repos.lots.insert_lot(&lot)?;
        tracing::info!(
            "批次入账: lot_id={}, item={}, qty={}, status={}",
            lot.lot_id,
            lot.item_id,
            lot.qty,
            lot.status
        );
        Ok(lot)
    }

    /// FEFO 分配并扣减
    #[instrument(skip(self))]
    pub fn allocate(
        &self,
        item_id: &str,
        warehouse_id: &str,
        qty: f64,
        as_of: NaiveDate,
    ) -> ApiResult<Vec<Allocation>> {
        Ok(self.allocator.allocate(item_id, warehouse_id, qty, as_of)?)
    }

    /// 可分配总量
    pub fn available_qty(&self, item_id: &str, warehouse_id: &str, as_of: NaiveDate) -> ApiResult<f64> {
        Ok(self.allocator.eligible_qty(item_id, warehouse_id, as_of)?)
    }

    pub fn get_lot(&self, lot_id: &str) -> ApiResult<Lot> {
        self.repos
            .lots
            .find_lot(lot_id)?
            .ok_or_else(|| ApiError::NotFound(format!("批次(id={})不存在", lot_id)))
    }

    pub fn list_lots(&self, item_id: &str, warehouse_id: &str) -> ApiResult<Vec<Lot>> {
        Ok(self.repos.lots.list_lots(item_id, warehouse_id)?)
    }

    // ==========================================
    // 批次状态处置
    // ==========================================

    /// 隔离: AVAILABLE / ON_HOLD → QUARANTINE
    pub fn quarantine_lot(&self, lot_id: &str) -> ApiResult<Lot> {
        self.change_status(lot_id, &[LotStatus::Available, LotStatus::OnHold], LotStatus::Quarantine)
    }

    /// 冻结: AVAILABLE / QUARANTINE / RESERVED → ON_HOLD
    pub fn hold_lot(&self, lot_id: &str) -> ApiResult<Lot> {
        self.change_status(
            lot_id,
            &[LotStatus::Available, LotStatus::Quarantine, LotStatus::Reserved],
            LotStatus::OnHold,
        )
    }

    /// 放行: QUARANTINE / ON_HOLD → AVAILABLE
    pub fn release_lot(&self, lot_id: &str) -> ApiResult<Lot> {
        self.change_status(lot_id, &[LotStatus::Quarantine, LotStatus::OnHold], LotStatus::Available)
    }

    /// 预留: AVAILABLE → RESERVED
    pub fn reserve_lot(&self, lot_id: &str) -> ApiResult<Lot> {
        self.change_status(lot_id, &[LotStatus::Available], LotStatus::Reserved)
    }

    /// 取消预留: RESERVED → AVAILABLE
    pub fn unreserve_lot(&self, lot_id: &str) -> ApiResult<Lot> {
        self.change_status(lot_id, &[LotStatus::Reserved], LotStatus::Available)
    }

    /// 状态检查与写入在仓储内一次完成,并发变更不会越过 allowed_from
    fn change_status(&self, lot_id: &str, allowed_from: &[LotStatus], to: LotStatus) -> ApiResult<Lot> {
        if !self.repos.lots.transition_status(lot_id, allowed_from, to)? {
            let current = self.get_lot(lot_id)?;
            return Err(ApiError::InvalidStateTransition {
                from: current.status.to_string(),
                to: to.to_string(),
            });
        }
        tracing::info!("批次状态变更: lot_id={}, → {}", lot_id, to);
        self.get_lot(lot_id)
    }

    // ==========================================
    // 库存健康度
    // ==========================================

    pub fn stock_health_report(&self, as_of: NaiveDate) -> ApiResult<StockHealthReport> {
        let days = self
            .config
            .near_expiry_days()
            .map_err(|e| ApiError::InternalError(format!("读取 stock.near_expiry_days 失败: {}", e)))?;
        let items = self.repos.items.list_items()?;
        let lots = self.repos.lots.list_all_lots()?;
        Ok(StockHealthEngine::report(&items, &lots, as_of, days))
    }
}
