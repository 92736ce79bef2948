// ==========================================
// 食品批次质控核心 - 生命周期 API
// ==========================================
// 职责: 工单 / 工序卡 / 采购收货 / 发货单的流转入口
// 流程: 读取并核对版本 → 状态机纯函数流转 → 比较交换保存 → 落地附带产物
// 红线: 并发流转同一单据时,后到者得到 StaleState,绝不静默覆盖
// ==========================================

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::instrument;

use crate::api::error::{ApiError, ApiResult};
use crate::api::load_aggregate;
use crate::config::CoreConfigReader;
use crate::domain::{
    CcpStatus, DeliveryNote, DeliveryStatus, InspectionSource, Item, JobCard, JobCardStatus,
    PurchaseReceipt, QcInspection, ReceiptStatus, TemperatureReading, WorkOrder, WorkOrderStatus,
};
use crate::engine::events::{OptionalEventPublisher, QualityEvent};
use crate::engine::fefo_allocator::FefoAllocator;
use crate::engine::lifecycle::{
    DeliveryAction, DeliveryMachine, JobCardAction, JobCardMachine, ReceiptAction, ReceiptContext,
    ReceiptMachine, SideEffect, WorkOrderAction, WorkOrderContext, WorkOrderMachine,
};
use crate::engine::QualityRepositories;
use crate::repository::{LotLedger, RepositoryError, RepositoryResult};

/// 工单产出质检单 ID
pub fn production_inspection_id(work_order_id: &str) -> String {
    format!("QI-{}", work_order_id)
}

pub struct LifecycleApi {
    repos: QualityRepositories,
    allocator: Arc<FefoAllocator<dyn LotLedger>>,
    config: Arc<dyn CoreConfigReader>,
    publisher: OptionalEventPublisher,
}

impl LifecycleApi {
    pub fn new(
        repos: QualityRepositories,
        allocator: Arc<FefoAllocator<dyn LotLedger>>,
        config: Arc<dyn CoreConfigReader>,
        publisher: OptionalEventPublisher,
    ) -> Self {
        Self {
            repos,
            allocator,
            config,
            publisher,
        }
    }

    // ==========================================
    // 单据创建与查询
    // ==========================================

    pub fn create_work_order(&self, order: &WorkOrder) -> ApiResult<WorkOrder> {
        if order.status != WorkOrderStatus::Draft {
            return Err(ApiError::ValidationError(format!(
                "新建工单必须为 DRAFT: {}",
                order.status
            )));
        }
        let mut sequences: Vec<u32> = order.job_cards.iter().map(|c| c.sequence).collect();
        sequences.sort_unstable();
        sequences.dedup();
        if sequences.len() != order.job_cards.len() {
            return Err(ApiError::ValidationError(format!(
                "工单 {} 存在重复工序号",
                order.work_order_id
            )));
        }
        for card in &order.job_cards {
            Self::validate_new_job_card(&order.work_order_id, card)?;
        }

        // 落库前按 sequence 排序,工序顺序不依赖调用方
        let mut order = order.clone();
        order.job_cards.sort_by_key(|c| c.sequence);
        Ok(self.repos.work_orders.insert(&order)?)
    }

    /// 新建工序卡: 状态为 PENDING,CCP 标记与判定标准、初始 CCP 状态一致
    fn validate_new_job_card(work_order_id: &str, card: &JobCard) -> ApiResult<()> {
        if card.status != JobCardStatus::Pending {
            return Err(ApiError::ValidationError(format!(
                "工单 {} 工序 {} 新建时必须为 PENDING: {}",
                work_order_id, card.sequence, card.status
            )));
        }
        let consistent = if card.is_ccp {
            card.ccp_status == CcpStatus::Pending && card.ccp_criteria.is_some() && card.ccp_readings.is_empty()
        } else {
            card.ccp_status == CcpStatus::NotRequired
        };
        if !consistent {
            return Err(ApiError::ValidationError(format!(
                "工单 {} 工序 {} CCP 设置不一致: is_ccp={}, ccp_status={}",
                work_order_id, card.sequence, card.is_ccp, card.ccp_status
            )));
        }
        Ok(())
    }

    pub fn create_receipt(&self, receipt: &PurchaseReceipt) -> ApiResult<PurchaseReceipt> {
        if receipt.status != ReceiptStatus::Draft {
            return Err(ApiError::ValidationError(format!(
                "新建收货单必须为 DRAFT: {}",
                receipt.status
            )));
        }
        let duplicates = receipt.duplicate_line_numbers();
        if !duplicates.is_empty() {
            return Err(ApiError::ValidationError(format!(
                "收货单 {} 存在重复行号: {:?}",
                receipt.receipt_id, duplicates
            )));
        }
        Ok(self.repos.receipts.insert(receipt)?)
    }

    pub fn create_delivery(&self, note: &DeliveryNote) -> ApiResult<DeliveryNote> {
        if note.status != DeliveryStatus::Pending {
            return Err(ApiError::ValidationError(format!(
                "新建发货单必须为 PENDING: {}",
                note.status
            )));
        }
        Ok(self.repos.deliveries.insert(note)?)
    }

    pub fn get_work_order(&self, work_order_id: &str) -> ApiResult<WorkOrder> {
        load_aggregate(self.repos.work_orders.as_ref(), work_order_id, None)
    }

    pub fn get_receipt(&self, receipt_id: &str) -> ApiResult<PurchaseReceipt> {
        load_aggregate(self.repos.receipts.as_ref(), receipt_id, None)
    }

    pub fn get_delivery(&self, delivery_id: &str) -> ApiResult<DeliveryNote> {
        load_aggregate(self.repos.deliveries.as_ref(), delivery_id, None)
    }

    // ==========================================
    // 工单
    // ==========================================

    /// 工单流转
    ///
    /// # 说明
    /// - START 只做物料齐套检查,不扣减库存 (领料走 InventoryApi::allocate)
    /// - COMPLETE 设置了产出仓库时登记产出批次;需检成品同时生成产出质检单
    #[instrument(skip(self))]
    pub fn transition_work_order(
        &self,
        work_order_id: &str,
        expected_revision: Option<i64>,
        action: WorkOrderAction,
        as_of: NaiveDate,
    ) -> ApiResult<WorkOrder> {
        let order = load_aggregate(self.repos.work_orders.as_ref(), work_order_id, expected_revision)?;
        let product = self.repos.items.find_item(&order.product_item_id)?;
        let production_inspection = match action {
            WorkOrderAction::Complete => self.production_inspection(&order, product.as_ref())?,
            _ => None,
        };

        let ctx = WorkOrderContext {
            availability: &*self.allocator,
            product: product.as_ref(),
            as_of,
            now: Utc::now(),
        };
        let transitioned = WorkOrderMachine::transition(&order, action, &ctx).map_err(|e| {
            tracing::warn!("工单流转被拒: work_order_id={}, action={}, error={}", work_order_id, action, e);
            e
        })?;

        let saved = self.repos.work_orders.save(&transitioned.entity)?;
        tracing::info!(
            "工单流转: work_order_id={}, {} → {}, revision={}",
            work_order_id,
            order.status,
            saved.status,
            saved.revision
        );
        self.apply_effects(&saved.work_order_id, transitioned.effects)?;
        if let Some(inspection) = production_inspection {
            if Self::insert_once(self.repos.inspections.insert(&inspection).map(|_| ()))? {
                tracing::info!(
                    "产出质检单已生成: inspection_id={}, work_order_id={}",
                    inspection.inspection_id,
                    work_order_id
                );
            }
        }
        Ok(saved)
    }

    /// 需检成品的产出质检单 (流转前解析模板,缺失即校验失败)
    fn production_inspection(&self, order: &WorkOrder, product: Option<&Item>) -> ApiResult<Option<QcInspection>> {
        let product = match product {
            Some(p) if p.requires_qc && order.output_warehouse_id.is_some() => p,
            _ => return Ok(None),
        };
        let template_id = product.qc_template_id.as_deref().ok_or_else(|| {
            ApiError::ValidationError(format!("成品 {} 需检但未配置质检模板", product.item_id))
        })?;
        let template = load_aggregate(self.repos.templates.as_ref(), template_id, None)?;
        Ok(Some(QcInspection::draft(
            production_inspection_id(&order.work_order_id),
            &template,
            &product.item_id,
            &order.work_order_id,
            InspectionSource::Production {
                work_order_id: order.work_order_id.clone(),
            },
            Utc::now(),
        )))
    }

    /// 工序卡流转
    #[instrument(skip(self))]
    pub fn transition_job_card(
        &self,
        work_order_id: &str,
        expected_revision: Option<i64>,
        sequence: u32,
        action: JobCardAction,
    ) -> ApiResult<WorkOrder> {
        let order = load_aggregate(self.repos.work_orders.as_ref(), work_order_id, expected_revision)?;
        let transitioned = JobCardMachine::transition(&order, sequence, &action, Utc::now()).map_err(|e| {
            tracing::warn!(
                "工序卡流转被拒: work_order_id={}, sequence={}, action={}, error={}",
                work_order_id,
                sequence,
                action,
                e
            );
            e
        })?;

        let saved = self.repos.work_orders.save(&transitioned.entity)?;
        if let Some(card) = saved.job_card(sequence) {
            tracing::info!(
                "工序卡流转: work_order_id={}, sequence={}, action={}, status={}, ccp_status={}",
                work_order_id,
                sequence,
                action,
                card.status,
                card.ccp_status
            );
        }
        self.apply_effects(&saved.work_order_id, transitioned.effects)?;
        Ok(saved)
    }

    // ==========================================
    // 采购收货
    // ==========================================

    /// 收货单流转
    ///
    /// SUBMIT 保存后落地质检单与批次 (ID 由收货单号与行号确定)
    #[instrument(skip(self))]
    pub fn transition_receipt(
        &self,
        receipt_id: &str,
        expected_revision: Option<i64>,
        action: ReceiptAction,
    ) -> ApiResult<PurchaseReceipt> {
        let receipt = load_aggregate(self.repos.receipts.as_ref(), receipt_id, expected_revision)?;
        let ctx = ReceiptContext {
            items: self.repos.items.as_ref(),
            templates: self.repos.templates.as_ref(),
            now: Utc::now(),
        };
        let transitioned = ReceiptMachine::transition(&receipt, action, &ctx).map_err(|e| {
            tracing::warn!("收货单流转被拒: receipt_id={}, action={}, error={}", receipt_id, action, e);
            e
        })?;

        let saved = self.repos.receipts.save(&transitioned.entity)?;
        tracing::info!(
            "收货单流转: receipt_id={}, {} → {}, qc_status={}",
            receipt_id,
            receipt.status,
            saved.status,
            saved.qc_status()
        );
        self.apply_effects(&saved.receipt_id, transitioned.effects)?;
        Ok(saved)
    }

    // ==========================================
    // 发货
    // ==========================================

    #[instrument(skip(self))]
    pub fn transition_delivery(
        &self,
        delivery_id: &str,
        expected_revision: Option<i64>,
        action: DeliveryAction,
    ) -> ApiResult<DeliveryNote> {
        let note = load_aggregate(self.repos.deliveries.as_ref(), delivery_id, expected_revision)?;
        let transitioned = DeliveryMachine::transition(&note, action, Utc::now())?;
        let saved = self.repos.deliveries.save(&transitioned.entity)?;
        tracing::info!(
            "发货单流转: delivery_id={}, {} → {}, cold_chain_compliant={}",
            delivery_id,
            note.status,
            saved.status,
            saved.cold_chain_compliant
        );
        Ok(saved)
    }

    /// 追加冷链温度记录
    ///
    /// 温控区间取自品类配置;未配置的品类拒绝记录
    #[instrument(skip(self))]
    pub fn log_delivery_temperature(
        &self,
        delivery_id: &str,
        expected_revision: Option<i64>,
        reading: TemperatureReading,
    ) -> ApiResult<DeliveryNote> {
        let note = load_aggregate(self.repos.deliveries.as_ref(), delivery_id, expected_revision)?;
        let range = self
            .config
            .cold_chain_range(&note.product_category)
            .map_err(|e| ApiError::InternalError(format!("读取冷链区间失败: {}", e)))?
            .ok_or_else(|| {
                ApiError::ValidationError(format!("品类 {} 未配置冷链温控区间", note.product_category))
            })?;

        let transitioned = DeliveryMachine::append_temperature(&note, reading, range, Utc::now())?;
        let saved = self.repos.deliveries.save(&transitioned.entity)?;
        tracing::debug!(
            "温度记录: delivery_id={}, readings={}, compliant={}",
            delivery_id,
            saved.temperature_log.len(),
            saved.cold_chain_compliant
        );
        self.apply_effects(&saved.delivery_id, transitioned.effects)?;
        Ok(saved)
    }

    // ==========================================
    // 附带产物
    // ==========================================

    /// 在聚合保存成功之后落地产物 (版本冲突的流转不会产生任何产物)
    fn apply_effects(&self, subject_id: &str, effects: Vec<SideEffect>) -> ApiResult<()> {
        for effect in effects {
            match effect {
                SideEffect::InspectionSpawned(inspection) => {
                    if Self::insert_once(self.repos.inspections.insert(&inspection).map(|_| ()))? {
                        tracing::info!(
                            "质检单已生成: inspection_id={}, item={}, batch_no={}",
                            inspection.inspection_id,
                            inspection.item_id,
                            inspection.batch_no
                        );
                    } else {
                        tracing::warn!("质检单已存在,跳过: inspection_id={}", inspection.inspection_id);
                    }
                }
                SideEffect::LotCreated(lot) => {
                    if Self::insert_once(self.repos.lots.insert_lot(&lot))? {
                        tracing::info!(
                            "批次已登记: lot_id={}, item={}, qty={}, status={}",
                            lot.lot_id,
                            lot.item_id,
                            lot.qty,
                            lot.status
                        );
                    } else {
                        tracing::warn!("批次已存在,跳过: lot_id={}", lot.lot_id);
                    }
                }
                SideEffect::CcpDeviation { sequence, reading } => {
                    tracing::warn!(
                        "CCP 偏离: work_order_id={}, sequence={}, temperature={:?}, holding_time={:?}",
                        subject_id,
                        sequence,
                        reading.temperature,
                        reading.holding_time
                    );
                    self.publisher.publish(QualityEvent::CcpDeviation {
                        work_order_id: subject_id.to_string(),
                        sequence,
                        temperature: reading.temperature,
                        holding_time: reading.holding_time,
                    });
                }
                SideEffect::ColdChainExcursion { celsius, range } => {
                    tracing::warn!(
                        "冷链超限: delivery_id={}, celsius={}, range=[{}, {}]",
                        subject_id,
                        celsius,
                        range.min_c,
                        range.max_c
                    );
                    self.publisher.publish(QualityEvent::ColdChainExcursion {
                        delivery_id: subject_id.to_string(),
                        celsius,
                        range,
                    });
                }
            }
        }
        Ok(())
    }

    /// 产物 ID 由单据确定,重复落地视为已完成;返回是否为本次新建
    fn insert_once(result: RepositoryResult<()>) -> ApiResult<bool> {
        match result {
            Ok(()) => Ok(true),
            Err(RepositoryError::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
