// ==========================================
// 食品批次质控核心 - 质检 API
// ==========================================
// 职责: 质检模板维护、质检评估、读数录入与结论传递
// 结论传递: PASSED → 批次放行 (AVAILABLE),收货行计入合格量
//           FAILED → 批次冻结 (ON_HOLD),收货行计入不合格量
// 红线: 已出结论的质检单不可再改读数
// ==========================================

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::api::error::{ApiError, ApiResult};
use crate::api::load_aggregate;
use crate::domain::{
    InspectionResult, InspectionSource, InspectionStatus, LineQcStatus, LotStatus, QcInspection,
    QcReading, QcTemplate, ReceiptStatus,
};
use crate::engine::events::{OptionalEventPublisher, QualityEvent};
use crate::engine::qc_rule_engine::QcRuleEngine;
use crate::engine::QualityRepositories;
use crate::repository::RepositoryError;

/// 结论回写收货单时的比较交换重试次数
const DISPOSITION_SAVE_ATTEMPTS: u32 = 3;

pub struct QualityApi {
    repos: QualityRepositories,
    publisher: OptionalEventPublisher,
}

impl QualityApi {
    pub fn new(repos: QualityRepositories, publisher: OptionalEventPublisher) -> Self {
        Self { repos, publisher }
    }

    // ==========================================
    // 模板
    // ==========================================

    /// 发布质检模板 (模板只读,修改即发布新 template_id)
    pub fn create_template(&self, template: &QcTemplate) -> ApiResult<QcTemplate> {
        if template.parameters.is_empty() {
            return Err(ApiError::ValidationError(format!(
                "质检模板 {} 没有任何参数",
                template.template_id
            )));
        }
        let stored = self.repos.templates.insert(template)?;
        tracing::info!(
            "质检模板已发布: template_id={}, version={}, parameters={}",
            stored.template_id,
            stored.version,
            stored.parameters.len()
        );
        Ok(stored)
    }

    pub fn get_template(&self, template_id: &str) -> ApiResult<QcTemplate> {
        load_aggregate(self.repos.templates.as_ref(), template_id, None)
    }

    pub fn get_inspection(&self, inspection_id: &str) -> ApiResult<QcInspection> {
        load_aggregate(self.repos.inspections.as_ref(), inspection_id, None)
    }

    pub fn list_inspections(&self) -> ApiResult<Vec<QcInspection>> {
        Ok(self.repos.inspections.list()?)
    }

    // ==========================================
    // 评估
    // ==========================================

    /// 纯评估,不落库
    pub fn evaluate_inspection(&self, template: &QcTemplate, readings: &[QcReading]) -> ApiResult<InspectionResult> {
        Ok(QcRuleEngine::evaluate(template, readings)?)
    }

    /// 录入读数 (整组替换) 并落库
    ///
    /// # 流程
    /// 1. 读取质检单并核对版本;已出结论则拒绝
    /// 2. 规则引擎评估,写入读数与状态
    /// 3. 比较交换保存
    /// 4. 读数齐全且得出结论时传递到批次与收货行,并发布 InspectionFinalized;
    ///    读数未齐时只保存,质检单保持开放
    #[instrument(skip(self, readings), fields(readings = readings.len()))]
    pub fn record_readings(
        &self,
        inspection_id: &str,
        expected_revision: Option<i64>,
        readings: Vec<QcReading>,
    ) -> ApiResult<QcInspection> {
        let now = Utc::now();
        let mut inspection = load_aggregate(self.repos.inspections.as_ref(), inspection_id, expected_revision)?;
        if inspection.status.is_final() {
            return Err(ApiError::InvalidStateTransition {
                from: inspection.status.to_string(),
                to: "RECORD_READINGS".to_string(),
            });
        }
        let template = self.get_template(&inspection.template_id)?;

        let result = QcRuleEngine::evaluate(&template, &readings)?;
        inspection.apply_result(readings, &result, now);
        let saved = self.repos.inspections.save(&inspection)?;

        tracing::info!(
            "质检读数已保存: inspection_id={}, status={}, complete={}",
            saved.inspection_id,
            saved.status,
            result.is_complete
        );
        if !result.ccp_deviations.is_empty() {
            tracing::warn!(
                "关键参数不合格: inspection_id={}, parameters={:?}",
                saved.inspection_id,
                result.ccp_deviations
            );
        }

        if result.is_complete && saved.status.is_final() {
            self.propagate_disposition(&saved, now)?;
            self.publisher.publish(QualityEvent::InspectionFinalized {
                inspection_id: saved.inspection_id.clone(),
                item_id: saved.item_id.clone(),
                batch_no: saved.batch_no.clone(),
                status: saved.status,
            });
        }
        Ok(saved)
    }

    /// 结论传递到来源单据与批次
    fn propagate_disposition(&self, inspection: &QcInspection, now: DateTime<Utc>) -> ApiResult<()> {
        let lot_status = match inspection.status {
            InspectionStatus::Passed => LotStatus::Available,
            InspectionStatus::Failed => LotStatus::OnHold,
            InspectionStatus::Draft | InspectionStatus::InProgress => return Ok(()),
        };

        let lot_id = match &inspection.source {
            InspectionSource::Receipt { receipt_id, line_no } => {
                self.apply_receipt_disposition(receipt_id, *line_no, inspection, now)?
            }
            InspectionSource::Production { work_order_id } => {
                let order = load_aggregate(self.repos.work_orders.as_ref(), work_order_id, None)?;
                order.output_lot_id
            }
        };

        match lot_id {
            Some(lot_id) => {
                self.repos.lots.update_status(&lot_id, lot_status)?;
                tracing::info!(
                    "批次质检处置: lot_id={}, inspection_id={}, status={}",
                    lot_id,
                    inspection.inspection_id,
                    lot_status
                );
            }
            None => tracing::warn!(
                "质检单未关联批次,跳过批次处置: inspection_id={}",
                inspection.inspection_id
            ),
        }
        Ok(())
    }

    /// 回写收货行;返回该行登记的批次
    ///
    /// 结论回写是幂等的,版本冲突时重新读取后重试
    fn apply_receipt_disposition(
        &self,
        receipt_id: &str,
        line_no: u32,
        inspection: &QcInspection,
        now: DateTime<Utc>,
    ) -> ApiResult<Option<String>> {
        let line_status = if inspection.status == InspectionStatus::Passed {
            LineQcStatus::Passed
        } else {
            LineQcStatus::Failed
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut receipt = load_aggregate(self.repos.receipts.as_ref(), receipt_id, None)?;
            if receipt.status != ReceiptStatus::PendingQc {
                tracing::warn!(
                    "收货单状态为 {},不再回写质检结论: receipt_id={}",
                    receipt.status,
                    receipt_id
                );
                return Ok(None);
            }
            let line = receipt.line_mut(line_no).ok_or_else(|| {
                ApiError::NotFound(format!("收货行(receipt_id={}, line_no={})不存在", receipt_id, line_no))
            })?;
            line.qc_status = line_status;
            if line_status == LineQcStatus::Passed {
                line.accepted_qty = line.qty;
                line.rejected_qty = 0.0;
            } else {
                line.accepted_qty = 0.0;
                line.rejected_qty = line.qty;
            }
            let lot_id = line.lot_id.clone();
            receipt.updated_at = now;

            match self.repos.receipts.save(&receipt) {
                Ok(saved) => {
                    tracing::info!(
                        "收货行质检结论: receipt_id={}, line_no={}, qc_status={}, receipt_qc_status={}",
                        receipt_id,
                        line_no,
                        line_status,
                        saved.qc_status()
                    );
                    return Ok(lot_id);
                }
                Err(RepositoryError::OptimisticLockFailure { .. }) if attempt < DISPOSITION_SAVE_ATTEMPTS => {
                    tracing::debug!("收货单版本冲突,重试回写: receipt_id={}, attempt={}", receipt_id, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
