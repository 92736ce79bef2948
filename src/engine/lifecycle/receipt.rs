// ==========================================
// 食品批次质控核心 - 采购收货状态机
// ==========================================
// DRAFT → PENDING_QC → COMPLETED*
// {DRAFT, PENDING_QC} → CANCELLED*
// ==========================================
// 提交: 每个需检行生成一张 DRAFT 质检单,并登记隔离批次
//       免检行直接 NOT_REQUIRED,批次直接可用
// 完工: 汇总 qc_status ≠ PENDING (FAILED/PARTIAL 同样允许关闭单据)
// ==========================================

use super::{BlockingReason, EntityKind, LifecycleError, SideEffect, Transitioned};
use crate::domain::{
    InspectionSource, Item, LineQcStatus, Lot, LotStatus, PurchaseReceipt, QcInspection,
    QcTemplate, ReceiptLine, ReceiptQcStatus, ReceiptStatus,
};
use crate::repository::{AggregateStore, ItemCatalog};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiptAction {
    Submit,
    Complete,
    Cancel,
}

impl fmt::Display for ReceiptAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReceiptAction::Submit => "SUBMIT",
            ReceiptAction::Complete => "COMPLETE",
            ReceiptAction::Cancel => "CANCEL",
        };
        write!(f, "{}", s)
    }
}

/// 收货流转上下文 (只读端口)
pub struct ReceiptContext<'a> {
    pub items: &'a dyn ItemCatalog,
    pub templates: &'a dyn AggregateStore<QcTemplate>,
    pub now: DateTime<Utc>,
}

/// 收货行生成的质检单 ID
pub fn inspection_id_for(receipt_id: &str, line_no: u32) -> String {
    format!("QI-{}-{}", receipt_id, line_no)
}

/// 收货行登记的批次 ID
pub fn lot_id_for(receipt_id: &str, line_no: u32) -> String {
    format!("LOT-{}-{}", receipt_id, line_no)
}

pub struct ReceiptMachine;

impl ReceiptMachine {
    pub fn transition(
        receipt: &PurchaseReceipt,
        action: ReceiptAction,
        ctx: &ReceiptContext<'_>,
    ) -> Result<Transitioned<PurchaseReceipt>, LifecycleError> {
        use ReceiptAction as A;
        use ReceiptStatus as S;

        let mut next = receipt.clone();
        let mut effects = Vec::new();

        match (receipt.status, action) {
            (S::Draft, A::Submit) => {
                if receipt.lines.is_empty() {
                    return Err(LifecycleError::Validation(format!(
                        "收货单 {} 没有收货行",
                        receipt.receipt_id
                    )));
                }
                let duplicates = receipt.duplicate_line_numbers();
                if !duplicates.is_empty() {
                    return Err(LifecycleError::Validation(format!(
                        "收货单 {} 存在重复行号: {:?}",
                        receipt.receipt_id, duplicates
                    )));
                }
                for line in next.lines.iter_mut() {
                    Self::submit_line(&receipt.receipt_id, line, ctx, &mut effects)?;
                }
                next.status = S::PendingQc;
            }
            (S::PendingQc, A::Complete) => {
                if receipt.qc_status() == ReceiptQcStatus::Pending {
                    return Err(LifecycleError::refused(
                        EntityKind::PurchaseReceipt,
                        &receipt.receipt_id,
                        action,
                        BlockingReason::QcPending {
                            lines: receipt.pending_lines(),
                        },
                    ));
                }
                next.status = S::Completed;
            }
            (S::Draft | S::PendingQc, A::Cancel) => {
                next.status = S::Cancelled;
            }
            (S::Draft | S::PendingQc | S::Completed | S::Cancelled, _) => {
                return Err(LifecycleError::refused(
                    EntityKind::PurchaseReceipt,
                    &receipt.receipt_id,
                    action,
                    BlockingReason::NotPermitted {
                        status: receipt.status.to_string(),
                    },
                ));
            }
        }

        next.updated_at = ctx.now;
        Ok(Transitioned {
            entity: next,
            effects,
        })
    }

    fn submit_line(
        receipt_id: &str,
        line: &mut ReceiptLine,
        ctx: &ReceiptContext<'_>,
        effects: &mut Vec<SideEffect>,
    ) -> Result<(), LifecycleError> {
        if !(line.qty.is_finite() && line.qty > 0.0) {
            return Err(LifecycleError::Validation(format!(
                "收货行 {} 数量必须大于 0: {}",
                line.line_no, line.qty
            )));
        }
        let item = ctx
            .items
            .find_item(&line.item_id)?
            .ok_or_else(|| LifecycleError::Validation(format!("物料不存在: {}", line.item_id)))?;

        let lot_id = lot_id_for(receipt_id, line.line_no);
        if item.requires_qc {
            let template = Self::template_for(&item, ctx)?;
            let inspection = QcInspection::draft(
                inspection_id_for(receipt_id, line.line_no),
                &template,
                &item.item_id,
                &line.lot_number,
                InspectionSource::Receipt {
                    receipt_id: receipt_id.to_string(),
                    line_no: line.line_no,
                },
                ctx.now,
            );
            line.qc_status = LineQcStatus::Pending;
            line.inspection_id = Some(inspection.inspection_id.clone());
            line.accepted_qty = 0.0;
            line.rejected_qty = 0.0;
            effects.push(SideEffect::InspectionSpawned(inspection));
        } else {
            line.qc_status = LineQcStatus::NotRequired;
            line.accepted_qty = line.qty;
            line.rejected_qty = 0.0;
        }

        let status = if item.requires_qc {
            LotStatus::Quarantine
        } else {
            LotStatus::Available
        };
        let exp_date = item
            .resolve_expiry(line.exp_date, line.mfg_date)
            .map_err(|e| LifecycleError::Validation(format!("收货行 {}: {}", line.line_no, e)))?;
        line.lot_id = Some(lot_id.clone());
        effects.push(SideEffect::LotCreated(Lot {
            lot_id,
            item_id: line.item_id.clone(),
            warehouse_id: line.warehouse_id.clone(),
            lot_number: line.lot_number.clone(),
            qty: line.qty,
            mfg_date: line.mfg_date,
            exp_date,
            status,
            source_ref: Some(receipt_id.to_string()),
            received_at: ctx.now,
            updated_at: ctx.now,
        }));
        Ok(())
    }

    fn template_for(item: &Item, ctx: &ReceiptContext<'_>) -> Result<QcTemplate, LifecycleError> {
        let template_id = item.qc_template_id.as_deref().ok_or_else(|| {
            LifecycleError::Validation(format!("物料 {} 需检但未配置质检模板", item.item_id))
        })?;
        ctx.templates
            .find(template_id)?
            .ok_or_else(|| LifecycleError::Validation(format!("质检模板不存在: {}", template_id)))
    }
}
