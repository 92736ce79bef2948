// ==========================================
// 食品批次质控核心 - 采购收货领域模型
// ==========================================
// 红线: 收货单 qc_status 由收货行汇总,不存储
// 红线: 收货单完工 ⇒ qc_status ≠ PENDING
// ==========================================

use crate::domain::aggregate::Aggregate;
use crate::domain::types::{LineQcStatus, ReceiptQcStatus, ReceiptStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ReceiptLine - 收货行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub line_no: u32,
    pub item_id: String,
    pub warehouse_id: String,
    pub lot_number: String,
    pub qty: f64,
    pub mfg_date: Option<NaiveDate>,
    pub exp_date: Option<NaiveDate>,
    pub qc_status: LineQcStatus,
    pub inspection_id: Option<String>,
    pub lot_id: Option<String>,
    pub accepted_qty: f64,
    pub rejected_qty: f64, // 不合格量单独记录,不阻塞单据关闭
}

impl ReceiptLine {
    pub fn new(
        line_no: u32,
        item_id: impl Into<String>,
        warehouse_id: impl Into<String>,
        lot_number: impl Into<String>,
        qty: f64,
    ) -> Self {
        Self {
            line_no,
            item_id: item_id.into(),
            warehouse_id: warehouse_id.into(),
            lot_number: lot_number.into(),
            qty,
            mfg_date: None,
            exp_date: None,
            qc_status: LineQcStatus::Pending,
            inspection_id: None,
            lot_id: None,
            accepted_qty: 0.0,
            rejected_qty: 0.0,
        }
    }

    pub fn with_dates(mut self, mfg_date: Option<NaiveDate>, exp_date: Option<NaiveDate>) -> Self {
        self.mfg_date = mfg_date;
        self.exp_date = exp_date;
        self
    }
}

// ==========================================
// PurchaseReceipt - 采购收货单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub receipt_id: String,
    pub supplier_id: String,
    pub status: ReceiptStatus,
    pub lines: Vec<ReceiptLine>,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseReceipt {
    pub fn new(receipt_id: impl Into<String>, supplier_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            receipt_id: receipt_id.into(),
            supplier_id: supplier_id.into(),
            status: ReceiptStatus::Draft,
            lines: Vec::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_line(mut self, line: ReceiptLine) -> Self {
        self.lines.push(line);
        self
    }

    /// 收货单汇总质检状态 (派生)
    ///
    /// # 规则
    /// 1. 全部 NOT_REQUIRED (含空单) → NOT_REQUIRED
    /// 2. 任一需检行 PENDING → PENDING
    /// 3. 无 FAILED → PASSED
    /// 4. 全部行 FAILED → FAILED
    /// 5. 其余 (FAILED 与 PASSED/NOT_REQUIRED 混合) → PARTIAL
    pub fn qc_status(&self) -> ReceiptQcStatus {
        if self.lines.iter().all(|l| l.qc_status == LineQcStatus::NotRequired) {
            return ReceiptQcStatus::NotRequired;
        }
        if self.lines.iter().any(|l| l.qc_status == LineQcStatus::Pending) {
            return ReceiptQcStatus::Pending;
        }
        let failed = self
            .lines
            .iter()
            .filter(|l| l.qc_status == LineQcStatus::Failed)
            .count();
        if failed == 0 {
            ReceiptQcStatus::Passed
        } else if failed == self.lines.len() {
            ReceiptQcStatus::Failed
        } else {
            ReceiptQcStatus::Partial
        }
    }

    pub fn line(&self, line_no: u32) -> Option<&ReceiptLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub(crate) fn line_mut(&mut self, line_no: u32) -> Option<&mut ReceiptLine> {
        self.lines.iter_mut().find(|l| l.line_no == line_no)
    }

    /// 重复出现的行号 (升序去重);行号决定批次与质检单 ID,必须唯一
    pub fn duplicate_line_numbers(&self) -> Vec<u32> {
        let mut line_nos: Vec<u32> = self.lines.iter().map(|l| l.line_no).collect();
        line_nos.sort_unstable();
        let mut duplicates: Vec<u32> = line_nos
            .windows(2)
            .filter(|w| w[0] == w[1])
            .map(|w| w[0])
            .collect();
        duplicates.dedup();
        duplicates
    }

    /// 仍待质检的行号
    pub fn pending_lines(&self) -> Vec<u32> {
        self.lines
            .iter()
            .filter(|l| l.qc_status == LineQcStatus::Pending)
            .map(|l| l.line_no)
            .collect()
    }
}

impl Aggregate for PurchaseReceipt {
    const KIND: &'static str = "purchase_receipt";

    fn aggregate_id(&self) -> &str {
        &self.receipt_id
    }

    fn revision(&self) -> i64 {
        self.revision
    }

    fn set_revision(&mut self, revision: i64) {
        self.revision = revision;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(statuses: &[LineQcStatus]) -> PurchaseReceipt {
        let mut r = PurchaseReceipt::new("PR-1", "SUP-1", Utc::now());
        for (i, s) in statuses.iter().enumerate() {
            let mut line = ReceiptLine::new(i as u32 + 1, "ITEM", "WH1", "LOT", 10.0);
            line.qc_status = *s;
            r.lines.push(line);
        }
        r
    }

    #[test]
    fn test_qc_status_aggregation() {
        use LineQcStatus::*;
        assert_eq!(receipt(&[]).qc_status(), ReceiptQcStatus::NotRequired);
        assert_eq!(receipt(&[NotRequired, NotRequired]).qc_status(), ReceiptQcStatus::NotRequired);
        assert_eq!(receipt(&[Passed, Pending]).qc_status(), ReceiptQcStatus::Pending);
        assert_eq!(receipt(&[Passed, NotRequired]).qc_status(), ReceiptQcStatus::Passed);
        assert_eq!(receipt(&[Failed, Failed]).qc_status(), ReceiptQcStatus::Failed);
        assert_eq!(receipt(&[Passed, Failed]).qc_status(), ReceiptQcStatus::Partial);
    }

    #[test]
    fn test_not_required_plus_failed_is_partial() {
        let r = receipt(&[LineQcStatus::NotRequired, LineQcStatus::Failed]);
        assert_eq!(r.qc_status(), ReceiptQcStatus::Partial);
    }
}
