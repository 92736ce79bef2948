// ==========================================
// 食品批次质控核心 - 批次台账模型
// ==========================================
// 约束: qty >= 0;qty 归零的批次保留(可追溯),不删除
// 约束: exp_date 为空表示不过期
// ==========================================

use crate::domain::types::LotStatus;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 数量比较容差
pub const QTY_EPSILON: f64 = 1e-9;

// ==========================================
// Lot - 批次
// ==========================================
// 台账单元: (item, warehouse, lot_number, status)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub lot_id: String,
    pub item_id: String,
    pub warehouse_id: String,
    pub lot_number: String,
    pub qty: f64,
    pub mfg_date: Option<NaiveDate>,
    pub exp_date: Option<NaiveDate>,
    pub status: LotStatus,
    pub source_ref: Option<String>, // 来源单据 (收货单/工单)
    pub received_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lot {
    /// 截至 as_of 是否已过期 (效期当天仍可用)
    pub fn is_expired(&self, as_of: NaiveDate) -> bool {
        matches!(self.exp_date, Some(exp) if exp < as_of)
    }

    /// FEFO 准入: AVAILABLE 且未过期且有余量
    pub fn is_fefo_eligible(&self, as_of: NaiveDate) -> bool {
        self.status == LotStatus::Available && !self.is_expired(as_of) && !self.is_depleted()
    }

    pub fn is_depleted(&self) -> bool {
        self.qty <= QTY_EPSILON
    }

    /// 次级排序键: 生产日期,缺失时退回收货日期
    pub fn age_key(&self) -> NaiveDate {
        self.mfg_date.unwrap_or_else(|| self.received_at.date_naive())
    }
}

// ==========================================
// LotDraw - 单批次扣减指令
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotDraw {
    pub lot_id: String,
    pub qty: f64,
}

// ==========================================
// Allocation - 分配结果行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub lot_id: String,
    pub lot_number: String,
    pub qty: f64,
    pub exp_date: Option<NaiveDate>,
}

impl Allocation {
    pub fn to_draw(&self) -> LotDraw {
        LotDraw {
            lot_id: self.lot_id.clone(),
            qty: self.qty,
        }
    }
}

/// 台账提交结果
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// 全部扣减已提交
    Committed,
    /// 某批次余量/状态已被并发修改,整单回滚
    Conflict { lot_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(exp: Option<NaiveDate>, status: LotStatus, qty: f64) -> Lot {
        Lot {
            lot_id: "L1".to_string(),
            item_id: "FLOUR".to_string(),
            warehouse_id: "WH1".to_string(),
            lot_number: "B-001".to_string(),
            qty,
            mfg_date: None,
            exp_date: exp,
            status,
            source_ref: None,
            received_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_expiry_day_itself_is_usable() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        let l = lot(Some(today), LotStatus::Available, 5.0);
        assert!(!l.is_expired(today));
        assert!(l.is_fefo_eligible(today));
        assert!(l.is_expired(today.succ_opt().unwrap()));
    }

    #[test]
    fn test_non_available_or_empty_lot_not_eligible() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(!lot(None, LotStatus::Quarantine, 5.0).is_fefo_eligible(today));
        assert!(!lot(None, LotStatus::OnHold, 5.0).is_fefo_eligible(today));
        assert!(!lot(None, LotStatus::Reserved, 5.0).is_fefo_eligible(today));
        assert!(!lot(None, LotStatus::Available, 0.0).is_fefo_eligible(today));
        assert!(lot(None, LotStatus::Available, 0.5).is_fefo_eligible(today));
    }
}
