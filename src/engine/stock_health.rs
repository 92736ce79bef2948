// ==========================================
// 食品批次质控核心 - 库存健康度
// ==========================================
// 职责: 近效期 / 已过期 / 补货预警 (纯函数)
// 口径: 在库量 = AVAILABLE 且未过期批次的余量
// ==========================================

use crate::domain::{Item, Lot, LotStatus, QTY_EPSILON};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiryAlert {
    pub lot_id: String,
    pub item_id: String,
    pub warehouse_id: String,
    pub lot_number: String,
    pub qty: f64,
    pub exp_date: NaiveDate,
    pub days_to_expiry: i64, // 已过期为负数
}

impl ExpiryAlert {
    fn from_lot(lot: &Lot, exp_date: NaiveDate, as_of: NaiveDate) -> Self {
        Self {
            lot_id: lot.lot_id.clone(),
            item_id: lot.item_id.clone(),
            warehouse_id: lot.warehouse_id.clone(),
            lot_number: lot.lot_number.clone(),
            qty: lot.qty,
            exp_date,
            days_to_expiry: (exp_date - as_of).num_days(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReorderLevel {
    /// 低于安全库存
    BelowMin,
    /// 触及再订货点
    Reorder,
    /// 超出最高库存
    Overstock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReorderAlert {
    pub item_id: String,
    pub on_hand: f64,
    pub level: ReorderLevel,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockHealthReport {
    pub as_of: NaiveDate,
    pub near_expiry_days: i64,
    pub near_expiry: Vec<ExpiryAlert>,
    pub expired: Vec<ExpiryAlert>,
    pub reorder_alerts: Vec<ReorderAlert>,
}

pub struct StockHealthEngine;

impl StockHealthEngine {
    /// 近效期批次: AVAILABLE、未过期、exp ≤ as_of + days,按效期升序
    pub fn near_expiry(lots: &[Lot], as_of: NaiveDate, days: i64) -> Vec<ExpiryAlert> {
        // 窗口越出日期范围时截到最大日期
        let horizon = Duration::try_days(days.max(0))
            .and_then(|d| as_of.checked_add_signed(d))
            .unwrap_or(NaiveDate::MAX);
        let mut alerts: Vec<ExpiryAlert> = lots
            .iter()
            .filter(|lot| lot.status == LotStatus::Available && !lot.is_depleted())
            .filter_map(|lot| match lot.exp_date {
                Some(exp) if exp >= as_of && exp <= horizon => Some(ExpiryAlert::from_lot(lot, exp, as_of)),
                _ => None,
            })
            .collect();
        alerts.sort_by(|a, b| a.exp_date.cmp(&b.exp_date).then_with(|| a.lot_id.cmp(&b.lot_id)));
        alerts
    }

    /// 已过期且仍有余量的批次 (任意状态),按效期升序
    pub fn expired(lots: &[Lot], as_of: NaiveDate) -> Vec<ExpiryAlert> {
        let mut alerts: Vec<ExpiryAlert> = lots
            .iter()
            .filter(|lot| !lot.is_depleted())
            .filter_map(|lot| match lot.exp_date {
                Some(exp) if exp < as_of => Some(ExpiryAlert::from_lot(lot, exp, as_of)),
                _ => None,
            })
            .collect();
        alerts.sort_by(|a, b| a.exp_date.cmp(&b.exp_date).then_with(|| a.lot_id.cmp(&b.lot_id)));
        alerts
    }

    /// 按物料汇总在库量
    pub fn on_hand(lots: &[Lot], as_of: NaiveDate) -> HashMap<String, f64> {
        let mut totals: HashMap<String, f64> = HashMap::new();
        for lot in lots.iter().filter(|lot| lot.is_fefo_eligible(as_of)) {
            *totals.entry(lot.item_id.clone()).or_insert(0.0) += lot.qty;
        }
        totals
    }

    /// 补货预警
    ///
    /// # 规则
    /// 1. on_hand < min_stock → BELOW_MIN
    /// 2. 否则 reorder_point > 0 且 on_hand ≤ reorder_point → REORDER
    /// 3. max_stock 已配置且 on_hand > max_stock → OVERSTOCK
    pub fn reorder_alerts(items: &[Item], on_hand: &HashMap<String, f64>) -> Vec<ReorderAlert> {
        let mut alerts = Vec::new();
        for item in items {
            let qty = on_hand.get(&item.item_id).copied().unwrap_or(0.0);
            let alert = |level, threshold| ReorderAlert {
                item_id: item.item_id.clone(),
                on_hand: qty,
                level,
                threshold,
            };

            if qty + QTY_EPSILON < item.min_stock {
                alerts.push(alert(ReorderLevel::BelowMin, item.min_stock));
            } else if item.reorder_point > 0.0 && qty <= item.reorder_point + QTY_EPSILON {
                alerts.push(alert(ReorderLevel::Reorder, item.reorder_point));
            }
            if let Some(max) = item.max_stock {
                if qty > max + QTY_EPSILON {
                    alerts.push(alert(ReorderLevel::Overstock, max));
                }
            }
        }
        alerts
    }

    pub fn report(items: &[Item], lots: &[Lot], as_of: NaiveDate, near_expiry_days: i64) -> StockHealthReport {
        let on_hand = Self::on_hand(lots, as_of);
        StockHealthReport {
            as_of,
            near_expiry_days,
            near_expiry: Self::near_expiry(lots, as_of, near_expiry_days),
            expired: Self::expired(lots, as_of),
            reorder_alerts: Self::reorder_alerts(items, &on_hand),
        }
    }
}
