// ==========================================
// 食品批次质控核心 - 物料主数据
// ==========================================
// 用途: 只读输入;库存阈值由外部库存管理维护
// ==========================================

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 保质期推算超出日期可表示范围
#[derive(Error, Debug, Clone, PartialEq)]
#[error("物料 {item_id} 的保质期 {shelf_life_days} 天无法从 {mfg_date} 推算效期")]
pub struct ShelfLifeOverflow {
    pub item_id: String,
    pub mfg_date: NaiveDate,
    pub shelf_life_days: i64,
}

// ==========================================
// Item - 物料
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: String,
    pub item_name: String,
    pub uom: String, // 计量单位

    // ===== 批次/质检属性 =====
    pub has_batch: bool,
    pub has_expiry: bool,
    pub requires_qc: bool,
    pub qc_template_id: Option<String>, // requires_qc 时收货/产出使用的质检模板

    // ===== 库存阈值 =====
    pub min_stock: f64,
    pub max_stock: Option<f64>,
    pub reorder_point: f64,

    pub shelf_life_days: Option<i64>,
}

impl Item {
    /// 最简物料定义 (无质检、无效期)
    pub fn new(item_id: impl Into<String>, item_name: impl Into<String>, uom: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            item_name: item_name.into(),
            uom: uom.into(),
            has_batch: true,
            has_expiry: false,
            requires_qc: false,
            qc_template_id: None,
            min_stock: 0.0,
            max_stock: None,
            reorder_point: 0.0,
            shelf_life_days: None,
        }
    }

    /// 按生产日期推算效期
    ///
    /// 仅当 has_expiry 且配置了 shelf_life_days 时返回 Some;
    /// 保质期为负或结果越出日期范围时返回错误
    pub fn expiry_for(&self, mfg_date: NaiveDate) -> Result<Option<NaiveDate>, ShelfLifeOverflow> {
        let days = match self.shelf_life_days {
            Some(days) if self.has_expiry => days,
            _ => return Ok(None),
        };
        let overflow = || ShelfLifeOverflow {
            item_id: self.item_id.clone(),
            mfg_date,
            shelf_life_days: days,
        };
        if days < 0 {
            return Err(overflow());
        }
        Duration::try_days(days)
            .and_then(|d| mfg_date.checked_add_signed(d))
            .map(Some)
            .ok_or_else(overflow)
    }

    /// 显式效期优先,否则按生产日期推算
    pub fn resolve_expiry(
        &self,
        exp_date: Option<NaiveDate>,
        mfg_date: Option<NaiveDate>,
    ) -> Result<Option<NaiveDate>, ShelfLifeOverflow> {
        match (exp_date, mfg_date) {
            (Some(exp), _) => Ok(Some(exp)),
            (None, Some(mfg)) => self.expiry_for(mfg),
            (None, None) => Ok(None),
        }
    }
}
