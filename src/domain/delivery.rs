// ==========================================
// 食品批次质控核心 - 发货/冷链领域模型
// ==========================================
// 红线: cold_chain_compliant 一旦为 false 不自动恢复
// ==========================================

use crate::domain::aggregate::Aggregate;
use crate::domain::types::DeliveryStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ColdChainRange - 品类温控区间 (闭区间, ℃)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColdChainRange {
    pub min_c: f64,
    pub max_c: f64,
}

impl ColdChainRange {
    pub fn contains(&self, celsius: f64) -> bool {
        celsius >= self.min_c && celsius <= self.max_c
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub recorded_at: DateTime<Utc>,
    pub celsius: f64,
}

/// 温度日志统计
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureStats {
    pub min_c: f64,
    pub max_c: f64,
    pub avg_c: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryLine {
    pub item_id: String,
    pub lot_id: String,
    pub qty: f64,
}

// ==========================================
// DeliveryNote - 发货单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryNote {
    pub delivery_id: String,
    pub customer_id: String,
    pub product_category: String, // 决定温控区间 (CHILLED/FROZEN/AMBIENT)
    pub status: DeliveryStatus,
    #[serde(default)]
    pub lines: Vec<DeliveryLine>,
    #[serde(default)]
    pub temperature_log: Vec<TemperatureReading>,
    pub cold_chain_compliant: bool,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryNote {
    pub fn new(
        delivery_id: impl Into<String>,
        customer_id: impl Into<String>,
        product_category: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            delivery_id: delivery_id.into(),
            customer_id: customer_id.into(),
            product_category: product_category.into(),
            status: DeliveryStatus::Pending,
            lines: Vec::new(),
            temperature_log: Vec::new(),
            cold_chain_compliant: true,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_line(mut self, line: DeliveryLine) -> Self {
        self.lines.push(line);
        self
    }

    /// min/max/avg,无记录时为 None
    pub fn temperature_stats(&self) -> Option<TemperatureStats> {
        if self.temperature_log.is_empty() {
            return None;
        }
        let count = self.temperature_log.len();
        let mut min_c = f64::INFINITY;
        let mut max_c = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for reading in &self.temperature_log {
            min_c = min_c.min(reading.celsius);
            max_c = max_c.max(reading.celsius);
            sum += reading.celsius;
        }
        Some(TemperatureStats {
            min_c,
            max_c,
            avg_c: sum / count as f64,
            count,
        })
    }
}

impl Aggregate for DeliveryNote {
    const KIND: &'static str = "delivery_note";

    fn aggregate_id(&self) -> &str {
        &self.delivery_id
    }

    fn revision(&self) -> i64 {
        self.revision
    }

    fn set_revision(&mut self, revision: i64) {
        self.revision = revision;
    }
}
