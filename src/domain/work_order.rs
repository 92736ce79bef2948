// ==========================================
// 食品批次质控核心 - 生产工单领域模型
// ==========================================
// 红线: WorkOrder.ccp_status 为派生值,不存储
// 红线: JobCard 完工 ⇒ 非 CCP 或 ccp_status = PASSED
// ==========================================

use crate::domain::aggregate::Aggregate;
use crate::domain::types::{CcpStatus, JobCardStatus, WorkOrderStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// CcpCriteria - 工序级关键控制点判定标准
// ==========================================
// 来自配方/工艺定义: 温度 >= min_temp 且保温时长 >= holding_time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CcpCriteria {
    pub min_temp: Option<f64>,     // ℃
    pub holding_time: Option<f64>, // 秒
}

// ==========================================
// CcpReading - 关键控制点读数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CcpReading {
    pub temperature: Option<f64>,
    pub holding_time: Option<f64>,
    pub passed: bool,
    pub recorded_at: DateTime<Utc>,
}

// ==========================================
// JobCard - 工序卡
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCard {
    pub sequence: u32,
    pub operation: String,
    pub status: JobCardStatus,
    pub is_ccp: bool,
    pub ccp_criteria: Option<CcpCriteria>,
    pub ccp_status: CcpStatus,
    #[serde(default)]
    pub ccp_readings: Vec<CcpReading>,
    pub planned_qty: f64,
    pub completed_qty: f64,
}

impl JobCard {
    /// 普通工序
    pub fn new(sequence: u32, operation: impl Into<String>, planned_qty: f64) -> Self {
        Self {
            sequence,
            operation: operation.into(),
            status: JobCardStatus::Pending,
            is_ccp: false,
            ccp_criteria: None,
            ccp_status: CcpStatus::NotRequired,
            ccp_readings: Vec::new(),
            planned_qty,
            completed_qty: 0.0,
        }
    }

    /// 关键控制点工序 (ccp_status 初始为 PENDING)
    pub fn ccp(sequence: u32, operation: impl Into<String>, planned_qty: f64, criteria: CcpCriteria) -> Self {
        Self {
            is_ccp: true,
            ccp_criteria: Some(criteria),
            ccp_status: CcpStatus::Pending,
            ..Self::new(sequence, operation, planned_qty)
        }
    }

    /// CCP 门控是否放行 (非 CCP 工序恒放行)
    pub fn ccp_cleared(&self) -> bool {
        !self.is_ccp || self.ccp_status == CcpStatus::Passed
    }
}

// ==========================================
// MaterialRequirement - 物料需求 (BOM 行)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialRequirement {
    pub item_id: String,
    pub warehouse_id: String,
    pub qty_per_unit: f64,
}

impl MaterialRequirement {
    /// 按计划产量计算需求量
    pub fn required_for(&self, planned_qty: f64) -> f64 {
        self.qty_per_unit * planned_qty
    }
}

// ==========================================
// WorkOrder - 生产工单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub work_order_id: String,
    pub product_item_id: String,
    pub planned_qty: f64,
    pub status: WorkOrderStatus,
    #[serde(default)]
    pub materials: Vec<MaterialRequirement>,
    /// 按 sequence 升序
    #[serde(default)]
    pub job_cards: Vec<JobCard>,
    pub output_warehouse_id: Option<String>,
    pub output_lot_id: Option<String>,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkOrder {
    pub fn new(
        work_order_id: impl Into<String>,
        product_item_id: impl Into<String>,
        planned_qty: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            work_order_id: work_order_id.into(),
            product_item_id: product_item_id.into(),
            planned_qty,
            status: WorkOrderStatus::Draft,
            materials: Vec::new(),
            job_cards: Vec::new(),
            output_warehouse_id: None,
            output_lot_id: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// 追加工序卡并保持 sequence 有序
    pub fn with_job_card(mut self, card: JobCard) -> Self {
        self.job_cards.push(card);
        self.job_cards.sort_by_key(|c| c.sequence);
        self
    }

    pub fn with_material(mut self, requirement: MaterialRequirement) -> Self {
        self.materials.push(requirement);
        self
    }

    /// 工单级 CCP 状态 (派生)
    ///
    /// # 规则
    /// 1. 无 CCP 工序 → NOT_REQUIRED
    /// 2. 任一 CCP 工序 FAILED → FAILED
    /// 3. 任一 CCP 工序未判定 (PENDING,或标记为 CCP 却是 NOT_REQUIRED) → PENDING
    /// 4. 否则 → PASSED
    pub fn ccp_status(&self) -> CcpStatus {
        let ccp_cards: Vec<&JobCard> = self.job_cards.iter().filter(|c| c.is_ccp).collect();
        if ccp_cards.is_empty() {
            return CcpStatus::NotRequired;
        }
        if ccp_cards.iter().any(|c| c.ccp_status == CcpStatus::Failed) {
            return CcpStatus::Failed;
        }
        if ccp_cards.iter().any(|c| c.ccp_status != CcpStatus::Passed) {
            return CcpStatus::Pending;
        }
        CcpStatus::Passed
    }

    pub fn job_card(&self, sequence: u32) -> Option<&JobCard> {
        self.job_cards.iter().find(|c| c.sequence == sequence)
    }

    /// 按 sequence 排序后的前一道工序
    pub fn prior_job_card(&self, sequence: u32) -> Option<&JobCard> {
        self.job_cards
            .iter()
            .filter(|c| c.sequence < sequence)
            .max_by_key(|c| c.sequence)
    }

    pub(crate) fn job_card_mut(&mut self, sequence: u32) -> Option<&mut JobCard> {
        self.job_cards.iter_mut().find(|c| c.sequence == sequence)
    }

    /// 产出数量: sequence 最大的工序完工数,无工序时取计划数
    pub fn output_qty(&self) -> f64 {
        self.job_cards
            .iter()
            .max_by_key(|c| c.sequence)
            .map(|c| c.completed_qty)
            .unwrap_or(self.planned_qty)
    }
}

impl Aggregate for WorkOrder {
    const KIND: &'static str = "work_order";

    fn aggregate_id(&self) -> &str {
        &self.work_order_id
    }

    fn revision(&self) -> i64 {
        self.revision
    }

    fn set_revision(&mut self, revision: i64) {
        self.revision = revision;
    }
}
