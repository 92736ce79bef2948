// ==========================================
// 食品批次质控核心 - 质检领域模型
// ==========================================
// 职责: 质检模板 / 读数 / 质检单 / 评估结果
// 红线: 质检单状态只能由读数计算得出
// ==========================================

use crate::domain::aggregate::Aggregate;
use crate::domain::types::{InspectionStatus, QcParameterType, ReadingOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// QcParameter - 模板参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcParameter {
    pub parameter_id: String,
    pub name: String,
    pub param_type: QcParameterType,
    pub min_value: Option<f64>,          // NUMERIC 下限(含)
    pub max_value: Option<f64>,          // NUMERIC 上限(含)
    #[serde(default)]
    pub acceptable_values: Vec<String>,  // ACCEPTANCE 可接受值(区分大小写)
    pub is_critical: bool,               // 关键控制点
    pub uom: Option<String>,
}

impl QcParameter {
    pub fn numeric(
        parameter_id: impl Into<String>,
        min_value: Option<f64>,
        max_value: Option<f64>,
        is_critical: bool,
    ) -> Self {
        let parameter_id = parameter_id.into();
        Self {
            name: parameter_id.clone(),
            parameter_id,
            param_type: QcParameterType::Numeric,
            min_value,
            max_value,
            acceptable_values: Vec::new(),
            is_critical,
            uom: None,
        }
    }

    pub fn acceptance(
        parameter_id: impl Into<String>,
        acceptable_values: Vec<String>,
        is_critical: bool,
    ) -> Self {
        let parameter_id = parameter_id.into();
        Self {
            name: parameter_id.clone(),
            parameter_id,
            param_type: QcParameterType::Acceptance,
            min_value: None,
            max_value: None,
            acceptable_values,
            is_critical,
            uom: None,
        }
    }
}

// ==========================================
// QcTemplate - 质检模板
// ==========================================
// 版本化,只读;修改即发布新 template_id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcTemplate {
    pub template_id: String,
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub applies_to: Vec<String>, // 适用物料
    pub parameters: Vec<QcParameter>,
    #[serde(default)]
    pub revision: i64,
}

impl QcTemplate {
    pub fn parameter(&self, parameter_id: &str) -> Option<&QcParameter> {
        self.parameters.iter().find(|p| p.parameter_id == parameter_id)
    }

    /// 模板中是否存在关键控制点参数 (评估前检查用)
    pub fn has_critical_parameters(&self) -> bool {
        self.parameters.iter().any(|p| p.is_critical)
    }
}

impl Aggregate for QcTemplate {
    const KIND: &'static str = "qc_template";

    fn aggregate_id(&self) -> &str {
        &self.template_id
    }

    fn revision(&self) -> i64 {
        self.revision
    }

    fn set_revision(&mut self, revision: i64) {
        self.revision = revision;
    }
}

// ==========================================
// QcReading - 采样读数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcReading {
    pub parameter_id: String,
    pub numeric_value: Option<f64>,
    pub acceptance_value: Option<String>,
}

impl QcReading {
    pub fn numeric(parameter_id: impl Into<String>, value: f64) -> Self {
        Self {
            parameter_id: parameter_id.into(),
            numeric_value: Some(value),
            acceptance_value: None,
        }
    }

    pub fn acceptance(parameter_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            parameter_id: parameter_id.into(),
            numeric_value: None,
            acceptance_value: Some(value.into()),
        }
    }
}

// ==========================================
// 评估结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingResult {
    pub parameter_id: String,
    pub outcome: ReadingOutcome,
    pub is_critical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionResult {
    /// 按模板参数顺序,每个参数一条
    pub reading_results: Vec<ReadingResult>,
    pub aggregate_status: InspectionStatus,
    pub is_ccp: bool,
    /// 无 PENDING 项;不完整的质检单不可提交
    pub is_complete: bool,
    /// 判定为 FAIL 的关键控制点参数
    pub ccp_deviations: Vec<String>,
}

// ==========================================
// 质检来源
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InspectionSource {
    Receipt { receipt_id: String, line_no: u32 },
    Production { work_order_id: String },
}

// ==========================================
// QcInspection - 质检单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcInspection {
    pub inspection_id: String,
    pub template_id: String,
    pub item_id: String,
    pub batch_no: String,
    pub source: InspectionSource,
    pub readings: Vec<QcReading>,
    pub reading_results: Vec<ReadingResult>,
    pub status: InspectionStatus,
    pub is_ccp: bool,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QcInspection {
    /// 新建草稿质检单 (尚无读数)
    pub fn draft(
        inspection_id: impl Into<String>,
        template: &QcTemplate,
        item_id: impl Into<String>,
        batch_no: impl Into<String>,
        source: InspectionSource,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            inspection_id: inspection_id.into(),
            template_id: template.template_id.clone(),
            item_id: item_id.into(),
            batch_no: batch_no.into(),
            source,
            readings: Vec::new(),
            reading_results: Vec::new(),
            status: InspectionStatus::Draft,
            is_ccp: template.has_critical_parameters(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// 写入读数及其评估结果
    ///
    /// 状态随结果一同落地,保证 status 与 readings 一致。
    /// 读数未齐时检验保持开放: 已有判定为 IN_PROGRESS,否则仍为 DRAFT
    pub fn apply_result(&mut self, readings: Vec<QcReading>, result: &InspectionResult, now: DateTime<Utc>) {
        self.readings = readings;
        self.reading_results = result.reading_results.clone();
        self.status = if result.is_complete {
            result.aggregate_status
        } else if result.aggregate_status == InspectionStatus::Draft {
            InspectionStatus::Draft
        } else {
            InspectionStatus::InProgress
        };
        self.is_ccp = result.is_ccp;
        self.updated_at = now;
    }
}

impl Aggregate for QcInspection {
    const KIND: &'static str = "qc_inspection";

    fn aggregate_id(&self) -> &str {
        &self.inspection_id
    }

    fn revision(&self) -> i64 {
        self.revision
    }

    fn set_revision(&mut self, revision: i64) {
        self.revision = revision;
    }
}
