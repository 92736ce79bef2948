// ==========================================
// 食品批次质控核心 - 质检规则引擎
// ==========================================
// 职责: 按模板参数判定采样读数,输出单项/汇总结果与 CCP 偏差
// 红线: 纯函数,不做 I/O
// 说明: 状态下传 (收货行/批次/工序卡) 由生命周期层完成
// ==========================================

use crate::domain::{
    InspectionResult, InspectionStatus, QcParameter, QcParameterType, QcReading, QcTemplate,
    ReadingOutcome, ReadingResult,
};
use std::collections::HashMap;
use thiserror::Error;

/// 读数输入校验错误 (在任何状态变更之前拒绝)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QcValidationError {
    #[error("质检模板没有任何参数: template_id={template_id}")]
    EmptyTemplate { template_id: String },

    #[error("读数引用了模板中不存在的参数: template_id={template_id}, parameter_id={parameter_id}")]
    UnknownParameter {
        template_id: String,
        parameter_id: String,
    },

    #[error("同一参数存在多条读数: parameter_id={parameter_id}")]
    DuplicateReading { parameter_id: String },

    #[error("读数类型与参数类型不符: parameter_id={parameter_id}, expected={expected}")]
    TypeMismatch {
        parameter_id: String,
        expected: QcParameterType,
    },

    #[error("数值读数非有限值: parameter_id={parameter_id}")]
    NonFiniteValue { parameter_id: String },
}

// ==========================================
// QcRuleEngine - 纯函数工具类
// ==========================================
pub struct QcRuleEngine;

impl QcRuleEngine {
    /// 评估一次质检
    ///
    /// # 规则
    /// - 每个模板参数输出一条结果 (模板顺序);缺读数 → PENDING
    /// - 汇总: 任一 FAIL → FAILED;无任何已判定项 → DRAFT;
    ///   全部 PASS → PASSED;否则 → IN_PROGRESS
    /// - is_ccp: 有读数时看已录参数,无读数时看整个模板
    ///
    /// # 错误
    /// - 读数引用未知参数 / 重复 / 类型不符 / 非有限数值
    pub fn evaluate(
        template: &QcTemplate,
        readings: &[QcReading],
    ) -> Result<InspectionResult, QcValidationError> {
        if template.parameters.is_empty() {
            return Err(QcValidationError::EmptyTemplate {
                template_id: template.template_id.clone(),
            });
        }

        let by_parameter = Self::index_readings(template, readings)?;

        let reading_results: Vec<ReadingResult> = template
            .parameters
            .iter()
            .map(|param| ReadingResult {
                parameter_id: param.parameter_id.clone(),
                outcome: by_parameter
                    .get(param.parameter_id.as_str())
                    .map(|reading| Self::evaluate_reading(param, reading))
                    .unwrap_or(ReadingOutcome::Pending),
                is_critical: param.is_critical,
            })
            .collect();

        let aggregate_status = Self::aggregate_status(&reading_results);

        let is_ccp = if by_parameter.is_empty() {
            template.has_critical_parameters()
        } else {
            template
                .parameters
                .iter()
                .any(|p| p.is_critical && by_parameter.contains_key(p.parameter_id.as_str()))
        };

        let ccp_deviations = reading_results
            .iter()
            .filter(|r| r.is_critical && r.outcome == ReadingOutcome::Fail)
            .map(|r| r.parameter_id.clone())
            .collect();

        let is_complete = reading_results
            .iter()
            .all(|r| r.outcome != ReadingOutcome::Pending);

        Ok(InspectionResult {
            reading_results,
            aggregate_status,
            is_ccp,
            is_complete,
            ccp_deviations,
        })
    }

    /// 校验并按参数建立读数索引
    fn index_readings<'a>(
        template: &QcTemplate,
        readings: &'a [QcReading],
    ) -> Result<HashMap<&'a str, &'a QcReading>, QcValidationError> {
        let mut by_parameter: HashMap<&str, &QcReading> = HashMap::with_capacity(readings.len());

        for reading in readings {
            let param = template.parameter(&reading.parameter_id).ok_or_else(|| {
                QcValidationError::UnknownParameter {
                    template_id: template.template_id.clone(),
                    parameter_id: reading.parameter_id.clone(),
                }
            })?;

            let type_ok = match param.param_type {
                QcParameterType::Numeric => reading.acceptance_value.is_none(),
                QcParameterType::Acceptance => reading.numeric_value.is_none(),
            };
            if !type_ok {
                return Err(QcValidationError::TypeMismatch {
                    parameter_id: reading.parameter_id.clone(),
                    expected: param.param_type,
                });
            }

            if matches!(reading.numeric_value, Some(v) if !v.is_finite()) {
                return Err(QcValidationError::NonFiniteValue {
                    parameter_id: reading.parameter_id.clone(),
                });
            }

            if by_parameter
                .insert(reading.parameter_id.as_str(), reading)
                .is_some()
            {
                return Err(QcValidationError::DuplicateReading {
                    parameter_id: reading.parameter_id.clone(),
                });
            }
        }

        Ok(by_parameter)
    }

    /// 判定单条读数 (类型已校验)
    pub fn evaluate_reading(param: &QcParameter, reading: &QcReading) -> ReadingOutcome {
        match param.param_type {
            QcParameterType::Numeric => match reading.numeric_value {
                Some(value) => Self::outcome(Self::check_numeric(value, param.min_value, param.max_value)),
                None => ReadingOutcome::Pending,
            },
            QcParameterType::Acceptance => match reading.acceptance_value.as_deref() {
                // 空串视为未录入
                Some(value) if !value.is_empty() => {
                    Self::outcome(Self::check_acceptance(value, &param.acceptable_values))
                }
                _ => ReadingOutcome::Pending,
            },
        }
    }

    /// 数值判定: 闭区间,未设置的边界不约束
    pub fn check_numeric(value: f64, min_value: Option<f64>, max_value: Option<f64>) -> bool {
        min_value.map_or(true, |min| value >= min) && max_value.map_or(true, |max| value <= max)
    }

    /// 判定值判定: 精确匹配,区分大小写
    pub fn check_acceptance(value: &str, acceptable_values: &[String]) -> bool {
        acceptable_values.iter().any(|v| v == value)
    }

    /// 汇总状态
    pub fn aggregate_status(results: &[ReadingResult]) -> InspectionStatus {
        if results.iter().any(|r| r.outcome == ReadingOutcome::Fail) {
            return InspectionStatus::Failed;
        }
        let decided = results
            .iter()
            .filter(|r| r.outcome == ReadingOutcome::Pass)
            .count();
        if decided == 0 {
            InspectionStatus::Draft
        } else if decided == results.len() {
            InspectionStatus::Passed
        } else {
            InspectionStatus::InProgress
        }
    }

    fn outcome(pass: bool) -> ReadingOutcome {
        if pass {
            ReadingOutcome::Pass
        } else {
            ReadingOutcome::Fail
        }
    }
}
