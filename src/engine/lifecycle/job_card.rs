// ==========================================
// 食品批次质控核心 - 工序卡状态机
// ==========================================
// PENDING → IN_PROGRESS → {COMPLETED*, FAILED*}
// ==========================================
// 守卫: 开工 = 工单生产中 且 前道工序完工 且 前道 CCP 已通过
// 守卫: CCP 工序完工 = ccp_status PASSED
// CCP 读数不合格 → ccp_status FAILED,保持到纠偏复位 (ResetCcp)
// ==========================================

use super::{BlockingReason, EntityKind, LifecycleError, SideEffect, Transitioned};
use crate::domain::{CcpReading, CcpStatus, JobCard, JobCardStatus, WorkOrder, WorkOrderStatus};
use crate::engine::qc_rule_engine::QcRuleEngine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobCardAction {
    Start,
    RecordCcpReading {
        temperature: Option<f64>,
        holding_time: Option<f64>,
    },
    Complete {
        completed_qty: f64,
    },
    Fail,
    /// 纠偏复位: FAILED → PENDING,历史读数保留
    ResetCcp,
}

impl fmt::Display for JobCardAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobCardAction::Start => "START",
            JobCardAction::RecordCcpReading { .. } => "RECORD_CCP_READING",
            JobCardAction::Complete { .. } => "COMPLETE",
            JobCardAction::Fail => "FAIL",
            JobCardAction::ResetCcp => "RESET_CCP",
        };
        write!(f, "{}", s)
    }
}

pub struct JobCardMachine;

impl JobCardMachine {
    /// 工序卡流转 (以工单为聚合根整体返回)
    ///
    /// # 参数
    /// - `order`: 所属工单
    /// - `sequence`: 工序号
    /// - `action`: 动作
    pub fn transition(
        order: &WorkOrder,
        sequence: u32,
        action: &JobCardAction,
        now: DateTime<Utc>,
    ) -> Result<Transitioned<WorkOrder>, LifecycleError> {
        let card = order.job_card(sequence).ok_or_else(|| {
            LifecycleError::Validation(format!(
                "工单 {} 不存在工序 {}",
                order.work_order_id, sequence
            ))
        })?;
        let card_id = format!("{}#{}", order.work_order_id, sequence);
        let refuse = |reason: BlockingReason| LifecycleError::refused(EntityKind::JobCard, &card_id, action, reason);

        if order.status != WorkOrderStatus::InProgress {
            return Err(refuse(BlockingReason::WorkOrderNotInProgress {
                status: order.status.to_string(),
            }));
        }

        let mut next = order.clone();
        let mut effects = Vec::new();
        let updated = next.job_card_mut(sequence).ok_or_else(|| {
            LifecycleError::Validation(format!("工序 {} 不存在", sequence))
        })?;

        use JobCardStatus as S;
        match (card.status, action) {
            (S::Pending, JobCardAction::Start) => {
                if let Some(prior) = order.prior_job_card(sequence) {
                    if !prior.ccp_cleared() {
                        return Err(refuse(BlockingReason::PriorCcpNotPassed {
                            sequence: prior.sequence,
                        }));
                    }
                    if prior.status != S::Completed {
                        return Err(refuse(BlockingReason::PriorStepIncomplete {
                            sequence: prior.sequence,
                        }));
                    }
                }
                updated.status = S::InProgress;
            }
            (S::InProgress, JobCardAction::RecordCcpReading { temperature, holding_time }) => {
                if !card.is_ccp {
                    return Err(refuse(BlockingReason::NotCcpOperation { sequence }));
                }
                let reading = Self::evaluate_ccp(card, *temperature, *holding_time, now)?;
                if reading.passed {
                    // FAILED 需显式复位,合格读数不覆盖
                    if updated.ccp_status != CcpStatus::Failed {
                        updated.ccp_status = CcpStatus::Passed;
                    }
                } else {
                    updated.ccp_status = CcpStatus::Failed;
                    effects.push(SideEffect::CcpDeviation {
                        sequence,
                        reading: reading.clone(),
                    });
                }
                updated.ccp_readings.push(reading);
            }
            (S::InProgress, JobCardAction::Complete { completed_qty }) => {
                if !(completed_qty.is_finite() && *completed_qty >= 0.0) {
                    return Err(LifecycleError::Validation(format!(
                        "完工数量必须为非负有限值: {}",
                        completed_qty
                    )));
                }
                // 门控看 is_ccp,CCP 工序只有 PASSED 才放行
                if card.is_ccp {
                    match card.ccp_status {
                        CcpStatus::Passed => {}
                        CcpStatus::Failed => {
                            return Err(refuse(BlockingReason::CcpFailed {
                                sequences: vec![sequence],
                            }))
                        }
                        CcpStatus::Pending | CcpStatus::NotRequired => {
                            return Err(refuse(BlockingReason::CcpPending {
                                sequences: vec![sequence],
                            }))
                        }
                    }
                }
                updated.completed_qty = *completed_qty;
                updated.status = S::Completed;
            }
            (S::InProgress, JobCardAction::Fail) => {
                updated.status = S::Failed;
            }
            (S::InProgress, JobCardAction::ResetCcp) if card.is_ccp && card.ccp_status == CcpStatus::Failed => {
                updated.ccp_status = CcpStatus::Pending;
            }
            (S::Pending | S::InProgress | S::Completed | S::Failed, _) => {
                return Err(refuse(BlockingReason::NotPermitted {
                    status: card.status.to_string(),
                }));
            }
        }

        next.updated_at = now;
        Ok(Transitioned {
            entity: next,
            effects,
        })
    }

    /// CCP 读数判定: 温度 >= min_temp 且保温时长 >= holding_time
    fn evaluate_ccp(
        card: &JobCard,
        temperature: Option<f64>,
        holding_time: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<CcpReading, LifecycleError> {
        let (min_temp, min_holding) = card
            .ccp_criteria
            .as_ref()
            .map(|c| (c.min_temp, c.holding_time))
            .unwrap_or((None, None));

        let check = |name: &str, value: Option<f64>, min: Option<f64>| -> Result<bool, LifecycleError> {
            match (value, min) {
                (Some(v), _) if !v.is_finite() => Err(LifecycleError::Validation(format!("{} 读数非法: {}", name, v))),
                (Some(v), min) => Ok(QcRuleEngine::check_numeric(v, min, None)),
                (None, Some(_)) => Err(LifecycleError::Validation(format!("缺少 {} 读数", name))),
                (None, None) => Ok(true),
            }
        };

        let temp_ok = check("temperature", temperature, min_temp)?;
        let holding_ok = check("holding_time", holding_time, min_holding)?;
        Ok(CcpReading {
            temperature,
            holding_time,
            passed: temp_ok && holding_ok,
            recorded_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CcpCriteria;

    fn order() -> WorkOrder {
        let mut order = WorkOrder::new("WO-1", "YOGURT", 100.0, Utc::now())
            .with_job_card(JobCard::new(10, "MIX", 100.0))
            .with_job_card(JobCard::ccp(
                20,
                "PASTEURIZE",
                100.0,
                CcpCriteria {
                    min_temp: Some(72.0),
                    holding_time: Some(15.0),
                },
            ))
            .with_job_card(JobCard::new(30, "FILL", 100.0));
        order.status = WorkOrderStatus::InProgress;
        order
    }

    fn apply(order: &WorkOrder, sequence: u32, action: JobCardAction) -> Result<Transitioned<WorkOrder>, LifecycleError> {
        JobCardMachine::transition(order, sequence, &action, Utc::now())
    }

    fn reading(temperature: f64, holding_time: f64) -> JobCardAction {
        JobCardAction::RecordCcpReading {
            temperature: Some(temperature),
            holding_time: Some(holding_time),
        }
    }

    fn run_mix(order: &WorkOrder) -> WorkOrder {
        let o = apply(order, 10, JobCardAction::Start).unwrap().entity;
        apply(&o, 10, JobCardAction::Complete { completed_qty: 100.0 }).unwrap().entity
    }

    #[test]
    fn test_start_requires_prior_step_completed() {
        let o = order();
        let err = apply(&o, 20, JobCardAction::Start).unwrap_err();
        assert_eq!(
            err.as_refused().unwrap().reason,
            BlockingReason::PriorStepIncomplete { sequence: 10 }
        );
    }

    #[test]
    fn test_ccp_card_cannot_complete_before_passing_reading() {
        let o = run_mix(&order());
        let o = apply(&o, 20, JobCardAction::Start).unwrap().entity;

        let err = apply(&o, 20, JobCardAction::Complete { completed_qty: 99.0 }).unwrap_err();
        assert!(matches!(
            err.as_refused().unwrap().reason,
            BlockingReason::CcpPending { .. }
        ));

        let o = apply(&o, 20, reading(74.0, 15.0)).unwrap().entity;
        assert_eq!(o.job_card(20).unwrap().ccp_status, CcpStatus::Passed);
        let o = apply(&o, 20, JobCardAction::Complete { completed_qty: 99.0 }).unwrap().entity;
        assert_eq!(o.job_card(20).unwrap().status, JobCardStatus::Completed);
        assert_eq!(o.ccp_status(), CcpStatus::Passed);
    }

    #[test]
    fn test_ccp_card_marked_not_required_still_needs_reading() {
        let mut o = run_mix(&order());
        o.job_card_mut(20).unwrap().ccp_status = CcpStatus::NotRequired;
        let o = apply(&o, 20, JobCardAction::Start).unwrap().entity;

        let err = apply(&o, 20, JobCardAction::Complete { completed_qty: 99.0 }).unwrap_err();
        assert_eq!(
            err.as_refused().unwrap().reason,
            BlockingReason::CcpPending { sequences: vec![20] }
        );
        assert_eq!(o.ccp_status(), CcpStatus::Pending);
    }

    #[test]
    fn test_failed_reading_blocks_until_reset() {
        let o = run_mix(&order());
        let o = apply(&o, 20, JobCardAction::Start).unwrap().entity;

        let failed = apply(&o, 20, reading(70.0, 20.0)).unwrap();
        assert!(matches!(
            failed.effects.as_slice(),
            [SideEffect::CcpDeviation { sequence: 20, .. }]
        ));
        let o = failed.entity;
        assert_eq!(o.ccp_status(), CcpStatus::Failed);

        // 合格读数不能自行覆盖不合格
        let o = apply(&o, 20, reading(75.0, 20.0)).unwrap().entity;
        assert_eq!(o.job_card(20).unwrap().ccp_status, CcpStatus::Failed);
        let err = apply(&o, 20, JobCardAction::Complete { completed_qty: 99.0 }).unwrap_err();
        assert!(matches!(err.as_refused().unwrap().reason, BlockingReason::CcpFailed { .. }));

        // 下道工序同样被阻塞
        let err = apply(&o, 30, JobCardAction::Start).unwrap_err();
        assert_eq!(
            err.as_refused().unwrap().reason,
            BlockingReason::PriorCcpNotPassed { sequence: 20 }
        );

        let o = apply(&o, 20, JobCardAction::ResetCcp).unwrap().entity;
        let card = o.job_card(20).unwrap();
        assert_eq!(card.ccp_status, CcpStatus::Pending);
        assert_eq!(card.ccp_readings.len(), 2);

        let o = apply(&o, 20, reading(72.0, 15.0)).unwrap().entity;
        assert_eq!(o.job_card(20).unwrap().ccp_status, CcpStatus::Passed);
    }

    #[test]
    fn test_reading_missing_required_value_is_validation_error() {
        let o = run_mix(&order());
        let o = apply(&o, 20, JobCardAction::Start).unwrap().entity;
        let err = apply(
            &o,
            20,
            JobCardAction::RecordCcpReading {
                temperature: Some(80.0),
                holding_time: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));
        assert!(o.job_card(20).unwrap().ccp_readings.is_empty());
    }

    #[test]
    fn test_reading_on_plain_card_refused() {
        let o = apply(&order(), 10, JobCardAction::Start).unwrap().entity;
        let err = apply(&o, 10, reading(80.0, 20.0)).unwrap_err();
        assert_eq!(
            err.as_refused().unwrap().reason,
            BlockingReason::NotCcpOperation { sequence: 10 }
        );
    }

    #[test]
    fn test_cards_locked_when_work_order_not_in_progress() {
        let mut o = order();
        o.status = WorkOrderStatus::Released;
        let err = apply(&o, 10, JobCardAction::Start).unwrap_err();
        assert!(matches!(
            err.as_refused().unwrap().reason,
            BlockingReason::WorkOrderNotInProgress { .. }
        ));
    }

    #[test]
    fn test_fail_is_terminal() {
        let o = apply(&order(), 10, JobCardAction::Start).unwrap().entity;
        let o = apply(&o, 10, JobCardAction::Fail).unwrap().entity;
        assert_eq!(o.job_card(10).unwrap().status, JobCardStatus::Failed);
        assert!(apply(&o, 10, JobCardAction::Complete { completed_qty: 1.0 }).is_err());
        assert!(apply(&o, 20, JobCardAction::Start).is_err());
    }

    #[test]
    fn test_unknown_sequence_is_validation_error() {
        let err = apply(&order(), 99, JobCardAction::Start).unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));
    }
}
