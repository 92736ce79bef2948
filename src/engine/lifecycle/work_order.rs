// ==========================================
// 食品批次质控核心 - 工单状态机
// ==========================================
// DRAFT → RELEASED → IN_PROGRESS → COMPLETED*
// {DRAFT, RELEASED, IN_PROGRESS} → CANCELLED*
// ==========================================
// 守卫: 开工 = 物料齐套 (仅检查,不扣减)
// 守卫: 完工 = 全部工序卡 COMPLETED 且 CCP ∈ {PASSED, NOT_REQUIRED}
// ==========================================

use super::{BlockingReason, EntityKind, LifecycleError, MaterialShortage, SideEffect, Transitioned};
use crate::domain::{CcpStatus, Item, JobCardStatus, Lot, LotStatus, WorkOrder, WorkOrderStatus, QTY_EPSILON};
use crate::engine::fefo_allocator::MaterialAvailability;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkOrderAction {
    Release,
    Start,
    Complete,
    Cancel,
}

impl fmt::Display for WorkOrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkOrderAction::Release => "RELEASE",
            WorkOrderAction::Start => "START",
            WorkOrderAction::Complete => "COMPLETE",
            WorkOrderAction::Cancel => "CANCEL",
        };
        write!(f, "{}", s)
    }
}

/// 工单流转上下文
pub struct WorkOrderContext<'a> {
    /// 物料可用量端口 (开工齐套检查)
    pub availability: &'a dyn MaterialAvailability,
    /// 成品物料定义 (完工产出批次;未设置产出仓库时可为空)
    pub product: Option<&'a Item>,
    pub as_of: NaiveDate,
    pub now: DateTime<Utc>,
}

pub struct WorkOrderMachine;

impl WorkOrderMachine {
    /// 工单状态流转
    ///
    /// # 返回
    /// - Ok: 新状态的工单副本 (完工时可附带产出批次)
    /// - Err(Refused): 守卫未满足,工单不变
    /// - Err(MaterialShortage): 开工物料不足
    pub fn transition(
        order: &WorkOrder,
        action: WorkOrderAction,
        ctx: &WorkOrderContext<'_>,
    ) -> Result<Transitioned<WorkOrder>, LifecycleError> {
        use WorkOrderAction as A;
        use WorkOrderStatus as S;

        let mut next = order.clone();
        let mut effects = Vec::new();

        match (order.status, action) {
            (S::Draft, A::Release) => {
                if !(order.planned_qty.is_finite() && order.planned_qty > 0.0) {
                    return Err(LifecycleError::Validation(format!(
                        "工单计划数量必须大于 0: {}",
                        order.planned_qty
                    )));
                }
                next.status = S::Released;
            }
            (S::Released, A::Start) => {
                let shortages = Self::check_materials(order, ctx)?;
                if !shortages.is_empty() {
                    return Err(LifecycleError::MaterialShortage(shortages));
                }
                next.status = S::InProgress;
            }
            (S::InProgress, A::Complete) => {
                Self::check_completion(order)?;
                if let Some(lot) = Self::output_lot(order, ctx)? {
                    next.output_lot_id = Some(lot.lot_id.clone());
                    effects.push(SideEffect::LotCreated(lot));
                }
                next.status = S::Completed;
            }
            (S::Draft | S::Released | S::InProgress, A::Cancel) => {
                next.status = S::Cancelled;
            }
            (S::Draft | S::Released | S::InProgress | S::Completed | S::Cancelled, _) => {
                return Err(LifecycleError::refused(
                    EntityKind::WorkOrder,
                    &order.work_order_id,
                    action,
                    BlockingReason::NotPermitted {
                        status: order.status.to_string(),
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

    /// 物料齐套检查: 同一 (物料, 仓库) 的需求先合并再比对
    fn check_materials(
        order: &WorkOrder,
        ctx: &WorkOrderContext<'_>,
    ) -> Result<Vec<MaterialShortage>, LifecycleError> {
        let mut required: BTreeMap<(&str, &str), f64> = BTreeMap::new();
        for req in &order.materials {
            *required
                .entry((req.item_id.as_str(), req.warehouse_id.as_str()))
                .or_insert(0.0) += req.required_for(order.planned_qty);
        }

        let mut shortages = Vec::new();
        for ((item_id, warehouse_id), qty) in required {
            let available = ctx.availability.available_qty(item_id, warehouse_id, ctx.as_of)?;
            if available + QTY_EPSILON < qty {
                shortages.push(MaterialShortage {
                    item_id: item_id.to_string(),
                    warehouse_id: warehouse_id.to_string(),
                    required: qty,
                    available,
                });
            }
        }
        Ok(shortages)
    }

    fn check_completion(order: &WorkOrder) -> Result<(), LifecycleError> {
        let refuse = |reason: BlockingReason| -> Result<(), LifecycleError> {
            Err(LifecycleError::refused(
                EntityKind::WorkOrder,
                &order.work_order_id,
                WorkOrderAction::Complete,
                reason,
            ))
        };

        let ccp_sequences = |status: CcpStatus| -> Vec<u32> {
            order
                .job_cards
                .iter()
                .filter(|c| c.is_ccp && c.ccp_status == status)
                .map(|c| c.sequence)
                .collect()
        };

        match order.ccp_status() {
            CcpStatus::Failed => {
                return refuse(BlockingReason::CcpFailed {
                    sequences: ccp_sequences(CcpStatus::Failed),
                })
            }
            CcpStatus::Pending => {
                return refuse(BlockingReason::CcpPending {
                    sequences: ccp_sequences(CcpStatus::Pending),
                })
            }
            CcpStatus::Passed | CcpStatus::NotRequired => {}
        }

        let incomplete: Vec<u32> = order
            .job_cards
            .iter()
            .filter(|c| c.status != JobCardStatus::Completed)
            .map(|c| c.sequence)
            .collect();
        if !incomplete.is_empty() {
            return refuse(BlockingReason::JobCardsIncomplete { sequences: incomplete });
        }
        Ok(())
    }

    /// 产出批次: 需检成品先隔离
    fn output_lot(order: &WorkOrder, ctx: &WorkOrderContext<'_>) -> Result<Option<Lot>, LifecycleError> {
        let warehouse_id = match &order.output_warehouse_id {
            Some(wh) => wh,
            None => return Ok(None),
        };
        let product = ctx.product.ok_or_else(|| {
            LifecycleError::Validation(format!("缺少成品物料定义: {}", order.product_item_id))
        })?;
        if product.item_id != order.product_item_id {
            return Err(LifecycleError::Validation(format!(
                "成品物料不匹配: expected={}, actual={}",
                order.product_item_id, product.item_id
            )));
        }

        let status = if product.requires_qc {
            LotStatus::Quarantine
        } else {
            LotStatus::Available
        };
        let exp_date = product
            .expiry_for(ctx.as_of)
            .map_err(|e| LifecycleError::Validation(e.to_string()))?;
        Ok(Some(Lot {
            lot_id: format!("LOT-{}", order.work_order_id),
            item_id: product.item_id.clone(),
            warehouse_id: warehouse_id.clone(),
            lot_number: order.work_order_id.clone(),
            qty: order.output_qty().max(0.0),
            mfg_date: Some(ctx.as_of),
            exp_date,
            status,
            source_ref: Some(order.work_order_id.clone()),
            received_at: ctx.now,
            updated_at: ctx.now,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CcpCriteria, JobCard, MaterialRequirement};
    use crate::repository::RepositoryError;
    use std::collections::HashMap;

    struct FixedAvailability(HashMap<String, f64>);

    impl MaterialAvailability for FixedAvailability {
        fn available_qty(&self, item_id: &str, _warehouse_id: &str, _as_of: NaiveDate) -> Result<f64, RepositoryError> {
            Ok(self.0.get(item_id).copied().unwrap_or(0.0))
        }
    }

    fn ctx<'a>(availability: &'a FixedAvailability, product: Option<&'a Item>) -> WorkOrderContext<'a> {
        WorkOrderContext {
            availability,
            product,
            as_of: NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(),
            now: Utc::now(),
        }
    }

    fn two_step_order(status: WorkOrderStatus) -> WorkOrder {
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
            ));
        order.status = status;
        order
    }

    #[test]
    fn test_complete_refused_while_ccp_pending() {
        let availability = FixedAvailability(HashMap::new());
        let mut order = two_step_order(WorkOrderStatus::InProgress);
        order.job_cards[0].status = JobCardStatus::Completed;

        let err = WorkOrderMachine::transition(&order, WorkOrderAction::Complete, &ctx(&availability, None))
            .unwrap_err();
        let refused = err.as_refused().expect("should be refused");
        assert_eq!(refused.reason, BlockingReason::CcpPending { sequences: vec![20] });
    }

    #[test]
    fn test_complete_refused_with_incomplete_cards() {
        let availability = FixedAvailability(HashMap::new());
        let mut order = two_step_order(WorkOrderStatus::InProgress);
        order.job_cards[1].ccp_status = CcpStatus::Passed;
        order.job_cards[1].status = JobCardStatus::Completed;

        let err = WorkOrderMachine::transition(&order, WorkOrderAction::Complete, &ctx(&availability, None))
            .unwrap_err();
        assert_eq!(
            err.as_refused().unwrap().reason,
            BlockingReason::JobCardsIncomplete { sequences: vec![10] }
        );
    }

    #[test]
    fn test_complete_creates_quarantined_output_lot() {
        let availability = FixedAvailability(HashMap::new());
        let mut product = Item::new("YOGURT", "原味酸奶", "KG");
        product.requires_qc = true;
        product.has_expiry = true;
        product.shelf_life_days = Some(21);

        let mut order = two_step_order(WorkOrderStatus::InProgress);
        order.output_warehouse_id = Some("FG".to_string());
        for card in order.job_cards.iter_mut() {
            card.status = JobCardStatus::Completed;
            card.completed_qty = 98.0;
        }
        order.job_cards[1].ccp_status = CcpStatus::Passed;

        let result =
            WorkOrderMachine::transition(&order, WorkOrderAction::Complete, &ctx(&availability, Some(&product)))
                .unwrap();
        assert_eq!(result.entity.status, WorkOrderStatus::Completed);
        assert_eq!(result.entity.output_lot_id.as_deref(), Some("LOT-WO-1"));
        match &result.effects[..] {
            [SideEffect::LotCreated(lot)] => {
                assert_eq!(lot.status, LotStatus::Quarantine);
                assert_eq!(lot.qty, 98.0);
                assert_eq!(lot.exp_date, NaiveDate::from_ymd_opt(2026, 2, 10));
            }
            other => panic!("unexpected effects: {:?}", other),
        }
    }

    #[test]
    fn test_start_reports_material_shortage() {
        let availability = FixedAvailability(HashMap::from([
            ("MILK".to_string(), 150.0),
            ("CULTURE".to_string(), 0.5),
        ]));
        let order = two_step_order(WorkOrderStatus::Released)
            .with_material(MaterialRequirement {
                item_id: "MILK".to_string(),
                warehouse_id: "WH1".to_string(),
                qty_per_unit: 1.0,
            })
            .with_material(MaterialRequirement {
                item_id: "CULTURE".to_string(),
                warehouse_id: "WH1".to_string(),
                qty_per_unit: 0.01,
            });

        let err = WorkOrderMachine::transition(&order, WorkOrderAction::Start, &ctx(&availability, None)).unwrap_err();
        match err {
            LifecycleError::MaterialShortage(shortages) => {
                assert_eq!(shortages.len(), 1);
                assert_eq!(shortages[0].item_id, "CULTURE");
                assert!((shortages[0].required - 1.0).abs() < 1e-9);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_full_happy_path_and_terminal_refusal() {
        let availability = FixedAvailability(HashMap::new());
        let c = ctx(&availability, None);
        let order = WorkOrder::new("WO-2", "WATER", 10.0, Utc::now());

        let released = WorkOrderMachine::transition(&order, WorkOrderAction::Release, &c).unwrap().entity;
        let started = WorkOrderMachine::transition(&released, WorkOrderAction::Start, &c).unwrap().entity;
        let done = WorkOrderMachine::transition(&started, WorkOrderAction::Complete, &c).unwrap();
        assert_eq!(done.entity.status, WorkOrderStatus::Completed);
        assert!(done.effects.is_empty());

        let err = WorkOrderMachine::transition(&done.entity, WorkOrderAction::Cancel, &c).unwrap_err();
        assert!(matches!(
            err.as_refused().map(|r| &r.reason),
            Some(BlockingReason::NotPermitted { .. })
        ));
    }

    #[test]
    fn test_every_state_action_pair_is_handled() {
        let availability = FixedAvailability(HashMap::new());
        let c = ctx(&availability, None);
        let states = [
            WorkOrderStatus::Draft,
            WorkOrderStatus::Released,
            WorkOrderStatus::InProgress,
            WorkOrderStatus::Completed,
            WorkOrderStatus::Cancelled,
        ];
        let actions = [
            WorkOrderAction::Release,
            WorkOrderAction::Start,
            WorkOrderAction::Complete,
            WorkOrderAction::Cancel,
        ];
        for status in states {
            for action in actions {
                let mut order = WorkOrder::new("WO-3", "WATER", 1.0, Utc::now());
                order.status = status;
                match WorkOrderMachine::transition(&order, action, &c) {
                    Ok(t) => assert_ne!(t.entity.status, status),
                    Err(e) => assert!(e.as_refused().is_some(), "{:?}/{:?}: {:?}", status, action, e),
                }
            }
        }
    }
}
