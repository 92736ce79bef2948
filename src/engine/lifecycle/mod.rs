// ==========================================
// 食品批次质控核心 - 质量门控生命周期状态机
// ==========================================
// 职责: 工单 / 工序卡 / 采购收货 / 发货单的状态流转
// 红线: 每台状态机对 (状态, 动作) 全覆盖;未列出的组合返回 Refused,不 panic
// 红线: 状态机为纯函数,不读写存储;版本比较交换由 API 层完成
// ==========================================

pub mod delivery;
pub mod job_card;
pub mod receipt;
pub mod work_order;

pub use delivery::{DeliveryAction, DeliveryMachine};
pub use job_card::{JobCardAction, JobCardMachine};
pub use receipt::{ReceiptAction, ReceiptContext, ReceiptMachine};
pub use work_order::{WorkOrderAction, WorkOrderContext, WorkOrderMachine};

use crate::domain::{CcpReading, ColdChainRange, Lot, QcInspection};
use crate::repository::RepositoryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ==========================================
// 实体类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    WorkOrder,
    JobCard,
    PurchaseReceipt,
    DeliveryNote,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::WorkOrder => "WorkOrder",
            EntityKind::JobCard => "JobCard",
            EntityKind::PurchaseReceipt => "PurchaseReceipt",
            EntityKind::DeliveryNote => "DeliveryNote",
        };
        write!(f, "{}", s)
    }
}

// ==========================================
// 阻塞原因 (供界面解释"为什么还不能做")
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockingReason {
    /// 当前状态不接受该动作
    NotPermitted { status: String },
    /// 工序卡未全部完工
    JobCardsIncomplete { sequences: Vec<u32> },
    /// CCP 待检
    CcpPending { sequences: Vec<u32> },
    /// CCP 不合格,需纠偏
    CcpFailed { sequences: Vec<u32> },
    /// 前道工序未完工
    PriorStepIncomplete { sequence: u32 },
    /// 前道 CCP 未通过
    PriorCcpNotPassed { sequence: u32 },
    /// 工单未处于生产中
    WorkOrderNotInProgress { status: String },
    /// 非 CCP 工序
    NotCcpOperation { sequence: u32 },
    /// 收货行仍待质检
    QcPending { lines: Vec<u32> },
    /// 发货单已结束
    DeliveryClosed { status: String },
}

impl fmt::Display for BlockingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockingReason::NotPermitted { status } => write!(f, "当前状态 {} 不允许该操作", status),
            BlockingReason::JobCardsIncomplete { sequences } => {
                write!(f, "工序卡未完工: {:?}", sequences)
            }
            BlockingReason::CcpPending { sequences } => write!(f, "CCP 待检: {:?}", sequences),
            BlockingReason::CcpFailed { sequences } => write!(f, "CCP 不合格: {:?}", sequences),
            BlockingReason::PriorStepIncomplete { sequence } => {
                write!(f, "前道工序 {} 未完工", sequence)
            }
            BlockingReason::PriorCcpNotPassed { sequence } => {
                write!(f, "前道 CCP 工序 {} 未通过", sequence)
            }
            BlockingReason::WorkOrderNotInProgress { status } => {
                write!(f, "工单状态为 {},未在生产中", status)
            }
            BlockingReason::NotCcpOperation { sequence } => write!(f, "工序 {} 不是 CCP 工序", sequence),
            BlockingReason::QcPending { lines } => write!(f, "收货行待质检: {:?}", lines),
            BlockingReason::DeliveryClosed { status } => write!(f, "发货单已结束: {}", status),
        }
    }
}

// ==========================================
// TransitionRefused - 守卫未满足 (非异常)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRefused {
    pub entity: EntityKind,
    pub entity_id: String,
    pub action: String,
    pub reason: BlockingReason,
}

impl TransitionRefused {
    pub fn new(entity: EntityKind, entity_id: impl Into<String>, action: impl Into<String>, reason: BlockingReason) -> Self {
        Self {
            entity,
            entity_id: entity_id.into(),
            action: action.into(),
            reason,
        }
    }
}

impl fmt::Display for TransitionRefused {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) 拒绝执行 {}: {}",
            self.entity, self.entity_id, self.action, self.reason
        )
    }
}

// ==========================================
// MaterialShortage - 物料短缺明细
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialShortage {
    pub item_id: String,
    pub warehouse_id: String,
    pub required: f64,
    pub available: f64,
}

fn format_shortages(shortages: &[MaterialShortage]) -> String {
    shortages
        .iter()
        .map(|s| format!("{}@{} 需 {} 可用 {}", s.item_id, s.warehouse_id, s.required, s.available))
        .collect::<Vec<_>>()
        .join("; ")
}

// ==========================================
// LifecycleError
// ==========================================
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("{0}")]
    Refused(TransitionRefused),

    #[error("状态已过期,请重新读取后重试: {entity} id={id}, expected_revision={expected}, actual_revision={actual}")]
    StaleState {
        entity: String,
        id: String,
        expected: i64,
        actual: i64,
    },

    #[error("物料不足: {}", format_shortages(.0))]
    MaterialShortage(Vec<MaterialShortage>),

    #[error("校验失败: {0}")]
    Validation(String),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for LifecycleError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure {
                entity,
                id,
                expected,
                actual,
            } => LifecycleError::StaleState {
                entity,
                id,
                expected,
                actual,
            },
            other => LifecycleError::Repository(other),
        }
    }
}

impl LifecycleError {
    pub fn refused(entity: EntityKind, entity_id: &str, action: impl fmt::Display, reason: BlockingReason) -> Self {
        LifecycleError::Refused(TransitionRefused::new(entity, entity_id, action.to_string(), reason))
    }

    pub fn as_refused(&self) -> Option<&TransitionRefused> {
        match self {
            LifecycleError::Refused(r) => Some(r),
            _ => None,
        }
    }
}

// ==========================================
// 流转附带产物 (由 API 层落库或发布)
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    InspectionSpawned(QcInspection),
    LotCreated(Lot),
    CcpDeviation { sequence: u32, reading: CcpReading },
    ColdChainExcursion { celsius: f64, range: ColdChainRange },
}

/// 流转结果
#[derive(Debug, Clone, PartialEq)]
pub struct Transitioned<T> {
    pub entity: T,
    pub effects: Vec<SideEffect>,
}

impl<T> Transitioned<T> {
    pub fn new(entity: T) -> Self {
        Self {
            entity,
            effects: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: SideEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimistic_lock_failure_maps_to_stale_state() {
        let err: LifecycleError = RepositoryError::OptimisticLockFailure {
            entity: "work_order".to_string(),
            id: "WO-1".to_string(),
            expected: 2,
            actual: 3,
        }
        .into();
        assert!(matches!(err, LifecycleError::StaleState { expected: 2, actual: 3, .. }));

        let err: LifecycleError = RepositoryError::LockError("poisoned".to_string()).into();
        assert!(matches!(err, LifecycleError::Repository(_)));
    }

    #[test]
    fn test_refused_display_names_reason() {
        let err = LifecycleError::refused(
            EntityKind::WorkOrder,
            "WO-1",
            "Complete",
            BlockingReason::CcpPending { sequences: vec![20] },
        );
        let message = err.to_string();
        assert!(message.contains("WO-1"));
        assert!(message.contains("CCP 待检"));
        assert!(err.as_refused().is_some());
    }
}
