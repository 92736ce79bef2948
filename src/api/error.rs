// ==========================================
// 食品批次质控核心 - API 层错误类型
// ==========================================
// 职责: 汇总各层错误为对外统一的错误分类
// 分类: 校验错误 / 库存不足 / 流转被拒 / 状态过期 / 基础设施错误
// 红线: 所有错误都携带显式原因,且不会导致进程退出
// ==========================================

use crate::engine::fefo_allocator::AllocationError;
use crate::engine::lifecycle::{LifecycleError, MaterialShortage, TransitionRefused};
use crate::engine::qc_rule_engine::QcValidationError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("库存不足: item={item_id}, warehouse={warehouse_id}, available={available}, requested={requested}")]
    InsufficientStock {
        item_id: String,
        warehouse_id: String,
        available: f64,
        requested: f64,
    },

    #[error("物料不足: {0:?}")]
    MaterialShortage(Vec<MaterialShortage>),

    /// 守卫未满足: 不是故障,附带阻塞原因供界面解释
    #[error("{0}")]
    TransitionRefused(TransitionRefused),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("状态已过期,请重新读取后重试: {entity} id={id}, expected_revision={expected}, actual_revision={actual}")]
    StaleState {
        entity: String,
        id: String,
        expected: i64,
        actual: i64,
    },

    #[error("并发竞争重试耗尽: {0}")]
    ContentionExhausted(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 是否应由调用方重新读取后重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::StaleState { .. } | ApiError::ContentionExhausted(_))
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure {
                entity,
                id,
                expected,
                actual,
            } => ApiError::StaleState {
                entity,
                id,
                expected,
                actual,
            },
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::AlreadyExists { entity, id } => {
                ApiError::BusinessRuleViolation(format!("{}(id={})已存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::SerializationError(msg) => {
                ApiError::InternalError(format!("序列化失败: {}", msg))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::ValidationError(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

impl From<AllocationError> for ApiError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::InsufficientStock {
                item_id,
                warehouse_id,
                available,
                requested,
            } => ApiError::InsufficientStock {
                item_id,
                warehouse_id,
                available,
                requested,
            },
            AllocationError::InvalidQuantity(qty) => {
                ApiError::ValidationError(format!("分配数量必须为正数: {}", qty))
            }
            AllocationError::ContentionExhausted { attempts } => {
                ApiError::ContentionExhausted(format!("{} 次尝试均与其他分配冲突", attempts))
            }
            AllocationError::Repository(e) => e.into(),
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Refused(refused) => ApiError::TransitionRefused(refused),
            LifecycleError::StaleState {
                entity,
                id,
                expected,
                actual,
            } => ApiError::StaleState {
                entity,
                id,
                expected,
                actual,
            },
            LifecycleError::MaterialShortage(shortages) => ApiError::MaterialShortage(shortages),
            LifecycleError::Validation(msg) => ApiError::ValidationError(msg),
            LifecycleError::Repository(e) => e.into(),
        }
    }
}

impl From<QcValidationError> for ApiError {
    fn from(err: QcValidationError) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::lifecycle::{BlockingReason, EntityKind};

    #[test]
    fn test_optimistic_lock_is_stale_state() {
        let err: ApiError = RepositoryError::OptimisticLockFailure {
            entity: "purchase_receipt".to_string(),
            id: "PR-1".to_string(),
            expected: 1,
            actual: 2,
        }
        .into();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("PR-1"));
    }

    #[test]
    fn test_insufficient_stock_keeps_quantities() {
        let err: ApiError = AllocationError::InsufficientStock {
            item_id: "MILK".to_string(),
            warehouse_id: "WH1".to_string(),
            available: 80.0,
            requested: 90.0,
        }
        .into();
        match err {
            ApiError::InsufficientStock { available, requested, .. } => {
                assert_eq!(available, 80.0);
                assert_eq!(requested, 90.0);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_refusal_is_not_retryable() {
        let err: ApiError = LifecycleError::refused(
            EntityKind::PurchaseReceipt,
            "PR-1",
            "COMPLETE",
            BlockingReason::QcPending { lines: vec![1] },
        )
        .into();
        assert!(matches!(err, ApiError::TransitionRefused(_)));
        assert!(!err.is_retryable());
    }
}
