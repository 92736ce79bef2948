// ==========================================
// 食品批次质控核心 - API 层
// ==========================================
// 职责: 组合仓储端口与引擎,对外提供业务接口
// 流程: 读取 → 纯函数流转 → 按版本比较交换保存 → 落地附带产物
// ==========================================

pub mod error;
pub mod inventory_api;
pub mod lifecycle_api;
pub mod quality_api;

// 重导出
pub use error::{ApiError, ApiResult};
pub use inventory_api::{InventoryApi, ReceiveLotRequest};
pub use lifecycle_api::LifecycleApi;
pub use quality_api::QualityApi;

use crate::domain::Aggregate;
use crate::repository::AggregateStore;

/// 读取聚合并核对调用方持有的版本
///
/// # 参数
/// - `expected_revision`: 调用方读取时的版本;None 表示以当前版本为准
pub(crate) fn load_aggregate<T: Aggregate>(
    store: &dyn AggregateStore<T>,
    id: &str,
    expected_revision: Option<i64>,
) -> ApiResult<T> {
    let aggregate = store
        .find(id)?
        .ok_or_else(|| ApiError::NotFound(format!("{}(id={})不存在", T::KIND, id)))?;
    if let Some(expected) = expected_revision {
        if expected != aggregate.revision() {
            return Err(ApiError::StaleState {
                entity: T::KIND.to_string(),
                id: id.to_string(),
                expected,
                actual: aggregate.revision(),
            });
        }
    }
    Ok(aggregate)
}
