// ==========================================
// 食品批次质控核心 - 质量事件发布
// ==========================================
// 职责: 定义质量事件发布 trait,由外部协作方实现 (告警/通知)
// 说明: 引擎与 API 层只依赖 trait,不关心投递方式
// ==========================================

use crate::domain::{ColdChainRange, InspectionStatus};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 质量事件
// ==========================================

/// 质量事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityEvent {
    /// CCP 读数不合格
    CcpDeviation {
        work_order_id: String,
        sequence: u32,
        temperature: Option<f64>,
        holding_time: Option<f64>,
    },
    /// 质检单得出最终结论
    InspectionFinalized {
        inspection_id: String,
        item_id: String,
        batch_no: String,
        status: InspectionStatus,
    },
    /// 冷链温度超限
    ColdChainExcursion {
        delivery_id: String,
        celsius: f64,
        range: ColdChainRange,
    },
}

impl QualityEvent {
    /// 转换为字符串标识
    pub fn as_str(&self) -> &str {
        match self {
            QualityEvent::CcpDeviation { .. } => "CcpDeviation",
            QualityEvent::InspectionFinalized { .. } => "InspectionFinalized",
            QualityEvent::ColdChainExcursion { .. } => "ColdChainExcursion",
        }
    }

    /// 事件关联的单据 ID
    pub fn subject_id(&self) -> &str {
        match self {
            QualityEvent::CcpDeviation { work_order_id, .. } => work_order_id,
            QualityEvent::InspectionFinalized { inspection_id, .. } => inspection_id,
            QualityEvent::ColdChainExcursion { delivery_id, .. } => delivery_id,
        }
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 质量事件发布者 Trait
///
/// # 返回
/// - `Ok(receipt)`: 投递回执 (如果支持) 或空字符串
/// - `Err`: 发布失败;调用方记录日志,不回滚已落库的状态
pub trait QualityEventPublisher: Send + Sync {
    fn publish(&self, event: QualityEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
///
/// 用于不需要事件发布的场景(如单元测试)
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl QualityEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: QualityEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - subject={}, event_type={}",
            event.subject_id(),
            event.as_str()
        );
        Ok(String::new())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn QualityEventPublisher>> 的使用
#[derive(Clone)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn QualityEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn with_publisher(publisher: Arc<dyn QualityEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件;失败只记录告警,不向上传播
    pub fn publish(&self, event: QualityEvent) {
        match &self.inner {
            Some(publisher) => {
                let event_type = event.as_str().to_string();
                let subject = event.subject_id().to_string();
                if let Err(e) = publisher.publish(event) {
                    tracing::warn!("质量事件发布失败: subject={}, event_type={}, error={}", subject, event_type, e);
                }
            }
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者,跳过事件 - subject={}, event_type={}",
                    event.subject_id(),
                    event.as_str()
                );
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}
