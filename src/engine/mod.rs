// ==========================================
// 食品批次质控核心 - 引擎层
// ==========================================
// 职责: 质检规则、FEFO 分配、生命周期状态机
// 红线: Engine 不拼 SQL,只经由仓储端口读写
// 红线: 所有拒绝必须输出原因
// ==========================================

pub mod events;
pub mod fefo_allocator;
pub mod lifecycle;
pub mod qc_rule_engine;
pub mod repositories;
pub mod stock_health;

// 重导出核心引擎
pub use events::{NoOpEventPublisher, OptionalEventPublisher, QualityEvent, QualityEventPublisher};
pub use fefo_allocator::{fefo_order, AllocationError, FefoAllocator, MaterialAvailability};
pub use lifecycle::{
    BlockingReason, DeliveryAction, DeliveryMachine, EntityKind, JobCardAction, JobCardMachine,
    LifecycleError, MaterialShortage, ReceiptAction, ReceiptContext, ReceiptMachine, SideEffect,
    TransitionRefused, Transitioned, WorkOrderAction, WorkOrderContext, WorkOrderMachine,
};
pub use qc_rule_engine::{QcRuleEngine, QcValidationError};
pub use repositories::QualityRepositories;
pub use stock_health::{ExpiryAlert, ReorderAlert, ReorderLevel, StockHealthEngine, StockHealthReport};
