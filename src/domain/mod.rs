// ==========================================
// 食品批次质控核心 - 领域模型层
// ==========================================
// 职责: 定义领域实体、状态枚举、派生状态计算
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod aggregate;
pub mod delivery;
pub mod item;
pub mod lot;
pub mod quality;
pub mod receipt;
pub mod types;
pub mod work_order;

// 重导出核心类型
pub use aggregate::Aggregate;
pub use delivery::{ColdChainRange, DeliveryLine, DeliveryNote, TemperatureReading, TemperatureStats};
pub use item::{Item, ShelfLifeOverflow};
pub use lot::{Allocation, CommitOutcome, Lot, LotDraw, QTY_EPSILON};
pub use quality::{
    InspectionResult, InspectionSource, QcInspection, QcParameter, QcReading, QcTemplate,
    ReadingResult,
};
pub use receipt::{PurchaseReceipt, ReceiptLine};
pub use types::{
    CcpStatus, DeliveryStatus, InspectionStatus, JobCardStatus, LineQcStatus, LotStatus,
    QcParameterType, ReadingOutcome, ReceiptQcStatus, ReceiptStatus, WorkOrderStatus,
};
pub use work_order::{CcpCriteria, CcpReading, JobCard, MaterialRequirement, WorkOrder};
