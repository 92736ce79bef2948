// ==========================================
// 食品批次质控核心 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 批次台账 / FEFO 分配 / 质检规则 / 质量门控生命周期
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施(连接初始化/PRAGMA 统一/建表)
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域实体
pub use domain::{
    Allocation, DeliveryNote, InspectionResult, Item, JobCard, Lot, PurchaseReceipt, QcInspection,
    QcReading, QcTemplate, WorkOrder,
};

// 引擎
pub use engine::{
    FefoAllocator, JobCardMachine, QcRuleEngine, ReceiptMachine, StockHealthEngine,
    WorkOrderMachine,
};

// API
pub use api::{ApiError, ApiResult, InventoryApi, LifecycleApi, QualityApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "食品批次质控核心";
