// ==========================================
// 食品批次质控核心 - 领域类型定义
// ==========================================
// 职责: 各聚合的封闭状态枚举
// 约束: 序列化格式 SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 批次状态 (Lot Status)
// ==========================================
// 只有 AVAILABLE 参与 FEFO 分配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotStatus {
    Available,  // 可用
    Reserved,   // 已预留
    OnHold,     // 冻结(质检不合格/待处置)
    Quarantine, // 隔离(待质检)
}

impl LotStatus {
    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            LotStatus::Available => "AVAILABLE",
            LotStatus::Reserved => "RESERVED",
            LotStatus::OnHold => "ON_HOLD",
            LotStatus::Quarantine => "QUARANTINE",
        }
    }

    /// 从数据库字符串解析
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "AVAILABLE" => Some(LotStatus::Available),
            "RESERVED" => Some(LotStatus::Reserved),
            "ON_HOLD" => Some(LotStatus::OnHold),
            "QUARANTINE" => Some(LotStatus::Quarantine),
            _ => None,
        }
    }
}

impl fmt::Display for LotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 质检参数类型 (QC Parameter Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QcParameterType {
    Numeric,    // 数值型: min/max 闭区间
    Acceptance, // 判定型: 可接受值集合
}

impl fmt::Display for QcParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QcParameterType::Numeric => write!(f, "NUMERIC"),
            QcParameterType::Acceptance => write!(f, "ACCEPTANCE"),
        }
    }
}

// ==========================================
// 单项读数判定结果 (Reading Outcome)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadingOutcome {
    Pass,
    Fail,
    Pending, // 未录入(不完整,不是失败)
}

impl fmt::Display for ReadingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingOutcome::Pass => write!(f, "PASS"),
            ReadingOutcome::Fail => write!(f, "FAIL"),
            ReadingOutcome::Pending => write!(f, "PENDING"),
        }
    }
}

// ==========================================
// 质检单状态 (Inspection Status)
// ==========================================
// 由读数计算得出,不可独立设置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InspectionStatus {
    Draft,
    InProgress,
    Passed,
    Failed,
}

impl InspectionStatus {
    /// 是否为最终处置 (PASSED / FAILED)
    pub fn is_final(&self) -> bool {
        matches!(self, InspectionStatus::Passed | InspectionStatus::Failed)
    }
}

impl fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InspectionStatus::Draft => write!(f, "DRAFT"),
            InspectionStatus::InProgress => write!(f, "IN_PROGRESS"),
            InspectionStatus::Passed => write!(f, "PASSED"),
            InspectionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

// ==========================================
// 工单状态 (Work Order Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkOrderStatus {
    Draft,
    Released,
    InProgress,
    Completed, // 终态
    Cancelled, // 终态
}

impl WorkOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkOrderStatus::Completed | WorkOrderStatus::Cancelled)
    }
}

impl fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkOrderStatus::Draft => write!(f, "DRAFT"),
            WorkOrderStatus::Released => write!(f, "RELEASED"),
            WorkOrderStatus::InProgress => write!(f, "IN_PROGRESS"),
            WorkOrderStatus::Completed => write!(f, "COMPLETED"),
            WorkOrderStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

// ==========================================
// 关键控制点状态 (CCP Status)
// ==========================================
// 工单级为派生值;工序卡级为记录值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CcpStatus {
    NotRequired,
    Pending,
    Passed,
    Failed,
}

impl fmt::Display for CcpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CcpStatus::NotRequired => write!(f, "NOT_REQUIRED"),
            CcpStatus::Pending => write!(f, "PENDING"),
            CcpStatus::Passed => write!(f, "PASSED"),
            CcpStatus::Failed => write!(f, "FAILED"),
        }
    }
}

// ==========================================
// 工序卡状态 (Job Card Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobCardStatus {
    Pending,
    InProgress,
    Completed, // 终态
    Failed,    // 终态
}

impl fmt::Display for JobCardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobCardStatus::Pending => write!(f, "PENDING"),
            JobCardStatus::InProgress => write!(f, "IN_PROGRESS"),
            JobCardStatus::Completed => write!(f, "COMPLETED"),
            JobCardStatus::Failed => write!(f, "FAILED"),
        }
    }
}

// ==========================================
// 采购收货单状态 (Receipt Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiptStatus {
    Draft,
    PendingQc,
    Completed, // 终态
    Cancelled, // 终态
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiptStatus::Draft => write!(f, "DRAFT"),
            ReceiptStatus::PendingQc => write!(f, "PENDING_QC"),
            ReceiptStatus::Completed => write!(f, "COMPLETED"),
            ReceiptStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

// ==========================================
// 收货行质检状态 (Line QC Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineQcStatus {
    NotRequired,
    Pending,
    Passed,
    Failed,
}

impl fmt::Display for LineQcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineQcStatus::NotRequired => write!(f, "NOT_REQUIRED"),
            LineQcStatus::Pending => write!(f, "PENDING"),
            LineQcStatus::Passed => write!(f, "PASSED"),
            LineQcStatus::Failed => write!(f, "FAILED"),
        }
    }
}

// ==========================================
// 收货单汇总质检状态 (Receipt QC Status)
// ==========================================
// 由收货行状态汇总,不可独立设置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiptQcStatus {
    NotRequired,
    Pending,
    Passed,
    Failed,
    Partial,
}

impl fmt::Display for ReceiptQcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiptQcStatus::NotRequired => write!(f, "NOT_REQUIRED"),
            ReceiptQcStatus::Pending => write!(f, "PENDING"),
            ReceiptQcStatus::Passed => write!(f, "PASSED"),
            ReceiptQcStatus::Failed => write!(f, "FAILED"),
            ReceiptQcStatus::Partial => write!(f, "PARTIAL"),
        }
    }
}

// ==========================================
// 发货单状态 (Delivery Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    InTransit,
    Delivered, // 终态
    Returned,  // 终态
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Returned)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "PENDING"),
            DeliveryStatus::InTransit => write!(f, "IN_TRANSIT"),
            DeliveryStatus::Delivered => write!(f, "DELIVERED"),
            DeliveryStatus::Returned => write!(f, "RETURNED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lot_status_db_roundtrip() {
        for status in [
            LotStatus::Available,
            LotStatus::Reserved,
            LotStatus::OnHold,
            LotStatus::Quarantine,
        ] {
            assert_eq!(LotStatus::from_db_str(status.to_db_str()), Some(status));
        }
        assert_eq!(LotStatus::from_db_str("on_hold"), Some(LotStatus::OnHold));
        assert_eq!(LotStatus::from_db_str("SCRAPPED"), None);
    }

    #[test]
    fn test_serde_matches_display() {
        let json = serde_json::to_string(&ReceiptStatus::PendingQc).unwrap();
        assert_eq!(json, "\"PENDING_QC\"");
        assert_eq!(ReceiptStatus::PendingQc.to_string(), "PENDING_QC");
    }
}
