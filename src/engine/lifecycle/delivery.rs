// ==========================================
// 食品批次质控核心 - 发货单状态机
// ==========================================
// PENDING → IN_TRANSIT → {DELIVERED*, RETURNED*}
// ==========================================
// 冷链: 每次追加温度记录重算合规;一次超限即永久不合规
// ==========================================

use super::{BlockingReason, EntityKind, LifecycleError, SideEffect, Transitioned};
use crate::domain::{ColdChainRange, DeliveryNote, DeliveryStatus, TemperatureReading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryAction {
    Dispatch,
    Deliver,
    Return,
}

impl fmt::Display for DeliveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliveryAction::Dispatch => "DISPATCH",
            DeliveryAction::Deliver => "DELIVER",
            DeliveryAction::Return => "RETURN",
        };
        write!(f, "{}", s)
    }
}

pub struct DeliveryMachine;

impl DeliveryMachine {
    pub fn transition(
        note: &DeliveryNote,
        action: DeliveryAction,
        now: DateTime<Utc>,
    ) -> Result<Transitioned<DeliveryNote>, LifecycleError> {
        use DeliveryAction as A;
        use DeliveryStatus as S;

        let mut next = note.clone();
        match (note.status, action) {
            (S::Pending, A::Dispatch) => {
                if note.lines.is_empty() {
                    return Err(LifecycleError::Validation(format!(
                        "发货单 {} 没有发货行",
                        note.delivery_id
                    )));
                }
                next.status = S::InTransit;
            }
            (S::InTransit, A::Deliver) => next.status = S::Delivered,
            (S::InTransit, A::Return) => next.status = S::Returned,
            (S::Pending | S::InTransit | S::Delivered | S::Returned, _) => {
                return Err(LifecycleError::refused(
                    EntityKind::DeliveryNote,
                    &note.delivery_id,
                    action,
                    BlockingReason::NotPermitted {
                        status: note.status.to_string(),
                    },
                ));
            }
        }
        next.updated_at = now;
        Ok(Transitioned::new(next))
    }

    /// 追加温度记录
    ///
    /// # 返回
    /// 超限时附带 ColdChainExcursion,cold_chain_compliant 置 false 且不再恢复
    pub fn append_temperature(
        note: &DeliveryNote,
        reading: TemperatureReading,
        range: ColdChainRange,
        now: DateTime<Utc>,
    ) -> Result<Transitioned<DeliveryNote>, LifecycleError> {
        if note.status.is_terminal() {
            return Err(LifecycleError::refused(
                EntityKind::DeliveryNote,
                &note.delivery_id,
                "APPEND_TEMPERATURE",
                BlockingReason::DeliveryClosed {
                    status: note.status.to_string(),
                },
            ));
        }
        if !reading.celsius.is_finite() {
            return Err(LifecycleError::Validation(format!("温度读数非法: {}", reading.celsius)));
        }

        let mut next = note.clone();
        let within = range.contains(reading.celsius);
        let celsius = reading.celsius;
        next.temperature_log.push(reading);
        next.cold_chain_compliant = next.cold_chain_compliant && within;
        next.updated_at = now;

        let result = Transitioned::new(next);
        if within {
            Ok(result)
        } else {
            Ok(result.with_effect(SideEffect::ColdChainExcursion { celsius, range }))
        }
    }
}
