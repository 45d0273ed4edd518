use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcomeKind {
    #[sea_orm(string_value = "succeeded")]
    Succeeded,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl std::fmt::Display for PaymentOutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentOutcomeKind::Succeeded => write!(f, "succeeded"),
            PaymentOutcomeKind::Failed => write!(f, "failed"),
        }
    }
}

/// 对账处理结果
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(24))")]
#[serde(rename_all = "snake_case")]
pub enum ReconcileResult {
    /// 状态已变更
    #[sea_orm(string_value = "applied")]
    Applied,
    /// 目标状态与当前一致，无需处理
    #[sea_orm(string_value = "unchanged")]
    Unchanged,
    #[sea_orm(string_value = "unknown_reference")]
    UnknownReference,
    /// 预留已失效后才收到付款，需要退款
    #[sea_orm(string_value = "late_payment")]
    LatePayment,
    #[sea_orm(string_value = "amount_mismatch")]
    AmountMismatch,
    #[sea_orm(string_value = "rejected_transition")]
    RejectedTransition,
}

/// 外部支付事件记录（审计 + 去重）
/// event_ref 唯一：Stripe 事件ID，或客户端确认的 `client:{intent}:{outcome}`
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub event_ref: String,
    pub payment_intent_id: String,
    pub participation_id: Option<i64>,
    pub outcome: PaymentOutcomeKind,
    pub amount_cents: Option<i64>,
    pub result: ReconcileResult,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
