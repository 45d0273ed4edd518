use chrono::{DateTime, Duration, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 参与记录状态
///
/// pending -> confirmed | rejected，confirmed 与 rejected 均为终态
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema, DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum ParticipationStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl ParticipationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ParticipationStatus::Pending)
    }

    pub fn can_transition_to(&self, target: ParticipationStatus) -> bool {
        !self.is_terminal() && target.is_terminal()
    }
}

impl std::fmt::Display for ParticipationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParticipationStatus::Pending => write!(f, "pending"),
            ParticipationStatus::Confirmed => write!(f, "confirmed"),
            ParticipationStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// 状态变更原因
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum StatusReason {
    /// 支付成功（webhook 或客户端确认）
    #[sea_orm(string_value = "payment")]
    Payment,
    #[sea_orm(string_value = "payment_failed")]
    PaymentFailed,
    /// 创建者 / 管理员手动处理（线下付款等）
    #[sea_orm(string_value = "manual")]
    Manual,
    /// 超过保留时长未支付
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl std::fmt::Display for StatusReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusReason::Payment => write!(f, "payment"),
            StatusReason::PaymentFailed => write!(f, "payment_failed"),
            StatusReason::Manual => write!(f, "manual"),
            StatusReason::Expired => write!(f, "expired"),
        }
    }
}

/// 参与记录（账本）实体
/// 说明:
/// - 只追加，不删除；rejected 记录保留用于审计
/// - 所选号码存放在 participation_elements
/// - reference 为对外公开的标识 (UUID)，id 仅内部使用
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "participations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub reference: String,
    pub raffle_id: i64,
    pub participant_name: String,
    pub participant_email: String,
    pub participant_phone: Option<String>,
    /// 应付总额 = 单价 × 号码数
    pub total_cents: i64,
    pub currency: String,
    pub status: ParticipationStatus,
    pub status_reason: Option<StatusReason>,
    #[sea_orm(column_type = "Text", nullable)]
    pub status_note: Option<String>,
    #[sea_orm(unique)]
    pub payment_intent_id: Option<String>,
    pub paid_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// 预留到期时间
    pub fn hold_expires_at(&self, hold: Duration) -> DateTime<Utc> {
        self.created_at + hold
    }

    /// pending 且已超过保留时长
    pub fn is_expired(&self, now: DateTime<Utc>, hold: Duration) -> bool {
        self.status == ParticipationStatus::Pending && self.hold_expires_at(hold) <= now
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::raffles::Entity",
        from = "Column::RaffleId",
        to = "super::raffles::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Raffle,
    #[sea_orm(has_many = "super::participation_elements::Entity")]
    Elements,
}

impl Related<super::raffles::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Raffle.def()
    }
}

impl Related<super::participation_elements::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Elements.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine() {
        use ParticipationStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Rejected));
        assert!(!Confirmed.can_transition_to(Rejected));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Rejected.can_transition_to(Confirmed));
        assert!(!Rejected.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
        assert!(Confirmed.is_terminal());
        assert!(Rejected.is_terminal());
        assert!(!Pending.is_terminal());
    }
}
