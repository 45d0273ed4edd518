use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::{ParticipationStatus, StatusReason, participation_entity};

use super::PaginatedResponse;

/// 参与（选号）请求
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ParticipateRequest {
    #[schema(example = "María García")]
    pub name: String,
    #[schema(example = "maria@example.com")]
    pub email: String,
    #[schema(example = "+34 600 123 456")]
    pub phone: Option<String>,
    #[schema(example = json!(["7", "13"]))]
    pub elements: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipateResponse {
    pub participation_id: i64,
    pub reference: String,
    pub status: ParticipationStatus,
    /// 应付总额 = 单价 × 号码数
    pub total_due: i64,
    pub currency: String,
    pub elements: Vec<String>,
    /// 未支付预留到期时间
    pub expires_at: DateTime<Utc>,
}

/// 创建者 / 管理员看到的完整参与记录
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipationResponse {
    pub id: i64,
    pub reference: String,
    pub raffle_id: i64,
    pub participant_name: String,
    pub participant_email: String,
    pub participant_phone: Option<String>,
    pub elements: Vec<String>,
    pub total_cents: i64,
    pub currency: String,
    pub status: ParticipationStatus,
    pub status_reason: Option<StatusReason>,
    pub status_note: Option<String>,
    pub payment_intent_id: Option<String>,
    pub paid_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    /// 仅 pending 状态返回
    pub expires_at: Option<DateTime<Utc>>,
}

impl ParticipationResponse {
    pub fn from_parts(m: participation_entity::Model, elements: Vec<String>, hold: Duration) -> Self {
        let expires_at =
            (m.status == ParticipationStatus::Pending).then(|| m.hold_expires_at(hold));
        Self {
            id: m.id,
            reference: m.reference,
            raffle_id: m.raffle_id,
            participant_name: m.participant_name,
            participant_email: m.participant_email,
            participant_phone: m.participant_phone,
            elements,
            total_cents: m.total_cents,
            currency: m.currency,
            status: m.status,
            status_reason: m.status_reason,
            status_note: m.status_note,
            payment_intent_id: m.payment_intent_id,
            paid_cents: m.paid_cents,
            created_at: m.created_at,
            decided_at: m.decided_at,
            expires_at,
        }
    }
}

/// 公开视图（不包含联系方式）
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipationPublicResponse {
    pub reference: String,
    pub raffle_id: i64,
    pub participant_name: String,
    pub elements: Vec<String>,
    pub total_cents: i64,
    pub currency: String,
    pub status: ParticipationStatus,
    pub status_reason: Option<StatusReason>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ParticipationPublicResponse {
    pub fn from_parts(m: participation_entity::Model, elements: Vec<String>, hold: Duration) -> Self {
        let expires_at =
            (m.status == ParticipationStatus::Pending).then(|| m.hold_expires_at(hold));
        Self {
            reference: m.reference,
            raffle_id: m.raffle_id,
            participant_name: m.participant_name,
            elements,
            total_cents: m.total_cents,
            currency: m.currency,
            status: m.status,
            status_reason: m.status_reason,
            created_at: m.created_at,
            expires_at,
        }
    }
}

/// 活动参与记录查询
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ParticipationQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<ParticipationStatus>,
}

/// 手动拒绝
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RejectParticipationRequest {
    pub note: Option<String>,
}

pub type ParticipationPageResponse = PaginatedResponse<ParticipationResponse>;
