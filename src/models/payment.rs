use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::PaymentOutcomeKind;

/// 为参与记录创建的支付意图
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ParticipationIntentResponse {
    pub payment_intent_id: String,
    pub client_secret: String,
    pub amount: i64,
    pub currency: String,
}

/// 客户端支付完成后回调确认
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ConfirmPaymentRequest {
    pub payment_intent_id: String,
}

/// 外部支付结果事件（webhook 与客户端确认统一为此结构）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub intent_id: String,
    pub outcome: PaymentOutcomeKind,
    /// 实际支付金额（最小货币单位）
    pub amount_cents: Option<i64>,
    /// 去重键
    pub event_ref: String,
}

impl PaymentOutcome {
    pub fn succeeded(intent_id: &str, amount_cents: i64, event_ref: impl Into<String>) -> Self {
        Self {
            intent_id: intent_id.to_string(),
            outcome: PaymentOutcomeKind::Succeeded,
            amount_cents: Some(amount_cents),
            event_ref: event_ref.into(),
        }
    }

    pub fn failed(intent_id: &str, event_ref: impl Into<String>) -> Self {
        Self {
            intent_id: intent_id.to_string(),
            outcome: PaymentOutcomeKind::Failed,
            amount_cents: None,
            event_ref: event_ref.into(),
        }
    }

    /// 客户端确认路径的去重键
    pub fn client_event_ref(intent_id: &str, outcome: PaymentOutcomeKind) -> String {
        format!("client:{intent_id}:{outcome}")
    }
}
