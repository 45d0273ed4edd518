use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::AppResult;

/// 创建支付意图参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentIntent {
    pub amount: i64,
    pub currency: String,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// 支付意图状态（只保留业务关心的几种）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    Succeeded,
    Canceled,
    Processing,
    /// 等待付款方式 / 确认 / 用户操作
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntentInfo {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: IntentStatus,
    pub metadata: HashMap<String, String>,
}

/// 支付网关抽象，生产环境为 Stripe
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: NewPaymentIntent) -> AppResult<PaymentIntentInfo>;

    async fn retrieve_intent(&self, intent_id: &str) -> AppResult<PaymentIntentInfo>;

    async fn cancel_intent(&self, intent_id: &str) -> AppResult<()>;
}
