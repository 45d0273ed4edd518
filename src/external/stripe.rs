use async_trait::async_trait;
use stripe::{
    CancelPaymentIntent, Client, CreatePaymentIntent,
    CreatePaymentIntentAutomaticPaymentMethods, Currency, Event, PaymentIntent, PaymentIntentId,
    PaymentIntentStatus, Webhook,
};

use crate::config::StripeConfig;
use crate::error::{AppError, AppResult};
use crate::external::gateway::{IntentStatus, NewPaymentIntent, PaymentGateway, PaymentIntentInfo};

#[derive(Clone)]
pub struct StripeService {
    client: Client,
    config: StripeConfig,
}

impl StripeService {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: Client::new(config.secret_key.clone()),
            config,
        }
    }

    /// 校验 Stripe-Signature 并解析事件
    pub fn verify_webhook_signature(&self, payload: &str, signature: &str) -> AppResult<Event> {
        if signature.is_empty() {
            return Err(AppError::AuthError("Invalid webhook signature".to_string()));
        }
        Webhook::construct_event(payload, signature, &self.config.webhook_secret)
            .map_err(|e| AppError::AuthError(format!("Invalid webhook signature: {e}")))
    }
}

fn parse_intent_id(intent_id: &str) -> AppResult<PaymentIntentId> {
    intent_id
        .parse::<PaymentIntentId>()
        .map_err(|_| AppError::invalid_field("payment_intent_id", "is not a valid PaymentIntent id"))
}

fn parse_currency(currency: &str) -> AppResult<Currency> {
    serde_json::from_value(serde_json::Value::String(currency.to_ascii_lowercase()))
        .map_err(|_| AppError::ConfigError(format!("Unsupported currency: {currency}")))
}

fn map_status(status: PaymentIntentStatus) -> IntentStatus {
    match status {
        PaymentIntentStatus::Succeeded => IntentStatus::Succeeded,
        PaymentIntentStatus::Canceled => IntentStatus::Canceled,
        PaymentIntentStatus::Processing => IntentStatus::Processing,
        _ => IntentStatus::Open,
    }
}

impl From<PaymentIntent> for PaymentIntentInfo {
    fn from(pi: PaymentIntent) -> Self {
        Self {
            id: pi.id.to_string(),
            client_secret: pi.client_secret,
            amount: pi.amount,
            currency: pi.currency.to_string(),
            status: map_status(pi.status),
            metadata: pi.metadata,
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeService {
    async fn create_intent(&self, request: NewPaymentIntent) -> AppResult<PaymentIntentInfo> {
        let currency = parse_currency(&request.currency)?;
        let mut params = CreatePaymentIntent::new(request.amount, currency);
        params.description = request.description.as_deref();
        params.metadata = Some(request.metadata);
        params.automatic_payment_methods = Some(CreatePaymentIntentAutomaticPaymentMethods {
            enabled: true,
            allow_redirects: None,
        });

        let intent = PaymentIntent::create(&self.client, params).await?;
        log::info!(
            "Created PaymentIntent {} amount={} currency={}",
            intent.id,
            intent.amount,
            intent.currency
        );
        Ok(intent.into())
    }

    async fn retrieve_intent(&self, intent_id: &str) -> AppResult<PaymentIntentInfo> {
        let id = parse_intent_id(intent_id)?;
        let intent = PaymentIntent::retrieve(&self.client, &id, &[]).await?;
        Ok(intent.into())
    }

    async fn cancel_intent(&self, intent_id: &str) -> AppResult<()> {
        let id = parse_intent_id(intent_id)?;
        PaymentIntent::cancel(&self.client, &id, CancelPaymentIntent::default()).await?;
        log::info!("Canceled PaymentIntent {intent_id}");
        Ok(())
    }
}
