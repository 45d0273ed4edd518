use crate::error::{AppError, AppResult};
use crate::external::StripeService;
use crate::models::PaymentOutcome;
use crate::services::ReconciliationService;
use crate::services::payment_service::PARTICIPATION_CATEGORY;
use actix_web::{HttpRequest, HttpResponse, Result, web};
use log::{error, info, warn};
use std::collections::HashMap;
use stripe::{Event, EventObject, EventType, PaymentIntent};

/// Stripe webhook处理器
///
/// 签名错误返回 401；处理失败仍返回 200，避免 Stripe 无限重试，错误记录在日志与事件表中
pub async fn stripe_webhook(
    req: HttpRequest,
    body: web::Bytes,
    stripe_service: web::Data<StripeService>,
    reconciliation: web::Data<ReconciliationService>,
) -> Result<HttpResponse> {
    let signature = match req.headers().get("stripe-signature") {
        Some(sig) => sig.to_str().unwrap_or(""),
        None => {
            warn!("Missing Stripe-Signature header");
            return Ok(HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Missing Stripe-Signature header"
            })));
        }
    };

    let payload = std::str::from_utf8(&body).map_err(|_| {
        error!("Invalid UTF-8 in webhook payload");
        actix_web::error::ErrorBadRequest("Invalid payload encoding")
    })?;

    let event = match stripe_service.verify_webhook_signature(payload, signature) {
        Ok(event) => event,
        Err(e) => {
            error!("Webhook signature verification failed: {e}");
            return Ok(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "Invalid signature"
            })));
        }
    };

    info!(
        "Received Stripe webhook event: {} ({})",
        event.type_, event.id
    );

    match handle_stripe_event(event, &reconciliation).await {
        Ok(_) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "received": true
        }))),
        Err(e) => {
            error!("Failed to process webhook event: {e}");
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "received": true,
                "error": format!("Processing failed: {}", e)
            })))
        }
    }
}

/// 处理具体的Stripe事件
async fn handle_stripe_event(event: Event, reconciliation: &ReconciliationService) -> AppResult<()> {
    let event_id = event.id.to_string();
    let event_type = event.type_;
    let succeeded = match event_type {
        EventType::PaymentIntentSucceeded => true,
        EventType::PaymentIntentPaymentFailed | EventType::PaymentIntentCanceled => false,
        _ => {
            info!("Unhandled event type: {:?}", event_type);
            return Ok(());
        }
    };

    let payment_intent = extract_payment_intent_from_event(event)?;
    if !is_participation_intent(&payment_intent.metadata) {
        info!(
            "PaymentIntent {} is not a participation payment, skipping",
            payment_intent.id
        );
        return Ok(());
    }

    let outcome = if succeeded {
        PaymentOutcome::succeeded(payment_intent.id.as_str(), payment_intent.amount, event_id)
    } else {
        PaymentOutcome::failed(payment_intent.id.as_str(), event_id)
    };

    let participation = reconciliation.apply(outcome).await?;
    info!(
        "Event {:?} for PaymentIntent {} reconciled, participation {} is {}",
        event_type, payment_intent.id, participation.reference, participation.status
    );
    Ok(())
}

/// 仅处理本系统创建的支付意图；无类别标记的旧意图按参与记录处理
fn is_participation_intent(metadata: &HashMap<String, String>) -> bool {
    metadata
        .get("category")
        .map(|c| c == PARTICIPATION_CATEGORY)
        .unwrap_or(true)
}

/// 从事件中提取PaymentIntent对象
fn extract_payment_intent_from_event(event: Event) -> AppResult<PaymentIntent> {
    match event.data.object {
        EventObject::PaymentIntent(payment_intent) => Ok(payment_intent),
        _ => Err(AppError::ValidationError(
            "Event does not contain a PaymentIntent object".to_string(),
        )),
    }
}

/// 配置webhook路由
pub fn webhook_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/webhook").route("/stripe", web::post().to(stripe_webhook)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participation_category_filter() {
        let mut metadata = HashMap::new();
        assert!(is_participation_intent(&metadata));

        metadata.insert("category".to_string(), PARTICIPATION_CATEGORY.to_string());
        assert!(is_participation_intent(&metadata));

        metadata.insert("category".to_string(), "recharge".to_string());
        assert!(!is_participation_intent(&metadata));
    }
}
