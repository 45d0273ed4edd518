use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::entities::{ParticipationStatus, PaymentOutcomeKind, participation_entity as participations};
use crate::error::{AppError, AppResult};
use crate::external::{IntentStatus, NewPaymentIntent, PaymentGateway, PaymentIntentInfo};
use crate::models::{ParticipationIntentResponse, ParticipationPublicResponse, PaymentOutcome};
use crate::services::participation_service::ParticipationService;
use crate::services::reconciliation_service::ReconciliationService;

/// 支付意图 metadata 中的业务类别
pub const PARTICIPATION_CATEGORY: &str = "participation";

#[derive(Clone)]
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    participations: ParticipationService,
    reconciliation: ReconciliationService,
    hold: chrono::Duration,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        participations: ParticipationService,
        reconciliation: ReconciliationService,
        hold: chrono::Duration,
    ) -> Self {
        Self {
            gateway,
            participations,
            reconciliation,
            hold,
        }
    }

    fn ensure_payable(&self, participation: &participations::Model) -> AppResult<()> {
        if participation.status != ParticipationStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Participation is already {}",
                participation.status
            )));
        }
        if participation.is_expired(Utc::now(), self.hold) {
            return Err(AppError::InvalidState(
                "Reservation has expired, please select the elements again".to_string(),
            ));
        }
        Ok(())
    }

    fn intent_response(info: PaymentIntentInfo) -> AppResult<ParticipationIntentResponse> {
        let client_secret = info.client_secret.ok_or_else(|| {
            AppError::ExternalApiError("Payment intent has no client secret".to_string())
        })?;
        Ok(ParticipationIntentResponse {
            payment_intent_id: info.id,
            client_secret,
            amount: info.amount,
            currency: info.currency,
        })
    }

    /// 为参与记录创建（或复用）支付意图
    ///
    /// 逻辑:
    /// 1. 仅 pending 且在保留期内可支付
    /// 2. 已有可用的支付意图则直接返回
    /// 3. 否则按应付总额创建新意图，以比较并交换方式绑定
    /// 4. 绑定失败（并发请求已绑定其他意图）-> 取消新意图，返回已绑定的意图
    pub async fn create_intent(&self, reference: &str) -> AppResult<ParticipationIntentResponse> {
        let participation = self.participations.find_by_reference(reference).await?;
        self.ensure_payable(&participation)?;

        if let Some(existing_id) = participation.payment_intent_id.as_deref() {
            let existing = self.gateway.retrieve_intent(existing_id).await?;
            if let Some(reused) = self.reusable(&participation, existing).await? {
                return Self::intent_response(reused);
            }
        }

        let metadata = HashMap::from([
            ("category".to_string(), PARTICIPATION_CATEGORY.to_string()),
            ("participation_ref".to_string(), participation.reference.clone()),
            ("raffle_id".to_string(), participation.raffle_id.to_string()),
        ]);
        let info = self
            .gateway
            .create_intent(NewPaymentIntent {
                amount: participation.total_cents,
                currency: participation.currency.clone(),
                description: Some(format!(
                    "Raffle {} participation {}",
                    participation.raffle_id, participation.reference
                )),
                metadata,
            })
            .await?;

        let attached = self
            .participations
            .attach_intent(
                participation.id,
                participation.payment_intent_id.as_deref(),
                &info.id,
            )
            .await?;
        if attached {
            return Self::intent_response(info);
        }

        if let Err(e) = self.gateway.cancel_intent(&info.id).await {
            log::warn!("Failed to cancel unattached PaymentIntent {}: {e}", info.id);
        }

        let current = self.participations.find_by_reference(reference).await?;
        self.ensure_payable(&current)?;
        let Some(stored_id) = current.payment_intent_id.as_deref() else {
            return Err(AppError::InvalidState(
                "Payment intent could not be attached, please retry".to_string(),
            ));
        };
        log::info!(
            "Participation {} already has PaymentIntent {}, discarding {}",
            current.reference,
            stored_id,
            info.id
        );
        let stored = self.gateway.retrieve_intent(stored_id).await?;
        match self.reusable(&current, stored).await? {
            Some(reused) => Self::intent_response(reused),
            None => Err(AppError::InvalidState(
                "Payment intent could not be attached, please retry".to_string(),
            )),
        }
    }

    /// 已绑定意图是否可以直接复用；过期金额的未付意图会被取消
    async fn reusable(
        &self,
        participation: &participations::Model,
        existing: PaymentIntentInfo,
    ) -> AppResult<Option<PaymentIntentInfo>> {
        match existing.status {
            IntentStatus::Succeeded => Err(AppError::InvalidState(
                "Payment already completed, confirmation pending".to_string(),
            )),
            IntentStatus::Open | IntentStatus::Processing
                if existing.amount == participation.total_cents =>
            {
                log::info!(
                    "Reusing PaymentIntent {} for participation {}",
                    existing.id,
                    participation.reference
                );
                Ok(Some(existing))
            }
            IntentStatus::Open => {
                if let Err(e) = self.gateway.cancel_intent(&existing.id).await {
                    log::warn!("Failed to cancel stale PaymentIntent {}: {e}", existing.id);
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// 客户端支付完成后主动确认
    ///
    /// 以 Stripe 查询结果为准：succeeded -> 确认；canceled -> 失败；其他状态不变更
    pub async fn confirm_payment(
        &self,
        reference: &str,
        intent_id: &str,
    ) -> AppResult<ParticipationPublicResponse> {
        let participation = self.participations.find_by_reference(reference).await?;
        if participation.payment_intent_id.as_deref() != Some(intent_id) {
            return Err(AppError::invalid_field(
                "payment_intent_id",
                "does not belong to this participation",
            ));
        }

        let info = self.gateway.retrieve_intent(intent_id).await?;
        let outcome = match info.status {
            IntentStatus::Succeeded => Some(PaymentOutcome::succeeded(
                &info.id,
                info.amount,
                PaymentOutcome::client_event_ref(&info.id, PaymentOutcomeKind::Succeeded),
            )),
            IntentStatus::Canceled => Some(PaymentOutcome::failed(
                &info.id,
                PaymentOutcome::client_event_ref(&info.id, PaymentOutcomeKind::Failed),
            )),
            IntentStatus::Processing | IntentStatus::Open => None,
        };

        match outcome {
            Some(outcome) => {
                self.reconciliation.apply(outcome).await?;
            }
            None => log::info!(
                "PaymentIntent {} is {:?}, participation {} unchanged",
                info.id,
                info.status,
                reference
            ),
        }

        self.participations.get_public(reference).await
    }

    /// 清理过期预留，其支付意图在状态变更时一并取消
    pub async fn release_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let expired = self.participations.expire_stale(now).await?;
        if !expired.is_empty() {
            log::info!("Released {} expired reservations", expired.len());
        }
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{StatusReason, UserRole};
    use crate::external::Notifier;
    use crate::models::ParticipateRequest;
    use crate::services::test_support::*;
    use chrono::Duration;
    use sea_orm::DatabaseConnection;

    struct Ctx {
        db: DatabaseConnection,
        gateway: Arc<FakeGateway>,
        payments: PaymentService,
        participations: ParticipationService,
        raffle_id: i64,
    }

    async fn setup() -> Ctx {
        let db = setup_test_db().await;
        let owner = seed_user(&db, "owner@example.com", UserRole::Creator).await;
        let raffle = seed_numeric_raffle(&db, owner.id, 5).await;
        let cfg = reservation();
        let gateway = Arc::new(FakeGateway::default());
        let participations = ParticipationService::new(
            db.clone(),
            cfg.clone(),
            Notifier::default(),
            gateway.clone(),
        );
        let reconciliation = ReconciliationService::new(db.clone(), participations.clone());
        Ctx {
            payments: PaymentService::new(
                gateway.clone(),
                participations.clone(),
                reconciliation,
                cfg.hold_duration(),
            ),
            gateway,
            participations,
            raffle_id: raffle.id,
            db,
        }
    }

    async fn submit(ctx: &Ctx, elements: &[&str]) -> String {
        ctx.participations
            .submit(
                ctx.raffle_id,
                ParticipateRequest {
                    name: "Diego Sosa".into(),
                    email: "diego@example.com".into(),
                    phone: None,
                    elements: elements.iter().map(|e| e.to_string()).collect(),
                },
            )
            .await
            .unwrap()
            .reference
    }

    #[tokio::test]
    async fn test_create_intent_and_reuse() {
        let ctx = setup().await;
        let reference = submit(&ctx, &["1", "2"]).await;

        let first = ctx.payments.create_intent(&reference).await.unwrap();
        assert_eq!(first.amount, 20);
        assert_eq!(first.currency, "eur");

        let intent = ctx.gateway.retrieve_intent(&first.payment_intent_id).await.unwrap();
        assert_eq!(intent.metadata.get("category").map(String::as_str), Some("participation"));
        assert_eq!(intent.metadata.get("participation_ref"), Some(&reference));

        let second = ctx.payments.create_intent(&reference).await.unwrap();
        assert_eq!(first.payment_intent_id, second.payment_intent_id);
        assert_eq!(ctx.gateway.created_count(), 1);

        let stored = ctx.participations.find_by_reference(&reference).await.unwrap();
        assert_eq!(stored.payment_intent_id, Some(first.payment_intent_id));
    }

    #[tokio::test]
    async fn test_canceled_intent_is_replaced() {
        let ctx = setup().await;
        let reference = submit(&ctx, &["1"]).await;
        let first = ctx.payments.create_intent(&reference).await.unwrap();
        ctx.gateway.set_status(&first.payment_intent_id, IntentStatus::Canceled);

        let second = ctx.payments.create_intent(&reference).await.unwrap();
        assert_ne!(first.payment_intent_id, second.payment_intent_id);
    }

    #[tokio::test]
    async fn test_confirm_payment_flow() {
        let ctx = setup().await;
        let reference = submit(&ctx, &["3"]).await;
        let intent = ctx.payments.create_intent(&reference).await.unwrap();

        // 尚未完成支付
        let view = ctx
            .payments
            .confirm_payment(&reference, &intent.payment_intent_id)
            .await
            .unwrap();
        assert_eq!(view.status, ParticipationStatus::Pending);

        ctx.gateway.set_status(&intent.payment_intent_id, IntentStatus::Succeeded);
        let view = ctx
            .payments
            .confirm_payment(&reference, &intent.payment_intent_id)
            .await
            .unwrap();
        assert_eq!(view.status, ParticipationStatus::Confirmed);

        // 重复确认
        let view = ctx
            .payments
            .confirm_payment(&reference, &intent.payment_intent_id)
            .await
            .unwrap();
        assert_eq!(view.status, ParticipationStatus::Confirmed);

        let err = ctx.payments.create_intent(&reference).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_confirm_payment_canceled_rejects() {
        let ctx = setup().await;
        let reference = submit(&ctx, &["4"]).await;
        let intent = ctx.payments.create_intent(&reference).await.unwrap();
        ctx.gateway.set_status(&intent.payment_intent_id, IntentStatus::Canceled);

        let view = ctx
            .payments
            .confirm_payment(&reference, &intent.payment_intent_id)
            .await
            .unwrap();
        assert_eq!(view.status, ParticipationStatus::Rejected);
        assert_eq!(view.status_reason, Some(StatusReason::PaymentFailed));
    }

    #[tokio::test]
    async fn test_confirm_payment_rejects_foreign_intent() {
        let ctx = setup().await;
        let reference = submit(&ctx, &["1"]).await;
        ctx.payments.create_intent(&reference).await.unwrap();

        let err = ctx
            .payments
            .confirm_payment(&reference, "pi_someone_else")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_expired_reservation_cannot_pay_and_is_released() {
        let ctx = setup().await;
        let reference = submit(&ctx, &["5"]).await;
        let intent = ctx.payments.create_intent(&reference).await.unwrap();

        let p = ctx.participations.find_by_reference(&reference).await.unwrap();
        backdate_participation(&ctx.db, p.id, Utc::now() - Duration::hours(1)).await;

        let err = ctx.payments.create_intent(&reference).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let released = ctx.payments.release_expired(Utc::now()).await.unwrap();
        assert_eq!(released, 1);
        assert_eq!(ctx.gateway.canceled(), vec![intent.payment_intent_id]);

        let p = ctx.participations.find_by_reference(&reference).await.unwrap();
        assert_eq!(p.status, ParticipationStatus::Rejected);
        assert_eq!(p.status_reason, Some(StatusReason::Expired));
    }

    #[tokio::test]
    async fn test_concurrent_create_intent_keeps_one_intent() {
        let ctx = setup().await;
        let reference = submit(&ctx, &["2"]).await;

        let other = ctx.payments.clone();
        let (a, b) = tokio::join!(
            ctx.payments.create_intent(&reference),
            other.create_intent(&reference)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.payment_intent_id, b.payment_intent_id);

        let stored = ctx.participations.find_by_reference(&reference).await.unwrap();
        assert_eq!(stored.payment_intent_id.as_deref(), Some(a.payment_intent_id.as_str()));

        // 多创建的意图必须已取消
        let canceled = ctx.gateway.canceled();
        assert_eq!(ctx.gateway.created_count() - canceled.len(), 1);
        assert!(!canceled.contains(&a.payment_intent_id));
    }

    #[tokio::test]
    async fn test_payment_failure_cancels_intent() {
        let ctx = setup().await;
        let reference = submit(&ctx, &["1"]).await;
        let intent = ctx.payments.create_intent(&reference).await.unwrap();

        ctx.payments
            .reconciliation
            .apply(PaymentOutcome::failed(&intent.payment_intent_id, "evt_declined"))
            .await
            .unwrap();
        assert_eq!(ctx.gateway.canceled(), vec![intent.payment_intent_id.clone()]);

        // 已取消的意图无法再付款，重新下单需重新选号
        let err = ctx.payments.create_intent(&reference).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_canceled_intent_is_not_canceled_again() {
        let ctx = setup().await;
        let reference = submit(&ctx, &["4"]).await;
        let intent = ctx.payments.create_intent(&reference).await.unwrap();
        ctx.gateway.set_status(&intent.payment_intent_id, IntentStatus::Canceled);

        ctx.payments
            .confirm_payment(&reference, &intent.payment_intent_id)
            .await
            .unwrap();
        assert!(ctx.gateway.canceled().is_empty());
    }
}
