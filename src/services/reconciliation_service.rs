//! 支付结果对账
//!
//! webhook 与客户端确认两条路径都归一为 `PaymentOutcome`，在这里统一处理：
//! 去重 -> 定位参与记录 -> 校验金额 -> 状态机变更 -> 记录事件。

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::{
    ParticipationStatus, PaymentOutcomeKind, ReconcileResult, StatusReason,
    participation_entity as participations, payment_event_entity as events,
};
use crate::error::{AppError, AppResult};
use crate::models::PaymentOutcome;
use crate::services::participation_service::{Decision, ParticipationService, TransitionOutcome};

#[derive(Clone)]
pub struct ReconciliationService {
    pool: DatabaseConnection,
    participations: ParticipationService,
}

impl ReconciliationService {
    pub fn new(pool: DatabaseConnection, participations: ParticipationService) -> Self {
        Self {
            pool,
            participations,
        }
    }

    /// 处理一次支付结果，返回处理后的参与记录
    pub async fn apply(&self, outcome: PaymentOutcome) -> AppResult<participations::Model> {
        if let Some(previous) = events::Entity::find()
            .filter(events::Column::EventRef.eq(outcome.event_ref.as_str()))
            .one(&self.pool)
            .await?
        {
            log::info!(
                "Payment event {} already processed ({:?}), ignoring",
                outcome.event_ref,
                previous.result
            );
            return self.replay(&outcome, previous).await;
        }

        let Some(participation) = self.participations.find_by_intent(&outcome.intent_id).await?
        else {
            log::warn!(
                "Payment {} for unknown intent {} (event {})",
                outcome.outcome,
                outcome.intent_id,
                outcome.event_ref
            );
            self.record(&outcome, None, ReconcileResult::UnknownReference)
                .await;
            return Err(AppError::NotFound(format!(
                "No participation for payment intent {}",
                outcome.intent_id
            )));
        };

        match outcome.outcome {
            PaymentOutcomeKind::Succeeded => self.apply_success(&outcome, participation).await,
            PaymentOutcomeKind::Failed => self.apply_failure(&outcome, participation).await,
        }
    }

    /// 重复投递的事件：返回首次处理的结果，不再变更状态
    async fn replay(
        &self,
        outcome: &PaymentOutcome,
        previous: events::Model,
    ) -> AppResult<participations::Model> {
        let participation = match previous.participation_id {
            Some(id) => participations::Entity::find_by_id(id).one(&self.pool).await?,
            None => None,
        };
        let Some(participation) = participation else {
            return Err(AppError::NotFound(format!(
                "No participation for payment intent {}",
                outcome.intent_id
            )));
        };

        match previous.result {
            ReconcileResult::Applied | ReconcileResult::Unchanged => Ok(participation),
            ReconcileResult::UnknownReference => Err(AppError::NotFound(format!(
                "No participation for payment intent {}",
                outcome.intent_id
            ))),
            ReconcileResult::AmountMismatch => Err(AppError::ValidationError(format!(
                "Paid amount does not match the amount due ({} {})",
                participation.total_cents, participation.currency
            ))),
            ReconcileResult::LatePayment => Err(AppError::InvalidState(format!(
                "Payment for participation {} arrived after its elements were released",
                participation.reference
            ))),
            ReconcileResult::RejectedTransition => Err(AppError::InvalidState(format!(
                "Participation {} is already {}",
                participation.reference, participation.status
            ))),
        }
    }

    async fn apply_success(
        &self,
        outcome: &PaymentOutcome,
        participation: participations::Model,
    ) -> AppResult<participations::Model> {
        if participation.status == ParticipationStatus::Pending
            && outcome.amount_cents != Some(participation.total_cents)
        {
            log::warn!(
                "Amount mismatch for participation {}: paid {:?}, due {}",
                participation.reference,
                outcome.amount_cents,
                participation.total_cents
            );
            self.record(outcome, Some(participation.id), ReconcileResult::AmountMismatch)
                .await;
            return Err(AppError::ValidationError(format!(
                "Paid amount does not match the amount due ({} {})",
                participation.total_cents, participation.currency
            )));
        }

        let decision = Decision::Confirm {
            reason: StatusReason::Payment,
            paid_cents: outcome.amount_cents,
        };
        match self.participations.decide(participation.id, decision).await {
            Ok(result) => Ok(self.finish(outcome, participation.id, result).await),
            Err(e @ (AppError::ElementAlreadyTaken(_) | AppError::InvalidState(_))) => {
                log::error!(
                    "Late payment for participation {} (intent {}): {e}; refund required",
                    participation.reference,
                    outcome.intent_id
                );
                self.record(outcome, Some(participation.id), ReconcileResult::LatePayment)
                    .await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn apply_failure(
        &self,
        outcome: &PaymentOutcome,
        participation: participations::Model,
    ) -> AppResult<participations::Model> {
        let decision = Decision::Reject {
            reason: StatusReason::PaymentFailed,
            note: None,
        };
        match self.participations.decide(participation.id, decision).await {
            Ok(result) => Ok(self.finish(outcome, participation.id, result).await),
            Err(e @ AppError::InvalidState(_)) => {
                log::warn!(
                    "Payment failure for already {} participation {}",
                    participation.status,
                    participation.reference
                );
                self.record(
                    outcome,
                    Some(participation.id),
                    ReconcileResult::RejectedTransition,
                )
                .await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn finish(
        &self,
        outcome: &PaymentOutcome,
        participation_id: i64,
        result: TransitionOutcome,
    ) -> participations::Model {
        let kind = if result.is_applied() {
            ReconcileResult::Applied
        } else {
            ReconcileResult::Unchanged
        };
        self.record(outcome, Some(participation_id), kind).await;
        result.into_model()
    }

    /// 记录事件；并发重复写入由唯一索引拦截，失败只记日志
    async fn record(
        &self,
        outcome: &PaymentOutcome,
        participation_id: Option<i64>,
        result: ReconcileResult,
    ) {
        let inserted = events::ActiveModel {
            event_ref: Set(outcome.event_ref.clone()),
            payment_intent_id: Set(outcome.intent_id.clone()),
            participation_id: Set(participation_id),
            outcome: Set(outcome.outcome),
            amount_cents: Set(outcome.amount_cents),
            result: Set(result),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.pool)
        .await;

        if let Err(e) = inserted {
            log::warn!("Failed to record payment event {}: {e}", outcome.event_ref);
        }
    }
}
