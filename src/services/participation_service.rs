use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::Expr;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ReservationConfig;
use crate::entities::{
    ParticipationStatus, StatusReason, participation_element_entity as elements,
    participation_entity as participations, raffle_entity as raffles,
};
use crate::error::{AppError, AppResult, FieldError};
use crate::external::{IntentStatus, Notifier, ParticipationNotification, PaymentGateway};
use crate::models::{
    AuthUser, PaginatedResponse, PaginationParams, ParticipateRequest, ParticipateResponse,
    ParticipationPageResponse, ParticipationPublicResponse, ParticipationQuery,
    ParticipationResponse,
};
use crate::services::allocation_service::{live_holders, load_ledger};
use crate::services::raffle_service::ensure_can_manage;
use crate::utils::validation::{collect, validate_email, validate_person_name, validate_phone};

/// 状态变更请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Confirm {
        reason: StatusReason,
        paid_cents: Option<i64>,
    },
    Reject {
        reason: StatusReason,
        note: Option<String>,
    },
}

impl Decision {
    pub fn target(&self) -> ParticipationStatus {
        match self {
            Decision::Confirm { .. } => ParticipationStatus::Confirmed,
            Decision::Reject { .. } => ParticipationStatus::Rejected,
        }
    }
}

/// 状态变更结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied(participations::Model),
    /// 已处于目标状态（幂等）
    Unchanged(participations::Model),
}

impl TransitionOutcome {
    pub fn into_model(self) -> participations::Model {
        match self {
            TransitionOutcome::Applied(m) | TransitionOutcome::Unchanged(m) => m,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

/// 读取参与记录的号码（按提交顺序）
pub async fn load_elements<C: ConnectionTrait>(conn: &C, participation_id: i64) -> AppResult<Vec<String>> {
    Ok(elements::Entity::find()
        .filter(elements::Column::ParticipationId.eq(participation_id))
        .order_by_asc(elements::Column::Position)
        .all(conn)
        .await?
        .into_iter()
        .map(|e| e.element)
        .collect())
}

async fn load_elements_for<C: ConnectionTrait>(
    conn: &C,
    participation_ids: Vec<i64>,
) -> AppResult<HashMap<i64, Vec<String>>> {
    let mut grouped: HashMap<i64, Vec<String>> = HashMap::new();
    if participation_ids.is_empty() {
        return Ok(grouped);
    }
    let rows = elements::Entity::find()
        .filter(elements::Column::ParticipationId.is_in(participation_ids))
        .order_by_asc(elements::Column::ParticipationId)
        .order_by_asc(elements::Column::Position)
        .all(conn)
        .await?;
    for row in rows {
        grouped.entry(row.participation_id).or_default().push(row.element);
    }
    Ok(grouped)
}

#[derive(Clone)]
pub struct ParticipationService {
    pool: DatabaseConnection,
    reservation: ReservationConfig,
    notifier: Notifier,
    gateway: Arc<dyn PaymentGateway>,
}

impl ParticipationService {
    pub fn new(
        pool: DatabaseConnection,
        reservation: ReservationConfig,
        notifier: Notifier,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            pool,
            reservation,
            notifier,
            gateway,
        }
    }

    fn hold(&self) -> chrono::Duration {
        self.reservation.hold_duration()
    }

    /// 校验提交参数，返回 (姓名, 邮箱, 手机, 号码)
    fn validate_request(
        &self,
        req: &ParticipateRequest,
    ) -> AppResult<(String, String, Option<String>, Vec<String>)> {
        let mut errors = Vec::new();
        let name = collect(&mut errors, validate_person_name("name", &req.name));
        let email = collect(&mut errors, validate_email("email", &req.email));
        let phone = collect(&mut errors, validate_phone("phone", req.phone.as_deref()));

        let selected: Vec<String> = req.elements.iter().map(|e| e.trim().to_string()).collect();
        let max = self.reservation.max_elements_per_participation;
        if selected.is_empty() {
            errors.push(FieldError::new("elements", "at least one element is required"));
        } else if selected.len() > max {
            errors.push(FieldError::new(
                "elements",
                format!("at most {max} elements can be selected at once"),
            ));
        } else if selected.iter().any(String::is_empty) {
            errors.push(FieldError::new("elements", "elements must not be empty"));
        } else {
            let mut seen = HashSet::new();
            let duplicates: Vec<&str> = selected
                .iter()
                .filter(|e| !seen.insert(e.as_str()))
                .map(String::as_str)
                .collect();
            if !duplicates.is_empty() {
                errors.push(FieldError::new(
                    "elements",
                    format!("duplicate elements: {}", duplicates.join(", ")),
                ));
            }
        }

        match (name, email, phone) {
            (Some(name), Some(email), Some(phone)) if errors.is_empty() => {
                Ok((name, email, phone, selected))
            }
            _ => Err(AppError::InvalidFields(errors)),
        }
    }

    /// 提交参与（选号）
    ///
    /// 逻辑:
    /// 1. 校验参与者信息与号码列表
    /// 2. 事务内锁定活动行，同一活动的提交串行化
    /// 3. 校验活动状态与号码是否在目录中
    /// 4. 从账本计算已占用号码 (sold ∪ reserved)，有任何重叠则整体拒绝
    /// 5. 写入 pending 参与记录与号码行
    pub async fn submit(
        &self,
        raffle_id: i64,
        req: ParticipateRequest,
    ) -> AppResult<ParticipateResponse> {
        let (name, email, phone, selected) = self.validate_request(&req)?;

        let txn = self.pool.begin().await?;

        let raffle = raffles::Entity::find_by_id(raffle_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Raffle not found".to_string()))?;

        let now = Utc::now();
        raffle.ensure_open(now)?;

        let catalog = raffle.catalog()?;
        let unknown: Vec<&str> = selected
            .iter()
            .filter(|e| !catalog.contains(e))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(AppError::invalid_field(
                "elements",
                format!("not part of this raffle: {}", unknown.join(", ")),
            ));
        }

        let ledger = load_ledger(&txn, raffle.id).await?;
        let holders = live_holders(&ledger, now, self.hold());
        let taken: Vec<String> = selected
            .iter()
            .filter(|e| holders.contains_key(e.as_str()))
            .cloned()
            .collect();
        if !taken.is_empty() {
            return Err(AppError::ElementAlreadyTaken(taken));
        }

        let count = i64::try_from(selected.len())
            .map_err(|_| AppError::ValidationError("Too many elements".to_string()))?;
        let total_cents = raffle
            .price_cents
            .checked_mul(count)
            .ok_or_else(|| AppError::ValidationError("Total amount overflow".to_string()))?;

        let participation = participations::ActiveModel {
            reference: Set(Uuid::new_v4().to_string()),
            raffle_id: Set(raffle.id),
            participant_name: Set(name),
            participant_email: Set(email),
            participant_phone: Set(phone),
            total_cents: Set(total_cents),
            currency: Set(raffle.currency.clone()),
            status: Set(ParticipationStatus::Pending),
            status_reason: Set(None),
            status_note: Set(None),
            payment_intent_id: Set(None),
            paid_cents: Set(None),
            created_at: Set(now),
            decided_at: Set(None),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let rows = selected
            .iter()
            .enumerate()
            .map(|(position, element)| elements::ActiveModel {
                participation_id: Set(participation.id),
                raffle_id: Set(raffle.id),
                element: Set(element.clone()),
                position: Set(position as i32),
                ..Default::default()
            });
        elements::Entity::insert_many(rows).exec(&txn).await?;

        txn.commit().await?;

        log::info!(
            "Participation {} created for raffle {} with {} elements",
            participation.reference,
            raffle.id,
            selected.len()
        );

        Ok(ParticipateResponse {
            participation_id: participation.id,
            reference: participation.reference.clone(),
            status: participation.status,
            total_due: participation.total_cents,
            currency: participation.currency.clone(),
            elements: selected,
            expires_at: participation.hold_expires_at(self.hold()),
        })
    }

    pub async fn find_by_reference(&self, reference: &str) -> AppResult<participations::Model> {
        participations::Entity::find()
            .filter(participations::Column::Reference.eq(reference))
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Participation not found".to_string()))
    }

    pub async fn find_by_intent(&self, intent_id: &str) -> AppResult<Option<participations::Model>> {
        Ok(participations::Entity::find()
            .filter(participations::Column::PaymentIntentId.eq(intent_id))
            .one(&self.pool)
            .await?)
    }

    /// 公开查询（不含联系方式）
    pub async fn get_public(&self, reference: &str) -> AppResult<ParticipationPublicResponse> {
        let participation = self.find_by_reference(reference).await?;
        let selected = load_elements(&self.pool, participation.id).await?;
        Ok(ParticipationPublicResponse::from_parts(
            participation,
            selected,
            self.hold(),
        ))
    }

    /// 活动参与记录（创建者 / 管理员），按创建时间倒序
    pub async fn list_for_raffle(
        &self,
        raffle_id: i64,
        actor: AuthUser,
        query: &ParticipationQuery,
    ) -> AppResult<ParticipationPageResponse> {
        let raffle = raffles::Entity::find_by_id(raffle_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Raffle not found".to_string()))?;
        ensure_can_manage(&raffle, actor)?;

        let params = PaginationParams::new(query.page, query.per_page);

        let mut base_query =
            participations::Entity::find().filter(participations::Column::RaffleId.eq(raffle_id));
        if let Some(status) = query.status {
            base_query = base_query.filter(participations::Column::Status.eq(status));
        }

        let total = base_query.clone().count(&self.pool).await?;

        let rows = base_query
            .order_by_desc(participations::Column::CreatedAt)
            .order_by_desc(participations::Column::Id)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(&self.pool)
            .await?;

        let mut grouped =
            load_elements_for(&self.pool, rows.iter().map(|p| p.id).collect()).await?;
        let hold = self.hold();
        let data = rows
            .into_iter()
            .map(|p| {
                let selected = grouped.remove(&p.id).unwrap_or_default();
                ParticipationResponse::from_parts(p, selected, hold)
            })
            .collect();

        Ok(PaginatedResponse::new(data, &params, total))
    }

    /// 手动确认（线下付款等）
    pub async fn confirm_manual(
        &self,
        reference: &str,
        actor: AuthUser,
    ) -> AppResult<ParticipationResponse> {
        let participation = self.find_by_reference(reference).await?;
        self.authorize(&participation, actor).await?;

        let outcome = self
            .decide(
                participation.id,
                Decision::Confirm {
                    reason: StatusReason::Manual,
                    paid_cents: None,
                },
            )
            .await?;
        self.full_view(outcome.into_model()).await
    }

    /// 手动拒绝，号码立即释放
    pub async fn reject_manual(
        &self,
        reference: &str,
        actor: AuthUser,
        note: Option<String>,
    ) -> AppResult<ParticipationResponse> {
        let participation = self.find_by_reference(reference).await?;
        self.authorize(&participation, actor).await?;

        let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        if note.as_ref().is_some_and(|n| n.chars().count() > 500) {
            return Err(AppError::invalid_field("note", "must be at most 500 characters"));
        }

        let outcome = self
            .decide(
                participation.id,
                Decision::Reject {
                    reason: StatusReason::Manual,
                    note,
                },
            )
            .await?;
        self.full_view(outcome.into_model()).await
    }

    async fn authorize(&self, participation: &participations::Model, actor: AuthUser) -> AppResult<()> {
        let raffle = raffles::Entity::find_by_id(participation.raffle_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Raffle not found".to_string()))?;
        ensure_can_manage(&raffle, actor)
    }

    async fn full_view(&self, participation: participations::Model) -> AppResult<ParticipationResponse> {
        let selected = load_elements(&self.pool, participation.id).await?;
        Ok(ParticipationResponse::from_parts(
            participation,
            selected,
            self.hold(),
        ))
    }

    /// 状态机变更（手动处理、支付对账、过期清理共用）
    ///
    /// 逻辑:
    /// 1. 锁定所属活动行，与新提交串行化
    /// 2. 锁内重新读取参与记录
    /// 3. 目标状态与当前一致 -> 幂等返回；终态 -> InvalidState
    /// 4. 开奖结果已公布后不再确认
    /// 5. 确认时重新校验号码未被其他有效记录占用（预留过期后可能被重新选走）
    /// 6. 拒绝提交后取消仍可支付的支付意图
    pub async fn decide(
        &self,
        participation_id: i64,
        decision: Decision,
    ) -> AppResult<TransitionOutcome> {
        let raffle_id = participations::Entity::find_by_id(participation_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Participation not found".to_string()))?
            .raffle_id;

        let txn = self.pool.begin().await?;

        let raffle = raffles::Entity::find_by_id(raffle_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Raffle not found".to_string()))?;

        let current = participations::Entity::find_by_id(participation_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Participation not found".to_string()))?;

        let target = decision.target();
        if current.status == target {
            return Ok(TransitionOutcome::Unchanged(current));
        }
        if !current.status.can_transition_to(target) {
            return Err(AppError::InvalidState(format!(
                "Participation {} is already {}",
                current.reference, current.status
            )));
        }

        if target == ParticipationStatus::Confirmed && raffle.result_published {
            return Err(AppError::InvalidState(format!(
                "Raffle {} result is already published",
                raffle.id
            )));
        }

        let selected = load_elements(&txn, current.id).await?;
        let now = Utc::now();

        if target == ParticipationStatus::Confirmed {
            let ledger = load_ledger(&txn, raffle.id).await?;
            let holders = live_holders(&ledger, now, self.hold());
            let taken: Vec<String> = selected
                .iter()
                .filter(|e| holders.get(e.as_str()).is_some_and(|holder| *holder != current.id))
                .cloned()
                .collect();
            if !taken.is_empty() {
                return Err(AppError::ElementAlreadyTaken(taken));
            }
        }

        let mut am = current.clone().into_active_model();
        am.status = Set(target);
        am.decided_at = Set(Some(now));
        am.updated_at = Set(now);
        let reason = match decision {
            Decision::Confirm { reason, paid_cents } => {
                if paid_cents.is_some() {
                    am.paid_cents = Set(paid_cents);
                }
                reason
            }
            Decision::Reject { reason, note } => {
                am.status_note = Set(note);
                reason
            }
        };
        am.status_reason = Set(Some(reason));
        let updated = am.update(&txn).await?;

        txn.commit().await?;

        log::info!(
            "Participation {} {} -> {} ({})",
            updated.reference,
            current.status,
            updated.status,
            reason
        );

        if updated.status == ParticipationStatus::Rejected {
            self.release_intent(&updated).await;
        }

        self.notifier.send(ParticipationNotification {
            event: ParticipationNotification::event_name(updated.status),
            raffle_id: raffle.id,
            raffle_name: raffle.name,
            reference: updated.reference.clone(),
            participant_name: updated.participant_name.clone(),
            participant_email: updated.participant_email.clone(),
            elements: selected,
            status: updated.status,
            reason: updated.status_reason,
        });

        Ok(TransitionOutcome::Applied(updated))
    }

    /// 将超过保留时长的 pending 记录标记为 rejected (expired)
    ///
    /// 返回本次实际过期的记录
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> AppResult<Vec<participations::Model>> {
        let hold = self.hold();
        let stale: Vec<participations::Model> = participations::Entity::find()
            .filter(participations::Column::Status.eq(ParticipationStatus::Pending))
            .order_by_asc(participations::Column::Id)
            .all(&self.pool)
            .await?
            .into_iter()
            .filter(|p| p.is_expired(now, hold))
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for participation in stale {
            let decision = Decision::Reject {
                reason: StatusReason::Expired,
                note: None,
            };
            match self.decide(participation.id, decision).await {
                Ok(TransitionOutcome::Applied(m)) => expired.push(m),
                Ok(TransitionOutcome::Unchanged(_)) => {}
                // 期间已被支付确认
                Err(AppError::InvalidState(msg)) => log::debug!("Skip expiring: {msg}"),
                Err(e) => log::warn!(
                    "Failed to expire participation {}: {e}",
                    participation.reference
                ),
            }
        }
        Ok(expired)
    }

    /// 取消已拒绝记录上仍可支付的支付意图；失败只记日志，不影响状态变更
    async fn release_intent(&self, participation: &participations::Model) {
        let Some(intent_id) = participation.payment_intent_id.as_deref() else {
            return;
        };
        let intent = match self.gateway.retrieve_intent(intent_id).await {
            Ok(intent) => intent,
            Err(e) => {
                log::warn!(
                    "Failed to retrieve PaymentIntent {intent_id} of rejected participation {}: {e}",
                    participation.reference
                );
                return;
            }
        };
        match intent.status {
            IntentStatus::Open => match self.gateway.cancel_intent(intent_id).await {
                Ok(()) => log::info!(
                    "Canceled PaymentIntent {intent_id} of rejected participation {}",
                    participation.reference
                ),
                Err(e) => log::warn!(
                    "Failed to cancel PaymentIntent {intent_id} of rejected participation {}: {e}",
                    participation.reference
                ),
            },
            IntentStatus::Processing => log::warn!(
                "PaymentIntent {intent_id} of rejected participation {} is still processing",
                participation.reference
            ),
            IntentStatus::Succeeded => log::error!(
                "PaymentIntent {intent_id} of rejected participation {} succeeded; refund required",
                participation.reference
            ),
            IntentStatus::Canceled => {}
        }
    }

    /// 绑定支付意图（比较并交换）
    ///
    /// 仅当记录仍为 pending 且当前意图等于 `expected` 时写入，返回是否写入成功
    pub async fn attach_intent(
        &self,
        participation_id: i64,
        expected: Option<&str>,
        intent_id: &str,
    ) -> AppResult<bool> {
        let mut query = participations::Entity::update_many()
            .col_expr(
                participations::Column::PaymentIntentId,
                Expr::value(intent_id.to_string()),
            )
            .col_expr(participations::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(participations::Column::Id.eq(participation_id))
            .filter(participations::Column::Status.eq(ParticipationStatus::Pending));
        query = match expected {
            Some(previous) => query.filter(participations::Column::PaymentIntentId.eq(previous)),
            None => query.filter(participations::Column::PaymentIntentId.is_null()),
        };
        let result = query.exec(&self.pool).await?;
        Ok(result.rows_affected == 1)
    }
}
