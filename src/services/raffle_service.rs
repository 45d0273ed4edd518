use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

use crate::entities::{
    ElementKind, ParticipationStatus, participation_element_entity as elements,
    participation_entity as participations, raffle_entity as raffles,
};
use crate::error::{AppError, AppResult, FieldError};
use crate::models::{
    AuthUser, CreateRaffleRequest, ElementCatalog, PaginatedResponse, PaginationParams,
    ParticipationPublicResponse, RafflePageResponse, RaffleQuery, RaffleResponse,
    RaffleResultResponse, UpdateRaffleRequest,
};
use crate::services::allocation_service::AllocationService;
use crate::services::participation_service::load_elements;
use crate::utils::validation::{collect, validate_currency, validate_text};

const DESCRIPTION_MAX_LEN: usize = 2000;

/// 活动创建者或管理员才可管理
pub fn ensure_can_manage(raffle: &raffles::Model, actor: AuthUser) -> AppResult<()> {
    if actor.is_admin() || raffle.creator_id == actor.id {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

fn normalize_description(value: Option<String>) -> Result<Option<String>, FieldError> {
    let Some(text) = value.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > DESCRIPTION_MAX_LEN {
        return Err(FieldError::new(
            "description",
            format!("must be at most {DESCRIPTION_MAX_LEN} characters"),
        ));
    }
    Ok(Some(text))
}

/// 根据创建请求生成号码目录
fn build_catalog(req: &CreateRaffleRequest) -> AppResult<ElementCatalog> {
    match req.element_kind {
        ElementKind::Numeric => {
            if req.custom_elements.is_some() {
                return Err(AppError::invalid_field(
                    "custom_elements",
                    "only allowed for custom raffles",
                ));
            }
            let count = req.element_count.ok_or_else(|| {
                AppError::invalid_field("element_count", "is required for numeric raffles")
            })?;
            ElementCatalog::numeric(count, req.zero_padded)
        }
        ElementKind::Custom => {
            if req.element_count.is_some() || req.zero_padded {
                return Err(AppError::invalid_field(
                    "element_count",
                    "only allowed for numeric raffles",
                ));
            }
            let labels = req.custom_elements.clone().ok_or_else(|| {
                AppError::invalid_field("custom_elements", "is required for custom raffles")
            })?;
            ElementCatalog::custom(labels)
        }
    }
}

#[derive(Clone)]
pub struct RaffleService {
    pool: DatabaseConnection,
    allocation: AllocationService,
    default_currency: String,
    hold: Duration,
}

impl RaffleService {
    pub fn new(
        pool: DatabaseConnection,
        allocation: AllocationService,
        default_currency: String,
        hold: Duration,
    ) -> Self {
        Self {
            pool,
            allocation,
            default_currency,
            hold,
        }
    }

    async fn find<C: ConnectionTrait>(conn: &C, raffle_id: i64) -> AppResult<raffles::Model> {
        raffles::Entity::find_by_id(raffle_id)
            .one(conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Raffle not found".to_string()))
    }

    /// 创建活动
    pub async fn create(&self, actor: AuthUser, req: CreateRaffleRequest) -> AppResult<RaffleResponse> {
        let now = Utc::now();
        let mut errors = Vec::new();

        let name = collect(&mut errors, validate_text("name", &req.name, 3, 120));
        let description = collect(&mut errors, normalize_description(req.description.clone()));
        let currency = collect(
            &mut errors,
            validate_currency(
                "currency",
                req.currency.as_deref().unwrap_or(&self.default_currency),
            ),
        );
        if req.price_cents <= 0 {
            errors.push(FieldError::new("price_cents", "must be greater than 0"));
        }
        if req.ends_at <= now {
            errors.push(FieldError::new("ends_at", "must be in the future"));
        }
        if let Some(starts_at) = req.starts_at
            && starts_at >= req.ends_at
        {
            errors.push(FieldError::new("starts_at", "must be before ends_at"));
        }

        let catalog = match build_catalog(&req) {
            Ok(catalog) => Some(catalog),
            Err(AppError::InvalidFields(fields)) => {
                errors.extend(fields);
                None
            }
            Err(e) => return Err(e),
        };

        let (Some(name), Some(description), Some(currency), Some(catalog)) =
            (name, description, currency, catalog)
        else {
            return Err(AppError::InvalidFields(errors));
        };
        if !errors.is_empty() {
            return Err(AppError::InvalidFields(errors));
        }

        let element_count = i32::try_from(catalog.len())
            .map_err(|_| AppError::invalid_field("element_count", "is too large"))?;
        let custom_elements = match req.element_kind {
            ElementKind::Custom => Some(serde_json::to_value(catalog.as_slice())?),
            ElementKind::Numeric => None,
        };

        let raffle = raffles::ActiveModel {
            creator_id: Set(actor.id),
            name: Set(name),
            description: Set(description),
            element_kind: Set(req.element_kind),
            element_count: Set(element_count),
            zero_padded: Set(req.element_kind == ElementKind::Numeric && req.zero_padded),
            custom_elements: Set(custom_elements),
            price_cents: Set(req.price_cents),
            currency: Set(currency),
            starts_at: Set(req.starts_at),
            ends_at: Set(req.ends_at),
            is_active: Set(true),
            winning_element: Set(None),
            result_published: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        log::info!(
            "Raffle {} created by user {} with {} elements",
            raffle.id,
            actor.id,
            raffle.element_count
        );

        let stats = self.allocation.stats(&raffle).await?;
        Ok(RaffleResponse::from(raffle).with_stats(stats))
    }

    /// 修改活动；号码目录不可改，价格仅在无参与记录时可改
    pub async fn update(
        &self,
        raffle_id: i64,
        actor: AuthUser,
        req: UpdateRaffleRequest,
    ) -> AppResult<RaffleResponse> {
        let raffle = Self::find(&self.pool, raffle_id).await?;
        ensure_can_manage(&raffle, actor)?;
        if raffle.result_published {
            return Err(AppError::InvalidState(
                "Raffle result has already been published".to_string(),
            ));
        }

        let now = Utc::now();
        let mut errors = Vec::new();
        let mut am = raffle.clone().into_active_model();

        if let Some(name) = req.name.as_deref() {
            if let Some(name) = collect(&mut errors, validate_text("name", name, 3, 120)) {
                am.name = Set(name);
            }
        }
        if req.description.is_some()
            && let Some(description) =
                collect(&mut errors, normalize_description(req.description.clone()))
        {
            am.description = Set(description);
        }
        if let Some(ends_at) = req.ends_at {
            if ends_at <= now {
                errors.push(FieldError::new("ends_at", "must be in the future"));
            } else if raffle.starts_at.is_some_and(|s| s >= ends_at) {
                errors.push(FieldError::new("ends_at", "must be after starts_at"));
            } else {
                am.ends_at = Set(ends_at);
            }
        }
        if let Some(price) = req.price_cents {
            if price <= 0 {
                errors.push(FieldError::new("price_cents", "must be greater than 0"));
            } else if price != raffle.price_cents {
                let participation_count = participations::Entity::find()
                    .filter(participations::Column::RaffleId.eq(raffle.id))
                    .count(&self.pool)
                    .await?;
                if participation_count > 0 {
                    return Err(AppError::InvalidState(
                        "Price cannot change once participations exist".to_string(),
                    ));
                }
                am.price_cents = Set(price);
            }
        }
        if !errors.is_empty() {
            return Err(AppError::InvalidFields(errors));
        }

        am.updated_at = Set(now);
        let updated = am.update(&self.pool).await?;
        let stats = self.allocation.stats(&updated).await?;
        Ok(RaffleResponse::from(updated).with_stats(stats))
    }

    /// 下线活动（软删除）
    pub async fn deactivate(&self, raffle_id: i64, actor: AuthUser) -> AppResult<RaffleResponse> {
        let raffle = Self::find(&self.pool, raffle_id).await?;
        ensure_can_manage(&raffle, actor)?;
        if !raffle.is_active {
            return Ok(raffle.into());
        }

        let mut am = raffle.into_active_model();
        am.is_active = Set(false);
        am.updated_at = Set(Utc::now());
        let updated = am.update(&self.pool).await?;
        log::info!("Raffle {} deactivated by user {}", updated.id, actor.id);
        Ok(updated.into())
    }

    /// 活动详情（含实时号码统计）
    pub async fn get(&self, raffle_id: i64) -> AppResult<RaffleResponse> {
        let raffle = Self::find(&self.pool, raffle_id).await?;
        let stats = self.allocation.stats(&raffle).await?;
        Ok(RaffleResponse::from(raffle).with_stats(stats))
    }

    /// 公开活动列表，默认只含上线中的活动
    pub async fn list(&self, query: &RaffleQuery) -> AppResult<RafflePageResponse> {
        let mut base_query = raffles::Entity::find();
        if !query.include_inactive.unwrap_or(false) {
            base_query = base_query.filter(raffles::Column::IsActive.eq(true));
        }
        self.paginate(base_query, query).await
    }

    /// 我创建的活动
    pub async fn list_mine(&self, actor: AuthUser, query: &RaffleQuery) -> AppResult<RafflePageResponse> {
        let base_query = raffles::Entity::find().filter(raffles::Column::CreatorId.eq(actor.id));
        self.paginate(base_query, query).await
    }

    async fn paginate(
        &self,
        base_query: sea_orm::Select<raffles::Entity>,
        query: &RaffleQuery,
    ) -> AppResult<RafflePageResponse> {
        let params = PaginationParams::new(query.page, query.per_page);
        let total = base_query.clone().count(&self.pool).await?;

        let rows = base_query
            .order_by_desc(raffles::Column::CreatedAt)
            .order_by_desc(raffles::Column::Id)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(
            rows.into_iter().map(Into::into).collect(),
            &params,
            total,
        ))
    }

    /// 公布开奖结果
    ///
    /// 中奖号码必须在目录中；公布后活动自动下线。
    /// 号码未售出时照常公布，winner 为空。
    pub async fn publish_result(
        &self,
        raffle_id: i64,
        actor: AuthUser,
        winning_element: &str,
    ) -> AppResult<RaffleResultResponse> {
        let winning_element = winning_element.trim().to_string();

        let txn = self.pool.begin().await?;
        let raffle = raffles::Entity::find_by_id(raffle_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Raffle not found".to_string()))?;
        ensure_can_manage(&raffle, actor)?;

        if raffle.result_published {
            return Err(AppError::InvalidState(
                "Raffle result has already been published".to_string(),
            ));
        }
        if !raffle.catalog()?.contains(&winning_element) {
            return Err(AppError::invalid_field(
                "winning_element",
                "is not part of this raffle",
            ));
        }
        // 中奖号码仍在预留中，结果待其确认或释放后再公布
        let allocation = self.allocation.resolve(&txn, &raffle).await?;
        if allocation.reserved.contains(&winning_element) {
            return Err(AppError::InvalidState(format!(
                "Element {winning_element} is reserved by a pending participation"
            )));
        }

        let now = Utc::now();
        let mut am = raffle.into_active_model();
        am.winning_element = Set(Some(winning_element.clone()));
        am.result_published = Set(true);
        am.is_active = Set(false);
        am.updated_at = Set(now);
        let updated = am.update(&txn).await?;

        let winner = self
            .confirmed_holder(&txn, updated.id, &winning_element)
            .await?;
        txn.commit().await?;

        log::info!(
            "Raffle {} result published: element {} (winner: {})",
            updated.id,
            winning_element,
            winner.as_ref().map(|w| w.reference.as_str()).unwrap_or("none")
        );

        Ok(RaffleResultResponse {
            raffle: updated.into(),
            winning_element,
            winner,
        })
    }

    /// 从已售号码中随机抽取并公布
    pub async fn draw(&self, raffle_id: i64, actor: AuthUser) -> AppResult<RaffleResultResponse> {
        let raffle = Self::find(&self.pool, raffle_id).await?;
        ensure_can_manage(&raffle, actor)?;
        if raffle.result_published {
            return Err(AppError::InvalidState(
                "Raffle result has already been published".to_string(),
            ));
        }

        let allocation = self.allocation.resolve(&self.pool, &raffle).await?;
        let picked = allocation
            .sold
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| AppError::InvalidState("No sold elements to draw from".to_string()))?;

        self.publish_result(raffle_id, actor, &picked).await
    }

    /// 持有某号码的已确认参与记录
    async fn confirmed_holder<C: ConnectionTrait>(
        &self,
        conn: &C,
        raffle_id: i64,
        element: &str,
    ) -> AppResult<Option<ParticipationPublicResponse>> {
        let ids: Vec<i64> = elements::Entity::find()
            .filter(elements::Column::RaffleId.eq(raffle_id))
            .filter(elements::Column::Element.eq(element))
            .all(conn)
            .await?
            .into_iter()
            .map(|e| e.participation_id)
            .collect();
        if ids.is_empty() {
            return Ok(None);
        }

        let Some(holder) = participations::Entity::find()
            .filter(participations::Column::Id.is_in(ids))
            .filter(participations::Column::Status.eq(ParticipationStatus::Confirmed))
            .one(conn)
            .await?
        else {
            return Ok(None);
        };

        let selected = load_elements(conn, holder.id).await?;
        Ok(Some(ParticipationPublicResponse::from_parts(
            holder, selected, self.hold,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::UserRole;
    use crate::external::Notifier;
    use crate::models::ParticipateRequest;
    use crate::services::participation_service::ParticipationService;
    use crate::services::test_support::*;
    use std::sync::Arc;

    struct Ctx {
        db: DatabaseConnection,
        raffles: RaffleService,
        participations: ParticipationService,
        owner: AuthUser,
    }

    async fn setup() -> Ctx {
        let db = setup_test_db().await;
        let owner = seed_user(&db, "owner@example.com", UserRole::Creator).await;
        let cfg = reservation();
        let allocation = AllocationService::new(db.clone(), cfg.hold_duration());
        Ctx {
            raffles: RaffleService::new(
                db.clone(),
                allocation,
                "eur".to_string(),
                cfg.hold_duration(),
            ),
            participations: ParticipationService::new(
                db.clone(),
                cfg,
                Notifier::default(),
                Arc::new(FakeGateway::default()),
            ),
            owner: AuthUser {
                id: owner.id,
                role: owner.role,
            },
            db,
        }
    }

    fn numeric_request(count: u32) -> CreateRaffleRequest {
        CreateRaffleRequest {
            name: "Sorteo solidario".into(),
            description: Some("  Fondos para el club  ".into()),
            element_kind: ElementKind::Numeric,
            element_count: Some(count),
            zero_padded: true,
            custom_elements: None,
            price_cents: 500,
            currency: None,
            starts_at: None,
            ends_at: Utc::now() + Duration::days(10),
        }
    }

    fn participate(elements: &[&str]) -> ParticipateRequest {
        ParticipateRequest {
            name: "Luis Gómez".into(),
            email: "luis@example.com".into(),
            phone: Some("+52 55 1234 5678".into()),
            elements: elements.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_create_numeric_raffle() {
        let ctx = setup().await;
        let raffle = ctx.raffles.create(ctx.owner, numeric_request(100)).await.unwrap();
        assert_eq!(raffle.element_count, 100);
        assert_eq!(raffle.currency, "eur");
        assert_eq!(raffle.description.as_deref(), Some("Fondos para el club"));
        assert!(raffle.is_open);
        assert_eq!(raffle.stats.unwrap().available, 100);

        let availability = ctx.raffles.allocation.availability(raffle.id).await.unwrap();
        assert_eq!(availability.available.first().map(String::as_str), Some("001"));
        assert_eq!(availability.available.last().map(String::as_str), Some("100"));
    }

    #[tokio::test]
    async fn test_create_custom_raffle_deduplicates() {
        let ctx = setup().await;
        let req = CreateRaffleRequest {
            element_kind: ElementKind::Custom,
            element_count: None,
            zero_padded: false,
            custom_elements: Some(vec![" As ".into(), "Rey".into(), "As".into()]),
            currency: Some("MXN".into()),
            ..numeric_request(0)
        };
        let raffle = ctx.raffles.create(ctx.owner, req).await.unwrap();
        assert_eq!(raffle.element_count, 2);
        assert_eq!(raffle.currency, "mxn");
        assert_eq!(
            raffle.custom_elements,
            Some(vec!["As".to_string(), "Rey".to_string()])
        );
    }

    #[tokio::test]
    async fn test_create_validation() {
        let ctx = setup().await;

        let mut req = numeric_request(0);
        req.name = "ab".into();
        req.price_cents = 0;
        req.ends_at = Utc::now() - Duration::days(1);
        match ctx.raffles.create(ctx.owner, req).await.unwrap_err() {
            AppError::InvalidFields(fields) => {
                let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
                assert_eq!(names, vec!["name", "price_cents", "ends_at", "element_count"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let req = CreateRaffleRequest {
            element_kind: ElementKind::Custom,
            element_count: None,
            zero_padded: false,
            custom_elements: Some(vec!["  ".into()]),
            ..numeric_request(0)
        };
        assert!(matches!(
            ctx.raffles.create(ctx.owner, req).await,
            Err(AppError::InvalidFields(_))
        ));
    }

    #[tokio::test]
    async fn test_update_rules() {
        let ctx = setup().await;
        let raffle = ctx.raffles.create(ctx.owner, numeric_request(10)).await.unwrap();

        let updated = ctx
            .raffles
            .update(
                raffle.id,
                ctx.owner,
                UpdateRaffleRequest {
                    name: Some("Gran sorteo".into()),
                    price_cents: Some(700),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Gran sorteo");
        assert_eq!(updated.price_cents, 700);

        ctx.participations.submit(raffle.id, participate(&["01"])).await.unwrap();

        let err = ctx
            .raffles
            .update(
                raffle.id,
                ctx.owner,
                UpdateRaffleRequest {
                    price_cents: Some(900),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let stranger = seed_user(&ctx.db, "x@example.com", UserRole::Creator).await;
        let err = ctx
            .raffles
            .update(
                raffle.id,
                AuthUser {
                    id: stranger.id,
                    role: stranger.role,
                },
                UpdateRaffleRequest::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[tokio::test]
    async fn test_deactivate_and_list() {
        let ctx = setup().await;
        let a = ctx.raffles.create(ctx.owner, numeric_request(10)).await.unwrap();
        let b = ctx.raffles.create(ctx.owner, numeric_request(10)).await.unwrap();

        let deactivated = ctx.raffles.deactivate(a.id, ctx.owner).await.unwrap();
        assert!(!deactivated.is_active);
        assert!(!deactivated.is_open);

        let query = RaffleQuery {
            page: None,
            per_page: None,
            include_inactive: None,
        };
        let public = ctx.raffles.list(&query).await.unwrap();
        assert_eq!(public.total, 1);
        assert_eq!(public.data[0].id, b.id);

        let mine = ctx.raffles.list_mine(ctx.owner, &query).await.unwrap();
        assert_eq!(mine.total, 2);

        let err = ctx
            .participations
            .submit(a.id, participate(&["01"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RaffleInactive(_)));
    }

    #[tokio::test]
    async fn test_publish_result_with_winner() {
        let ctx = setup().await;
        let raffle = ctx.raffles.create(ctx.owner, numeric_request(10)).await.unwrap();
        let p = ctx
            .participations
            .submit(raffle.id, participate(&["03", "07"]))
            .await
            .unwrap();
        ctx.participations
            .confirm_manual(&p.reference, ctx.owner)
            .await
            .unwrap();

        let err = ctx
            .raffles
            .publish_result(raffle.id, ctx.owner, "11")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");

        let result = ctx
            .raffles
            .publish_result(raffle.id, ctx.owner, "07")
            .await
            .unwrap();
        assert_eq!(result.winning_element, "07");
        assert!(result.raffle.result_published);
        assert!(!result.raffle.is_active);
        assert_eq!(result.winner.unwrap().reference, p.reference);

        let err = ctx
            .raffles
            .publish_result(raffle.id, ctx.owner, "03")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_publish_unsold_element_has_no_winner() {
        let ctx = setup().await;
        let raffle = ctx.raffles.create(ctx.owner, numeric_request(10)).await.unwrap();
        let result = ctx
            .raffles
            .publish_result(raffle.id, ctx.owner, "05")
            .await
            .unwrap();
        assert!(result.winner.is_none());
    }

    #[tokio::test]
    async fn test_draw_picks_sold_element() {
        let ctx = setup().await;
        let raffle = ctx.raffles.create(ctx.owner, numeric_request(10)).await.unwrap();

        let err = ctx.raffles.draw(raffle.id, ctx.owner).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let p = ctx
            .participations
            .submit(raffle.id, participate(&["02", "09"]))
            .await
            .unwrap();
        // pending 号码不参与抽取
        assert!(ctx.raffles.draw(raffle.id, ctx.owner).await.is_err());

        ctx.participations
            .confirm_manual(&p.reference, ctx.owner)
            .await
            .unwrap();
        let result = ctx.raffles.draw(raffle.id, ctx.owner).await.unwrap();
        assert!(["02", "09"].contains(&result.winning_element.as_str()));
        assert_eq!(result.winner.unwrap().reference, p.reference);
    }

    #[tokio::test]
    async fn test_publish_refused_while_element_reserved() {
        let ctx = setup().await;
        let raffle = ctx.raffles.create(ctx.owner, numeric_request(10)).await.unwrap();
        let p = ctx
            .participations
            .submit(raffle.id, participate(&["02"]))
            .await
            .unwrap();

        let err = ctx
            .raffles
            .publish_result(raffle.id, ctx.owner, "02")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(!ctx.raffles.get(raffle.id).await.unwrap().result_published);

        // 确认后即可公布并得到中奖者
        ctx.participations
            .confirm_manual(&p.reference, ctx.owner)
            .await
            .unwrap();
        let result = ctx
            .raffles
            .publish_result(raffle.id, ctx.owner, "02")
            .await
            .unwrap();
        assert_eq!(result.winner.unwrap().reference, p.reference);
    }

    #[tokio::test]
    async fn test_pending_cannot_be_confirmed_after_publish() {
        let ctx = setup().await;
        let raffle = ctx.raffles.create(ctx.owner, numeric_request(10)).await.unwrap();
        let p = ctx
            .participations
            .submit(raffle.id, participate(&["04"]))
            .await
            .unwrap();
        ctx.raffles
            .publish_result(raffle.id, ctx.owner, "01")
            .await
            .unwrap();

        let err = ctx
            .participations
            .confirm_manual(&p.reference, ctx.owner)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let availability = ctx.raffles.allocation.availability(raffle.id).await.unwrap();
        assert!(availability.sold.is_empty());
    }
}
