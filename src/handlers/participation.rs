use crate::middlewares::current_user;
use crate::models::*;
use crate::services::{ParticipationService, PaymentService};
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/participations/{reference}",
    tag = "participation",
    params(("reference" = String, Path, description = "参与记录编号")),
    responses(
        (status = 200, description = "参与记录（不含联系方式）", body = ParticipationPublicResponse),
        (status = 404, description = "记录不存在")
    )
)]
pub async fn get_participation(
    service: web::Data<ParticipationService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    match service.get_public(&path.into_inner()).await {
        Ok(data) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": data }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/participations/{reference}/payment-intent",
    tag = "participation",
    params(("reference" = String, Path, description = "参与记录编号")),
    responses(
        (status = 200, description = "支付意图（已存在则复用）", body = ParticipationIntentResponse),
        (status = 404, description = "记录不存在"),
        (status = 409, description = "记录不是待支付状态或预留已过期"),
        (status = 502, description = "支付服务异常")
    )
)]
/// 为参与记录创建 Stripe 支付意图
pub async fn create_payment_intent(
    service: web::Data<PaymentService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    match service.create_intent(&path.into_inner()).await {
        Ok(data) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": data }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/participations/{reference}/confirm-payment",
    tag = "participation",
    params(("reference" = String, Path, description = "参与记录编号")),
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "当前参与状态", body = ParticipationPublicResponse),
        (status = 400, description = "支付意图不属于该记录或金额不符"),
        (status = 409, description = "号码已被重新占用，需要退款")
    )
)]
/// 客户端支付完成后确认，以 Stripe 查询结果为准
pub async fn confirm_payment(
    service: web::Data<PaymentService>,
    path: web::Path<String>,
    request: web::Json<ConfirmPaymentRequest>,
) -> Result<HttpResponse> {
    match service
        .confirm_payment(&path.into_inner(), &request.payment_intent_id)
        .await
    {
        Ok(data) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": data }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/participations/{reference}/confirm",
    tag = "participation",
    params(("reference" = String, Path, description = "参与记录编号")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "已确认", body = ParticipationResponse),
        (status = 403, description = "无权限"),
        (status = 409, description = "状态不允许或号码已被占用")
    )
)]
/// 创建者 / 管理员手动确认
pub async fn confirm_participation(
    service: web::Data<ParticipationService>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };
    match service.confirm_manual(&path.into_inner(), user).await {
        Ok(data) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": data }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/participations/{reference}/reject",
    tag = "participation",
    params(("reference" = String, Path, description = "参与记录编号")),
    request_body(content = RejectParticipationRequest, description = "可选备注"),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "已拒绝，号码释放", body = ParticipationResponse),
        (status = 403, description = "无权限"),
        (status = 409, description = "记录已确认")
    )
)]
/// 创建者 / 管理员手动拒绝
pub async fn reject_participation(
    service: web::Data<ParticipationService>,
    req: HttpRequest,
    path: web::Path<String>,
    request: Option<web::Json<RejectParticipationRequest>>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };
    let note = request.and_then(|r| r.into_inner().note);
    match service.reject_manual(&path.into_inner(), user, note).await {
        Ok(data) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": data }))),
        Err(e) => Ok(e.error_response()),
    }
}

/// 路由配置
pub fn participation_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/participations")
            .route("/{reference}", web::get().to(get_participation))
            .route(
                "/{reference}/payment-intent",
                web::post().to(create_payment_intent),
            )
            .route("/{reference}/confirm-payment", web::post().to(confirm_payment))
            .route("/{reference}/confirm", web::post().to(confirm_participation))
            .route("/{reference}/reject", web::post().to(reject_participation)),
    );
}
