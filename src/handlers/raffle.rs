use crate::middlewares::current_user;
use crate::models::*;
use crate::services::{AllocationService, ParticipationService, RaffleService};
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/raffles",
    tag = "raffle",
    params(
        ("page" = Option<u32>, Query, description = "页码 (默认1)"),
        ("per_page" = Option<u32>, Query, description = "每页数量 (默认20，最大100)"),
        ("include_inactive" = Option<bool>, Query, description = "是否包含已下线活动")
    ),
    responses(
        (status = 200, description = "活动列表（分页）")
    )
)]
/// 公开活动列表，默认只返回上线中的活动
pub async fn list_raffles(
    service: web::Data<RaffleService>,
    query: web::Query<RaffleQuery>,
) -> Result<HttpResponse> {
    match service.list(&query.into_inner()).await {
        Ok(page) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": page }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/raffles",
    tag = "raffle",
    request_body = CreateRaffleRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 201, description = "创建成功", body = RaffleResponse),
        (status = 400, description = "请求参数错误"),
        (status = 401, description = "未授权")
    )
)]
/// 创建活动；数字号码或自定义号码列表二选一
pub async fn create_raffle(
    service: web::Data<RaffleService>,
    req: HttpRequest,
    request: web::Json<CreateRaffleRequest>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };
    match service.create(user, request.into_inner()).await {
        Ok(raffle) => Ok(HttpResponse::Created().json(json!({ "success": true, "data": raffle }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/raffles/{id}",
    tag = "raffle",
    params(("id" = i64, Path, description = "活动ID")),
    responses(
        (status = 200, description = "活动详情（含实时号码统计）", body = RaffleResponse),
        (status = 404, description = "活动不存在")
    )
)]
pub async fn get_raffle(
    service: web::Data<RaffleService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match service.get(path.into_inner()).await {
        Ok(raffle) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": raffle }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/raffles/{id}",
    tag = "raffle",
    params(("id" = i64, Path, description = "活动ID")),
    request_body = UpdateRaffleRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "修改成功", body = RaffleResponse),
        (status = 400, description = "请求参数错误"),
        (status = 403, description = "无权限"),
        (status = 409, description = "已有参与记录时不能修改价格")
    )
)]
pub async fn update_raffle(
    service: web::Data<RaffleService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateRaffleRequest>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };
    match service
        .update(path.into_inner(), user, request.into_inner())
        .await
    {
        Ok(raffle) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": raffle }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/raffles/{id}/deactivate",
    tag = "raffle",
    params(("id" = i64, Path, description = "活动ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "已下线", body = RaffleResponse),
        (status = 403, description = "无权限"),
        (status = 404, description = "活动不存在")
    )
)]
pub async fn deactivate_raffle(
    service: web::Data<RaffleService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };
    match service.deactivate(path.into_inner(), user).await {
        Ok(raffle) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": raffle }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/raffles/{id}/availability",
    tag = "raffle",
    params(("id" = i64, Path, description = "活动ID")),
    responses(
        (status = 200, description = "号码分布（按目录顺序）", body = AvailabilityResponse),
        (status = 404, description = "活动不存在")
    )
)]
/// 号码可用性：available / reserved / sold，每次实时计算
pub async fn get_availability(
    service: web::Data<AllocationService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match service.availability(path.into_inner()).await {
        Ok(data) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": data }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/raffles/{id}/participate",
    tag = "raffle",
    params(("id" = i64, Path, description = "活动ID")),
    request_body = ParticipateRequest,
    responses(
        (status = 201, description = "已预留，等待支付", body = ParticipateResponse),
        (status = 400, description = "请求参数错误"),
        (status = 404, description = "活动不存在"),
        (status = 409, description = "号码已被占用"),
        (status = 410, description = "活动未开放")
    )
)]
/// 选号参与；任一号码已被占用则整体拒绝
pub async fn participate(
    service: web::Data<ParticipationService>,
    path: web::Path<i64>,
    request: web::Json<ParticipateRequest>,
) -> Result<HttpResponse> {
    match service.submit(path.into_inner(), request.into_inner()).await {
        Ok(data) => Ok(HttpResponse::Created().json(json!({ "success": true, "data": data }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/raffles/{id}/participations",
    tag = "raffle",
    params(
        ("id" = i64, Path, description = "活动ID"),
        ("page" = Option<u32>, Query, description = "页码 (默认1)"),
        ("per_page" = Option<u32>, Query, description = "每页数量 (默认20)"),
        ("status" = Option<String>, Query, description = "按状态过滤 (pending/confirmed/rejected)")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "参与记录（分页，倒序）"),
        (status = 403, description = "无权限")
    )
)]
pub async fn list_participations(
    service: web::Data<ParticipationService>,
    req: HttpRequest,
    path: web::Path<i64>,
    query: web::Query<ParticipationQuery>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };
    match service
        .list_for_raffle(path.into_inner(), user, &query.into_inner())
        .await
    {
        Ok(page) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": page }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/raffles/{id}/result",
    tag = "raffle",
    params(("id" = i64, Path, description = "活动ID")),
    request_body = PublishResultRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "结果已公布", body = RaffleResultResponse),
        (status = 400, description = "号码不在活动中"),
        (status = 409, description = "结果已公布")
    )
)]
pub async fn publish_result(
    service: web::Data<RaffleService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<PublishResultRequest>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };
    match service
        .publish_result(path.into_inner(), user, &request.winning_element)
        .await
    {
        Ok(data) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": data }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/raffles/{id}/draw",
    tag = "raffle",
    params(("id" = i64, Path, description = "活动ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "随机抽取并公布", body = RaffleResultResponse),
        (status = 409, description = "无已售号码或结果已公布")
    )
)]
/// 从已售号码中随机抽取中奖号码
pub async fn draw_result(
    service: web::Data<RaffleService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };
    match service.draw(path.into_inner(), user).await {
        Ok(data) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": data }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/me/raffles",
    tag = "raffle",
    params(
        ("page" = Option<u32>, Query, description = "页码 (默认1)"),
        ("per_page" = Option<u32>, Query, description = "每页数量 (默认20)")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "我创建的活动（分页）"),
        (status = 401, description = "未授权")
    )
)]
pub async fn list_my_raffles(
    service: web::Data<RaffleService>,
    req: HttpRequest,
    query: web::Query<RaffleQuery>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };
    match service.list_mine(user, &query.into_inner()).await {
        Ok(page) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": page }))),
        Err(e) => Ok(e.error_response()),
    }
}

/// 路由配置
pub fn raffle_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/raffles")
            .route("", web::get().to(list_raffles))
            .route("", web::post().to(create_raffle))
            .route("/{id}", web::get().to(get_raffle))
            .route("/{id}", web::put().to(update_raffle))
            .route("/{id}/deactivate", web::post().to(deactivate_raffle))
            .route("/{id}/availability", web::get().to(get_availability))
            .route("/{id}/participate", web::post().to(participate))
            .route("/{id}/participations", web::get().to(list_participations))
            .route("/{id}/result", web::post().to(publish_result))
            .route("/{id}/draw", web::post().to(draw_result)),
    )
    .service(web::scope("/me").route("/raffles", web::get().to(list_my_raffles)));
}
