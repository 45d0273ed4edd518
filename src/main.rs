use actix_web::{App, HttpServer, ResponseError, error, middleware::Logger, web};
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;

use sorteohub_backend::{
    AppError,
    config::Config,
    database::{create_pool, run_migrations},
    external::{Notifier, PaymentGateway, StripeService},
    handlers,
    middlewares::{AuthMiddleware, create_cors},
    services::*,
    swagger::swagger_config,
    tasks,
    utils::JwtService,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config = Config::from_toml().map_err(|e| {
        log::error!("Failed to load configuration: {e}");
        std::io::Error::other(e.to_string())
    })?;

    // 创建数据库连接池
    let pool = create_pool(&config.database).await.map_err(|e| {
        log::error!("Failed to create database connection pool: {e}");
        std::io::Error::other(e.to_string())
    })?;

    // 运行数据库迁移
    run_migrations(&pool).await.map_err(|e| {
        log::error!("Failed to run database migrations: {e}");
        std::io::Error::other(e.to_string())
    })?;

    // 创建JWT服务
    let jwt_service = JwtService::new(
        &config.jwt.secret,
        config.jwt.access_token_expires_in,
        config.jwt.refresh_token_expires_in,
    );

    // 创建外部服务
    let stripe_service = StripeService::new(config.stripe.clone());
    let gateway: Arc<dyn PaymentGateway> = Arc::new(stripe_service.clone());
    let notifier = Notifier::new(&config.notifications);
    if !notifier.is_enabled() {
        log::info!("Participation notifications disabled (no webhook_url configured)");
    }

    // 创建服务
    let hold = config.reservation.hold_duration();
    let auth_service = AuthService::new(pool.clone(), jwt_service.clone());
    let allocation_service = AllocationService::new(pool.clone(), hold);
    let raffle_service = RaffleService::new(
        pool.clone(),
        allocation_service.clone(),
        config.stripe.currency.clone(),
        hold,
    );
    let participation_service = ParticipationService::new(
        pool.clone(),
        config.reservation.clone(),
        notifier,
        gateway.clone(),
    );
    let reconciliation_service =
        ReconciliationService::new(pool.clone(), participation_service.clone());
    let payment_service = PaymentService::new(
        gateway,
        participation_service.clone(),
        reconciliation_service.clone(),
        hold,
    );

    if let Err(e) = auth_service.ensure_admin(&config.admin).await {
        log::error!("Failed to provision admin account: {e}");
    }

    // 启动后台任务
    tasks::spawn_all(payment_service.clone(), config.reservation.sweep_interval_secs);

    // 启动HTTP服务器
    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        // 请求体解析失败统一返回 VALIDATION_ERROR
        let json_config = web::JsonConfig::default().error_handler(|err, _req| {
            let response = AppError::ValidationError(err.to_string()).error_response();
            error::InternalError::from_response(err, response).into()
        });

        App::new()
            .wrap(Logger::default())
            .wrap(create_cors())
            .wrap(AuthMiddleware::new(jwt_service.clone()))
            .app_data(json_config)
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(allocation_service.clone()))
            .app_data(web::Data::new(raffle_service.clone()))
            .app_data(web::Data::new(participation_service.clone()))
            .app_data(web::Data::new(reconciliation_service.clone()))
            .app_data(web::Data::new(payment_service.clone()))
            .app_data(web::Data::new(stripe_service.clone()))
            .configure(swagger_config)
            .configure(handlers::webhook_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::auth_config)
                    .configure(handlers::raffle_config)
                    .configure(handlers::participation_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
